//! Inter-process coordination between the config writer and loaders.

mod config_objects_lock;
mod shared_memory;

pub use config_objects_lock::{ConfigObjectsLock, ExclusiveGuard, SharedGuard};
pub use shared_memory::SharedMemory;

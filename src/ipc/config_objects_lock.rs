//! Reader/writer lock over the config objects, shared across `fork(2)`.
//!
//! One process may write config objects while another loads the config, so
//! the lock lives in a [`SharedMemory`] region and is a process-shared
//! `pthread_rwlock_t`:
//! - [`ExclusiveGuard`] waits until every other holder is gone and keeps
//!   shared holders out for its lifetime.
//! - [`SharedGuard`] never waits. Check [`SharedGuard::owns_lock`] before
//!   writing config objects.

use std::io;
use std::marker::PhantomData;
use std::sync::OnceLock;

use tracing::debug;

use super::shared_memory::SharedMemory;

static GLOBAL: OnceLock<ConfigObjectsLock> = OnceLock::new();

/// The config objects lock.
#[derive(Debug)]
pub struct ConfigObjectsLock {
    raw: SharedMemory<sys::RawRwLock>,
}

impl ConfigObjectsLock {
    /// Creates a lock in fresh shared memory. Children forked afterwards
    /// share it with this process.
    ///
    /// # Errors
    /// Returns the OS error if the mapping or lock initialization fails, or
    /// `Unsupported` on platforms without process-shared locks.
    pub fn new() -> io::Result<Self> {
        let raw = SharedMemory::new(sys::RawRwLock::new())?;
        raw.get().init_process_shared()?;
        Ok(Self { raw })
    }

    /// Creates the process-wide lock if it does not exist yet and returns
    /// it. Call before forking workers.
    ///
    /// # Errors
    /// See [`ConfigObjectsLock::new`].
    pub fn install_global() -> io::Result<&'static Self> {
        if let Some(lock) = GLOBAL.get() {
            return Ok(lock);
        }

        let lock = Self::new()?;
        Ok(GLOBAL.get_or_init(|| lock))
    }

    /// The process-wide lock, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Blocks until no other guard exists, then holds the lock exclusively.
    ///
    /// # Errors
    /// Returns the OS error reported by the lock, e.g. `EDEADLK` when the
    /// calling thread already holds it exclusively.
    pub fn lock_exclusive(&self) -> io::Result<ExclusiveGuard<'_>> {
        self.raw.get().write()?;
        Ok(ExclusiveGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Takes a shared hold if that is possible without waiting.
    pub fn try_lock_shared(&self) -> SharedGuard<'_> {
        let owns = match self.raw.get().try_read() {
            Ok(owns) => owns,
            Err(e) => {
                debug!(error = %e, "shared config objects lock not taken");
                false
            }
        };

        SharedGuard {
            lock: self,
            owns,
            _not_send: PhantomData,
        }
    }
}

/// Exclusive hold on a [`ConfigObjectsLock`]; released on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    lock: &'a ConfigObjectsLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.raw.get().unlock();
    }
}

/// Result of a non-blocking shared lock attempt.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedGuard<'a> {
    lock: &'a ConfigObjectsLock,
    owns: bool,
    _not_send: PhantomData<*const ()>,
}

impl SharedGuard<'_> {
    /// Whether the shared hold was obtained.
    #[must_use]
    pub const fn owns_lock(&self) -> bool {
        self.owns
    }
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        if self.owns {
            self.lock.raw.get().unlock();
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::cell::UnsafeCell;
    use std::io;
    use std::mem::MaybeUninit;

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(rc))
        }
    }

    pub struct RawRwLock(UnsafeCell<MaybeUninit<libc::pthread_rwlock_t>>);

    // SAFETY: all access goes through the pthread API, which synchronizes.
    unsafe impl Send for RawRwLock {}
    // SAFETY: see above.
    unsafe impl Sync for RawRwLock {}

    impl std::fmt::Debug for RawRwLock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("RawRwLock")
        }
    }

    impl RawRwLock {
        pub const fn new() -> Self {
            Self(UnsafeCell::new(MaybeUninit::uninit()))
        }

        fn as_ptr(&self) -> *mut libc::pthread_rwlock_t {
            self.0.get().cast()
        }

        /// Initializes the lock in place as process-shared. Must run once
        /// the lock sits at its final (shared) address.
        pub fn init_process_shared(&self) -> io::Result<()> {
            // SAFETY: attr is initialized by pthread_rwlockattr_init before
            // use and destroyed afterwards. The lock is not in use yet.
            unsafe {
                let mut attr: libc::pthread_rwlockattr_t = std::mem::zeroed();
                check(libc::pthread_rwlockattr_init(&mut attr))?;

                let result = check(libc::pthread_rwlockattr_setpshared(
                    &mut attr,
                    libc::PTHREAD_PROCESS_SHARED,
                ))
                .and_then(|()| check(libc::pthread_rwlock_init(self.as_ptr(), &attr)));

                libc::pthread_rwlockattr_destroy(&mut attr);
                result
            }
        }

        pub fn write(&self) -> io::Result<()> {
            // SAFETY: the lock was initialized by init_process_shared.
            check(unsafe { libc::pthread_rwlock_wrlock(self.as_ptr()) })
        }

        pub fn try_read(&self) -> io::Result<bool> {
            // SAFETY: the lock was initialized by init_process_shared.
            match unsafe { libc::pthread_rwlock_tryrdlock(self.as_ptr()) } {
                0 => Ok(true),
                libc::EBUSY => Ok(false),
                rc => Err(io::Error::from_raw_os_error(rc)),
            }
        }

        pub fn unlock(&self) {
            // SAFETY: only called by a guard that holds the lock.
            unsafe {
                libc::pthread_rwlock_unlock(self.as_ptr());
            }
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "process-shared locks are not supported on this platform",
        )
    }

    #[derive(Debug)]
    pub struct RawRwLock;

    impl RawRwLock {
        pub const fn new() -> Self {
            Self
        }

        pub fn init_process_shared(&self) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn write(&self) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn try_read(&self) -> io::Result<bool> {
            Err(unsupported())
        }

        pub fn unlock(&self) {}
    }
}

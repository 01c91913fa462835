//! Typed memory shared with child processes across `fork(2)`.

use std::io;
use std::ptr::NonNull;

/// One `T` placed in an anonymous shared mapping.
///
/// The mapping is created with `MAP_SHARED`, so after a fork parent and child
/// see the same `T`. Dropping unmaps the region without running `T`'s
/// destructor: other processes may still be using it.
pub struct SharedMemory<T> {
    ptr: NonNull<T>,
    len: usize,
}

// SAFETY: the mapping is owned by this value and only hands out `&T`.
unsafe impl<T: Send + Sync> Send for SharedMemory<T> {}
// SAFETY: see above; `T: Sync` makes shared access sound.
unsafe impl<T: Send + Sync> Sync for SharedMemory<T> {}

impl<T> SharedMemory<T> {
    /// Maps a fresh region and moves `value` into it.
    ///
    /// # Errors
    /// Returns the OS error if the mapping fails, or `Unsupported` where
    /// anonymous shared mappings are not available.
    pub fn new(value: T) -> io::Result<Self> {
        let len = std::mem::size_of::<T>().max(1);
        let ptr = map_shared(len, std::mem::align_of::<T>())?.cast::<T>();

        // SAFETY: the region is fresh, writable, large enough and page
        // aligned, which satisfies `T`'s alignment (checked in map_shared).
        unsafe { ptr.as_ptr().write(value) };

        Ok(Self { ptr, len })
    }

    /// The shared value.
    #[must_use]
    pub fn get(&self) -> &T {
        // SAFETY: initialized in `new` and valid until `drop`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> std::fmt::Debug for SharedMemory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("address", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T> Drop for SharedMemory<T> {
    fn drop(&mut self) {
        unmap(self.ptr.cast::<u8>(), self.len);
    }
}

#[cfg(unix)]
fn map_shared(len: usize, align: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = usize::try_from(page_size).unwrap_or(4096);
    if align > page_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("alignment {align} exceeds page size {page_size}"),
        ));
    }

    // SAFETY: anonymous mapping with no address hint and no file descriptor.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
}

#[cfg(unix)]
fn unmap(ptr: NonNull<u8>, len: usize) {
    // SAFETY: `ptr`/`len` describe a mapping created by `map_shared`.
    unsafe {
        libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), len);
    }
}

#[cfg(not(unix))]
fn map_shared(_len: usize, _align: usize) -> io::Result<NonNull<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "shared memory across fork is not supported on this platform",
    ))
}

#[cfg(not(unix))]
fn unmap(_ptr: NonNull<u8>, _len: usize) {}

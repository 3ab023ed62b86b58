use std::{alloc, fmt, ptr::NonNull, slice};

use serde::{Deserialize, Serialize};

use crate::v4l_sys::{v4l2_memory_V4L2_MEMORY_MMAP, v4l2_memory_V4L2_MEMORY_USERPTR};

/// Alignment and size granularity of application-owned buffers
pub const USERPTR_ALIGN: usize = 128;

/// Memory used for buffer exchange
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMethod {
    /// Driver-owned buffers mapped into our address space
    #[default]
    Mmap        = v4l2_memory_V4L2_MEMORY_MMAP,
    /// Application-owned aligned buffers handed to the driver by address
    UserPtr     = v4l2_memory_V4L2_MEMORY_USERPTR,
}

impl fmt::Display for IoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IoMethod::Mmap => write!(f, "memory-mapped"),
            IoMethod::UserPtr => write!(f, "user pointer"),
        }
    }
}

/// Backing memory of one pooled buffer
///
/// A mapped region belongs to the driver and must be handed back through the device that
/// mapped it. An owned region was allocated by us and is freed on drop.
pub(crate) enum Region {
    Mapped { ptr: NonNull<u8>, len: usize },
    Owned(Aligned),
}

impl Region {
    pub fn as_ptr(&self) -> *mut u8 {
        match self {
            Region::Mapped { ptr, .. } => ptr.as_ptr(),
            Region::Owned(mem) => mem.ptr.as_ptr(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Region::Mapped { len, .. } => *len,
            Region::Owned(mem) => mem.layout.size(),
        }
    }

    /// # Safety
    ///
    /// The caller must own the buffer, i.e. the driver must not be writing into it.
    pub unsafe fn as_slice(&self, len: usize) -> &[u8] {
        slice::from_raw_parts(self.as_ptr(), len.min(self.len()))
    }
}

/// Zero-initialized heap memory with [`USERPTR_ALIGN`] alignment
///
/// The size is rounded up to a multiple of the alignment. The destructor frees the memory.
pub(crate) struct Aligned {
    ptr: NonNull<u8>,
    layout: alloc::Layout,
}

impl Aligned {
    pub fn new(size: usize) -> Option<Self> {
        let size = size.max(1).checked_next_multiple_of(USERPTR_ALIGN)?;
        let layout = alloc::Layout::from_size_align(size, USERPTR_ALIGN).ok()?;
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })?;
        Some(Aligned { ptr, layout })
    }
}

impl Drop for Aligned {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// The regions are plain memory; access is serialized through the ownership tags of the arena.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

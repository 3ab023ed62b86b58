use std::collections::HashMap;
use std::{fmt, io};

use tracing::{debug, error, warn};

use crate::buffer::Dequeued;
use crate::device::{Device, Queue};
use crate::error::{Error, Result};
use crate::memory::{Aligned, IoMethod, Region};
use crate::Format;

/// Fixed pool of frame buffers shared with the driver
///
/// Buffers are addressed by their driver index. User pointer drivers may identify a completed
/// buffer by its address instead, so a reverse map from address to index is kept alongside.
///
/// Driver-mapped memory can only be unmapped through the device, which is why [`Arena::release`]
/// takes it as an argument. Dropping an arena that still holds mappings leaks them.
pub struct Arena {
    queue: Queue,
    bufs: Vec<Region>,
    by_addr: HashMap<usize, u32>,
    reserved: bool,
}

impl Arena {
    /// Reserves and maps or allocates buffers for `format`
    ///
    /// The arena holds as many buffers as the driver granted, but never more than `count`.
    /// If anything fails midway, all buffers set up so far are released along with the driver
    /// reservation before the error is returned.
    ///
    /// # Arguments
    ///
    /// * `dev` - Device to reserve buffers on
    /// * `queue` - Buffer type, I/O method and plane count
    /// * `count` - Desired number of buffers
    /// * `format` - Negotiated format, sizes application-owned buffers
    pub fn allocate<D: Device + ?Sized>(
        dev: &D,
        queue: Queue,
        count: u32,
        format: &Format,
    ) -> Result<Self> {
        if queue.memory == IoMethod::UserPtr && queue.planes > 1 {
            return Err(Error::BufferAllocation {
                op: format!(
                    "user pointer i/o supports single-plane formats only, {} has {} planes",
                    format.fourcc, queue.planes
                ),
                source: None,
            });
        }

        let granted = dev.request_buffers(queue, count).map_err(|e| {
            if e.raw_os_error() == Some(libc::EINVAL) {
                Error::allocation(format!("device does not support {} i/o", queue.memory), e)
            } else {
                Error::allocation("cannot request buffers", e)
            }
        })?;

        let mut arena = Arena {
            queue,
            bufs: Vec::new(),
            by_addr: HashMap::new(),
            reserved: true,
        };

        if granted == 0 {
            arena.release(dev);
            return Err(Error::BufferAllocation {
                op: "insufficient buffer memory on device".to_string(),
                source: None,
            });
        }
        if granted != count {
            warn!(
                requested = count,
                granted, "driver granted a different number of buffers"
            );
        }

        for index in 0..granted.min(count) {
            let region = match Self::region(dev, queue, index, format) {
                Ok(region) => region,
                Err(e) => {
                    arena.release(dev);
                    return Err(e);
                }
            };
            arena.by_addr.insert(region.as_ptr() as usize, index);
            arena.bufs.push(region);
        }

        debug!(
            buffers = arena.bufs.len(),
            "allocated {} buffers",
            queue.memory
        );
        Ok(arena)
    }

    fn region<D: Device + ?Sized>(
        dev: &D,
        queue: Queue,
        index: u32,
        format: &Format,
    ) -> Result<Region> {
        match queue.memory {
            IoMethod::Mmap => {
                let layout = dev
                    .query_buffer(queue, index)
                    .map_err(|e| Error::allocation(format!("cannot query buffer {}", index), e))?;
                let len = layout.length as usize;
                let ptr = unsafe { dev.map(layout.offset, len) }
                    .map_err(|e| Error::allocation(format!("cannot map buffer {}", index), e))?;
                Ok(Region::Mapped { ptr, len })
            }
            IoMethod::UserPtr => {
                let mem = Aligned::new(format.size as usize).ok_or_else(|| {
                    Error::allocation(
                        format!("cannot allocate buffer {}", index),
                        io::Error::from(io::ErrorKind::OutOfMemory),
                    )
                })?;
                Ok(Region::Owned(mem))
            }
        }
    }

    /// Unmaps or frees every buffer and drops the driver reservation
    ///
    /// Calling this again is a no-op. Failures are logged.
    pub fn release<D: Device + ?Sized>(&mut self, dev: &D) {
        for region in self.bufs.drain(..) {
            if let Region::Mapped { ptr, len } = region {
                if let Err(e) = unsafe { dev.unmap(ptr, len) } {
                    error!("cannot unmap buffer: {}", e);
                }
            }
        }
        self.by_addr.clear();

        if self.reserved {
            self.reserved = false;
            if let Err(e) = dev.request_buffers(self.queue, 0) {
                error!("cannot free driver buffers: {}", e);
            }
        }
    }

    /// Returns the queue the buffers belong to
    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Returns the number of buffers
    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub(crate) fn get(&self, index: u32) -> Option<&Region> {
        self.bufs.get(index as usize)
    }

    /// Returns the address and length to queue a buffer with, for user pointer I/O
    pub fn userptr(&self, index: u32) -> Option<(usize, usize)> {
        match self.queue.memory {
            IoMethod::UserPtr => self
                .get(index)
                .map(|region| (region.as_ptr() as usize, region.len())),
            IoMethod::Mmap => None,
        }
    }

    /// Maps a completed buffer back to its index
    ///
    /// User pointer buffers are looked up by address, mapped buffers by index.
    pub fn resolve(&self, buf: &Dequeued) -> Option<u32> {
        match (self.queue.memory, buf.userptr) {
            (IoMethod::UserPtr, Some(addr)) => self.by_addr.get(&addr).copied(),
            (IoMethod::UserPtr, None) => None,
            (IoMethod::Mmap, _) => {
                Some(buf.index).filter(|index| (*index as usize) < self.bufs.len())
            }
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Arena")
            .field("queue", &self.queue)
            .field("buffers", &self.bufs.len())
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if self
            .bufs
            .iter()
            .any(|region| matches!(region, Region::Mapped { .. }))
        {
            error!("buffer arena dropped without release, leaking mappings");
        }
    }
}

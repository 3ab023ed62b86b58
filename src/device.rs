use std::os::raw::{c_int, c_ulong, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::{io, mem};

use crate::buffer::{self, Dequeued, Metadata};
use crate::crop::Rect;
use crate::format::Description;
use crate::memory::IoMethod;
use crate::v4l2;
use crate::v4l2::argp;
use crate::v4l_sys::*;
use crate::{Capabilities, Format, FourCC};

pub mod negotiate;
pub use negotiate::{negotiate, Negotiated};

/// Buffer queue a buffer operation addresses
///
/// Multi-planar queues pass buffers as plane arrays of `planes` entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Queue {
    pub typ: buffer::Type,
    pub memory: IoMethod,
    pub planes: u32,
}

/// Location of a driver buffer as reported by `VIDIOC_QUERYBUF` (first plane)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    /// Offset to pass to mmap(2)
    pub offset: u32,
    /// Length of the buffer in bytes
    pub length: u32,
}

/// Control surface of a video capture device
///
/// Every method maps onto one video4linux request. Implementations report OS failures as
/// [`io::Error`]s, leaving it to the caller to attach context.
pub trait Device: Send + Sync {
    /// Returns the raw fd, which becomes readable when a completed buffer can be dequeued
    fn fd(&self) -> c_int;

    /// Query for device capabilities
    fn query_caps(&self) -> io::Result<Capabilities>;

    /// Returns the pixel format at `index`, or `None` past the last one
    fn enum_format(&self, typ: buffer::Type, index: u32) -> io::Result<Option<Description>>;

    /// Returns the largest crop rectangle the device supports
    fn crop_bounds(&self, typ: buffer::Type) -> io::Result<Rect>;

    /// Returns the current crop rectangle
    fn crop(&self, typ: buffer::Type) -> io::Result<Rect>;

    /// Applies a crop rectangle in one request
    fn set_crop(&self, typ: buffer::Type, rect: Rect) -> io::Result<()>;

    /// Returns the current format
    fn format(&self, typ: buffer::Type) -> io::Result<Format>;

    /// Switches the current format to `fourcc`, keeping everything else
    ///
    /// Drivers may silently adjust the request; read back with [`Device::format`].
    fn set_format(&self, typ: buffer::Type, fourcc: FourCC) -> io::Result<()>;

    /// Requests `count` buffers and returns how many the driver granted
    fn request_buffers(&self, queue: Queue, count: u32) -> io::Result<u32>;

    /// Returns the layout of the driver buffer at `index`
    fn query_buffer(&self, queue: Queue, index: u32) -> io::Result<BufferLayout>;

    /// Hands a buffer to the driver
    ///
    /// For user pointer I/O, `userptr` holds the address and length of the backing memory.
    fn queue(&self, queue: Queue, index: u32, userptr: Option<(usize, usize)>) -> io::Result<()>;

    /// Takes a completed buffer from the driver
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] if no buffer is ready.
    fn dequeue(&self, queue: Queue) -> io::Result<Dequeued>;

    /// Starts streaming
    fn stream_on(&self, typ: buffer::Type) -> io::Result<()>;

    /// Stops streaming, returning all queued buffers to the application
    fn stream_off(&self, typ: buffer::Type) -> io::Result<()>;

    /// Maps a driver buffer into our address space
    ///
    /// # Safety
    ///
    /// `offset` and `len` must describe a buffer reported by [`Device::query_buffer`].
    unsafe fn map(&self, offset: u32, len: usize) -> io::Result<NonNull<u8>>;

    /// Unmaps a region previously returned by [`Device::map`]
    ///
    /// # Safety
    ///
    /// The region must not be accessed afterwards.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()>;

    /// Writes the value of a control
    fn set_control(&self, id: u32, value: i32) -> io::Result<()>;
}

/// Video4linux device node opened for streaming capture
///
/// The node is opened for non-blocking read/write access. The destructor closes it.
pub struct Handle {
    fd: c_int,
    path: PathBuf,
}

impl Handle {
    /// Opens a device node
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the device node, e.g. `/dev/video0`
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::device::Handle;
    /// let dev = Handle::open("/dev/video0");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = v4l2::open(path, libc::O_RDWR | libc::O_NONBLOCK)?;
        Ok(Handle {
            fd,
            path: PathBuf::from(path),
        })
    }

    /// Returns the path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn raw_format(&self, typ: buffer::Type) -> io::Result<v4l2_format> {
        let mut v4l2_fmt = v4l2_format {
            type_: typ as u32,
            ..unsafe { mem::zeroed() }
        };
        unsafe {
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_G_FMT, argp(&mut v4l2_fmt))?;
        }
        Ok(v4l2_fmt)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = v4l2::close(self.fd) {
            tracing::error!(path = %self.path.display(), "cannot close device: {}", e);
        }
    }
}

type Planes = [v4l2_plane; VIDEO_MAX_PLANES as usize];

fn zeroed_planes() -> Planes {
    unsafe { mem::zeroed() }
}

/// Fills in a buffer request for `index` on `queue`
///
/// On planar queues the request points into `planes`, so the array has to outlive every use of
/// the returned struct and must not be touched again until the request is done.
fn describe(
    queue: Queue,
    index: u32,
    userptr: Option<(usize, usize)>,
    planes: &mut Planes,
) -> v4l2_buffer {
    let mut v4l2_buf = v4l2_buffer {
        index,
        type_: queue.typ as u32,
        memory: queue.memory as u32,
        ..unsafe { mem::zeroed() }
    };

    if queue.typ.planar() {
        if let Some((addr, len)) = userptr {
            planes[0].m.userptr = addr as c_ulong;
            planes[0].length = len as u32;
        }
        v4l2_buf.length = queue.planes.clamp(1, VIDEO_MAX_PLANES);
        v4l2_buf.m.planes = planes.as_mut_ptr();
    } else if let Some((addr, len)) = userptr {
        v4l2_buf.m.userptr = addr as c_ulong;
        v4l2_buf.length = len as u32;
    }
    v4l2_buf
}

impl Device for Handle {
    fn fd(&self) -> c_int {
        self.fd
    }

    fn query_caps(&self) -> io::Result<Capabilities> {
        unsafe {
            let mut v4l2_caps: v4l2_capability = mem::zeroed();
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_QUERYCAP, argp(&mut v4l2_caps))?;

            Ok(Capabilities::from(v4l2_caps))
        }
    }

    fn enum_format(&self, typ: buffer::Type, index: u32) -> io::Result<Option<Description>> {
        let mut v4l2_fmt = v4l2_fmtdesc {
            index,
            type_: typ as u32,
            ..unsafe { mem::zeroed() }
        };

        let ret = unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_ENUM_FMT, argp(&mut v4l2_fmt)) };
        match ret {
            Ok(()) => Ok(Some(Description::from(v4l2_fmt))),
            // EINVAL marks the end of the list
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn crop_bounds(&self, typ: buffer::Type) -> io::Result<Rect> {
        let mut v4l2_cropcap = v4l2_cropcap {
            type_: typ as u32,
            ..unsafe { mem::zeroed() }
        };
        unsafe {
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_CROPCAP, argp(&mut v4l2_cropcap))?;
        }
        Ok(Rect::from(v4l2_cropcap.bounds))
    }

    fn crop(&self, typ: buffer::Type) -> io::Result<Rect> {
        let mut v4l2_crop = v4l2_crop {
            type_: typ as u32,
            ..unsafe { mem::zeroed() }
        };
        unsafe {
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_G_CROP, argp(&mut v4l2_crop))?;
        }
        Ok(Rect::from(v4l2_crop.c))
    }

    fn set_crop(&self, typ: buffer::Type, rect: Rect) -> io::Result<()> {
        let mut v4l2_crop = v4l2_crop {
            type_: typ as u32,
            c: rect.into(),
        };
        unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_S_CROP, argp(&mut v4l2_crop)) }
    }

    fn format(&self, typ: buffer::Type) -> io::Result<Format> {
        let v4l2_fmt = self.raw_format(typ)?;
        Ok(Format::from_raw(&v4l2_fmt, typ))
    }

    fn set_format(&self, typ: buffer::Type, fourcc: FourCC) -> io::Result<()> {
        // start from the current format so only the pixel format changes
        let mut v4l2_fmt = self.raw_format(typ)?;
        unsafe {
            if typ.planar() {
                v4l2_fmt.fmt.pix_mp.pixelformat = fourcc.into();
            } else {
                v4l2_fmt.fmt.pix.pixelformat = fourcc.into();
            }
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_S_FMT, argp(&mut v4l2_fmt))
        }
    }

    fn request_buffers(&self, queue: Queue, count: u32) -> io::Result<u32> {
        let mut v4l2_reqbufs = v4l2_requestbuffers {
            count,
            type_: queue.typ as u32,
            memory: queue.memory as u32,
            ..unsafe { mem::zeroed() }
        };
        unsafe {
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_REQBUFS, argp(&mut v4l2_reqbufs))?;
        }

        Ok(v4l2_reqbufs.count)
    }

    fn query_buffer(&self, queue: Queue, index: u32) -> io::Result<BufferLayout> {
        let mut planes = zeroed_planes();
        let mut v4l2_buf = describe(queue, index, None, &mut planes);
        unsafe {
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_QUERYBUF, argp(&mut v4l2_buf))?;

            if queue.typ.planar() {
                Ok(BufferLayout {
                    offset: planes[0].m.mem_offset,
                    length: planes[0].length,
                })
            } else {
                Ok(BufferLayout {
                    offset: v4l2_buf.m.offset,
                    length: v4l2_buf.length,
                })
            }
        }
    }

    fn queue(&self, queue: Queue, index: u32, userptr: Option<(usize, usize)>) -> io::Result<()> {
        let mut planes = zeroed_planes();
        let mut v4l2_buf = describe(queue, index, userptr, &mut planes);
        unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_QBUF, argp(&mut v4l2_buf)) }
    }

    fn dequeue(&self, queue: Queue) -> io::Result<Dequeued> {
        let mut planes = zeroed_planes();
        let mut v4l2_buf = describe(queue, 0, None, &mut planes);

        unsafe {
            // EAGAIN on a non-blocking fd surfaces as ErrorKind::WouldBlock
            v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_DQBUF, argp(&mut v4l2_buf))?;
        }

        let (bytesused, userptr) = if queue.typ.planar() {
            (planes[0].bytesused, unsafe { planes[0].m.userptr })
        } else {
            (v4l2_buf.bytesused, unsafe { v4l2_buf.m.userptr })
        };

        Ok(Dequeued {
            index: v4l2_buf.index,
            userptr: match queue.memory {
                IoMethod::UserPtr => Some(userptr as usize),
                IoMethod::Mmap => None,
            },
            meta: Metadata {
                bytesused,
                flags: v4l2_buf.flags.into(),
                timestamp: v4l2_buf.timestamp.into(),
                sequence: v4l2_buf.sequence,
            },
        })
    }

    fn stream_on(&self, typ: buffer::Type) -> io::Result<()> {
        let mut typ = typ as u32;
        unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_STREAMON, argp(&mut typ)) }
    }

    fn stream_off(&self, typ: buffer::Type) -> io::Result<()> {
        let mut typ = typ as u32;
        unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_STREAMOFF, argp(&mut typ)) }
    }

    unsafe fn map(&self, offset: u32, len: usize) -> io::Result<NonNull<u8>> {
        let ptr = v4l2::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            self.fd,
            offset as libc::off_t,
        )?;
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        v4l2::munmap(ptr.as_ptr() as *mut c_void, len)
    }

    fn set_control(&self, id: u32, value: i32) -> io::Result<()> {
        let mut v4l2_ctrl = v4l2_control { id, value };
        unsafe { v4l2::ioctl(self.fd, v4l2::vidioc::VIDIOC_S_CTRL, argp(&mut v4l2_ctrl)) }
    }
}

impl<D: Device + ?Sized> Device for Arc<D> {
    fn fd(&self) -> c_int {
        (**self).fd()
    }

    fn query_caps(&self) -> io::Result<Capabilities> {
        (**self).query_caps()
    }

    fn enum_format(&self, typ: buffer::Type, index: u32) -> io::Result<Option<Description>> {
        (**self).enum_format(typ, index)
    }

    fn crop_bounds(&self, typ: buffer::Type) -> io::Result<Rect> {
        (**self).crop_bounds(typ)
    }

    fn crop(&self, typ: buffer::Type) -> io::Result<Rect> {
        (**self).crop(typ)
    }

    fn set_crop(&self, typ: buffer::Type, rect: Rect) -> io::Result<()> {
        (**self).set_crop(typ, rect)
    }

    fn format(&self, typ: buffer::Type) -> io::Result<Format> {
        (**self).format(typ)
    }

    fn set_format(&self, typ: buffer::Type, fourcc: FourCC) -> io::Result<()> {
        (**self).set_format(typ, fourcc)
    }

    fn request_buffers(&self, queue: Queue, count: u32) -> io::Result<u32> {
        (**self).request_buffers(queue, count)
    }

    fn query_buffer(&self, queue: Queue, index: u32) -> io::Result<BufferLayout> {
        (**self).query_buffer(queue, index)
    }

    fn queue(&self, queue: Queue, index: u32, userptr: Option<(usize, usize)>) -> io::Result<()> {
        (**self).queue(queue, index, userptr)
    }

    fn dequeue(&self, queue: Queue) -> io::Result<Dequeued> {
        (**self).dequeue(queue)
    }

    fn stream_on(&self, typ: buffer::Type) -> io::Result<()> {
        (**self).stream_on(typ)
    }

    fn stream_off(&self, typ: buffer::Type) -> io::Result<()> {
        (**self).stream_off(typ)
    }

    unsafe fn map(&self, offset: u32, len: usize) -> io::Result<NonNull<u8>> {
        (**self).map(offset, len)
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        (**self).unmap(ptr, len)
    }

    fn set_control(&self, id: u32, value: i32) -> io::Result<()> {
        (**self).set_control(id, value)
    }
}

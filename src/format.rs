use std::fmt;

use crate::capability::c_str;
use crate::v4l_sys::{v4l2_fmtdesc, v4l2_format};
use crate::{buffer, FourCC};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Streaming format of the capture queue
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// bytes per line of the first plane
    pub stride: u32,
    /// maximum number of bytes required to store an image (first plane)
    pub size: u32,
    /// number of memory planes, at least one
    pub planes: u32,
}

impl Format {
    /// Returns a single-plane capture format
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Format, FourCC};
    /// let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            stride: 0,
            size: 0,
            planes: 1,
        }
    }

    /// Extracts the format from a kernel struct filled in by `VIDIOC_G_FMT`
    ///
    /// The union member is chosen by `type_`. A multi-planar driver reporting zero planes is
    /// treated as having one.
    pub fn from_raw(fmt: &v4l2_format, type_: buffer::Type) -> Self {
        if type_.planar() {
            // packed struct: copy before reading fields
            let pix_mp = unsafe { fmt.fmt.pix_mp };
            let plane_fmt = pix_mp.plane_fmt;
            let plane = plane_fmt[0];
            Format {
                width: pix_mp.width,
                height: pix_mp.height,
                fourcc: FourCC::from(pix_mp.pixelformat),
                stride: plane.bytesperline,
                size: plane.sizeimage,
                planes: u32::from(pix_mp.num_planes).max(1),
            }
        } else {
            let pix = unsafe { fmt.fmt.pix };
            Format {
                width: pix.width,
                height: pix.height,
                fourcc: FourCC::from(pix.pixelformat),
                stride: pix.bytesperline,
                size: pix.sizeimage,
                planes: 1,
            }
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        writeln!(f, "planes         : {}", self.planes)?;
        Ok(())
    }
}

bitflags::bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    /// Format description flags
    pub struct Flags : u32 {
        const COMPRESSED            = 0x0001;
        const EMULATED              = 0x0002;
        const CONTINUOUS_BITSTREAM  = 0x0004;
        const DYN_RESOLUTION        = 0x0008;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Format description as returned by [`crate::v4l2::vidioc::VIDIOC_ENUM_FMT`]
pub struct Description {
    pub index: u32,
    pub flags: Flags,
    pub description: String,
    pub fourcc: FourCC,
}

impl Description {
    /// Returns a description for a pixel format without any flags set
    pub fn new(index: u32, fourcc: FourCC, description: &str) -> Self {
        Description {
            index,
            flags: Flags::empty(),
            description: description.to_string(),
            fourcc,
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.fourcc, self.description)?;
        if !self.flags.is_empty() {
            write!(f, " {:?}", self.flags)?;
        }
        Ok(())
    }
}

impl From<v4l2_fmtdesc> for Description {
    fn from(desc: v4l2_fmtdesc) -> Self {
        Description {
            index: desc.index,
            flags: Flags::from(desc.flags),
            description: c_str(&desc.description),
            fourcc: FourCC::from(desc.pixelformat),
        }
    }
}

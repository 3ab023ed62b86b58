use tracing::{debug, info};

use crate::buffer;
use crate::capability::Flags;
use crate::crop::{CropRequest, Rect};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::format::Description;
use crate::{Capabilities, Format, FourCC};

/// Outcome of device negotiation
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Buffer addressing mode of the capture queue
    pub typ: buffer::Type,
    /// Capabilities of the opened node
    pub caps: Capabilities,
    /// Pixel formats the device advertised
    pub formats: Vec<Description>,
    /// Active format, as read back from the device
    pub format: Format,
    /// Crop rectangle in effect, if one was requested
    pub crop: Option<Rect>,
}

/// Configures a capture device for streaming
///
/// Checks that the device can capture and stream, chooses single- or multi-planar buffer
/// addressing, applies the crop request if there is one and selects the first entry of
/// `preferred` the device supports.
///
/// # Arguments
///
/// * `dev` - Device to configure
/// * `preferred` - Acceptable pixel formats, most preferred first
/// * `crop` - Optional region of interest
pub fn negotiate<D: Device + ?Sized>(
    dev: &D,
    preferred: &[FourCC],
    crop: Option<&CropRequest>,
) -> Result<Negotiated> {
    let caps = dev
        .query_caps()
        .map_err(|e| Error::capability("cannot query device capabilities", e))?;

    let typ = if caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        buffer::Type::VideoCapture
    } else if caps.capabilities.contains(Flags::VIDEO_CAPTURE_MPLANE) {
        buffer::Type::VideoCaptureMplane
    } else {
        return Err(Error::Capability {
            op: format!("{} is not a video capture device", caps.card),
            source: None,
        });
    };

    if !caps.capabilities.contains(Flags::STREAMING) {
        return Err(Error::Capability {
            op: format!("{} does not support streaming i/o", caps.card),
            source: None,
        });
    }

    info!(
        driver = %caps.driver,
        card = %caps.card,
        bus = %caps.bus,
        version = ?caps.version,
        "opened {} device",
        typ
    );

    let formats = enumerate_formats(dev, typ)?;

    let crop = match crop.filter(|req| req.is_requested()) {
        Some(req) => Some(apply_crop(dev, typ, req)?),
        None => None,
    };

    let fourcc = preferred
        .iter()
        .copied()
        .find(|fourcc| formats.iter().any(|desc| desc.fourcc == *fourcc))
        .ok_or_else(|| Error::FormatNegotiation {
            op: format!(
                "no pixel format supported by both device and application (device: [{}])",
                formats
                    .iter()
                    .map(|desc| desc.fourcc.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            source: None,
        })?;

    info!("setting pixel format {}", fourcc);
    dev.set_format(typ, fourcc)
        .map_err(|e| Error::format("cannot set format", e))?;

    let format = dev
        .format(typ)
        .map_err(|e| Error::format("cannot get format", e))?;
    if format.fourcc != fourcc {
        return Err(Error::FormatNegotiation {
            op: format!(
                "device refused pixel format {} and kept {}",
                fourcc, format.fourcc
            ),
            source: None,
        });
    }

    info!(
        width = format.width,
        height = format.height,
        stride = format.stride,
        size = format.size,
        planes = format.planes,
        "negotiated format {}",
        format.fourcc
    );

    Ok(Negotiated {
        typ,
        caps,
        formats,
        format,
        crop,
    })
}

fn enumerate_formats<D: Device + ?Sized>(dev: &D, typ: buffer::Type) -> Result<Vec<Description>> {
    let mut formats = Vec::new();
    let mut index = 0;
    while let Some(desc) = dev
        .enum_format(typ, index)
        .map_err(|e| Error::format("cannot enumerate pixel formats", e))?
    {
        debug!("supported format {}", desc);
        formats.push(desc);
        index += 1;
    }
    Ok(formats)
}

fn apply_crop<D: Device + ?Sized>(dev: &D, typ: buffer::Type, req: &CropRequest) -> Result<Rect> {
    let bounds = dev
        .crop_bounds(typ)
        .map_err(|e| Error::crop("cannot get crop capabilities from device", e))?;
    let current = dev
        .crop(typ)
        .map_err(|e| Error::crop("cannot get crop from device", e))?;

    let rect = req.clamp(current, bounds);
    debug!(%bounds, %current, "setting crop {}", rect);
    dev.set_crop(typ, rect)
        .map_err(|e| Error::crop("cannot set crop in device", e))?;

    // drivers round to their own granularity
    let applied = match dev.crop(typ) {
        Ok(applied) => applied,
        Err(e) => {
            debug!("cannot read back crop: {}", e);
            rect
        }
    };
    info!("crop rectangle {}", applied);
    Ok(applied)
}

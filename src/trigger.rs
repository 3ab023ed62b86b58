//! Frame trigger controls of Alvium-style camera drivers
//!
//! When triggering is enabled, the sensor only exposes a frame when the selected source fires.
//! The controls live in the camera class and are not part of the generic video4linux set.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::v4l_sys::V4L2_CTRL_CLASS_CAMERA;

const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

pub const V4L2_CID_TRIGGER_MODE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 47;
pub const V4L2_CID_TRIGGER_ACTIVATION: u32 = V4L2_CID_CAMERA_CLASS_BASE + 48;
pub const V4L2_CID_TRIGGER_SOURCE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 49;
pub const V4L2_CID_TRIGGER_SOFTWARE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 50;

/// Signal that starts an exposure
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(i32)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Line0       = 0,
    Line1       = 1,
    Line2       = 2,
    Line3       = 3,
    #[default]
    Software    = 4,
}

/// Condition on a hardware line that counts as a trigger
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(i32)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    RisingEdge  = 0,
    FallingEdge = 1,
    AnyEdge     = 2,
    LevelHigh   = 3,
    LevelLow    = 4,
}

/// Trigger configuration
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    pub source: Source,
    pub activation: Activation,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Source::Software => write!(f, "software"),
            source => write!(f, "{:?} on {:?}", source, self.activation),
        }
    }
}

impl Trigger {
    /// Enables triggered acquisition on the device
    pub fn apply<D: Device + ?Sized>(&self, dev: &D) -> Result<()> {
        set(dev, V4L2_CID_TRIGGER_MODE, 1, "cannot enable trigger mode")?;
        set(dev, V4L2_CID_TRIGGER_SOURCE, self.source as i32, "cannot set trigger source")?;
        if self.source != Source::Software {
            set(
                dev,
                V4L2_CID_TRIGGER_ACTIVATION,
                self.activation as i32,
                "cannot set trigger activation",
            )?;
        }
        info!("trigger enabled: {}", self);
        Ok(())
    }
}

/// Fires the software trigger once
pub fn fire<D: Device + ?Sized>(dev: &D) -> Result<()> {
    debug!("software trigger");
    set(dev, V4L2_CID_TRIGGER_SOFTWARE, 1, "cannot fire software trigger")
}

fn set<D: Device + ?Sized>(dev: &D, id: u32, value: i32, op: &str) -> Result<()> {
    dev.set_control(id, value)
        .map_err(|e| Error::capability(op, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_ids() {
        assert_eq!(V4L2_CID_TRIGGER_MODE, 0x009a_092f);
        assert_eq!(V4L2_CID_TRIGGER_SOFTWARE, 0x009a_0932);
    }

    #[test]
    fn display() {
        assert_eq!(Trigger::default().to_string(), "software");
        let hw = Trigger {
            source: Source::Line1,
            activation: Activation::FallingEdge,
        };
        assert_eq!(hw.to_string(), "Line1 on FallingEdge");
    }
}

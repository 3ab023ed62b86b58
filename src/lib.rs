//! Latest-frame capture from video4linux devices
//!
//! This crate negotiates a pixel format with a V4L2 capture device, sets up a small pool of
//! driver-mapped or application-owned frame buffers and streams into it from a background
//! thread. Consumers always get the most recent completed frame; frames they were too slow to
//! pick up are recycled without blocking the device.
//!
//! The raw kernel interface lives in [`v4l2`]. [`device::Device`] abstracts the requests the
//! engine issues, with [`device::Handle`] as the implementation backed by a device node.
//!
//! # Example
//!
//! ```no_run
//! use v4l_capture::{CaptureConfig, Engine};
//!
//! let config = CaptureConfig::from_toml(
//!     r#"
//!     device = "/dev/video0"
//!     pixel_formats = ["YUYV", "MJPG"]
//!     "#,
//! )
//! .unwrap();
//!
//! let mut engine = Engine::open_and_init(&config).unwrap();
//! let frames = engine.frame_channel();
//! engine.start().unwrap();
//!
//! for _ in 0..10 {
//!     frames.recv().unwrap();
//!     if let Some(frame) = engine.get_new_buffer() {
//!         println!("frame {} with {} bytes", frame.meta().sequence, frame.len());
//!     }
//! }
//! ```

pub use v4l2_sys as v4l_sys;

pub mod v4l2;

pub mod buffer;
pub mod capability;
pub mod config;
pub mod crop;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod io;
pub mod memory;
pub mod trigger;

mod fourcc;
mod timestamp;

pub use capability::Capabilities;
pub use config::CaptureConfig;
pub use device::{Device, Handle};
pub use engine::{Engine, Frame, Status};
pub use error::{Error, Result};
pub use format::Format;
pub use fourcc::{FourCC, ParseFourCCError};
pub use memory::IoMethod;
pub use timestamp::Timestamp;

//! Raw video4linux2 kernel interface
//!
//! Everything in here talks to the kernel directly and hands out `io::Result`s carrying the
//! `errno` of the failed call. Higher layers attach context to those errors.

mod api;
pub use api::*;

pub mod vidioc;

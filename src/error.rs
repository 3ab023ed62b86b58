//! Error types for the capture engine.

use std::io;
use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, configuring or streaming from a capture device.
///
/// OS-backed variants carry the description of the operation that failed together with the
/// underlying [`io::Error`], so the errno stays available through [`Error::os_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device node could not be opened for non-blocking read/write access.
    #[error("cannot open device {}: {source}", .path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device is not a streaming capture device, or a control it needs is missing.
    #[error("{op}{}", fmt_source(.source))]
    Capability {
        op: String,
        #[source]
        source: Option<io::Error>,
    },

    /// No pixel format acceptable to both sides, or the driver refused the one we set.
    #[error("{op}{}", fmt_source(.source))]
    FormatNegotiation {
        op: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The crop rectangle could not be read or applied.
    #[error("{op}: {source}")]
    Crop {
        op: String,
        #[source]
        source: io::Error,
    },

    /// Buffer reservation, query, mapping or allocation failed.
    #[error("{op}{}", fmt_source(.source))]
    BufferAllocation {
        op: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Enqueue, dequeue, stream-on or stream-off failed.
    #[error("{op}: {source}")]
    Streaming {
        op: String,
        #[source]
        source: io::Error,
    },

    /// The readiness wait itself failed.
    #[error("waiting for device readiness failed: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    /// The driver returned a buffer the pool does not know about.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The engine was used in a state that does not allow the call.
    #[error("invalid state: {0}")]
    State(String),

    /// The capture configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

fn fmt_source(source: &Option<io::Error>) -> String {
    match source {
        Some(err) => format!(": {}", err),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn capability(op: impl Into<String>, source: io::Error) -> Self {
        Error::Capability {
            op: op.into(),
            source: Some(source),
        }
    }

    pub(crate) fn format(op: impl Into<String>, source: io::Error) -> Self {
        Error::FormatNegotiation {
            op: op.into(),
            source: Some(source),
        }
    }

    pub(crate) fn crop(op: impl Into<String>, source: io::Error) -> Self {
        Error::Crop {
            op: op.into(),
            source,
        }
    }

    pub(crate) fn allocation(op: impl Into<String>, source: io::Error) -> Self {
        Error::BufferAllocation {
            op: op.into(),
            source: Some(source),
        }
    }

    pub(crate) fn streaming(op: impl Into<String>, source: io::Error) -> Self {
        Error::Streaming {
            op: op.into(),
            source,
        }
    }

    /// Returns the OS error code (errno) behind this error, if there is one.
    pub fn os_code(&self) -> Option<i32> {
        let source = match self {
            Error::DeviceOpen { source, .. }
            | Error::Crop { source, .. }
            | Error::Streaming { source, .. }
            | Error::Wait { source } => Some(source),
            Error::Capability { source, .. }
            | Error::FormatNegotiation { source, .. }
            | Error::BufferAllocation { source, .. } => source.as_ref(),
            Error::InvariantViolation(_) | Error::State(_) | Error::Config(_) => None,
        };
        source.and_then(io::Error::raw_os_error)
    }
}

use std::fmt;

use crate::buffer::Metadata;
use crate::engine::rate::FrameTimes;
use crate::error::{Error, Result};

/// Lifecycle of a stream
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// No acquisition thread exists
    Idle,
    /// Acquisition thread is running
    Running,
    /// A stop was requested, the thread is winding down
    Stopping,
    /// The thread has exited, on request or after an error
    Stopped,
}

/// Party that currently owns a pooled buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Owner {
    /// Not in use, no stream is active
    Free,
    /// Handed to the driver for filling
    Queued,
    /// Completed, waiting in the latest-frame slot
    Pending,
    /// Handed to the consumer
    CheckedOut,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Free => write!(f, "free"),
            Owner::Queued => write!(f, "queued"),
            Owner::Pending => write!(f, "pending"),
            Owner::CheckedOut => write!(f, "checked out"),
        }
    }
}

/// Everything guarded by the engine lock
pub(crate) struct State {
    pub stream: StreamState,
    /// Set once stream-on succeeded; the acquisition loop waits for it
    pub streaming: bool,
    owners: Vec<Owner>,
    meta: Vec<Metadata>,
    pub pending: Option<u32>,
    pub checked_out: Option<u32>,
    pub times: FrameTimes,
    pub frame_counter: u64,
    pub frame_rate: f64,
}

impl State {
    pub fn new(buffers: usize) -> Self {
        State {
            stream: StreamState::Idle,
            streaming: false,
            owners: vec![Owner::Free; buffers],
            meta: vec![Metadata::default(); buffers],
            pending: None,
            checked_out: None,
            times: FrameTimes::new(),
            frame_counter: 0,
            frame_rate: 0.0,
        }
    }

    pub fn owner(&self, index: u32) -> Option<Owner> {
        self.owners.get(index as usize).copied()
    }

    /// Moves buffer `index` from `from` to `to`, failing if it is not owned by `from`
    pub fn transition(&mut self, index: u32, from: Owner, to: Owner) -> Result<()> {
        match self.owners.get_mut(index as usize) {
            Some(owner) if *owner == from => {
                *owner = to;
                Ok(())
            }
            Some(owner) => Err(Error::InvariantViolation(format!(
                "buffer {} is {}, expected {}",
                index, owner, from
            ))),
            None => Err(Error::InvariantViolation(format!(
                "buffer {} does not exist",
                index
            ))),
        }
    }

    pub fn meta(&self, index: u32) -> Metadata {
        self.meta.get(index as usize).copied().unwrap_or_default()
    }

    pub fn set_meta(&mut self, index: u32, meta: Metadata) {
        if let Some(slot) = self.meta.get_mut(index as usize) {
            *slot = meta;
        }
    }

    /// Clears statistics and the latest-frame slot and marks every buffer free
    pub fn reset(&mut self) {
        self.streaming = false;
        self.pending = None;
        self.checked_out = None;
        self.times.clear();
        self.frame_counter = 0;
        self.frame_rate = 0.0;
        self.owners.iter_mut().for_each(|owner| *owner = Owner::Free);
    }
}

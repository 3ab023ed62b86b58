//! Latest-frame capture engine
//!
//! The engine owns a negotiated device and its buffer arena. While streaming, a background
//! thread dequeues completed buffers and keeps only the newest one in a single slot. Older
//! frames the consumer did not pick up in time are handed straight back to the driver.

mod acquisition;
mod rate;
mod state;
mod wait;

pub use rate::AVERAGE_SPAN;
pub use state::{Owner, StreamState};

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::buffer::Metadata;
use crate::config::CaptureConfig;
use crate::device::{negotiate, Device, Handle, Negotiated, Queue};
use crate::error::{Error, Result};
use crate::io::Arena;
use crate::trigger;
use crate::{Format, FourCC};

use state::State;
use wait::EventFd;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// State shared between the engine handle and its acquisition thread
pub(crate) struct Shared<D: Device> {
    device: D,
    arena: Arena,
    state: Mutex<State>,
    gate: Condvar,
    cancel: EventFd,
    timeout: Duration,
    listener: Mutex<Option<Listener>>,
}

impl<D: Device> Shared<D> {
    fn notify(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Asks a running acquisition loop to wind down
    fn abort(&self, state: &mut State) {
        if state.stream == StreamState::Running {
            state.stream = StreamState::Stopping;
            if let Err(e) = self.cancel.signal() {
                error!("cannot signal acquisition thread: {}", e);
            }
            self.gate.notify_all();
        }
    }
}

impl<D: Device> Drop for Shared<D> {
    fn drop(&mut self) {
        // unmap before the device is closed
        self.arena.release(&self.device);
    }
}

/// Snapshot of the stream statistics
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Status {
    /// Whether the acquisition thread is running
    pub running: bool,
    /// Frames completed since the stream started
    pub frame_counter: u64,
    /// Frames per second, averaged over the last second
    pub frame_rate: f64,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | frames: {} | {:.2} fps",
            if self.running { "running" } else { "stopped" },
            self.frame_counter,
            self.frame_rate
        )
    }
}

/// Capture engine keeping the most recent frame of a streaming device
///
/// # Example
///
/// ```no_run
/// use v4l_capture::{CaptureConfig, Engine};
///
/// let mut engine = Engine::open_and_init(&CaptureConfig::default()).unwrap();
/// engine.start().unwrap();
/// if let Some(frame) = engine.get_new_buffer() {
///     println!("{}x{} {}", frame.width(), frame.height(), frame.fourcc());
/// }
/// engine.stop();
/// ```
pub struct Engine<D: Device + 'static = Handle> {
    shared: Arc<Shared<D>>,
    thread: Option<JoinHandle<()>>,
    negotiated: Negotiated,
}

impl Engine<Handle> {
    /// Opens the configured device node and initializes it for streaming
    pub fn open_and_init(config: &CaptureConfig) -> Result<Self> {
        config.validate()?;
        let device = Handle::open(&config.device).map_err(|source| Error::DeviceOpen {
            path: config.device.clone(),
            source,
        })?;
        Self::with_device(device, config)
    }
}

impl<D: Device + 'static> Engine<D> {
    /// Initializes an opened device for streaming
    ///
    /// Negotiates the pixel format and crop rectangle, applies the trigger settings and sets up
    /// the buffer arena. The stream is not started.
    pub fn with_device(device: D, config: &CaptureConfig) -> Result<Self> {
        config.validate()?;

        let negotiated = negotiate(&device, &config.pixel_formats, config.crop.as_ref())?;
        if let Some(trigger) = &config.trigger {
            trigger.apply(&device)?;
        }

        let cancel = EventFd::new()
            .map_err(|e| Error::streaming("cannot create cancellation channel", e))?;

        let queue = Queue {
            typ: negotiated.typ,
            memory: config.io_method,
            planes: negotiated.format.planes,
        };
        let arena = Arena::allocate(&device, queue, config.buffer_count, &negotiated.format)?;
        info!(
            buffers = arena.len(),
            "initialized {} with {} i/o",
            negotiated.format.fourcc,
            config.io_method
        );

        let state = State::new(arena.len());
        Ok(Engine {
            shared: Arc::new(Shared {
                device,
                arena,
                state: Mutex::new(state),
                gate: Condvar::new(),
                cancel,
                timeout: config.wait_timeout(),
                listener: Mutex::new(None),
            }),
            thread: None,
            negotiated,
        })
    }

    /// Starts streaming
    ///
    /// Queues every buffer, switches the stream on and launches the acquisition thread. If
    /// anything fails, the stream is stopped again before the error is returned.
    pub fn start(&mut self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.stream != StreamState::Idle {
                return Err(Error::State(format!(
                    "cannot start a stream in state {:?}",
                    state.stream
                )));
            }
            if self.shared.arena.is_empty() {
                return Err(Error::State("device is not initialized".to_string()));
            }

            self.shared.cancel.drain();
            state.stream = StreamState::Running;
            state.streaming = false;
        }

        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name("v4l-acquisition".to_string())
            .spawn(move || acquisition::run(&shared));
        match thread {
            Ok(thread) => self.thread = Some(thread),
            Err(e) => {
                self.shared.state.lock().stream = StreamState::Idle;
                return Err(Error::streaming("cannot spawn acquisition thread", e));
            }
        }

        if let Err(e) = self.stream_on() {
            self.stop();
            return Err(e);
        }

        info!("stream started");
        Ok(())
    }

    fn stream_on(&self) -> Result<()> {
        let shared = &*self.shared;
        let queue = shared.arena.queue();

        for index in 0..shared.arena.len() as u32 {
            shared
                .state
                .lock()
                .transition(index, Owner::Free, Owner::Queued)?;
            shared
                .device
                .queue(queue, index, shared.arena.userptr(index))
                .map_err(|e| Error::streaming(format!("cannot queue buffer {}", index), e))?;
        }

        shared
            .device
            .stream_on(queue.typ)
            .map_err(|e| Error::streaming("cannot start streaming", e))?;

        let mut state = shared.state.lock();
        state.streaming = true;
        shared.gate.notify_all();
        Ok(())
    }

    /// Stops streaming and waits for the acquisition thread to exit
    ///
    /// Does nothing if the stream is not started.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if state.stream == StreamState::Idle {
                return;
            }
            self.shared.abort(&mut state);
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("acquisition thread panicked");
            }
        }

        self.shared.state.lock().stream = StreamState::Idle;
        info!("stream stopped");
    }

    /// Returns the most recent frame, if one arrived since the last call
    ///
    /// The frame handed out by the previous call goes back to the driver first. If the driver
    /// refuses it, the stream is stopped and no frame is returned.
    pub fn get_new_buffer(&mut self) -> Option<Frame<'_>> {
        let shared = &*self.shared;
        let queue = shared.arena.queue();

        let mut state = shared.state.lock();
        let index = state.pending?;

        if let Some(old) = state.checked_out {
            let requeued = shared
                .device
                .queue(queue, old, shared.arena.userptr(old))
                .map_err(|e| Error::streaming(format!("cannot requeue buffer {}", old), e))
                .and_then(|()| state.transition(old, Owner::CheckedOut, Owner::Queued));
            if let Err(e) = requeued {
                error!("{}", e);
                shared.abort(&mut state);
                return None;
            }
            state.checked_out = None;
        }

        state.pending = None;
        if let Err(e) = state.transition(index, Owner::Pending, Owner::CheckedOut) {
            error!("{}", e);
            shared.abort(&mut state);
            return None;
        }
        state.checked_out = Some(index);
        let meta = state.meta(index);
        drop(state);

        let region = shared.arena.get(index)?;
        let len = match meta.bytesused as usize {
            0 => region.len(),
            used => used,
        };
        debug!(index, sequence = meta.sequence, "frame checked out");

        Some(Frame {
            // checked out buffers are neither queued nor touched by the acquisition thread
            data: unsafe { region.as_slice(len) },
            format: self.negotiated.format,
            index,
            meta,
        })
    }

    /// Whether a frame is waiting to be picked up
    pub fn is_buffer_available(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    /// Returns the stream statistics
    pub fn status(&self) -> Status {
        let state = self.shared.state.lock();
        Status {
            running: state.stream == StreamState::Running,
            frame_counter: state.frame_counter,
            frame_rate: state.frame_rate,
        }
    }

    /// Returns the state of the stream
    pub fn stream_state(&self) -> StreamState {
        self.shared.state.lock().stream
    }

    /// Returns the owner of every pooled buffer, by index
    pub fn owners(&self) -> Vec<Owner> {
        let state = self.shared.state.lock();
        (0..self.shared.arena.len() as u32)
            .filter_map(|index| state.owner(index))
            .collect()
    }

    /// Registers a callback invoked whenever a frame lands in the empty slot
    ///
    /// Replacing a frame nobody picked up does not invoke it again. The callback runs on the
    /// acquisition thread without the engine lock held. It replaces any earlier registration.
    pub fn set_frame_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.listener.lock() = Some(Arc::new(listener));
    }

    /// Removes the frame listener
    pub fn clear_frame_listener(&self) {
        *self.shared.listener.lock() = None;
    }

    /// Returns a channel that receives a message whenever a frame lands in the empty slot
    ///
    /// The channel holds at most one message; further notifications are dropped until it is
    /// drained. This replaces any registered listener.
    pub fn frame_channel(&self) -> flume::Receiver<()> {
        let (tx, rx) = flume::bounded(1);
        self.set_frame_listener(move || {
            let _ = tx.try_send(());
        });
        rx
    }

    /// Fires the software trigger
    pub fn software_trigger(&self) -> Result<()> {
        trigger::fire(&self.shared.device)
    }

    /// Returns the negotiation results
    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    /// Returns the active format
    pub fn format(&self) -> &Format {
        &self.negotiated.format
    }

    /// Returns the number of pooled buffers
    pub fn buffer_count(&self) -> usize {
        self.shared.arena.len()
    }

    /// Returns the device
    pub fn device(&self) -> &D {
        &self.shared.device
    }
}

impl<D: Device + 'static> Drop for Engine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame checked out of the engine
///
/// The buffer stays with the consumer until the next call to [`Engine::get_new_buffer`], which
/// the borrow on the engine rules out while the frame is alive.
pub struct Frame<'a> {
    data: &'a [u8],
    format: Format,
    index: u32,
    meta: Metadata,
}

impl<'a> Frame<'a> {
    /// Returns the image data
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of bytes of image data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn bytes_per_line(&self) -> u32 {
        self.format.stride
    }

    pub fn fourcc(&self) -> FourCC {
        self.format.fourcc
    }

    /// Returns the index of the buffer in the arena
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the metadata the driver reported for this frame
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .field("format", &self.format)
            .field("meta", &self.meta)
            .finish()
    }
}

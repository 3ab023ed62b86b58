use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use parking_lot::MutexGuard;
use tracing::{debug, error, trace};

use crate::device::Device;
use crate::engine::state::{Owner, State, StreamState};
use crate::engine::{wait, Shared};
use crate::error::{Error, Result};

/// Body of the acquisition thread
///
/// Whatever ends the loop, be it a stop request, an error or a panic, the stream is torn down
/// and the state ends up as [`StreamState::Stopped`].
pub(crate) fn run<D: Device>(shared: &Shared<D>) {
    match panic::catch_unwind(AssertUnwindSafe(|| acquire(shared))) {
        Ok(Ok(())) => debug!("acquisition loop finished"),
        Ok(Err(e)) => error!("acquisition stopped: {}", e),
        Err(payload) => error!("acquisition loop panicked: {}", panic_message(&*payload)),
    }

    let mut state = shared.state.lock();
    state.reset();
    if let Err(e) = shared.device.stream_off(shared.arena.queue().typ) {
        error!("cannot stop streaming: {}", e);
    }
    state.stream = StreamState::Stopped;
}

fn acquire<D: Device>(shared: &Shared<D>) -> Result<()> {
    let mut state = shared.state.lock();

    // do not touch the queue before stream-on went through
    while state.stream == StreamState::Running && !state.streaming {
        shared.gate.wait(&mut state);
    }

    while state.stream == StreamState::Running {
        let ready = MutexGuard::unlocked(&mut state, || {
            wait::wait(shared.device.fd(), &shared.cancel, shared.timeout)
        });
        if state.stream != StreamState::Running {
            break;
        }
        let ready = ready.map_err(|source| Error::Wait { source })?;
        if ready.cancelled {
            trace!("cancellation signalled");
        }
        let now = Instant::now();

        let mut notify = false;
        if ready.device {
            notify = dequeue(shared, &mut state, now)?;
        }

        state.times.trim();
        if let Some(rate) = state.times.rate(now) {
            state.frame_rate = rate;
        }

        if notify {
            MutexGuard::unlocked(&mut state, || shared.notify());
        }
    }

    Ok(())
}

/// Takes one completed buffer into the latest-frame slot
///
/// Returns whether the slot went from empty to occupied.
fn dequeue<D: Device>(shared: &Shared<D>, state: &mut State, now: Instant) -> Result<bool> {
    let queue = shared.arena.queue();
    let buf = match shared.device.dequeue(queue) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
        Err(e) => return Err(Error::streaming("cannot dequeue buffer", e)),
    };

    let index = shared.arena.resolve(&buf).ok_or_else(|| {
        Error::InvariantViolation(format!(
            "driver returned unknown buffer (index {}, address {:?})",
            buf.index, buf.userptr
        ))
    })?;
    state.transition(index, Owner::Queued, Owner::Pending)?;
    state.set_meta(index, buf.meta);

    state.frame_counter += 1;
    state.times.push(now);
    trace!(
        index,
        sequence = buf.meta.sequence,
        bytes = buf.meta.bytesused,
        "frame completed"
    );

    match state.pending.replace(index) {
        Some(older) => {
            // latest wins: the consumer never saw the older frame
            shared
                .device
                .queue(queue, older, shared.arena.userptr(older))
                .map_err(|e| Error::streaming(format!("cannot requeue buffer {}", older), e))?;
            state.transition(older, Owner::Pending, Owner::Queued)?;
            trace!(index = older, "dropped superseded frame");
            Ok(false)
        }
        None => Ok(true),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}

use std::os::raw::c_int;
use std::{io, time};

/// Cancellation channel of the acquisition loop
///
/// A non-blocking eventfd. Signalling makes it readable until it is drained, so a stop request
/// issued before the loop starts waiting is not lost.
pub struct EventFd {
    fd: c_int,
}

impl EventFd {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(EventFd { fd })
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }

    pub fn signal(&self) -> io::Result<()> {
        let one: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &one as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Clears pending signals
    pub fn drain(&self) {
        let mut value: u64 = 0;
        // a single read resets the counter; EAGAIN means there was nothing to clear
        unsafe {
            libc::read(
                self.fd,
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        if unsafe { libc::close(self.fd) } == -1 {
            tracing::error!("cannot close eventfd: {}", io::Error::last_os_error());
        }
    }
}

/// Outcome of a readiness wait
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Ready {
    pub device: bool,
    pub cancelled: bool,
}

/// Waits until the device has a buffer to dequeue, cancellation is signalled or `timeout`
/// expires
///
/// Being interrupted by a signal counts as a timeout.
pub fn wait(device: c_int, cancel: &EventFd, timeout: time::Duration) -> io::Result<Ready> {
    let mut fds = [
        libc::pollfd {
            fd: device,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: cancel.fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let timeout = timeout.as_millis().min(c_int::MAX as u128) as c_int;

    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Ready::default());
        }
        return Err(err);
    }

    Ok(Ready {
        device: fds[0].revents & (libc::POLLIN | libc::POLLERR) != 0,
        cancelled: fds[1].revents & libc::POLLIN != 0,
    })
}

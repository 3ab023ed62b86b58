//! In-process stand-in for a V4L2 capture device.
//!
//! Buffer memory lives on the heap, readiness is signalled through an eventfd and completions
//! are scripted by the test through [`FakeDevice::complete`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::os::raw::c_int;
use std::ptr::NonNull;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use v4l_capture::buffer::{self, Dequeued, Metadata};
use v4l_capture::capability::Flags;
use v4l_capture::crop::Rect;
use v4l_capture::device::{BufferLayout, Queue};
use v4l_capture::format::Description;
use v4l_capture::{Capabilities, Device, Format, FourCC, IoMethod, Timestamp};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const PAGE: u32 = 4096;

pub fn yuyv() -> FourCC {
    FourCC::new(b"YUYV")
}

pub struct FakeDevice {
    ready: c_int,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    caps: Flags,
    formats: Vec<FourCC>,
    format: Format,
    refuse_format: bool,
    bounds: Rect,
    crop: Rect,
    crops_set: Vec<Rect>,

    grant: Option<u32>,
    fail_query_at: Option<u32>,
    fail_stream_on: bool,
    fail_queue_at: Option<u32>,

    memory: Vec<Box<[u8]>>,
    reserved: u32,
    reserved_memory: Option<IoMethod>,
    mapped: usize,
    unmapped: usize,
    requests: Vec<u32>,

    queued: VecDeque<(u32, Option<usize>)>,
    done: VecDeque<Dequeued>,
    streaming: bool,
    sequence: u32,
    queue_calls: usize,
    double_queued: usize,
    stream_offs: usize,

    controls: Vec<(u32, i32)>,
}

impl FakeDevice {
    /// Single-planar streaming capture device offering YUYV and MJPG
    pub fn new() -> Self {
        let ready = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(ready >= 0, "eventfd: {}", io::Error::last_os_error());

        let mut format = Format::new(WIDTH, HEIGHT, FourCC::new(b"MJPG"));
        format.stride = WIDTH * 2;
        format.size = WIDTH * HEIGHT * 2;

        FakeDevice {
            ready,
            inner: Mutex::new(Inner {
                caps: Flags::VIDEO_CAPTURE | Flags::STREAMING,
                formats: vec![yuyv(), FourCC::new(b"MJPG")],
                format,
                bounds: Rect::new(0, 0, 640, 480),
                crop: Rect::new(0, 0, 640, 480),
                ..Inner::default()
            }),
        }
    }

    pub fn with_caps(self, caps: Flags) -> Self {
        self.inner.lock().caps = caps;
        self
    }

    pub fn with_formats(self, formats: &[&[u8; 4]]) -> Self {
        self.inner.lock().formats = formats.iter().map(|f| FourCC::new(f)).collect();
        self
    }

    pub fn with_planes(self, planes: u32) -> Self {
        self.inner.lock().format.planes = planes;
        self
    }

    pub fn refusing_formats(self) -> Self {
        self.inner.lock().refuse_format = true;
        self
    }

    pub fn granting(self, count: u32) -> Self {
        self.inner.lock().grant = Some(count);
        self
    }

    pub fn failing_query_at(self, index: u32) -> Self {
        self.inner.lock().fail_query_at = Some(index);
        self
    }

    pub fn failing_queue_at(self, index: u32) -> Self {
        self.inner.lock().fail_queue_at = Some(index);
        self
    }

    /// Makes every later queue request for `index` fail
    pub fn fail_queue(&self, index: u32) {
        self.inner.lock().fail_queue_at = Some(index);
    }

    pub fn failing_stream_on(self) -> Self {
        self.inner.lock().fail_stream_on = true;
        self
    }

    /// Completes the oldest queued buffer, returning its index
    pub fn complete(&self) -> Option<u32> {
        let mut inner = self.inner.lock();
        if !inner.streaming {
            return None;
        }
        let (index, userptr) = inner.queued.pop_front()?;
        inner.sequence += 1;
        let sequence = inner.sequence;
        let bytesused = inner.format.size;

        // stamp the frame so the consumer can tell frames apart
        match userptr {
            Some(addr) => unsafe { *(addr as *mut u8) = sequence as u8 },
            None => inner.memory[index as usize][0] = sequence as u8,
        }

        inner.done.push_back(Dequeued {
            index,
            userptr,
            meta: Metadata {
                bytesused,
                flags: buffer::Flags::DONE,
                timestamp: Timestamp::new(i64::from(sequence), 0),
                sequence,
            },
        });
        self.signal();
        Some(index)
    }

    /// Makes the driver report a buffer the application never set up
    pub fn complete_bogus(&self, index: u32, userptr: Option<usize>) {
        let mut inner = self.inner.lock();
        inner.done.push_back(Dequeued {
            index,
            userptr,
            meta: Metadata::default(),
        });
        self.signal();
    }

    fn signal(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.ready, &one as *const u64 as *const libc::c_void, 8);
        }
    }

    fn clear_signal(&self) {
        let mut value: u64 = 0;
        unsafe {
            libc::read(self.ready, &mut value as *mut u64 as *mut libc::c_void, 8);
        }
    }

    pub fn queued(&self) -> Vec<u32> {
        self.inner.lock().queued.iter().map(|(i, _)| *i).collect()
    }

    pub fn queued_userptrs(&self) -> Vec<Option<usize>> {
        self.inner.lock().queued.iter().map(|(_, addr)| *addr).collect()
    }

    pub fn queue_calls(&self) -> usize {
        self.inner.lock().queue_calls
    }

    pub fn double_queued(&self) -> usize {
        self.inner.lock().double_queued
    }

    pub fn streaming(&self) -> bool {
        self.inner.lock().streaming
    }

    pub fn stream_offs(&self) -> usize {
        self.inner.lock().stream_offs
    }

    pub fn reserved(&self) -> u32 {
        self.inner.lock().reserved
    }

    pub fn requests(&self) -> Vec<u32> {
        self.inner.lock().requests.clone()
    }

    pub fn mapped(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.mapped, inner.unmapped)
    }

    pub fn crops_set(&self) -> Vec<Rect> {
        self.inner.lock().crops_set.clone()
    }

    pub fn controls(&self) -> Vec<(u32, i32)> {
        self.inner.lock().controls.clone()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.ready);
        }
    }
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl Device for FakeDevice {
    fn fd(&self) -> c_int {
        self.ready
    }

    fn query_caps(&self) -> io::Result<Capabilities> {
        let mut caps = Capabilities::new(self.inner.lock().caps);
        caps.driver = "fake".to_string();
        caps.card = "Fake Camera".to_string();
        Ok(caps)
    }

    fn enum_format(&self, _typ: buffer::Type, index: u32) -> io::Result<Option<Description>> {
        let inner = self.inner.lock();
        Ok(inner
            .formats
            .get(index as usize)
            .map(|fourcc| Description::new(index, *fourcc, "fake format")))
    }

    fn crop_bounds(&self, _typ: buffer::Type) -> io::Result<Rect> {
        Ok(self.inner.lock().bounds)
    }

    fn crop(&self, _typ: buffer::Type) -> io::Result<Rect> {
        Ok(self.inner.lock().crop)
    }

    fn set_crop(&self, _typ: buffer::Type, rect: Rect) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.crop = rect;
        inner.crops_set.push(rect);
        Ok(())
    }

    fn format(&self, _typ: buffer::Type) -> io::Result<Format> {
        Ok(self.inner.lock().format)
    }

    fn set_format(&self, _typ: buffer::Type, fourcc: FourCC) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if !inner.refuse_format {
            inner.format.fourcc = fourcc;
        }
        Ok(())
    }

    fn request_buffers(&self, queue: Queue, count: u32) -> io::Result<u32> {
        let mut inner = self.inner.lock();
        inner.requests.push(count);
        if inner.streaming {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }

        let granted = inner.grant.map_or(count, |grant| grant.min(count));
        let len = inner.format.size.max(1) as usize;
        inner.memory = (0..granted).map(|_| vec![0u8; len].into_boxed_slice()).collect();
        inner.reserved = granted;
        inner.reserved_memory = Some(queue.memory);
        inner.queued.clear();
        inner.done.clear();
        Ok(granted)
    }

    fn query_buffer(&self, _queue: Queue, index: u32) -> io::Result<BufferLayout> {
        let inner = self.inner.lock();
        if inner.fail_query_at == Some(index) || index >= inner.reserved {
            return Err(einval());
        }
        Ok(BufferLayout {
            offset: index * PAGE,
            length: inner.memory[index as usize].len() as u32,
        })
    }

    fn queue(&self, queue: Queue, index: u32, userptr: Option<(usize, usize)>) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.queue_calls += 1;
        if inner.fail_queue_at == Some(index) {
            return Err(einval());
        }
        if index >= inner.reserved {
            return Err(einval());
        }
        if inner.queued.iter().any(|(i, _)| *i == index)
            || inner.done.iter().any(|buf| buf.index == index)
        {
            inner.double_queued += 1;
            return Err(einval());
        }
        match (queue.memory, userptr) {
            (IoMethod::UserPtr, None) | (IoMethod::Mmap, Some(_)) => return Err(einval()),
            _ => {}
        }
        inner.queued.push_back((index, userptr.map(|(addr, _)| addr)));
        Ok(())
    }

    fn dequeue(&self, _queue: Queue) -> io::Result<Dequeued> {
        let mut inner = self.inner.lock();
        let buf = inner
            .done
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        if inner.done.is_empty() {
            self.clear_signal();
        }
        Ok(buf)
    }

    fn stream_on(&self, _typ: buffer::Type) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_stream_on {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        inner.streaming = true;
        Ok(())
    }

    fn stream_off(&self, _typ: buffer::Type) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.streaming = false;
        inner.stream_offs += 1;
        inner.queued.clear();
        inner.done.clear();
        self.clear_signal();
        Ok(())
    }

    unsafe fn map(&self, offset: u32, len: usize) -> io::Result<NonNull<u8>> {
        let mut inner = self.inner.lock();
        let index = (offset / PAGE) as usize;
        let mem = inner.memory.get_mut(index).ok_or_else(einval)?;
        if mem.len() != len {
            return Err(einval());
        }
        let ptr = NonNull::new(mem.as_mut_ptr()).ok_or_else(einval)?;
        inner.mapped += 1;
        Ok(ptr)
    }

    unsafe fn unmap(&self, _ptr: NonNull<u8>, _len: usize) -> io::Result<()> {
        self.inner.lock().unmapped += 1;
        Ok(())
    }

    fn set_control(&self, id: u32, value: i32) -> io::Result<()> {
        self.inner.lock().controls.push((id, value));
        Ok(())
    }
}

/// Polls `cond` until it holds or `timeout` expires
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::process::extract::{Extractor, Frame, FrameInfo};
use crate::process::{ExtractorConfig, POLL_THRESHOLD};

/// An [`Extractor`] shared between one producer and one consumer thread.
///
/// Every operation takes the same lock, so the buffer, the timestamp queue
/// and the cached frame state are always observed together. Writes and
/// consumption notify a condition variable, which lets either side sleep
/// with a bounded timeout instead of spinning.
#[derive(Debug, Clone, Default)]
pub struct SharedExtractor {
    inner: Arc<(Mutex<Extractor>, Condvar)>,
}

impl SharedExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            inner: Arc::new((Mutex::new(Extractor::new(config)), Condvar::new())),
        }
    }

    /// Exclusive access, e.g. to borrow the current frame without copying.
    pub fn lock(&self) -> MutexGuard<'_, Extractor> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side: appends a chunk, `false` when it does not fit yet.
    pub fn write(&self, bytes: &[u8], pts: Option<u64>) -> bool {
        let appended = self.lock().append(bytes, pts);
        if appended {
            self.inner.1.notify_all();
        }
        appended
    }

    /// Consumer side: discards the first `length` bytes after use.
    pub fn acknowledge_consumed(&self, length: usize, retain_pts: bool) {
        self.lock().shrink(length, retain_pts);
        self.inner.1.notify_all();
    }

    pub fn reset(&self) {
        self.lock().reset();
        self.inner.1.notify_all();
    }

    pub fn free_space(&self) -> usize {
        self.lock().free_space()
    }

    /// Whether the producer should write now rather than wait for the
    /// consumer to drain the buffer.
    pub fn poll(&self) -> bool {
        self.free_space() > POLL_THRESHOLD
    }

    pub fn front_pts(&self) -> Option<u64> {
        self.lock().front_pts()
    }

    pub fn info(&self) -> FrameInfo {
        self.lock().info()
    }

    /// Owned copy of the current frame, valid after the lock is released.
    pub fn current_frame(&self) -> Option<Frame> {
        self.lock().to_frame()
    }

    pub fn recycle(&self, frame: Frame) {
        self.lock().recycle(frame);
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.lock().skipped_bytes()
    }

    /// Wakes every thread blocked in one of the wait functions.
    pub fn notify(&self) {
        self.inner.1.notify_all();
    }

    /// Blocks until a notification arrives or `timeout` passes.
    pub fn wait(&self, timeout: Duration) {
        let guard = self.lock();
        let _guard = self
            .inner
            .1
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocks until a complete frame is buffered, a notification arrives or
    /// `timeout` passes. Returns whether a frame is available.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let mut guard = self.lock();
        if !guard.is_empty() {
            return true;
        }

        guard = self
            .inner
            .1
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        !guard.is_empty()
    }

    /// Blocks until `length` bytes fit, a notification arrives or `timeout`
    /// passes. Returns whether they fit.
    pub fn wait_for_space(&self, length: usize, timeout: Duration) -> bool {
        let mut guard = self.lock();
        if guard.free_space() >= length {
            return true;
        }

        guard = self
            .inner
            .1
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        guard.free_space() >= length
    }
}

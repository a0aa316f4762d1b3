use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Pool of reusable byte buffers for owned frame copies.
///
/// [`Extractor::to_frame`](crate::process::extract::Extractor::to_frame)
/// copies the current frame out of the synchronizer so it survives the next
/// mutation. Consumers that hand the bytes back with [`FramePool::release`]
/// keep the steady state allocation free.
#[derive(Debug, Clone)]
pub struct FramePool {
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
    max_buffers: usize,
    frame_capacity: usize,
}

impl FramePool {
    /// * `max_buffers` - Maximum number of idle buffers kept
    /// * `frame_capacity` - Initial capacity of newly allocated buffers
    pub fn new(max_buffers: usize, frame_capacity: usize) -> Self {
        Self {
            pool: Arc::new(Mutex::new(VecDeque::with_capacity(max_buffers))),
            max_buffers,
            frame_capacity,
        }
    }

    /// Takes an idle buffer, or allocates one, and fills it with `data`.
    pub fn acquire_copy(&self, data: &[u8]) -> Vec<u8> {
        let mut buffer = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Vec::with_capacity(self.frame_capacity.max(data.len())));

        buffer.extend_from_slice(data);
        buffer
    }

    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();

        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < self.max_buffers {
            pool.push_back(buffer);
        }
    }

    pub fn idle(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for FramePool {
    /// Large enough for the biggest DTS core frame.
    fn default() -> Self {
        Self::new(16, 16 * 1024)
    }
}

#[test]
fn pool_reuses_released_buffers() {
    let pool = FramePool::new(1, 8);

    let first = pool.acquire_copy(&[1, 2, 3]);
    assert_eq!(first, [1, 2, 3]);
    let capacity = first.capacity();

    pool.release(first);
    pool.release(vec![9; 4]);
    assert_eq!(pool.idle(), 1);

    let second = pool.acquire_copy(&[4]);
    assert_eq!(second, [4]);
    assert_eq!(second.capacity(), capacity);
    assert_eq!(pool.idle(), 0);
}

use std::collections::VecDeque;

use log::trace;

use crate::process::PADDING;

/// Timing of one appended chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtsRecord {
    /// `None` once the chunk start has been cut away.
    pub pts: Option<u64>,
    pub length: usize,
}

/// Fixed-capacity byte buffer with per-chunk timestamps.
///
/// Storage is allocated once. The `PADDING` bytes after the valid data are
/// always zero, so header checks near the end of the data never read stale
/// bytes. The lengths in the PTS queue always sum up to [`len`](Self::len).
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8]>,
    size: usize,
    pts_queue: VecDeque<PtsRecord>,
}

impl FrameBuffer {
    /// `capacity` includes the padding tail.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(PADDING)].into_boxed_slice(),
            size: 0,
            pts_queue: VecDeque::new(),
        }
    }

    /// Appends `bytes` as one chunk starting at `pts`.
    ///
    /// Returns `false` and leaves the buffer untouched when the chunk does
    /// not fit; the caller has to retry once the consumer made room.
    pub fn append(&mut self, bytes: &[u8], pts: Option<u64>) -> bool {
        if self.size + bytes.len() + PADDING > self.data.len() {
            return false;
        }
        if bytes.is_empty() {
            return true;
        }

        self.data[self.size..self.size + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        self.zero_padding();

        self.pts_queue.push_back(PtsRecord {
            pts,
            length: bytes.len(),
        });

        true
    }

    /// Discards the first `length` bytes.
    ///
    /// A chunk cut in the middle keeps its timestamp only with `retain_pts`;
    /// otherwise it no longer marks the start of the remaining bytes.
    pub fn shrink(&mut self, length: usize, retain_pts: bool) {
        if length >= self.size {
            self.reset();
            return;
        }

        self.data.copy_within(length..self.size, 0);
        self.size -= length;
        self.zero_padding();

        let mut remaining = length;
        while remaining > 0 {
            let Some(front) = self.pts_queue.front_mut() else {
                break;
            };

            if front.length <= remaining {
                remaining -= front.length;
                self.pts_queue.pop_front();
            } else {
                if !retain_pts {
                    front.pts = None;
                }
                front.length -= remaining;
                remaining = 0;
            }
        }

        trace!(
            "Shrunk by {length} bytes, {} left in {} chunks",
            self.size,
            self.pts_queue.len()
        );
    }

    pub fn reset(&mut self) {
        self.size = 0;
        self.pts_queue.clear();
        self.zero_padding();
    }

    pub fn front_pts(&self) -> Option<u64> {
        self.pts_queue.front().and_then(|record| record.pts)
    }

    pub fn free_space(&self) -> usize {
        self.data.len().saturating_sub(self.size + PADDING)
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Bytes from `offset` to the end of the zeroed padding.
    pub fn padded(&self, offset: usize) -> &[u8] {
        &self.data[offset.min(self.size)..self.size + PADDING]
    }

    pub fn pts_records(&self) -> impl Iterator<Item = &PtsRecord> {
        self.pts_queue.iter()
    }

    fn zero_padding(&mut self) {
        self.data[self.size..self.size + PADDING].fill(0);
    }
}

//! Presentation timestamp arithmetic.
//!
//! PTS values carried in PES headers count a 90 kHz clock in 33 bits and
//! wrap around roughly every 26.5 hours.

use log::trace;

/// PTS clock frequency.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// Mask of the 33 significant PTS bits.
pub const PTS_MASK: u64 = (1 << 33) - 1;

/// Duration of `samples` samples at `sampling_rate`, in PTS ticks.
pub fn samples_to_ticks(samples: u32, sampling_rate: u32) -> u64 {
    if sampling_rate == 0 {
        return 0;
    }
    samples as u64 * PTS_CLOCK_HZ / sampling_rate as u64
}

/// Forward distance from `from` to `to`, accounting for the 33-bit wrap.
pub fn pts_delta(from: u64, to: u64) -> u64 {
    to.wrapping_sub(from) & PTS_MASK
}

pub fn pts_add(pts: u64, ticks: u64) -> u64 {
    pts.wrapping_add(ticks) & PTS_MASK
}

pub fn ticks_to_seconds(ticks: u64) -> f64 {
    ticks as f64 / PTS_CLOCK_HZ as f64
}

/// Fills in timestamps for frames that did not start a PES payload.
///
/// Most PES packets carry several audio frames but only one PTS, and a
/// cleared queue record yields no PTS at all. The tracker extrapolates from
/// the last known timestamp using each frame's duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtsTracker {
    next: Option<u64>,
}

impl PtsTracker {
    /// Returns the timestamp to use for a frame and advances by its duration.
    ///
    /// A carried `pts` always wins over the extrapolated value.
    pub fn update(&mut self, pts: Option<u64>, duration_ticks: u64) -> Option<u64> {
        let current = match (pts, self.next) {
            (Some(pts), Some(expected)) => {
                if pts != expected {
                    trace!("PTS discontinuity: expected {expected}, got {pts}");
                }
                Some(pts & PTS_MASK)
            }
            (Some(pts), None) => Some(pts & PTS_MASK),
            (None, expected) => expected,
        };

        self.next = current.map(|pts| pts_add(pts, duration_ticks));
        current
    }

    pub fn reset(&mut self) {
        self.next = None;
    }
}

#[test]
fn pts_arithmetic() {
    assert_eq!(samples_to_ticks(1152, 48_000), 2160);
    assert_eq!(samples_to_ticks(1536, 48_000), 2880);
    assert_eq!(samples_to_ticks(1024, 0), 0);

    assert_eq!(pts_delta(PTS_MASK - 9, 10), 20);
    assert_eq!(pts_add(PTS_MASK, 1), 0);
}

#[test]
fn pts_tracker_interpolates() {
    let mut tracker = PtsTracker::default();

    assert_eq!(tracker.update(None, 2880), None);
    assert_eq!(tracker.update(Some(1000), 2880), Some(1000));
    assert_eq!(tracker.update(None, 2880), Some(3880));
    assert_eq!(tracker.update(Some(9000), 2880), Some(9000));
    assert_eq!(tracker.update(None, 2880), Some(11880));

    tracker.reset();
    assert_eq!(tracker.update(None, 2880), None);
}

//! Data structures and header detectors for the supported bitstream formats.
//!
//! Each audio format module exposes a `fast_check` over the first four bytes
//! and a `read_header` that decodes and validates the full sync header. The
//! [`codec`] module ties them together in a priority-ordered table.

pub mod ac3;
pub mod adts;
pub mod codec;
pub mod dts;
pub mod latm;
pub mod mpeg;
pub mod pes;

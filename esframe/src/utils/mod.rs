//! Utility functions and supporting infrastructure.
//!
//! Provides header bit reading, error types, PTS clock helpers and buffer
//! reuse for owned frame copies.

pub mod bitstream_io;
pub mod buffer_pool;
pub mod errors;
pub mod timing;

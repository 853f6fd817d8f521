//! Utility functions and supporting infrastructure.
//!
//! Provides bit-level I/O for header probing and the error types shared
//! by every processing stage.

pub mod bitstream_io;
pub mod errors;

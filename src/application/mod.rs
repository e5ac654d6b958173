//! Application-level error model shared by handlers and the binary.

pub mod error;

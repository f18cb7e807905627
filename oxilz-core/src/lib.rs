//! # OxiLz Core
//!
//! Core components for the OxiLz compression library.
//!
//! This crate provides the building blocks shared by the codec crates:
//!
//! - [`ringbuffer`]: sliding window buffer backing the codec dictionaries
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! OxiLz is layered: codec crates such as `oxilz-lzma` implement entropy
//! coding and operation loops on top of the window and error primitives in
//! this crate.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Codec                                                   │
//! │     range coder, probability models, operation loops    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     RingBuffer, errors                                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxilz_core::ringbuffer::RingBuffer;
//!
//! let mut window = RingBuffer::new(4096);
//! window.write_bytes(b"abc");
//! assert_eq!(window.read_at_distance(3).unwrap(), b'a');
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod ringbuffer;

// Re-exports for convenience
pub use error::{OxiLzError, Result};
pub use ringbuffer::RingBuffer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{OxiLzError, Result};
    pub use crate::ringbuffer::RingBuffer;
}

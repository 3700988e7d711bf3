//! Output text processing.
//!
//! - [`Utf8ChunkDecoder`] turns raw pipe reads into text chunks without
//!   splitting multi-byte characters across chunk boundaries
//! - [`OutputSanitizer`] strips ANSI escape sequences from captured text
//!
//! # Example
//!
//! ```
//! use zrun::output::{OutputSanitizer, Utf8ChunkDecoder};
//!
//! let mut decoder = Utf8ChunkDecoder::new();
//! let bytes = "héllo".as_bytes();
//! let first = decoder.decode(&bytes[..2]);
//! let second = decoder.decode(&bytes[2..]);
//! assert_eq!(format!("{first}{second}"), "héllo");
//!
//! assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31mRed\x1b[0m"), "Red");
//! ```

mod decoder;
mod sanitizer;

pub use decoder::Utf8ChunkDecoder;
pub use sanitizer::OutputSanitizer;

//! Image upload handling
//!
//! Validates single-image submissions before any storage or recognition
//! work begins.

mod types;
mod validation;

pub use types::*;
pub use validation::UploadPolicy;

#[cfg(test)]
pub(crate) use validation::tests::{jpeg_bytes, png_bytes};

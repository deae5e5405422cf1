mod client;
mod error;

pub use client::{CoverClient, CoverImage};
pub use error::{CoverError, Result};

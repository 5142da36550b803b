//! treesync - Core traits, types, and constants.
//!
//! This module provides the foundational types shared by every layer:
//! protocol defaults, the error taxonomy and the external-collaborator seams.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;

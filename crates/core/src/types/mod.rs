//! Core value types for Emporium.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod size;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use size::{Size, SizeError};
pub use status::*;

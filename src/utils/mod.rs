//! Utility module

mod error;
mod location;

pub use error::{EntityKind, Error, LookupError, Result};
pub use location::{FileLocation, Location};

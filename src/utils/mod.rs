//! Shared utilities

pub mod error;
pub mod token;

pub use error::{StudioError, StudioResult};
pub use token::Token;

//! Account security: password hashing, access tokens, and code generation.

pub mod codes;
pub mod password;
pub mod token;

pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token role mismatch: expected {expected}, got {actual}")]
    WrongRole { expected: String, actual: String },
}

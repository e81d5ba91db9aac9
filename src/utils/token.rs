//! Registration tokens
//!
//! Tokens identify event handlers and frame subscriptions. They are random
//! strings, checked against the owner's live set before being handed out.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    /// Generate a token not rejected by `is_taken`
    pub fn generate(is_taken: impl Fn(&Token) -> bool) -> Self {
        loop {
            let candidate = Token(Uuid::new_v4().simple().to_string());
            if !is_taken(&candidate) {
                return candidate;
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

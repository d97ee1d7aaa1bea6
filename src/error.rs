//! Error types for asm-sync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API call '{operation}' failed {tries} times, try again later")]
    RetriesExhausted { operation: String, tries: u32 },

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    #[error("{program} failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("Invalid geolocation row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("Invalid filter '{0}': expected KEY=VALUE with KEY in ANY, COUNTRY_CODE, COUNTRY_NAME, REGION, CITY")]
    InvalidFilter(String),
}

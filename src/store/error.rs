//! Store-specific error types.

use thiserror::Error;

/// Errors raised while projecting a snapshot into series.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value field could not be read as a number.
    #[error("cannot coerce field '{field}' value '{value}' of series '{series}' to a number")]
    Coercion {
        /// Series being emitted.
        series: String,
        /// Record field holding the value.
        field: String,
        /// Offending value, rendered as text.
        value: String,
    },
}

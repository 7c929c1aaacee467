use thiserror::Error;

/// The two failure kinds the quoting core can produce.
///
/// `InvalidInput` is recoverable: the conversation re-prompts for the field
/// and does not advance. `MissingTableEntry` means a fee table shipped without
/// a required row; the request fails but the process keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("no {table} entry for key {key}")]
    MissingTableEntry { table: &'static str, key: String },
}

impl QuoteError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

use thiserror::Error;

use crate::message::MessageId;

/// Errors from ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Rejected before any state change (non-positive amount, missing field).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The amount key is already indexed to another record. Unreachable when
    /// amounts come from the generator under the store lock.
    #[error("amount {amount} is already assigned to message {existing}")]
    DuplicateAmount { amount: String, existing: MessageId },

    #[error("no free amount for base {base} after {attempts} attempts")]
    GenerationExhausted { base: String, attempts: u32 },

    #[error("transfer source unavailable: {0}")]
    TransientUpstreamFailure(String),

    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("message {id} already confirmed by transfer {transfer_ref}")]
    AlreadyConfirmed { id: MessageId, transfer_ref: String },
}

impl LedgerError {
    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationExhausted { .. } | Self::TransientUpstreamFailure(_)
        )
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::LedgerError;

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 64;
/// Longest accepted message body, in characters.
pub const MAX_TEXT_CHARS: usize = 500;

/// Unique identifier for a donation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new_random() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A viewer's donation intent.
///
/// Everything except the confirmation fields is fixed at creation. The
/// `exact_amount` is the only link between this record and the on-chain
/// payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub display_name: String,
    pub text: String,
    /// What the viewer picked. Display only.
    pub base_amount: Amount,
    pub exact_amount: Amount,
    pub streamer_address: String,
    pub created_at: DateTime<Utc>,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a pending record, validating the viewer-supplied fields.
    pub fn new_pending(
        display_name: &str,
        text: &str,
        base_amount: Amount,
        exact_amount: Amount,
        streamer_address: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let (display_name, text) = validate_fields(display_name, text)?;
        let streamer_address = crate::streamer::normalize_address(streamer_address)?;
        Ok(Self {
            id: MessageId::new_random(),
            display_name,
            text,
            base_amount,
            exact_amount,
            streamer_address,
            created_at,
            confirmed: false,
            transfer_ref: None,
            confirmed_at: None,
        })
    }

    pub fn amount_key(&self) -> String {
        self.exact_amount.key()
    }

    pub fn is_pending(&self) -> bool {
        !self.confirmed
    }
}

/// Trim and bound-check the viewer-supplied fields.
pub fn validate_fields(display_name: &str, text: &str) -> Result<(String, String), LedgerError> {
    Ok((
        required_field("name", display_name, MAX_NAME_CHARS)?,
        required_field("message", text, MAX_TEXT_CHARS)?,
    ))
}

fn required_field(name: &str, value: &str, max_chars: usize) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(format!("{name} is required")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(LedgerError::InvalidInput(format!(
            "{name} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Hex digits in a full-length Sui address.
pub const ADDRESS_HEX_LEN: usize = 64;

/// Upper bound on an uploaded QR code image (the data URL as sent).
pub const MAX_QR_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Canonical form of a Sui address: `0x` followed by 64 lowercase hex digits.
///
/// Short forms such as `0x2` are left-padded with zeros, so the same account
/// always compares equal no matter how it was typed.
pub fn normalize_address(address: &str) -> Result<String, LedgerError> {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| {
            LedgerError::InvalidInput(format!("address '{trimmed}' must start with 0x"))
        })?;
    if hex.is_empty() || hex.len() > ADDRESS_HEX_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "address '{trimmed}' must have 1 to {ADDRESS_HEX_LEN} hex digits"
        )));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(LedgerError::InvalidInput(format!(
            "address '{trimmed}' is not hexadecimal"
        )));
    }
    Ok(format!("0x{:0>width$}", hex.to_ascii_lowercase(), width = ADDRESS_HEX_LEN))
}

/// Streamer-facing settings: where to pay, plus an optional wallet QR code
/// shown to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerProfile {
    pub address: String,
    /// `data:image/...` URL as uploaded by the streamer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_image: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StreamerProfile {
    pub fn new(
        address: &str,
        qr_code_image: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let address = normalize_address(address)?;
        let qr_code_image = match qr_code_image {
            Some(image) if image.trim().is_empty() => None,
            Some(image) => Some(validate_qr_image(image)?),
            None => None,
        };
        Ok(Self {
            address,
            qr_code_image,
            updated_at,
        })
    }
}

fn validate_qr_image(image: String) -> Result<String, LedgerError> {
    if image.len() > MAX_QR_IMAGE_BYTES {
        return Err(LedgerError::InvalidInput(
            "QR code image must be 5MB or smaller".to_string(),
        ));
    }
    if !image.starts_with("data:image/") {
        return Err(LedgerError::InvalidInput(
            "QR code must be an image data URL".to_string(),
        ));
    }
    Ok(image)
}

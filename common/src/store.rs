use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::message::{Message, MessageId};

/// The pending-message ledger plus its amount index.
///
/// Amount keys of confirmed records stay in the index: a confirmed amount is
/// retired rather than released, so a late or replayed transfer for it can
/// never confirm a newer message.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: HashMap<MessageId, Message>,
    amount_index: HashMap<String, MessageId>,
    /// Confirmation order, oldest first.
    confirmed_order: Vec<MessageId>,
    used_transfer_refs: HashMap<String, MessageId>,
}

/// Serializable image of a [`MessageStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub messages: Vec<Message>,
    pub confirmed_order: Vec<MessageId>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed_order.len()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.len() - self.confirmed_order.len()
    }

    /// Register a pending record under its id and amount key.
    pub fn insert(&mut self, message: Message) -> Result<(), LedgerError> {
        if message.confirmed {
            return Err(LedgerError::InvalidInput(format!(
                "message {} is already confirmed",
                message.id
            )));
        }
        if self.messages.contains_key(&message.id) {
            return Err(LedgerError::InvalidInput(format!(
                "message {} already exists",
                message.id
            )));
        }
        let key = message.amount_key();
        if let Some(existing) = self.amount_index.get(&key) {
            return Err(LedgerError::DuplicateAmount {
                amount: key,
                existing: *existing,
            });
        }
        self.amount_index.insert(key, message.id);
        self.messages.insert(message.id, message);
        Ok(())
    }

    pub fn is_amount_taken(&self, key: &str) -> bool {
        self.amount_index.contains_key(key)
    }

    pub fn is_transfer_used(&self, transfer_ref: &str) -> bool {
        self.used_transfer_refs.contains_key(transfer_ref)
    }

    pub fn find_by_amount(&self, key: &str) -> Option<&Message> {
        self.amount_index
            .get(key)
            .and_then(|id| self.messages.get(id))
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    /// Mark a record confirmed by `transfer_ref`.
    ///
    /// Returns `Ok(true)` when the record flipped to confirmed and `Ok(false)`
    /// when it was already confirmed by the same transfer.
    pub fn confirm(
        &mut self,
        id: &MessageId,
        transfer_ref: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let message = self
            .messages
            .get_mut(id)
            .ok_or(LedgerError::NotFound(*id))?;

        if message.confirmed {
            return match message.transfer_ref.as_deref() {
                Some(existing) if existing == transfer_ref => Ok(false),
                existing => Err(LedgerError::AlreadyConfirmed {
                    id: *id,
                    transfer_ref: existing.unwrap_or_default().to_string(),
                }),
            };
        }
        if let Some(other) = self.used_transfer_refs.get(transfer_ref) {
            return Err(LedgerError::AlreadyConfirmed {
                id: *other,
                transfer_ref: transfer_ref.to_string(),
            });
        }

        message.confirmed = true;
        message.transfer_ref = Some(transfer_ref.to_string());
        message.confirmed_at = Some(confirmed_at);
        self.used_transfer_refs.insert(transfer_ref.to_string(), *id);
        self.confirmed_order.push(*id);
        Ok(true)
    }

    /// Confirmed records in confirmation order, optionally for one streamer.
    pub fn list_confirmed(&self, streamer_address: Option<&str>) -> Vec<Message> {
        self.confirmed_order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .filter(|m| streamer_address.map_or(true, |a| m.streamer_address == a))
            .cloned()
            .collect()
    }

    /// Pending records, oldest first.
    pub fn list_pending(&self, streamer_address: Option<&str>) -> Vec<Message> {
        let mut pending: Vec<Message> = self
            .messages
            .values()
            .filter(|m| m.is_pending())
            .filter(|m| streamer_address.map_or(true, |a| m.streamer_address == a))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut messages: Vec<Message> = self.messages.values().cloned().collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        StoreSnapshot {
            messages,
            confirmed_order: self.confirmed_order.clone(),
        }
    }

    /// Rebuild a store from a snapshot, re-checking every index invariant.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, LedgerError> {
        let mut store = Self::new();
        let mut confirmed: HashMap<MessageId, Message> = HashMap::new();

        for message in snapshot.messages {
            if message.confirmed {
                let key = message.amount_key();
                if let Some(existing) = store.amount_index.get(&key) {
                    return Err(LedgerError::DuplicateAmount {
                        amount: key,
                        existing: *existing,
                    });
                }
                if store.messages.contains_key(&message.id)
                    || confirmed.insert(message.id, message.clone()).is_some()
                {
                    return Err(LedgerError::InvalidInput(format!(
                        "message {} appears twice in snapshot",
                        message.id
                    )));
                }
                store.amount_index.insert(key, message.id);
            } else {
                store.insert(message)?;
            }
        }

        for id in &snapshot.confirmed_order {
            let message = confirmed.remove(id).ok_or_else(|| {
                LedgerError::InvalidInput(format!(
                    "confirmed order references unknown or pending message {id}"
                ))
            })?;
            let transfer_ref = message.transfer_ref.clone().ok_or_else(|| {
                LedgerError::InvalidInput(format!("confirmed message {id} has no transfer ref"))
            })?;
            if store.used_transfer_refs.insert(transfer_ref, *id).is_some() {
                return Err(LedgerError::InvalidInput(format!(
                    "transfer of message {id} confirms more than one message"
                )));
            }
            store.confirmed_order.push(*id);
            store.messages.insert(*id, message);
        }

        if let Some(id) = confirmed.keys().next() {
            return Err(LedgerError::InvalidInput(format!(
                "confirmed message {id} missing from confirmed order"
            )));
        }
        Ok(store)
    }
}

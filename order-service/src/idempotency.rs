//! Idempotency ledger: maps a caller-supplied key to the order it produced.

use shared::OrderReceipt;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::store::{IdempotencyDraft, OrderStore};

pub const MAX_KEY_LEN: usize = 255;

/// Result previously returned for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorOrder {
    pub order_id: Uuid,
    pub receipt: OrderReceipt,
}

/// Trims the raw header value. Blank means no idempotency was requested.
pub fn normalize_key(raw: Option<&str>) -> OrderResult<Option<String>> {
    let Some(key) = raw.map(str::trim).filter(|k| !k.is_empty()) else {
        return Ok(None);
    };
    if key.len() > MAX_KEY_LEN {
        return Err(OrderError::validation(format!(
            "idempotency key must be at most {} bytes",
            MAX_KEY_LEN
        )));
    }
    Ok(Some(key.to_string()))
}

pub async fn lookup(store: &dyn OrderStore, key: Option<&str>) -> OrderResult<Option<PriorOrder>> {
    let Some(key) = key else {
        return Ok(None);
    };
    let Some(record) = store.idempotency(key).await? else {
        return Ok(None);
    };

    let receipt: OrderReceipt = serde_json::from_value(record.response)?;
    Ok(Some(PriorOrder {
        order_id: receipt.order.order_id,
        receipt,
    }))
}

/// Stages the ledger entry for `receipt`. It is written by the order
/// transaction and fails the whole unit if the key is already taken.
pub fn record(
    key: Option<String>,
    request_hash: Option<String>,
    receipt: &OrderReceipt,
) -> OrderResult<Option<IdempotencyDraft>> {
    let Some(key) = key else {
        return Ok(None);
    };
    Ok(Some(IdempotencyDraft {
        key,
        request_hash,
        response: serde_json::to_value(receipt)?,
    }))
}

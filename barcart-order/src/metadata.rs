//! Payment-intent metadata carrying the per-store breakdown that later drives
//! post-payment transfers. Provider metadata values are capped at 500
//! characters, so long values are split across `key`, `key_1`, `key_2`, ...
//! when they grow past that.

use barcart_core::{Cents, ShippingAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::StoreGroup;

pub const STORE_BREAKDOWN_KEY: &str = "store_breakdown";
pub const STORE_COUNT_KEY: &str = "store_count";
pub const PLATFORM_FEE_KEY: &str = "platform_fee_cents";
pub const CUSTOMER_EMAIL_KEY: &str = "customer_email";
pub const CUSTOMER_ID_KEY: &str = "customer_id";
pub const SHIPPING_ADDRESS_KEY: &str = "shipping_address";

const MAX_VALUE_CHARS: usize = 500;
/// The address is informational; anything longer is left out of metadata.
const MAX_ADDRESS_CHUNKS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    pub store_id: Option<Uuid>,
    pub total_cents: Cents,
    pub stripe_account_id: Option<String>,
}

impl From<&StoreGroup> for BreakdownEntry {
    fn from(group: &StoreGroup) -> Self {
        Self {
            store_id: group.store_id,
            total_cents: group.total_cents,
            stripe_account_id: group.payout_account_id.clone(),
        }
    }
}

/// Store `value` under `key`, chunked to the provider's value limit.
/// Returns the number of entries written.
pub fn encode_chunked(key: &str, value: &str, metadata: &mut BTreeMap<String, String>) -> usize {
    let chars: Vec<char> = value.chars().collect();
    let mut written = 0;
    for (idx, chunk) in chars.chunks(MAX_VALUE_CHARS).enumerate() {
        let chunk_key = if idx == 0 {
            key.to_string()
        } else {
            format!("{}_{}", key, idx)
        };
        metadata.insert(chunk_key, chunk.iter().collect());
        written += 1;
    }
    written
}

pub fn decode_chunked(key: &str, metadata: &BTreeMap<String, String>) -> Option<String> {
    let mut value = metadata.get(key)?.clone();
    let mut idx = 1;
    while let Some(part) = metadata.get(&format!("{}_{}", key, idx)) {
        value.push_str(part);
        idx += 1;
    }
    Some(value)
}

pub fn encode_breakdown(
    entries: &[BreakdownEntry],
    metadata: &mut BTreeMap<String, String>,
) -> Result<(), serde_json::Error> {
    let json = serde_json::to_string(entries)?;
    encode_chunked(STORE_BREAKDOWN_KEY, &json, metadata);
    metadata.insert(STORE_COUNT_KEY.to_string(), entries.len().to_string());
    Ok(())
}

/// Reassemble the breakdown. Missing metadata yields an empty list.
pub fn decode_breakdown(
    metadata: &BTreeMap<String, String>,
) -> Result<Vec<BreakdownEntry>, serde_json::Error> {
    match decode_chunked(STORE_BREAKDOWN_KEY, metadata) {
        Some(json) => serde_json::from_str(&json),
        None => Ok(Vec::new()),
    }
}

/// Returns false when the address is too long to record.
pub fn encode_shipping_address(
    address: &ShippingAddress,
    metadata: &mut BTreeMap<String, String>,
) -> Result<bool, serde_json::Error> {
    let json = serde_json::to_string(address)?;
    if json.chars().count() > MAX_ADDRESS_CHUNKS * MAX_VALUE_CHARS {
        return Ok(false);
    }
    encode_chunked(SHIPPING_ADDRESS_KEY, &json, metadata);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(total_cents: Cents, account: Option<&str>) -> BreakdownEntry {
        BreakdownEntry {
            store_id: Some(Uuid::new_v4()),
            total_cents,
            stripe_account_id: account.map(String::from),
        }
    }

    #[test]
    fn test_large_breakdown_is_chunked_under_value_limit() {
        let entries: Vec<BreakdownEntry> = (0..12)
            .map(|i| entry(1_000 + i, Some("acct_1NvXyzABCDEF")))
            .collect();
        let mut metadata = BTreeMap::new();
        encode_breakdown(&entries, &mut metadata).unwrap();

        assert!(metadata.contains_key("store_breakdown_1"));
        assert!(metadata.values().all(|v| v.chars().count() <= MAX_VALUE_CHARS));
        assert_eq!(metadata[STORE_COUNT_KEY], "12");
        assert_eq!(decode_breakdown(&metadata).unwrap(), entries);
    }

    #[test]
    fn test_long_shipping_address_is_chunked() {
        let address = ShippingAddress {
            street: Some(barcart_shared::Masked::new("Apartment 4B, ".repeat(60))),
            city: "Austin".to_string(),
            state: "TX".to_string(),
            zip_code: "78701".to_string(),
            country: "US".to_string(),
        };
        let mut metadata = BTreeMap::new();
        assert!(encode_shipping_address(&address, &mut metadata).unwrap());

        assert!(metadata.contains_key("shipping_address_1"));
        assert!(metadata.values().all(|v| v.chars().count() <= MAX_VALUE_CHARS));
        let json = decode_chunked(SHIPPING_ADDRESS_KEY, &metadata).unwrap();
        let decoded: ShippingAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.city, "Austin");
    }

    #[test]
    fn test_oversized_shipping_address_is_left_out() {
        let address = ShippingAddress {
            street: Some(barcart_shared::Masked::new("x".repeat(5_000))),
            ..Default::default()
        };
        let mut metadata = BTreeMap::new();
        assert!(!encode_shipping_address(&address, &mut metadata).unwrap());
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_missing_breakdown_decodes_empty() {
        assert!(decode_breakdown(&BTreeMap::new()).unwrap().is_empty());
    }
}

use serde::{Deserialize, Serialize};

/// Empty-address sentinel used for `tx_to` on contract-creation transactions.
pub const CONTRACT_CREATION_SENTINEL: &str = "";

/// A chain block identified by height (`number`) and content-hash (`hash`).
///
/// At most one row exists per `number` at steady state; a different `hash`
/// at the same `number` is what a reorg looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub time: u64,
    pub parent: String,
    pub stable: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_hash: String,
    pub block_hash: String,
    pub tx_from: String,
    pub tx_to: String,
    pub nonce: u64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Base-10 decimal string, arbitrary precision.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub tx_hash: String,
    pub log_index: i64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Normalizes a hash to lowercase 0x-prefixed form at the RPC ingress
/// boundary, so equality between a stored hash and a freshly-fetched one is
/// a plain string compare (§9, "Hash comparisons").
pub fn normalize_hash(hash: &str) -> String {
    let lower = hash.trim().to_ascii_lowercase();
    if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{lower}")
    }
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_prefix() {
        assert_eq!(normalize_hash("ABCDEF"), "0xabcdef");
        assert_eq!(normalize_hash("0xABCDEF"), "0xabcdef");
        assert_eq!(normalize_hash("0xabcdef"), "0xabcdef");
    }
}

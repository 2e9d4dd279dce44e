//! Keyspace sampling with SCAN, TYPE and MEMORY USAGE

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{ControlPlane, ControlPlaneExt};
use crate::utils::{AssessError, ProtocolError, Result};

/// Largest keys kept per node
const LARGEST_KEYS: usize = 5;

/// Sampling limits
#[derive(Debug, Clone)]
pub struct SampleConfig {
    /// Stop after this many keys
    pub max_keys: usize,
    /// COUNT hint per SCAN call
    pub scan_count: usize,
    /// Optional MATCH pattern
    pub pattern: Option<String>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            max_keys: 1000,
            scan_count: 100,
            pattern: None,
        }
    }
}

/// Size statistics for one data type
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    pub keys: u64,
    /// Keys with a MEMORY USAGE reading
    pub sized_keys: u64,
    pub total_bytes: u64,
    pub min_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl TypeStats {
    fn record(&mut self, bytes: Option<u64>) {
        self.keys += 1;
        if let Some(b) = bytes {
            self.sized_keys += 1;
            self.total_bytes += b;
            self.min_bytes = Some(self.min_bytes.map_or(b, |m| m.min(b)));
            self.max_bytes = Some(self.max_bytes.map_or(b, |m| m.max(b)));
        }
    }

    pub fn avg_bytes(&self) -> Option<f64> {
        if self.sized_keys == 0 {
            None
        } else {
            Some(self.total_bytes as f64 / self.sized_keys as f64)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampledKey {
    pub key: String,
    pub key_type: String,
    pub bytes: u64,
}

/// Sample of one node's keyspace
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyspaceSample {
    pub address: String,
    pub keys_sampled: usize,
    pub scan_calls: usize,
    /// SCAN returned cursor 0 before the key limit
    pub complete: bool,
    pub memory_usage_available: bool,
    pub by_type: BTreeMap<String, TypeStats>,
    pub largest: Vec<SampledKey>,
}

/// MEMORY USAGE refused by the server (disabled, renamed, or not permitted)
fn memory_usage_refused(err: &AssessError) -> bool {
    matches!(err, AssessError::Protocol(ProtocolError::Server(_)))
}

/// Sample up to `max_keys` keys of one node
pub fn sample_keyspace<C: ControlPlane + ?Sized>(
    conn: &mut C,
    address: &str,
    config: &SampleConfig,
) -> Result<KeyspaceSample> {
    let mut sample = KeyspaceSample {
        address: address.to_string(),
        memory_usage_available: true,
        ..Default::default()
    };
    let count = config.scan_count.max(1);
    let mut cursor = 0u64;

    'scan: loop {
        let (next, keys) = conn.scan(cursor, config.pattern.as_deref(), count)?;
        sample.scan_calls += 1;

        for key in keys {
            if sample.keys_sampled >= config.max_keys {
                break 'scan;
            }
            let key_type = conn.key_type(&key)?;
            if key_type == "none" {
                // Expired or deleted since SCAN returned it
                continue;
            }

            let bytes = if sample.memory_usage_available {
                match conn.memory_usage(&key) {
                    Ok(bytes) => bytes,
                    Err(e) if memory_usage_refused(&e) => {
                        warn!("{}: MEMORY USAGE unavailable ({}), sizes skipped", address, e);
                        sample.memory_usage_available = false;
                        None
                    }
                    Err(e) => return Err(e),
                }
            } else {
                None
            };

            sample.by_type.entry(key_type.clone()).or_default().record(bytes);
            if let Some(bytes) = bytes {
                sample.largest.push(SampledKey {
                    key,
                    key_type,
                    bytes,
                });
                sample.largest.sort_by(|a, b| b.bytes.cmp(&a.bytes));
                sample.largest.truncate(LARGEST_KEYS);
            }
            sample.keys_sampled += 1;
        }

        if next == 0 {
            sample.complete = true;
            break;
        }
        if sample.keys_sampled >= config.max_keys {
            break;
        }
        cursor = next;
    }

    debug!(
        "{}: sampled {} keys in {} SCAN calls",
        address, sample.keys_sampled, sample.scan_calls
    );
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::control_plane::tests::{bulk, MockControlPlane};
    use crate::utils::RespValue;

    fn scan_reply(cursor: &str, keys: &[&str]) -> RespValue {
        RespValue::Array(vec![
            bulk(cursor),
            RespValue::Array(keys.iter().map(|k| bulk(k)).collect()),
        ])
    }

    fn simple(s: &str) -> RespValue {
        RespValue::SimpleString(s.to_string())
    }

    #[test]
    fn test_scan_until_cursor_zero() {
        let mut mock = MockControlPlane::new(vec![
            scan_reply("5", &["a"]),
            simple("string"),
            RespValue::Integer(56),
            scan_reply("0", &["b"]),
            simple("hash"),
            RespValue::Integer(200),
        ]);
        let sample = sample_keyspace(&mut mock, "n1", &SampleConfig::default()).unwrap();

        assert!(sample.complete);
        assert_eq!(sample.scan_calls, 2);
        assert_eq!(sample.keys_sampled, 2);
        assert_eq!(sample.by_type["hash"].total_bytes, 200);
        assert_eq!(sample.largest[0].key, "b");
        assert_eq!(mock.commands[3], vec!["SCAN", "5", "COUNT", "100"]);
    }

    #[test]
    fn test_max_keys_caps_sampling() {
        let mut mock = MockControlPlane::new(vec![
            scan_reply("9", &["a", "b", "c"]),
            simple("string"),
            RespValue::Integer(10),
            simple("string"),
            RespValue::Integer(20),
        ]);
        let config = SampleConfig {
            max_keys: 2,
            ..Default::default()
        };
        let sample = sample_keyspace(&mut mock, "n1", &config).unwrap();

        assert_eq!(sample.keys_sampled, 2);
        assert!(!sample.complete);
        assert_eq!(sample.by_type["string"].min_bytes, Some(10));
        assert_eq!(sample.by_type["string"].avg_bytes(), Some(15.0));
        assert_eq!(mock.commands.len(), 5);
    }

    #[test]
    fn test_memory_usage_disabled_is_tolerated() {
        let mut mock = MockControlPlane::new(vec![
            scan_reply("0", &["a", "b"]),
            simple("list"),
            RespValue::Error("ERR unknown command 'MEMORY'".to_string()),
            simple("set"),
        ]);
        let sample = sample_keyspace(&mut mock, "n1", &SampleConfig::default()).unwrap();

        assert!(!sample.memory_usage_available);
        assert_eq!(sample.keys_sampled, 2);
        assert_eq!(sample.by_type["set"].keys, 1);
        assert_eq!(sample.by_type["set"].avg_bytes(), None);
        assert!(sample.largest.is_empty());
        // No MEMORY USAGE after the first refusal
        assert_eq!(mock.commands.len(), 4);
    }

    #[test]
    fn test_vanished_key_skipped() {
        let mut mock = MockControlPlane::new(vec![
            scan_reply("0", &["gone"]),
            simple("none"),
        ]);
        let sample = sample_keyspace(&mut mock, "n1", &SampleConfig::default()).unwrap();
        assert_eq!(sample.keys_sampled, 0);
        assert!(sample.complete);
    }
}

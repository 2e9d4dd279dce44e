//! INFO response parsing
//!
//! `INFO` text is a list of `# Section` headers followed by `key:value`
//! lines. `commandstats` and `keyspace` values are themselves
//! `k=v,k=v` lists and get typed accessors.

use std::collections::BTreeMap;

use serde::Serialize;

/// Section name used for lines that appear before any header
const UNNAMED_SECTION: &str = "default";

/// Parsed INFO text: section -> key -> raw value
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfoResponse {
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl InfoResponse {
    /// Look a key up in any section
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sections
            .values()
            .find_map(|fields| fields.get(key))
            .map(String::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.trim().parse().ok()
    }

    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(&name.to_ascii_lowercase())
    }

    pub fn run_id(&self) -> Option<&str> {
        self.get("run_id")
    }

    pub fn uptime_secs(&self) -> Option<u64> {
        self.get_u64("uptime_in_seconds")
    }

    /// Per-command stats keyed by command name (`get`, `client|list`)
    pub fn command_stats(&self) -> BTreeMap<String, CommandStat> {
        self.section("commandstats")
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(key, value)| {
                        let name = key.strip_prefix("cmdstat_")?;
                        Some((name.to_ascii_lowercase(), parse_command_stat(value)))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keyspace stats keyed by database (`db0`)
    pub fn keyspace(&self) -> BTreeMap<String, KeyspaceStat> {
        self.section("keyspace")
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(key, _)| key.starts_with("db"))
                    .map(|(key, value)| (key.clone(), parse_keyspace_entry(value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total keys over all databases
    pub fn total_keys(&self) -> u64 {
        self.keyspace().values().map(|k| k.keys).sum()
    }
}

/// Parse INFO text
///
/// Section headers are matched case-insensitively and stored lowercase.
/// Blank lines and lines without `:` are ignored.
pub fn parse_info(text: &str) -> InfoResponse {
    let mut response = InfoResponse::default();
    let mut current = UNNAMED_SECTION.to_string();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            current = header.trim().to_ascii_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            response
                .sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    response
}

/// One `cmdstat_<name>` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandStat {
    pub calls: u64,
    pub usec: u64,
    pub usec_per_call: f64,
    pub rejected_calls: u64,
    pub failed_calls: u64,
}

/// Iterate `k=v` pairs of a comma separated attribute list
fn attributes(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
}

/// Parse `calls=..,usec=..,usec_per_call=..,rejected_calls=..,failed_calls=..`
///
/// Missing or malformed fields are 0.
pub fn parse_command_stat(value: &str) -> CommandStat {
    let mut stat = CommandStat::default();
    for (key, val) in attributes(value) {
        match key {
            "calls" => stat.calls = val.parse().unwrap_or(0),
            "usec" => stat.usec = val.parse().unwrap_or(0),
            "usec_per_call" => stat.usec_per_call = val.parse().unwrap_or(0.0),
            "rejected_calls" => stat.rejected_calls = val.parse().unwrap_or(0),
            "failed_calls" => stat.failed_calls = val.parse().unwrap_or(0),
            _ => {}
        }
    }
    stat
}

/// One `dbN` keyspace entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyspaceStat {
    pub keys: u64,
    pub expires: u64,
    pub avg_ttl: u64,
}

/// Parse `keys=..,expires=..,avg_ttl=..`
pub fn parse_keyspace_entry(value: &str) -> KeyspaceStat {
    let mut stat = KeyspaceStat::default();
    for (key, val) in attributes(value) {
        match key {
            "keys" => stat.keys = val.parse().unwrap_or(0),
            "expires" => stat.expires = val.parse().unwrap_or(0),
            "avg_ttl" => stat.avg_ttl = val.parse().unwrap_or(0),
            _ => {}
        }
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
run_id:abc123\r\n\
uptime_in_seconds:3600\r\n\
\r\n\
# Stats\r\n\
total_commands_processed:1000\r\n\
total_net_input_bytes:20480\r\n\
\r\n\
# Commandstats\r\n\
cmdstat_get:calls=600,usec=1200,usec_per_call=2.00,rejected_calls=0,failed_calls=1\r\n\
cmdstat_CLIENT|LIST:calls=3,usec=90,usec_per_call=30.00\r\n\
\r\n\
# Keyspace\r\n\
db0:keys=10,expires=2,avg_ttl=5000\r\n\
db3:keys=5,expires=0,avg_ttl=0\r\n";

    #[test]
    fn test_parse_sections() {
        let info = parse_info(SAMPLE);
        assert_eq!(info.sections.len(), 4);
        assert_eq!(info.get("redis_version"), Some("7.2.4"));
        assert_eq!(info.get_u64("total_commands_processed"), Some(1000));
        assert_eq!(info.run_id(), Some("abc123"));
        assert_eq!(info.uptime_secs(), Some(3600));
        assert!(info.section("Stats").is_some());
    }

    #[test]
    fn test_command_stats() {
        let stats = parse_info(SAMPLE).command_stats();
        assert_eq!(stats.len(), 2);
        let get = &stats["get"];
        assert_eq!(get.calls, 600);
        assert_eq!(get.usec, 1200);
        assert_eq!(get.failed_calls, 1);
        assert_eq!(stats["client|list"].rejected_calls, 0);
    }

    #[test]
    fn test_keyspace() {
        let info = parse_info(SAMPLE);
        let keyspace = info.keyspace();
        assert_eq!(keyspace["db0"].expires, 2);
        assert_eq!(info.total_keys(), 15);
    }

    #[test]
    fn test_command_stat_missing_fields_default_to_zero() {
        let stat = parse_command_stat("calls=7,garbage,usec=abc");
        assert_eq!(stat.calls, 7);
        assert_eq!(stat.usec, 0);
        assert_eq!(stat.usec_per_call, 0.0);
    }

    #[test]
    fn test_lines_before_header_and_noise() {
        let info = parse_info("loose:1\r\nnot a field\r\n#Memory\r\nused_memory:42\r\n");
        assert_eq!(info.section("default").unwrap()["loose"], "1");
        assert_eq!(info.section("memory").unwrap().len(), 1);
    }

    #[test]
    fn test_value_with_colon_kept_whole() {
        let info = parse_info("executable:/usr/bin/valkey-server\r\nconfig_file:C:\\valkey.conf\r\n");
        assert_eq!(info.get("config_file"), Some("C:\\valkey.conf"));
    }
}

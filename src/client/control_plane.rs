//! Control plane trait for server communication
//!
//! Everything the assessment sends to a node goes through `ControlPlane`:
//! discovery, INFO collection, keyspace sampling and the REST pass-through.
//! Higher-level helpers live in the blanket `ControlPlaneExt` trait so tests
//! can drive them with a scripted mock.

use std::io;

use crate::utils::{ProtocolError, RespValue, Result};

/// Control plane operations trait
pub trait ControlPlane {
    /// Execute a command with string arguments
    ///
    /// Transport failures are `Err`; server error replies come back as
    /// `RespValue::Error`.
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue>;
}

/// Extension trait with common control plane operations
pub trait ControlPlaneExt: ControlPlane {
    /// Execute and turn server error replies into `ProtocolError::Server`
    fn command(&mut self, args: &[&str]) -> Result<RespValue> {
        match self.execute(args)? {
            RespValue::Error(e) => Err(ProtocolError::Server(e).into()),
            other => Ok(other),
        }
    }

    /// Execute a command whose reply is text (bulk or simple string)
    fn command_text(&mut self, args: &[&str]) -> Result<String> {
        let reply = self.command(args)?;
        let type_name = reply.type_name();
        reply.into_text().ok_or_else(|| {
            ProtocolError::UnexpectedResponse {
                command: args.join(" "),
                actual: type_name.to_string(),
            }
            .into()
        })
    }

    /// Send PING and verify PONG response
    fn ping(&mut self) -> Result<bool> {
        Ok(matches!(self.command(&["PING"])?, RespValue::SimpleString(s) if s == "PONG"))
    }

    /// Send AUTH command
    fn authenticate(&mut self, password: &str, username: Option<&str>) -> Result<()> {
        match username {
            Some(user) => self.command(&["AUTH", user, password])?,
            None => self.command(&["AUTH", password])?,
        };
        Ok(())
    }

    /// Get CLUSTER NODES response as string
    fn cluster_nodes(&mut self) -> Result<String> {
        self.command_text(&["CLUSTER", "NODES"])
    }

    /// Get INFO for a section (empty string returns the default sections)
    fn info(&mut self, section: &str) -> Result<String> {
        if section.is_empty() {
            self.command_text(&["INFO"])
        } else {
            self.command_text(&["INFO", section])
        }
    }

    /// Get several INFO sections, one round trip each, concatenated
    fn info_sections(&mut self, sections: &[String]) -> Result<String> {
        let mut combined = String::new();
        for section in sections {
            let text = self.info(section)?;
            combined.push_str(&text);
            if !text.ends_with('\n') {
                combined.push_str("\r\n");
            }
        }
        Ok(combined)
    }

    /// One SCAN step. Returns the next cursor and the keys of this page.
    fn scan(&mut self, cursor: u64, pattern: Option<&str>, count: usize) -> Result<(u64, Vec<String>)> {
        let cursor_str = cursor.to_string();
        let count_str = count.to_string();
        let mut args = vec!["SCAN", cursor_str.as_str()];
        if let Some(p) = pattern {
            args.extend(["MATCH", p]);
        }
        args.extend(["COUNT", count_str.as_str()]);

        let reply = self.command(&args)?;
        let unexpected = || ProtocolError::UnexpectedResponse {
            command: "SCAN".to_string(),
            actual: reply.type_name().to_string(),
        };

        let parts = reply.as_array().ok_or_else(unexpected)?;
        if parts.len() != 2 {
            return Err(unexpected().into());
        }
        let next = parts[0]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| ProtocolError::Parse("invalid SCAN cursor".to_string()))?;
        let keys = parts[1]
            .as_array()
            .ok_or_else(unexpected)?
            .iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();

        Ok((next, keys))
    }

    /// TYPE of a key ("none" when it vanished)
    fn key_type(&mut self, key: &str) -> Result<String> {
        self.command_text(&["TYPE", key])
    }

    /// MEMORY USAGE of a key; `None` when the key no longer exists
    fn memory_usage(&mut self, key: &str) -> Result<Option<u64>> {
        match self.command(&["MEMORY", "USAGE", key])? {
            RespValue::Integer(n) => Ok(Some(n.max(0) as u64)),
            RespValue::Null => Ok(None),
            other => Err(ProtocolError::UnexpectedResponse {
                command: "MEMORY USAGE".to_string(),
                actual: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

// Blanket implementation: any ControlPlane automatically gets ControlPlaneExt
impl<T: ControlPlane + ?Sized> ControlPlaneExt for T {}

//! In-process fake RESP server for integration tests
//!
//! Answers the handful of commands the assessment sends. Counters in the
//! INFO reply grow with every full INFO call so two rounds show traffic.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct FakeServer {
    pub port: u16,
    state: Arc<FakeState>,
}

struct FakeState {
    /// CLUSTER NODES reply; `None` means cluster support is disabled
    cluster_nodes: Mutex<Option<String>>,
    /// Served instead of `cluster_nodes` from the second CLUSTER NODES call on
    next_cluster_nodes: Mutex<Option<String>>,
    cluster_nodes_calls: AtomicU64,
    info_calls: AtomicU64,
    keys: Vec<String>,
}

impl FakeServer {
    pub fn start(keys: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(FakeState {
            cluster_nodes: Mutex::new(None),
            next_cluster_nodes: Mutex::new(None),
            cluster_nodes_calls: AtomicU64::new(0),
            info_calls: AtomicU64::new(0),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = Arc::clone(&accept_state);
                thread::spawn(move || serve_connection(stream, &state));
            }
        });

        Self { port, state }
    }

    pub fn set_cluster_nodes(&self, text: String) {
        *self.state.cluster_nodes.lock().unwrap() = Some(text);
    }

    /// Change the CLUSTER NODES reply once the first discovery has seen it
    pub fn set_cluster_nodes_after_first(&self, text: String) {
        *self.state.next_cluster_nodes.lock().unwrap() = Some(text);
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn serve_connection(stream: TcpStream, state: &FakeState) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    while let Some(args) = read_command(&mut reader) {
        let reply = respond(&args, state);
        if writer.write_all(reply.as_bytes()).is_err() {
            break;
        }
    }
}

fn read_command(reader: &mut impl BufRead) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).ok()?;
        line.clear();
        reader.read_line(&mut line).ok()?;
        args.push(line.trim_end().to_string());
    }
    Some(args)
}

fn bulk(text: &str) -> String {
    format!("${}\r\n{}\r\n", text.len(), text)
}

fn respond(args: &[String], state: &FakeState) -> String {
    let upper: Vec<String> = args.iter().map(|a| a.to_ascii_uppercase()).collect();
    let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

    match upper.as_slice() {
        ["PING"] => "+PONG\r\n".to_string(),
        ["AUTH", ..] => "+OK\r\n".to_string(),
        ["CLUSTER", "NODES"] => {
            let calls = state.cluster_nodes_calls.fetch_add(1, Ordering::SeqCst);
            if calls > 0 {
                if let Some(text) = state.next_cluster_nodes.lock().unwrap().as_ref() {
                    return bulk(text);
                }
            }
            match state.cluster_nodes.lock().unwrap().as_ref() {
                Some(text) => bulk(text),
                None => "-ERR This instance has cluster support disabled\r\n".to_string(),
            }
        }
        ["INFO", "REPLICATION"] => bulk("# Replication\r\nrole:master\r\nconnected_slaves:0\r\n"),
        ["INFO", ..] => {
            let n = state.info_calls.fetch_add(1, Ordering::SeqCst) + 1;
            bulk(&info_text(n))
        }
        ["DBSIZE"] => format!(":{}\r\n", state.keys.len()),
        ["SCAN", ..] => {
            let mut reply = format!("*2\r\n{}*{}\r\n", bulk("0"), state.keys.len());
            for key in &state.keys {
                reply.push_str(&bulk(key));
            }
            reply
        }
        ["TYPE", ..] => "+string\r\n".to_string(),
        ["MEMORY", "USAGE", ..] => ":64\r\n".to_string(),
        _ => format!("-ERR unknown command '{}'\r\n", args.join(" ")),
    }
}

/// INFO all text for the `n`-th call
pub fn info_text(n: u64) -> String {
    [
        "# Server".to_string(),
        "redis_version:7.2.4".to_string(),
        "run_id:8c6f2a1d3b4e5f60718293a4b5c6d7e8f9012345".to_string(),
        format!("uptime_in_seconds:{}", 100 + n),
        "# Clients".to_string(),
        "connected_clients:5".to_string(),
        "# Memory".to_string(),
        "used_memory:1048576".to_string(),
        "mem_fragmentation_ratio:1.10".to_string(),
        "# Stats".to_string(),
        format!("total_connections_received:{}", 10 + n),
        format!("total_commands_processed:{}", 1000 + n * 500),
        format!("total_net_input_bytes:{}", n * 10240),
        format!("total_net_output_bytes:{}", n * 20480),
        format!("keyspace_hits:{}", n * 300),
        format!("keyspace_misses:{}", n * 100),
        "# Replication".to_string(),
        "role:master".to_string(),
        "connected_slaves:0".to_string(),
        "# CPU".to_string(),
        "used_cpu_sys:1.500000".to_string(),
        "used_cpu_user:2.500000".to_string(),
        "# Commandstats".to_string(),
        format!(
            "cmdstat_get:calls={},usec={},usec_per_call=2.00,rejected_calls=0,failed_calls=0",
            n * 300,
            n * 600
        ),
        format!(
            "cmdstat_set:calls={},usec={},usec_per_call=4.00,rejected_calls=0,failed_calls=0",
            n * 200,
            n * 800
        ),
        "# Keyspace".to_string(),
        "db0:keys=3,expires=0,avg_ttl=0".to_string(),
        String::new(),
    ]
    .join("\r\n")
}

//! ECPU estimation
//!
//! Serverless ECPU billing charges one unit per simple command or per KB
//! transferred, whichever is larger, and scales expensive commands by their
//! CPU time. The estimate works from commandstats deltas and network byte
//! deltas of one node.

use std::ops::AddAssign;

use serde::Serialize;

use crate::cluster::NodeRole;

/// Command class for ECPU accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Read,
    Write,
    Other,
}

const READ_COMMANDS: &[&str] = &[
    "get", "mget", "getrange", "getex", "strlen", "substr", "exists", "ttl", "pttl",
    "expiretime", "pexpiretime", "type", "dump", "hget", "hmget", "hgetall", "hkeys", "hvals",
    "hlen", "hexists", "hstrlen", "hscan", "hrandfield", "lrange", "lindex", "llen", "lpos",
    "smembers", "sismember", "smismember", "scard", "srandmember", "sscan", "sinter",
    "sintercard", "sunion", "sdiff", "zrange", "zrangebyscore", "zrangebylex",
    "zrevrange", "zrevrangebyscore", "zrevrangebylex", "zrank", "zrevrank", "zscore",
    "zmscore", "zcard", "zcount", "zlexcount", "zscan", "zrandmember", "zinter", "zunion",
    "zdiff", "getbit", "bitcount", "bitpos", "bitfield_ro", "pfcount", "geopos", "geodist",
    "geohash", "georadius_ro", "georadiusbymember_ro", "geosearch", "xrange", "xrevrange",
    "xlen", "xread", "xinfo", "xpending", "scan", "keys", "randomkey", "dbsize", "lcs",
    "object", "memory", "json.get", "json.mget", "json.type", "json.strlen", "json.arrlen",
    "json.objlen", "json.objkeys",
];

const WRITE_COMMANDS: &[&str] = &[
    "set", "setex", "psetex", "setnx", "setrange", "mset", "msetnx", "getset", "getdel",
    "append", "incr", "incrby", "incrbyfloat", "decr", "decrby", "del", "unlink", "expire",
    "pexpire", "expireat", "pexpireat", "persist", "rename", "renamenx", "copy", "restore",
    "move", "hset", "hsetnx", "hmset", "hdel", "hincrby", "hincrbyfloat", "lpush", "rpush",
    "lpushx", "rpushx", "lpop", "rpop", "lset", "linsert", "lrem", "ltrim", "lmove", "rpoplpush",
    "blpop", "brpop", "blmove", "brpoplpush", "lmpop", "blmpop", "sadd", "srem", "spop",
    "smove", "sinterstore", "sunionstore", "sdiffstore", "zadd", "zincrby", "zrem",
    "zremrangebyscore", "zremrangebyrank", "zremrangebylex", "zpopmin", "zpopmax",
    "bzpopmin", "bzpopmax", "zmpop", "bzmpop", "zrangestore", "zinterstore", "zunionstore",
    "zdiffstore", "setbit", "bitfield", "bitop", "pfadd", "pfmerge", "geoadd",
    "georadius", "georadiusbymember", "geosearchstore", "xadd", "xdel", "xtrim", "xgroup",
    "xack", "xclaim", "xautoclaim", "xreadgroup", "xsetid", "json.set", "json.del",
    "json.numincrby", "json.arrappend", "json.arrinsert", "json.arrpop", "json.arrtrim",
    "json.clear", "json.toggle", "json.strappend", "flushdb", "flushall",
];

/// Classify a commandstats name (`get`, `client|list`)
pub fn classify_command(name: &str) -> CommandCategory {
    let name = name.to_ascii_lowercase();
    let base = name.split('|').next().unwrap_or(name.as_str());
    if READ_COMMANDS.contains(&base) {
        CommandCategory::Read
    } else if WRITE_COMMANDS.contains(&base) {
        CommandCategory::Write
    } else {
        CommandCategory::Other
    }
}

/// Calls observed for one command during the interval
#[derive(Debug, Clone, Copy)]
pub struct CommandUsage {
    pub category: CommandCategory,
    pub calls: u64,
    pub usec_per_call: f64,
}

/// ECPU estimation parameters
#[derive(Debug, Clone)]
pub struct EcpuModel {
    /// CPU time of a command worth exactly one ECPU
    pub baseline_usec_per_call: f64,
}

impl Default for EcpuModel {
    fn default() -> Self {
        Self {
            baseline_usec_per_call: 20.0,
        }
    }
}

impl EcpuModel {
    /// `calls * max(1, usec_per_call / baseline)`
    pub fn effective_calls(&self, calls: u64, usec_per_call: f64) -> f64 {
        let factor = if self.baseline_usec_per_call > 0.0 && usec_per_call.is_finite() {
            (usec_per_call / self.baseline_usec_per_call).max(1.0)
        } else {
            1.0
        };
        calls as f64 * factor
    }

    /// Estimate ECPUs for one node over `elapsed_secs`
    ///
    /// Replicas do not accrue write ECPUs: their writes are replication.
    pub fn estimate(
        &self,
        usage: &[CommandUsage],
        net_input_bytes: u64,
        net_output_bytes: u64,
        role: NodeRole,
        elapsed_secs: f64,
    ) -> EcpuEstimate {
        let mut est = EcpuEstimate::default();
        for u in usage {
            let effective = self.effective_calls(u.calls, u.usec_per_call);
            match u.category {
                CommandCategory::Read => est.read_calls += effective,
                CommandCategory::Write if role.is_primary() => est.write_calls += effective,
                CommandCategory::Write => {}
                CommandCategory::Other => est.other_calls += effective,
            }
        }

        est.read_kb = net_output_bytes as f64 / 1024.0;
        est.write_kb = if role.is_primary() {
            net_input_bytes as f64 / 1024.0
        } else {
            0.0
        };

        est.read_ecpu = est.read_calls.max(est.read_kb);
        est.write_ecpu = est.write_calls.max(est.write_kb);
        est.other_ecpu = est.other_calls;
        est.total_ecpu = est.read_ecpu + est.write_ecpu + est.other_ecpu;
        est.ecpu_per_sec = if elapsed_secs > 0.0 {
            est.total_ecpu / elapsed_secs
        } else {
            0.0
        };
        est
    }
}

/// ECPU estimate for a node or a whole cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EcpuEstimate {
    pub read_calls: f64,
    pub write_calls: f64,
    pub other_calls: f64,
    pub read_kb: f64,
    pub write_kb: f64,
    pub read_ecpu: f64,
    pub write_ecpu: f64,
    pub other_ecpu: f64,
    pub total_ecpu: f64,
    pub ecpu_per_sec: f64,
}

impl AddAssign<&EcpuEstimate> for EcpuEstimate {
    fn add_assign(&mut self, other: &EcpuEstimate) {
        self.read_calls += other.read_calls;
        self.write_calls += other.write_calls;
        self.other_calls += other.other_calls;
        self.read_kb += other.read_kb;
        self.write_kb += other.write_kb;
        self.read_ecpu += other.read_ecpu;
        self.write_ecpu += other.write_ecpu;
        self.other_ecpu += other.other_ecpu;
        self.total_ecpu += other.total_ecpu;
        self.ecpu_per_sec += other.ecpu_per_sec;
    }
}

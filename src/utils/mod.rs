//! Utility modules

pub mod error;
pub mod resp;

pub use error::{
    AssessError, ClusterError, CollectionError, ConnectionError, ProtocolError, Result,
};
pub use resp::{RespDecoder, RespEncoder, RespValue};

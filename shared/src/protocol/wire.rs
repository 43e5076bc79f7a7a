//! Wire encoding for hook command calls.
//!
//! Every message is one length-delimited frame whose payload is bincode with an
//! explicit config, so tool and agent always agree on the encoding (fixint for
//! lengths and enum tags). A call carries a sequence number that the reply
//! echoes back; the reply carries either a response body or an error string.

use super::error::RpcError;
use crate::types::command::{Request, Response};
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// The single remote procedure exposed by the agent
pub const JUJUC_MAIN: &str = "Jujuc.Main";

/// Largest frame either side accepts (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

fn wire_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_LEN as u64)
}

fn encode<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>, RpcError> {
    wire_bincode()
        .serialize(value)
        .map_err(|source| RpcError::Encode { what, source })
}

fn decode<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, RpcError> {
    wire_bincode()
        .deserialize(bytes)
        .map_err(|source| RpcError::Decode { what, source })
}

/// A request to invoke `service_method` on the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub version: u32,
    pub service_method: String,
    pub seq: u64,
    pub body: Request,
}

impl Call {
    pub fn new(seq: u64, service_method: impl Into<String>, body: Request) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            service_method: service_method.into(),
            seq,
            body,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        encode("call", self)
    }

    /// Deserialize a call, validating the protocol version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RpcError> {
        let call: Self = decode("call", bytes)?;
        if call.version != PROTOCOL_VERSION {
            return Err(RpcError::Version(call.version));
        }
        Ok(call)
    }
}

/// The agent's answer to a [`Call`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub version: u32,
    pub service_method: String,
    pub seq: u64,
    pub error: Option<String>,
    pub body: Option<Response>,
}

impl Reply {
    pub fn ok(call: &Call, body: Response) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            service_method: call.service_method.clone(),
            seq: call.seq,
            error: None,
            body: Some(body),
        }
    }

    pub fn error(call: &Call, error: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            service_method: call.service_method.clone(),
            seq: call.seq,
            error: Some(error.into()),
            body: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        encode("reply", self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RpcError> {
        let reply: Self = decode("reply", bytes)?;
        if reply.version != PROTOCOL_VERSION {
            return Err(RpcError::Version(reply.version));
        }
        Ok(reply)
    }

    /// Convert into the call outcome. A server-reported error wins over any body.
    pub fn into_result(self) -> Result<Response, RpcError> {
        match (self.error, self.body) {
            (Some(err), _) => Err(RpcError::Server(err)),
            (None, Some(body)) => Ok(body),
            (None, None) => Err(RpcError::Server(format!(
                "rpc: empty reply for {}",
                self.service_method
            ))),
        }
    }
}

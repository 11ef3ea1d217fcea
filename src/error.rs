use std::io;

use thiserror::Error;

/// Failures while turning bytes off the wire into a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message ended unexpectedly")]
    UnexpectedEnd,

    #[error("unsupported label type 0x{0:02x}")]
    BadLabelType(u8),

    #[error("compression pointer loop at offset {0}")]
    PointerLoop(usize),

    #[error("bad rdata length {len} for {rtype}")]
    BadRdataLength { rtype: String, len: usize },

    #[error("name contains invalid utf-8")]
    InvalidName,
}

impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        // byteorder only reports short reads from an in-memory cursor
        DecodeError::UnexpectedEnd
    }
}

/// Errors surfaced by the resolver. Only `IndirectionLimit` ever leaves
/// [`Resolver::resolve`](crate::Resolver::resolve); the rest are absorbed
/// while choosing nameservers.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("CNAME indirection limit exceeded")]
    IndirectionLimit,

    #[error("nameserver address lookups nested too deeply")]
    DelegationDepth,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("configuration validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

//! Error types
//!
//! `WireError` covers encoding and malformed replies, `TransportError` the
//! socket, and `ResolveError` is what a resolution ultimately fails with,
//! carrying the domain (and server) it was working on.

use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::arena::ArenaError;
use crate::dns::wire::{Rcode, RecordType};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("message truncated: {needed} bytes needed at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("compression pointer {pointer} outside {len}-byte message")]
    PointerOutOfBounds { pointer: usize, len: usize },

    #[error("too many compression pointers in one name")]
    PointerLoop,

    #[error("reserved label type in length octet {0:#04x}")]
    ReservedLabelType(u8),

    #[error("label of {0} bytes exceeds 63")]
    LabelTooLong(usize),

    #[error("name of {0} bytes exceeds 255")]
    NameTooLong(usize),

    #[error("message of {0} bytes exceeds the 512-byte UDP limit")]
    MessageTooLarge(usize),

    #[error("unexpected record class {0}")]
    UnexpectedClass(u16),

    #[error("{rtype} record with rdlength {actual}, expected {expected}")]
    BadRdataLength {
        rtype: RecordType,
        expected: u16,
        actual: u16,
    },

    #[error("record data runs past its declared length {declared}")]
    RdataOverrun { declared: u16 },

    #[error("expected exactly one question, found {0}")]
    QuestionCount(u16),

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no reply from {server} within the receive timeout")]
    Timeout { server: SocketAddr },

    #[error("socket error talking to {server}")]
    Io {
        server: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Classify a socket error, folding timeouts into [`TransportError::Timeout`]
    pub fn from_io(server: SocketAddr, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout { server },
            _ => TransportError::Io { server, source },
        }
    }
}

/// Failure of one send/receive/parse round trip
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no root server configured for the selected address family")]
    NoRootServer,

    #[error("cannot encode a query for {domain}")]
    InvalidName {
        domain: String,
        #[source]
        source: WireError,
    },

    #[error("querying {server} for {domain} failed")]
    Transport {
        domain: String,
        server: IpAddr,
        #[source]
        source: TransportError,
    },

    #[error("malformed reply from {server} for {domain}")]
    Malformed {
        domain: String,
        server: IpAddr,
        #[source]
        source: WireError,
    },

    #[error("reply from {server} for {domain} has id {got:#06x}, expected {expected:#06x}")]
    IdMismatch {
        domain: String,
        server: IpAddr,
        expected: u16,
        got: u16,
    },

    #[error("{server} answered {domain} with {rcode}")]
    ServerFailure {
        domain: String,
        server: IpAddr,
        rcode: Rcode,
    },

    #[error("{server} returned neither an answer nor a delegation for {domain}")]
    NoDelegation { domain: String, server: IpAddr },

    #[error("nameserver {nameserver} for {domain} has no usable address")]
    NameserverUnresolvable { domain: String, nameserver: String },

    #[error("resolution depth exceeded ({depth}) while resolving {domain}")]
    DepthExceeded { domain: String, depth: usize },

    #[error("more than {limit} referrals while resolving {domain}")]
    ReferralLimitExceeded { domain: String, limit: usize },

    #[error("delegation cycle: resolving {domain} needs nameserver {nameserver} again")]
    DelegationCycle { domain: String, nameserver: String },

    #[error("out of arena memory while resolving {domain}")]
    Arena {
        domain: String,
        #[source]
        source: ArenaError,
    },
}

impl ResolveError {
    /// Attach context to a failed exchange with `server`
    pub fn exchange(domain: &str, server: IpAddr, err: ExchangeError) -> Self {
        match err {
            ExchangeError::Transport(source) => ResolveError::Transport {
                domain: domain.to_string(),
                server,
                source,
            },
            ExchangeError::Wire(WireError::Arena(source)) => ResolveError::Arena {
                domain: domain.to_string(),
                source,
            },
            ExchangeError::Wire(source) => ResolveError::Malformed {
                domain: domain.to_string(),
                server,
                source,
            },
        }
    }

    pub fn arena(domain: &str, source: ArenaError) -> Self {
        ResolveError::Arena {
            domain: domain.to_string(),
            source,
        }
    }
}

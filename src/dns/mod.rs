//! DNS protocol: message model, wire codec and UDP transport

pub mod codec;
pub mod transport;
pub mod wire;

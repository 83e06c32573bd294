//! Client and server library for the China Mobile Peer-to-Peer (CMPP)
//! short message protocol, versions 2.0, 2.1 and 3.0.
//!
//! The crate covers three layers:
//!
//! * [`datatypes`] + [`codec`] - the binary frame codec: one record per
//!   `(command, version)` pair with `pack(seq_id)`/`unpack(body)`, built
//!   on a fixed-width, sticky-error packet writer/reader.
//! * [`connection`] - the session engine over one TCP connection:
//!   framing, monotonic sequence ids, state transitions, per-operation
//!   deadlines, graceful close.
//! * [`client`] / [`server`] - the two session roles. The client dials
//!   and authenticates against the ISMG; the server accepts many
//!   sessions, dispatches requests through a handler chain and probes
//!   each peer with ACTIVE_TEST heartbeats.
//!
//! Character-set conversion, message persistence and retry are out of
//! scope; payloads are treated as ready-made octet strings.

pub mod client;
pub mod codec;
pub mod connection;
pub mod datatypes;
pub mod frame;
pub mod server;

pub use client::{Client, ClientError};
pub use codec::{CodecError, OpError, Packable, Unpackable, CMPP_HEADER_LEN};
pub use connection::{Conn, ConnError, ConnHandle, State};
pub use datatypes::*;
pub use frame::Frame;
pub use server::{listen_and_serve, Handler, Packet, Response, Server, ServerError};

/// Error type handlers hand back to the server's chain.
///
/// Handlers are user code, so the boxed form keeps the contract open;
/// the library's own errors are concrete enums per layer.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` for handler code.
pub type Result<T> = std::result::Result<T, Error>;

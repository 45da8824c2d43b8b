//! Client-server wire protocol.
//!
//! This module defines the binary formats exchanged between clients and the
//! netcalc server, the decoder that turns raw byte streams into validated
//! request structures, and the server that dispatches accepted connections
//! onto the worker pool.
//!
//! # Overview
//!
//! A request is a fixed 48-byte [`ConnectionHeader`] followed by a
//! magic-tagged [`RequestEnvelope`] holding a batch of fixed-layout
//! equation records. The reply echoes the header and carries one solved
//! record per equation. Decoding enforces exact byte counts per field and
//! never yields a partially populated structure: any short read or
//! malformed tag aborts the decode and releases everything built so far.
//!
//! # Binary Format
//!
//! Two framings share the same field layout but not the same byte order:
//!
//! - [`Framing::Network`]: every multi-byte integer is big-endian. Used on
//!   live connections.
//! - [`Framing::File`]: fields are in host byte order. Used by on-disk
//!   `.equ` equation files.
//!
//! The asymmetry is deliberate and must not be unified; the two framings
//! produce different bytes for the same envelope on little-endian hosts.
//!
//! # Key Components
//!
//! - [`ConnectionHeader`]: per-connection framing record.
//! - [`RequestEnvelope`]: decoded equation batch plus header metadata.
//! - [`SolvedBatch`]: decoded reply form, one record per equation.
//! - [`CalcServer`]: accept loop feeding the worker pool.
mod envelope;
mod header;
mod server;
mod wire;

use std::io;

use thiserror::Error;

pub use envelope::{MAGIC, RequestEnvelope, SolvedBatch, SolvedRecord, UnsolvedEquation};
pub use header::{ConnectionHeader, FILE_NAME_CAP, HEADER_SIZE};
pub use server::{CalcServer, ServerError};
pub use wire::Framing;

/// Errors raised while decoding or answering a request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad magic value {0:#010x}")]
    BadMagic(u32),

    #[error("declared header size {declared} does not match the {expected}-byte connection header")]
    HeaderSizeMismatch { declared: u32, expected: u32 },

    #[error("declared name length {declared} exceeds the {capacity}-byte file name field")]
    NameTooLong { declared: u32, capacity: u32 },

    #[error("stream ended mid-field: {0}")]
    Io(#[from] io::Error),
}

// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error types for the wire codec and the resolver surface.

use thiserror::Error;

use crate::lookup::{QueryKey, ResolveStatus};

/// A result where the error half is a [`ProtoError`].
pub type ProtoResult<T> = Result<T, ProtoError>;

/// An error that can occur deep in the encoder or decoder.
///
/// This type is kept small so that the functions that use it inline often.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtoError {
    /// Insufficient data in the buffer for a read operation
    #[error("unexpected end of input reached")]
    InsufficientBytes,

    /// Pointer points to an index within or after the current name
    #[error("label points to data not prior to idx: {idx} ptr: {ptr}")]
    PointerNotPriorToLabel {
        /// index of the label containing this pointer
        idx: usize,
        /// location to which the pointer is directing
        ptr: u16,
    },

    /// A label crossed into the region of a previously decoded name
    #[error("label overlaps label at: {label} other: {other}")]
    LabelOverlapsWithOther {
        /// start of the label that is currently being read
        label: usize,
        /// start of the region the label may not enter
        other: usize,
    },

    /// Label bytes exceeded the limit of 63
    #[error("label bytes exceed 63: {0}")]
    LabelBytesTooLong(usize),

    /// An unrecognized label code was found
    #[error("unrecognized label code: {0:b}")]
    UnrecognizedLabelCode(u8),

    /// A domain name was too long
    #[error("name label data exceed 255: {0}")]
    DomainNameTooLong(usize),

    /// Overflowed the maximum buffer size while emitting
    #[error("maximum buffer size exceeded: {0}")]
    MaxBufferSizeExceeded(usize),

    /// The length of rdata read was not as expected
    #[error("incorrect rdata length read: {read} expected: {len}")]
    IncorrectRDataLengthRead {
        /// the number of bytes the rdata read consumed
        read: usize,
        /// the length the record header declared
        len: usize,
    },

    /// A structural fault in the message, described by the str
    #[error("message format error: {0}")]
    Form(&'static str),
}

/// An error returned by the asynchronous resolver handle.
///
/// The core state machine reports outcomes as [`ResolveStatus`] values on
/// every answer; this wraps the non-`Ok` statuses for `Result` style
/// consumption at the task boundary.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The lookup completed with a status other than `Ok`
    #[error("lookup for {key} failed: {status}")]
    Failed {
        /// terminal status of the lookup
        status: ResolveStatus,
        /// the key that was being resolved
        key: QueryKey,
    },

    /// The background task driving the resolver is gone
    #[error("resolver task is no longer running")]
    Disconnected,
}

impl ResolveError {
    /// Returns the terminal status, or `Shutdown` if the task is gone.
    pub fn status(&self) -> ResolveStatus {
        match self {
            Self::Failed { status, .. } => *status,
            Self::Disconnected => ResolveStatus::Shutdown,
        }
    }
}

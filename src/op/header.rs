// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! message header, the control block of a DNS message

use std::fmt;

use crate::error::{ProtoError, ProtoResult};
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// Is this a query or a response
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    /// QR bit clear
    Query,
    /// QR bit set
    Response,
}

/// Operation code of the message, only `Query` is resolved
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpCode {
    /// Standard query
    Query,
    /// Server status request
    Status,
    /// Zone change notification, RFC 1996
    Notify,
    /// Dynamic update, RFC 2136
    Update,
    /// Any other code
    Unknown(u8),
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Query,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            _ => Self::Unknown(value),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(code: OpCode) -> Self {
        match code {
            OpCode::Query => 0,
            OpCode::Status => 2,
            OpCode::Notify => 4,
            OpCode::Update => 5,
            OpCode::Unknown(value) => value,
        }
    }
}

/// The response code, the low four bits of the second flag byte
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseCode {
    /// No error
    NoError,
    /// Format error, the server could not interpret the query
    FormErr,
    /// Server failure
    ServFail,
    /// Name error, the domain name does not exist (NXDOMAIN)
    NXDomain,
    /// Not implemented
    NotImp,
    /// Refused by policy
    Refused,
    /// Any other code
    Unknown(u8),
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NXDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::NoError => 0,
            ResponseCode::FormErr => 1,
            ResponseCode::ServFail => 2,
            ResponseCode::NXDomain => 3,
            ResponseCode::NotImp => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(value) => value,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "NoError"),
            Self::FormErr => write!(f, "FormErr"),
            Self::ServFail => write!(f, "ServFail"),
            Self::NXDomain => write!(f, "NXDomain"),
            Self::NotImp => write!(f, "NotImp"),
            Self::Refused => write!(f, "Refused"),
            Self::Unknown(value) => write!(f, "RCODE{value}"),
        }
    }
}

/// Message header
///
/// ```text
/// 4.1.1. Header section format
///
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    id: u16,
    message_type: MessageType,
    op_code: OpCode,
    authoritative: bool,
    truncated: bool,
    recursion_desired: bool,
    recursion_available: bool,
    response_code: ResponseCode,
    query_count: u16,
    answer_count: u16,
    name_server_count: u16,
    additional_count: u16,
}

impl Header {
    /// Length of the header, always 12 bytes
    pub const fn len() -> usize {
        12
    }

    /// A new query header with recursion desired as given
    pub fn query(id: u16, recursion_desired: bool) -> Self {
        Self {
            id,
            message_type: MessageType::Query,
            op_code: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired,
            recursion_available: false,
            response_code: ResponseCode::NoError,
            query_count: 0,
            answer_count: 0,
            name_server_count: 0,
            additional_count: 0,
        }
    }

    /// A new response header, for building replies in tests and tools
    pub fn response(id: u16, response_code: ResponseCode) -> Self {
        Self {
            id,
            message_type: MessageType::Response,
            op_code: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: true,
            response_code,
            query_count: 0,
            answer_count: 0,
            name_server_count: 0,
            additional_count: 0,
        }
    }

    /// Returns the query id of the message
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Query or response
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns the operation code
    pub fn op_code(&self) -> OpCode {
        self.op_code
    }

    /// True if the responding server is an authority for the zone
    pub fn authoritative(&self) -> bool {
        self.authoritative
    }

    /// True if the message was cut off by the transport, i.e. retry over TCP
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// True if the requester asks the server to recurse
    pub fn recursion_desired(&self) -> bool {
        self.recursion_desired
    }

    /// True if the server offers recursion
    pub fn recursion_available(&self) -> bool {
        self.recursion_available
    }

    /// Returns the response code
    pub fn response_code(&self) -> ResponseCode {
        self.response_code
    }

    /// Number of entries in the question section
    pub fn query_count(&self) -> u16 {
        self.query_count
    }

    /// Number of records in the answer section
    pub fn answer_count(&self) -> u16 {
        self.answer_count
    }

    /// Number of records in the authority section
    pub fn name_server_count(&self) -> u16 {
        self.name_server_count
    }

    /// Number of records in the additional section
    pub fn additional_count(&self) -> u16 {
        self.additional_count
    }

    /// Sets the truncated bit
    pub fn set_truncated(&mut self, truncated: bool) -> &mut Self {
        self.truncated = truncated;
        self
    }

    /// Sets the authoritative bit
    pub fn set_authoritative(&mut self, authoritative: bool) -> &mut Self {
        self.authoritative = authoritative;
        self
    }

    pub(crate) fn set_counts(
        &mut self,
        query_count: u16,
        answer_count: u16,
        name_server_count: u16,
        additional_count: u16,
    ) {
        self.query_count = query_count;
        self.answer_count = answer_count;
        self.name_server_count = name_server_count;
        self.additional_count = additional_count;
    }
}

impl BinEncodable for Header {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_u16(self.id)?;

        // QR | OpCode x4 | AA | TC | RD
        let mut q_opcd_a_t_r: u8 = if self.message_type == MessageType::Response {
            0b1000_0000
        } else {
            0b0000_0000
        };
        q_opcd_a_t_r |= u8::from(self.op_code) << 3;
        if self.authoritative {
            q_opcd_a_t_r |= 0b0000_0100;
        }
        if self.truncated {
            q_opcd_a_t_r |= 0b0000_0010;
        }
        if self.recursion_desired {
            q_opcd_a_t_r |= 0b0000_0001;
        }
        encoder.emit(q_opcd_a_t_r)?;

        // RA | Z x3 | RCODE x4
        let mut r_z_rcod: u8 = if self.recursion_available {
            0b1000_0000
        } else {
            0b0000_0000
        };
        r_z_rcod |= 0b0000_1111 & u8::from(self.response_code);
        encoder.emit(r_z_rcod)?;

        encoder.emit_u16(self.query_count)?;
        encoder.emit_u16(self.answer_count)?;
        encoder.emit_u16(self.name_server_count)?;
        encoder.emit_u16(self.additional_count)?;
        Ok(())
    }
}

impl<'r> BinDecodable<'r> for Header {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        if decoder.len() < Self::len() {
            return Err(ProtoError::InsufficientBytes);
        }

        let id = decoder.read_u16()?;

        let q_opcd_a_t_r = decoder.pop()?;
        let r_z_rcod = decoder.pop()?;

        let message_type = if q_opcd_a_t_r & 0b1000_0000 == 0b1000_0000 {
            MessageType::Response
        } else {
            MessageType::Query
        };
        let op_code = OpCode::from((q_opcd_a_t_r & 0b0111_1000) >> 3);
        let authoritative = q_opcd_a_t_r & 0b0000_0100 == 0b0000_0100;
        let truncated = q_opcd_a_t_r & 0b0000_0010 == 0b0000_0010;
        let recursion_desired = q_opcd_a_t_r & 0b0000_0001 == 0b0000_0001;

        let recursion_available = r_z_rcod & 0b1000_0000 == 0b1000_0000;
        let response_code = ResponseCode::from(r_z_rcod & 0b0000_1111);

        let query_count = decoder.read_u16()?;
        let answer_count = decoder.read_u16()?;
        let name_server_count = decoder.read_u16()?;
        let additional_count = decoder.read_u16()?;

        Ok(Self {
            id,
            message_type,
            op_code,
            authoritative,
            truncated,
            recursion_desired,
            recursion_available,
            response_code,
            query_count,
            answer_count,
            name_server_count,
            additional_count,
        })
    }
}

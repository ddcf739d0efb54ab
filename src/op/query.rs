// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Query struct for looking up resource records

use std::fmt;

use crate::error::ProtoResult;
use crate::rr::{DnsClass, Name, RecordType};
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// Query struct for looking up resource records, basically a resource record
///  header without the data.
///
/// ```text
/// 4.1.2. Question section format
///
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                     QNAME                     /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QTYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QCLASS                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Query {
    name: Name,
    query_type: RecordType,
    query_class: DnsClass,
}

impl Query {
    /// Creates a query for the name and type, class IN
    pub fn query(name: Name, query_type: RecordType) -> Self {
        Self {
            name,
            query_type,
            query_class: DnsClass::IN,
        }
    }

    /// Returns the name being queried
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the type of the query
    pub fn query_type(&self) -> RecordType {
        self.query_type
    }

    /// Returns the class of the query
    pub fn query_class(&self) -> DnsClass {
        self.query_class
    }

    /// True if the other query asks the same question, names compared
    ///  case-insensitively
    pub fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

impl BinEncodable for Query {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        self.name.emit(encoder)?;
        self.query_type.emit(encoder)?;
        self.query_class.emit(encoder)
    }
}

impl<'r> BinDecodable<'r> for Query {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        let name = Name::read(decoder)?;
        let query_type = RecordType::read(decoder)?;
        let query_class = DnsClass::read(decoder)?;

        Ok(Self {
            name,
            query_type,
            query_class,
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name, self.query_class, self.query_type
        )
    }
}

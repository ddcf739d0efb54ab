// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Operations, the message envelope and its parts

mod header;
mod message;
mod query;

pub use self::header::{Header, MessageType, OpCode, ResponseCode};
pub use self::message::{scan, Message, MessageVisitor, ScanControl, Section};
pub use self::query::Query;

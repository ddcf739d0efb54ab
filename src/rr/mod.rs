// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Resource record related components, e.g. `Name` aka label, `Record` and `RData`

mod dns_class;
mod name;
pub mod rdata;
mod record_data;
mod record_type;
mod resource;

pub use self::dns_class::DnsClass;
pub use self::name::Name;
pub use self::record_data::RData;
pub use self::record_type::RecordType;
pub use self::resource::Record;

// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Structured record data types. Address and single-name payloads are
//! handled directly by [`RData`](crate::rr::RData).

pub mod mx;
pub mod soa;
pub mod srv;
pub mod txt;

pub use self::mx::MX;
pub use self::soa::SOA;
pub use self::srv::SRV;
pub use self::txt::TXT;

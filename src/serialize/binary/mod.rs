// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Binary serialization types

mod decoder;
mod encoder;

pub use self::decoder::BinDecoder;
pub use self::encoder::{BinEncoder, Place};

use crate::error::{ProtoError, ProtoResult};

/// Wraps a message in the 2-byte big-endian length prefix used over TCP.
///
/// Fails if the message exceeds the 16-bit frame limit.
pub fn tcp_frame(message: &[u8]) -> ProtoResult<Vec<u8>> {
    let len =
        u16::try_from(message.len()).map_err(|_| ProtoError::MaxBufferSizeExceeded(message.len()))?;
    let mut framed = Vec::with_capacity(2 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    Ok(framed)
}

/// A type which can be encoded into the DNS binary format
pub trait BinEncodable {
    /// Write the type to the stream
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()>;

    /// Returns the object in binary form
    fn to_bytes(&self) -> ProtoResult<Vec<u8>> {
        let mut bytes = Vec::<u8>::new();
        {
            let mut encoder = BinEncoder::new(&mut bytes);
            self.emit(&mut encoder)?;
        }

        Ok(bytes)
    }
}

/// A type which can be decoded from the DNS binary format
pub trait BinDecodable<'r>: Sized {
    /// Read the type from the stream
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self>;

    /// Returns the object parsed from its binary form
    fn from_bytes(bytes: &'r [u8]) -> ProtoResult<Self> {
        let mut decoder = BinDecoder::new(bytes);
        Self::read(&mut decoder)
    }
}

impl BinEncodable for u16 {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_u16(*self)
    }
}

impl<'r> BinDecodable<'r> for u16 {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        decoder.read_u16()
    }
}

impl BinEncodable for u32 {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_u32(*self)
    }
}

impl<'r> BinDecodable<'r> for u32 {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        decoder.read_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_frame() {
        let framed = tcp_frame(&[0xAB, 0xCD, 0xEF]).expect("failed to frame");
        assert_eq!(framed, vec![0x00, 0x03, 0xAB, 0xCD, 0xEF]);

        let oversize = vec![0u8; usize::from(u16::MAX) + 1];
        assert!(tcp_frame(&oversize).is_err());
    }
}

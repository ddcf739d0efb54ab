// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! domain name, aka labels, implementation

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{ProtoError, ProtoResult};
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// A domain name: an ordered sequence of labels, leftmost first.
///
/// Names compare and hash case-insensitively, per RFC 1035 section 2.3.3.
/// The label bytes are stored as received; display and comparison fold case,
/// storage does not.
#[derive(Clone, Debug, Default, Eq)]
pub struct Name {
    labels: Vec<Box<[u8]>>,
}

impl Name {
    /// Creates the root name, `.`
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Returns true for the root name
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Parses a dotted ASCII name, e.g. `www.example.com.`
    ///
    /// A single trailing dot is accepted. Empty labels, labels over 63 bytes
    /// and names over 255 octets in wire form are rejected. Character policy
    /// (hostname charset, hyphen placement) is not enforced here; that is the
    /// caller's concern.
    pub fn from_ascii(name: &str) -> ProtoResult<Self> {
        if name.is_empty() || name == "." {
            return Ok(Self::root());
        }

        let mut result = Self::root();
        for label in name.strip_suffix('.').unwrap_or(name).split('.') {
            if label.is_empty() {
                return Err(ProtoError::Form("empty label in name"));
            }
            if label.len() > 63 {
                return Err(ProtoError::LabelBytesTooLong(label.len()));
            }
            result.extend_name(label.as_bytes())?;
        }

        Ok(result)
    }

    /// Returns the length of the name in wire format: each label costs its
    ///  byte length plus one length octet, plus one for the root label.
    pub fn len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Returns true if the name is empty, i.e. the root
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the number of labels in the name, the root is zero
    pub fn num_labels(&self) -> u8 {
        self.labels.len() as u8
    }

    /// Iterates the labels, leftmost first
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(|l| l.as_ref())
    }

    /// Trims the leftmost label, e.g. `www.example.com.` -> `example.com.`
    ///
    /// The root name is its own base.
    pub fn base_name(&self) -> Self {
        Self {
            labels: self.labels.get(1..).unwrap_or_default().to_vec(),
        }
    }

    /// Returns true if this name is a parent of, or equal to, the other
    ///
    /// The root is a zone of all names.
    pub fn zone_of(&self, name: &Self) -> bool {
        if self.labels.len() > name.labels.len() {
            return false;
        }

        self.labels
            .iter()
            .rev()
            .zip(name.labels.iter().rev())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns true for `localhost` and any name under it
    pub fn is_localhost(&self) -> bool {
        self.labels
            .last()
            .map(|l| l.eq_ignore_ascii_case(b"localhost"))
            .unwrap_or(false)
    }

    fn extend_name(&mut self, label: &[u8]) -> ProtoResult<()> {
        self.labels.push(label.into());
        if self.len() > 255 {
            return Err(ProtoError::DomainNameTooLong(self.len()));
        }
        Ok(())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            for b in label.iter() {
                state.write_u8(b.to_ascii_lowercase());
            }
            // label separator, `("ab","c")` must not collide with `("a","bc")`
            state.write_u8(0);
        }
    }
}

impl From<Ipv4Addr> for Name {
    /// The reverse lookup name for the address, under `in-addr.arpa.`
    fn from(addr: Ipv4Addr) -> Self {
        let octets = addr.octets();
        let mut name = Self::root();
        for octet in octets.iter().rev() {
            let label = octet.to_string();
            name.labels.push(label.into_bytes().into_boxed_slice());
        }
        name.labels.push(Box::from(&b"in-addr"[..]));
        name.labels.push(Box::from(&b"arpa"[..]));
        name
    }
}

impl From<Ipv6Addr> for Name {
    /// The reverse lookup name for the address: 32 nibbles under `ip6.arpa.`
    fn from(addr: Ipv6Addr) -> Self {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let octets = addr.octets();
        let mut name = Self::root();
        for octet in octets.iter().rev() {
            name.labels.push(Box::from(&[HEX[(octet & 0x0F) as usize]][..]));
            name.labels.push(Box::from(&[HEX[(octet >> 4) as usize]][..]));
        }
        name.labels.push(Box::from(&b"ip6"[..]));
        name.labels.push(Box::from(&b"arpa"[..]));
        name
    }
}

impl From<IpAddr> for Name {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl BinEncodable for Name {
    /// Emits the name, compressing any suffix that has already been written
    ///  to the message into a 2-byte pointer, per RFC 1035 section 4.1.4.
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        // write all labels to the buffer first, tracking the start of each
        let mut labels_written = Vec::with_capacity(self.labels.len());
        for label in &self.labels {
            if label.len() > 63 {
                return Err(ProtoError::LabelBytesTooLong(label.len()));
            }
            labels_written.push(encoder.offset());
            encoder.emit_character_data(label)?;
        }

        let last_index = encoder.offset();

        // now search for suffixes already stored in the encoder, longest first.
        //   if one is found, rewind to the start of that suffix and finish the
        //   name with a pointer to the previous occurrence instead
        for label_idx in &labels_written {
            if let Some(loc) = encoder.get_label_pointer(*label_idx, last_index) {
                encoder.set_offset(*label_idx);
                encoder.trim();

                // write out the pointer marker
                encoder.emit_u16(0xC000u16 | (loc & 0x3FFF))?;
                return Ok(());
            }

            // store this label pointer to be looked up against later
            encoder.store_label_pointer(*label_idx, last_index);
        }

        // no pointer was written, terminate with the root (null) label
        encoder.emit(0)
    }
}

impl<'r> BinDecodable<'r> for Name {
    /// parses the chain of labels
    ///  this has a max of 255 octets, with each label being less than 63.
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        let mut name = Self::root();
        read_inner(decoder, &mut name, None)?;
        Ok(name)
    }
}

fn read_inner(
    decoder: &mut BinDecoder<'_>,
    name: &mut Name,
    max_idx: Option<usize>,
) -> ProtoResult<()> {
    let mut state = LabelParseState::LabelLengthOrPointer;
    let name_start = decoder.index();

    // pointer: (slice == 1100 0000 aka C0) & C0 == true, then 0x3FFF & slice = offset
    // label: 0x3F & slice = length; slice.next(length) = label
    // root: 0000
    loop {
        // this protects against overlapping labels
        if let Some(max_idx) = max_idx {
            if decoder.index() >= max_idx {
                return Err(ProtoError::LabelOverlapsWithOther {
                    label: name_start,
                    other: max_idx,
                });
            }
        }

        state = match state {
            LabelParseState::LabelLengthOrPointer => {
                // determine what the next label is
                match decoder.peek() {
                    Some(0) => LabelParseState::Root,
                    None => {
                        // Valid names on the wire end in a 0-octet; running out of
                        // bytes before it means the name is invalid.
                        return Err(ProtoError::InsufficientBytes);
                    }
                    Some(byte) if byte & 0b1100_0000 == 0b1100_0000 => LabelParseState::Pointer,
                    Some(byte) if byte & 0b1100_0000 == 0b0000_0000 => LabelParseState::Label,
                    Some(byte) => return Err(ProtoError::UnrecognizedLabelCode(byte)),
                }
            }
            LabelParseState::Label => {
                let label = decoder.read_character_data()?;
                if label.len() > 63 {
                    return Err(ProtoError::LabelBytesTooLong(label.len()));
                }
                name.extend_name(label)?;

                // reset to collect more data
                LabelParseState::LabelLengthOrPointer
            }
            LabelParseState::Pointer => {
                let pointer_location = decoder.index();
                let location = decoder.read_u16()? & 0x3FFF;

                // all pointers must target data strictly prior to this name;
                //  every hop is then strictly decreasing, so cycles cannot form
                if usize::from(location) >= name_start {
                    return Err(ProtoError::PointerNotPriorToLabel {
                        idx: pointer_location,
                        ptr: location,
                    });
                }

                let mut pointer = decoder.clone(location);
                read_inner(&mut pointer, name, Some(name_start))?;

                // Pointers always finish the name, break like Root.
                break;
            }
            LabelParseState::Root => {
                // need to pop() the 0 off the stack...
                decoder.pop()?;
                break;
            }
        }
    }

    if name.len() > 255 {
        return Err(ProtoError::DomainNameTooLong(name.len()));
    }

    Ok(())
}

/// The state of the label parsing state machine
enum LabelParseState {
    LabelLengthOrPointer, // basically the start of the FSM
    Label,                // storing length of the label, must be < 63
    Pointer,              // location of pointer in slice,
    Root,                 // root is the end of the labels list, aka null
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }

        let mut first = true;
        for label in &self.labels {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            write!(f, "{}", String::from_utf8_lossy(label))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ascii() {
        let name = Name::from_ascii("WWW.example.COM").unwrap();
        assert_eq!(name.num_labels(), 3);
        assert_eq!(name.to_string(), "WWW.example.COM");

        // trailing dot accepted, still three labels
        let fqdn = Name::from_ascii("www.example.com.").unwrap();
        assert_eq!(fqdn.num_labels(), 3);
        assert_eq!(name, fqdn);

        assert_eq!(Name::from_ascii(".").unwrap(), Name::root());
        assert!(Name::from_ascii("a..com").is_err());
        assert!(Name::from_ascii(".leading.dot").is_err());

        let long_label = "a".repeat(64);
        assert!(Name::from_ascii(&long_label).is_err());
    }

    #[test]
    fn test_name_too_long() {
        // 4 bytes per label with the length octet, 64 of them busts 255
        let name = vec!["abc"; 64].join(".");
        assert!(matches!(
            Name::from_ascii(&name),
            Err(ProtoError::DomainNameTooLong(_))
        ));
    }

    #[test]
    fn test_case_insensitive_eq_and_hash() {
        use std::collections::hash_map::DefaultHasher;

        let lower = Name::from_ascii("example.com").unwrap();
        let upper = Name::from_ascii("EXAMPLE.COM").unwrap();
        assert_eq!(lower, upper);

        let hash_of = |name: &Name| {
            let mut hasher = DefaultHasher::new();
            name.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash_of(&lower), hash_of(&upper));

        // shifting bytes between labels must change the hash input
        let ab_c = Name::from_ascii("ab.c").unwrap();
        let a_bc = Name::from_ascii("a.bc").unwrap();
        assert_ne!(ab_c, a_bc);
    }

    #[test]
    fn test_base_name_and_zone_of() {
        let www = Name::from_ascii("www.example.com").unwrap();
        let example = Name::from_ascii("example.com").unwrap();
        let com = Name::from_ascii("com").unwrap();

        assert_eq!(www.base_name(), example);
        assert_eq!(example.base_name(), com);
        assert_eq!(com.base_name(), Name::root());
        assert_eq!(Name::root().base_name(), Name::root());

        assert!(example.zone_of(&www));
        assert!(com.zone_of(&www));
        assert!(Name::root().zone_of(&www));
        assert!(!www.zone_of(&example));
        assert!(example.zone_of(&example));

        let other = Name::from_ascii("example.org").unwrap();
        assert!(!example.zone_of(&other));
    }

    #[test]
    fn test_is_localhost() {
        assert!(Name::from_ascii("localhost").unwrap().is_localhost());
        assert!(Name::from_ascii("LocalHost").unwrap().is_localhost());
        assert!(Name::from_ascii("foo.localhost").unwrap().is_localhost());
        assert!(!Name::from_ascii("localhost.com").unwrap().is_localhost());
        assert!(!Name::root().is_localhost());
    }

    #[test]
    fn test_reverse_names() {
        let v4: Name = Ipv4Addr::new(192, 0, 2, 1).into();
        assert_eq!(v4.to_string(), "1.2.0.192.in-addr.arpa");

        let v6: Name = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).into();
        assert_eq!(
            v6.to_string(),
            "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa"
        );
    }

    #[test]
    fn test_emit_with_compression() {
        // the RFC 1035 section 4.1.4 example: F.ISI.ARPA, FOO.F.ISI.ARPA, ARPA
        let mut bytes = Vec::new();
        let mut encoder = BinEncoder::new(&mut bytes);

        Name::from_ascii("f.isi.arpa").unwrap().emit(&mut encoder).unwrap();
        Name::from_ascii("foo.f.isi.arpa")
            .unwrap()
            .emit(&mut encoder)
            .unwrap();
        Name::from_ascii("arpa").unwrap().emit(&mut encoder).unwrap();

        #[rustfmt::skip]
        let expect = vec![
            1, b'f', 3, b'i', b's', b'i', 4, b'a', b'r', b'p', b'a', 0, // f.isi.arpa
            3, b'f', b'o', b'o', 0xC0, 0x00,                            // foo. + ptr(0)
            0xC0, 0x06,                                                 // ptr(6) -> arpa
        ];
        assert_eq!(bytes, expect);

        // and all three read back through the pointers
        let mut decoder = BinDecoder::new(&bytes);
        assert_eq!(
            Name::read(&mut decoder).unwrap(),
            Name::from_ascii("f.isi.arpa").unwrap()
        );
        assert_eq!(
            Name::read(&mut decoder).unwrap(),
            Name::from_ascii("foo.f.isi.arpa").unwrap()
        );
        assert_eq!(
            Name::read(&mut decoder).unwrap(),
            Name::from_ascii("arpa").unwrap()
        );
    }

    #[test]
    fn test_read_rejects_forward_pointer() {
        // a name at offset 0 pointing at itself
        let bytes = [0xC0u8, 0x00];
        let mut decoder = BinDecoder::new(&bytes);
        assert!(matches!(
            Name::read(&mut decoder),
            Err(ProtoError::PointerNotPriorToLabel { .. })
        ));
    }

    #[test]
    fn test_read_rejects_pointer_cycle() {
        // offset 0: label "a" with no terminator, offset 2: label "b" then a
        // pointer back to 0. Reading from offset 6 hops 6 -> 2 -> 0; the
        // innermost read then runs forward into the frame above it, which the
        // overlap guard cuts off.
        let bytes = [1u8, b'a', 1, b'b', 0xC0, 0x00, 0xC0, 0x02];
        let decoder = BinDecoder::new(&bytes);
        let mut jumped = decoder.clone(6);
        assert!(matches!(
            Name::read(&mut jumped),
            Err(ProtoError::LabelOverlapsWithOther { .. })
        ));
    }

    #[test]
    fn test_read_rejects_truncated_name() {
        // label length of 5 but only 2 bytes follow
        let bytes = [5u8, b'a', b'b'];
        let mut decoder = BinDecoder::new(&bytes);
        assert_eq!(
            Name::read(&mut decoder),
            Err(ProtoError::InsufficientBytes)
        );
    }

    #[test]
    fn test_root_roundtrip() {
        let mut bytes = Vec::new();
        let mut encoder = BinEncoder::new(&mut bytes);
        Name::root().emit(&mut encoder).unwrap();
        assert_eq!(bytes, vec![0]);

        let mut decoder = BinDecoder::new(&bytes);
        assert_eq!(Name::read(&mut decoder).unwrap(), Name::root());
    }
}

//! EBCDIC character translation
//!
//! The host sends EBCDIC; the terminal works in Latin-1. A [`CharMap`]
//! translates single bytes in both directions and answers the two
//! questions the data stream interpreter asks of a host byte: can it be
//! written to the screen, and is it an attribute.

use once_cell::sync::Lazy;

use crate::error::ConfigError;

/// EBCDIC CP037 (US/Canada) to Latin-1
#[rustfmt::skip]
pub const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

/// Latin-1 to CP037, the inverse permutation of [`CP037_TO_LATIN1`]
static LATIN1_TO_CP037: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (ebcdic, &latin1) in CP037_TO_LATIN1.iter().enumerate() {
        table[latin1 as usize] = ebcdic as u8;
    }
    table
});

/// DUP character as stored in a field
pub const EBCDIC_DUP: u8 = 0x1C;

/// A named translation table between host and local bytes
#[derive(Debug, Clone, Copy)]
pub struct CharMap {
    name: &'static str,
    to_local: &'static [u8; 256],
    to_remote: &'static [u8; 256],
}

impl CharMap {
    /// Look up a map by name (`"37"` or `"cp037"`).
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "37" | "cp037" | "en" | "us" => Ok(Self {
                name: "37",
                to_local: &CP037_TO_LATIN1,
                to_remote: &LATIN1_TO_CP037,
            }),
            _ => Err(ConfigError::UnknownCharMap { name: name.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Host byte to local. NUL shows as a blank and DUP as `*`.
    #[inline]
    pub fn to_local(&self, ebcdic: u8) -> u8 {
        match ebcdic {
            0x00 => b' ',
            EBCDIC_DUP => b'*',
            _ => self.to_local[ebcdic as usize],
        }
    }

    /// Local byte to host.
    #[inline]
    pub fn to_remote(&self, local: u8) -> u8 {
        self.to_remote[local as usize]
    }

    /// Translate a run of host bytes for display.
    pub fn to_local_string(&self, ebcdic: &[u8]) -> String {
        ebcdic.iter().map(|&b| self.to_local(b) as char).collect()
    }

    /// Translate a local string to host bytes.
    pub fn to_remote_bytes(&self, text: &str) -> Vec<u8> {
        text.chars()
            .map(|c| self.to_remote(u8::try_from(u32::from(c)).unwrap_or(b'?')))
            .collect()
    }

    /// Whether a host byte may be written to the display as data. Order
    /// bytes and the ideographic shifts are not.
    pub fn printable(&self, ebcdic: u8) -> bool {
        !matches!(ebcdic, 0x01..=0x04 | 0x0E | 0x0F | 0x10..=0x15 | 0x1D)
    }

    /// Whether a host byte is a display attribute (top three bits `001`).
    #[inline]
    pub fn attribute(&self, ebcdic: u8) -> bool {
        ebcdic & 0xE0 == 0x20
    }
}

impl Default for CharMap {
    fn default() -> Self {
        Self {
            name: "37",
            to_local: &CP037_TO_LATIN1,
            to_remote: &LATIN1_TO_CP037,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_translation() {
        let map = CharMap::default();
        assert_eq!(map.to_local(0xC1), b'A');
        assert_eq!(map.to_local(0x81), b'a');
        assert_eq!(map.to_local(0xF0), b'0');
        assert_eq!(map.to_local(0x40), b' ');
        assert_eq!(map.to_remote(b'A'), 0xC1);
        assert_eq!(map.to_remote(b'9'), 0xF9);
        assert_eq!(map.to_remote(b'-'), 0x60);
        assert_eq!(map.to_remote(b'}'), 0xD0);
    }

    #[test]
    fn test_special_cases() {
        let map = CharMap::default();
        assert_eq!(map.to_local(0x00), b' ');
        assert_eq!(map.to_local(EBCDIC_DUP), b'*');
    }

    #[test]
    fn test_table_is_a_permutation() {
        let map = CharMap::default();
        for b in 0..=255u8 {
            if b != 0x00 && b != EBCDIC_DUP {
                assert_eq!(map.to_remote(map.to_local(b)), b);
            }
        }
    }

    #[test]
    fn test_printable_and_attribute() {
        let map = CharMap::default();
        for b in [0x01, 0x04, 0x0E, 0x0F, 0x10, 0x13, 0x15, 0x1D] {
            assert!(!map.printable(b), "{:02X}", b);
        }
        assert!(map.printable(0x00));
        assert!(map.printable(0xC1));
        assert!(map.attribute(0x20));
        assert!(map.attribute(0x3F));
        assert!(!map.attribute(0x40));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(CharMap::new("cp037").unwrap().name(), "37");
        assert!(matches!(CharMap::new("klingon"), Err(ConfigError::UnknownCharMap { .. })));
    }

    #[test]
    fn test_string_helpers() {
        let map = CharMap::default();
        let remote = map.to_remote_bytes("HELLO");
        assert_eq!(remote, vec![0xC8, 0xC5, 0xD3, 0xD3, 0xD6]);
        assert_eq!(map.to_local_string(&remote), "HELLO");
    }
}

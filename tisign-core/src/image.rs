//! In-memory program image: the payload bytes plus the bookkeeping
//! the OS-specific repair/signature passes need.

use crate::tlv;
use crate::types::{CalcType, DataType, HashType};

/// Page size for TI-8x/9x Flash memory; signatures and page-boundary
/// fill rules are all expressed in terms of this constant.
pub const PAGE_SIZE: usize = 0x4000;

/// A program image and its associated OS metadata.
///
/// For apps, `header` and `signature` are unused -- the header lives
/// inline at the start of `data`, and the signature is appended
/// directly to `data`. For an OS, the header and signature are kept
/// as separate buffers (the historical format stores the OS image
/// itself as unstructured page data, with header/signature residing
/// in a fixed location discovered via `page_numbers`).
#[derive(Debug, Clone)]
pub struct Image {
    pub calc_type: CalcType,
    pub data_type: DataType,
    pub hash_type: HashType,
    pub data: Vec<u8>,
    pub header: Vec<u8>,
    pub signature: Vec<u8>,
    pub page_numbers: Vec<u32>,
}

impl Image {
    pub fn new(calc_type: CalcType, data_type: DataType, hash_type: HashType) -> Image {
        Image {
            calc_type,
            data_type,
            hash_type,
            data: Vec::new(),
            header: Vec::new(),
            signature: Vec::new(),
            page_numbers: Vec::new(),
        }
    }

    pub fn with_data(
        calc_type: CalcType,
        data_type: DataType,
        hash_type: HashType,
        data: Vec<u8>,
    ) -> Image {
        let mut img = Image::new(calc_type, data_type, hash_type);
        img.data = data;
        img
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Truncate or extend `data` to `length`. New space is filled
    /// with `0xFF`, except that every byte landing exactly on a page
    /// boundary is set to `0x42` (the value boot code expects for an
    /// as-yet-unwritten page header).
    pub fn set_length(&mut self, length: usize) {
        if length <= self.data.len() {
            self.data.truncate(length);
            return;
        }
        let old_len = self.data.len();
        self.data.resize(length, 0xff);

        let first_boundary = (old_len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let mut i = first_boundary;
        while i < length {
            self.data[i] = 0x42;
            i += PAGE_SIZE;
        }
    }

    /// Extract the key ID field: apps use tag `0x8110` if they carry
    /// a TI-9x-style leading byte `0x81`, otherwise `0x8010`.
    pub fn key_id(&self) -> u32 {
        let (hdr, hdrsize): (&[u8], usize) = if !self.header.is_empty() {
            (&self.header, self.header.len())
        } else if !self.data.is_empty() {
            let cap = self.data.len().min(128);
            (&self.data, cap)
        } else {
            return 0;
        };

        if hdr.len() < 2 {
            return 0;
        }
        let (hdrstart, _) = tlv::decode_length(hdr);
        if hdrstart >= hdrsize {
            return 0;
        }
        let body = &hdr[hdrstart..hdrsize.min(hdr.len())];
        if hdr[0] == 0x81 {
            tlv::read_numeric_field(0x8110, body)
        } else {
            tlv::read_numeric_field(0x8010, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_length_fills_ff_and_marks_page_boundary() {
        let mut img = Image::new(CalcType::Ti83Plus, DataType::App, HashType::Md5);
        img.data = vec![0u8; 10];
        img.set_length(PAGE_SIZE + 20);
        assert_eq!(img.data.len(), PAGE_SIZE + 20);
        assert_eq!(img.data[15], 0xff);
        assert_eq!(img.data[PAGE_SIZE], 0x42);
        assert_eq!(img.data[PAGE_SIZE + 1], 0xff);
    }

    #[test]
    fn set_length_truncates() {
        let mut img = Image::new(CalcType::Ti83Plus, DataType::App, HashType::Md5);
        img.data = vec![1, 2, 3, 4, 5];
        img.set_length(3);
        assert_eq!(img.data, vec![1, 2, 3]);
    }

    #[test]
    fn key_id_reads_8010_field_for_ti8x_app() {
        // 80 0F <4-byte len> ... 80 10 02 AA BB ... 80 7F ...
        let mut data = vec![0x80, 0x0f, 0, 0, 0, 10];
        data.extend_from_slice(&[0x80, 0x12, 0xAA, 0xBB]);
        let mut img = Image::new(CalcType::Ti83Plus, DataType::App, HashType::Md5);
        img.data = data;
        assert_eq!(img.key_id(), 0xAABB);
    }
}

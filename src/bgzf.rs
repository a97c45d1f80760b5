//! BGZF block decompression and virtual-offset arithmetic.
//!
//! A BGZF file is a series of independently-deflated gzip blocks, each
//! carrying its compressed size in a `BC` extra subfield and its CRC32 and
//! uncompressed size in the footer. Random access uses virtual offsets: the
//! compressed offset of a block paired with a byte offset into that block's
//! decompressed output.

use crate::{Error, Result};
use std::io::Read;

/// A BGZF block never decompresses to more than 64 KiB, so fetching this
/// many bytes past a block's start is guaranteed to cover the whole block.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

/// Address of a byte in the logical decompressed stream: the high 48 bits
/// are the compressed offset of the containing block, the low 16 bits the
/// offset within that block's decompressed output. Numeric order of the
/// packed value is stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn new(compressed: u64, within_block: u16) -> Self {
        VirtualOffset((compressed << 16) | u64::from(within_block))
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed file offset of the containing block.
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the block's decompressed output.
    pub fn within_block(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

struct BlockHeader {
    /// Total compressed size of the block, header and footer included.
    block_size: usize,
    cdata_start: usize,
    cdata_len: usize,
}

/// Parse one block header at the start of `buf`. `Ok(None)` means `buf` is a
/// truncated prefix of a block; malformed bytes are a format error.
fn parse_block_header(buf: &[u8]) -> Result<Option<BlockHeader>> {
    // Fixed gzip header (12 bytes) plus the 6-byte BC subfield.
    if buf.len() < 18 {
        return Ok(None);
    }
    if buf[0] != 0x1f || buf[1] != 0x8b {
        return Err(Error::Format(format!(
            "bad gzip magic: {:#04x} {:#04x}",
            buf[0], buf[1]
        )));
    }
    if buf[2] != 8 {
        return Err(Error::Format(format!("unsupported compression method {}", buf[2])));
    }
    if buf[3] & 0x04 == 0 {
        return Err(Error::Format("block is missing the gzip extra field".into()));
    }

    let xlen = u16::from_le_bytes([buf[10], buf[11]]) as usize;
    if buf.len() < 12 + xlen {
        return Ok(None);
    }

    // Scan extra subfields for BC, which carries the compressed block size.
    let mut block_size = None;
    let extra = &buf[12..12 + xlen];
    let mut at = 0;
    while at + 4 <= extra.len() {
        let (si1, si2) = (extra[at], extra[at + 1]);
        let slen = u16::from_le_bytes([extra[at + 2], extra[at + 3]]) as usize;
        if si1 == b'B' && si2 == b'C' && slen == 2 && at + 6 <= extra.len() {
            let bsize = u16::from_le_bytes([extra[at + 4], extra[at + 5]]);
            block_size = Some(bsize as usize + 1);
        }
        at += 4 + slen;
    }
    let Some(block_size) = block_size else {
        return Err(Error::Format("block is missing the BC size subfield".into()));
    };

    // Header (12 + xlen) and footer (crc32 + isize) must fit inside the
    // declared block size.
    if block_size < 12 + xlen + 8 {
        return Err(Error::Format(format!("declared block size {block_size} too small")));
    }

    Ok(Some(BlockHeader {
        block_size,
        cdata_start: 12 + xlen,
        cdata_len: block_size - 12 - xlen - 8,
    }))
}

/// Inflate one block (header already parsed) into `out`, validating the
/// footer's CRC32 and uncompressed size.
fn inflate_block(block: &[u8], header: &BlockHeader, out: &mut Vec<u8>) -> Result<()> {
    let cdata = &block[header.cdata_start..header.cdata_start + header.cdata_len];
    let footer = &block[header.block_size - 8..header.block_size];
    let crc_expected = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let isize_expected = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;

    let mut inflated = Vec::with_capacity(isize_expected);
    flate2::read::DeflateDecoder::new(cdata)
        .read_to_end(&mut inflated)
        .map_err(|e| Error::Format(format!("corrupt deflate stream: {e}")))?;

    if inflated.len() != isize_expected {
        return Err(Error::Format(format!(
            "block inflated to {} bytes but footer declares {}",
            inflated.len(),
            isize_expected
        )));
    }
    let mut crc = flate2::Crc::new();
    crc.update(&inflated);
    if crc.sum() != crc_expected {
        return Err(Error::Format("block checksum mismatch".into()));
    }

    out.extend_from_slice(&inflated);
    Ok(())
}

#[derive(Debug)]
struct BlockSpan {
    compressed_offset: u64,
    logical_offset: usize,
}

/// One or more consecutive BGZF blocks inflated into a contiguous logical
/// byte stream, with enough bookkeeping to resolve virtual offsets.
///
/// Blocks are decoded strictly in ascending compressed order; logical
/// offsets are cumulative.
#[derive(Debug)]
pub struct BlockStream {
    data: Vec<u8>,
    spans: Vec<BlockSpan>,
}

impl BlockStream {
    /// Decode blocks from `raw` up to and including the block starting at
    /// `last_block` (a compressed offset relative to `raw`). Over-fetched
    /// trailing bytes past that block are ignored; truncation at or before
    /// it is a format error.
    pub fn decode_through(raw: &[u8], last_block: u64) -> Result<Self> {
        Self::decode(raw, Some(last_block))
    }

    /// Decode every complete block in `raw`, stopping silently at a
    /// truncated tail.
    pub fn decode_available(raw: &[u8]) -> Result<Self> {
        Self::decode(raw, None)
    }

    fn decode(raw: &[u8], last_block: Option<u64>) -> Result<Self> {
        let mut data = Vec::new();
        let mut spans = Vec::new();
        let mut offset = 0usize;

        while offset < raw.len() {
            if let Some(last) = last_block {
                if offset as u64 > last {
                    break;
                }
            }
            let header = match parse_block_header(&raw[offset..])? {
                Some(h) => h,
                None => {
                    return match last_block {
                        // The required block is truncated: the source ran out
                        // of bytes before the chunk's end block.
                        Some(_) => Err(Error::Format(format!(
                            "truncated compressed block at offset {offset}"
                        ))),
                        None => Ok(BlockStream { data, spans }),
                    };
                }
            };
            if offset + header.block_size > raw.len() {
                return match last_block {
                    Some(_) => Err(Error::Format(format!(
                        "truncated compressed block at offset {offset}"
                    ))),
                    None => Ok(BlockStream { data, spans }),
                };
            }

            let logical_offset = data.len();
            inflate_block(&raw[offset..offset + header.block_size], &header, &mut data)?;
            spans.push(BlockSpan {
                compressed_offset: offset as u64,
                logical_offset,
            });
            offset += header.block_size;
        }

        Ok(BlockStream { data, spans })
    }

    /// The logical decompressed stream.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Resolve a virtual offset (compressed offset relative to the decoded
    /// buffer, plus within-block offset) to a logical stream offset. `None`
    /// if no decoded block starts at that compressed offset.
    pub fn logical_at(&self, compressed_offset: u64, within_block: u16) -> Option<usize> {
        self.spans
            .iter()
            .find(|s| s.compressed_offset == compressed_offset)
            .map(|s| s.logical_offset + within_block as usize)
    }
}

/// Inflate every block in `raw` into one logical byte stream. Truncated or
/// malformed blocks anywhere in the buffer are format errors.
pub fn decompress(raw: &[u8]) -> Result<Vec<u8>> {
    let last = (raw.len() as u64).saturating_sub(1);
    Ok(BlockStream::decode_through(raw, last)?.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    /// Build one well-formed BGZF block around `payload`.
    fn block(payload: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        let cdata = enc.finish().unwrap();

        let bsize = 12 + 6 + cdata.len() + 8 - 1;
        let mut out = vec![
            0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0x00, 0xff, // gzip header
            6, 0, // XLEN
            b'B', b'C', 2, 0, // BC subfield
            (bsize & 0xff) as u8,
            (bsize >> 8) as u8,
        ];
        out.extend_from_slice(&cdata);

        let mut crc = flate2::Crc::new();
        crc.update(payload);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out
    }

    #[test]
    fn virtual_offset_packing() {
        let v = VirtualOffset::new(1024, 512);
        assert_eq!(v.compressed(), 1024);
        assert_eq!(v.within_block(), 512);
        assert_eq!(v.as_raw(), (1024 << 16) | 512);
        assert!(VirtualOffset::new(1000, 200) < VirtualOffset::new(1000, 201));
        assert!(VirtualOffset::new(1000, 65535) < VirtualOffset::new(1001, 0));
    }

    #[test]
    fn decompress_concatenated_blocks() {
        let mut raw = block(b"hello ");
        raw.extend_from_slice(&block(b"world"));
        assert_eq!(decompress(&raw).unwrap(), b"hello world");
    }

    #[test]
    fn empty_block_decodes_to_nothing() {
        assert_eq!(decompress(&block(b"")).unwrap(), b"");
    }

    #[test]
    fn logical_offsets_accumulate_across_blocks() {
        let first = block(b"0123456789");
        let second = block(b"abcdef");
        let mut raw = first.clone();
        raw.extend_from_slice(&second);

        let stream = BlockStream::decode_through(&raw, first.len() as u64).unwrap();
        assert_eq!(stream.logical_at(0, 3), Some(3));
        assert_eq!(stream.logical_at(first.len() as u64, 2), Some(12));
        assert_eq!(stream.logical_at(1, 0), None);
        assert_eq!(&stream.data()[10..], b"abcdef");
    }

    #[test]
    fn decode_through_ignores_truncated_tail() {
        let first = block(b"needed");
        let mut raw = first.clone();
        let second = block(b"truncated");
        raw.extend_from_slice(&second[..second.len() / 2]);

        let stream = BlockStream::decode_through(&raw, 0).unwrap();
        assert_eq!(stream.data(), b"needed");
    }

    #[test]
    fn truncation_before_last_block_is_an_error() {
        let raw = block(b"payload");
        let err = BlockStream::decode_through(&raw[..raw.len() - 4], 0).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut raw = block(b"payload");
        raw[0] = 0x42;
        assert!(matches!(decompress(&raw), Err(Error::Format(_))));
    }

    #[test]
    fn footer_size_mismatch_is_a_format_error() {
        let mut raw = block(b"payload");
        let at = raw.len() - 4;
        raw[at..].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(decompress(&raw), Err(Error::Format(_))));
    }

    #[test]
    fn checksum_mismatch_is_a_format_error() {
        let mut raw = block(b"payload");
        let at = raw.len() - 8;
        raw[at..at + 4].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        assert!(matches!(decompress(&raw), Err(Error::Format(_))));
    }
}

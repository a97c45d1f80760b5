//! In-memory BGZF/BAM/BAI fixtures.
//!
//! Tests synthesize real compressed files byte-for-byte instead of checking
//! binaries into the repository: records are hand-packed, blocks deflated
//! with a real compressor, and the index built from the resulting offsets.

#![allow(dead_code)]

use bamtrack::bgzf::VirtualOffset;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

const SEQ_ALPHABET: &[u8; 16] = b"=ACMGRSVTWYHKDBN";
const CIGAR_OPS: &str = "MIDNSHP=X";

/// Wrap `payload` in one well-formed BGZF block.
pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
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

/// A deterministic sequence of the given length.
pub fn bases(len: usize) -> String {
    (0..len).map(|i| b"ACGT"[i % 4] as char).collect()
}

/// Serialize the uncompressed BAM header section.
pub fn encode_header(refs: &[(&str, i32)]) -> Vec<u8> {
    let text = "@HD\tVN:1.6\n";
    let mut out = Vec::new();
    out.extend_from_slice(b"BAM\x01");
    out.extend_from_slice(&(text.len() as i32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for (name, len) in refs {
        out.extend_from_slice(&((name.len() + 1) as i32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&len.to_le_bytes());
    }
    out
}

/// Serialize one alignment record. The sequence length must match the
/// CIGAR's query-consuming span for the record to be well-formed.
pub fn encode_record(
    name: &str,
    ref_id: i32,
    pos: i32,
    flags: u16,
    cigar: &[(u32, char)],
    seq: &str,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&ref_id.to_le_bytes());
    body.extend_from_slice(&pos.to_le_bytes());
    body.push((name.len() + 1) as u8);
    body.push(60); // mapq
    body.extend_from_slice(&0u16.to_le_bytes()); // bin, unused by the reader
    body.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
    body.extend_from_slice(&flags.to_le_bytes());
    body.extend_from_slice(&(seq.len() as i32).to_le_bytes());
    body.extend_from_slice(&(-1i32).to_le_bytes()); // next_refID
    body.extend_from_slice(&(-1i32).to_le_bytes()); // next_pos
    body.extend_from_slice(&0i32.to_le_bytes()); // tlen
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    for (len, op) in cigar {
        let code = CIGAR_OPS.find(*op).expect("valid CIGAR op") as u32;
        body.extend_from_slice(&((len << 4) | code).to_le_bytes());
    }
    let nibbles: Vec<u8> = seq
        .bytes()
        .map(|b| SEQ_ALPHABET.iter().position(|&a| a == b).expect("valid base") as u8)
        .collect();
    for pair in nibbles.chunks(2) {
        body.push((pair[0] << 4) | pair.get(1).copied().unwrap_or(0));
    }
    body.extend_from_slice(&vec![0xff; seq.len()]);

    let mut out = (body.len() as i32).to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

/// Build a BGZF-compressed BAM file plus a matching BAI index.
///
/// The header lands in its own block, then each entry of `record_blocks`
/// becomes one block holding its records back to back, then the EOF marker.
/// The index carries one chunk per record block under bin 4681 (the first
/// 16 Kbp bin) of `target_ref`, so record positions must stay below 16384.
pub fn build_fixture(
    refs: &[(&str, i32)],
    target_ref: usize,
    record_blocks: &[Vec<Vec<u8>>],
) -> (Vec<u8>, Vec<u8>) {
    let mut bam = bgzf_block(&encode_header(refs));

    let mut chunks: Vec<(u64, u64)> = Vec::new();
    for records in record_blocks {
        let payload: Vec<u8> = records.iter().flatten().copied().collect();
        assert!(payload.len() < 1 << 16, "record block too large for one chunk");
        let begin = VirtualOffset::new(bam.len() as u64, 0);
        let end = VirtualOffset::new(bam.len() as u64, payload.len() as u16);
        chunks.push((begin.as_raw(), end.as_raw()));
        bam.extend_from_slice(&bgzf_block(&payload));
    }
    bam.extend_from_slice(&bgzf_block(b"")); // EOF marker

    let mut bai = Vec::new();
    bai.extend_from_slice(b"BAI\x01");
    bai.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for i in 0..refs.len() {
        if i == target_ref && !chunks.is_empty() {
            bai.extend_from_slice(&1i32.to_le_bytes()); // n_bin
            bai.extend_from_slice(&4681u32.to_le_bytes());
            bai.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (begin, end) in &chunks {
                bai.extend_from_slice(&begin.to_le_bytes());
                bai.extend_from_slice(&end.to_le_bytes());
            }
            bai.extend_from_slice(&1i32.to_le_bytes()); // n_intv
            bai.extend_from_slice(&chunks[0].0.to_le_bytes());
        } else {
            bai.extend_from_slice(&0i32.to_le_bytes()); // n_bin
            bai.extend_from_slice(&0i32.to_le_bytes()); // n_intv
        }
    }
    (bam, bai)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

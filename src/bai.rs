//! BAI index parsing and genomic-range queries.
//!
//! A BAI index maps, per reference sequence, hierarchical bins to chunk
//! lists (pairs of virtual offsets into the compressed file) and carries a
//! linear index of minimum offsets per 16 Kbp window. Querying a range
//! selects candidate bins, prunes chunks with the linear index, and merges
//! the survivors so a fetch plan touches as few byte ranges as possible.

use crate::bgzf::VirtualOffset;
use crate::{Error, Result};
use std::collections::HashMap;

const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// Width of one linear-index window (16 Kbp).
const LINEAR_WINDOW_SHIFT: i64 = 14;

/// A contiguous compressed-byte span known to hold records for one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub begin: VirtualOffset,
    pub end: VirtualOffset,
}

impl Chunk {
    pub fn new(begin: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { begin, end }
    }
}

/// Binning and linear index for one reference sequence.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    bins: HashMap<u32, Vec<Chunk>>,
    intervals: Vec<VirtualOffset>,
}

impl ReferenceIndex {
    /// Minimum virtual offset at which records overlapping a window that
    /// starts at `start` can begin, per the linear index.
    fn min_offset(&self, start: i64) -> Option<VirtualOffset> {
        if self.intervals.is_empty() {
            return None;
        }
        let window = (start.max(0) >> LINEAR_WINDOW_SHIFT) as usize;
        match self.intervals.get(window) {
            Some(v) => Some(*v),
            None => self.intervals.last().copied(),
        }
    }
}

/// Parsed BAI index.
#[derive(Debug, Clone)]
pub struct BaiIndex {
    references: Vec<ReferenceIndex>,
    /// Count of unplaced reads, when the writer appended it.
    n_no_coor: Option<u64>,
}

impl BaiIndex {
    /// Parse a complete BAI index. Bad magic or truncation is a format
    /// error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;

        let magic = take(bytes, &mut pos, 4)?;
        if magic != BAI_MAGIC {
            return Err(Error::Format("not a BAI index: bad magic".into()));
        }

        let n_ref = read_i32(bytes, &mut pos)?;
        if n_ref < 0 {
            return Err(Error::Format(format!("negative reference count {n_ref}")));
        }

        let mut references = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            references.push(Self::parse_reference(bytes, &mut pos)?);
        }

        let n_no_coor = if bytes.len() - pos >= 8 {
            Some(read_u64(bytes, &mut pos)?)
        } else {
            None
        };

        Ok(BaiIndex {
            references,
            n_no_coor,
        })
    }

    fn parse_reference(bytes: &[u8], pos: &mut usize) -> Result<ReferenceIndex> {
        let n_bin = read_i32(bytes, pos)?;
        if n_bin < 0 {
            return Err(Error::Format(format!("negative bin count {n_bin}")));
        }

        let mut bins = HashMap::with_capacity(n_bin as usize);
        for _ in 0..n_bin {
            let bin_id = read_u32(bytes, pos)?;
            let n_chunk = read_i32(bytes, pos)?;
            if n_chunk < 0 {
                return Err(Error::Format(format!("negative chunk count {n_chunk}")));
            }
            let mut chunks = Vec::with_capacity(n_chunk as usize);
            for _ in 0..n_chunk {
                let begin = VirtualOffset::from_raw(read_u64(bytes, pos)?);
                let end = VirtualOffset::from_raw(read_u64(bytes, pos)?);
                chunks.push(Chunk::new(begin, end));
            }
            bins.insert(bin_id, chunks);
        }

        let n_intv = read_i32(bytes, pos)?;
        if n_intv < 0 {
            return Err(Error::Format(format!("negative interval count {n_intv}")));
        }
        let mut intervals = Vec::with_capacity(n_intv as usize);
        for _ in 0..n_intv {
            intervals.push(VirtualOffset::from_raw(read_u64(bytes, pos)?));
        }

        Ok(ReferenceIndex { bins, intervals })
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn unplaced_read_count(&self) -> Option<u64> {
        self.n_no_coor
    }

    /// Chunks that may hold records overlapping `[start, stop]` on the given
    /// reference, sorted by begin offset and merged so overlapping or
    /// touching spans fetch once. An out-of-range `ref_id` yields an empty
    /// list: absence of data is a valid outcome, not an error.
    pub fn query(&self, ref_id: usize, start: i64, stop: i64) -> Vec<Chunk> {
        let Some(reference) = self.references.get(ref_id) else {
            return Vec::new();
        };

        let mut chunks = Vec::new();
        for bin in region_to_bins(start, stop) {
            if let Some(bin_chunks) = reference.bins.get(&bin) {
                chunks.extend_from_slice(bin_chunks);
            }
        }

        // The linear index bounds where records overlapping `start` can
        // begin; chunks that end before that bound cannot contribute.
        if let Some(min_offset) = reference.min_offset(start) {
            chunks.retain(|c| c.end >= min_offset);
        }

        merge_chunks(chunks)
    }

    /// Smallest nonzero record offset anywhere in the index. Everything
    /// before it in the compressed file is header data.
    pub fn min_record_offset(&self) -> Option<VirtualOffset> {
        self.references
            .iter()
            .flat_map(|r| {
                r.bins
                    .values()
                    .flatten()
                    .map(|c| c.begin)
                    .chain(r.intervals.iter().copied())
            })
            .filter(|v| !v.is_zero())
            .min()
    }
}

/// Bin ids that can overlap `[start, stop]` (stop inclusive) under the SAM
/// hierarchical binning scheme: six levels from one 512 Mbp bin down to
/// 16 Kbp bins.
fn region_to_bins(start: i64, stop: i64) -> Vec<u32> {
    let start = start.max(0);
    let stop = stop.max(start);

    let mut bins = vec![0u32];
    for shift in (14..=26).step_by(3) {
        let offset = ((1i64 << (29 - shift)) - 1) / 7;
        for bin in (offset + (start >> shift))..=(offset + (stop >> shift)) {
            bins.push(bin as u32);
        }
    }
    bins
}

/// Sort by begin offset and merge chunks whose spans overlap or touch.
fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    if chunks.is_empty() {
        return chunks;
    }
    chunks.sort_by_key(|c| c.begin);

    let mut merged = Vec::with_capacity(chunks.len());
    let mut current = chunks[0];
    for chunk in chunks.into_iter().skip(1) {
        if chunk.begin <= current.end {
            current.end = current.end.max(chunk.end);
        } else {
            merged.push(current);
            current = chunk;
        }
    }
    merged.push(current);
    merged
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    if *pos + n > bytes.len() {
        return Err(Error::Format(format!("truncated index at offset {pos}")));
    }
    let slice = &bytes[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

fn read_i32(bytes: &[u8], pos: &mut usize) -> Result<i32> {
    let b = take(bytes, pos, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let b = take(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let b = take(bytes, pos, 8)?;
    Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

//! Indexed BAM reading.
//!
//! [`BamReader`] ties the pieces together: it resolves a genomic range to
//! compressed chunks through the BAI index, fetches and inflates those
//! chunks through a [`ByteRangeSource`], and decodes the alignment records
//! that overlap the range.

pub mod cigar;
pub mod header;
pub mod record;

pub use cigar::{CigarOp, CigarOpKind, cigar_string};
pub use header::{BamHeader, Reference};
pub use record::Record;

pub(crate) use record::RecordKey;

use crate::bai::{BaiIndex, Chunk};
use crate::bgzf::{BlockStream, MAX_BLOCK_SIZE};
use crate::interval::ContigInterval;
use crate::storage::ByteRangeSource;
use crate::{Error, Result};
use record::RawRecord;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

/// Header window when the index carries no record offsets to bound it.
const DEFAULT_HEADER_SPAN: u64 = 256 * 1024;

/// Bounds-checked little-endian cursor over a decoded byte stream.
pub(crate) struct Cursor<'a> {
    pub(crate) buf: &'a [u8],
    pub(crate) pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::Format(format!(
                "unexpected end of stream at offset {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Random-access reader over a BAM file and its BAI index, each behind a
/// byte-range source. The index and header are fetched lazily, once.
pub struct BamReader<S> {
    data: Arc<S>,
    index_source: Arc<S>,
    index: OnceCell<BaiIndex>,
    header: OnceCell<BamHeader>,
}

impl<S: ByteRangeSource + 'static> BamReader<S> {
    pub fn new(data: S, index: S) -> Self {
        BamReader {
            data: Arc::new(data),
            index_source: Arc::new(index),
            index: OnceCell::new(),
            header: OnceCell::new(),
        }
    }

    /// The BAI index, fetched and parsed on first use.
    pub async fn index(&self) -> Result<&BaiIndex> {
        self.index
            .get_or_try_init(|| async {
                let bytes = self.index_source.fetch(0, u64::MAX).await?;
                let index = BaiIndex::parse(&bytes)?;
                tracing::debug!("loaded BAI index covering {} references", index.reference_count());
                Ok(index)
            })
            .await
    }

    /// The BAM header, fetched and parsed on first use. The fetch window is
    /// bounded by the index's smallest record offset: everything before the
    /// first record is header data.
    pub async fn header(&self) -> Result<&BamHeader> {
        self.header
            .get_or_try_init(|| async {
                let index = self.index().await?;
                let span = index
                    .min_record_offset()
                    .map(|v| v.compressed())
                    .filter(|&c| c > 0)
                    .unwrap_or(DEFAULT_HEADER_SPAN);
                let raw = self.data.fetch(0, span + MAX_BLOCK_SIZE as u64 - 1).await?;
                let stream = BlockStream::decode_available(&raw)?;
                let header = BamHeader::parse(stream.data())?;
                tracing::debug!(
                    "loaded BAM header declaring {} reference sequences",
                    header.references.len()
                );
                Ok(header)
            })
            .await
    }

    /// All alignment records overlapping `range`, in position order.
    ///
    /// Chunk fetches run concurrently with join semantics: the call
    /// resolves only once every chunk has been fetched and inflated, and
    /// fails as a whole (no partial list) if any chunk fails. A contig the
    /// header does not declare yields an empty list.
    pub async fn get_alignments_in_range(&self, range: &ContigInterval) -> Result<Vec<Record>> {
        let header = self.header().await?;
        let index = self.index().await?;

        let Some(ref_id) = header.ref_id(&range.contig) else {
            tracing::debug!("contig {} not present in header", range.contig);
            return Ok(Vec::new());
        };

        let chunks = index.query(ref_id, range.start(), range.stop());
        tracing::debug!("{} chunk(s) cover {range}", chunks.len());
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut tasks = JoinSet::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let data = Arc::clone(&self.data);
            let chunk = *chunk;
            tasks.spawn(async move {
                let begin = chunk.begin.compressed();
                let end = chunk.end.compressed() + (MAX_BLOCK_SIZE as u64 - 1);
                let raw = data.fetch(begin, end).await?;
                let stream = BlockStream::decode_through(
                    &raw,
                    chunk.end.compressed().saturating_sub(begin),
                )?;
                Ok::<_, Error>((i, stream))
            });
        }

        let mut streams = Vec::with_capacity(chunks.len());
        while let Some(joined) = tasks.join_next().await {
            let (i, stream) =
                joined.map_err(|e| Error::Network(format!("chunk fetch task failed: {e}")))??;
            streams.push((i, stream));
        }
        streams.sort_by_key(|(i, _)| *i);

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (i, stream) in streams {
            parse_chunk(&chunks[i], &stream, header, ref_id, range, &mut seen, &mut records)?;
        }
        tracing::debug!("{} record(s) overlap {range}", records.len());
        Ok(records)
    }
}

/// Decode the records of one inflated chunk, keeping those that overlap the
/// query range on the queried reference.
fn parse_chunk(
    chunk: &Chunk,
    stream: &BlockStream,
    header: &BamHeader,
    ref_id: usize,
    range: &ContigInterval,
    seen: &mut HashSet<RecordKey>,
    records: &mut Vec<Record>,
) -> Result<()> {
    let data = stream.data();
    let start = stream
        .logical_at(0, chunk.begin.within_block())
        .unwrap_or(0);
    let end_block = chunk.end.compressed().saturating_sub(chunk.begin.compressed());
    let end = stream
        .logical_at(end_block, chunk.end.within_block())
        .unwrap_or(data.len());

    let mut cur = Cursor::new(data);
    cur.pos = start;
    while cur.pos < end.min(data.len()) {
        let raw = RawRecord::parse(&mut cur)?;
        // Records are coordinate-sorted: nothing after this can overlap.
        if raw.position > range.stop() {
            break;
        }
        if raw.ref_id != ref_id as i32 {
            continue;
        }
        let Some(record) = raw.resolve(header) else {
            continue;
        };
        if !record.interval().intersects(&range.interval) {
            continue;
        }
        if seen.insert(record.key()) {
            records.push(record);
        }
    }
    Ok(())
}

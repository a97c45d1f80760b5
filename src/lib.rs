//! Random-access retrieval and visual layout of BAM sequencing reads.
//!
//! The pipeline, bottom to top: a genomic range is resolved to compressed
//! byte chunks through the BAI index ([`bai`]), the chunks are fetched over
//! a pluggable [`ByteRangeSource`] and inflated from their BGZF blocks
//! ([`bgzf`]), alignment records are decoded from the logical stream
//! ([`bam`]), and the view layer derives per-op render descriptors and
//! reference mismatches ([`opinfo`]) plus non-overlapping display rows
//! ([`pileup`]). [`CachingBamSource`] caches fetched ranges and coalesces
//! in-flight requests so a viewport never loads the same bytes twice.
//!
//! ```no_run
//! use bamtrack::{BamReader, ContigInterval, FileSource};
//!
//! # #[tokio::main]
//! # async fn main() -> bamtrack::Result<()> {
//! let reader = BamReader::new(
//!     FileSource::new("alignments.bam"),
//!     FileSource::new("alignments.bam.bai"),
//! );
//!
//! let range = ContigInterval::new("chr20", 31_511_349, 31_514_172);
//! for read in reader.get_alignments_in_range(&range).await? {
//!     println!("{read} {}", read.cigar_string());
//! }
//! # Ok(())
//! # }
//! ```

pub mod bai;
pub mod bam;
pub mod bgzf;
pub mod cache;
pub mod error;
pub mod interval;
pub mod opinfo;
pub mod pileup;
pub mod reference;
pub mod storage;

pub use bam::{BamHeader, BamReader, CigarOp, CigarOpKind, Record};
pub use cache::{CachingBamSource, Notification};
pub use error::{Error, ErrorKind, Result};
pub use interval::{ContigInterval, Interval, same_contig};
pub use opinfo::{Arrow, Mismatch, OpDescriptor, OpInfo, get_op_info};
pub use pileup::{add_to_pileup, pileup};
pub use reference::{ReferenceSource, StringReference};
pub use storage::{ByteRangeSource, FileSource, MemorySource};

//! Render descriptors and reference mismatches for one alignment.
//!
//! A track renderer draws each read as a run of CIGAR-shaped segments with
//! an arrow at the read's 3' tip and a tick for every base differing from
//! the reference. [`get_op_info`] derives all of that in one pass.

use crate::bam::{CigarOpKind, Record};
use crate::reference::ReferenceSource;

/// Direction marker at a read's tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Left,
    Right,
}

/// One render descriptor per CIGAR op. `pos` is the reference position the
/// op is drawn at: reference-consuming ops advance it, while insertions and
/// clips anchor at the position they interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpDescriptor {
    pub op: CigarOpKind,
    pub length: u32,
    pub pos: i64,
    pub arrow: Option<Arrow>,
}

/// A read base differing from the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub pos: i64,
    /// The read's base at `pos`.
    pub base: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpInfo {
    pub ops: Vec<OpDescriptor>,
    pub mismatches: Vec<Mismatch>,
}

/// Derive render descriptors and mismatches for `record`.
///
/// The mismatch scan anchors at `position - leading soft-clip length` and
/// compares every M/=/X and S stretch base-by-base against the reference,
/// fetched with a single batched lookup. Soft-clipped bases are scanned
/// like matches; insertions and deletions never contribute mismatches. The
/// mismatch list is empty, never omitted, when nothing differs.
pub fn get_op_info(record: &Record, reference: &impl ReferenceSource) -> OpInfo {
    let mut ops = Vec::with_capacity(record.cigar.len());
    let mut pos = record.position;
    for op in &record.cigar {
        ops.push(OpDescriptor {
            op: op.kind,
            length: op.len,
            pos,
            arrow: None,
        });
        pos += op.reference_len();
    }

    // The arrow marks the read's 3' tip: the first reference-consuming op
    // for reverse-strand reads, the last for forward-strand reads.
    if record.is_reverse() {
        if let Some(d) = ops.iter_mut().find(|d| d.op.consumes_reference()) {
            d.arrow = Some(Arrow::Left);
        }
    } else if let Some(d) = ops.iter_mut().rev().find(|d| d.op.consumes_reference()) {
        d.arrow = Some(Arrow::Right);
    }

    OpInfo {
        ops,
        mismatches: find_mismatches(record, reference),
    }
}

/// Ops whose bases are compared against the reference. Soft clips are
/// scanned like matches, anchored before the record position; insertions
/// stay excluded.
fn scans_reference(kind: CigarOpKind) -> bool {
    matches!(
        kind,
        CigarOpKind::Match | CigarOpKind::SeqMatch | CigarOpKind::SeqMismatch | CigarOpKind::SoftClip
    )
}

fn find_mismatches(record: &Record, reference: &impl ReferenceSource) -> Vec<Mismatch> {
    let leading_clip: i64 = record
        .cigar
        .iter()
        .take_while(|op| !op.kind.consumes_reference())
        .filter(|op| op.kind == CigarOpKind::SoftClip)
        .map(|op| i64::from(op.len))
        .sum();
    let scan_start = record.position - leading_clip;

    // Walk once to find the span of compared stretches, so the reference is
    // fetched in one batched lookup.
    let mut scan_end = scan_start;
    {
        let mut p = scan_start;
        for op in &record.cigar {
            if scans_reference(op.kind) {
                p += i64::from(op.len);
                scan_end = scan_end.max(p);
            } else if op.kind.consumes_reference() {
                p += i64::from(op.len);
            }
        }
    }
    if scan_end <= scan_start {
        return Vec::new();
    }

    let fetch_start = scan_start.max(0);
    let ref_bases = reference.get_range_as_string(&record.contig, fetch_start, scan_end - 1);
    let ref_bases = ref_bases.as_bytes();
    let seq = record.sequence.as_bytes();

    let mut mismatches = Vec::new();
    let mut ref_pos = scan_start;
    let mut seq_pos = 0usize;
    for op in &record.cigar {
        let n = op.len as usize;
        if scans_reference(op.kind) {
            for i in 0..n {
                let p = ref_pos + i as i64;
                let q = seq_pos + i;
                if p < fetch_start || q >= seq.len() {
                    continue;
                }
                let r = (p - fetch_start) as usize;
                if r >= ref_bases.len() {
                    continue;
                }
                if ref_bases[r] != seq[q] {
                    mismatches.push(Mismatch {
                        pos: p,
                        base: seq[q] as char,
                    });
                }
            }
            ref_pos += n as i64;
            seq_pos += n;
        } else {
            match op.kind {
                CigarOpKind::Deletion | CigarOpKind::Skip => ref_pos += n as i64,
                CigarOpKind::Insertion => seq_pos += n,
                _ => {}
            }
        }
    }
    tracing::trace!(
        "{} mismatch(es) for read {} at {}",
        mismatches.len(),
        record.name,
        record.position
    );
    mismatches
}

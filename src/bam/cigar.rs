//! CIGAR decoding and rendering.
//!
//! BAM stores each CIGAR element as a 32-bit integer: the low 4 bits encode
//! the operation, the high 28 its length. Rendering concatenates
//! `length + opChar` in stored order, reproducing the canonical string
//! (`37M4D64M`).

use crate::{Error, Result};
use std::fmt;

/// CIGAR operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOpKind {
    /// Alignment match or mismatch (M)
    Match,
    /// Insertion to the reference (I)
    Insertion,
    /// Deletion from the reference (D)
    Deletion,
    /// Skipped reference region, e.g. an intron (N)
    Skip,
    /// Soft clip: bases present in the read but not aligned (S)
    SoftClip,
    /// Hard clip: bases absent from the read (H)
    HardClip,
    /// Padding (P)
    Pad,
    /// Sequence match (=)
    SeqMatch,
    /// Sequence mismatch (X)
    SeqMismatch,
}

impl CigarOpKind {
    pub(crate) fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => CigarOpKind::Match,
            1 => CigarOpKind::Insertion,
            2 => CigarOpKind::Deletion,
            3 => CigarOpKind::Skip,
            4 => CigarOpKind::SoftClip,
            5 => CigarOpKind::HardClip,
            6 => CigarOpKind::Pad,
            7 => CigarOpKind::SeqMatch,
            8 => CigarOpKind::SeqMismatch,
            other => {
                return Err(Error::Format(format!("invalid CIGAR operation code {other}")));
            }
        })
    }

    pub fn as_char(self) -> char {
        match self {
            CigarOpKind::Match => 'M',
            CigarOpKind::Insertion => 'I',
            CigarOpKind::Deletion => 'D',
            CigarOpKind::Skip => 'N',
            CigarOpKind::SoftClip => 'S',
            CigarOpKind::HardClip => 'H',
            CigarOpKind::Pad => 'P',
            CigarOpKind::SeqMatch => '=',
            CigarOpKind::SeqMismatch => 'X',
        }
    }

    /// Whether this operation advances the reference position (M, D, N, =, X).
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::Deletion
                | CigarOpKind::Skip
                | CigarOpKind::SeqMatch
                | CigarOpKind::SeqMismatch
        )
    }

    /// Whether this operation consumes read bases (M, I, S, =, X).
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::Insertion
                | CigarOpKind::SoftClip
                | CigarOpKind::SeqMatch
                | CigarOpKind::SeqMismatch
        )
    }
}

/// One (kind, length) CIGAR element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    pub kind: CigarOpKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        CigarOp { kind, len }
    }

    pub(crate) fn from_packed(raw: u32) -> Result<Self> {
        Ok(CigarOp {
            kind: CigarOpKind::from_code(raw & 0xf)?,
            len: raw >> 4,
        })
    }

    /// Reference bases this op spans (zero for I, S, H, P).
    pub fn reference_len(&self) -> i64 {
        if self.kind.consumes_reference() {
            i64::from(self.len)
        } else {
            0
        }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.as_char())
    }
}

/// Decode `n_ops` packed 32-bit CIGAR elements from `data`.
pub fn parse_cigar(data: &[u8], n_ops: usize) -> Result<Vec<CigarOp>> {
    if data.len() < n_ops * 4 {
        return Err(Error::Format(format!(
            "CIGAR needs {} bytes for {} operations, got {}",
            n_ops * 4,
            n_ops,
            data.len()
        )));
    }

    let mut ops = Vec::with_capacity(n_ops);
    for i in 0..n_ops {
        let at = i * 4;
        let raw = u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        ops.push(CigarOp::from_packed(raw)?);
    }
    Ok(ops)
}

/// Canonical CIGAR string: `length + opChar` in stored order, zero-length
/// ops omitted.
pub fn cigar_string(ops: &[CigarOp]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for op in ops.iter().filter(|op| op.len > 0) {
        let _ = write!(out, "{op}");
    }
    out
}

/// Total reference span of a CIGAR.
pub fn reference_length(ops: &[CigarOp]) -> i64 {
    ops.iter().map(CigarOp::reference_len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(len: u32, code: u32) -> [u8; 4] {
        ((len << 4) | code).to_le_bytes()
    }

    #[test]
    fn parses_packed_operations() {
        let mut data = Vec::new();
        data.extend_from_slice(&packed(37, 0));
        data.extend_from_slice(&packed(4, 2));
        data.extend_from_slice(&packed(64, 0));

        let ops = parse_cigar(&data, 3).unwrap();
        assert_eq!(ops[0], CigarOp::new(CigarOpKind::Match, 37));
        assert_eq!(ops[1], CigarOp::new(CigarOpKind::Deletion, 4));
        assert_eq!(ops[2], CigarOp::new(CigarOpKind::Match, 64));
    }

    #[test]
    fn renders_canonical_strings() {
        let ops = vec![
            CigarOp::new(CigarOpKind::Match, 37),
            CigarOp::new(CigarOpKind::Deletion, 4),
            CigarOp::new(CigarOpKind::Match, 64),
        ];
        assert_eq!(cigar_string(&ops), "37M4D64M");

        let ops = vec![
            CigarOp::new(CigarOpKind::SoftClip, 66),
            CigarOp::new(CigarOpKind::Match, 35),
        ];
        assert_eq!(cigar_string(&ops), "66S35M");
    }

    #[test]
    fn zero_length_ops_are_omitted_from_rendering() {
        let ops = vec![
            CigarOp::new(CigarOpKind::Match, 10),
            CigarOp::new(CigarOpKind::Insertion, 0),
            CigarOp::new(CigarOpKind::Match, 5),
        ];
        assert_eq!(cigar_string(&ops), "10M5M");
    }

    #[test]
    fn reference_length_counts_only_reference_ops() {
        let ops = vec![
            CigarOp::new(CigarOpKind::SoftClip, 66),
            CigarOp::new(CigarOpKind::Match, 35),
            CigarOp::new(CigarOpKind::Insertion, 20),
            CigarOp::new(CigarOpKind::Skip, 100),
            CigarOp::new(CigarOpKind::Deletion, 4),
        ];
        assert_eq!(reference_length(&ops), 35 + 100 + 4);
    }

    #[test]
    fn invalid_operation_code_is_a_format_error() {
        let data = packed(1, 9);
        assert!(matches!(parse_cigar(&data, 1), Err(Error::Format(_))));
    }

    #[test]
    fn short_buffer_is_a_format_error() {
        assert!(matches!(parse_cigar(&[0u8; 2], 1), Err(Error::Format(_))));
    }
}

//! BAM header parsing and contig resolution.

use super::Cursor;
use crate::interval::contig_key;
use crate::{Error, Result};
use std::collections::HashMap;

const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// One reference sequence declared by the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub length: i64,
}

/// Decoded BAM header: SAM text plus the ordered reference dictionary that
/// record refIDs index into.
#[derive(Debug, Clone)]
pub struct BamHeader {
    pub text: String,
    pub references: Vec<Reference>,
    lookup: HashMap<String, usize>,
}

impl BamHeader {
    /// Parse a header from the start of the logical (decompressed) stream.
    /// The stream may extend past the header; trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);

        let magic = cur.take(4)?;
        if magic != BAM_MAGIC {
            return Err(Error::Format("not a BAM file: bad magic".into()));
        }

        let l_text = cur.i32()?;
        if l_text < 0 {
            return Err(Error::Format(format!("negative header text length {l_text}")));
        }
        let text = String::from_utf8_lossy(cur.take(l_text as usize)?).into_owned();

        let n_ref = cur.i32()?;
        if n_ref < 0 {
            return Err(Error::Format(format!("negative reference count {n_ref}")));
        }

        let mut references = Vec::with_capacity(n_ref as usize);
        let mut lookup = HashMap::with_capacity(n_ref as usize);
        for i in 0..n_ref as usize {
            let l_name = cur.i32()?;
            if l_name <= 0 {
                return Err(Error::Format(format!("invalid reference name length {l_name}")));
            }
            let raw_name = cur.take(l_name as usize)?;
            // The stored name is NUL-terminated.
            let name = String::from_utf8_lossy(raw_name.strip_suffix(&[0u8][..]).unwrap_or(raw_name))
                .into_owned();
            let length = i64::from(cur.i32()?);

            lookup.insert(contig_key(&name).to_string(), i);
            references.push(Reference { name, length });
        }

        Ok(BamHeader {
            text,
            references,
            lookup,
        })
    }

    /// Resolve a contig name to its reference id, tolerating a `chr` prefix
    /// on either side.
    pub fn ref_id(&self, contig: &str) -> Option<usize> {
        self.lookup.get(contig_key(contig)).copied()
    }

    pub fn reference_name(&self, ref_id: usize) -> Option<&str> {
        self.references.get(ref_id).map(|r| r.name.as_str())
    }
}

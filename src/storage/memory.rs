use super::ByteRangeSource;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// In-memory byte-range source, for tests and for clients that already hold
/// the whole file.
#[derive(Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ByteRangeSource for MemorySource {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes> {
        let len = self.data.len() as u64;
        if start >= len {
            return Ok(Bytes::new());
        }
        let stop = end.min(len - 1);
        Ok(self.data.slice(start as usize..=stop as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_is_inclusive_and_clamped() {
        let source = MemorySource::new(&b"abcdef"[..]);
        assert_eq!(&source.fetch(1, 3).await.unwrap()[..], b"bcd");
        assert_eq!(&source.fetch(4, u64::MAX).await.unwrap()[..], b"ef");
        assert!(source.fetch(6, 10).await.unwrap().is_empty());
    }
}

use super::ByteRangeSource;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Local-filesystem byte-range source.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ByteRangeSource for FileSource {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes> {
        let mut file = fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if start >= len {
            return Ok(Bytes::new());
        }

        let stop = end.min(len - 1);
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; (stop - start + 1) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

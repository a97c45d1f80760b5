//! Byte-range transport abstraction.
//!
//! Everything the reader fetches goes through [`ByteRangeSource`], so the
//! same code serves local files, in-memory buffers, and whatever remote
//! transport a client plugs in.
//!
//! # Implementations
//!
//! - [`FileSource`] - local filesystem
//! - [`MemorySource`] - pre-loaded in-memory buffer

mod local;
mod memory;

pub use local::FileSource;
pub use memory::MemorySource;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Random-access byte fetch capability.
#[async_trait]
pub trait ByteRangeSource: Send + Sync {
    /// Fetch the bytes in `[start, end]` (end inclusive; `u64::MAX` reads to
    /// the end of the data). A range extending past end-of-data is clamped
    /// and the available prefix returned; a failure is a fetch failure for
    /// the whole range.
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes>;
}

#[async_trait]
impl<T: ByteRangeSource + ?Sized> ByteRangeSource for Arc<T> {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes> {
        (**self).fetch(start, end).await
    }
}

//! Caching alignment data source.
//!
//! [`CachingBamSource`] sits between a viewport and a [`BamReader`]: reads
//! are synchronous snapshots of whatever is cached, while `range_changed`
//! fires asynchronous loads for the uncovered parts of a viewport and
//! notifies subscribers as data lands. A range is never fetched twice:
//! covered and in-flight spans are subtracted from every request before any
//! fetch is issued.

use crate::bam::{BamReader, Record, RecordKey};
use crate::interval::{ContigInterval, Interval, contig_key};
use crate::storage::ByteRangeSource;
use crate::ErrorKind;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Requests are widened to this granularity before gap subtraction, so a
/// viewport scrubbing across a region issues few, coalescible fetches.
const FETCH_GRANULARITY: i64 = 1000;

/// Event delivered to subscribers as cache contents change.
#[derive(Debug, Clone)]
pub enum Notification {
    /// New records were merged into the cache; re-query to observe them.
    NewData,
    /// A fetch failed; its range stays uncovered and retryable.
    Error {
        kind: ErrorKind,
        message: String,
        range: ContigInterval,
    },
}

#[derive(Default)]
struct ContigCache {
    covered: Vec<Interval>,
    pending: Vec<Interval>,
    records: Vec<Record>,
    seen: HashSet<RecordKey>,
}

type CacheState = HashMap<String, ContigCache>;

/// Stateful caching façade over a [`BamReader`].
pub struct CachingBamSource<S> {
    reader: Arc<BamReader<S>>,
    state: Arc<Mutex<CacheState>>,
    subscribers: Arc<Mutex<Vec<UnboundedSender<Notification>>>>,
}

impl<S: ByteRangeSource + 'static> CachingBamSource<S> {
    pub fn new(reader: BamReader<S>) -> Self {
        CachingBamSource {
            reader: Arc::new(reader),
            state: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register for [`Notification`]s. Dropped receivers are pruned on the
    /// next emit.
    pub fn subscribe(&self) -> UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscriber lock").push(tx);
        rx
    }

    /// The cached records intersecting `range`, in position order.
    ///
    /// Synchronous and read-only: this never fetches and may return an
    /// empty or stale snapshot while loads are in flight.
    pub fn get_alignments_in_range(&self, range: &ContigInterval) -> Vec<Record> {
        let state = self.state.lock().expect("cache state lock");
        let Some(cache) = state.get(contig_key(&range.contig)) else {
            return Vec::new();
        };
        cache
            .records
            .iter()
            .filter(|r| r.contig_interval().intersects(range))
            .cloned()
            .collect()
    }

    /// Note that the viewport moved. Uncovered, non-pending parts of the
    /// (granularity-widened) range are fetched asynchronously, one reader
    /// call per coalesced gap; everything else is a no-op. Completion and
    /// failure surface as notifications, never as errors here.
    ///
    /// Must be called from within a tokio runtime.
    pub fn range_changed(&self, range: &ContigInterval) {
        let expanded = expand_range(range);

        let gaps = {
            let mut state = self.state.lock().expect("cache state lock");
            let cache = state
                .entry(contig_key(&expanded.contig).to_string())
                .or_default();

            let mut blockers = cache.covered.clone();
            blockers.extend_from_slice(&cache.pending);
            let gaps = expanded.interval.subtract_all(&blockers);
            cache.pending.extend_from_slice(&gaps);
            gaps
        };

        if gaps.is_empty() {
            tracing::debug!("{range} already covered or pending");
            return;
        }

        for gap in gaps {
            let gap_range = ContigInterval::new(expanded.contig.clone(), gap.start, gap.stop);
            tracing::debug!("fetching {gap_range}");

            let reader = Arc::clone(&self.reader);
            let state = Arc::clone(&self.state);
            let subscribers = Arc::clone(&self.subscribers);
            tokio::spawn(async move {
                match reader.get_alignments_in_range(&gap_range).await {
                    Ok(records) => {
                        {
                            let mut state = state.lock().expect("cache state lock");
                            let cache = state
                                .entry(contig_key(&gap_range.contig).to_string())
                                .or_default();
                            cache.pending.retain(|p| *p != gap);
                            cache.covered.push(gap);
                            cache.covered = Interval::coalesce(std::mem::take(&mut cache.covered));

                            let mut added = 0usize;
                            for record in records {
                                if cache.seen.insert(record.key()) {
                                    cache.records.push(record);
                                    added += 1;
                                }
                            }
                            cache.records.sort_by(|a, b| {
                                a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name))
                            });
                            tracing::debug!("merged {added} new record(s) for {gap_range}");
                        }
                        emit(&subscribers, Notification::NewData);
                    }
                    Err(e) => {
                        {
                            let mut state = state.lock().expect("cache state lock");
                            if let Some(cache) = state.get_mut(contig_key(&gap_range.contig)) {
                                cache.pending.retain(|p| *p != gap);
                            }
                        }
                        tracing::debug!("fetch failed for {gap_range}: {e}");
                        emit(
                            &subscribers,
                            Notification::Error {
                                kind: e.kind(),
                                message: e.to_string(),
                                range: gap_range,
                            },
                        );
                    }
                }
            });
        }
    }
}

fn expand_range(range: &ContigInterval) -> ContigInterval {
    let start = (range.start().max(0) / FETCH_GRANULARITY) * FETCH_GRANULARITY;
    let stop = (range.stop().max(0) / FETCH_GRANULARITY + 1) * FETCH_GRANULARITY - 1;
    ContigInterval::new(range.contig.clone(), start, stop)
}

fn emit(subscribers: &Mutex<Vec<UnboundedSender<Notification>>>, notification: Notification) {
    let mut subscribers = subscribers.lock().expect("subscriber lock");
    subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
}

//! Bounded in-memory chunk cache shared by every session.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use sb_core::ResourceId;

use crate::ranges::CachedRange;

struct Entry {
    coverage: CachedRange,
    chunks: BTreeMap<u64, Bytes>,
    bytes: u64,
    touched: AtomicU64,
}

impl Entry {
    fn new() -> Self {
        Self {
            coverage: CachedRange::new(None),
            chunks: BTreeMap::new(),
            bytes: 0,
            touched: AtomicU64::new(0),
        }
    }

    /// Copy `range` out of the stored chunks. Caller checks coverage first.
    fn assemble(&self, range: Range<u64>) -> Option<Bytes> {
        let mut out = BytesMut::with_capacity((range.end - range.start) as usize);
        let mut pos = range.start;
        while pos < range.end {
            let (offset, data) = self
                .chunks
                .range(..=pos)
                .rev()
                .find(|(offset, data)| **offset + data.len() as u64 > pos)?;
            let from = (pos - offset) as usize;
            let to = ((range.end - offset) as usize).min(data.len());
            out.extend_from_slice(&data[from..to]);
            pos = offset + to as u64;
        }
        Some(out.freeze())
    }
}

/// Resource bytes that arrived through the substrate, keyed by resource id.
///
/// Lookups take a shared lock; inserts take it exclusively. When the total
/// exceeds the bound, whole resources are evicted least recently used first.
pub struct MemoryCache {
    max_bytes: u64,
    epoch: Instant,
    entries: RwLock<HashMap<ResourceId, Entry>>,
}

impl MemoryCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Store a chunk. Chunks fully covered by earlier ones are skipped.
    pub fn insert(&self, resource: &ResourceId, offset: u64, data: Bytes, total_size: Option<u64>) {
        if self.max_bytes == 0 || data.is_empty() {
            return;
        }
        let range = offset..offset + data.len() as u64;
        let now = self.now();
        let mut entries = self.entries.write();

        let entry = entries.entry(resource.clone()).or_insert_with(Entry::new);
        entry.touched.store(now, Ordering::Relaxed);
        if let Some(total) = total_size {
            entry.coverage.set_total_size(total);
        }
        if entry.coverage.covers(&range) {
            return;
        }
        entry.bytes += data.len() as u64;
        entry.coverage.insert(range);
        entry.chunks.insert(offset, data);

        self.evict(&mut entries, resource);
    }

    fn evict(&self, entries: &mut HashMap<ResourceId, Entry>, keep: &ResourceId) {
        let mut used: u64 = entries.values().map(|e| e.bytes).sum();
        while used > self.max_bytes {
            let victim = entries
                .iter()
                .filter(|(id, _)| *id != keep)
                .min_by_key(|(_, e)| e.touched.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                break;
            };
            if let Some(entry) = entries.remove(&victim) {
                tracing::debug!(resource = %victim, bytes = entry.bytes, "Evicted cached resource");
                used -= entry.bytes;
            }
        }
    }

    /// Cached bytes for `range`, clipped to the resource size.
    ///
    /// Only answers when every byte of the clipped range is present.
    pub fn get(&self, resource: &ResourceId, size: Option<u64>, range: Range<u64>) -> Option<Bytes> {
        let entries = self.entries.read();
        let entry = entries.get(resource)?;
        let mut range = entry.coverage.clip(range);
        if let Some(size) = size {
            range.end = range.end.min(size);
        }
        if range.start >= range.end || !entry.coverage.covers(&range) {
            return None;
        }
        entry.touched.store(self.now(), Ordering::Relaxed);
        entry.assemble(range)
    }

    pub fn total_size(&self, resource: &ResourceId) -> Option<u64> {
        self.entries.read().get(resource)?.coverage.total_size()
    }

    pub fn used_bytes(&self) -> u64 {
        self.entries.read().values().map(|e| e.bytes).sum()
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.entries.read().contains_key(resource)
    }
}

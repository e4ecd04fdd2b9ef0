// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use rudder_config::ArtifactsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Json,
    Text,
    Binary,
}

/// An opaque content-addressed blob produced by a run.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// `hex(sha256(bytes))` — identical content yields an identical id.
    pub id: String,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

struct Entry {
    artifact: Artifact,
    stored_at: Instant,
    last_access: Instant,
}

/// In-memory blob store with TTL and size caps.
///
/// Eviction runs on every mutation: expired entries go first, then LRU
/// until both the entry and byte caps hold.  Nothing is persisted.
pub struct ArtifactStore {
    inner: Mutex<HashMap<String, Entry>>,
    max_entries: usize,
    max_bytes: usize,
    default_ttl_ms: u64,
}

impl ArtifactStore {
    pub fn new(cfg: &ArtifactsConfig) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_entries: cfg.max_entries.max(1),
            max_bytes: cfg.max_bytes.max(1),
            default_ttl_ms: cfg.default_ttl_ms,
        }
    }

    /// Store `bytes` and return the content id.  Re-putting identical
    /// content refreshes its LRU position and returns the same id.
    pub fn put(&self, bytes: Vec<u8>, kind: ArtifactKind, ttl_ms: Option<u64>) -> String {
        let id = content_id(&bytes);
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.get_mut(&id) {
            entry.last_access = now;
            return id;
        }
        inner.insert(
            id.clone(),
            Entry {
                artifact: Artifact {
                    id: id.clone(),
                    kind,
                    bytes,
                    created_at: Utc::now(),
                    ttl_ms: ttl_ms.unwrap_or(self.default_ttl_ms),
                },
                stored_at: now,
                last_access: now,
            },
        );
        self.evict(&mut inner);
        id
    }

    /// Fetch a blob, refreshing its LRU position.  Returns `None` for
    /// unknown ids and for entries whose TTL has lapsed.
    pub fn get(&self, id: &str) -> Option<Artifact> {
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.get(id) {
            Some(entry) => is_expired(entry, Instant::now()),
            None => return None,
        };
        if expired {
            inner.remove(id);
            return None;
        }
        let entry = inner.get_mut(id)?;
        entry.last_access = Instant::now();
        Some(entry.artifact.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .values()
            .map(|e| e.artifact.bytes.len())
            .sum()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    fn evict(&self, inner: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        inner.retain(|_, e| !is_expired(e, now));

        // LRU until both caps hold; the store never exceeds a few hundred
        // entries, so eviction scans.
        loop {
            let total: usize = inner.values().map(|e| e.artifact.bytes.len()).sum();
            if inner.len() <= self.max_entries && total <= self.max_bytes {
                break;
            }
            let oldest = inner
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    inner.remove(&id);
                }
                None => break,
            }
        }
    }
}

fn is_expired(entry: &Entry, now: Instant) -> bool {
    entry.artifact.ttl_ms > 0
        && now.duration_since(entry.stored_at).as_millis() as u64 >= entry.artifact.ttl_ms
}

fn content_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_entries: usize, max_bytes: usize) -> ArtifactStore {
        ArtifactStore::new(&ArtifactsConfig {
            max_entries,
            max_bytes,
            default_ttl_ms: 0, // 0 = no expiry in these tests
        })
    }

    #[test]
    fn put_twice_returns_same_id() {
        let s = store(10, 1024);
        let a = s.put(b"payload".to_vec(), ArtifactKind::Text, None);
        let b = s.put(b"payload".to_vec(), ArtifactKind::Text, None);
        assert_eq!(a, b);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn get_round_trips_bytes() {
        let s = store(10, 1024);
        let id = s.put(b"abc".to_vec(), ArtifactKind::Binary, None);
        let art = s.get(&id).unwrap();
        assert_eq!(art.bytes, b"abc");
        assert_eq!(art.kind, ArtifactKind::Binary);
    }

    #[test]
    fn get_unknown_is_none() {
        assert!(store(10, 1024).get("deadbeef").is_none());
    }

    #[test]
    fn entry_cap_evicts_lru() {
        let s = store(2, 10_000);
        let a = s.put(b"a".to_vec(), ArtifactKind::Text, None);
        let b = s.put(b"b".to_vec(), ArtifactKind::Text, None);
        // Touch `a` so `b` becomes the least recently used.
        s.get(&a);
        let _c = s.put(b"c".to_vec(), ArtifactKind::Text, None);
        assert_eq!(s.len(), 2);
        assert!(s.get(&a).is_some());
        assert!(s.get(&b).is_none());
    }

    #[test]
    fn byte_cap_evicts_until_it_holds() {
        let s = store(100, 10);
        s.put(vec![0u8; 6], ArtifactKind::Binary, None);
        s.put(vec![1u8; 6], ArtifactKind::Binary, None);
        assert!(s.total_bytes() <= 10);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn ttl_expiry_beats_lru() {
        let s = store(10, 1024);
        let id = s.put(b"ephemeral".to_vec(), ArtifactKind::Text, Some(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(s.get(&id).is_none());
    }

    #[test]
    fn ids_are_stable_hex_sha256() {
        let s = store(10, 1024);
        let id = s.put(b"abc".to_vec(), ArtifactKind::Text, None);
        // sha256("abc")
        assert_eq!(
            id,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Utc;
use lru::LruCache;
use regex::Regex;
use tracing::{debug, warn};

use rudder_config::KnowledgeConfig;

use crate::card::{CardIndexEntry, KnowledgeCard};

/// Per-domain knowledge persisted as JSON cards under
/// `<root>/memory/cards/`, with archives and a coalesced index file.
///
/// The in-memory index summarises every known domain; full cards are
/// loaded on demand through a small LRU cache.  All file IO happens under
/// one lock, so card and index writes are serialized.
#[derive(Clone)]
pub struct KnowledgeStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    cfg: KnowledgeConfig,
    cards_dir: PathBuf,
    archive_dir: PathBuf,
    index_path: PathBuf,
    domain_re: Regex,
    state: Mutex<State>,
}

struct State {
    index: HashMap<String, CardIndexEntry>,
    cache: LruCache<String, KnowledgeCard>,
    flush_scheduled: bool,
}

impl KnowledgeStore {
    /// Open (or create) the store under `<data_dir>/memory`.
    pub fn open(data_dir: &Path, cfg: KnowledgeConfig) -> anyhow::Result<Self> {
        let memory = data_dir.join("memory");
        let cards_dir = memory.join("cards");
        let archive_dir = memory.join("archive");
        std::fs::create_dir_all(&cards_dir).context("creating cards dir")?;
        std::fs::create_dir_all(&archive_dir).context("creating archive dir")?;
        let index_path = memory.join("index.json");

        let index: HashMap<String, CardIndexEntry> = if index_path.is_file() {
            let text = std::fs::read_to_string(&index_path).context("reading index")?;
            serde_json::from_str::<Vec<CardIndexEntry>>(&text)
                .unwrap_or_default()
                .into_iter()
                .map(|e| (e.domain.clone(), e))
                .collect()
        } else {
            HashMap::new()
        };

        let cache_size = NonZeroUsize::new(cfg.card_cache.max(1)).expect("nonzero");
        Ok(Self {
            inner: Arc::new(StoreInner {
                // Strict host-name shape; anything else could escape the
                // cards directory.
                domain_re: Regex::new(
                    r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$",
                )
                .expect("static regex"),
                cfg,
                cards_dir,
                archive_dir,
                index_path,
                state: Mutex::new(State {
                    index,
                    cache: LruCache::new(cache_size),
                    flush_scheduled: false,
                }),
            }),
        })
    }

    fn validate_domain(&self, domain: &str) -> anyhow::Result<()> {
        if domain.len() > 253 || !self.inner.domain_re.is_match(domain) {
            anyhow::bail!("invalid domain name: {domain:?}");
        }
        Ok(())
    }

    fn card_path(&self, domain: &str) -> PathBuf {
        self.inner.cards_dir.join(format!("{domain}.json"))
    }

    /// Persist a card, enforcing the pattern cap, archiving the previous
    /// version when it diverged by more than the configured threshold, and
    /// evicting the least-recently-used domain beyond the domain cap.
    pub fn save_card(&self, mut card: KnowledgeCard) -> anyhow::Result<()> {
        self.validate_domain(&card.domain)?;
        let cfg = &self.inner.cfg;
        let now = Utc::now();
        card.updated_at = now;
        card.cap_patterns(cfg.max_patterns_per_domain, cfg.confidence_decay_base, now);

        let path = self.card_path(&card.domain);
        let previous = self.read_card_file(&path)?;
        if let Some(old) = &previous {
            card.version = old.version + 1;
            if old.divergence_from(&card) > cfg.archive_change_threshold {
                self.archive_card(old)?;
            }
        }

        let text = serde_json::to_string_pretty(&card).context("serializing card")?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        debug!(domain = %card.domain, version = card.version, "knowledge card saved");

        let mut state = self.inner.state.lock().unwrap();
        state
            .index
            .insert(card.domain.clone(), CardIndexEntry::from_card(&card));
        state.cache.put(card.domain.clone(), card);
        self.evict_domains(&mut state);
        drop(state);
        self.schedule_flush();
        Ok(())
    }

    /// Load a card through the LRU cache; `None` for unknown domains.
    pub fn load_card(&self, domain: &str) -> anyhow::Result<Option<KnowledgeCard>> {
        self.validate_domain(domain)?;
        {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(card) = state.cache.get(domain) {
                return Ok(Some(card.clone()));
            }
        }
        let card = self.read_card_file(&self.card_path(domain))?;
        if let Some(card) = &card {
            let mut state = self.inner.state.lock().unwrap();
            state.cache.put(domain.to_string(), card.clone());
        }
        Ok(card)
    }

    /// Bump a pattern's usage counters and confidence.  Returns whether
    /// the pattern was found.
    pub fn record_usage(&self, domain: &str, pattern_value: &str) -> anyhow::Result<bool> {
        let Some(mut card) = self.load_card(domain)? else {
            return Ok(false);
        };
        let now = Utc::now();
        let mut found = false;
        for p in &mut card.patterns {
            if p.value == pattern_value {
                p.record_use(now);
                found = true;
            }
        }
        if found {
            self.save_card(card)?;
        }
        Ok(found)
    }

    /// Purge patterns whose effective confidence fell below the floor.
    /// Returns the number of removed patterns.
    pub fn maintenance(&self) -> anyhow::Result<usize> {
        let cfg = &self.inner.cfg;
        let now = Utc::now();
        let domains: Vec<String> = {
            let state = self.inner.state.lock().unwrap();
            state.index.keys().cloned().collect()
        };
        let mut removed = 0usize;
        for domain in domains {
            let Some(mut card) = self.load_card(&domain)? else {
                continue;
            };
            let before = card.patterns.len();
            card.patterns.retain(|p| {
                p.effective_confidence(cfg.confidence_decay_base, now) >= cfg.min_confidence
            });
            if card.patterns.len() != before {
                removed += before - card.patterns.len();
                self.save_card(card)?;
            }
        }
        Ok(removed)
    }

    pub fn index_entries(&self) -> Vec<CardIndexEntry> {
        let state = self.inner.state.lock().unwrap();
        let mut entries: Vec<CardIndexEntry> = state.index.values().cloned().collect();
        entries.sort_by(|a, b| a.domain.cmp(&b.domain));
        entries
    }

    pub fn domain_count(&self) -> usize {
        self.inner.state.lock().unwrap().index.len()
    }

    /// Write the index file immediately.
    pub fn flush_now(&self) -> anyhow::Result<()> {
        let entries = self.index_entries();
        let text = serde_json::to_string_pretty(&entries).context("serializing index")?;
        std::fs::write(&self.inner.index_path, text).context("writing index")?;
        Ok(())
    }

    /// Flush the index and stop pending timers.
    pub fn dispose(&self) {
        if let Err(e) = self.flush_now() {
            warn!("knowledge index flush failed on dispose: {e}");
        }
    }

    /// Coalesced index flush: the first write schedules a timer, further
    /// writes within the window ride along.
    fn schedule_flush(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.flush_scheduled {
                return;
            }
            state.flush_scheduled = true;
        }
        let store = self.clone();
        let delay = std::time::Duration::from_millis(self.inner.cfg.flush_delay_ms);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    store.inner.state.lock().unwrap().flush_scheduled = false;
                    if let Err(e) = store.flush_now() {
                        warn!("knowledge index flush failed: {e}");
                    }
                });
            }
            Err(_) => {
                // No runtime (sync test/tool context): flush inline.
                self.inner.state.lock().unwrap().flush_scheduled = false;
                if let Err(e) = self.flush_now() {
                    warn!("knowledge index flush failed: {e}");
                }
            }
        }
    }

    fn read_card_file(&self, path: &Path) -> anyhow::Result<Option<KnowledgeCard>> {
        if !path.is_file() {
            return Ok(None);
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&text).ok())
    }

    fn archive_card(&self, old: &KnowledgeCard) -> anyhow::Result<()> {
        let mut ts = Utc::now().timestamp();
        let mut path = self
            .inner
            .archive_dir
            .join(format!("{}_{}.json", old.domain, ts));
        while path.exists() {
            ts += 1;
            path = self
                .inner
                .archive_dir
                .join(format!("{}_{}.json", old.domain, ts));
        }
        let text = serde_json::to_string_pretty(old)?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        debug!(domain = %old.domain, "previous card version archived");
        self.prune_archives(&old.domain)
    }

    fn prune_archives(&self, domain: &str) -> anyhow::Result<()> {
        let prefix = format!("{domain}_");
        let mut archives: Vec<PathBuf> = std::fs::read_dir(&self.inner.archive_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        archives.sort();
        while archives.len() > self.inner.cfg.max_archives_per_domain {
            let oldest = archives.remove(0);
            let _ = std::fs::remove_file(&oldest);
        }
        Ok(())
    }

    fn evict_domains(&self, state: &mut State) {
        while state.index.len() > self.inner.cfg.max_domains {
            let Some(lru_domain) = state
                .index
                .values()
                .min_by_key(|e| e.last_used_at)
                .map(|e| e.domain.clone())
            else {
                break;
            };
            debug!(domain = %lru_domain, "evicting LRU knowledge domain");
            state.index.remove(&lru_domain);
            state.cache.pop(&lru_domain);
            let _ = std::fs::remove_file(self.card_path(&lru_domain));
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

//! Append-only event store with a unique `log_hash` dedup constraint.
//!
//! Rows live in the KV backend keyed by zero-padded id; the dedup map and
//! the timestamp/template secondary indexes are kept in memory under one
//! `RwLock` and can be rehydrated from a backend scan at startup. All
//! mutation happens under the write lock, which is what makes
//! `insert_batch` behave like a unique-constraint transaction: concurrent
//! submissions of the same fingerprint converge to one row.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use crate::backend::id_key;
use crate::codec::CompressionConfig;
use crate::model::{Event, LogLevel, NewEvent};
use crate::{StoreBackend, StoreError};

/// Relational filters for `query`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub service: Option<String>,
    pub host: Option<String>,
    pub level: Option<LogLevel>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of one `insert_batch` call.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// Events that landed, in input order, with their assigned ids.
    pub accepted: Vec<Event>,
    /// How many submissions were dropped as `log_hash` duplicates.
    pub duplicates: usize,
}

struct EventIndexes {
    next_id: u64,
    /// Unique constraint: log_hash -> id.
    by_hash: HashMap<String, u64>,
    /// (timestamp_micros, id) -> id, for time-range walks.
    by_time: BTreeMap<(i64, u64), u64>,
    /// id -> template back-reference, for cursor scans and ref counting.
    by_id: BTreeMap<u64, Option<u64>>,
    /// template_id -> event ids, newest last.
    by_template: HashMap<u64, BTreeSet<u64>>,
}

impl Default for EventIndexes {
    fn default() -> Self {
        Self {
            // Ids start at 1 so a zero cursor ("nothing processed yet")
            // always precedes the first row.
            next_id: 1,
            by_hash: HashMap::new(),
            by_time: BTreeMap::new(),
            by_id: BTreeMap::new(),
            by_template: HashMap::new(),
        }
    }
}

pub struct EventStore {
    backend: Box<dyn StoreBackend>,
    codec: CompressionConfig,
    indexes: RwLock<EventIndexes>,
}

impl EventStore {
    pub fn new(backend: Box<dyn StoreBackend>) -> Self {
        Self {
            backend,
            codec: CompressionConfig::default(),
            indexes: RwLock::new(EventIndexes::default()),
        }
    }

    /// Rebuild the in-memory indexes from a full backend scan. Called once
    /// at startup when the backend outlives the process.
    pub fn rehydrate(&self) -> Result<usize, StoreError> {
        let mut indexes = self.write_indexes()?;
        let mut count = 0usize;
        self.backend.scan_from("", &mut |_key, value| {
            let event: Event = self.codec.decode(value)?;
            indexes.next_id = indexes.next_id.max(event.id + 1);
            indexes.by_hash.insert(event.log_hash.clone(), event.id);
            indexes
                .by_time
                .insert((event.timestamp.timestamp_micros(), event.id), event.id);
            indexes.by_id.insert(event.id, event.template_id);
            if let Some(tid) = event.template_id {
                indexes.by_template.entry(tid).or_default().insert(event.id);
            }
            count += 1;
            Ok(true)
        })?;
        tracing::debug!(events = count, "event store rehydrated");
        Ok(count)
    }

    /// Which of the given fingerprints already exist.
    pub fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>, StoreError> {
        let indexes = self.read_indexes()?;
        Ok(hashes
            .iter()
            .filter(|h| indexes.by_hash.contains_key(*h))
            .cloned()
            .collect())
    }

    /// Insert a batch, silently dropping `log_hash` duplicates (both against
    /// the store and within the batch itself). Insert order is preserved in
    /// id assignment.
    pub fn insert_batch(&self, events: Vec<NewEvent>) -> Result<InsertOutcome, StoreError> {
        let mut outcome = InsertOutcome::default();
        if events.is_empty() {
            return Ok(outcome);
        }

        let mut indexes = self.write_indexes()?;
        let mut rows = Vec::with_capacity(events.len());

        for new_event in events {
            if indexes.by_hash.contains_key(&new_event.log_hash) {
                outcome.duplicates += 1;
                continue;
            }
            let id = indexes.next_id;
            indexes.next_id += 1;
            let event = new_event.into_event(id);

            indexes.by_hash.insert(event.log_hash.clone(), id);
            indexes
                .by_time
                .insert((event.timestamp.timestamp_micros(), id), id);
            indexes.by_id.insert(id, event.template_id);
            if let Some(tid) = event.template_id {
                indexes.by_template.entry(tid).or_default().insert(id);
            }

            rows.push((id_key(id), self.codec.encode(&event)?));
            outcome.accepted.push(event);
        }

        // One backend batch per insert batch; the lock is still held, so a
        // concurrent reader never observes the indexes ahead of the rows.
        self.backend.batch_put(rows)?;
        Ok(outcome)
    }

    pub fn get(&self, id: u64) -> Result<Option<Event>, StoreError> {
        match self.backend.get(&id_key(id))? {
            Some(data) => Ok(Some(self.codec.decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Relational selection, newest first, with offset/limit pagination.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let indexes = self.read_indexes()?;
        let start = filter.start.map(|t| t.timestamp_micros()).unwrap_or(i64::MIN);
        let end = filter.end.map(|t| t.timestamp_micros()).unwrap_or(i64::MAX);
        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };

        let mut out = Vec::new();
        if start > end {
            return Ok(out);
        }
        let mut skipped = 0usize;
        for (&(_, id), _) in indexes
            .by_time
            .range((start, 0u64)..=(end, u64::MAX))
            .rev()
        {
            let Some(event) = self.get(id)? else { continue };
            if !matches_filter(&event, filter) {
                continue;
            }
            if skipped < filter.offset {
                skipped += 1;
                continue;
            }
            out.push(event);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Up to `per_template_limit` illustrative events per template, newest
    /// first, restricted to the optional time window.
    pub fn sample_by_template(
        &self,
        template_ids: &[u64],
        per_template_limit: usize,
        window: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    ) -> Result<HashMap<u64, Vec<Event>>, StoreError> {
        let indexes = self.read_indexes()?;
        let mut out = HashMap::with_capacity(template_ids.len());

        for &tid in template_ids {
            let mut samples = Vec::new();
            if let Some(ids) = indexes.by_template.get(&tid) {
                for &id in ids.iter().rev() {
                    let Some(event) = self.get(id)? else { continue };
                    if let Some(start) = window.0 {
                        if event.timestamp < start {
                            continue;
                        }
                    }
                    if let Some(end) = window.1 {
                        if event.timestamp > end {
                            continue;
                        }
                    }
                    samples.push(event);
                    if samples.len() >= per_template_limit {
                        break;
                    }
                }
            }
            out.insert(tid, samples);
        }
        Ok(out)
    }

    /// Walk events with `id > cursor` in id order, returning those with a
    /// null `template_id` plus the new cursor (the highest id visited). An
    /// id-ordered walk keeps the safety net O(batch) even when almost every
    /// event already has a template.
    pub fn scan_missing_template(
        &self,
        cursor: u64,
        limit: usize,
    ) -> Result<(Vec<Event>, u64), StoreError> {
        let indexes = self.read_indexes()?;
        let mut missing = Vec::new();
        let mut new_cursor = cursor;
        let mut visited = 0usize;

        for (&id, template_id) in indexes.by_id.range(cursor.saturating_add(1)..) {
            new_cursor = id;
            visited += 1;
            if template_id.is_none() {
                if let Some(event) = self.get(id)? {
                    missing.push(event);
                }
            }
            if visited >= limit {
                break;
            }
        }
        Ok((missing, new_cursor))
    }

    /// Fill the template back-reference, write-once (null → id). Returns
    /// whether the row changed; a concurrent writer having filled it first
    /// is a no-op, not an error.
    pub fn set_template_id(&self, event_id: u64, template_id: u64) -> Result<bool, StoreError> {
        let mut indexes = self.write_indexes()?;
        match indexes.by_id.get(&event_id) {
            None => Ok(false),
            Some(Some(_)) => Ok(false),
            Some(None) => {
                let Some(mut event) = self.get(event_id)? else {
                    return Ok(false);
                };
                event.template_id = Some(template_id);
                self.backend.put(&id_key(event_id), &self.codec.encode(&event)?)?;
                indexes.by_id.insert(event_id, Some(template_id));
                indexes
                    .by_template
                    .entry(template_id)
                    .or_default()
                    .insert(event_id);
                Ok(true)
            }
        }
    }

    /// TTL retention: delete every event older than the cutoff. Returns the
    /// number of rows removed.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut indexes = self.write_indexes()?;
        let cutoff_micros = cutoff.timestamp_micros();

        let doomed: Vec<(i64, u64)> = indexes
            .by_time
            .range(..(cutoff_micros, 0u64))
            .map(|(&key, _)| key)
            .collect();

        for &(micros, id) in &doomed {
            if let Some(event) = self.get(id)? {
                indexes.by_hash.remove(&event.log_hash);
                if let Some(tid) = event.template_id {
                    if let Some(ids) = indexes.by_template.get_mut(&tid) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            indexes.by_template.remove(&tid);
                        }
                    }
                }
            }
            indexes.by_time.remove(&(micros, id));
            indexes.by_id.remove(&id);
            self.backend.delete(&id_key(id))?;
        }
        Ok(doomed.len())
    }

    /// Template ids still referenced by at least one live event.
    pub fn referenced_template_ids(&self) -> Result<HashSet<u64>, StoreError> {
        let indexes = self.read_indexes()?;
        Ok(indexes.by_template.keys().copied().collect())
    }

    pub fn len(&self) -> usize {
        self.read_indexes().map(|i| i.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_indexes(&self) -> Result<std::sync::RwLockReadGuard<'_, EventIndexes>, StoreError> {
        self.indexes
            .read()
            .map_err(|_| StoreError::backend("poisoned event index lock"))
    }

    fn write_indexes(&self) -> Result<std::sync::RwLockWriteGuard<'_, EventIndexes>, StoreError> {
        self.indexes
            .write()
            .map_err(|_| StoreError::backend("poisoned event index lock"))
    }
}

fn matches_filter(event: &Event, filter: &EventFilter) -> bool {
    if let Some(service) = &filter.service {
        if &event.service != service {
            return false;
        }
    }
    if let Some(host) = &filter.host {
        if &event.host != host {
            return false;
        }
    }
    if let Some(level) = filter.level {
        if event.level != level {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;
    use chrono::TimeZone;

    fn store() -> EventStore {
        EventStore::new(Box::new(InMemoryBackend::new()))
    }

    fn ts(micros: i64) -> DateTime<Utc> {
        Utc.timestamp_micros(micros).unwrap()
    }

    fn new_event(hash: &str, micros: i64, service: &str) -> NewEvent {
        NewEvent {
            timestamp: ts(micros),
            source: "journal".into(),
            service: service.into(),
            host: "node-1".into(),
            level: LogLevel::Info,
            message: format!("msg {hash}"),
            trace_id: None,
            span_id: None,
            event_type: None,
            error_code: None,
            meta: serde_json::Map::new(),
            log_hash: hash.into(),
            template_id: None,
        }
    }

    #[test]
    fn insert_assigns_monotonic_ids_in_order() {
        let s = store();
        let outcome = s
            .insert_batch(vec![
                new_event("h1", 10, "a"),
                new_event("h2", 5, "a"),
                new_event("h3", 20, "a"),
            ])
            .unwrap();
        assert_eq!(outcome.duplicates, 0);
        let ids: Vec<u64> = outcome.accepted.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn duplicates_are_dropped_not_errored() {
        let s = store();
        s.insert_batch(vec![new_event("h1", 10, "a")]).unwrap();

        let outcome = s
            .insert_batch(vec![new_event("h1", 10, "a"), new_event("h2", 11, "a")])
            .unwrap();
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn duplicates_within_one_batch_collapse() {
        let s = store();
        let outcome = s
            .insert_batch(vec![new_event("h1", 10, "a"), new_event("h1", 10, "a")])
            .unwrap();
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn query_filters_and_paginates_newest_first() {
        let s = store();
        let mut batch = Vec::new();
        for i in 0..10i64 {
            let service = if i % 2 == 0 { "web" } else { "db" };
            batch.push(new_event(&format!("h{i}"), i * 1000, service));
        }
        s.insert_batch(batch).unwrap();

        let filter = EventFilter {
            service: Some("web".into()),
            limit: 3,
            ..Default::default()
        };
        let events = s.query(&filter).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[0].timestamp > events[1].timestamp);

        let page2 = s
            .query(&EventFilter {
                service: Some("web".into()),
                limit: 3,
                offset: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page2.len(), 2);
    }

    #[test]
    fn query_respects_time_window() {
        let s = store();
        s.insert_batch(vec![
            new_event("h1", 1_000, "a"),
            new_event("h2", 2_000, "a"),
            new_event("h3", 3_000, "a"),
        ])
        .unwrap();

        let events = s
            .query(&EventFilter {
                start: Some(ts(1_500)),
                end: Some(ts(2_500)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_hash, "h2");
    }

    #[test]
    fn template_backref_is_write_once() {
        let s = store();
        s.insert_batch(vec![new_event("h1", 10, "a")]).unwrap();

        assert!(s.set_template_id(1, 7).unwrap());
        assert!(!s.set_template_id(1, 9).unwrap());
        assert_eq!(s.get(1).unwrap().unwrap().template_id, Some(7));
    }

    #[test]
    fn scan_missing_template_uses_id_cursor() {
        let s = store();
        let mut batch = Vec::new();
        for i in 0..5i64 {
            batch.push(new_event(&format!("h{i}"), i, "a"));
        }
        s.insert_batch(batch).unwrap();
        s.set_template_id(2, 42).unwrap();

        let (missing, cursor) = s.scan_missing_template(0, 3).unwrap();
        // Ids 1..=3 visited; id 2 already has a template.
        let ids: Vec<u64> = missing.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(cursor, 3);

        let (rest, cursor) = s.scan_missing_template(cursor, 10).unwrap();
        assert_eq!(rest.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(cursor, 5);
    }

    #[test]
    fn retention_deletes_old_rows_and_frees_hashes() {
        let s = store();
        s.insert_batch(vec![
            new_event("h1", 1_000, "a"),
            new_event("h2", 2_000_000, "a"),
        ])
        .unwrap();

        let removed = s.delete_older_than(ts(1_000_000)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(s.len(), 1);
        assert!(s.get(1).unwrap().is_none());

        // The hash is free again; a re-submission is no longer a duplicate.
        let outcome = s.insert_batch(vec![new_event("h1", 1_000, "a")]).unwrap();
        assert_eq!(outcome.duplicates, 0);
    }

    #[test]
    fn sample_by_template_returns_newest_first() {
        let s = store();
        let mut batch = Vec::new();
        for i in 0..6i64 {
            let mut e = new_event(&format!("h{i}"), i * 100, "a");
            e.template_id = Some(1);
            batch.push(e);
        }
        s.insert_batch(batch).unwrap();

        let samples = s.sample_by_template(&[1], 2, (None, None)).unwrap();
        let events = &samples[&1];
        assert_eq!(events.len(), 2);
        assert!(events[0].id > events[1].id);
    }

    #[test]
    fn rehydrate_rebuilds_indexes() {
        let s = store();
        s.insert_batch(vec![new_event("h1", 10, "a")]).unwrap();
        s.set_template_id(1, 3).unwrap();

        // Fresh store over the same backend contents.
        let bytes = s.backend.get(&id_key(1)).unwrap().unwrap();
        let other = store();
        other.backend.put(&id_key(1), &bytes).unwrap();
        let count = other.rehydrate().unwrap();
        assert_eq!(count, 1);

        let outcome = other.insert_batch(vec![new_event("h1", 10, "a")]).unwrap();
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.accepted.len(), 0);
        // Next id continues after the rehydrated row.
        let outcome = other.insert_batch(vec![new_event("h2", 11, "a")]).unwrap();
        assert_eq!(outcome.accepted[0].id, 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let s = store();
        let outcome = s.insert_batch(Vec::new()).unwrap();
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.duplicates, 0);
    }
}

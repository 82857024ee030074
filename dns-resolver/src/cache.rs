//! Caching for [`Resource`]s, keyed by `(class, type, normalized name,
//! rdata)` with per-entry TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_types::protocol::types::*;

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// One cached record. `name` keeps its original case for re-assembly
/// into a reply; the map it lives under is keyed by the normalized
/// name, so lookups are case-insensitive.
#[derive(Debug, Clone)]
struct CacheRecord {
    name: Name,
    rclass: RecordClass,
    rtype: RecordType,
    rdata: RecordData,
    eol: Instant,
    /// Bumped on every store to the same key. The timer task spawned
    /// by `store` captures the token it was given; when it fires it
    /// only deletes the record if the token still matches, so a
    /// replacement store implicitly cancels the stale timer (see
    /// `SharedCache::store`).
    token: u64,
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<Name, Vec<CacheRecord>>,
    next_token: u64,
}

impl Cache {
    fn lookup(&self, now: Instant, question: &Question) -> Vec<Resource> {
        // Wildcard question fields do not expand against the cache:
        // only concrete class/type ever appear as a stored key, so a
        // `QueryClass::Wildcard` or `QueryType::Wildcard` question
        // simply matches nothing here, which is what we want.
        let (QueryClass::Record(rclass), QueryType::Record(rtype)) =
            (question.qclass, question.qtype)
        else {
            return Vec::new();
        };

        let Some(records) = self.entries.get(&question.qname.normalized()) else {
            return Vec::new();
        };

        records
            .iter()
            .filter(|r| r.rclass == rclass && r.rtype == rtype)
            .filter_map(|r| {
                if now > r.eol {
                    return None;
                }
                let ttl = i32::try_from(r.eol.duration_since(now).as_secs()).unwrap_or(i32::MAX);
                Some(Resource {
                    name: r.name.clone(),
                    rclass: r.rclass,
                    ttl,
                    rdlength: 0,
                    rdata: r.rdata.clone(),
                })
            })
            .collect()
    }

    /// Insert or replace a record, returning the token the caller
    /// should give back to `remove_if_current` once the TTL elapses.
    fn store(&mut self, now: Instant, resource: &Resource) -> u64 {
        let eol = now + Duration::from_secs(resource.ttl.max(0) as u64);
        let rclass = resource.rclass;
        let rtype = resource.rtype();
        let rdata = resource.rdata.clone();
        let token = self.next_token;
        self.next_token += 1;

        let records = self.entries.entry(resource.name.normalized()).or_default();
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.rclass == rclass && r.rtype == rtype && r.rdata == rdata)
        {
            existing.eol = eol;
            existing.token = token;
            existing.name = resource.name.clone();
        } else {
            records.push(CacheRecord {
                name: resource.name.clone(),
                rclass,
                rtype,
                rdata,
                eol,
                token,
            });
        }

        token
    }

    fn remove_if_current(
        &mut self,
        normalized_name: &Name,
        rclass: RecordClass,
        rtype: RecordType,
        rdata: &RecordData,
        token: u64,
    ) {
        if let Some(records) = self.entries.get_mut(normalized_name) {
            records.retain(|r| {
                !(r.rclass == rclass && r.rtype == rtype && &r.rdata == rdata && r.token == token)
            });
            if records.is_empty() {
                self.entries.remove(normalized_name);
            }
        }
    }

    /// Sweep every entry whose eol has already passed. The per-entry
    /// timers spawned by `store` should normally beat this to it;
    /// this only catches entries whose timer was starved or whose
    /// process slept through it.
    fn prune_expired(&mut self, now: Instant) -> usize {
        let mut pruned = 0;
        self.entries.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.eol > now);
            pruned += before - records.len();
            !records.is_empty()
        });
        pruned
    }

    fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// A convenience wrapper around a `Cache` which lets it be shared
/// between tasks.
///
/// Invoking `clone` on a `SharedCache` gives a new handle referring
/// to the same underlying cache.
#[derive(Debug, Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<Cache>>,
}

impl SharedCache {
    pub fn new() -> Self {
        SharedCache {
            inner: Arc::new(Mutex::new(Cache::default())),
        }
    }

    /// Returns every resource whose key matches `(question.qclass,
    /// question.qtype, normalized(question.qname))`, with `ttl`
    /// rewritten to the remaining seconds as of `now`.
    pub fn lookup(&self, now: Instant, question: &Question) -> Vec<Resource> {
        self.inner.lock().expect(MUTEX_POISON_MESSAGE).lookup(now, question)
    }

    /// Stores a resource, replacing any prior entry with the same
    /// `(class, type, normalized name, rdata)` key, and schedules its
    /// expiry. A resource with `ttl <= 0` is not stored.
    pub fn store(&self, now: Instant, resource: &Resource) {
        if resource.ttl <= 0 {
            return;
        }

        let normalized_name = resource.name.normalized();
        let rclass = resource.rclass;
        let rtype = resource.rtype();
        let rdata = resource.rdata.clone();

        let token = {
            let mut cache = self.inner.lock().expect(MUTEX_POISON_MESSAGE);
            cache.store(now, resource)
        };

        let this = self.clone();
        let ttl = Duration::from_secs(resource.ttl.max(0) as u64);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut cache = this.inner.lock().expect(MUTEX_POISON_MESSAGE);
            cache.remove_if_current(&normalized_name, rclass, rtype, &rdata, token);
        });
    }

    /// Removes every entry that has already expired. Best-effort
    /// housekeeping against timers that never fired; not required for
    /// correctness since `lookup` itself filters expired entries.
    pub fn prune_expired(&self, now: Instant) -> usize {
        self.inner.lock().expect(MUTEX_POISON_MESSAGE).prune_expired(now)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect(MUTEX_POISON_MESSAGE).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

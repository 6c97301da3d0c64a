// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The process-wide table of live NETCONF sessions.
//!
//! Lock discipline: the registry rwlock is always taken before an
//! entry's lock and never the other way around. RPC dispatch takes
//! the read lock just long enough to clone out the entry Arc, then
//! runs under the entry lock alone; membership changes (insert,
//! disconnect, idle eviction, shutdown) take the write lock. An
//! entry removed from the table has `closed` set under its own lock,
//! so a dispatcher that cloned the Arc concurrently sees a tombstone
//! instead of a dead session.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, SystemTime},
};

use ncpool_protocol::SessionInfo;
use tracing::{info, span, warn, Level};

use crate::netconf;

pub struct Registry {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

pub struct Entry {
    id: String,
    /// Held for the duration of any RPC on this session and for any
    /// access to the mutable fields.
    pub inner: Mutex<EntryInner>,
}

pub struct EntryInner {
    /// The underlying NETCONF session. Taken out (and closed) on
    /// eviction.
    pub session: Option<netconf::Session>,
    /// Wall-clock time of the last completed RPC or connect.
    pub last_activity: SystemTime,
    /// Set on eviction; no further operations are permitted.
    pub closed: bool,
    /// Cached hello snapshot served for info requests.
    pub hello: Option<SessionInfo>,
    /// Whether a notification stream is currently active.
    pub ntf_subscribed: bool,
}

impl Entry {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tombstone the entry and release the NETCONF handle. Callers
    /// must have already removed the entry from the table.
    fn close(&self) {
        // we unwrap to propagate the poison as an unwind
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.ntf_subscribed = false;
        inner.hello = None;
        if let Some(mut session) = inner.session.take() {
            session.close();
        }
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry { entries: RwLock::new(HashMap::new()) }
    }

    /// Insert a freshly connected session, keyed by the session id
    /// the server assigned. The hello snapshot rides in with the
    /// entry, so no lookup can ever observe a live session without
    /// one. A stale entry under the same id (possible when distinct
    /// devices hand out the same id) is closed and replaced.
    pub fn insert(&self, session: netconf::Session, hello: SessionInfo) -> Arc<Entry> {
        let id = String::from(session.sid());
        let entry = Arc::new(Entry {
            id: id.clone(),
            inner: Mutex::new(EntryInner {
                session: Some(session),
                last_activity: SystemTime::now(),
                closed: false,
                hello: Some(hello),
                ntf_subscribed: false,
            }),
        });

        let displaced = {
            let _s = span!(Level::INFO, "wrlock(registry)").entered();
            let mut entries = self.entries.write().unwrap();
            entries.insert(id.clone(), Arc::clone(&entry))
        };
        if let Some(old) = displaced {
            warn!("displacing stale session entry '{}'", id);
            old.close();
        }
        info!("added session entry '{}'", entry.id());

        entry
    }

    /// Look up an entry for use. Callers lock `inner` and must treat
    /// `closed == true` as session-not-found.
    pub fn get(&self, id: &str) -> Option<Arc<Entry>> {
        let _s = span!(Level::INFO, "rdlock(registry)").entered();
        let entries = self.entries.read().unwrap();
        entries.get(id).map(Arc::clone)
    }

    /// Remove an entry and close its session. Returns false when no
    /// entry with that id exists.
    pub fn remove_and_close(&self, id: &str) -> bool {
        let removed = {
            let _s = span!(Level::INFO, "wrlock(registry)").entered();
            let mut entries = self.entries.write().unwrap();
            entries.remove(id)
        };
        match removed {
            Some(entry) => {
                info!("closing NETCONF session ({})", id);
                entry.close();
                true
            }
            None => false,
        }
    }

    /// Walk the table and evict every session whose last activity is
    /// older than `max_idle`. Runs under the write lock; sweeps are
    /// infrequent and brief.
    pub fn evict_idle(&self, max_idle: Duration) {
        let _s = span!(Level::INFO, "wrlock(registry)").entered();
        let mut entries = self.entries.write().unwrap();
        let now = SystemTime::now();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| {
                let inner = entry.inner.lock().unwrap();
                now.duration_since(inner.last_activity).unwrap_or_default() > max_idle
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(entry) = entries.remove(&id) {
                info!("closing idle NETCONF session ({})", id);
                entry.close();
            }
        }
    }

    /// Close every session. Used at shutdown.
    pub fn close_all(&self) {
        let _s = span!(Level::INFO, "wrlock(registry)").entered();
        let mut entries = self.entries.write().unwrap();
        for (id, entry) in entries.drain() {
            info!("closing NETCONF session ({})", id);
            entry.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Insert a tombstone-free entry with no backing session, for
    /// exercising registry plumbing without a NETCONF server.
    #[cfg(test)]
    pub fn insert_stub(&self, id: &str) -> Arc<Entry> {
        let entry = Arc::new(Entry {
            id: String::from(id),
            inner: Mutex::new(EntryInner {
                session: None,
                last_activity: SystemTime::now(),
                closed: false,
                hello: None,
                ntf_subscribed: false,
            }),
        });
        let mut entries = self.entries.write().unwrap();
        entries.insert(String::from(id), Arc::clone(&entry));
        entry
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use ntest::timeout;

    use super::*;

    #[test]
    fn lookup_and_remove() {
        let registry = Registry::new();
        assert!(registry.get("1").is_none());

        registry.insert_stub("1");
        registry.insert_stub("2");
        assert_eq!(registry.len(), 2);

        let entry = registry.get("1").expect("entry to exist");
        assert_eq!(entry.id(), "1");
        assert!(!entry.inner.lock().unwrap().closed);

        assert!(registry.remove_and_close("1"));
        assert!(registry.get("1").is_none());
        assert!(!registry.remove_and_close("1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removal_tombstones_outstanding_handles() {
        let registry = Registry::new();
        registry.insert_stub("7");

        // a dispatcher that cloned the Arc before removal
        let handle = registry.get("7").expect("entry to exist");
        assert!(registry.remove_and_close("7"));
        assert!(handle.inner.lock().unwrap().closed);
    }

    #[test]
    fn idle_eviction() {
        let registry = Registry::new();
        let stale = registry.insert_stub("old");
        registry.insert_stub("fresh");

        {
            let mut inner = stale.inner.lock().unwrap();
            inner.last_activity = SystemTime::now() - Duration::from_secs(3601);
        }

        registry.evict_idle(Duration::from_secs(3600));
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some(), "active session must survive the sweep");
        assert!(stale.inner.lock().unwrap().closed);
    }

    #[test]
    fn close_all_drains_the_table() {
        let registry = Registry::new();
        let a = registry.insert_stub("a");
        let b = registry.insert_stub("b");
        registry.close_all();
        assert_eq!(registry.len(), 0);
        assert!(a.inner.lock().unwrap().closed);
        assert!(b.inner.lock().unwrap().closed);
    }

    #[test]
    #[timeout(10000)]
    fn concurrent_lookups_do_not_block_each_other() {
        let registry = Arc::new(Registry::new());
        registry.insert_stub("x");
        registry.insert_stub("y");

        let threads: Vec<_> = ["x", "y", "x", "y"]
            .into_iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let entry = registry.get(id).expect("entry to exist");
                        let inner = entry.inner.lock().unwrap();
                        assert!(!inner.closed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("lookup thread not to panic");
        }
    }
}

//! The journal: storage, retention and fan-out of log entries.
//!
//! The journal does not understand the hierarchical nature of DNs. It sees
//! every entry as a member of two doubly linked lists at once: the global
//! list (all entries, insertion order) and the local list of the entry's DN
//! (entries of that DN, insertion order).
//!
//! ```text
//!         .------------.        .------------.        .------------.
//!         | dn: A.B    |        | dn: Z      |        | dn: A.B    |
//!         | seq: 0     |        | seq: 0     |        | seq: 1     |
//!         |------------|        |------------|        |------------|
//!         | nextGlobal :------->| nextGlobal :------->| nextGlobal :--> None
//! None <--: prevGlobal |<-------: prevGlobal |<-------| prevGlobal |
//!         |------------|        |------------|        |------------|
//!         | nextLocal  :---.    | nextLocal  :-> None .->| nextLocal  :--> None
//! None <--: prevLocal  |<--:----: prevLocal  |   |    '--| prevLocal  |
//!         '------------'   |    '------------'   |       '------------'
//!              ^           '---------------------'             ^
//!              |                    ^                          |
//!          ( head )            ( heads[Z] )                ( tail )
//!       ( heads[A.B] )         ( tails[Z] )             ( tails[A.B] )
//! ```
//!
//! Entries live in an arena and refer to each other through [`EntryId`]
//! handles. A handle carries the generation of its slot: once an entry is
//! evicted its slot generation moves on, and every old handle to it
//! dereferences to nothing.
//!
//! Local lists only ever lose entries at their head, so the number of
//! entries retained for a DN is `tail.seq_local - head.seq_local + 1`.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::JournalConfig;
use crate::dn::Dn;
use crate::entry::LogEntry;
use crate::filter::{matches_all, Filter};
use crate::subscriber::{Delivery, StreamHandle, Subscriber};

/// How many already recorded entries a backlog read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlog {
    /// Everything the journal still retains.
    All,
    /// At most this many of the most recent matching entries.
    Count(usize),
}

impl Backlog {
    fn reached(self, collected: usize) -> bool {
        match self {
            Backlog::All => false,
            Backlog::Count(n) => collected >= n,
        }
    }
}

/// Stable handle to an entry stored in a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: usize,
    generation: u64,
}

/// An entry as stored in the journal arena.
struct Node {
    entry: LogEntry,
    prev_global: Option<EntryId>,
    next_global: Option<EntryId>,
    prev_local: Option<EntryId>,
    next_local: Option<EntryId>,
    /// Position within the DN's local list, counting from the first entry
    /// ever appended at that DN.
    seq_local: u64,
}

struct Slot {
    generation: u64,
    node: Option<Node>,
}

/// Retention policy of a given DN.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Quota {
    /// Exact DN that this quota applies to.
    origin: Dn,
    /// Maximum size of the DN's local list.
    max: u64,
}

/// Result of appending an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub id: EntryId,
    /// Number of older entries of the same DN evicted to honour its quota.
    pub evicted: u64,
}

/// Unlocked journal state. Every method expects the caller to hold the
/// journal lock at the appropriate level.
#[derive(Default)]
struct JournalState {
    slots: Vec<Slot>,
    free: Vec<usize>,
    len: usize,

    /// Oldest entry of the global list.
    head: Option<EntryId>,
    /// Newest entry of the global list.
    tail: Option<EntryId>,
    /// Oldest entry of each DN's local list. Absent if the DN has no entries.
    heads: HashMap<Dn, EntryId>,
    /// Newest entry of each DN's local list. Absent if the DN has no entries.
    tails: HashMap<Dn, EntryId>,

    /// Created on first append at a DN, never removed.
    quota: HashMap<Dn, Quota>,

    subscribers: Vec<Subscriber>,
}

impl JournalState {
    fn node(&self, id: EntryId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: EntryId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, node: Node) -> EntryId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return EntryId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        EntryId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Remove a node from the arena. Its handle goes stale immediately.
    fn release(&mut self, id: EntryId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation += 1;
        self.free.push(id.index);
        self.len -= 1;
        Some(node)
    }

    /// Insert an entry at the tail of the global list and of its DN's local
    /// list, then evict from the local head until the DN's quota holds.
    fn append(&mut self, entry: LogEntry, config: &JournalConfig) -> (AppendOutcome, Option<u64>) {
        let origin = entry.dn().clone();

        let prev_global = self.tail;
        let prev_local = self.tails.get(&origin).copied();
        let seq_local = prev_local
            .and_then(|p| self.node(p))
            .map(|p| p.seq_local + 1)
            .unwrap_or(0);

        let id = self.alloc(Node {
            entry,
            prev_global,
            next_global: None,
            prev_local,
            next_local: None,
            seq_local,
        });

        // Global list.
        match prev_global.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next_global = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);

        // Quota record.
        let mut created_quota = None;
        let max = self
            .quota
            .entry(origin.clone())
            .or_insert_with(|| {
                let max = config.quota_for(&origin);
                created_quota = Some(max);
                Quota {
                    origin: origin.clone(),
                    max,
                }
            })
            .max;

        // Local list.
        match prev_local.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next_local = Some(id),
            None => {
                self.heads.insert(origin.clone(), id);
            }
        }
        self.tails.insert(origin.clone(), id);

        // Apply quota to the local list this entry went into.
        let head_seq = self
            .heads
            .get(&origin)
            .and_then(|h| self.node(*h))
            .map(|h| h.seq_local)
            .unwrap_or(seq_local);
        let count = seq_local - head_seq + 1;
        let mut evicted = 0;
        if count > max {
            let mut left = count - max;
            let mut cur = self.heads.get(&origin).copied();
            while left > 0 {
                let Some(el) = cur else { break };
                cur = self.node(el).and_then(|n| n.next_local);
                // Unlinking removes the entry from both lists.
                if self.unlink(el).is_some() {
                    evicted += 1;
                }
                left -= 1;
            }
        }

        (AppendOutcome { id, evicted }, created_quota)
    }

    /// Remove an entry from both the global and its local list, fixing up
    /// the journal's head/tail bounds.
    fn unlink(&mut self, id: EntryId) -> Option<LogEntry> {
        let node = self.release(id)?;

        // Global list.
        if let Some(prev) = node.prev_global.and_then(|p| self.node_mut(p)) {
            prev.next_global = node.next_global;
        }
        if let Some(next) = node.next_global.and_then(|n| self.node_mut(n)) {
            next.prev_global = node.prev_global;
        }
        if self.head == Some(id) {
            self.head = node.next_global;
        }
        if self.tail == Some(id) {
            self.tail = node.prev_global;
        }

        // Local list.
        if let Some(prev) = node.prev_local.and_then(|p| self.node_mut(p)) {
            prev.next_local = node.next_local;
        }
        if let Some(next) = node.next_local.and_then(|n| self.node_mut(n)) {
            next.prev_local = node.prev_local;
        }
        let origin = node.entry.dn();
        if self.heads.get(origin) == Some(&id) {
            match node.next_local {
                Some(next) => self.heads.insert(origin.clone(), next),
                None => self.heads.remove(origin),
            };
        }
        if self.tails.get(origin) == Some(&id) {
            match node.prev_local {
                Some(prev) => self.tails.insert(origin.clone(), prev),
                None => self.tails.remove(origin),
            };
        }

        Some(node.entry)
    }

    /// Walk a list backwards from `start`, collecting up to `limit` matching
    /// entries, and return them oldest first.
    fn collect_backwards(
        &self,
        start: Option<EntryId>,
        prev: impl Fn(&Node) -> Option<EntryId>,
        limit: Backlog,
        filters: &[Filter],
    ) -> Vec<LogEntry> {
        let mut res = Vec::new();
        let mut cur = start;
        while let Some(id) = cur {
            if limit.reached(res.len()) {
                break;
            }
            let Some(node) = self.node(id) else { break };
            if matches_all(filters, &node.entry) {
                res.push(node.entry.clone());
            }
            cur = prev(node);
        }
        // Back into chronological order.
        res.reverse();
        res
    }

    fn scan_entries(&self, limit: Backlog, filters: &[Filter]) -> Vec<LogEntry> {
        self.collect_backwards(self.tail, |n| n.prev_global, limit, filters)
    }

    fn get_entries(&self, limit: Backlog, exact: &Dn, filters: &[Filter]) -> Vec<LogEntry> {
        let start = self.tails.get(exact).copied();
        self.collect_backwards(start, |n| n.prev_local, limit, filters)
    }
}

/// What a single read asks of the journal.
pub(crate) struct Query<'a> {
    pub dn: &'a Dn,
    pub recursive: bool,
    pub filters: Vec<Filter>,
    pub backlog: Option<Backlog>,
    pub stream: bool,
}

/// The main log recording structure.
///
/// Producers [`append`](Journal::append) an entry and then
/// [`notify`](Journal::notify) subscribers about it. The two calls lock the
/// journal independently: a concurrent reader may see an entry in a backlog
/// before it is streamed, or the other way round.
///
/// All state is guarded by a single reader/writer lock. Appends, fan-out and
/// subscription take it for writing, backlog scans for reading.
pub struct Journal {
    state: RwLock<JournalState>,
    config: JournalConfig,
}

impl Journal {
    pub fn new(config: JournalConfig) -> Self {
        Self {
            state: RwLock::new(JournalState::default()),
            config,
        }
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Store an entry, evicting the oldest entries of its DN if the DN's
    /// quota is exceeded.
    pub fn append(&self, entry: LogEntry) -> AppendOutcome {
        let dn = entry.dn().clone();
        let (outcome, created_quota) = self.state.write().append(entry, &self.config);
        if let Some(max) = created_quota {
            trace!(%dn, max, "Created quota record");
        }
        if outcome.evicted > 0 {
            trace!(%dn, evicted = outcome.evicted, "Evicted entries over quota");
        }
        outcome
    }

    /// Offer an entry to every live subscriber, never blocking on slow ones.
    ///
    /// Subscribers that were closed since the last call are dropped from the
    /// registry here, which also ends their stream.
    pub fn notify(&self, entry: &LogEntry) {
        let mode = self.config.stream_filtering;
        let (removed, missed) = {
            let mut state = self.state.write();
            let before = state.subscribers.len();
            let mut missed = 0usize;
            state.subscribers.retain(|sub| match sub.offer(entry, mode) {
                Delivery::Gone => false,
                Delivery::Missed => {
                    missed += 1;
                    true
                }
                Delivery::Sent | Delivery::Filtered => true,
            });
            (before - state.subscribers.len(), missed)
        };
        if removed > 0 {
            debug!(removed, "Dropped closed log subscribers");
        }
        if missed > 0 {
            trace!(missed, dn = %entry.dn(), "Stream buffers full, entry dropped");
        }
    }

    /// Entry by handle, or None if it has been evicted.
    pub fn get(&self, id: EntryId) -> Option<LogEntry> {
        self.state.read().node(id).map(|n| n.entry.clone())
    }

    /// Linear scan of the global list for entries passing all filters, oldest
    /// first. For a single DN, [`get_entries`](Journal::get_entries) is
    /// cheaper.
    pub fn scan_entries(&self, limit: Backlog, filters: &[Filter]) -> Vec<LogEntry> {
        self.state.read().scan_entries(limit, filters)
    }

    /// Entries logged at exactly `exact` and passing all filters, oldest
    /// first. Only walks that DN's local list.
    pub fn get_entries(&self, limit: Backlog, exact: &Dn, filters: &[Filter]) -> Vec<LogEntry> {
        self.state.read().get_entries(limit, exact, filters)
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.state.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently retained for a DN, from its sequence
    /// numbers.
    pub fn len_at(&self, dn: &Dn) -> u64 {
        let state = self.state.read();
        let head = state.heads.get(dn).and_then(|h| state.node(*h));
        let tail = state.tails.get(dn).and_then(|t| state.node(*t));
        match (head, tail) {
            (Some(h), Some(t)) => t.seq_local - h.seq_local + 1,
            _ => 0,
        }
    }

    /// Retention ceiling of a DN, if anything was ever logged there.
    pub fn quota(&self, dn: &Dn) -> Option<u64> {
        self.state.read().quota.get(dn).map(|q| q.max)
    }

    /// Number of registered subscribers, including closed ones not yet
    /// discovered by [`notify`](Journal::notify).
    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Retention ceilings of every DN ever logged at.
    pub fn quotas(&self) -> Vec<(Dn, u64)> {
        let state = self.state.read();
        let mut quotas: Vec<_> = state
            .quota
            .values()
            .map(|q| (q.origin.clone(), q.max))
            .collect();
        quotas.sort();
        quotas
    }

    /// Collect a backlog and/or register a subscriber. When both are asked
    /// for, they happen under one lock acquisition so that no entry is
    /// missing from both. An entry appended but not yet notified shows up in
    /// the backlog and is streamed again by its `notify`.
    pub(crate) fn query(&self, q: Query<'_>) -> (Vec<LogEntry>, Option<StreamHandle>) {
        let collect = |state: &JournalState| match q.backlog {
            Some(limit) if q.recursive => state.scan_entries(limit, &q.filters),
            Some(limit) => state.get_entries(limit, q.dn, &q.filters),
            None => Vec::new(),
        };

        if !q.stream {
            return (collect(&*self.state.read()), None);
        }

        let (backlog, handle) = {
            let mut state = self.state.write();
            let backlog = collect(&*state);
            let (sub, handle) = Subscriber::new(q.filters.clone(), self.config.stream_buffer());
            state.subscribers.push(sub);
            (backlog, handle)
        };
        debug!(dn = %q.dn, recursive = q.recursive, "Registered log subscriber");
        (backlog, Some(handle))
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(JournalConfig::default())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Journal")
            .field("entries", &state.len)
            .field("dns", &state.quota.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
impl JournalState {
    /// Walk the global list and every local list, checking that links are
    /// symmetric, bounds are consistent, quotas hold and both traversals
    /// agree on the set of live entries.
    fn check_integrity(&self) -> Result<(), String> {
        use std::collections::HashSet;

        let mut global = HashSet::new();
        let mut prev: Option<EntryId> = None;
        let mut cur = self.head;
        while let Some(id) = cur {
            let node = self
                .node(id)
                .ok_or_else(|| format!("global list reaches dead handle {id:?}"))?;
            if node.prev_global != prev {
                return Err(format!(
                    "global prev link of {id:?} is {:?}, want {prev:?}",
                    node.prev_global
                ));
            }
            if !global.insert(id) {
                return Err(format!("global list loops at {id:?}"));
            }
            prev = Some(id);
            cur = node.next_global;
        }
        if self.tail != prev {
            return Err(format!("global tail is {:?}, list ends at {prev:?}", self.tail));
        }

        let mut local = HashSet::new();
        for (dn, head) in &self.heads {
            let mut prev: Option<EntryId> = None;
            let mut cur = Some(*head);
            let mut count = 0u64;
            let mut first_seq = None;
            let mut last_seq = None;
            while let Some(id) = cur {
                let node = self
                    .node(id)
                    .ok_or_else(|| format!("local list of {dn} reaches dead handle {id:?}"))?;
                if node.entry.dn() != dn {
                    return Err(format!("entry of {} in local list of {dn}", node.entry.dn()));
                }
                if node.prev_local != prev {
                    return Err(format!("local prev link of {id:?} broken"));
                }
                if let Some(last) = last_seq {
                    if node.seq_local != last + 1 {
                        return Err(format!("seq gap in {dn}: {last} -> {}", node.seq_local));
                    }
                }
                first_seq.get_or_insert(node.seq_local);
                last_seq = Some(node.seq_local);
                local.insert(id);
                count += 1;
                prev = Some(id);
                cur = node.next_local;
            }
            if self.tails.get(dn) != prev.as_ref() {
                return Err(format!("local tail of {dn} does not match list end"));
            }
            let (first, last) = (first_seq.unwrap_or(0), last_seq.unwrap_or(0));
            if last - first + 1 != count {
                return Err(format!("seq span of {dn} is {}, list has {count}", last - first + 1));
            }
            let max = self.quota.get(dn).map(|q| q.max).unwrap_or(0);
            if count > max {
                return Err(format!("{dn} retains {count} entries over quota {max}"));
            }
        }
        if self.heads.len() != self.tails.len() {
            return Err("heads and tails disagree on DNs".to_string());
        }
        if global != local {
            return Err(format!(
                "global list has {} entries, local lists have {}",
                global.len(),
                local.len()
            ));
        }
        if global.len() != self.len {
            return Err(format!("len is {}, lists have {}", self.len, global.len()));
        }
        Ok(())
    }
}

//! Notification store
//!
//! Typed append-only queues. Each registered reader owns a cursor per type
//! and consumes entries independently; an entry is dropped once every reader
//! has consumed it, or when its queue grows past [`MAX_ENTRIES`].

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Upper bound on retained entries per type
pub const MAX_ENTRIES: usize = 100;

/// Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyType {
    Info,
    Error,
    Alert,
    Data,
}

impl NotifyType {
    pub const ALL: [NotifyType; 4] = [
        NotifyType::Info,
        NotifyType::Error,
        NotifyType::Alert,
        NotifyType::Data,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NotifyType::Info => "info",
            NotifyType::Error => "error",
            NotifyType::Alert => "alert",
            NotifyType::Data => "data",
        }
    }

    fn index(&self) -> usize {
        match self {
            NotifyType::Info => 0,
            NotifyType::Error => 1,
            NotifyType::Alert => 2,
            NotifyType::Data => 3,
        }
    }
}

impl fmt::Display for NotifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NotifyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotifyType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("Unknown notification type: {}", s))
    }
}

/// A single notification
#[derive(Debug, Clone)]
pub struct NotifyEntry {
    /// Per-type sequence number, starting at 1
    pub id: u32,
    pub created: Instant,
    pub subtype: String,
    pub value: String,
}

impl NotifyEntry {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Value up to (excluding) the first newline
    pub fn first_line(&self) -> &str {
        self.value.split('\n').next().unwrap_or_default()
    }
}

/// Handle of a registered reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(usize);

/// Arrival callback; returning `true` marks the entry read for that reader
pub type NotifyCallback = Arc<dyn Fn(NotifyType, &NotifyEntry) -> bool + Send + Sync>;

/// Read position of one reader within one queue
///
/// Entries may be consumed out of order; `next` only moves forward once
/// every id below it has been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyCursor {
    next: u32,
    consumed: BTreeSet<u32>,
}

impl NotifyCursor {
    pub fn new(next: u32) -> Self {
        Self {
            next,
            consumed: BTreeSet::new(),
        }
    }

    /// Mark `id` consumed
    pub fn advance(&mut self, id: u32) {
        if id < self.next {
            return;
        }
        self.consumed.insert(id);
        while self.consumed.remove(&self.next) {
            self.next += 1;
        }
    }

    /// Lowest id not yet consumed
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Whether any id up to `last_id` is still unconsumed
    pub fn has_next(&self, last_id: u32) -> bool {
        (self.next..=last_id).any(|id| !self.consumed.contains(&id))
    }

    pub fn is_consumed(&self, id: u32) -> bool {
        id < self.next || self.consumed.contains(&id)
    }
}

#[derive(Default)]
struct NotifyQueue {
    last_id: u32,
    entries: VecDeque<Arc<NotifyEntry>>,
    cursors: HashMap<ReaderId, NotifyCursor>,
}

impl NotifyQueue {
    fn prune(&mut self) {
        while self.entries.len() > MAX_ENTRIES {
            if let Some(dropped) = self.entries.pop_front() {
                trace!(id = dropped.id, "Dropping oldest notification");
                for cursor in self.cursors.values_mut() {
                    cursor.advance(dropped.id);
                }
            }
        }
        while let Some(front) = self.entries.front() {
            let id = front.id;
            if self.cursors.values().all(|c| c.is_consumed(id)) {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Default)]
struct StoreInner {
    readers: Vec<Option<(String, NotifyCallback)>>,
    queues: [NotifyQueue; 4],
}

/// Thread-safe notification store
#[derive(Default)]
pub struct NotifyStore {
    inner: Mutex<StoreInner>,
}

impl NotifyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader
    ///
    /// A second registration under the same name replaces the callback and
    /// keeps the existing id and cursors.
    pub fn register_reader(&self, name: &str, callback: NotifyCallback) -> ReaderId {
        let mut inner = self.inner.lock();
        let existing = inner
            .readers
            .iter()
            .position(|r| r.as_ref().is_some_and(|(n, _)| n == name));
        if let Some(pos) = existing {
            inner.readers[pos] = Some((name.to_string(), callback));
            return ReaderId(pos);
        }

        let id = match inner.readers.iter().position(Option::is_none) {
            Some(free) => {
                inner.readers[free] = Some((name.to_string(), callback));
                ReaderId(free)
            }
            None => {
                inner.readers.push(Some((name.to_string(), callback)));
                ReaderId(inner.readers.len() - 1)
            }
        };
        for queue in inner.queues.iter_mut() {
            let start = queue.last_id + 1;
            queue.cursors.insert(id, NotifyCursor::new(start));
        }
        debug!(reader = name, "Registered notification reader");
        id
    }

    /// Unregister a reader and release everything only it was holding
    pub fn clear_reader(&self, name: &str) {
        let mut inner = self.inner.lock();
        let Some(pos) = inner
            .readers
            .iter()
            .position(|r| r.as_ref().is_some_and(|(n, _)| n == name))
        else {
            return;
        };
        inner.readers[pos] = None;
        for queue in inner.queues.iter_mut() {
            queue.cursors.remove(&ReaderId(pos));
            queue.prune();
        }
        debug!(reader = name, "Cleared notification reader");
    }

    /// Append a notification and offer it to every reader
    ///
    /// Returns the new entry id. Callbacks run without the store lock held.
    pub fn raise(&self, ty: NotifyType, subtype: &str, value: &str) -> u32 {
        let (entry, readers) = {
            let mut inner = self.inner.lock();
            let queue = &mut inner.queues[ty.index()];
            queue.last_id += 1;
            let entry = Arc::new(NotifyEntry {
                id: queue.last_id,
                created: Instant::now(),
                subtype: subtype.to_string(),
                value: value.to_string(),
            });
            queue.entries.push_back(entry.clone());
            let readers: Vec<(ReaderId, NotifyCallback)> = inner
                .readers
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.as_ref().map(|(_, cb)| (ReaderId(i), cb.clone())))
                .collect();
            (entry, readers)
        };
        debug!(kind = %ty, id = entry.id, subtype, "Notification raised");

        let done: Vec<ReaderId> = readers
            .into_iter()
            .filter(|(_, cb)| cb(ty, &entry))
            .map(|(id, _)| id)
            .collect();

        let mut inner = self.inner.lock();
        let queue = &mut inner.queues[ty.index()];
        for reader in done {
            if let Some(cursor) = queue.cursors.get_mut(&reader) {
                cursor.advance(entry.id);
            }
        }
        queue.prune();
        entry.id
    }

    /// Oldest entry with id above `floor` that `reader` has not consumed
    pub fn first_unread(
        &self,
        ty: NotifyType,
        reader: ReaderId,
        floor: u32,
    ) -> Option<Arc<NotifyEntry>> {
        let inner = self.inner.lock();
        let queue = &inner.queues[ty.index()];
        let cursor = queue.cursors.get(&reader)?;
        queue
            .entries
            .iter()
            .find(|e| e.id > floor && !cursor.is_consumed(e.id))
            .cloned()
    }

    /// Mark entry `id` consumed by `reader`
    pub fn mark_read(&self, ty: NotifyType, reader: ReaderId, id: u32) {
        let mut inner = self.inner.lock();
        let queue = &mut inner.queues[ty.index()];
        if let Some(cursor) = queue.cursors.get_mut(&reader) {
            cursor.advance(id);
        }
        queue.prune();
    }

    pub fn find_entry(&self, ty: NotifyType, id: u32) -> Option<Arc<NotifyEntry>> {
        self.inner.lock().queues[ty.index()]
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Number of retained entries of a type
    pub fn len(&self, ty: NotifyType) -> usize {
        self.inner.lock().queues[ty.index()].entries.len()
    }

    pub fn is_empty(&self, ty: NotifyType) -> bool {
        self.len(ty) == 0
    }
}

impl fmt::Debug for NotifyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NotifyStore")
            .field("readers", &inner.readers.iter().flatten().count())
            .finish()
    }
}

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{ChannelError, Result};
use crate::message::Response;

/// Single-use destination for a request's outcome.
pub(crate) type ReplySender = oneshot::Sender<Result<Response>>;

/// An in-flight request awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    pub method: String,
    pub reply: ReplySender,
}

impl PendingEntry {
    /// Deliver the outcome. Returns `false` if the requester already gave up.
    pub fn complete(self, outcome: Result<Response>) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// Concurrent map from request id to its pending entry.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: DashMap<u32, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry; fails if `id` is still held by an earlier request.
    pub fn register(&self, id: u32, entry: PendingEntry) -> Result<()> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(ChannelError::IdInUse(id)),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Remove and return the entry for `id`, if still present.
    pub fn take(&self, id: u32) -> Option<PendingEntry> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(u32, PendingEntry)> {
        let ids: Vec<u32> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Removes a request's entry when the request future finishes or is dropped.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: u32,
}

impl<'a> PendingGuard<'a> {
    pub fn new(table: &'a PendingTable, id: u32) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.take(self.id);
    }
}

/// Request id allocator: starts at 1, wraps from `u32::MAX` back to 1.
#[derive(Debug)]
pub(crate) struct RequestIds {
    last: AtomicU32,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    pub(crate) fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
        }
    }

    pub fn next(&self) -> u32 {
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(successor(last))
            })
            .unwrap_or_else(|last| last);
        successor(previous)
    }
}

fn successor(id: u32) -> u32 {
    if id == u32::MAX {
        1
    } else {
        id + 1
    }
}

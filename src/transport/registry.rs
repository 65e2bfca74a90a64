//! # Connection Registry
//!
//! Fixed table of player slots shared by the accept loop, every session task
//! and the idle sweep. Mutations are serialized by one mutex.
//!
//! A slot is owned through a [`SlotHandle`]. Each registration gets a unique
//! ticket, so a session whose slot was evicted and handed to a newer connection
//! cannot release the newer connection's slot.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::info;

use crate::error::{constants, ProtocolError, Result};

#[derive(Debug)]
struct SlotEntry {
    ticket: u64,
    peer: SocketAddr,
    username: Option<String>,
    last_seen: Instant,
    evict: Arc<Notify>,
}

#[derive(Debug)]
struct Slots {
    entries: Vec<Option<SlotEntry>>,
    next_ticket: u64,
}

/// Ownership of one registry slot.
#[derive(Debug, Clone)]
pub struct SlotHandle {
    slot: usize,
    ticket: u64,
    evict: Arc<Notify>,
}

impl SlotHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Resolves once the registry evicts this slot.
    pub async fn evicted(&self) {
        self.evict.notified().await;
    }
}

/// Slot table sized to the player limit.
#[derive(Debug)]
pub struct ConnectionRegistry {
    slots: Mutex<Slots>,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(Slots {
                entries,
                next_ticket: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots>> {
        self.slots
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Number of occupied slots.
    pub fn active(&self) -> Result<usize> {
        Ok(self.lock()?.entries.iter().filter(|e| e.is_some()).count())
    }

    /// Claim the lowest free slot.
    pub fn register(&self, peer: SocketAddr) -> Result<SlotHandle> {
        let mut slots = self.lock()?;
        let slot = slots
            .entries
            .iter()
            .position(|e| e.is_none())
            .ok_or(ProtocolError::ServerFull)?;

        let ticket = slots.next_ticket;
        slots.next_ticket += 1;
        let evict = Arc::new(Notify::new());
        slots.entries[slot] = Some(SlotEntry {
            ticket,
            peer,
            username: None,
            last_seen: Instant::now(),
            evict: Arc::clone(&evict),
        });

        Ok(SlotHandle {
            slot,
            ticket,
            evict,
        })
    }

    /// Release a slot. Does nothing when the slot already belongs to someone else.
    pub fn deregister(&self, handle: &SlotHandle) -> Result<bool> {
        let mut slots = self.lock()?;
        let entry = &mut slots.entries[handle.slot];
        if entry.as_ref().is_some_and(|e| e.ticket == handle.ticket) {
            *entry = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Record activity on a slot.
    pub fn touch(&self, handle: &SlotHandle) -> Result<()> {
        self.with_entry(handle, |e| e.last_seen = Instant::now())
    }

    /// Bind `username` to the slot unless another slot already holds it
    /// (case-insensitive). The check and the claim happen under one lock.
    /// Returns false when the name is taken or the handle is stale.
    pub fn claim_username(&self, handle: &SlotHandle, username: &str) -> Result<bool> {
        let mut slots = self.lock()?;
        let taken = slots.entries.iter().enumerate().any(|(slot, e)| {
            slot != handle.slot
                && e.as_ref().is_some_and(|e| {
                    e.username
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(username))
                })
        });
        if taken {
            return Ok(false);
        }
        match slots.entries[handle.slot].as_mut() {
            Some(entry) if entry.ticket == handle.ticket => {
                entry.username = Some(username.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Unbind the slot's name, used when a claimed login is rejected afterwards.
    pub fn release_username(&self, handle: &SlotHandle) -> Result<()> {
        self.with_entry(handle, |e| e.username = None)
    }

    /// Whether a logged-in player already uses `username` (case-insensitive).
    pub fn is_online(&self, username: &str) -> Result<bool> {
        Ok(self.lock()?.entries.iter().flatten().any(|e| {
            e.username
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(username))
        }))
    }

    fn with_entry(&self, handle: &SlotHandle, f: impl FnOnce(&mut SlotEntry)) -> Result<()> {
        let mut slots = self.lock()?;
        if let Some(entry) = slots.entries[handle.slot].as_mut() {
            if entry.ticket == handle.ticket {
                f(entry);
            }
        }
        Ok(())
    }

    /// Evict every slot idle for longer than `idle_timeout` as of `now`.
    /// Returns the evicted slot numbers.
    pub fn sweep(&self, idle_timeout: Duration, now: Instant) -> Result<Vec<usize>> {
        let mut slots = self.lock()?;
        let mut evicted = Vec::new();
        for (slot, entry) in slots.entries.iter_mut().enumerate() {
            let idle = entry
                .as_ref()
                .is_some_and(|e| now.saturating_duration_since(e.last_seen) > idle_timeout);
            if idle {
                if let Some(e) = entry.take() {
                    info!(slot, peer = %e.peer, username = ?e.username, "evicting idle connection");
                    e.evict.notify_one();
                    evicted.push(slot);
                }
            }
        }
        Ok(evicted)
    }

    /// Evict every slot, used on shutdown.
    pub fn evict_all(&self) -> Result<usize> {
        let mut slots = self.lock()?;
        let mut count = 0;
        for entry in slots.entries.iter_mut() {
            if let Some(e) = entry.take() {
                e.evict.notify_one();
                count += 1;
            }
        }
        Ok(count)
    }
}

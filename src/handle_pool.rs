//! Bounded pool of open file handles with LRU eviction.
//!
//! Grounded on `libbfio_pool.c`: an arena (`Vec<Slot>`) of handle
//! descriptors plus an intrusive doubly-linked "last used" list over open
//! slots (`_append_handle_to_last_used_list`,
//! `_move_handle_to_front_of_last_used_list`). Everywhere outside this
//! module refers to a handle by its `HandleId` index, never by `File`
//! directly — the one-vector-plus-indices arena style the design notes
//! call for.

use crate::error::{EwfError, Result};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

pub const UNLIMITED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFlags(pub u8);

impl AccessFlags {
    pub const READ: AccessFlags = AccessFlags(1);
    pub const WRITE: AccessFlags = AccessFlags(2);
    pub const RESUME: AccessFlags = AccessFlags(4);
    pub const TRUNCATE: AccessFlags = AccessFlags(8);

    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | other.0)
    }

    pub fn without(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 & !other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(usize);

struct Slot {
    path: PathBuf,
    access: AccessFlags,
    file: Option<File>,
    /// Logical stream offset, preserved across an evict/reopen cycle.
    last_offset: u64,
    /// Position of this slot in the LRU list (open slots only).
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bounded set of open byte-stream handles with LRU eviction, the only
/// path through which any segment file is actually opened for I/O.
pub struct HandlePool {
    slots: Vec<Slot>,
    max_open: usize,
    open_count: usize,
    lru_head: Option<usize>, // most-recently-used
    lru_tail: Option<usize>, // least-recently-used, evicted first
}

impl HandlePool {
    pub fn new(max_open: usize) -> Self {
        Self {
            slots: Vec::new(),
            max_open,
            open_count: 0,
            lru_head: None,
            lru_tail: None,
        }
    }

    pub fn set_max_open(&mut self, n: usize) {
        self.max_open = n;
    }

    /// Register a new backing path without opening it. Returns an opaque
    /// id used for every subsequent operation.
    pub fn add(&mut self, path: PathBuf, access: AccessFlags) -> HandleId {
        self.slots.push(Slot {
            path,
            access,
            file: None,
            last_offset: 0,
            prev: None,
            next: None,
        });
        HandleId(self.slots.len() - 1)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.lru_head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.lru_tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.lru_head;
        if let Some(head) = self.lru_head {
            self.slots[head].prev = Some(idx);
        }
        self.lru_head = Some(idx);
        if self.lru_tail.is_none() {
            self.lru_tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.lru_head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn evict_tail(&mut self) -> Result<()> {
        let victim = self
            .lru_tail
            .ok_or(EwfError::PoolExhausted)?;
        self.close_slot(victim)?;
        Ok(())
    }

    fn close_slot(&mut self, idx: usize) -> Result<()> {
        if self.slots[idx].file.is_none() {
            return Ok(());
        }
        {
            let slot = &mut self.slots[idx];
            if let Some(f) = slot.file.as_mut() {
                slot.last_offset = f.stream_position().unwrap_or(slot.last_offset);
            }
        }
        self.unlink(idx);
        self.slots[idx].file = None;
        // A reopen after truncate must not re-truncate the file.
        self.slots[idx].access = self.slots[idx].access.without(AccessFlags::TRUNCATE);
        self.open_count -= 1;
        debug!("handle pool: closed slot {idx} (LRU eviction or explicit close)");
        Ok(())
    }

    fn open_slot(&mut self, idx: usize) -> Result<()> {
        if self.open_count >= self.max_open && self.max_open != UNLIMITED {
            self.evict_tail()?;
        }
        let slot = &self.slots[idx];
        let mut opts = OpenOptions::new();
        opts.read(slot.access.contains(AccessFlags::READ));
        if slot.access.contains(AccessFlags::WRITE) {
            opts.write(true);
            opts.create(true);
            if slot.access.contains(AccessFlags::TRUNCATE) {
                opts.truncate(true);
            }
        }
        let mut file = opts.open(&slot.path)?;
        let offset = slot.last_offset;
        file.seek(SeekFrom::Start(offset))?;
        let slot = &mut self.slots[idx];
        slot.file = Some(file);
        self.open_count += 1;
        self.push_front(idx);
        debug!("handle pool: opened slot {idx} at offset {offset}");
        Ok(())
    }

    /// Guarantee the handle is open, then invoke `f` with it. This is the
    /// only way to obtain a live `&mut File`.
    pub fn with_open<T>(
        &mut self,
        id: HandleId,
        f: impl FnOnce(&mut File) -> Result<T>,
    ) -> Result<T> {
        let idx = id.0;
        if self.slots[idx].file.is_some() {
            self.move_to_front(idx);
        } else {
            self.open_slot(idx)?;
        }
        let result = {
            let file = self.slots[idx].file.as_mut().expect("just opened");
            f(file)
        };
        if result.is_ok() {
            if let Some(file) = self.slots[idx].file.as_mut() {
                self.slots[idx].last_offset = file.stream_position().unwrap_or(0);
            }
        }
        result
    }

    pub fn close(&mut self, id: HandleId) -> Result<()> {
        self.close_slot(id.0)
    }

    pub fn close_all(&mut self) -> Result<()> {
        let indices: Vec<usize> = (0..self.slots.len()).collect();
        for idx in indices {
            self.close_slot(idx)?;
        }
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn is_open(&self, id: HandleId) -> bool {
        self.slots[id.0].file.is_some()
    }

    /// Ids currently open, ordered MRU-first (for tests/introspection).
    pub fn open_order(&self) -> Vec<HandleId> {
        let mut out = Vec::new();
        let mut cur = self.lru_head;
        while let Some(idx) = cur {
            out.push(HandleId(idx));
            cur = self.slots[idx].next;
        }
        out
    }

    pub fn lru_tail(&self) -> Option<HandleId> {
        self.lru_tail.map(HandleId)
    }
}

impl Drop for HandlePool {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            warn!("handle pool: error while closing all handles on drop: {e}");
        }
    }
}

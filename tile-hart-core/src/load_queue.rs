//! Bounded history of in-flight external loads.
//!
//! Loads from externally backed memory may fail after they have already retired. Each such load
//! leaves an entry holding the destination register's value from before the load, so that a later
//! bus error report can put that value back.

use log::{error, warn};
use thiserror::Error;

/// Default capacity of the queue.
pub const DEFAULT_SIZE: usize = 16;

/// One tracked load.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadQueueEntry {
    /// Access size in bytes.
    pub size: u64,
    pub address: u64,
    /// Destination register index.
    pub register: u8,
    /// The destination is a floating-point register.
    pub fp: bool,
    /// Value of the destination register before the load.
    pub previous: u64,
    /// Set for the custom 64-bit load, whose upper half lands in `MDBHD`.
    pub wide: bool,
    pub tag: u64,
    valid: bool,
}

impl LoadQueueEntry {
    pub fn new(
        size: u64,
        address: u64,
        register: u8,
        fp: bool,
        previous: u64,
        wide: bool,
        tag: u64,
    ) -> Self {
        Self {
            size,
            address,
            register,
            fp,
            previous,
            wide,
            tag,
            valid: true,
        }
    }

    /// Returns `false` once the destination register has been overwritten by a later instruction,
    /// after which the entry must not revert it.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Register value to restore after a failed load.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Revert {
    pub register: u8,
    pub fp: bool,
    pub value: u64,
    /// The entry was a wide load; the upper half of `value` belongs in `MDBHD`.
    pub wide: bool,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum LoadQueueError {
    #[error("Load exception addr:{address:#x} tag:{tag} matches no load queue entry")]
    NoMatch { address: u64, tag: u64 },
    #[error("Load exception addr:{address:#x} tag:{tag} matches {matches} load queue entries")]
    MultipleMatches {
        address: u64,
        tag: u64,
        matches: usize,
    },
}

#[derive(Debug, Clone)]
pub struct LoadQueue {
    entries: Vec<LoadQueueEntry>,
    capacity: usize,
}

impl LoadQueue {
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("load queue capacity must be non-zero");
        }
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LoadQueueEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Records a load. When the queue is full, the oldest entry is shifted out.
    ///
    /// Older valid entries for the same register are invalidated and the new entry inherits the
    /// oldest pre-load value among them, so a revert restores the value from before the first of
    /// the back-to-back loads.
    pub fn put(&mut self, mut entry: LoadQueueEntry) {
        if self.entries.len() >= self.capacity {
            warn!("Load queue full, dropping entry with tag {}", self.entries[0].tag);
            self.entries.remove(0);
        }
        for older in self
            .entries
            .iter_mut()
            .filter(|e| e.valid && e.register == entry.register && e.fp == entry.fp)
        {
            entry.previous = older.previous;
            older.valid = false;
        }
        entry.valid = true;
        self.entries.push(entry);
    }

    /// Invalidates the entries targeting `register`, which was just written by a non-load
    /// instruction.
    pub fn invalidate(&mut self, register: u8, fp: bool) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.register == register && e.fp == fp)
        {
            entry.valid = false;
        }
    }

    /// Called when `register` is read as a source. The load must have completed by then, so the
    /// most recent valid entry for the register is removed and older ones invalidated.
    pub fn remove(&mut self, register: u8, fp: bool) {
        if register == 0 && !fp {
            return;
        }
        let mut newest = None;
        for (index, entry) in self.entries.iter_mut().enumerate().rev() {
            if !entry.valid || entry.register != register || entry.fp != fp {
                continue;
            }
            if newest.is_none() {
                newest = Some(index);
            } else {
                entry.valid = false;
            }
        }
        if let Some(index) = newest {
            self.entries.remove(index);
        }
    }

    /// Handles an external load error for the load tagged `tag`.
    ///
    /// With exactly one matching entry, the entry is removed and, if still valid, the register
    /// value to restore is returned. Any other number of matches is an integrity error; the queue
    /// is left unchanged.
    pub fn apply_load_exception(
        &mut self,
        address: u64,
        tag: u64,
    ) -> Result<Option<Revert>, LoadQueueError> {
        let matches: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.tag == tag)
            .map(|(index, _)| index)
            .collect();
        let index = match matches.as_slice() {
            [index] => *index,
            [] => {
                let err = LoadQueueError::NoMatch { address, tag };
                error!("{err}");
                return Err(err);
            }
            _ => {
                let err = LoadQueueError::MultipleMatches {
                    address,
                    tag,
                    matches: matches.len(),
                };
                error!("{err}");
                return Err(err);
            }
        };
        let entry = self.entries.remove(index);
        Ok(entry.valid.then_some(Revert {
            register: entry.register,
            fp: entry.fp,
            value: entry.previous,
            wide: entry.wide,
        }))
    }

    /// Handles the completion report of the load tagged `tag` by removing the first matching
    /// entry. Mismatches are only warned about.
    pub fn apply_load_finished(&mut self, address: u64, tag: u64) {
        let mut matching = self.entries.iter().enumerate().filter(|(_, e)| e.tag == tag);
        let Some((index, _)) = matching.next() else {
            warn!("Load finished addr:{address:#x} tag:{tag} matches no load queue entry");
            return;
        };
        if matching.next().is_some() {
            warn!("Load finished at {address:#x} matches multiple entries in the load queue");
        }
        self.entries.remove(index);
    }
}

impl Default for LoadQueue {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(register: u8, previous: u64, tag: u64) -> LoadQueueEntry {
        LoadQueueEntry::new(4, 0x1000 + tag * 4, register, false, previous, false, tag)
    }

    #[test]
    fn exception_reverts_register() {
        let mut queue = LoadQueue::default();
        queue.put(load(5, 0xaa, 1));
        queue.put(load(6, 0xbb, 2));
        assert_eq!(
            queue.apply_load_exception(0x1004, 1),
            Ok(Some(Revert {
                register: 5,
                fp: false,
                value: 0xaa,
                wide: false
            }))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn overwritten_register_is_not_reverted() {
        let mut queue = LoadQueue::default();
        queue.put(load(5, 0xaa, 1));
        queue.invalidate(5, false);
        assert_eq!(queue.apply_load_exception(0x1004, 1), Ok(None));
        assert!(queue.is_empty());
    }

    #[test]
    fn back_to_back_loads_keep_first_previous_value() {
        let mut queue = LoadQueue::default();
        queue.put(load(5, 0xaa, 1));
        queue.put(load(5, 0xcc, 2));
        let valid: Vec<_> = queue.entries().iter().filter(|e| e.is_valid()).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].previous, 0xaa);
        assert_eq!(
            queue.apply_load_exception(0, 2).map(|r| r.map(|r| r.value)),
            Ok(Some(0xaa))
        );
    }

    #[test]
    fn mismatched_tags_are_errors() {
        let mut queue = LoadQueue::default();
        queue.put(load(5, 0xaa, 1));
        queue.put(load(6, 0xbb, 1));
        assert_eq!(
            queue.apply_load_exception(0x20, 1),
            Err(LoadQueueError::MultipleMatches {
                address: 0x20,
                tag: 1,
                matches: 2
            })
        );
        assert_eq!(
            queue.apply_load_exception(0x20, 9),
            Err(LoadQueueError::NoMatch {
                address: 0x20,
                tag: 9
            })
        );
        assert_eq!(queue.len(), 2);
        assert_eq!(
            LoadQueueError::NoMatch {
                address: 0x20,
                tag: 9
            }
            .to_string(),
            "Load exception addr:0x20 tag:9 matches no load queue entry"
        );
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut queue = LoadQueue::new(2);
        queue.put(load(1, 0, 1));
        queue.put(load(2, 0, 2));
        queue.put(load(3, 0, 3));
        let tags: Vec<_> = queue.entries().iter().map(|e| e.tag).collect();
        assert_eq!(tags, [2, 3]);
    }

    #[test]
    fn source_read_removes_newest_entry() {
        let mut queue = LoadQueue::default();
        queue.put(load(5, 0, 1));
        queue.put(load(7, 0, 2));
        queue.remove(5, false);
        assert_eq!(queue.len(), 1);
        queue.remove(5, true);
        assert_eq!(queue.len(), 1);
        queue.apply_load_finished(0, 2);
        assert!(queue.is_empty());
    }
}

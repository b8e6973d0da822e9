//! Managed descriptor table

use std::os::fd::RawFd;

use crate::error::Result;
use crate::types::BackendId;

/// A descriptor registered by a backend for readiness notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedFd {
    pub fd: RawFd,
    pub backend: BackendId,
    /// Opaque value chosen by the backend, handed back when the descriptor fires
    pub context: u64,
}

/// Table of managed descriptors.
///
/// Removed entries are tombstoned and their slots reused, so the positions
/// of live entries never shift while an iteration is in progress.
#[derive(Debug, Default)]
pub struct FdTable {
    slots: Vec<Option<ManagedFd>>,
    dirty: bool,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, update or (with `enable == false`) remove the entry for `(fd, backend)`
    pub fn manage(&mut self, fd: RawFd, backend: BackendId, enable: bool, context: u64) -> Result<()> {
        let existing = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.fd == fd && entry.backend == backend));

        if let Some(index) = existing {
            if enable {
                if let Some(entry) = self.slots[index].as_mut() {
                    entry.context = context;
                }
            } else {
                self.slots[index] = None;
            }
            self.dirty = true;
            return Ok(());
        }

        if !enable {
            return Ok(());
        }

        let entry = Some(ManagedFd {
            fd,
            backend,
            context,
        });
        match self.slots.iter().position(Option::is_none) {
            Some(free) => self.slots[free] = entry,
            None => {
                self.slots.try_reserve(1)?;
                self.slots.push(entry);
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Live entries in slot order
    pub fn entries(&self) -> impl Iterator<Item = &ManagedFd> {
        self.slots.iter().flatten()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, including tombstones
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(index: usize) -> BackendId {
        BackendId::from_index(index)
    }

    #[test]
    fn test_manage_and_update() {
        let mut table = FdTable::new();
        table.manage(5, backend(0), true, 1).unwrap();
        assert!(table.is_dirty());
        table.mark_clean();

        table.manage(5, backend(0), true, 2).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries().next().unwrap().context, 2);

        // same descriptor, different backend is a separate entry
        table.manage(5, backend(1), true, 3).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_tombstone_reuse() {
        let mut table = FdTable::new();
        table.manage(3, backend(0), true, 0).unwrap();
        table.manage(4, backend(0), true, 0).unwrap();
        table.manage(5, backend(0), true, 0).unwrap();
        table.mark_clean();

        table.manage(4, backend(0), false, 0).unwrap();
        assert!(table.is_dirty());
        assert_eq!(table.len(), 2);
        assert_eq!(table.capacity(), 3);

        table.manage(9, backend(1), true, 7).unwrap();
        assert_eq!(table.capacity(), 3);
        let fds: Vec<RawFd> = table.entries().map(|e| e.fd).collect();
        assert_eq!(fds, vec![3, 9, 5]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut table = FdTable::new();
        table.manage(3, backend(0), false, 0).unwrap();
        assert!(table.is_empty());
        assert!(!table.is_dirty());
    }
}

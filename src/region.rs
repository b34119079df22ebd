// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Byte-exact layout of the mapped region, and a safe-ish wrapper over
// the raw pointer both peers receive from the platform (BAR2 mapping is
// the platform's job, not this crate's — see `pci.rs`).

use crate::error::{IvshmError, Result};
use crate::ring::RingView;

/// Default record capacity per ring (512 records × 24 bytes ≈ 12 KiB).
pub const DEFAULT_RING_CAPACITY: u32 = 512;

/// Default total region size (16 MiB), leaving the remainder after the
/// two rings and two notifiers for the arena.
pub const DEFAULT_REGION_SIZE: usize = 16 * 1024 * 1024;

/// Describes the byte layout derived from a ring capacity.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub ring_capacity: u32,
    pub ring_bytes: usize,
    pub notifier_guest_off: usize,
    pub notifier_host_off: usize,
    pub arena_off: usize,
}

impl Layout {
    pub fn new(ring_capacity: u32) -> Self {
        let ring_bytes = RingView::required_bytes(ring_capacity);
        let notifier_guest_off = 2 * ring_bytes;
        let notifier_host_off = notifier_guest_off + 4;
        let arena_off = notifier_host_off + 4;
        Self {
            ring_capacity,
            ring_bytes,
            notifier_guest_off,
            notifier_host_off,
            arena_off,
        }
    }

    pub fn min_region_size(&self) -> usize {
        self.arena_off
    }
}

/// A mapped shared-memory region: a raw base pointer and length handed
/// in by the platform (or an owned `Vec<u8>` for tests and single-process
/// demos that simulate both peers).
///
/// Unlike a general-purpose shared memory wrapper, `RegionHandle` does
/// not itself acquire or name an OS shared memory object: by the time one
/// exists, the PCI BAR2 window has already been mapped by the platform.
pub struct RegionHandle {
    base: *mut u8,
    len: usize,
    // Keeps an owned backing buffer alive when constructed from one.
    _owned: Option<Vec<u8>>,
    layout: Layout,
}

unsafe impl Send for RegionHandle {}
unsafe impl Sync for RegionHandle {}

impl RegionHandle {
    /// Wrap an externally mapped region. `base` must remain valid and
    /// mapped for the handle's lifetime.
    ///
    /// # Safety
    /// `base` must be valid for reads and writes for `len` bytes and
    /// 8-byte aligned.
    pub unsafe fn from_raw(base: *mut u8, len: usize, ring_capacity: u32) -> Result<Self> {
        let layout = Layout::new(ring_capacity);
        if len < layout.min_region_size() {
            return Err(IvshmError::RegionTooSmall {
                have: len,
                need: layout.min_region_size(),
            });
        }
        Ok(Self {
            base,
            len,
            _owned: None,
            layout,
        })
    }

    /// Allocate an owned region (used by tests and by demo binaries that
    /// run both Host and Guest roles in one process over one buffer).
    pub fn new_owned(size: usize, ring_capacity: u32) -> Result<Self> {
        let layout = Layout::new(ring_capacity);
        if size < layout.min_region_size() {
            return Err(IvshmError::RegionTooSmall {
                have: size,
                need: layout.min_region_size(),
            });
        }
        let mut owned = vec![0u8; size];
        let base = owned.as_mut_ptr();
        Ok(Self {
            base,
            len: size,
            _owned: Some(owned),
            layout,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Raw base pointer of the whole region (offset 0 = start of the
    /// Host→Guest ring), for constructing the system-wide `Port` view
    /// directly over the region's ring/notifier prefix.
    pub fn base_ptr(&self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn offset_ptr(&self, off: usize) -> *mut u8 {
        assert!(off <= self.len, "offset {off} out of range for region of {} bytes", self.len);
        unsafe { self.base.add(off) }
    }

    /// View over the Host→Guest ring.
    pub fn ring_h2g(&self) -> RingView {
        unsafe { RingView::at(self.offset_ptr(0), self.layout.ring_capacity) }
    }

    /// View over the Guest→Host ring.
    pub fn ring_g2h(&self) -> RingView {
        unsafe { RingView::at(self.offset_ptr(self.layout.ring_bytes), self.layout.ring_capacity) }
    }

    /// Counter bumped by the Host, observed by the Guest.
    pub fn notifier_guest_off(&self) -> *mut u8 {
        self.offset_ptr(self.layout.notifier_guest_off)
    }

    /// Counter bumped by the Guest, observed by the Host.
    pub fn notifier_host_off(&self) -> *mut u8 {
        self.offset_ptr(self.layout.notifier_host_off)
    }

    /// Base of the arena body and its size in bytes.
    pub fn arena_region(&self) -> (*mut u8, usize) {
        (self.offset_ptr(self.layout.arena_off), self.len - self.layout.arena_off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_region_smaller_than_layout() {
        let layout = Layout::new(8);
        let too_small = layout.min_region_size() - 1;
        assert!(RegionHandle::new_owned(too_small, 8).is_err());
    }

    #[test]
    fn accepts_minimum_sized_region() {
        let layout = Layout::new(8);
        assert!(RegionHandle::new_owned(layout.min_region_size(), 8).is_ok());
    }

    #[test]
    fn ring_views_are_disjoint_from_each_other_and_the_arena() {
        let region = RegionHandle::new_owned(64 * 1024, 64).unwrap();
        let layout = region.layout();
        assert!(layout.notifier_guest_off >= 2 * layout.ring_bytes);
        assert!(layout.arena_off > layout.notifier_host_off);
        let (_arena_ptr, arena_len) = region.arena_region();
        assert_eq!(layout.arena_off + arena_len, region.len());
    }
}

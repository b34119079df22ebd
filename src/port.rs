// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A port binds a ring pair and a notifier pair to one role. Host and
// Guest see the same four structures but swap which ring they send on
// and which notifier they bump, per the role table in the control
// protocol header this mirrors.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::message::Message;
use crate::notifier::NotifierView;
use crate::ring::RingView;

/// Which side of the region this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// A bound (send-ring, recv-ring, bump-notifier, observe-notifier)
/// tuple, plus the locally remembered notifier value.
pub struct Port {
    send_ring: RingView,
    recv_ring: RingView,
    bump_notifier: NotifierView,
    observe_notifier: NotifierView,
    last_seen: AtomicU32,
}

impl Port {
    /// Bytes needed for a two-ring, two-notifier sub-buffer of the given
    /// per-ring record capacity (the shape per-socket sub-buffers and
    /// the system-wide region prefix share).
    pub fn required_bytes(capacity: u32) -> usize {
        2 * RingView::required_bytes(capacity) + 2 * NotifierView::SIZE
    }

    /// # Safety
    /// `base` must be valid for reads/writes of `required_bytes(capacity)`
    /// bytes, 8-byte aligned, for the port's lifetime.
    pub unsafe fn at(base: *mut u8, capacity: u32, role: Role) -> Self {
        let ring_bytes = RingView::required_bytes(capacity);
        let h2g = RingView::at(base, capacity);
        let g2h = RingView::at(base.add(ring_bytes), capacity);
        let notifier_guest = NotifierView::at(base.add(2 * ring_bytes));
        let notifier_host = NotifierView::at(base.add(2 * ring_bytes + NotifierView::SIZE));

        let (send_ring, recv_ring, bump_notifier, observe_notifier) = match role {
            Role::Host => (h2g, g2h, notifier_guest, notifier_host),
            Role::Guest => (g2h, h2g, notifier_host, notifier_guest),
        };

        Self {
            send_ring,
            recv_ring,
            bump_notifier,
            observe_notifier,
            last_seen: AtomicU32::new(0),
        }
    }

    /// Zero the underlying rings and notifiers. Call once, from the Host
    /// side only, before either peer sends anything.
    pub fn init_region(&self) {
        self.send_ring.init();
        self.recv_ring.init();
        self.bump_notifier.init();
        self.observe_notifier.init();
    }

    /// Enqueue and bump. Returns `false` (not an error) on a full ring.
    pub fn send(&self, msg: &Message) -> bool {
        let ok = self.send_ring.try_enqueue(msg);
        if ok {
            self.bump_notifier.bump();
        }
        ok
    }

    /// Dequeue without touching the notifier.
    pub fn try_recv(&self) -> Option<Message> {
        self.recv_ring.try_dequeue()
    }

    /// Bump the outgoing notifier with no corresponding enqueue: a pure
    /// "look again" poke, for the doorbell ioctl path.
    pub fn bump_notifier_only(&self) {
        self.bump_notifier.bump();
    }

    /// Observe the notifier. `true` means the recv ring may be
    /// non-empty; callers should keep draining until `try_recv` returns
    /// `None`, not stop after the returned delta.
    pub fn poll(&self) -> bool {
        let current = self.observe_notifier.current();
        let last = self.last_seen.load(Ordering::Relaxed);
        self.last_seen.store(current, Ordering::Relaxed);
        current.wrapping_sub(last) > 0
    }
}

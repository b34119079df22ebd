// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named channel over a port. State machine from
// idle → listening → bound → closed, plus a transient sync_wait
// sub-state used to coordinate send_sync and keepalive with the
// dispatcher that consumes the matching ack.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{IvshmError, Result};
use crate::port::Port;

pub type SocketId = usize;

pub const MAX_SOCKET: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Listening,
    Bound,
    Closed,
}

/// Outcome of waiting on a socket's sync condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Acked,
    TimedOut,
    Cancelled,
}

/// Local (same-process) wakeup for a blocked `send_sync`/`keepalive`
/// caller. The ack itself is a cross-peer message the dispatcher
/// consumes on this socket's port; `ack()` is called from the dispatch
/// path to release whoever is waiting. `cancel()` is called once on
/// detach so no wait outlives its endpoint.
pub struct SyncWaiter {
    inner: Mutex<SyncWaiterState>,
    cond: Condvar,
}

struct SyncWaiterState {
    acked: bool,
    cancelled: bool,
}

impl SyncWaiter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SyncWaiterState {
                acked: false,
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until acked, cancelled, or `deadline` elapses.
    pub fn wait(&self, deadline: Duration) -> WaitOutcome {
        let start = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.cancelled {
                return WaitOutcome::Cancelled;
            }
            if guard.acked {
                guard.acked = false;
                return WaitOutcome::Acked;
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return WaitOutcome::TimedOut;
            }
            let (g, wait_result) = self.cond.wait_timeout(guard, deadline - elapsed).unwrap();
            guard = g;
            if wait_result.timed_out() && !guard.acked && !guard.cancelled {
                return WaitOutcome::TimedOut;
            }
        }
    }

    pub fn ack(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.acked = true;
        self.cond.notify_all();
    }

    pub fn cancel(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.cancelled = true;
        self.cond.notify_all();
    }
}

impl Default for SyncWaiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, namespace-typed channel over a bound port.
pub struct Socket {
    pub in_use: bool,
    pub name: String,
    pub namespace_index: u8,
    pub state: SocketState,
    pub port: Option<Port>,
    pub waiter: Arc<SyncWaiter>,
    pub remote_node: u32,
}

impl Socket {
    pub fn empty() -> Self {
        Self {
            in_use: false,
            name: String::new(),
            namespace_index: 0,
            state: SocketState::Idle,
            port: None,
            waiter: Arc::new(SyncWaiter::new()),
            remote_node: 0,
        }
    }

    /// Reinitialise a freed slot for reuse.
    pub fn reset(&mut self, name: &str, namespace_index: u8, remote_node: u32) {
        self.in_use = true;
        self.name = name.to_string();
        self.namespace_index = namespace_index;
        self.remote_node = remote_node;
        self.state = SocketState::Idle;
        self.port = None;
        self.waiter = Arc::new(SyncWaiter::new());
    }

    /// idle/listening → listening. Idempotent: calling twice on an idle
    /// or already-listening socket is equivalent to calling once.
    pub fn listen(&mut self) -> Result<()> {
        match self.state {
            SocketState::Idle | SocketState::Listening => {
                self.state = SocketState::Listening;
                Ok(())
            }
            _ => Err(IvshmError::InvalidSocketState("listen() requires idle or listening")),
        }
    }

    /// Bind a port derived from an accept's payload offset (Guest side)
    /// or from a freshly allocated per-socket sub-buffer (Host side).
    pub fn bind(&mut self, port: Port) {
        self.port = Some(port);
        self.state = SocketState::Bound;
    }

    pub fn disconnect(&mut self) {
        self.state = SocketState::Closed;
        self.port = None;
        self.waiter.cancel();
    }

    pub fn close(&mut self) {
        self.state = SocketState::Closed;
        self.waiter.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_listen_on_idle_socket_is_idempotent() {
        let mut s = Socket::empty();
        s.listen().unwrap();
        assert_eq!(s.state, SocketState::Listening);
        s.listen().unwrap();
        assert_eq!(s.state, SocketState::Listening);
    }

    #[test]
    fn listen_on_bound_socket_is_rejected() {
        let mut s = Socket::empty();
        s.state = SocketState::Bound;
        assert!(s.listen().is_err());
    }

    #[test]
    fn sync_waiter_wakes_on_ack() {
        let waiter = Arc::new(SyncWaiter::new());
        let w = Arc::clone(&waiter);
        let handle = std::thread::spawn(move || w.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        waiter.ack();
        assert_eq!(handle.join().unwrap(), WaitOutcome::Acked);
    }

    #[test]
    fn sync_waiter_times_out_without_ack() {
        let waiter = SyncWaiter::new();
        let outcome = waiter.wait(Duration::from_millis(20));
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn sync_waiter_cancel_wakes_pending_wait() {
        let waiter = Arc::new(SyncWaiter::new());
        let w = Arc::clone(&waiter);
        let handle = std::thread::spawn(move || w.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        waiter.cancel();
        assert_eq!(handle.join().unwrap(), WaitOutcome::Cancelled);
    }
}

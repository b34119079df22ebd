// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Owns one mapped region's lifecycle: the arena (Host side only), a
// fixed-capacity namespace table, a fixed-capacity socket table, the
// dedicated system-wide socket (index 0, always `sys`-namespaced and
// bound to the region's primary ring pair), and the background poller
// that drains both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::arena::Arena;
use crate::control;
use crate::error::{IvshmError, Result};
use crate::message::{Message, MsgType};
use crate::namespace::{HandlerContext, Handler, NamespaceTable, MAX_NAMESPACE, NS_SYS};
use crate::port::{Port, Role};
use crate::region::RegionHandle;
use crate::socket::{Socket, SocketState, MAX_SOCKET};
pub use crate::socket::SocketId;

/// Per-socket ring-pair capacity for sockets accepted after the
/// system-wide handshake. Smaller than the system-wide ring since each
/// bound socket gets its own pair out of the arena.
pub const SOCKET_RING_CAPACITY: u32 = 64;

pub const SYSWIDE_SOCKET: SocketId = 0;

const DEFAULT_KEEPALIVE_DEADLINE: Duration = Duration::from_secs(10);
const POLLER_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// One mapped region, one role, one peer identity.
pub struct Endpoint {
    region: RegionHandle,
    role: Role,
    node_id: u32,
    remote_node_id: u32,
    arena: Option<Mutex<Arena>>,
    namespaces: Mutex<Vec<NamespaceTable>>,
    sockets: Mutex<Vec<Socket>>,
    detached: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

unsafe impl Send for Endpoint {}
unsafe impl Sync for Endpoint {}

impl Endpoint {
    /// Map a region, initialise (Host zeroes rings/notifiers, Guest
    /// leaves them), install the built-in `sys` handlers, and start the
    /// background poller. Returns an `Arc` because the poller thread
    /// needs shared ownership of the endpoint for its lifetime.
    pub fn attach(
        region: RegionHandle,
        role: Role,
        node_id: u32,
        remote_node_id: u32,
    ) -> Result<Arc<Self>> {
        let capacity = region.layout().ring_capacity;
        let syswide_port = unsafe { Port::at(region.base_ptr(), capacity, role) };
        if role == Role::Host {
            syswide_port.init_region();
        }

        let arena = if role == Role::Host {
            let (arena_base, arena_len) = region.arena_region();
            Some(Mutex::new(unsafe { Arena::new(arena_base, arena_len) }))
        } else {
            None
        };

        let mut sockets = Vec::with_capacity(MAX_SOCKET);
        for _ in 0..MAX_SOCKET {
            sockets.push(Socket::empty());
        }
        sockets[SYSWIDE_SOCKET].reset("sys", NS_SYS, remote_node_id);
        sockets[SYSWIDE_SOCKET].bind(syswide_port);

        let mut namespaces = Vec::with_capacity(MAX_NAMESPACE);
        for _ in 0..MAX_NAMESPACE {
            namespaces.push(NamespaceTable::new());
        }
        control::register_builtin_handlers(&mut namespaces[NS_SYS as usize], role);

        let endpoint = Arc::new(Self {
            region,
            role,
            node_id,
            remote_node_id,
            arena,
            namespaces: Mutex::new(namespaces),
            sockets: Mutex::new(sockets),
            detached: AtomicBool::new(false),
            poller: Mutex::new(None),
        });

        let handle = endpoint.clone().spawn_poller();
        *endpoint.poller.lock().unwrap() = Some(handle);

        Ok(endpoint)
    }

    fn spawn_poller(self: Arc<Self>) -> JoinHandle<()> {
        thread::spawn(move || {
            while !self.detached.load(Ordering::Acquire) {
                let mut drained_any = false;
                for id in 0..MAX_SOCKET {
                    if self.poll_and_dispatch_socket(id) {
                        drained_any = true;
                    }
                }
                if !drained_any {
                    thread::sleep(POLLER_IDLE_SLEEP);
                }
            }
        })
    }

    fn poll_and_dispatch_socket(&self, id: SocketId) -> bool {
        let has_traffic = {
            let sockets = self.sockets.lock().unwrap();
            let s = &sockets[id];
            if id != SYSWIDE_SOCKET && !s.in_use {
                return false;
            }
            match s.port.as_ref() {
                Some(p) => p.poll(),
                None => return false,
            }
        };
        let _ = has_traffic; // advisory only; we drain fully regardless

        let mut drained_any = false;
        loop {
            let maybe_msg = {
                let sockets = self.sockets.lock().unwrap();
                sockets[id].port.as_ref().and_then(|p| p.try_recv())
            };
            let msg = match maybe_msg {
                Some(m) => m,
                None => break,
            };
            drained_any = true;
            if let Err(err) = self.handle_received(id, msg) {
                tracing::warn!(?err, socket = id, "handler returned an error");
            }
        }
        drained_any
    }

    fn handle_received(&self, id: SocketId, msg: Message) -> Result<()> {
        if msg.src_node != self.remote_node_id {
            tracing::warn!(
                got = msg.src_node,
                expected = self.remote_node_id,
                "dropping message from unexpected source node"
            );
            return Ok(());
        }

        if msg.is_sync() {
            let ack = Message::new(self.node_id, MsgType::Ack, msg.payload_off, 0);
            let sockets = self.sockets.lock().unwrap();
            if let Some(port) = sockets[id].port.as_ref() {
                port.send(&ack);
            }
        }

        // `ack`/`kalive`/`disconn` are control primitives that apply to
        // whichever socket they arrive on, independent of that socket's
        // own namespace (a socket in the `net` namespace still needs its
        // keepalives answered). They are handled here directly rather
        // than through the per-namespace handler table, which is keyed
        // by the *receiving socket's* namespace and would never see
        // them land on anything but the system-wide socket's `sys`
        // table otherwise.
        match MsgType::from_u32(msg.msg_type) {
            Some(MsgType::Ack) => {
                self.ack_socket(id);
                return Ok(());
            }
            Some(MsgType::Kalive) => {
                // The generic sync-ack above already answered it.
                return Ok(());
            }
            Some(MsgType::Disconn) => {
                self.close_socket(id);
                return Ok(());
            }
            _ => {}
        }

        let namespace_index = {
            let sockets = self.sockets.lock().unwrap();
            sockets[id].namespace_index
        };
        let handler = {
            let namespaces = self.namespaces.lock().unwrap();
            namespaces[namespace_index as usize].get(msg.msg_type)
        };
        match handler {
            Some(h) => {
                let ctx = HandlerContext {
                    endpoint: self,
                    socket: id,
                };
                h(&ctx, &msg)
            }
            None => {
                tracing::warn!(
                    namespace = namespace_index,
                    msg_type = msg.msg_type,
                    "dropping message with no registered handler"
                );
                Ok(())
            }
        }
    }

    /// Stop the poller and cancel any pending sync waits. Idempotent.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let sockets = self.sockets.lock().unwrap();
            for s in sockets.iter() {
                s.waiter.cancel();
            }
        }
        if let Some(handle) = self.poller.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn remote_node_id(&self) -> u32 {
        self.remote_node_id
    }

    pub fn region(&self) -> &RegionHandle {
        &self.region
    }

    // --- socket table -----------------------------------------------

    pub fn create_socket(&self, namespace: u8, name: &str) -> Result<SocketId> {
        let mut sockets = self.sockets.lock().unwrap();
        for (i, s) in sockets.iter_mut().enumerate().skip(1) {
            if !s.in_use {
                s.reset(name, namespace, self.remote_node_id);
                return Ok(i);
            }
        }
        Err(IvshmError::NoFreeSocketSlot { max: MAX_SOCKET })
    }

    pub fn free_socket(&self, id: SocketId) -> Result<()> {
        if id == SYSWIDE_SOCKET {
            return Err(IvshmError::InvalidSocketState("cannot free the system-wide socket"));
        }
        let mut sockets = self.sockets.lock().unwrap();
        sockets[id].close();
        sockets[id].in_use = false;
        Ok(())
    }

    pub fn socket_state(&self, id: SocketId) -> SocketState {
        self.sockets.lock().unwrap()[id].state
    }

    pub fn socket_namespace(&self, id: SocketId) -> u8 {
        self.sockets.lock().unwrap()[id].namespace_index
    }

    // --- namespace / handler table -----------------------------------

    pub fn register_handler(&self, namespace: u8, msg_type: u32, handler: Handler) -> Result<()> {
        let mut namespaces = self.namespaces.lock().unwrap();
        namespaces
            .get_mut(namespace as usize)
            .ok_or(IvshmError::InvalidHandlerSlot { msg_type, max: MAX_NAMESPACE })?
            .register(msg_type, handler)
    }

    pub fn unregister_handler(&self, namespace: u8, msg_type: u32) {
        let mut namespaces = self.namespaces.lock().unwrap();
        if let Some(table) = namespaces.get_mut(namespace as usize) {
            table.unregister(msg_type);
        }
    }

    /// Dequeue one message directly from a socket's bound port, bypassing
    /// the poller's handler dispatch. Used by the character-device `read`
    /// path, which does its own framing instead of going through a
    /// namespace handler.
    pub fn try_recv_raw(&self, id: SocketId) -> Option<Message> {
        let sockets = self.sockets.lock().unwrap();
        sockets[id].port.as_ref().and_then(|p| p.try_recv())
    }

    /// Bump the system-wide port's outgoing notifier without enqueuing a
    /// message, mirroring `IOCTL_RING`'s "poke the remote peer" doorbell
    /// semantics at the ring level.
    pub fn poke_syswide(&self) {
        let sockets = self.sockets.lock().unwrap();
        if let Some(port) = sockets[SYSWIDE_SOCKET].port.as_ref() {
            port.bump_notifier_only();
        }
    }

    // --- arena delegation (Host only) --------------------------------

    pub fn add_payload(&self, len: usize) -> Result<u32> {
        let arena = self
            .arena
            .as_ref()
            .ok_or(IvshmError::WriteFromGuest)?;
        arena.lock().unwrap().alloc(len)
    }

    pub fn free_payload(&self, offset: u32, len: usize) -> Result<()> {
        let arena = self
            .arena
            .as_ref()
            .ok_or(IvshmError::WriteFromGuest)?;
        arena.lock().unwrap().free(offset, len)
    }

    /// Bytes currently free in the arena. Host only.
    pub fn arena_free_bytes(&self) -> Result<usize> {
        let arena = self
            .arena
            .as_ref()
            .ok_or(IvshmError::WriteFromGuest)?;
        Ok(arena.lock().unwrap().free_bytes())
    }

    /// Raw pointer to `offset` within the arena body. Valid on both
    /// roles: only the Host tracks allocation bookkeeping, but the
    /// bytes themselves are mapped for both peers.
    pub fn arena_ptr_at(&self, offset: u32) -> *mut u8 {
        let (base, _len) = self.region.arena_region();
        unsafe { base.add(offset as usize) }
    }

    // --- connection lifecycle -----------------------------------------

    pub fn listen(&self, id: SocketId) -> Result<()> {
        self.sockets.lock().unwrap()[id].listen()
    }

    /// idle → listening, then emits `conn` on the system-wide port
    /// carrying this socket's namespace index.
    pub fn connect(&self, id: SocketId) -> Result<()> {
        let namespace = {
            let mut sockets = self.sockets.lock().unwrap();
            sockets[id].listen()?;
            sockets[id].namespace_index
        };
        let msg = Message::new(self.node_id, MsgType::Conn, 0, namespace as i64);
        self.send_on_syswide(&msg);
        Ok(())
    }

    pub(crate) fn send_on_syswide(&self, msg: &Message) -> bool {
        let sockets = self.sockets.lock().unwrap();
        match sockets[SYSWIDE_SOCKET].port.as_ref() {
            Some(p) => p.send(msg),
            None => false,
        }
    }

    /// Find the first `Listening` socket in `namespace`, other than the
    /// system-wide socket itself.
    pub(crate) fn find_listening_in_namespace(&self, namespace: u8) -> Option<SocketId> {
        let sockets = self.sockets.lock().unwrap();
        sockets
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.in_use && s.state == SocketState::Listening && s.namespace_index == namespace)
            .map(|(i, _)| i)
    }

    pub(crate) fn bind_socket(&self, id: SocketId, port: Port) {
        self.sockets.lock().unwrap()[id].bind(port);
    }

    pub(crate) fn ack_socket(&self, id: SocketId) {
        let waiter = { self.sockets.lock().unwrap()[id].waiter.clone() };
        waiter.ack();
    }

    pub(crate) fn close_socket(&self, id: SocketId) {
        self.sockets.lock().unwrap()[id].close();
    }

    pub fn send_async(&self, id: SocketId, msg: Message) -> Result<bool> {
        let sockets = self.sockets.lock().unwrap();
        let port = sockets[id]
            .port
            .as_ref()
            .ok_or(IvshmError::InvalidSocketState("socket has no bound port"))?;
        Ok(port.send(&msg))
    }

    /// Enqueue `msg` with `is_sync` set, then block until the matching
    /// `ack` is observed by the poller, `deadline` elapses, or the
    /// endpoint is detached.
    pub fn send_sync(&self, id: SocketId, mut msg: Message, deadline: Duration) -> Result<()> {
        msg.is_sync = 1;
        let waiter = {
            let sockets = self.sockets.lock().unwrap();
            let port = sockets[id]
                .port
                .as_ref()
                .ok_or(IvshmError::InvalidSocketState("socket has no bound port"))?;
            port.send(&msg);
            sockets[id].waiter.clone()
        };
        match waiter.wait(deadline) {
            crate::socket::WaitOutcome::Acked => Ok(()),
            crate::socket::WaitOutcome::TimedOut => Err(IvshmError::Timeout),
            crate::socket::WaitOutcome::Cancelled => Err(IvshmError::Cancelled),
        }
    }

    /// One-shot keepalive: sends `kalive` sync, default 10 s deadline.
    pub fn keepalive(&self, id: SocketId) -> Result<()> {
        let msg = Message::new(self.node_id, MsgType::Kalive, 0, 0);
        self.send_sync(id, msg, DEFAULT_KEEPALIVE_DEADLINE)
    }

    pub fn disconnect(&self, id: SocketId) -> Result<()> {
        let msg = Message::new(self.node_id, MsgType::Disconn, 0, 0);
        {
            let sockets = self.sockets.lock().unwrap();
            if let Some(port) = sockets[id].port.as_ref() {
                port.send(&msg);
            }
        }
        self.sockets.lock().unwrap()[id].disconnect();
        Ok(())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.detached.store(true, Ordering::Release);
        if let Some(handle) = self.poller.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

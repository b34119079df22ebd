// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Built-in `sys`-namespace handlers: connection setup and the demo
// request/add/free data path. Registered once per endpoint at
// `Endpoint::attach` time, over the system-wide socket.
//
// `ack`, `kalive` and `disconn` are not registered here: they apply to
// whichever socket they arrive on regardless of that socket's own
// namespace, so `Endpoint::handle_received` answers them directly
// before any namespace lookup. Only `conn`/`accept`/`req`/`add`/`free`
// are genuinely `sys`-scoped (they only ever travel over the
// system-wide socket), so only those live in this table.

use std::sync::Arc;

use crate::endpoint::SOCKET_RING_CAPACITY;
use crate::error::Result;
use crate::message::{Message, MsgType};
use crate::namespace::{HandlerContext, NamespaceTable};
use crate::port::{Port, Role};

/// Install the `conn`/`accept`/`req`/`add`/`free` handlers for the `sys`
/// namespace table. `role` picks which half of the conn/accept exchange
/// and req/add exchange this endpoint plays.
pub fn register_builtin_handlers(table: &mut NamespaceTable, role: Role) {
    match role {
        Role::Host => {
            table
                .register(MsgType::Conn as u32, Arc::new(handle_conn))
                .expect("Conn is a reserved, in-range msg_type");
            table
                .register(MsgType::Req as u32, Arc::new(handle_req))
                .expect("Req is a reserved, in-range msg_type");
            table
                .register(MsgType::Free as u32, Arc::new(handle_free))
                .expect("Free is a reserved, in-range msg_type");
        }
        Role::Guest => {
            table
                .register(MsgType::Accept as u32, Arc::new(handle_accept))
                .expect("Accept is a reserved, in-range msg_type");
            table
                .register(MsgType::Add as u32, Arc::new(handle_add))
                .expect("Add is a reserved, in-range msg_type");
        }
    }
}

/// Host side of a connect: find the first `Listening` socket in the
/// requested namespace, carve a fresh per-socket ring pair out of the
/// arena, bind it, and hand the allocated offset back to the Guest as a
/// sync `accept` so the Guest waits for our ack before using the port.
fn handle_conn(ctx: &HandlerContext<'_>, msg: &Message) -> Result<()> {
    let namespace = msg.payload_len as u8;
    let target = match ctx.endpoint.find_listening_in_namespace(namespace) {
        Some(id) => id,
        None => {
            tracing::warn!(namespace, "conn with no matching listening socket");
            return Ok(());
        }
    };

    let sub_buffer_len = Port::required_bytes(SOCKET_RING_CAPACITY);
    let offset = ctx.endpoint.add_payload(sub_buffer_len)?;
    let port_base = ctx.endpoint.arena_ptr_at(offset);
    let port = unsafe { Port::at(port_base, SOCKET_RING_CAPACITY, Role::Host) };
    port.init_region();
    ctx.endpoint.bind_socket(target, port);

    let accept = Message::new(ctx.endpoint.node_id(), MsgType::Accept, offset, namespace as i64).sync();
    ctx.endpoint.send_on_syswide(&accept);
    Ok(())
}

/// Guest side of a connect: the Host has already carved and initialised
/// the sub-buffer at `payload_off`; map a `Port` over it directly, no
/// re-init (the Host already zeroed it).
fn handle_accept(ctx: &HandlerContext<'_>, msg: &Message) -> Result<()> {
    let namespace = msg.payload_len as u8;
    let target = match ctx.endpoint.find_listening_in_namespace(namespace) {
        Some(id) => id,
        None => {
            tracing::warn!(namespace, "accept with no matching listening socket");
            return Ok(());
        }
    };

    let port_base = ctx.endpoint.arena_ptr_at(msg.payload_off);
    let port = unsafe { Port::at(port_base, SOCKET_RING_CAPACITY, Role::Guest) };
    ctx.endpoint.bind_socket(target, port);
    Ok(())
}

/// Demo data path, Host side: `req.payload_off` is an opaque correlator
/// the Guest chose (see the offset-vs-correlator note below); the
/// Host allocates a *real* arena range and publishes that offset in
/// `add.payload_off`, not the Guest's correlator — see `DESIGN.md` for
/// why the two cannot be the same field. The bytes written are a
/// human-readable demo record, not a zero-filled placeholder, so a
/// reader on the other end has something to decode.
fn handle_req(ctx: &HandlerContext<'_>, msg: &Message) -> Result<()> {
    let record = format!(
        "msg dst_id={} src_id={} req_off={}\0",
        msg.src_node,
        ctx.endpoint.node_id(),
        msg.payload_off
    );
    let bytes = record.as_bytes();
    let offset = ctx.endpoint.add_payload(bytes.len())?;
    let ptr = ctx.endpoint.arena_ptr_at(offset);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
    }
    let add = Message::new(ctx.endpoint.node_id(), MsgType::Add, offset, bytes.len() as i64);
    let sockets_ok = ctx.endpoint.send_async(ctx.socket, add)?;
    if !sockets_ok {
        tracing::warn!(socket = ctx.socket, "add dropped: ring full");
    }
    Ok(())
}

/// Demo data path, Guest side: the Host has published `payload_len`
/// bytes at arena offset `payload_off`. Log the decoded record, then
/// hand the range straight back with a `free` so the Host can reclaim
/// it — this is what closes the `req`/`add`/`free` round trip and
/// restores the Host's arena free-byte count.
fn handle_add(ctx: &HandlerContext<'_>, msg: &Message) -> Result<()> {
    let len = msg.payload_len.max(0) as usize;
    let src = ctx.endpoint.arena_ptr_at(msg.payload_off);
    let mut buf = vec![0u8; len];
    unsafe {
        std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), len);
    }
    let text = String::from_utf8_lossy(&buf);
    tracing::debug!(offset = msg.payload_off, len, %text, "add received");

    let free = Message::new(ctx.endpoint.node_id(), MsgType::Free, msg.payload_off, msg.payload_len);
    let sent = ctx.endpoint.send_async(ctx.socket, free)?;
    if !sent {
        tracing::warn!(socket = ctx.socket, "free dropped: ring full");
    }
    Ok(())
}

/// Demo data path, Host side: the Guest is done with a previously
/// published range; return it to the arena free list.
fn handle_free(ctx: &HandlerContext<'_>, msg: &Message) -> Result<()> {
    ctx.endpoint.free_payload(msg.payload_off, msg.payload_len.max(0) as usize)
}

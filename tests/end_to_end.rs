// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end scenarios over a single in-process region shared by a Host
// and a Guest endpoint: handshake, request/response, keepalive success
// and failure, and disconnect.

use std::time::Duration;

use ivshm_msg::endpoint::{Endpoint, SYSWIDE_SOCKET};
use ivshm_msg::message::{Message, MsgType};
use ivshm_msg::namespace::NS_NET;
use ivshm_msg::port::Role;
use ivshm_msg::region::RegionHandle;
use ivshm_msg::socket::SocketState;

const RING_CAPACITY: u32 = 16;
const REGION_SIZE: usize = 128 * 1024;

/// Map one owned region twice (Host view, Guest view) the way two
/// separate processes would each map the same physical pages.
fn linked_endpoints() -> (std::sync::Arc<Endpoint>, std::sync::Arc<Endpoint>, RegionHandle) {
    let backing = RegionHandle::new_owned(REGION_SIZE, RING_CAPACITY).unwrap();
    let base = backing.base_ptr();
    let len = backing.len();
    let host_region = unsafe { RegionHandle::from_raw(base, len, RING_CAPACITY).unwrap() };
    let guest_region = unsafe { RegionHandle::from_raw(base, len, RING_CAPACITY).unwrap() };
    let host = Endpoint::attach(host_region, Role::Host, 1, 2).unwrap();
    let guest = Endpoint::attach(guest_region, Role::Guest, 2, 1).unwrap();
    (host, guest, backing)
}

fn settle() {
    std::thread::sleep(Duration::from_millis(60));
}

#[test]
fn handshake_binds_both_sockets_to_the_same_logical_channel() {
    let (host, guest, _backing) = linked_endpoints();

    let host_socket = host.create_socket(NS_NET, "chat").unwrap();
    host.listen(host_socket).unwrap();

    let guest_socket = guest.create_socket(NS_NET, "chat").unwrap();
    guest.listen(guest_socket).unwrap();
    guest.connect(guest_socket).unwrap();

    settle();

    assert_eq!(host.socket_state(host_socket), SocketState::Bound);
    assert_eq!(guest.socket_state(guest_socket), SocketState::Bound);

    host.detach();
    guest.detach();
}

#[test]
fn request_response_round_trip_restores_arena_free_bytes() {
    let (host, guest, _backing) = linked_endpoints();

    // `req`/`add`/`free` are `sys`-namespace handlers, reachable only on
    // the system-wide socket (see `control.rs::register_builtin_handlers`);
    // no `listen`/`connect` handshake is needed for them.
    let free_bytes_before = host.arena_free_bytes().unwrap();

    let req = Message::new(guest.node_id(), MsgType::Req, 0xDEAD, 128);
    guest.send_async(SYSWIDE_SOCKET, req).unwrap();
    settle();

    // The Host answered with `add` carrying a freshly allocated arena
    // offset; the Guest's handler decoded it and immediately replied
    // with `free`, which the Host used to reclaim the range. If the
    // round trip closed, the arena is back to its starting free-byte
    // count.
    assert_eq!(host.arena_free_bytes().unwrap(), free_bytes_before);

    host.detach();
    guest.detach();
}

#[test]
fn keepalive_succeeds_once_connected() {
    let (host, guest, _backing) = linked_endpoints();

    let host_socket = host.create_socket(NS_NET, "ka").unwrap();
    host.listen(host_socket).unwrap();
    let guest_socket = guest.create_socket(NS_NET, "ka").unwrap();
    guest.listen(guest_socket).unwrap();
    guest.connect(guest_socket).unwrap();
    settle();

    guest.keepalive(guest_socket).expect("keepalive should be acked");

    host.detach();
    guest.detach();
}

#[test]
fn keepalive_fails_fast_on_an_unbound_socket() {
    let (host, guest, _backing) = linked_endpoints();
    let guest_socket = guest.create_socket(NS_NET, "lonely").unwrap();
    guest.listen(guest_socket).unwrap();
    // No connect(): the socket never gets a port bound, so send_sync
    // must fail immediately rather than wait out the deadline.
    assert!(guest.keepalive(guest_socket).is_err());

    host.detach();
    guest.detach();
}

#[test]
fn disconnect_closes_the_socket_on_both_sides() {
    let (host, guest, _backing) = linked_endpoints();

    let host_socket = host.create_socket(NS_NET, "bye").unwrap();
    host.listen(host_socket).unwrap();
    let guest_socket = guest.create_socket(NS_NET, "bye").unwrap();
    guest.listen(guest_socket).unwrap();
    guest.connect(guest_socket).unwrap();
    settle();

    guest.disconnect(guest_socket).unwrap();
    settle();

    assert_eq!(guest.socket_state(guest_socket), SocketState::Closed);
    assert_eq!(host.socket_state(host_socket), SocketState::Closed);

    host.detach();
    guest.detach();
}

#[test]
fn detach_cancels_a_pending_keepalive_instead_of_hanging() {
    let (host, guest, _backing) = linked_endpoints();

    let host_socket = host.create_socket(NS_NET, "cancel").unwrap();
    host.listen(host_socket).unwrap();
    let guest_socket = guest.create_socket(NS_NET, "cancel").unwrap();
    guest.listen(guest_socket).unwrap();
    guest.connect(guest_socket).unwrap();
    settle();

    // Stop the host's poller so no ack will ever arrive, then race
    // detach against the wait: the guest endpoint must still resolve
    // the wait instead of blocking forever.
    host.detach();
    let guest_for_thread = guest.clone();
    let handle = std::thread::spawn(move || guest_for_thread.keepalive(guest_socket));
    std::thread::sleep(Duration::from_millis(20));
    guest.detach();
    assert!(handle.join().unwrap().is_err());
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-wide table of attached endpoints, keyed by a small integer
// handle. Mirrors the fixed-slot, mutex-guarded find-or-register
// pattern of the service registry this substrate's control protocol
// supersedes, minus the cross-process shared memory: one process can
// attach several endpoints (e.g. to different ivshmem devices), and
// callers address them by handle rather than by holding an `Arc`
// themselves.

use std::sync::{Arc, Mutex, OnceLock};

use crate::endpoint::{Endpoint, SocketId};
use crate::error::{IvshmError, Result};
use crate::message::Message;
use crate::namespace::Handler;
use crate::port::Role;
use crate::region::RegionHandle;

pub type EndpointHandle = usize;

const MAX_ENDPOINTS: usize = 8;

struct Slot {
    endpoint: Option<Arc<Endpoint>>,
}

struct Registry {
    slots: Mutex<Vec<Slot>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut slots = Vec::with_capacity(MAX_ENDPOINTS);
        slots.resize_with(MAX_ENDPOINTS, || Slot { endpoint: None });
        Registry {
            slots: Mutex::new(slots),
        }
    })
}

/// Attach a region and register the resulting endpoint under a fresh
/// handle.
pub fn attach_endpoint(
    region: RegionHandle,
    role: Role,
    node_id: u32,
    remote_node_id: u32,
) -> Result<EndpointHandle> {
    let endpoint = Endpoint::attach(region, role, node_id, remote_node_id)?;
    let reg = registry();
    let mut slots = reg.slots.lock().unwrap();
    for (i, slot) in slots.iter_mut().enumerate() {
        if slot.endpoint.is_none() {
            slot.endpoint = Some(endpoint);
            return Ok(i);
        }
    }
    Err(IvshmError::NoFreeEndpointSlot { max: MAX_ENDPOINTS })
}

/// Detach and drop the endpoint at `handle`. A no-op if already detached.
pub fn detach_endpoint(handle: EndpointHandle) {
    let reg = registry();
    let mut slots = reg.slots.lock().unwrap();
    if let Some(slot) = slots.get_mut(handle) {
        if let Some(endpoint) = slot.endpoint.take() {
            endpoint.detach();
        }
    }
}

fn get(handle: EndpointHandle) -> Result<Arc<Endpoint>> {
    let reg = registry();
    let slots = reg.slots.lock().unwrap();
    slots
        .get(handle)
        .and_then(|s| s.endpoint.clone())
        .ok_or(IvshmError::DeviceGone)
}

/// Create a socket on the endpoint at `handle`.
pub fn create_socket(handle: EndpointHandle, namespace: u8, name: &str) -> Result<SocketId> {
    get(handle)?.create_socket(namespace, name)
}

pub fn free_socket(handle: EndpointHandle, socket: SocketId) -> Result<()> {
    get(handle)?.free_socket(socket)
}

/// Register a handler for `(namespace, msg_type)` on the endpoint at
/// `handle`.
pub fn register_handler(
    handle: EndpointHandle,
    namespace: u8,
    msg_type: u32,
    handler: Handler,
) -> Result<()> {
    get(handle)?.register_handler(namespace, msg_type, handler)
}

pub fn unregister_handler(handle: EndpointHandle, namespace: u8, msg_type: u32) -> Result<()> {
    get(handle)?.unregister_handler(namespace, msg_type);
    Ok(())
}

pub fn listen(handle: EndpointHandle, socket: SocketId) -> Result<()> {
    get(handle)?.listen(socket)
}

pub fn connect(handle: EndpointHandle, socket: SocketId) -> Result<()> {
    get(handle)?.connect(socket)
}

/// Fire-and-forget send on a bound socket.
pub fn send_async(handle: EndpointHandle, socket: SocketId, msg: Message) -> Result<bool> {
    get(handle)?.send_async(socket, msg)
}

/// Send a `req` and block until the matching `add` has been dispatched,
/// or `deadline` elapses.
pub fn request(
    handle: EndpointHandle,
    socket: SocketId,
    correlator: u32,
    len: usize,
    deadline: std::time::Duration,
) -> Result<()> {
    let endpoint = get(handle)?;
    let msg = Message::new(endpoint.node_id(), crate::message::MsgType::Req, correlator, len as i64);
    endpoint.send_sync(socket, msg, deadline)
}

pub fn keepalive(handle: EndpointHandle, socket: SocketId) -> Result<()> {
    get(handle)?.keepalive(socket)
}

pub fn disconnect(handle: EndpointHandle, socket: SocketId) -> Result<()> {
    get(handle)?.disconnect(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionHandle;

    fn fresh_region() -> RegionHandle {
        RegionHandle::new_owned(256 * 1024, 32).unwrap()
    }

    // These share one process-wide registry, so they're written to
    // tolerate interleaving with other tests in this module rather than
    // assert specific handle values.

    #[test]
    fn attach_then_detach_leaves_the_handle_unusable() {
        let h = attach_endpoint(fresh_region(), Role::Host, 1, 2).unwrap();
        assert!(listen(h, 0).is_ok());
        detach_endpoint(h);
        assert!(matches!(listen(h, 0), Err(IvshmError::DeviceGone)));
    }

    #[test]
    fn operating_on_a_detached_handle_returns_device_gone() {
        let h = attach_endpoint(fresh_region(), Role::Host, 1, 2).unwrap();
        detach_endpoint(h);
        assert!(matches!(listen(h, 0), Err(IvshmError::DeviceGone)));
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Crate-wide error type. Variants are grouped by the five error kinds
// of the control protocol: transient, protocol, resource, configuration,
// fatal. Transient conditions (ring full/empty, no peer) are represented
// separately where possible (e.g. `Ring::try_enqueue` returns a plain
// bool/Option rather than this type) so callers are not forced to match
// on an error for an expected, non-exceptional outcome.

use thiserror::Error;

/// Errors surfaced to callers of the messaging substrate.
#[derive(Debug, Error)]
pub enum IvshmError {
    /// A message arrived with a `src_node` other than the configured peer.
    #[error("message from unexpected source node {got}, expected {expected}")]
    InvalidSourceNode { got: u32, expected: u32 },

    /// No handler registered for `(namespace, msg_type)`.
    #[error("no handler for namespace {namespace} msg_type {msg_type}")]
    UnknownMsgType { namespace: u8, msg_type: u32 },

    /// `send_sync` received a reply that was not an `ack`.
    #[error("expected ack, received msg_type {got}")]
    UnexpectedAck { got: u32 },

    /// Arena has insufficient contiguous free space for the request.
    #[error("arena out of memory: requested {requested}, free {free}")]
    ArenaOom { requested: usize, free: usize },

    /// `Arena::free` was called with an offset/length that does not
    /// correspond to a live allocation.
    #[error("invalid free: offset {offset} len {len} is not a live allocation")]
    InvalidFree { offset: u32, len: usize },

    /// No free slot in the socket table.
    #[error("no free socket slot (max {max})")]
    NoFreeSocketSlot { max: usize },

    /// No free slot in the endpoint table.
    #[error("no free endpoint slot (max {max})")]
    NoFreeEndpointSlot { max: usize },

    /// No free slot in a namespace's handler table, or msg_type out of range.
    #[error("invalid handler slot: msg_type {msg_type} (max {max})")]
    InvalidHandlerSlot { msg_type: u32, max: usize },

    /// `open()` requested a minor number other than the one configured.
    #[error("no such device: minor {requested}, configured {configured}")]
    WrongMinorNumber { requested: u32, configured: u32 },

    /// `write()` attempted on a Guest (consumer) endpoint.
    #[error("write is only permitted on a Host endpoint")]
    WriteFromGuest,

    /// `read()` attempted on a Host (producer) endpoint.
    #[error("read is only permitted on a Guest endpoint")]
    ReadFromHost,

    /// The mapped region is smaller than the layout requires.
    #[error("region too small: have {have} bytes, need at least {need}")]
    RegionTooSmall { have: usize, need: usize },

    /// Unrecognised ioctl command.
    #[error("bad ioctl command {cmd}")]
    BadIoctlCommand { cmd: u32 },

    /// An operation was attempted from a socket state that does not
    /// permit it (e.g. `listen()` on a bound socket).
    #[error("invalid socket state for this operation: {0}")]
    InvalidSocketState(&'static str),

    /// The endpoint was detached while a caller was waiting on it.
    #[error("device gone")]
    DeviceGone,

    /// A pending `send_sync`/`keepalive` wait was cancelled by detach.
    #[error("operation cancelled")]
    Cancelled,

    /// `send_sync`/`keepalive` did not receive an ack before its deadline.
    #[error("timed out waiting for ack")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, IvshmError>;

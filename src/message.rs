// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The 24-byte wire record carried by every ring. Field layout matches
// `rbmsg_hd` from the pcie control-plane header this protocol descends
// from, with the header's `payload_len: ssize_t` narrowed to a fixed
// `i64` for a stable cross-arch wire size.

/// `sys` namespace message types (control protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgType {
    Req = 1,
    Add = 2,
    Free = 3,
    Conn = 8,
    Accept = 9,
    Disconn = 10,
    Kalive = 11,
    Ack = 12,
}

impl MsgType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Req),
            2 => Some(Self::Add),
            3 => Some(Self::Free),
            8 => Some(Self::Conn),
            9 => Some(Self::Accept),
            10 => Some(Self::Disconn),
            11 => Some(Self::Kalive),
            12 => Some(Self::Ack),
            _ => None,
        }
    }
}

/// Fixed-size 24-byte message record. `#[repr(C)]` and `Copy` so it can
/// be written into and read out of shared memory as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Message {
    /// Peer id of the sender. Nonzero means valid.
    pub src_node: u32,
    /// See `MsgType`; not all values decode to a known variant.
    pub msg_type: u32,
    /// 0 or 1. When 1, the receiver must emit exactly one `ack` before
    /// dispatching to a handler.
    pub is_sync: u32,
    /// Offset into the arena, or a caller-chosen correlator for `req`.
    pub payload_off: u32,
    pub payload_len: i64,
}

const WIRE_LEN: usize = 24;

impl Message {
    pub fn new(src_node: u32, msg_type: MsgType, payload_off: u32, payload_len: i64) -> Self {
        Self {
            src_node,
            msg_type: msg_type as u32,
            is_sync: 0,
            payload_off,
            payload_len,
        }
    }

    pub fn sync(mut self) -> Self {
        self.is_sync = 1;
        self
    }

    pub fn is_sync(&self) -> bool {
        self.is_sync != 0
    }

    /// Serialize to the 24-byte little-endian wire format.
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        buf[0..4].copy_from_slice(&self.src_node.to_le_bytes());
        buf[4..8].copy_from_slice(&self.msg_type.to_le_bytes());
        buf[8..12].copy_from_slice(&self.is_sync.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_off.to_le_bytes());
        buf[16..24].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Deserialize from the 24-byte little-endian wire format.
    pub fn decode(buf: &[u8; WIRE_LEN]) -> Self {
        Self {
            src_node: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            msg_type: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            is_sync: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            payload_off: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            payload_len: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

pub const WIRE_SIZE: usize = WIRE_LEN;

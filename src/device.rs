// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// File-like surface a host OS exposes to user space on top of one
// endpoint: open/read/write/release/ioctl. Enumerating the underlying
// character device and wiring it to the kernel's VFS is the platform's
// job; this module only implements what those calls forward to.

use crate::endpoint::{Endpoint, SocketId};
use crate::error::{IvshmError, Result};
use crate::message::{Message, MsgType};
use crate::pci::BarRegisters;
use crate::port::Role;

pub const IOCTL_MAGIC: u8 = b'f';

pub const IOCTL_RING: u32 = 1;
pub const IOCTL_REQ: u32 = 2;
pub const IOCTL_IVPOSITION: u32 = 3;

/// Argument to `IOCTL_RING`: low 16 bits MSI vector, high 16 bits peer id.
pub fn ring_doorbell_value(msi_vector: u16, peer_id: u16) -> u32 {
    (peer_id as u32) << 16 | msi_vector as u32
}

/// Argument to `IOCTL_REQ`.
#[derive(Debug, Clone, Copy)]
pub struct ReqArg {
    pub peer_id: u16,
    pub address: u32,
}

/// One open file description over an endpoint and the socket it reads
/// and writes on. Several `DeviceFile`s may share one `Endpoint`.
pub struct DeviceFile<'a> {
    endpoint: &'a Endpoint,
    socket: SocketId,
    minor: u32,
    configured_minor: u32,
    bar: Option<&'a dyn BarRegisters>,
}

impl<'a> DeviceFile<'a> {
    /// Validate the minor number requested against the one this device
    /// was configured with, then bind to `socket`. `bar` is `None` when
    /// no MSI-X doorbell path is wired up; `IOCTL_RING` then only bumps
    /// the local notifier.
    pub fn open(
        endpoint: &'a Endpoint,
        socket: SocketId,
        minor: u32,
        configured_minor: u32,
        bar: Option<&'a dyn BarRegisters>,
    ) -> Result<Self> {
        if minor != configured_minor {
            return Err(IvshmError::WrongMinorNumber {
                requested: minor,
                configured: configured_minor,
            });
        }
        Ok(Self {
            endpoint,
            socket,
            minor,
            configured_minor,
            bar,
        })
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Dequeue one message and copy up to `min(buf.len(), payload_len)`
    /// bytes from the arena into `buf`. Guest (consumer) only.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.endpoint.role() != Role::Guest {
            return Err(IvshmError::ReadFromHost);
        }
        let msg = match self.endpoint.try_recv_raw(self.socket) {
            Some(m) => m,
            None => return Ok(0),
        };
        let len = buf.len().min(msg.payload_len.max(0) as usize);
        let src = self.endpoint.arena_ptr_at(msg.payload_off);
        unsafe {
            std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), len);
        }
        Ok(len)
    }

    /// Allocate `buf.len()` bytes in the arena, copy `buf` in, and
    /// enqueue an `add` announcing it. Host (producer) only.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.endpoint.role() != Role::Host {
            return Err(IvshmError::WriteFromGuest);
        }
        let offset = self.endpoint.add_payload(buf.len())?;
        let dst = self.endpoint.arena_ptr_at(offset);
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), dst, buf.len());
        }
        let msg = Message::new(self.endpoint.node_id(), MsgType::Add, offset, buf.len() as i64);
        self.endpoint.send_async(self.socket, msg)?;
        Ok(buf.len())
    }

    /// Free per-open state. The endpoint itself and its socket table
    /// outlive any one `DeviceFile`.
    pub fn release(self) {}

    pub fn ioctl(&self, cmd: u32, ring_arg: Option<u32>, req_arg: Option<ReqArg>) -> Result<u32> {
        match cmd {
            IOCTL_RING => {
                let value = ring_arg.unwrap_or(0);
                if let Some(bar) = self.bar {
                    bar.write_doorbell(value);
                }
                self.endpoint.poke_syswide();
                Ok(0)
            }
            IOCTL_REQ => {
                if self.endpoint.role() == Role::Host {
                    return Err(IvshmError::WriteFromGuest);
                }
                let arg = req_arg.ok_or(IvshmError::BadIoctlCommand { cmd })?;
                let msg = Message::new(self.endpoint.node_id(), MsgType::Req, arg.address, 0);
                self.endpoint.send_on_syswide(&msg);
                Ok(0)
            }
            IOCTL_IVPOSITION => Ok(self.endpoint.node_id()),
            other => Err(IvshmError::BadIoctlCommand { cmd: other }),
        }
    }

    #[allow(dead_code)]
    fn configured_minor(&self) -> u32 {
        self.configured_minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_doorbell_value_packs_vector_and_peer() {
        let v = ring_doorbell_value(0x1234, 0x0002);
        assert_eq!(v & 0xFFFF, 0x1234);
        assert_eq!(v >> 16, 0x0002);
    }

    #[test]
    fn open_rejects_mismatched_minor() {
        let region = crate::region::RegionHandle::new_owned(256 * 1024, 32).unwrap();
        let endpoint = Endpoint::attach(region, Role::Guest, 2, 1).unwrap();
        assert!(DeviceFile::open(&endpoint, 0, 1, 0, None).is_err());
        assert!(DeviceFile::open(&endpoint, 0, 0, 0, None).is_ok());
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// What the core requires from the platform's PCI binding: a BAR0
// register file and, optionally, MSI-X interrupt registration. Probing
// the device, mapping BAR2 into the address space, and wiring these
// traits to real hardware registers is the platform's job; this module
// only names the interface and a loopback implementation for tests and
// single-process demos.

/// BAR0 register file: IntrMask(0x00), IntrStatus(0x04), IVPosition(0x08),
/// Doorbell(0x0c), all 32-bit.
pub trait BarRegisters: Send + Sync {
    fn intr_mask(&self) -> u32;
    fn set_intr_mask(&self, value: u32);

    fn intr_status(&self) -> u32;

    /// This endpoint's node id, as reported by the device.
    fn iv_position(&self) -> u32;

    /// Poke the remote peer. `value` is the composite MSI-vector/peer-id
    /// word `IOCTL_RING` builds.
    fn write_doorbell(&self, value: u32);
}

/// A callback invoked once per MSI-X vector firing. Registration itself
/// (assigning vectors, unmasking them) is the platform's job; only the
/// "something happened, go poll" signal is this trait's concern.
pub trait InterruptSource: Send + Sync {
    fn register_callback(&self, vector: u16, callback: Box<dyn Fn() + Send + Sync>);
}

/// In-process loopback BAR0: doorbell writes are recorded rather than
/// sent to real hardware, for tests and demos that run Host and Guest
/// in one process with no interrupt path.
pub struct NullBarRegisters {
    node_id: u32,
    last_doorbell: std::sync::atomic::AtomicU32,
    intr_mask: std::sync::atomic::AtomicU32,
}

impl NullBarRegisters {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            last_doorbell: std::sync::atomic::AtomicU32::new(0),
            intr_mask: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn last_doorbell_value(&self) -> u32 {
        self.last_doorbell.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl BarRegisters for NullBarRegisters {
    fn intr_mask(&self) -> u32 {
        self.intr_mask.load(std::sync::atomic::Ordering::Acquire)
    }

    fn set_intr_mask(&self, value: u32) {
        self.intr_mask.store(value, std::sync::atomic::Ordering::Release);
    }

    fn intr_status(&self) -> u32 {
        0
    }

    fn iv_position(&self) -> u32 {
        self.node_id
    }

    fn write_doorbell(&self, value: u32) {
        self.last_doorbell.store(value, std::sync::atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bar_reports_configured_node_id() {
        let bar = NullBarRegisters::new(7);
        assert_eq!(bar.iv_position(), 7);
    }

    #[test]
    fn null_bar_records_last_doorbell_write() {
        let bar = NullBarRegisters::new(1);
        assert_eq!(bar.last_doorbell_value(), 0);
        bar.write_doorbell(0xABCD);
        assert_eq!(bar.last_doorbell_value(), 0xABCD);
    }
}

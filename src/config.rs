//! Static VirtIO device configuration consumed at boot.
//!
//! The embedding hypervisor parses its platform configuration into one
//! [`VmVirtIoConfig`] per VM. Each VirtIO instance must appear exactly twice
//! across all VMs: once as a frontend entry and once as a backend entry
//! sharing the same `instance_id`. The frontend entry supplies the device
//! interrupt, the MMIO window and the dispatch priority; the backend entry
//! supplies the virtio interrupt, the device type and the polling flag.

use alloc::vec::Vec;

use crate::{GuestVirtAddr, hal::cpu::VmId};

/// One VirtIO device node of a VM.
#[derive(Debug, Clone, Default)]
pub struct VirtIoDeviceConfig {
    /// Identifier shared by the frontend and backend halves of an instance.
    pub instance_id: usize,
    /// Whether this entry is the backend (device emulation) half.
    pub is_backend: bool,
    /// Opaque device type tag, meaningful to the backend only.
    pub device_type: u32,
    /// Dispatch priority; a lower value is served first.
    pub priority: u32,
    /// IRQ raised in the frontend when a response is delivered; 0 if unused.
    pub device_irq: u32,
    /// IRQ raised in the backend when a request arrives; 0 if unused.
    pub virtio_irq: u32,
    /// Backend polls for requests instead of waiting on `virtio_irq`.
    pub polling: bool,
    /// Base of the emulated MMIO window in the frontend address space.
    pub mmio_base: GuestVirtAddr,
    /// Size of the emulated MMIO window in bytes.
    pub mmio_size: usize,
}

/// The VirtIO device list of a single VM.
#[derive(Debug, Clone)]
pub struct VmVirtIoConfig {
    pub vm: VmId,
    pub devices: Vec<VirtIoDeviceConfig>,
}

impl VmVirtIoConfig {
    pub fn new(vm: VmId) -> Self {
        Self {
            vm,
            devices: Vec::new(),
        }
    }

    pub fn add_device(&mut self, device: VirtIoDeviceConfig) {
        self.devices.push(device);
    }
}

#![no_std]

//! Inter-VM VirtIO MMIO request bridge.
//!
//! A frontend VM runs unmodified VirtIO drivers against an MMIO window with
//! no real device behind it; every access traps into the hypervisor. A
//! backend VM runs the device emulation in user-level code. This crate
//! bridges the two: a trapped access is queued for the backend, the backend
//! CPU is woken, and the trapping frontend vCPU is parked until the backend
//! answers via hypercall, at which point the vCPU resumes past the faulting
//! instruction with the result already in its register file.
//!
//! The embedding hypervisor supplies CPU and vCPU primitives through the
//! [`BridgeHal`] trait and drives the bridge through [`init`],
//! [`assign_cpu`], [`handle_mmio`], [`handle_hypercall`] and the message
//! dispatcher registered at init.

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

#[cfg(test)]
extern crate std;

mod bridge;
mod instance;
mod request;

pub mod backend;
pub mod config;
pub mod frontend;
pub mod hal;
pub mod msg;

#[cfg(test)]
mod tests;

pub use backend::{HyperCallError, HyperCallOp};
pub use bridge::{VirtIoBridge, assign_cpu, handle_hypercall, handle_mmio, init};
pub use config::{VirtIoDeviceConfig, VmVirtIoConfig};
pub use frontend::MmioAccess;
pub use hal::cpu::{CpuId, IrqNum, VmId};
pub use hal::{BridgeHal, VCpuOps};
pub use instance::{Direction, Instance, InstanceId, InstanceTable};
pub use msg::{BridgeEvent, CpuMessage};
pub use request::{AccessWidth, MmioOp};

/// Guest virtual address as seen by the trapping frontend vCPU.
pub type GuestVirtAddr = memory_addr::VirtAddr;

/// Upper bound on configured VirtIO instances.
pub const INSTANCES_MAX: usize = 50;

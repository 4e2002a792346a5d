//! The seam between the bridge and the embedding hypervisor.
//!
//! The bridge runs inside trap, hypercall and cross-CPU message handlers; it
//! owns no CPUs and no vCPUs of its own. Everything it needs from the host
//! is collected in [`BridgeHal`] so that the same bridge code drives real
//! hardware in the hypervisor and a mock host in the test suite.

pub mod cpu;

use cpu::{CpuId, IrqNum, VmId};

use crate::msg::CpuMessage;

/// Host primitives consumed by the bridge.
pub trait BridgeHal: 'static {
    /// Handle to a guest vCPU context. Valid for the duration of the trap,
    /// hypercall or message handler it was obtained in.
    type VCpu: VCpuOps;

    /// Physical CPU the caller is currently executing on.
    fn current_cpu() -> CpuId;

    /// The vCPU loaded on the current physical CPU.
    fn current_vcpu() -> Self::VCpu;

    /// Delivers `msg` to the bridge dispatcher on the `target` CPU.
    fn send_message(target: CpuId, msg: CpuMessage);

    /// Yields the current physical CPU to the host scheduler. Returns once
    /// the current vCPU has been marked active again.
    fn cpu_idle();

    /// One-shot registration of the receive dispatcher on the host's
    /// cross-CPU message channel reserved for VirtIO traffic.
    fn register_message_handler(handler: fn(CpuMessage));
}

/// Operations on a guest vCPU context.
pub trait VCpuOps {
    /// The VM this vCPU belongs to.
    fn vm(&self) -> VmId;

    fn read_register(&self, idx: usize) -> usize;

    fn write_register(&self, idx: usize, value: usize);

    /// Asserts a virtual interrupt line in the guest.
    fn inject_irq(&self, irq: IrqNum);

    /// Marks the vCPU runnable (or parked) for the host scheduler.
    fn set_active(&self, active: bool);

    /// Steps the guest PC past the faulting MMIO instruction.
    fn advance_pc(&self);
}

//! Frontend trap path: turns a trapped MMIO access into a queued request and
//! parks the trapping vCPU until the backend answers.

use crate::{
    GuestVirtAddr,
    bridge::VirtIoBridge,
    hal::{BridgeHal, VCpuOps},
    instance::Direction,
    msg::{BridgeEvent, CpuMessage},
    request::{AccessWidth, MmioOp, Request},
};

/// A decoded MMIO access, as produced by the hypervisor's trap decoder.
#[derive(Debug, Clone, Copy)]
pub struct MmioAccess {
    /// The trapping guest virtual address.
    pub addr: GuestVirtAddr,
    pub width: AccessWidth,
    pub op: MmioOp,
    /// Frontend vCPU register that sources the write data or receives the
    /// read result.
    pub reg: usize,
}

impl VirtIoBridge {
    /// Handles a trapped MMIO access on behalf of the current frontend vCPU.
    ///
    /// Returns `false` when the address lies outside every VirtIO window
    /// registered for the vCPU's VM, so the caller can fall back to its
    /// generic emulator path. On `true` the access has been queued for the
    /// backend and the calling vCPU parked; the call returns only after the
    /// vCPU has been resumed with the response already applied.
    pub fn handle_mmio<H: BridgeHal>(&self, vcpu: &H::VCpu, access: &MmioAccess) -> bool {
        let Some((instance, reg_offset)) =
            self.table()
                .lookup_window(vcpu.vm(), access.addr, access.width)
        else {
            return false;
        };

        let value = match access.op {
            MmioOp::Write => vcpu.read_register(access.reg),
            MmioOp::Read => 0,
        };
        let cpu = H::current_cpu();

        trace!(
            "{}: {:?} {:?} at {:?} (offset {:#x}) from {}",
            instance.id(),
            access.op,
            access.width,
            access.addr,
            reg_offset,
            cpu,
        );

        let (backend_cpu, queued) = {
            let mut state = instance.state.lock();
            state.direction = Direction::FrontendToBackend;
            state.backend_pending.insert(Request {
                reg_offset,
                addr: access.addr,
                width: access.width,
                op: access.op,
                value,
                cpu_reg: access.reg,
                frontend_cpu: cpu,
                priority: instance.priority(),
                handed_off: false,
            });
            (state.backend_cpu, state.backend_pending.len())
        };
        let Some(backend_cpu) = backend_cpu else {
            error!("{}: backend CPU not yet assigned", instance.id());
            panic!("virtio transfer before the backend vCPU came online");
        };

        let event = if instance.polling() {
            BridgeEvent::NotifyBackendPoll
        } else {
            BridgeEvent::InjectInterrupt
        };
        debug!(
            "{}: {} request(s) queued, signalling {}",
            instance.id(),
            queued,
            backend_cpu,
        );
        H::send_message(backend_cpu, CpuMessage::new(event, instance.id()));

        // Park until the response lands. The vCPU resumes past the faulting
        // instruction with its register file already updated.
        vcpu.advance_pc();
        vcpu.set_active(false);
        H::cpu_idle();

        true
    }
}

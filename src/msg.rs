//! Cross-CPU messages and their receive dispatcher.

use crate::{
    bridge::VirtIoBridge,
    hal::{BridgeHal, VCpuOps},
    instance::{Direction, InstanceId},
};

/// Events carried by a [`CpuMessage`].
///
/// The discriminants are the on-channel event codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BridgeEvent {
    /// A write completion is ready; pop it and resume the frontend vCPU.
    WriteNotify = 0,
    /// A read completion is ready; write the value back, then resume.
    ReadNotify = 1,
    /// Assert the IRQ line of whichever side the last transfer targeted.
    InjectInterrupt = 2,
    /// Bare wakeup for a polling backend.
    NotifyBackendPoll = 3,
}

/// A message exchanged between physical CPUs on the VirtIO channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuMessage {
    pub event: BridgeEvent,
    pub instance: InstanceId,
}

impl CpuMessage {
    pub const fn new(event: BridgeEvent, instance: InstanceId) -> Self {
        Self { event, instance }
    }
}

impl VirtIoBridge {
    /// Receive dispatcher, invoked on the CPU a [`CpuMessage`] was sent to.
    ///
    /// `WriteNotify`/`ReadNotify` arriving here is the implicit wake for the
    /// parked frontend vCPU: marking it active makes the host scheduler
    /// resume it at the post-trap instruction.
    pub fn handle_cpu_message<H: BridgeHal>(&self, msg: CpuMessage) {
        let Some(instance) = self.table().get(msg.instance) else {
            error!("message for unknown instance {}", msg.instance);
            panic!("virtio message names an unbound instance");
        };

        trace!("{}: {:?} received", instance.id(), msg.event);

        match msg.event {
            BridgeEvent::WriteNotify => {
                let Some(_req) = instance.state.lock().frontend_pending.pop() else {
                    error!("{}: write notify without a pending response", instance.id());
                    panic!("virtio response queue empty on write notify");
                };
                H::current_vcpu().set_active(true);
            }
            BridgeEvent::ReadNotify => {
                let Some(req) = instance.state.lock().frontend_pending.pop() else {
                    error!("{}: read notify without a pending response", instance.id());
                    panic!("virtio response queue empty on read notify");
                };
                let vcpu = H::current_vcpu();
                vcpu.write_register(req.cpu_reg, req.value);
                vcpu.set_active(true);
            }
            BridgeEvent::InjectInterrupt => {
                let direction = instance.state.lock().direction;
                let irq = match direction {
                    Direction::BackendToFrontend => instance.frontend_irq(),
                    Direction::FrontendToBackend => instance.backend_irq(),
                };
                let Some(irq) = irq else {
                    error!("{}: no IRQ bound for {:?} injection", instance.id(), direction);
                    panic!("virtio interrupt injection without a bound IRQ line");
                };
                H::current_vcpu().inject_irq(irq);
            }
            BridgeEvent::NotifyBackendPoll => {
                // Wakeup only; the polling backend re-enters its ASK loop
                // next time it is scheduled.
            }
        }
    }
}

//! Backend hypercall path: services the `ASK`, `READ`, `WRITE` and `NOTIFY`
//! calls issued by the backend VM.
//!
//! Call arguments arrive in registers x2..x6 as
//! `(instance_id, reg_offset, guest_address, op, value)`; the guest address
//! is informational and ignored here. On a successful `ASK` the fetched
//! request is written back into x1..x6. The return value belongs in the
//! caller's canonical return register and is produced by
//! [`VirtIoBridge::handle_hypercall`].

use crate::{
    bridge::VirtIoBridge,
    hal::{BridgeHal, VCpuOps},
    instance::{Direction, Instance, InstanceId},
    msg::{BridgeEvent, CpuMessage},
    request::MmioOp,
};

/// First argument register of the hypercall ABI.
const REG_ARG_BASE: usize = 2;
/// First result register filled on a successful `ASK`.
const REG_ASK_RESULT_BASE: usize = 1;

/// Hypercall op selectors, as encoded by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum HyperCallOp {
    Write = 0,
    Read = 1,
    Ask = 2,
    Notify = 3,
}

impl HyperCallOp {
    pub const fn from_raw(raw: usize) -> Option<Self> {
        match raw {
            0 => Some(HyperCallOp::Write),
            1 => Some(HyperCallOp::Read),
            2 => Some(HyperCallOp::Ask),
            3 => Some(HyperCallOp::Notify),
            _ => None,
        }
    }
}

/// Errors surfaced to the backend as negative return codes.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperCallError {
    /// The operation could not be carried out: empty queue, desynchronised
    /// offset, or the caller is not the bound backend.
    #[error("virtio hypercall failed")]
    Failure,
    /// Malformed arguments or an unknown op selector.
    #[error("invalid virtio hypercall arguments")]
    InvalidArgs,
}

impl HyperCallError {
    /// ABI return code; error codes are conveyed negated.
    pub const fn code(&self) -> isize {
        match self {
            HyperCallError::Failure => -1,
            HyperCallError::InvalidArgs => -2,
        }
    }
}

impl VirtIoBridge {
    /// Decodes and services a VirtIO hypercall issued by the current vCPU.
    ///
    /// Returns the value for the caller's return register: 0 on success, the
    /// negated error code otherwise.
    pub fn handle_hypercall<H: BridgeHal>(&self, vcpu: &H::VCpu) -> isize {
        match self.hypercall::<H>(vcpu) {
            Ok(()) => 0,
            Err(err) => err.code(),
        }
    }

    fn hypercall<H: BridgeHal>(&self, vcpu: &H::VCpu) -> Result<(), HyperCallError> {
        let instance_id = InstanceId::new(vcpu.read_register(REG_ARG_BASE));
        let reg_offset = vcpu.read_register(REG_ARG_BASE + 1);
        // x4 carries the guest address, informational only.
        let op = vcpu.read_register(REG_ARG_BASE + 3);
        let value = vcpu.read_register(REG_ARG_BASE + 4);

        let Some(instance) = self.table().get(instance_id) else {
            debug!("hypercall for unknown instance {instance_id}");
            return Err(HyperCallError::InvalidArgs);
        };
        if instance.backend_vm() != vcpu.vm() {
            debug!(
                "{instance_id}: hypercall from {}, backend is {}",
                vcpu.vm(),
                instance.backend_vm(),
            );
            return Err(HyperCallError::Failure);
        }

        match HyperCallOp::from_raw(op) {
            Some(HyperCallOp::Ask) => self.ask::<H>(vcpu, instance, reg_offset, value),
            Some(HyperCallOp::Write) => self.complete::<H>(instance, MmioOp::Write, reg_offset, value),
            Some(HyperCallOp::Read) => self.complete::<H>(instance, MmioOp::Read, reg_offset, value),
            Some(HyperCallOp::Notify) => self.notify::<H>(instance),
            None => {
                debug!("{instance_id}: unknown hypercall op {op}");
                Err(HyperCallError::InvalidArgs)
            }
        }
    }

    /// `ASK`: hands the next unfetched request to the backend.
    fn ask<H: BridgeHal>(
        &self,
        vcpu: &H::VCpu,
        instance: &Instance,
        reg_offset: usize,
        value: usize,
    ) -> Result<(), HyperCallError> {
        if reg_offset != 0 || value != 0 {
            return Err(HyperCallError::InvalidArgs);
        }

        let mut state = instance.state.lock();
        let Some(req) = state.backend_pending.next_unhanded() else {
            return Err(HyperCallError::Failure);
        };
        req.handed_off = true;
        let (reg_offset, addr, op, value, width) =
            (req.reg_offset, req.addr, req.op, req.value, req.width);
        drop(state);

        trace!(
            "{}: handing off {:?} at offset {:#x}",
            instance.id(),
            op,
            reg_offset,
        );

        vcpu.write_register(REG_ASK_RESULT_BASE, instance.id().raw());
        vcpu.write_register(REG_ASK_RESULT_BASE + 1, reg_offset);
        vcpu.write_register(REG_ASK_RESULT_BASE + 2, addr.as_usize());
        vcpu.write_register(REG_ASK_RESULT_BASE + 3, op as usize);
        vcpu.write_register(REG_ASK_RESULT_BASE + 4, value);
        vcpu.write_register(REG_ASK_RESULT_BASE + 5, width.size());
        Ok(())
    }

    /// `READ`/`WRITE`: the backend announces the completion of the head
    /// request and the response is routed back to the trapping CPU.
    fn complete<H: BridgeHal>(
        &self,
        instance: &Instance,
        op: MmioOp,
        reg_offset: usize,
        value: usize,
    ) -> Result<(), HyperCallError> {
        let mut state = instance.state.lock();
        let Some(mut req) = state.backend_pending.pop() else {
            return Err(HyperCallError::Failure);
        };
        if req.reg_offset != reg_offset {
            // The backend has desynchronised; discard the request and let it
            // resync. The frontend stays parked.
            drop(state);
            warn!(
                "{}: completion offset {:#x} does not match head request {:#x}, dropping",
                instance.id(),
                reg_offset,
                req.reg_offset,
            );
            return Err(HyperCallError::Failure);
        }
        req.value = value;
        let target = req.frontend_cpu;
        state.direction = Direction::BackendToFrontend;
        state.frontend_pending.push(req);
        let responses = state.frontend_pending.len();
        drop(state);

        trace!(
            "{}: completed {:?} at offset {:#x}, {} response(s) pending",
            instance.id(),
            op,
            reg_offset,
            responses,
        );

        let event = match op {
            MmioOp::Read => BridgeEvent::ReadNotify,
            MmioOp::Write => BridgeEvent::WriteNotify,
        };
        H::send_message(target, CpuMessage::new(event, instance.id()));
        Ok(())
    }

    /// `NOTIFY`: raise the frontend's device interrupt, e.g. after the
    /// backend advanced a used ring. Queues nothing.
    fn notify<H: BridgeHal>(&self, instance: &Instance) -> Result<(), HyperCallError> {
        let frontend_cpu = {
            let mut state = instance.state.lock();
            state.direction = Direction::BackendToFrontend;
            state.frontend_cpu
        };
        let Some(target) = frontend_cpu else {
            error!("{}: frontend CPU not yet assigned", instance.id());
            panic!("virtio notify before the frontend vCPU came online");
        };
        H::send_message(target, CpuMessage::new(BridgeEvent::InjectInterrupt, instance.id()));
        Ok(())
    }
}

use alloc::collections::VecDeque;

use crate::{GuestVirtAddr, hal::cpu::CpuId};

/// Access width of a trapped MMIO instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Word,
    Dword,
    Qword,
}

impl AccessWidth {
    pub const fn size(&self) -> usize {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::Dword => 4,
            AccessWidth::Qword => 8,
        }
    }

    pub const fn try_from_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(AccessWidth::Byte),
            2 => Some(AccessWidth::Word),
            4 => Some(AccessWidth::Dword),
            8 => Some(AccessWidth::Qword),
            _ => None,
        }
    }
}

/// Direction of a trapped MMIO access.
///
/// The discriminants match the hypercall op encoding, so the value travels
/// unchanged from the trap decoder through the `ASK` result registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MmioOp {
    Write = 0,
    Read = 1,
}

/// A single in-flight MMIO access travelling between the frontend trap and
/// the backend emulator.
#[derive(Debug)]
pub struct Request {
    /// Offset of the accessed register within the instance's MMIO window.
    pub reg_offset: usize,
    /// Full trapping guest address, passed verbatim to the backend.
    pub addr: GuestVirtAddr,
    pub width: AccessWidth,
    pub op: MmioOp,
    /// Write data on ingress; read result on egress.
    pub value: usize,
    /// Frontend vCPU register that sources the write data or receives the
    /// read result.
    pub cpu_reg: usize,
    /// Physical CPU that took the trap. The response is routed here even if
    /// the frontend vCPU migrates while the request is in service.
    pub frontend_cpu: CpuId,
    pub priority: u32,
    /// Set once the backend has fetched this request via `ASK`.
    pub handed_off: bool,
}

/// Requests awaiting backend service.
///
/// Kept sorted by ascending priority value (lower value is dequeued first);
/// equal priorities keep arrival order.
#[derive(Debug, Default)]
pub struct BackendPending(VecDeque<Request>);

impl BackendPending {
    pub const fn new() -> Self {
        Self(VecDeque::new())
    }

    /// Stable priority-ordered insert.
    pub fn insert(&mut self, req: Request) {
        let at = self.0.partition_point(|r| r.priority <= req.priority);
        self.0.insert(at, req);
    }

    /// The first request the backend has not fetched yet.
    pub fn next_unhanded(&mut self) -> Option<&mut Request> {
        self.0.iter_mut().find(|r| !r.handed_off)
    }

    pub fn pop(&mut self) -> Option<Request> {
        self.0.pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.0.iter()
    }
}

/// Completed requests awaiting frontend resume, strictly FIFO.
///
/// Completions land here in backend call order, which matches park order
/// because a frontend vCPU has at most one request in flight.
#[derive(Debug, Default)]
pub struct FrontendPending(VecDeque<Request>);

impl FrontendPending {
    pub const fn new() -> Self {
        Self(VecDeque::new())
    }

    pub fn push(&mut self, req: Request) {
        self.0.push_back(req);
    }

    pub fn pop(&mut self) -> Option<Request> {
        self.0.pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

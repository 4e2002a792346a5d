//! A stand-in host: thread-local CPU state, recorded cross-CPU messages and
//! a register-file-backed vCPU.
//!
//! Each `#[test]` runs on its own thread, so the thread-local state isolates
//! tests from each other without any global locking.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use crate::hal::cpu::{CpuId, IrqNum, VmId};
use crate::hal::{BridgeHal, VCpuOps};
use crate::msg::CpuMessage;

std::thread_local! {
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
    static IDLE_CALLS: Cell<usize> = const { Cell::new(0) };
    static SENT: RefCell<Vec<(CpuId, CpuMessage)>> = const { RefCell::new(Vec::new()) };
    static CURRENT_VCPU: RefCell<Option<MockVCpu>> = const { RefCell::new(None) };
}

pub struct MockHal;

impl BridgeHal for MockHal {
    type VCpu = MockVCpu;

    fn current_cpu() -> CpuId {
        CpuId::new(CURRENT_CPU.with(|c| c.get()))
    }

    fn current_vcpu() -> MockVCpu {
        CURRENT_VCPU.with(|v| v.borrow().clone().expect("no current vCPU installed"))
    }

    fn send_message(target: CpuId, msg: CpuMessage) {
        SENT.with(|s| s.borrow_mut().push((target, msg)));
    }

    fn cpu_idle() {
        IDLE_CALLS.with(|c| c.set(c.get() + 1));
    }

    fn register_message_handler(_handler: fn(CpuMessage)) {}
}

/// Selects which physical CPU the code under test believes it runs on.
pub fn set_current_cpu(raw: usize) {
    CURRENT_CPU.with(|c| c.set(raw));
}

/// Installs the vCPU returned by `MockHal::current_vcpu`.
pub fn install_vcpu(vcpu: &MockVCpu) {
    CURRENT_VCPU.with(|v| *v.borrow_mut() = Some(vcpu.clone()));
}

/// Drains and returns all messages sent so far.
pub fn sent_messages() -> Vec<(CpuId, CpuMessage)> {
    SENT.with(|s| s.borrow_mut().drain(..).collect())
}

pub fn idle_calls() -> usize {
    IDLE_CALLS.with(|c| c.get())
}

#[derive(Clone)]
pub struct MockVCpu(Rc<RefCell<VCpuState>>);

struct VCpuState {
    vm: VmId,
    regs: [usize; 32],
    active: bool,
    pc: usize,
    injected: Vec<IrqNum>,
}

impl MockVCpu {
    pub fn new(vm: VmId) -> Self {
        Self(Rc::new(RefCell::new(VCpuState {
            vm,
            regs: [0; 32],
            active: true,
            pc: 0,
            injected: Vec::new(),
        })))
    }

    pub fn set_reg(&self, idx: usize, value: usize) {
        self.0.borrow_mut().regs[idx] = value;
    }

    pub fn reg(&self, idx: usize) -> usize {
        self.0.borrow().regs[idx]
    }

    pub fn active(&self) -> bool {
        self.0.borrow().active
    }

    pub fn pc(&self) -> usize {
        self.0.borrow().pc
    }

    pub fn injected(&self) -> Vec<IrqNum> {
        self.0.borrow().injected.clone()
    }
}

impl VCpuOps for MockVCpu {
    fn vm(&self) -> VmId {
        self.0.borrow().vm
    }

    fn read_register(&self, idx: usize) -> usize {
        self.0.borrow().regs[idx]
    }

    fn write_register(&self, idx: usize, value: usize) {
        self.0.borrow_mut().regs[idx] = value;
    }

    fn inject_irq(&self, irq: IrqNum) {
        self.0.borrow_mut().injected.push(irq);
    }

    fn set_active(&self, active: bool) {
        self.0.borrow_mut().active = active;
    }

    fn advance_pc(&self) {
        // Fixed-width ISA in the mock.
        self.0.borrow_mut().pc += 4;
    }
}

use alloc::vec::Vec;

use derive_more::From;
use kspin::SpinNoIrq;

use crate::{
    GuestVirtAddr, INSTANCES_MAX,
    config::VmVirtIoConfig,
    hal::cpu::{CpuId, IrqNum, VmId},
    request::{AccessWidth, BackendPending, FrontendPending},
};

/// Identifier linking one frontend device node to one backend device node.
#[derive(
    derive_more::Debug,
    derive_more::Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
)]
#[debug("virtio#{_0}")]
#[display("virtio#{_0}")]
#[repr(transparent)]
pub struct InstanceId(usize);

impl InstanceId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> usize {
        self.0
    }
}

/// Which way the most recent transfer went.
///
/// Consulted as a hint when an `InjectInterrupt` message lands on a CPU that
/// may serve either side of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FrontendToBackend,
    BackendToFrontend,
}

/// One bound frontend/backend pair.
///
/// Boot fields are immutable once the table is built; everything the running
/// system mutates lives behind the per-instance lock.
#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    frontend_vm: VmId,
    backend_vm: VmId,
    frontend_irq: Option<IrqNum>,
    backend_irq: Option<IrqNum>,
    priority: u32,
    device_type: u32,
    polling: bool,
    pub(crate) state: SpinNoIrq<InstanceState>,
}

#[derive(Debug)]
pub(crate) struct InstanceState {
    /// Physical CPU currently running the frontend vCPU, filled in as the
    /// vCPU first comes online.
    pub frontend_cpu: Option<CpuId>,
    pub backend_cpu: Option<CpuId>,
    pub direction: Direction,
    pub backend_pending: BackendPending,
    pub frontend_pending: FrontendPending,
}

impl InstanceState {
    fn new() -> Self {
        Self {
            frontend_cpu: None,
            backend_cpu: None,
            direction: Direction::FrontendToBackend,
            backend_pending: BackendPending::new(),
            frontend_pending: FrontendPending::new(),
        }
    }
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn frontend_vm(&self) -> VmId {
        self.frontend_vm
    }

    pub fn backend_vm(&self) -> VmId {
        self.backend_vm
    }

    pub fn frontend_irq(&self) -> Option<IrqNum> {
        self.frontend_irq
    }

    pub fn backend_irq(&self) -> Option<IrqNum> {
        self.backend_irq
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn device_type(&self) -> u32 {
        self.device_type
    }

    pub fn polling(&self) -> bool {
        self.polling
    }
}

/// An emulated MMIO window registered by a frontend device entry.
#[derive(Debug)]
struct MmioWindow {
    vm: VmId,
    base: GuestVirtAddr,
    size: usize,
    slot: usize,
}

/// The boot-built registry of all bound instances and frontend windows.
#[derive(Debug)]
pub struct InstanceTable {
    instances: Vec<Instance>,
    windows: Vec<MmioWindow>,
}

struct FrontendHalf {
    vm: VmId,
    irq: Option<IrqNum>,
    priority: u32,
}

struct BackendHalf {
    vm: VmId,
    irq: Option<IrqNum>,
    device_type: u32,
    polling: bool,
}

struct PartialInstance {
    id: InstanceId,
    frontend: Option<FrontendHalf>,
    backend: Option<BackendHalf>,
}

impl InstanceTable {
    /// Scans every VM's device list and binds frontend/backend pairs.
    ///
    /// Fails on a duplicate role, a missing counterpart, both halves in the
    /// same VM, or more than [`INSTANCES_MAX`] instances.
    pub fn build(configs: &[VmVirtIoConfig]) -> anyhow::Result<Self> {
        let mut partials: Vec<PartialInstance> = Vec::new();
        let mut windows: Vec<MmioWindow> = Vec::new();

        for vm_cfg in configs {
            for dev in &vm_cfg.devices {
                let id = InstanceId::new(dev.instance_id);
                let slot = match partials.iter().position(|p| p.id == id) {
                    Some(slot) => slot,
                    None => {
                        if partials.len() >= INSTANCES_MAX {
                            bail!("too many virtio instances, limit is {INSTANCES_MAX}");
                        }
                        partials.push(PartialInstance {
                            id,
                            frontend: None,
                            backend: None,
                        });
                        partials.len() - 1
                    }
                };

                let partial = &mut partials[slot];
                if dev.is_backend {
                    if partial.backend.is_some() {
                        bail!("duplicate backend for {id}");
                    }
                    partial.backend = Some(BackendHalf {
                        vm: vm_cfg.vm,
                        irq: IrqNum::from_config(dev.virtio_irq),
                        device_type: dev.device_type,
                        polling: dev.polling,
                    });
                } else {
                    if partial.frontend.is_some() {
                        bail!("duplicate frontend for {id}");
                    }
                    partial.frontend = Some(FrontendHalf {
                        vm: vm_cfg.vm,
                        irq: IrqNum::from_config(dev.device_irq),
                        priority: dev.priority,
                    });
                    windows.push(MmioWindow {
                        vm: vm_cfg.vm,
                        base: dev.mmio_base,
                        size: dev.mmio_size,
                        slot,
                    });
                }
            }
        }

        let mut instances = Vec::with_capacity(partials.len());
        for partial in partials {
            let id = partial.id;
            let Some(frontend) = partial.frontend else {
                bail!("no frontend bound for {id}");
            };
            let Some(backend) = partial.backend else {
                bail!("no backend bound for {id}");
            };
            if frontend.vm == backend.vm {
                bail!("frontend and backend of {id} share {}", frontend.vm);
            }

            info!(
                "{id}: frontend {} (irq {:?}, priority {}) <-> backend {} (irq {:?}, type {}, polling {})",
                frontend.vm,
                frontend.irq,
                frontend.priority,
                backend.vm,
                backend.irq,
                backend.device_type,
                backend.polling,
            );

            instances.push(Instance {
                id,
                frontend_vm: frontend.vm,
                backend_vm: backend.vm,
                frontend_irq: frontend.irq,
                backend_irq: backend.irq,
                priority: frontend.priority,
                device_type: backend.device_type,
                polling: backend.polling,
                state: SpinNoIrq::new(InstanceState::new()),
            });
        }

        Ok(Self { instances, windows })
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Finds the instance whose frontend window of `vm` covers the access,
    /// returning it together with the register offset within the window.
    pub fn lookup_window(
        &self,
        vm: VmId,
        addr: GuestVirtAddr,
        width: AccessWidth,
    ) -> Option<(&Instance, usize)> {
        for w in &self.windows {
            if w.vm == vm
                && addr >= w.base
                && addr.as_usize() + width.size() <= w.base.as_usize() + w.size
            {
                let offset = addr.as_usize() - w.base.as_usize();
                return Some((&self.instances[w.slot], offset));
            }
        }
        None
    }

    /// Records `cpu` as the physical home of `vm`'s vCPU for every instance
    /// it serves. Invoked once per vCPU as it first runs.
    pub fn assign_cpu(&self, vm: VmId, cpu: CpuId) {
        for instance in &self.instances {
            if instance.frontend_vm == vm {
                instance.state.lock().frontend_cpu = Some(cpu);
            } else if instance.backend_vm == vm {
                instance.state.lock().backend_cpu = Some(cpu);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }
}

//! The bridge singleton: boot-time binding and the hypervisor-facing entry
//! points.

use crate::{
    config::VmVirtIoConfig,
    frontend::MmioAccess,
    hal::{
        BridgeHal,
        cpu::{CpuId, VmId},
    },
    instance::InstanceTable,
    msg::CpuMessage,
};

static BRIDGE: spin::Once<VirtIoBridge> = spin::Once::new();

/// Owner of the instance registry. One per hypervisor, built at boot.
#[derive(Debug)]
pub struct VirtIoBridge {
    table: InstanceTable,
}

impl VirtIoBridge {
    /// Builds the registry from the per-VM device lists, enforcing the
    /// 1-to-1 frontend/backend pairing.
    pub fn build(configs: &[VmVirtIoConfig]) -> anyhow::Result<Self> {
        let table = InstanceTable::build(configs)?;
        Ok(Self { table })
    }

    /// Read access to the instance registry, e.g. for device-tree
    /// generation or a debug console.
    pub fn table(&self) -> &InstanceTable {
        &self.table
    }

    /// Records `cpu` as the physical home of every bound vCPU of `vm`.
    /// Called once per vCPU as it first runs.
    pub fn assign_cpu(&self, vm: VmId, cpu: CpuId) {
        self.table.assign_cpu(vm, cpu);
    }

    /// Number of bound instances.
    pub fn instances(&self) -> usize {
        self.table.len()
    }
}

fn get() -> &'static VirtIoBridge {
    BRIDGE.get().expect("virtio bridge not initialised")
}

/// Builds the global bridge and registers the message dispatcher.
///
/// Configuration errors are fatal; they are returned for the embedder to
/// abort on, and the partially built registry is dropped on the way out.
pub fn init<H: BridgeHal>(configs: &[VmVirtIoConfig]) -> anyhow::Result<()> {
    let bridge = VirtIoBridge::build(configs)?;
    info!("virtio bridge ready, {} instances bound", bridge.instances());
    BRIDGE.call_once(|| bridge);
    H::register_message_handler(dispatch::<H>);
    Ok(())
}

fn dispatch<H: BridgeHal>(msg: CpuMessage) {
    get().handle_cpu_message::<H>(msg);
}

/// Trap-path entry; see [`VirtIoBridge::handle_mmio`].
pub fn handle_mmio<H: BridgeHal>(vcpu: &H::VCpu, access: &MmioAccess) -> bool {
    get().handle_mmio::<H>(vcpu, access)
}

/// Hypercall entry; see [`VirtIoBridge::handle_hypercall`].
pub fn handle_hypercall<H: BridgeHal>(vcpu: &H::VCpu) -> isize {
    get().handle_hypercall::<H>(vcpu)
}

/// Per-vCPU boot hook; see [`VirtIoBridge::assign_cpu`].
pub fn assign_cpu(vm: VmId, cpu: CpuId) {
    get().assign_cpu(vm, cpu);
}

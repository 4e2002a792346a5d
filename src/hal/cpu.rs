use derive_more::From;

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
#[debug("CPU({_0})")]
#[display("CPU({_0})")]
#[repr(transparent)]
pub struct CpuId(usize);

impl CpuId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> usize {
        self.0
    }
}

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
#[debug("VM({_0})")]
#[display("VM({_0})")]
#[repr(transparent)]
pub struct VmId(usize);

impl VmId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> usize {
        self.0
    }
}

/// A virtual interrupt line number.
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
#[debug("IRQ({_0})")]
#[display("IRQ({_0})")]
#[repr(transparent)]
pub struct IrqNum(u32);

impl IrqNum {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Interprets the configuration encoding where 0 means "no line bound".
    pub const fn from_config(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

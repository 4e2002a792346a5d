//! Unit tests for the virtio bridge.
//!
//! This module contains unit tests for boot binding, the request tables,
//! and the trap/hypercall/message round trips against a mock host.

mod mock;

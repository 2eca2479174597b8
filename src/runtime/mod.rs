//! # Orion runtime
//!
//! The stack-based virtual machine: call frames, the fetch/decode/dispatch
//! loop, and runtime error reporting.

pub mod frame;
pub mod runtime_error;
pub mod vm;

pub use vm::{Vm, VmConfig};

//! # Orion language core
//!
//! This module defines the data the rest of the toolchain agrees on: the
//! abstract syntax tree produced by the parser, the runtime [`value::Value`]
//! model shared by the constant pool and the VM, and the built-in function
//! registry.

pub mod ast;
pub mod builtins;
pub mod value;

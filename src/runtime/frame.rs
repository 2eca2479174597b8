use std::rc::Rc;

use crate::bytecode::op::Instructions;
use crate::lang::value::Closure;

/// An activation record: one in-progress call.
///
/// `ip` starts at -1 and is pre-incremented at the top of every dispatch
/// iteration, which lets jumps uniformly set `ip = target - 1`.
#[derive(Debug)]
pub struct Frame {
    closure: Rc<Closure>,
    pub ip: i64,
    /// Stack index where this frame's locals begin. The callee's arguments
    /// already occupy the first `num_parameters` local slots.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn closure(&self) -> &Rc<Closure> {
        &self.closure
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::compile::Bytecode;
use crate::bytecode::op::{definition, read_u16, read_u8, Op};
use crate::lang::builtins;
use crate::lang::value::{Closure, CompiledFunction, HashPair, Value};
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{
    call_depth_exceeded, calling_non_function, division_by_zero, globals_exhausted,
    index_not_supported, stack_overflow, stack_underflow, unknown_opcode, unknown_operator,
    unsupported_binary_types, unsupported_negation, unusable_hash_key, wrong_arity, RuntimeError,
};

/// Resource limits for one VM instance.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Value stack depth, in slots.
    pub stack_size: usize,
    /// Size of the globals store. `OpSetGlobal` operands are 16 bits, so
    /// anything past 65536 is unreachable.
    pub globals_size: usize,
    /// Call frame depth.
    pub max_frames: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 2048,
            globals_size: 65536,
            max_frames: 1024,
        }
    }
}

/// The stack-based virtual machine.
///
/// One instance owns its stack, globals, and frame stack exclusively;
/// running multiple programs concurrently requires one VM each, though the
/// compiled `Bytecode` may be shared.
pub struct Vm {
    constants: Vec<Value>,

    /// Preallocated value stack. `sp` points one past the top, so the top
    /// of the stack is `stack[sp - 1]` and the most recently popped value
    /// stays readable at `stack[sp]`.
    stack: Vec<Value>,
    sp: usize,

    globals: Vec<Value>,

    frames: Vec<Frame>,
    max_frames: usize,
}

impl Vm {
    /// Wraps the top-level instructions in a main frame, ready to run.
    pub fn new(bytecode: &Bytecode) -> Self {
        Vm::with_state(bytecode, None, VmConfig::default())
    }

    pub fn with_config(bytecode: &Bytecode, config: VmConfig) -> Self {
        Vm::with_state(bytecode, None, config)
    }

    /// Creates a VM that reuses an existing globals store. The REPL uses
    /// this to carry global bindings across lines.
    pub fn with_globals(bytecode: &Bytecode, globals: Vec<Value>) -> Self {
        Vm::with_state(bytecode, Some(globals), VmConfig::default())
    }

    fn with_state(bytecode: &Bytecode, globals: Option<Vec<Value>>, config: VmConfig) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions.clone(),
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(config.max_frames);
        frames.push(Frame::new(main_closure, 0));

        Vm {
            constants: bytecode.constants.clone(),
            stack: vec![Value::Null; config.stack_size],
            sp: 0,
            globals: globals.unwrap_or_else(|| vec![Value::Null; config.globals_size]),
            frames,
            max_frames: config.max_frames,
        }
    }

    /// The result slot: the value most recently popped off the stack. After
    /// a successful run this is the value of the program's last expression
    /// statement.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// Hands the globals store back for the next run.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The fetch/decode/dispatch loop. Runs until the main frame exhausts
    /// its instructions or an error poisons the VM.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as i64 - 1 {
            self.current_frame_mut().ip += 1;

            let ip = self.current_frame().ip as usize;
            let closure = Rc::clone(self.current_frame().closure());
            let ins = &closure.func.instructions;

            let op = Op::from_byte(ins[ip]).ok_or_else(|| unknown_opcode(ins[ip]))?;

            match op {
                Op::Constant => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                Op::Pop => {
                    self.pop()?;
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    self.execute_binary_operation(op)?;
                }

                Op::True => self.push(Value::Boolean(true))?,
                Op::False => self.push(Value::Boolean(false))?,
                Op::Null => self.push(Value::Null)?,

                Op::Equal | Op::NotEqual | Op::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                Op::Bang => {
                    let operand = self.pop()?;
                    let negated = matches!(operand, Value::Boolean(false) | Value::Null);
                    self.push(Value::Boolean(negated))?;
                }

                Op::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(value) => self.push(Value::Integer(value.wrapping_neg()))?,
                        other => return Err(unsupported_negation(other.type_name())),
                    }
                }

                Op::Jump => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    // Set just before the target; the pre-increment lands on it.
                    self.current_frame_mut().ip = target - 1;
                }

                Op::JumpNotTruthy => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop()?;
                    if !is_truthy(&condition) {
                        self.current_frame_mut().ip = target - 1;
                    }
                }

                Op::SetGlobal => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let value = self.pop()?;
                    let slot = self
                        .globals
                        .get_mut(index)
                        .ok_or_else(|| globals_exhausted(index))?;
                    *slot = value;
                }

                Op::GetGlobal => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let value = self
                        .globals
                        .get(index)
                        .ok_or_else(|| globals_exhausted(index))?
                        .clone();
                    self.push(value)?;
                }

                Op::Array => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }

                Op::Hash => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                Op::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                Op::Call => {
                    let num_args = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    self.execute_call(num_args)?;
                }

                Op::ReturnValue => {
                    let return_value = self.pop()?;

                    let frame = self.pop_frame()?;
                    // Discard the frame's locals and the callee slot.
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }

                Op::Return => {
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;

                    self.push(Value::Null)?;
                }

                Op::SetLocal => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base_pointer + index] = value;
                }

                Op::GetLocal => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }

                Op::GetBuiltin => {
                    let index = read_u8(&ins[ip + 1..]);
                    self.current_frame_mut().ip += 1;

                    self.push(Value::Builtin(index))?;
                }

                Op::Closure => {
                    let const_index = read_u16(&ins[ip + 1..]) as usize;
                    let num_free = read_u8(&ins[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;

                    self.push_closure(const_index, num_free)?;
                }

                Op::GetFree => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let value = closure.free[index].clone();
                    self.push(value)?;
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Frames
    // =========================================================================

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is empty")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.max_frames {
            return Err(call_depth_exceeded(self.max_frames));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::new("frame stack underflow"))?;
        if self.frames.is_empty() {
            return Err(RuntimeError::new("return outside of a function"));
        }
        Ok(frame)
    }

    // =========================================================================
    // Stack
    // =========================================================================

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= self.stack.len() {
            return Err(stack_overflow());
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(stack_underflow());
        }
        let value = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        Ok(value)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn execute_binary_operation(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.execute_binary_integer_operation(op, *l, *r)
            }
            (Value::String(l), Value::String(r)) => {
                if op != Op::Add {
                    return Err(RuntimeError::new(&format!(
                        "unknown string operator: {}",
                        definition(op).name
                    )));
                }
                let mut concatenated = l.as_ref().clone();
                concatenated.push_str(r);
                self.push(Value::String(Rc::new(concatenated)))
            }
            _ => Err(unsupported_binary_types(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        op: Op,
        left: i64,
        right: i64,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            Op::Add => left.wrapping_add(right),
            Op::Sub => left.wrapping_sub(right),
            Op::Mul => left.wrapping_mul(right),
            Op::Div => {
                if right == 0 {
                    return Err(division_by_zero());
                }
                left / right
            }
            _ => {
                return Err(RuntimeError::new(&format!(
                    "unknown integer operator: {}",
                    definition(op).name
                )))
            }
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                Op::Equal => l == r,
                Op::NotEqual => l != r,
                Op::GreaterThan => l > r,
                _ => {
                    return Err(unknown_operator(
                        definition(op).name,
                        left.type_name(),
                        right.type_name(),
                    ))
                }
            };
            return self.push(Value::Boolean(result));
        }

        match op {
            Op::Equal => {
                let equal = values_equal(&left, &right);
                self.push(Value::Boolean(equal))
            }
            Op::NotEqual => {
                let equal = values_equal(&left, &right);
                self.push(Value::Boolean(!equal))
            }
            _ => Err(unknown_operator(
                definition(op).name,
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, RuntimeError> {
        let mut pairs = IndexMap::new();

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or_else(|| unusable_hash_key(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let max = elements.len() as i64 - 1;
                // Out of range is not an error: it yields null.
                if *i < 0 || *i > max {
                    return self.push(Value::Null);
                }
                let value = elements[*i as usize].clone();
                self.push(value)
            }
            (Value::Hash(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| unusable_hash_key(index.type_name()))?;
                match pairs.get(&key) {
                    Some(pair) => {
                        let value = pair.value.clone();
                        self.push(value)
                    }
                    None => self.push(Value::Null),
                }
            }
            _ => Err(index_not_supported(left.type_name())),
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(index) => self.call_builtin(index, num_args),
            other => Err(calling_non_function(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RuntimeError> {
        if num_args != closure.func.num_parameters {
            return Err(wrong_arity(closure.func.num_parameters, num_args));
        }

        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;
        if base_pointer + num_locals > self.stack.len() {
            return Err(stack_overflow());
        }

        self.push_frame(Frame::new(closure, base_pointer))?;
        // Reserve the local slots; the arguments already occupy the first
        // `num_args` of them.
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(&mut self, index: u8, num_args: usize) -> Result<(), RuntimeError> {
        let builtin = builtins::get(index)
            .ok_or_else(|| RuntimeError::new(&format!("builtin {} undefined", index)))?;

        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args).map_err(|message| RuntimeError::new(&message))?;

        // Discard the arguments and the callee slot.
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let func = match constant {
            Value::CompiledFunction(func) => func,
            other => {
                return Err(RuntimeError::new(&format!(
                    "not a function: {}",
                    other.type_name()
                )))
            }
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }
}

/// Exactly `false` and `null` are non-truthy.
fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Boolean(false) | Value::Null)
}

/// Equality for non-integer comparisons. Booleans and null compare by
/// value (equivalent to the canonical-singleton identity of the reference
/// semantics); heap values compare by reference identity, so two distinct
/// allocations are never equal even when structurally alike.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Null, Value::Null) => true,
        (Value::String(l), Value::String(r)) => Rc::ptr_eq(l, r),
        (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
        (Value::Hash(l), Value::Hash(r)) => Rc::ptr_eq(l, r),
        (Value::CompiledFunction(l), Value::CompiledFunction(r)) => Rc::ptr_eq(l, r),
        (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
        (Value::Builtin(l), Value::Builtin(r)) => l == r,
        _ => false,
    }
}

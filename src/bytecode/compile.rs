use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{make, Instructions, Op};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::lang::ast::{BlockStatement, Expression, Program, Statement};
use crate::lang::value::{CompiledFunction, Value};

/// The compiler's output: a flat instruction stream for the top level plus
/// the constant pool shared by every function compiled from the program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// An instruction the compiler just emitted: enough to peek at and rewrite
/// the tail of the current instruction stream.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// Emission state for one function body (or the top level). The compiler
/// keeps a stack of these; `emit` always appends to the top one.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// Single-pass compiler from the syntax tree to bytecode.
///
/// Walks the tree, appends instructions to the current compilation scope,
/// interns constants, and assigns symbol indices. Jumps are emitted with a
/// placeholder operand and backpatched once the target position is known.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::with_state(SymbolTable::with_builtins(), Vec::new())
    }

    /// Creates a compiler that continues from an existing symbol table and
    /// constant pool. The REPL uses this to carry bindings across lines.
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Returns the outermost scope's instructions and the constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Hands the symbol table and constant pool back for the next
    /// compilation unit.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Op::Pop, &[]);
            }

            // The value is compiled before the name is defined, so
            // `let x = x` refers to an outer `x`, never to itself.
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                match symbol.scope {
                    SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
            }

            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Op::Constant, &[index]);
            }

            Expression::StringLiteral(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())));
                self.emit(Op::Constant, &[index]);
            }

            Expression::Boolean(value) => {
                if *value {
                    self.emit(Op::True, &[]);
                } else {
                    self.emit(Op::False, &[]);
                }
            }

            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name))?;
                self.load_symbol(&symbol);
            }

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Op::Bang, &[]),
                    "-" => self.emit(Op::Minus, &[]),
                    _ => return Err(CompileError::unknown_operator(operator)),
                };
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => {
                // No `<` opcode: compile the operands swapped and compare
                // with `>` instead.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Op::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator.as_str() {
                    "+" => self.emit(Op::Add, &[]),
                    "-" => self.emit(Op::Sub, &[]),
                    "*" => self.emit(Op::Mul, &[]),
                    "/" => self.emit(Op::Div, &[]),
                    ">" => self.emit(Op::GreaterThan, &[]),
                    "==" => self.emit(Op::Equal, &[]),
                    "!=" => self.emit(Op::NotEqual, &[]),
                    _ => return Err(CompileError::unknown_operator(operator)),
                };
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                // Placeholder operand, backpatched below.
                let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(Op::Jump, &[9999]);

                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump_pos, after_alternative);
            }

            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }

            Expression::HashLiteral(pairs) => {
                // Source order is arbitrary; sorting by the key's textual
                // form makes the emitted bytes deterministic.
                let mut pairs: Vec<&(Expression, Expression)> = pairs.iter().collect();
                pairs.sort_by_key(|pair| pair.0.to_string());

                for pair in &pairs {
                    self.compile_expression(&pair.0)?;
                    self.compile_expression(&pair.1)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }

            Expression::FunctionLiteral { parameters, body } => {
                self.enter_scope();

                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                // A body ending in an expression statement returns that
                // value; an empty (or non-value) tail returns null.
                if self.last_instruction_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols().to_vec();
                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();

                // Load each captured variable in the enclosing scope; the
                // VM pops them into the closure's free vector.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));
                self.emit(Op::Closure, &[index, free_symbols.len()]);
            }

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
        };
    }

    // =========================================================================
    // Emission primitives
    // =========================================================================

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compiler scope stack is empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes
            .last_mut()
            .expect("compiler scope stack is empty")
    }

    /// Appends `value` to the constant pool and returns its index. Indices
    /// are stable: constants are never removed or reordered.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Encodes and appends an instruction to the current scope, returning
    /// the byte position it starts at.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        matches!(
            self.current_scope().last_instruction,
            Some(last) if last.opcode == op
        )
    }

    /// Truncates the last emitted instruction. Used after compiling a
    /// branch body that ends in an expression statement, so `if` yields the
    /// branch value instead of popping it.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Re-encodes the instruction at `position` with a new operand. The new
    /// encoding has the same width as the old one, so an in-place overwrite
    /// is safe. Used for jump backpatching.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let byte = self.current_scope().instructions[position];
        let op = Op::from_byte(byte).expect("patch position does not hold an opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    /// Rewrites a trailing `OpPop` into `OpReturnValue`, making the last
    /// expression of a function body its return value.
    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current_scope().last_instruction {
            let new_instruction = make(Op::ReturnValue, &[]);
            self.replace_instruction(last.position, &new_instruction);
            self.current_scope_mut().last_instruction = Some(EmittedInstruction {
                opcode: Op::ReturnValue,
                position: last.position,
            });
        }
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclose(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leaving a scope never entered");
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer();
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

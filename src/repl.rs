use std::io::{self, BufRead, Write};

use crate::bytecode::symbol_table::SymbolTable;
use crate::bytecode::Compiler;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::lang::value::Value;
use crate::runtime::{Vm, VmConfig};

pub const PROMPT: &str = ">> ";

/// The read-compile-run loop.
///
/// Each line is lexed, parsed, compiled, and executed, and the value of its
/// last expression is printed. The symbol table, constant pool, and globals
/// store persist across lines, so `let` bindings from earlier inputs stay
/// visible. Errors are printed and the session continues.
pub fn start(input: &mut dyn BufRead, output: &mut dyn Write) -> io::Result<()> {
    let mut symbol_table = SymbolTable::with_builtins();
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; VmConfig::default().globals_size];

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }

        let tokens = match Lexer::new(&line).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };

        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };

        let mut compiler = Compiler::with_state(symbol_table, constants);
        if let Err(e) = compiler.compile_program(&program) {
            writeln!(output, "{}", e)?;
            (symbol_table, constants) = compiler.into_state();
            continue;
        }
        let bytecode = compiler.bytecode();
        (symbol_table, constants) = compiler.into_state();

        let mut vm = Vm::with_globals(&bytecode, globals);
        match vm.run() {
            Ok(()) => {
                writeln!(output, "{}", vm.last_popped())?;
            }
            Err(e) => {
                writeln!(output, "{}", e)?;
            }
        }
        globals = vm.into_globals();
    }
}

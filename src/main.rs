mod bytecode;
mod frontend;
mod lang;
mod repl;
mod runtime;

use std::{env, fs, io, path::Path, process};

use crate::bytecode::disasm::disassemble;
use crate::bytecode::Compiler;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::runtime::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let run_repl = args.iter().any(|a| a == "-repl" || a == "--repl");
    let show_bytecode = args.iter().any(|a| a == "--bc" || a == "--bytecode");
    let dump_json = args.iter().any(|a| a == "--bc-json");

    // The file to execute: `-path FILE` or the first non-flag argument.
    let mut filename: Option<String> = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-path" | "--path" => {
                filename = iter.next().cloned();
            }
            "-repl" | "--repl" | "--bc" | "--bytecode" | "--bc-json" => {}
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other if !other.starts_with('-') => {
                if filename.is_none() {
                    filename = Some(other.to_string());
                }
            }
            other => {
                eprintln!("unknown flag: {}", other);
                print_usage();
                process::exit(2);
            }
        }
    }

    if run_repl {
        println!("This is the Orion programming language!");
        println!("Feel free to type in commands");

        let stdin = io::stdin();
        let stdout = io::stdout();
        if let Err(e) = repl::start(&mut stdin.lock(), &mut stdout.lock()) {
            eprintln!("repl error: {}", e);
            process::exit(1);
        }
        return;
    }

    match filename {
        Some(filename) => {
            ensure_extension(&filename);
            match fs::read_to_string(&filename) {
                Ok(source) => run_file(&source, show_bytecode, dump_json),
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    process::exit(1);
                }
            }
        }
        None => print_usage(),
    }
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("or") {
        eprintln!("Error: expected a .or file, got {}", filename);
        process::exit(1);
    }
}

fn print_usage() {
    println!("ORION - Bytecode-compiled scripting language");
    println!();
    println!("Usage:");
    println!("  orion <file.or>           Compile and run a program");
    println!("  orion -path <file.or>     Same, flag form");
    println!("  orion -repl               Start interactive REPL");
    println!("  orion --bc <file.or>      Print disassembly before running");
    println!("  orion --bc-json <file.or> Print the compiled bytecode as JSON");
    println!("  orion --help, -h          Show this help");
}

/// Compiles and runs a source file. Parse, compile, and runtime errors are
/// printed on standard output and exit nonzero.
fn run_file(source: &str, show_bytecode: bool, dump_json: bool) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    let mut compiler = Compiler::new();
    if let Err(e) = compiler.compile_program(&program) {
        println!("{}", e);
        process::exit(1);
    }
    let bytecode = compiler.bytecode();

    if show_bytecode {
        println!("{}", disassemble(&bytecode.instructions));
    }

    if dump_json {
        match serde_json::to_string_pretty(&bytecode) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                println!("{}", e);
                process::exit(1);
            }
        }
    }

    let mut vm = Vm::new(&bytecode);
    if let Err(e) = vm.run() {
        println!("{}", e);
        process::exit(1);
    }
}

use std::fmt::Write;

use crate::bytecode::op::{lookup, read_operands, Definition, Instructions};

/// Renders an instruction stream as one instruction per line:
/// `NNNN OpName [operand...]`, positions in decimal byte offsets.
/// Undecodable bytes produce an `ERROR:` line and decoding resumes at the
/// next byte.
pub fn disassemble(ins: &Instructions) -> String {
    let mut out = String::new();

    let mut i = 0;
    while i < ins.len() {
        let def = match lookup(ins[i]) {
            Ok(def) => def,
            Err(err) => {
                let _ = writeln!(out, "ERROR: {}", err);
                i += 1;
                continue;
            }
        };

        let (operands, read) = read_operands(def, &ins[i + 1..]);
        let _ = writeln!(out, "{:04} {}", i, fmt_instruction(def, &operands));

        i += 1 + read;
    }

    out
}

fn fmt_instruction(def: &Definition, operands: &[usize]) -> String {
    let operand_count = def.operand_widths.len();

    if operands.len() != operand_count {
        return format!(
            "ERROR: operand len {} does not match defined {}",
            operands.len(),
            operand_count
        );
    }

    match operand_count {
        0 => def.name.to_string(),
        1 => format!("{} {}", def.name, operands[0]),
        2 => format!("{} {} {}", def.name, operands[0], operands[1]),
        _ => format!("ERROR: unhandled operand count for {}", def.name),
    }
}

impl std::fmt::Display for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", disassemble(self))
    }
}

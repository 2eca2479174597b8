use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

/// A flat instruction stream: `opcode (1 byte) || operands`, with per-opcode
/// operand widths and big-endian operand encoding. Positions are byte
/// offsets; jump targets are absolute byte positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl std::ops::Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::DerefMut for Instructions {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }
}

/// The closed opcode list. Discriminants are the wire encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Push `constants[operand]`.
    Constant = 0,

    // Arithmetic. Pop right, pop left, push the result.
    Add,
    Sub,
    Mul,
    Div,

    /// Pop the topmost stack element.
    Pop,

    // Canonical singletons.
    True,
    False,
    Null,

    // Comparison. There is no `<` opcode: the compiler swaps the operands
    // of `<` and emits `GreaterThan`.
    Equal,
    NotEqual,
    GreaterThan,

    /// Integer negation.
    Minus,
    /// Logical negation by truthiness.
    Bang,

    /// Unconditional jump to an absolute byte position.
    Jump,
    /// Pop the condition; jump if it is not truthy.
    JumpNotTruthy,

    SetGlobal,
    GetGlobal,

    /// Build an array from the top `operand` stack values.
    Array,
    /// Build a hash from the top `operand` stack values (keys and values
    /// interleaved, so the operand is twice the pair count).
    Hash,
    /// Pop index and collection, push the element.
    Index,

    /// Call the callee sitting below the `operand` arguments.
    Call,
    /// Return the popped value to the calling frame.
    ReturnValue,
    /// Return null to the calling frame.
    Return,

    SetLocal,
    GetLocal,

    /// Push the built-in with the given registration index.
    GetBuiltin,

    /// Wrap `constants[operand0]` and the top `operand1` stack values into
    /// a closure.
    Closure,
    /// Push the current closure's captured variable.
    GetFree,
}

impl Op {
    /// Decodes a raw byte, for the disassembler and the VM dispatch loop.
    pub fn from_byte(byte: u8) -> Option<Op> {
        match byte {
            0 => Some(Op::Constant),
            1 => Some(Op::Add),
            2 => Some(Op::Sub),
            3 => Some(Op::Mul),
            4 => Some(Op::Div),
            5 => Some(Op::Pop),
            6 => Some(Op::True),
            7 => Some(Op::False),
            8 => Some(Op::Null),
            9 => Some(Op::Equal),
            10 => Some(Op::NotEqual),
            11 => Some(Op::GreaterThan),
            12 => Some(Op::Minus),
            13 => Some(Op::Bang),
            14 => Some(Op::Jump),
            15 => Some(Op::JumpNotTruthy),
            16 => Some(Op::SetGlobal),
            17 => Some(Op::GetGlobal),
            18 => Some(Op::Array),
            19 => Some(Op::Hash),
            20 => Some(Op::Index),
            21 => Some(Op::Call),
            22 => Some(Op::ReturnValue),
            23 => Some(Op::Return),
            24 => Some(Op::SetLocal),
            25 => Some(Op::GetLocal),
            26 => Some(Op::GetBuiltin),
            27 => Some(Op::Closure),
            28 => Some(Op::GetFree),
            _ => None,
        }
    }
}

/// Per-opcode encoding metadata: the printable name and the width in bytes
/// of each operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

/// Opcode definitions, indexed by discriminant.
static DEFINITIONS: [Definition; 29] = [
    Definition { name: "OpConstant", operand_widths: &[2] },
    Definition { name: "OpAdd", operand_widths: &[] },
    Definition { name: "OpSub", operand_widths: &[] },
    Definition { name: "OpMul", operand_widths: &[] },
    Definition { name: "OpDiv", operand_widths: &[] },
    Definition { name: "OpPop", operand_widths: &[] },
    Definition { name: "OpTrue", operand_widths: &[] },
    Definition { name: "OpFalse", operand_widths: &[] },
    Definition { name: "OpNull", operand_widths: &[] },
    Definition { name: "OpEqual", operand_widths: &[] },
    Definition { name: "OpNotEqual", operand_widths: &[] },
    Definition { name: "OpGreaterThan", operand_widths: &[] },
    Definition { name: "OpMinus", operand_widths: &[] },
    Definition { name: "OpBang", operand_widths: &[] },
    Definition { name: "OpJump", operand_widths: &[2] },
    Definition { name: "OpJumpNotTruthy", operand_widths: &[2] },
    Definition { name: "OpSetGlobal", operand_widths: &[2] },
    Definition { name: "OpGetGlobal", operand_widths: &[2] },
    Definition { name: "OpArray", operand_widths: &[2] },
    Definition { name: "OpHash", operand_widths: &[2] },
    Definition { name: "OpIndex", operand_widths: &[] },
    Definition { name: "OpCall", operand_widths: &[1] },
    Definition { name: "OpReturnValue", operand_widths: &[] },
    Definition { name: "OpReturn", operand_widths: &[] },
    Definition { name: "OpSetLocal", operand_widths: &[1] },
    Definition { name: "OpGetLocal", operand_widths: &[1] },
    Definition { name: "OpGetBuiltin", operand_widths: &[1] },
    Definition { name: "OpClosure", operand_widths: &[2, 1] },
    Definition { name: "OpGetFree", operand_widths: &[1] },
];

/// Returns the encoding metadata for an opcode.
pub fn definition(op: Op) -> &'static Definition {
    &DEFINITIONS[op as usize]
}

/// Looks up a raw byte, for decoding instruction streams.
pub fn lookup(byte: u8) -> Result<&'static Definition, String> {
    Op::from_byte(byte)
        .map(definition)
        .ok_or_else(|| format!("opcode {} undefined", byte))
}

/// Encodes an instruction: the opcode byte followed by each operand in
/// big-endian at its declared width. Operands beyond the declared widths
/// are ignored; missing operands are a programmer error and encode as
/// a short instruction.
pub fn make(op: Op, operands: &[usize]) -> Vec<u8> {
    let def = definition(op);

    let instruction_len = 1 + def.operand_widths.iter().sum::<usize>();
    let mut instruction = Vec::with_capacity(instruction_len);
    instruction.push(op as u8);

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => {}
        }
    }

    instruction
}

/// Decodes the operands of an instruction, given its definition and the
/// bytes following the opcode. Returns the operands and the number of bytes
/// read. The caller guarantees the slice is long enough (the compiler only
/// emits well-formed instructions).
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(&ins[offset..]) as usize),
            1 => operands.push(read_u8(&ins[offset..]) as usize),
            _ => {}
        }
        offset += width;
    }

    (operands, offset)
}

/// Reads a big-endian `u16` from the start of the slice.
pub fn read_u16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}

/// Reads a `u8` from the start of the slice.
pub fn read_u8(ins: &[u8]) -> u8 {
    ins[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make() {
        let cases: [(Op, &[usize], &[u8]); 4] = [
            (Op::Constant, &[65534], &[Op::Constant as u8, 255, 254]),
            (Op::Add, &[], &[Op::Add as u8]),
            (Op::GetLocal, &[255], &[Op::GetLocal as u8, 255]),
            (Op::Closure, &[65534, 255], &[Op::Closure as u8, 255, 254, 255]),
        ];

        for (op, operands, expected) in cases {
            assert_eq!(make(op, operands), expected, "make({:?})", op);
        }
    }

    #[test]
    fn test_read_operands_round_trip() {
        let cases: [(Op, &[usize]); 4] = [
            (Op::Constant, &[65535]),
            (Op::GetLocal, &[255]),
            (Op::Closure, &[65535, 255]),
            (Op::Jump, &[0]),
        ];

        for (op, operands) in cases {
            let instruction = make(op, operands);
            let def = definition(op);

            let (read, bytes_read) = read_operands(def, &instruction[1..]);
            assert_eq!(bytes_read, instruction.len() - 1, "bytes read for {:?}", op);
            assert_eq!(read, operands, "operands for {:?}", op);
        }
    }

    #[test]
    fn test_round_trip_every_opcode() {
        // For every opcode, pick the maximum value of each operand width and
        // check encode/decode agree on bytes and values.
        for byte in 0..=u8::MAX {
            let op = match Op::from_byte(byte) {
                Some(op) => op,
                None => continue,
            };
            let def = definition(op);

            let operands: Vec<usize> = def
                .operand_widths
                .iter()
                .map(|w| match w {
                    2 => u16::MAX as usize,
                    _ => u8::MAX as usize,
                })
                .collect();

            let instruction = make(op, &operands);
            assert_eq!(
                instruction.len(),
                1 + def.operand_widths.iter().sum::<usize>(),
                "encoded length for {}",
                def.name
            );

            let (read, bytes_read) = read_operands(def, &instruction[1..]);
            assert_eq!(read, operands, "round trip for {}", def.name);
            assert_eq!(1 + bytes_read, instruction.len(), "offset for {}", def.name);
        }
    }

    #[test]
    fn test_from_byte_rejects_unknown() {
        assert_eq!(Op::from_byte(29), None);
        assert_eq!(Op::from_byte(255), None);
        assert!(lookup(255).is_err());
    }

    #[test]
    fn test_from_byte_inverts_discriminant() {
        for byte in 0..29u8 {
            let op = Op::from_byte(byte).expect("discriminant should decode");
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn test_read_u16_is_big_endian() {
        assert_eq!(read_u16(&[1, 0]), 256);
        assert_eq!(read_u16(&[255, 254]), 65534);
    }
}

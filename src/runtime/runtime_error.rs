/// An error raised while the VM executes bytecode.
///
/// Runtime errors are fatal for the current run: the dispatch loop stops
/// and the VM state is considered poisoned.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(msg: &str) -> Self {
        RuntimeError {
            message: msg.to_string(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

pub fn stack_overflow() -> RuntimeError {
    RuntimeError::new("stack overflow")
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("stack underflow")
}

pub fn call_depth_exceeded(max_frames: usize) -> RuntimeError {
    RuntimeError::new(&format!("call depth limit exceeded ({})", max_frames))
}

pub fn globals_exhausted(index: usize) -> RuntimeError {
    RuntimeError::new(&format!("global index {} out of range", index))
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn unknown_opcode(byte: u8) -> RuntimeError {
    RuntimeError::new(&format!("opcode {} undefined", byte))
}

pub fn unsupported_binary_types(left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(&format!(
        "unsupported types for binary operation: {} {}",
        left, right
    ))
}

pub fn unknown_operator(op_name: &str, left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(&format!("unknown operator: {} ({} {})", op_name, left, right))
}

pub fn unsupported_negation(operand: &str) -> RuntimeError {
    RuntimeError::new(&format!("unsupported type for negation: {}", operand))
}

pub fn unusable_hash_key(key: &str) -> RuntimeError {
    RuntimeError::new(&format!("unusable as hash key: {}", key))
}

pub fn index_not_supported(left: &str) -> RuntimeError {
    RuntimeError::new(&format!("index operator not supported: {}", left))
}

pub fn calling_non_function(callee: &str) -> RuntimeError {
    RuntimeError::new(&format!(
        "calling non-function and non-built-in: {}",
        callee
    ))
}

pub fn wrong_arity(want: usize, got: usize) -> RuntimeError {
    RuntimeError::new(&format!(
        "wrong number of arguments: want={}, got={}",
        want, got
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_runtime_error() {
        let err = RuntimeError::new("boom");
        assert_eq!(err.to_string(), "runtime error: boom");
    }

    #[test]
    fn test_constructors() {
        assert_eq!(stack_overflow().message, "stack overflow");
        assert_eq!(
            unsupported_binary_types("INTEGER", "STRING").message,
            "unsupported types for binary operation: INTEGER STRING"
        );
        assert_eq!(
            wrong_arity(2, 3).message,
            "wrong number of arguments: want=2, got=3"
        );
        assert_eq!(
            unusable_hash_key("ARRAY").message,
            "unusable as hash key: ARRAY"
        );
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = division_by_zero();
        let _: &dyn std::error::Error = &err;
    }
}

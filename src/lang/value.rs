use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bytecode::op::Instructions;
use crate::lang::builtins;

/// Runtime value in the Orion language.
///
/// Values are the only data that can exist on the VM stack, in the globals
/// store, and in the constant pool. Heap-owning variants are `Rc`-wrapped so
/// the stack holds cheap handles rather than copies of their containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),

    /// Boolean value.
    Boolean(bool),

    /// The null value.
    Null,

    /// UTF-8 string value.
    String(Rc<String>),

    /// Array literal value: `[1, 2, 3]`.
    Array(Rc<Vec<Value>>),

    /// Hash literal value: `{"a": 1}`.
    ///
    /// Pairs are keyed by [`HashKey`] and keep their insertion order, so
    /// printing a hash is deterministic for a given construction order.
    Hash(Rc<IndexMap<HashKey, HashPair>>),

    /// A compiled function body. Lives in the constant pool; the VM only
    /// ever executes it through a [`Closure`].
    CompiledFunction(Rc<CompiledFunction>),

    /// A compiled function paired with its captured free variables.
    Closure(Rc<Closure>),

    /// A built-in function, referenced by its fixed registration index.
    Builtin(u8),
}

impl Value {
    /// Type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
        }
    }

    /// Returns the hash key for this value, or `None` if the value cannot
    /// be used as a hash key. Only integers, booleans, and strings hash.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey {
                kind: HashKind::Integer,
                value: *n as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: HashKind::Boolean,
                value: *b as u64,
            }),
            Value::String(s) => {
                let mut hasher = DefaultHasher::new();
                s.as_bytes().hash(&mut hasher);
                Some(HashKey {
                    kind: HashKind::String,
                    value: hasher.finish(),
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    /// Format a value using Orion surface syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(_) => write!(f, "fn<compiled>"),
            Value::Closure(_) => write!(f, "fn<closure>"),
            Value::Builtin(index) => {
                write!(f, "builtin {}", builtins::name(*index).unwrap_or("?"))
            }
        }
    }
}

/// The type half of a [`HashKey`]. Distinguishes keys that share the same
/// 64-bit hash across types (`1` and `true` hash to the same number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashKind {
    Integer,
    Boolean,
    String,
}

/// A `(type tag, 64-bit hash)` pair identifying a hash map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashKey {
    pub kind: HashKind,
    pub value: u64,
}

/// A key/value entry of a hash. The original key value is kept alongside the
/// value so hashes can be printed and iterated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function body lowered to bytecode, together with the frame layout the
/// VM needs to execute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function plus the values of its free variables, captured at
/// the point the closure was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::String(Rc::new("hello".to_string())).to_string(),
            "hello"
        );
    }

    #[test]
    fn test_display_array() {
        let array = Value::Array(Rc::new(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
        ]));
        assert_eq!(array.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_display_hash_keeps_insertion_order() {
        let mut pairs = IndexMap::new();
        for (k, v) in [("b", 2), ("a", 1)] {
            let key = Value::String(Rc::new(k.to_string()));
            pairs.insert(
                key.hash_key().unwrap(),
                HashPair {
                    key,
                    value: Value::Integer(v),
                },
            );
        }
        assert_eq!(Value::Hash(Rc::new(pairs)).to_string(), "{b: 2, a: 1}");
    }

    #[test]
    fn test_hash_key_string_equality() {
        let a = Value::String(Rc::new("name".to_string()));
        let b = Value::String(Rc::new("name".to_string()));
        let c = Value::String(Rc::new("other".to_string()));

        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), c.hash_key());
    }

    #[test]
    fn test_hash_key_kinds_do_not_collide() {
        let int = Value::Integer(1).hash_key().unwrap();
        let boolean = Value::Boolean(true).hash_key().unwrap();

        assert_eq!(int.value, boolean.value);
        assert_ne!(int, boolean);
    }

    #[test]
    fn test_unhashable_values() {
        assert!(Value::Null.hash_key().is_none());
        assert!(Value::Array(Rc::new(vec![])).hash_key().is_none());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Integer(0).type_name(), "INTEGER");
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(Value::Array(Rc::new(vec![])).type_name(), "ARRAY");
    }
}

use std::rc::Rc;

use crate::lang::value::Value;

/// Signature of a built-in function. Errors are plain messages; the VM wraps
/// them in a `RuntimeError`.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, String>;

/// A registered built-in function.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The built-in registry. Registration order is fixed: both `OpGetBuiltin`
/// operands and `Value::Builtin` indices refer to positions in this table.
pub const BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
];

/// Looks up a built-in by registration index.
pub fn get(index: u8) -> Option<&'static BuiltinDef> {
    BUILTINS.get(index as usize)
}

/// Returns the name of the built-in at `index`.
pub fn name(index: u8) -> Option<&'static str> {
    get(index).map(|def| def.name)
}

fn check_arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() != want {
        return Err(format!(
            "wrong number of arguments. got={}, want={}",
            args.len(),
            want
        ));
    }
    Ok(())
}

fn builtin_len(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.len() as i64)),
        Value::Array(elements) => Ok(Value::Integer(elements.len() as i64)),
        other => Err(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Result<Value, String> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(Value::Null)
}

fn builtin_first(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => Ok(elements.first().cloned().unwrap_or(Value::Null)),
        other => Err(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => Ok(elements.last().cloned().unwrap_or(Value::Null)),
        other => Err(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Array(Rc::new(elements[1..].to_vec())))
        }
        other => Err(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 2)?;
    match &args[0] {
        Value::Array(elements) => {
            let mut new_elements = elements.as_ref().clone();
            new_elements.push(args[1].clone());
            Ok(Value::Array(Rc::new(new_elements)))
        }
        other => Err(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(values: &[i64]) -> Value {
        Value::Array(Rc::new(values.iter().map(|n| Value::Integer(*n)).collect()))
    }

    #[test]
    fn test_registration_order() {
        let names: Vec<&str> = BUILTINS.iter().map(|def| def.name).collect();
        assert_eq!(names, vec!["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_len_string_and_array() {
        let s = Value::String(Rc::new("hello".to_string()));
        assert_eq!(builtin_len(&[s]), Ok(Value::Integer(5)));
        assert_eq!(builtin_len(&[array(&[1, 2, 3])]), Ok(Value::Integer(3)));
    }

    #[test]
    fn test_len_wrong_type() {
        let err = builtin_len(&[Value::Integer(1)]).unwrap_err();
        assert_eq!(err, "argument to `len` not supported, got INTEGER");
    }

    #[test]
    fn test_len_wrong_arity() {
        let err = builtin_len(&[]).unwrap_err();
        assert_eq!(err, "wrong number of arguments. got=0, want=1");
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(builtin_first(&[array(&[1, 2, 3])]), Ok(Value::Integer(1)));
        assert_eq!(builtin_last(&[array(&[1, 2, 3])]), Ok(Value::Integer(3)));
        assert_eq!(builtin_first(&[array(&[])]), Ok(Value::Null));
        assert_eq!(builtin_last(&[array(&[])]), Ok(Value::Null));
    }

    #[test]
    fn test_first_requires_array() {
        let err = builtin_first(&[Value::Integer(1)]).unwrap_err();
        assert_eq!(err, "argument to `first` must be ARRAY, got INTEGER");
    }

    #[test]
    fn test_rest() {
        assert_eq!(builtin_rest(&[array(&[1, 2, 3])]), Ok(array(&[2, 3])));
        assert_eq!(builtin_rest(&[array(&[1])]), Ok(array(&[])));
        assert_eq!(builtin_rest(&[array(&[])]), Ok(Value::Null));
    }

    #[test]
    fn test_rest_allocates_fresh_array() {
        let original = array(&[1, 2]);
        let rest = builtin_rest(&[original.clone()]).unwrap();

        assert_eq!(rest, array(&[2]));
        assert_eq!(original, array(&[1, 2]));
    }

    #[test]
    fn test_push_leaves_original_untouched() {
        let original = array(&[1]);
        let pushed = builtin_push(&[original.clone(), Value::Integer(2)]).unwrap();

        assert_eq!(pushed, array(&[1, 2]));
        assert_eq!(original, array(&[1]));
    }

    #[test]
    fn test_push_wrong_arity() {
        let err = builtin_push(&[array(&[1])]).unwrap_err();
        assert_eq!(err, "wrong number of arguments. got=1, want=2");
    }
}

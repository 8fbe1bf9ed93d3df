// Built-in functions available inside filters.

use serde_json::Value;

use crate::eval::EvalError;

/// Evaluate a built-in function by name.
pub fn call_builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "defined" => builtin_defined(args),
        "count" => builtin_count(args),
        "length" => builtin_length(args),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(EvalError::Arity {
            function: name.to_string(),
            expected: 1,
            found: args.len(),
        }),
    }
}

fn builtin_defined(args: &[Value]) -> Result<Value, EvalError> {
    let arg = single_arg("defined", args)?;
    Ok(Value::Bool(!arg.is_null()))
}

fn builtin_count(args: &[Value]) -> Result<Value, EvalError> {
    match single_arg("count", args)? {
        Value::Array(items) => Ok(Value::from(items.len())),
        _ => Ok(Value::Null),
    }
}

fn builtin_length(args: &[Value]) -> Result<Value, EvalError> {
    match single_arg("length", args)? {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        _ => Ok(Value::Null),
    }
}

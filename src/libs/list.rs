//! `list-lib`: construction and access for flat lists.
//!
//! Lists are flat vectors rather than pair chains: `cons` onto a list
//! prepends, and `cons` onto an atom makes a two-element list.

use super::BuiltinOp;
use crate::ast::Value;
use crate::environment::Environment;
use crate::evaluator::{ArgType, Interpreter, describe_arg, type_mismatch};
use crate::{Arity, Error};

fn builtin_list(
    interp: &Interpreter,
    _name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::List(interp.eval_each(operands, env)?))
}

fn builtin_cons(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [head, tail] = interp.eval_args(name, operands, [ArgType::Any, ArgType::Any], env)?;
    let items = match tail {
        Value::List(mut items) => {
            items.insert(0, head);
            items
        }
        atom => vec![head, atom],
    };
    Ok(Value::List(items))
}

/// `car`, `cdr` and their compositions: the letters between `c` and `r`
/// are applied right to left, `a` taking the first item and `d` the rest.
fn builtin_cxr(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [list] = interp.eval_args(name, operands, [ArgType::List], env)?;
    let path = name
        .strip_prefix('c')
        .and_then(|rest| rest.strip_suffix('r'))
        .unwrap_or_default();

    let mut current = list.clone();
    for step in path.chars().rev() {
        current = match current {
            Value::List(mut items) if !items.is_empty() => {
                let first = items.remove(0);
                if step == 'a' { first } else { Value::List(items) }
            }
            _ => {
                return Err(Error::TypeMismatch {
                    form: name.to_owned(),
                    expected: "pair".to_owned(),
                    given: describe_arg(&list),
                });
            }
        };
    }
    Ok(current)
}

/// Concatenate lists; a final non-list argument becomes the last item,
/// or the whole result when everything before it was empty.
fn builtin_append(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let mut values = interp.eval_each(operands, env)?;
    let Some(last) = values.pop() else {
        return Ok(Value::List(vec![]));
    };

    let mut items = Vec::new();
    for value in values {
        match value {
            Value::List(list) => items.extend(list),
            other => return Err(type_mismatch(name, ArgType::List, &other)),
        }
    }

    match last {
        Value::List(list) => items.extend(list),
        atom if items.is_empty() => return Ok(atom),
        atom => items.push(atom),
    }
    Ok(Value::List(items))
}

fn list_arg(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Vec<Value>, Error> {
    match interp.eval_args(name, operands, [ArgType::List], env)? {
        [Value::List(items)] => Ok(items),
        [other] => Err(type_mismatch(name, ArgType::List, &other)),
    }
}

fn builtin_length(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::from(list_arg(interp, name, operands, env)?.len()))
}

fn builtin_reverse(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let mut items = list_arg(interp, name, operands, env)?;
    items.reverse();
    Ok(Value::List(items))
}

/// A count or index operand: a non-negative integer
fn to_index(name: &str, value: &Value) -> Result<usize, Error> {
    match value.as_number() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(Error::TypeMismatch {
            form: name.to_owned(),
            expected: "non-negative integer".to_owned(),
            given: describe_arg(value),
        }),
    }
}

fn list_and_index(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<(Vec<Value>, usize), Error> {
    let [list, index] =
        interp.eval_args(name, operands, [ArgType::List, ArgType::Number], env)?;
    let index = to_index(name, &index)?;
    match list {
        Value::List(items) => Ok((items, index)),
        other => Err(type_mismatch(name, ArgType::List, &other)),
    }
}

fn builtin_list_ref(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let (mut items, index) = list_and_index(interp, name, operands, env)?;
    if index >= items.len() {
        return Err(Error::OutOfRange {
            form: name.to_owned(),
            index,
            length: items.len(),
        });
    }
    Ok(items.swap_remove(index))
}

fn builtin_list_tail(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let (mut items, index) = list_and_index(interp, name, operands, env)?;
    if index > items.len() {
        return Err(Error::OutOfRange {
            form: name.to_owned(),
            index,
            length: items.len(),
        });
    }
    Ok(Value::List(items.split_off(index)))
}

fn builtin_make_list(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [size, fill] =
        interp.eval_args(name, operands, [ArgType::Number, ArgType::Scalar], env)?;
    let count = to_index(name, &size)?;
    let mut items = Vec::new();
    items
        .try_reserve_exact(count)
        .map_err(|_| Error::TypeMismatch {
            form: name.to_owned(),
            expected: "list size that fits in memory".to_owned(),
            given: describe_arg(&size),
        })?;
    items.resize(count, fill);
    Ok(Value::List(items))
}

/// `(map proc list)`: each item is passed to `proc` as a quoted argument.
fn builtin_map(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [proc_expr, list_expr] = operands else {
        return Err(Error::ArityMismatch {
            form: name.to_owned(),
            expected: Arity::Exact(2),
            given: operands.len(),
        });
    };

    interp
        .call_args(name, list_expr, env)?
        .into_iter()
        .map(|item| interp.call_procedure(proc_expr, vec![item], env))
        .collect::<Result<Vec<_>, Error>>()
        .map(Value::List)
}

pub(super) fn ops() -> Vec<BuiltinOp> {
    let mut ops = vec![
        BuiltinOp { id: "list", func: builtin_list },
        BuiltinOp { id: "cons", func: builtin_cons },
    ];
    ops.extend(
        ["car", "cdr", "caar", "cadr", "cdar", "cddr", "caddr", "cadddr", "caddddr"]
            .into_iter()
            .map(|id| BuiltinOp { id, func: builtin_cxr }),
    );
    ops.extend([
        BuiltinOp { id: "append", func: builtin_append },
        BuiltinOp { id: "length", func: builtin_length },
        BuiltinOp { id: "list-ref", func: builtin_list_ref },
        BuiltinOp { id: "list-tail", func: builtin_list_tail },
        BuiltinOp { id: "make-list", func: builtin_make_list },
        BuiltinOp { id: "map", func: builtin_map },
        BuiltinOp { id: "reverse", func: builtin_reverse },
    ]);
    ops
}

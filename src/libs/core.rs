//! `core-lib`: type predicates, arithmetic, comparison and equality.

use super::BuiltinOp;
use crate::Error;
use crate::ast::{NumberType, Value};
use crate::environment::Environment;
use crate::evaluator::{ArgType, Interpreter};

/// Evaluate one operand of any type
fn single(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [value] = interp.eval_args(name, operands, [ArgType::Any], env)?;
    Ok(value)
}

// Macro to generate type predicates over a single evaluated operand
macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(
            interp: &Interpreter,
            name: &str,
            operands: &[Value],
            env: &Environment,
        ) -> Result<Value, Error> {
            let value = single(interp, name, operands, env)?;
            Ok(Value::Bool(matches!(value, $pattern)))
        }
    };
}

type_predicate!(builtin_is_boolean, Value::Bool(_));
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_list, Value::List(_));

/// Anything but a non-empty list
fn builtin_is_atom(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let value = single(interp, name, operands, env)?;
    Ok(Value::Bool(!matches!(value, Value::List(items) if !items.is_empty())))
}

fn builtin_is_null(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::Bool(single(interp, name, operands, env)?.is_nil()))
}

fn builtin_is_pair(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let value = single(interp, name, operands, env)?;
    Ok(Value::Bool(matches!(value, Value::List(items) if !items.is_empty())))
}

fn fold_numbers(
    values: &[Value],
    start: NumberType,
    op: fn(NumberType, NumberType) -> NumberType,
) -> Value {
    Value::Number(values.iter().filter_map(Value::as_number).fold(start, op))
}

/// `(+ n ...)`; `(+)` is 0
fn builtin_add(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let values = interp.eval_rest(name, operands, ArgType::Number, env)?;
    Ok(fold_numbers(&values, 0.0, |acc, n| acc + n))
}

/// `(* n ...)`; `(*)` is 1
fn builtin_mul(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let values = interp.eval_rest(name, operands, ArgType::Number, env)?;
    Ok(fold_numbers(&values, 1.0, |acc, n| acc * n))
}

fn builtin_sub(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [a, b] = interp.eval_numbers(name, operands, env)?;
    Ok(Value::Number(a - b))
}

fn builtin_div(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [a, b] = interp.eval_numbers(name, operands, env)?;
    if b == 0.0 {
        return Err(Error::DivisionByZero(name.to_owned()));
    }
    Ok(Value::Number(a / b))
}

/// Remainder with the sign of the dividend
fn builtin_modulo(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [a, b] = interp.eval_numbers(name, operands, env)?;
    if b == 0.0 {
        return Err(Error::DivisionByZero(name.to_owned()));
    }
    Ok(Value::Number(a % b))
}

fn builtin_is_zero(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [n] = interp.eval_numbers(name, operands, env)?;
    Ok(Value::Bool(n == 0.0))
}

// Macro to generate numeric comparison functions over exactly two numbers
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(
            interp: &Interpreter,
            name: &str,
            operands: &[Value],
            env: &Environment,
        ) -> Result<Value, Error> {
            let [a, b] = interp.eval_numbers(name, operands, env)?;
            Ok(Value::Bool(a $op b))
        }
    };
}

numeric_comparison!(builtin_num_eq, ==);
numeric_comparison!(builtin_num_ne, !=);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_ge, >=);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_le, <=);

/// Identity of atoms; lists are only `eq?` when both are empty
fn builtin_eq(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [a, b] = interp.eval_args(name, operands, [ArgType::Any, ArgType::Any], env)?;
    let same = match (&a, &b) {
        (Value::List(x), Value::List(y)) => x.is_empty() && y.is_empty(),
        (Value::Values(_), _) | (_, Value::Values(_)) => false,
        _ => a == b,
    };
    Ok(Value::Bool(same))
}

fn builtin_equal(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [a, b] = interp.eval_args(name, operands, [ArgType::Any, ArgType::Any], env)?;
    Ok(Value::Bool(a == b))
}

fn builtin_not(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::Bool(!single(interp, name, operands, env)?.is_truthy()))
}

pub(super) fn ops() -> Vec<BuiltinOp> {
    vec![
        // Types
        BuiltinOp { id: "atom?", func: builtin_is_atom },
        BuiltinOp { id: "boolean?", func: builtin_is_boolean },
        BuiltinOp { id: "number?", func: builtin_is_number },
        BuiltinOp { id: "string?", func: builtin_is_string },
        BuiltinOp { id: "null?", func: builtin_is_null },
        BuiltinOp { id: "pair?", func: builtin_is_pair },
        BuiltinOp { id: "list?", func: builtin_is_list },
        // Arithmetic
        BuiltinOp { id: "+", func: builtin_add },
        BuiltinOp { id: "-", func: builtin_sub },
        BuiltinOp { id: "*", func: builtin_mul },
        BuiltinOp { id: "/", func: builtin_div },
        BuiltinOp { id: "modulo", func: builtin_modulo },
        BuiltinOp { id: "%", func: builtin_modulo },
        BuiltinOp { id: "zero?", func: builtin_is_zero },
        // Numerical comparison
        BuiltinOp { id: "=", func: builtin_num_eq },
        BuiltinOp { id: "!=", func: builtin_num_ne },
        BuiltinOp { id: ">", func: builtin_gt },
        BuiltinOp { id: ">=", func: builtin_ge },
        BuiltinOp { id: "<", func: builtin_lt },
        BuiltinOp { id: "<=", func: builtin_le },
        // General comparison
        BuiltinOp { id: "eq?", func: builtin_eq },
        BuiltinOp { id: "equal?", func: builtin_equal },
        BuiltinOp { id: "not", func: builtin_not },
    ]
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use crate::ast::Value;
    use crate::options::Options;
    use crate::{Error, evaluate};

    fn success<T: Into<Value>>(value: T) -> Result<Value, &'static str> {
        Ok(value.into())
    }

    #[test]
    fn test_core_procedures_data_driven() {
        let test_cases: Vec<(&str, Result<Value, &'static str>)> = vec![
            // === TYPE PREDICATES ===
            ("(atom? 1)", success(true)),
            ("(atom? '())", success(true)),
            ("(atom? '(1))", success(false)),
            ("(atom? 'a)", success(true)),
            ("(boolean? #f)", success(true)),
            ("(boolean? 0)", success(false)),
            ("(number? 1.5)", success(true)),
            ("(number? \"1\")", success(false)),
            ("(string? \"1\")", success(true)),
            ("(string? 'a)", success(false)),
            ("(null? '())", success(true)),
            ("(null? '(1))", success(false)),
            ("(null? 0)", success(false)),
            ("(pair? '(1))", success(true)),
            ("(pair? '())", success(false)),
            ("(list? '())", success(true)),
            ("(list? \"()\")", success(false)),
            ("(null?)", Err("'null?' requires 1 argument. Given: 0 arguments")),
            // === ARITHMETIC ===
            ("(+)", success(0)),
            ("(+ 5)", success(5)),
            ("(+ 1 2 3 4)", success(10)),
            ("(+ 0.5 0.25)", success(0.75)),
            ("(+ 1 \"2\")", Err("'+' requires number. Given: string 2")),
            ("(*)", success(1)),
            ("(* 2 3 4)", success(24)),
            ("(- 10 4)", success(6)),
            ("(- 10)", Err("'-' requires 2 arguments. Given: 1 argument")),
            ("(/ 9 2)", success(4.5)),
            ("(/ 1 0)", Err("'/' division by zero.")),
            ("(modulo 7 3)", success(1)),
            ("(modulo -7 3)", success(-1)),
            ("(% 7 -3)", success(1)),
            ("(% 7 0)", Err("'%' division by zero.")),
            ("(zero? 0)", success(true)),
            ("(zero? 0.1)", success(false)),
            ("(zero? '())", Err("'zero?' requires number. Given: list ()")),
            // === COMPARISON ===
            ("(= 2 2)", success(true)),
            ("(!= 2 2)", success(false)),
            ("(> 3 2)", success(true)),
            ("(>= 2 2)", success(true)),
            ("(< 3 2)", success(false)),
            ("(<= 1 2)", success(true)),
            ("(< 1 2 3)", Err("'<' requires 2 arguments. Given: 3 arguments")),
            ("(= 'a 'a)", Err("'=' requires number. Given: symbol a")),
            // === EQUALITY ===
            ("(eq? 'a 'a)", success(true)),
            ("(eq? \"x\" \"x\")", success(true)),
            ("(eq? '() '())", success(true)),
            ("(eq? '(1) '(1))", success(false)),
            ("(equal? '(1 (2 \"x\")) '(1 (2 \"x\")))", success(true)),
            ("(equal? '(1 2) '(1 3))", success(false)),
            ("(equal? 1 \"1\")", success(false)),
            ("(define f (lambda () 1)) (eq? f f)", success(true)),
            ("(not #f)", success(true)),
            ("(not 0)", success(false)),
            ("(not '())", success(false)),
            // === ARGUMENTS ARE EVALUATED ===
            ("(define x 4) (+ x (* x 2))", success(12)),
        ];

        for (source, expected) in test_cases {
            let result = evaluate(source, &Options::default());
            match expected {
                Ok(value) => assert_eq!(result.unwrap(), value, "{source}"),
                Err(text) => {
                    let message = result.unwrap_err().to_string();
                    assert!(message.contains(text), "{source}: got {message}");
                }
            }
        }
    }

    #[test]
    fn test_division_by_zero_is_typed() {
        assert_eq!(
            evaluate("(/ 5 (- 2 2))", &Options::default()),
            Err(Error::DivisionByZero("/".into()))
        );
    }
}

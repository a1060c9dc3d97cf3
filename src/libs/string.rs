//! `string-lib`: string construction, conversion and case mapping.

use super::BuiltinOp;
use crate::ast::{NumberType, Value};
use crate::environment::Environment;
use crate::evaluator::{ArgSpec, ArgType, Interpreter, describe_arg};
use crate::printer::stringify;
use crate::{Arity, Error};

/// `(string datum)`: the operand's text, without evaluating it.
fn builtin_string(
    _interp: &Interpreter,
    name: &str,
    operands: &[Value],
    _env: &Environment,
) -> Result<Value, Error> {
    match operands {
        [Value::String(text) | Value::Symbol(text)] => Ok(Value::String(text.clone())),
        [datum] => Ok(Value::String(stringify(datum))),
        _ => Err(Error::ArityMismatch {
            form: name.to_owned(),
            expected: Arity::Exact(1),
            given: operands.len(),
        }),
    }
}

fn builtin_string_append(
    interp: &Interpreter,
    _name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let mut result = String::new();
    for value in interp.eval_each(operands, env)? {
        result.push_str(&stringify(&value));
    }
    Ok(Value::String(result))
}

/// The text of a single string operand
fn string_arg(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<String, Error> {
    let [value] = interp.eval_args(name, operands, [ArgType::String], env)?;
    Ok(value.as_str().unwrap_or_default().to_owned())
}

fn builtin_string_length(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let text = string_arg(interp, name, operands, env)?;
    Ok(Value::from(text.chars().count()))
}

/// Parse `text` in `radix`; `None` when it isn't a number.
fn parse_number(text: &str, radix: u32) -> Option<NumberType> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if radix == 10 {
        // Rejects the `inf` and `NaN` spellings Rust accepts
        text.parse::<NumberType>().ok().filter(|n| n.is_finite())
    } else {
        i64::from_str_radix(text, radix).ok().map(|n| n as NumberType)
    }
}

/// `(string->number text [radix])`: `#f` when the text isn't a number.
fn builtin_string_to_number(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let specs = [
        ArgSpec::Required(ArgType::String),
        ArgSpec::Optional(ArgType::Number, Value::Number(10.0)),
    ];
    let values = interp.eval_args_opt(name, operands, &specs, env)?;
    let (Some(text), Some(radix_value)) = (
        values.first().and_then(Value::as_str),
        values.get(1),
    ) else {
        return Ok(Value::Bool(false));
    };

    let radix = match radix_value.as_number() {
        Some(r) if (2.0..=36.0).contains(&r) && r.fract() == 0.0 => r as u32,
        _ => {
            return Err(Error::TypeMismatch {
                form: name.to_owned(),
                expected: "radix from 2 to 36".to_owned(),
                given: describe_arg(radix_value),
            });
        }
    };

    Ok(parse_number(text, radix).map_or(Value::Bool(false), Value::Number))
}

fn builtin_string_to_uppercase(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::String(string_arg(interp, name, operands, env)?.to_uppercase()))
}

fn builtin_string_to_downcase(
    interp: &Interpreter,
    name: &str,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::String(string_arg(interp, name, operands, env)?.to_lowercase()))
}

pub(super) fn ops() -> Vec<BuiltinOp> {
    vec![
        BuiltinOp { id: "string", func: builtin_string },
        BuiltinOp { id: "string-append", func: builtin_string_append },
        BuiltinOp { id: "string-length", func: builtin_string_length },
        BuiltinOp { id: "string->number", func: builtin_string_to_number },
        BuiltinOp { id: "string->uppercase", func: builtin_string_to_uppercase },
        BuiltinOp { id: "string->downcase", func: builtin_string_to_downcase },
    ]
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::parse_number;
    use crate::ast::Value;
    use crate::evaluate;
    use crate::options::Options;

    fn success<T: Into<Value>>(value: T) -> Result<Value, &'static str> {
        Ok(value.into())
    }

    #[test]
    fn test_string_procedures_data_driven() {
        let test_cases: Vec<(&str, Result<Value, &'static str>)> = vec![
            ("(string abc)", success("abc")),
            ("(string \"abc\")", success("abc")),
            ("(string (+ 1 2))", success("(+ 1 2)")),
            ("(string a b)", Err("'string' requires 1 argument. Given: 2 arguments")),
            ("(string-append)", success("")),
            ("(string-append \"a\" 1 'b '(1 \"c\"))", success("a1b(1 \"c\")")),
            ("(string-length \"héllo\")", success(5)),
            ("(string-length 'a)", Err("'string-length' requires string. Given: symbol a")),
            ("(string->number \"42\")", success(42)),
            ("(string->number \" -1.5 \")", success(-1.5)),
            ("(string->number \"1e3\")", success(1000)),
            ("(string->number \"abc\")", success(false)),
            ("(string->number \"\")", success(false)),
            ("(string->number \"inf\")", success(false)),
            ("(string->number \"ff\" 16)", success(255)),
            ("(string->number \"101\" 2)", success(5)),
            ("(string->number \"12\" 2)", success(false)),
            ("(string->number \"1\" 1)", Err("'string->number' requires radix from 2 to 36")),
            ("(string->number 42)", Err("'string->number' requires string. Given: number 42")),
            ("(string->uppercase \"MiXed\")", success("MIXED")),
            ("(string->downcase \"MiXed\")", success("mixed")),
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
    fn test_parse_number() {
        assert_eq!(parse_number("7", 10), Some(7.0));
        assert_eq!(parse_number("-z", 36), Some(-35.0));
        assert_eq!(parse_number("NaN", 10), None);
        assert_eq!(parse_number("  ", 10), None);
    }
}

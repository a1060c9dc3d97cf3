//! Core value types of the interpreter.
//!
//! [`Value`] is both the runtime datum and the code representation: the
//! reader produces nested [`Value::List`]s that the evaluator walks directly.
//! Helper functions [`val`], [`sym`] and [`nil`] build values tersely in code
//! and tests, and `From` conversions cover common Rust literals.

use std::rc::Rc;

use crate::Error;
use crate::environment::Environment;

/// Type alias for number values in interpreter
pub type NumberType = f64;

/// Core value type in interpreter
///
/// To build a value, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Number(NumberType),
    Bool(bool),
    /// String literal or string produced at runtime
    String(String),
    /// Identifier; a symbol naming a library procedure also stands for that procedure
    Symbol(String),
    /// Flat sequence; the empty list doubles as nil
    List(Vec<Value>),
    /// Bundle produced by `values`
    Values(Vec<Value>),
    /// User-defined procedure
    Closure(Rc<Closure>),
    /// Result of forms evaluated for effect (`define`, `display`, ...)
    /// These values never equal themselves or any other value
    Unspecified,
}

/// A procedure value: parameters, body forms and the captured environment.
pub struct Closure {
    pub params: Params,
    pub body: Vec<Value>,
    /// Shared with the defining scope, never copied at definition time
    pub env: Environment,
}

/// Parameter list shapes accepted by `lambda`.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// `(a b c)`
    Fixed(Vec<String>),
    /// `(a b . rest)`
    Dotted(Vec<String>, String),
    /// `args`
    CatchAll(String),
}

impl Params {
    /// Validate a parameter list datum as written after `lambda`.
    pub fn parse(datum: &Value) -> Result<Params, Error> {
        let names = match datum {
            Value::Symbol(name) => return Ok(Params::CatchAll(name.clone())),
            Value::List(items) => items,
            other => {
                return Err(Error::improper(
                    "lambda",
                    format!(
                        "Improper lambda parameters. Given: {}",
                        crate::printer::stringify(other)
                    ),
                ));
            }
        };

        let mut fixed = Vec::with_capacity(names.len());
        for (index, item) in names.iter().enumerate() {
            let Value::Symbol(name) = item else {
                return Err(Error::improper(
                    "lambda",
                    format!(
                        "Improper lambda parameter. Given: {}",
                        crate::printer::stringify(item)
                    ),
                ));
            };

            if name != "." {
                fixed.push(name.clone());
                continue;
            }

            if index == 0 {
                return Err(Error::improper(
                    "lambda",
                    "Unexpected dot (.) as a first param in lambda.",
                ));
            }
            return match &names[index + 1..] {
                [] => Err(Error::improper(
                    "lambda",
                    "Unexpected dot (.) as a last param in lambda.",
                )),
                [Value::Symbol(rest)] if rest != "." => Ok(Params::Dotted(fixed, rest.clone())),
                _ => Err(Error::improper(
                    "lambda",
                    "Expected a single identifier after the dot (.) in lambda.",
                )),
            };
        }

        Ok(Params::Fixed(fixed))
    }

    /// The parameter list as it would be written in source.
    pub fn to_value(&self) -> Value {
        match self {
            Params::Fixed(names) => Value::List(names.iter().map(sym).collect()),
            Params::Dotted(names, rest) => {
                let mut items: Vec<Value> = names.iter().map(sym).collect();
                items.push(sym("."));
                items.push(sym(rest));
                Value::List(items)
            }
            Params::CatchAll(name) => sym(name),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Values(items) => f.debug_tuple("Values").field(items).finish(),
            Value::Closure(closure) => {
                write!(
                    f,
                    "Closure(params={:?}, body={:?})",
                    closure.params, closure.body
                )
            }
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::printer::stringify(self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Values(a), Value::Values(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Unspecified, _) | (_, Value::Unspecified) => false, // Unspecified never equals anything
            _ => false,
        }
    }
}

impl Value {
    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    /// Only `#f` is false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Values that evaluate to themselves and need no quoting when spliced into code
    pub fn is_self_evaluating(&self) -> bool {
        !matches!(self, Value::Symbol(_) | Value::List(_))
    }

    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name used for this value's type in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Values(_) => "values",
            Value::Closure(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Wrap in `(quote ...)` unless the value evaluates to itself.
    pub fn quoted(self) -> Value {
        if self.is_self_evaluating() {
            self
        } else {
            Value::List(vec![sym("quote"), self])
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

// Lossless integer conversions only
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as NumberType)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::List(slice.iter().cloned().map(Into::into).collect())
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// The empty list, which doubles as nil
pub fn nil() -> Value {
    Value::List(vec![])
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Number(42.0)),
            (val(-17), Value::Number(-17.0)),
            (val(2.5), Value::Number(2.5)),
            (val(255u8), Value::Number(255.0)),
            (val(4294967295u32), Value::Number(4294967295.0)),
            (val(3usize), Value::Number(3.0)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("foo-bar?"), Value::Symbol("foo-bar?".to_owned())),
            (sym(String::from("test")), Value::Symbol("test".to_owned())),
            (nil(), Value::List(vec![])),
            (
                val([1, 2, 3]),
                Value::List(vec![
                    Value::Number(1.0),
                    Value::Number(2.0),
                    Value::Number(3.0),
                ]),
            ),
            (
                val(vec![sym("op"), val(42), val("result")]),
                Value::List(vec![
                    Value::Symbol("op".to_owned()),
                    Value::Number(42.0),
                    Value::String("result".to_owned()),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_unspecified_values() {
        // Unspecified never equals anything, including itself
        let unspec = Value::Unspecified;
        assert_ne!(unspec, unspec);
        assert_ne!(unspec, Value::Unspecified);
        assert_ne!(unspec, val(42));
    }

    #[test]
    fn test_truthiness_only_false_is_false() {
        assert!(!val(false).is_truthy());
        for value in [val(true), val(0), nil(), val(""), sym("x"), Value::Unspecified] {
            assert!(value.is_truthy(), "{value:?} should be truthy");
        }
    }

    #[test]
    fn test_quoted_wraps_only_code_like_values() {
        assert_eq!(val(1).quoted(), val(1));
        assert_eq!(val("s").quoted(), val("s"));
        assert_eq!(sym("a").quoted(), val(vec![sym("quote"), sym("a")]));
        assert_eq!(
            val([1, 2]).quoted(),
            val(vec![sym("quote"), val([1, 2])])
        );
    }

    #[test]
    fn test_params_parse() {
        let cases = vec![
            (val(vec![sym("a"), sym("b")]), Some(Params::Fixed(vec!["a".into(), "b".into()]))),
            (nil(), Some(Params::Fixed(vec![]))),
            (
                val(vec![sym("h"), sym("."), sym("t")]),
                Some(Params::Dotted(vec!["h".into()], "t".into())),
            ),
            (sym("args"), Some(Params::CatchAll("args".into()))),
            (val(vec![sym("."), sym("t")]), None),
            (val(vec![sym("a"), sym(".")]), None),
            (val(vec![sym("a"), sym("."), sym("b"), sym("c")]), None),
            (val(vec![val(1)]), None),
            (val(5), None),
        ];

        for (datum, expected) in cases {
            match expected {
                Some(params) => {
                    let parsed = Params::parse(&datum).unwrap();
                    assert_eq!(parsed, params);
                    assert_eq!(parsed.to_value(), datum);
                }
                None => assert!(Params::parse(&datum).is_err(), "{datum:?} should fail"),
            }
        }
    }
}

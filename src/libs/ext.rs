//! Host extension functions.
//!
//! A host function receives its evaluated arguments together with the
//! optional context object from [`Options`](crate::Options). Plain Rust
//! functions and closures can be registered directly through the
//! [`IntoHostFunction`] adapters, which convert arguments and results:
//!
//! ```
//! use schemy::{Options, evaluate, ast::val};
//!
//! let options = Options::default()
//!     .with_ext_function("hypot", |a: f64, b: f64| (a * a + b * b).sqrt())
//!     .with_ext_function("shout", |s: String| s.to_uppercase());
//!
//! assert_eq!(evaluate("(hypot 3 4)", &options).unwrap(), val(5));
//! assert_eq!(evaluate("(shout \"hi\")", &options).unwrap(), val("HI"));
//! ```

use std::any::Any;
use std::rc::Rc;

use tracing::trace;

use crate::ast::Value;
use crate::environment::Environment;
use crate::evaluator::Interpreter;
use crate::libs::Library;
use crate::options::Options;
use crate::{Arity, Error};

/// Erased host function signature: evaluated arguments plus the context.
pub type HostFn = dyn Fn(Vec<Value>, Option<&dyn Any>) -> Result<Value, Error>;

/// Conversion of one evaluated argument into a typed Rust parameter.
pub trait FromArg: Sized {
    fn from_arg(value: Value) -> Result<Self, Error>;
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::TypeMismatch {
        // Filled in with the procedure name by the library
        form: String::new(),
        expected: expected.to_owned(),
        given: crate::evaluator::describe_arg(value),
    }
}

impl FromArg for Value {
    fn from_arg(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromArg for f64 {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl FromArg for bool {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromArg for String {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromArg for Vec<Value> {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(mismatch("list", &other)),
        }
    }
}

/// Normalizes host function return types to `Result<Value, Error>`.
///
/// Functions may return any `T: Into<Value>` or `Result<T, Error>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Convert a strongly-typed Rust function or closure into the erased
/// [`HostFn`], parameterized by its argument tuple type.
pub trait IntoHostFunction<Args> {
    fn into_host_function(self) -> Rc<HostFn>;
}

impl<F, R> IntoHostFunction<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValueResult,
{
    fn into_host_function(self) -> Rc<HostFn> {
        Rc::new(move |args: Vec<Value>, _context: Option<&dyn Any>| {
            Arity::Exact(0).validate("", args.len())?;
            (self)().into_value_result()
        })
    }
}

/// Checks the argument count up front, then converts each argument in
/// order before invoking the function.
macro_rules! impl_into_host_function {
    ($arity:expr, $( $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoHostFunction<( $( $A, )+ )> for F
        where
            F: Fn( $( $A ),+ ) -> R + 'static,
            R: IntoValueResult,
            $( $A: FromArg, )+
        {
            fn into_host_function(self) -> Rc<HostFn> {
                Rc::new(move |args: Vec<Value>, _context: Option<&dyn Any>| {
                    Arity::Exact($arity).validate("", args.len())?;
                    let mut args = args.into_iter();
                    $(
                        let $p = $A::from_arg(args.next().unwrap_or(Value::Unspecified))?;
                    )+
                    (self)( $( $p ),+ ).into_value_result()
                })
            }
        }
    };
}

impl_into_host_function!(1, p0: A1);
impl_into_host_function!(2, p0: A1, p1: A2);
impl_into_host_function!(3, p0: A1, p1: A2, p2: A3);
impl_into_host_function!(4, p0: A1, p1: A2, p2: A3, p3: A4);
impl_into_host_function!(5, p0: A1, p1: A2, p2: A3, p3: A4, p4: A5);

/// Library of host functions taken from the evaluation options.
pub struct ExtLibrary {
    functions: Vec<(String, Rc<HostFn>)>,
    context: Option<Rc<dyn Any>>,
}

impl ExtLibrary {
    pub fn new(options: &Options) -> Self {
        ExtLibrary {
            functions: options.ext_functions.clone(),
            context: options.ext_context.clone(),
        }
    }

    fn find(&self, name: &str) -> Option<&Rc<HostFn>> {
        self.functions
            .iter()
            .find(|(id, _)| id == name)
            .map(|(_, function)| function)
    }
}

/// Adapter errors are raised before the procedure name is known
fn name_form(error: Error, name: &str) -> Error {
    match error {
        Error::ArityMismatch {
            form,
            expected,
            given,
        } if form.is_empty() => Error::ArityMismatch {
            form: name.to_owned(),
            expected,
            given,
        },
        Error::TypeMismatch {
            form,
            expected,
            given,
        } if form.is_empty() => Error::TypeMismatch {
            form: name.to_owned(),
            expected,
            given,
        },
        other => other,
    }
}

impl Library for ExtLibrary {
    fn name(&self) -> &str {
        "ext-lib"
    }

    fn procedures(&self) -> Vec<&str> {
        self.functions.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn eval_call(
        &self,
        interpreter: &Interpreter,
        name: &str,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        let function = self
            .find(name)
            .ok_or_else(|| Error::UnboundIdentifier(name.to_owned()))?;
        let args = interpreter.eval_each(operands, env)?;
        trace!(function = name, args = args.len(), "calling host function");

        function(args, self.context.as_deref()).map_err(|error| name_form(error, name))
    }
}

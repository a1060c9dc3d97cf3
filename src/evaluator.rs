//! The tree-walking evaluator.
//!
//! An [`Interpreter`] evaluates the nested-list program representation
//! against an explicit [`Environment`]. Dispatch on a compound expression
//! goes, in order, to a special form, to the first library owning the head
//! name, and finally to closure application.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Closure, Params, Value};
use crate::environment::Environment;
use crate::libs::{Library, create_libraries};
use crate::options::Options;
use crate::printer::{stringify, stringify_truncated};
use crate::{Arity, Error};

pub mod special_forms;

use special_forms::SpecialForm;

/// Longest printed argument included in a type error
const MAX_ARG_TEXT: usize = 25;

/// Remaining stack below which evaluation moves to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Argument types checked by [`Interpreter::eval_args`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Any,
    List,
    /// String or number
    Scalar,
    Number,
    String,
    Boolean,
}

impl ArgType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::Any => true,
            ArgType::List => matches!(value, Value::List(_)),
            ArgType::Scalar => matches!(value, Value::String(_) | Value::Number(_)),
            ArgType::Number => matches!(value, Value::Number(_)),
            ArgType::String => matches!(value, Value::String(_)),
            ArgType::Boolean => matches!(value, Value::Bool(_)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArgType::Any => "any",
            ArgType::List => "list",
            ArgType::Scalar => "scalar",
            ArgType::Number => "number",
            ArgType::String => "string",
            ArgType::Boolean => "boolean",
        }
    }
}

/// One position of an argument signature.
#[derive(Debug, Clone)]
pub enum ArgSpec {
    Required(ArgType),
    /// Takes the default when the operand is absent
    Optional(ArgType, Value),
}

/// "number 42", "list (1 2 3)", with long text truncated
pub(crate) fn describe_arg(value: &Value) -> String {
    format!(
        "{} {}",
        value.type_name(),
        stringify_truncated(value, MAX_ARG_TEXT)
    )
}

pub(crate) fn type_mismatch(form: &str, expected: ArgType, value: &Value) -> Error {
    Error::TypeMismatch {
        form: form.to_owned(),
        expected: expected.name().to_owned(),
        given: describe_arg(value),
    }
}

fn check_arg(form: &str, arg_type: ArgType, value: Value) -> Result<Value, Error> {
    if arg_type.accepts(&value) {
        Ok(value)
    } else {
        Err(type_mismatch(form, arg_type, &value))
    }
}

/// Decrements the depth counter when an expression finishes, however it exits
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Evaluation state for one program run.
pub struct Interpreter {
    options: Options,
    libs: Vec<Box<dyn Library>>,
    /// Set by `debug`; prints the next compound expression
    debug_armed: Cell<bool>,
    depth: Cell<usize>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let libs: Vec<&str> = self.libs.iter().map(|lib| lib.name()).collect();
        f.debug_struct("Interpreter")
            .field("libs", &libs)
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    pub fn new(options: &Options) -> Result<Self, Error> {
        let libs = create_libraries(options)?;
        debug!(libs = libs.len(), max_depth = options.max_depth, "created interpreter");
        Ok(Interpreter {
            options: options.clone(),
            libs,
            debug_armed: Cell::new(false),
            depth: Cell::new(0),
        })
    }

    /// A fresh interpreter for `eval` that continues counting this one's depth.
    fn nested(&self) -> Result<Self, Error> {
        let interpreter = Interpreter::new(&self.options)?;
        interpreter.depth.set(self.depth.get());
        Ok(interpreter)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn libraries(&self) -> &[Box<dyn Library>] {
        &self.libs
    }

    /// Evaluate a whole program in a new root environment.
    pub fn eval_program(&self, program: &[Value]) -> Result<Value, Error> {
        self.eval_in(program, &Environment::new())
    }

    /// Evaluate a program in an existing environment, keeping its definitions.
    pub fn eval_in(&self, program: &[Value], env: &Environment) -> Result<Value, Error> {
        self.eval_sequence(program, env)
    }

    /// Evaluate forms in order and return the last value; `Unspecified` when empty.
    pub fn eval_sequence(&self, forms: &[Value], env: &Environment) -> Result<Value, Error> {
        let mut result = Value::Unspecified;
        for form in forms {
            result = self.eval_expr(form, env)?;
        }
        Ok(result)
    }

    /// Evaluate each form, left to right.
    pub fn eval_each(&self, forms: &[Value], env: &Environment) -> Result<Vec<Value>, Error> {
        forms.iter().map(|form| self.eval_expr(form, env)).collect()
    }

    pub fn eval_expr(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        match expr {
            Value::Symbol(name) => env.lookup(name, &self.libs),
            Value::List(items) => {
                let _guard = self.enter()?;
                self.eval_list(items, env)
            }
            other => Ok(other.clone()),
        }
    }

    fn enter(&self) -> Result<DepthGuard<'_>, Error> {
        let depth = self.depth.get() + 1;
        if depth > self.options.max_depth {
            return Err(Error::EvalDepthExceeded(self.options.max_depth));
        }
        self.depth.set(depth);
        Ok(DepthGuard(&self.depth))
    }

    fn eval_list(&self, items: &[Value], env: &Environment) -> Result<Value, Error> {
        if self.debug_armed.replace(false) {
            let expr = Value::List(items.to_vec());
            self.print(&format!("Expression:\n{}\n", stringify(&expr)));
        }

        let [head, operands @ ..] = items else {
            return Err(Error::ImproperApplication("Probably: ()".to_owned()));
        };

        if let Value::Symbol(name) = head {
            if let Some(form) = SpecialForm::from_keyword(name) {
                trace!(form = name.as_str(), "special form");
                return form.eval(self, operands, env);
            }
            if let Some(lib) = self.libs.iter().find(|lib| lib.contains(name)) {
                trace!(procedure = name.as_str(), library = lib.name(), "library call");
                return lib.eval_call(self, name, operands, env);
            }
        }

        self.eval_application(head, operands, env)
    }

    fn eval_application(
        &self,
        head: &Value,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        let proc_id = match head {
            Value::Symbol(name) => name.as_str(),
            Value::List(items) if matches!(items.first(), Some(Value::Symbol(s)) if s == "lambda") => {
                "lambda"
            }
            _ => "expression",
        };

        match self.eval_expr(head, env)? {
            // A symbol naming another procedure: call that one with the same operands
            Value::Symbol(name) if env.has(&name, &self.libs) => {
                let mut call = Vec::with_capacity(operands.len() + 1);
                call.push(Value::Symbol(name));
                call.extend_from_slice(operands);
                self.eval_expr(&Value::List(call), env)
            }
            Value::Closure(closure) => {
                let args = match operands {
                    // Only a literal `(values ...)` operand spreads into the arguments
                    [single @ Value::List(items)]
                        if matches!(items.first(), Some(Value::Symbol(head)) if head == "values") =>
                    {
                        match self.eval_expr(single, env)? {
                            Value::Values(values) => values,
                            other => vec![other],
                        }
                    }
                    _ => self.eval_each(operands, env)?,
                };
                trace!(procedure = proc_id, args = args.len(), "application");
                self.apply_closure(&closure, proc_id, args)
            }
            other => Err(Error::ImproperApplication(format!(
                "Given: {}",
                stringify(&other)
            ))),
        }
    }

    /// Bind `args` in a frame forked from the closure's environment and run its body.
    pub(crate) fn apply_closure(
        &self,
        closure: &Closure,
        proc_id: &str,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let frame = closure.env.extend_for_call();
        let marker = frame.push_scope(proc_id);
        frame.add("#args", Value::List(args.clone()), "arg")?;
        frame.add("#name", Value::String(proc_id.to_owned()), "arg")?;

        match &closure.params {
            Params::Fixed(names) => {
                Arity::Exact(names.len()).validate(proc_id, args.len())?;
                for (name, arg) in names.iter().zip(args) {
                    frame.add(name, arg, "arg")?;
                }
            }
            Params::Dotted(names, rest) => {
                Arity::AtLeast(names.len()).validate(proc_id, args.len())?;
                let mut args = args.into_iter();
                for (name, arg) in names.iter().zip(args.by_ref()) {
                    frame.add(name, arg, "arg")?;
                }
                frame.add(rest, Value::List(args.collect()), "arg")?;
            }
            Params::CatchAll(name) => {
                Arity::AtLeast(1).validate(proc_id, args.len())?;
                frame.add(name, Value::List(args), "arg")?;
            }
        }

        let result = self.eval_sequence(&closure.body, &frame)?;
        frame.close_scope(marker, &result);
        Ok(result)
    }

    /// Build a closure over `env` from a parameter datum and body forms.
    pub(crate) fn make_closure(
        &self,
        params: &Value,
        body: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        Ok(Value::Closure(Rc::new(Closure {
            params: Params::parse(params)?,
            body: body.to_vec(),
            env: env.clone(),
        })))
    }

    /// Evaluate exactly `N` operands, checking each against its type.
    pub fn eval_args<const N: usize>(
        &self,
        form: &str,
        operands: &[Value],
        types: [ArgType; N],
        env: &Environment,
    ) -> Result<[Value; N], Error> {
        Arity::Exact(N).validate(form, operands.len())?;
        let mut values = Vec::with_capacity(N);
        for (operand, arg_type) in operands.iter().zip(types) {
            values.push(check_arg(form, arg_type, self.eval_expr(operand, env)?)?);
        }
        values.try_into().map_err(|values: Vec<Value>| Error::ArityMismatch {
            form: form.to_owned(),
            expected: Arity::Exact(N),
            given: values.len(),
        })
    }

    /// Evaluate operands against a signature with trailing optional positions.
    pub fn eval_args_opt(
        &self,
        form: &str,
        operands: &[Value],
        specs: &[ArgSpec],
        env: &Environment,
    ) -> Result<Vec<Value>, Error> {
        let required = specs
            .iter()
            .filter(|spec| matches!(spec, ArgSpec::Required(_)))
            .count();
        let arity = if required == specs.len() {
            Arity::Exact(required)
        } else {
            Arity::Range(required, specs.len())
        };
        arity.validate(form, operands.len())?;

        specs
            .iter()
            .enumerate()
            .map(|(index, spec)| match (spec, operands.get(index)) {
                (ArgSpec::Required(arg_type) | ArgSpec::Optional(arg_type, _), Some(operand)) => {
                    check_arg(form, *arg_type, self.eval_expr(operand, env)?)
                }
                (ArgSpec::Optional(arg_type, default), None) => {
                    check_arg(form, *arg_type, default.clone())
                }
                (ArgSpec::Required(_), None) => Err(Error::ArityMismatch {
                    form: form.to_owned(),
                    expected: arity,
                    given: operands.len(),
                }),
            })
            .collect()
    }

    /// Evaluate exactly `N` numeric operands.
    pub fn eval_numbers<const N: usize>(
        &self,
        form: &str,
        operands: &[Value],
        env: &Environment,
    ) -> Result<[f64; N], Error> {
        let values = self.eval_args(form, operands, [ArgType::Number; N], env)?;
        Ok(values.map(|value| value.as_number().unwrap_or_default()))
    }

    /// Evaluate any number of operands that all share one type.
    pub fn eval_rest(
        &self,
        form: &str,
        operands: &[Value],
        arg_type: ArgType,
        env: &Environment,
    ) -> Result<Vec<Value>, Error> {
        operands
            .iter()
            .map(|operand| check_arg(form, arg_type, self.eval_expr(operand, env)?))
            .collect()
    }

    /// Argument expressions for `apply` and `map`.
    ///
    /// A literal `(list ...)` contributes its items unevaluated; anything else
    /// must evaluate to a list whose items are quoted back into expressions.
    pub fn call_args(
        &self,
        form: &str,
        expr: &Value,
        env: &Environment,
    ) -> Result<Vec<Value>, Error> {
        if let Value::List(items) = expr
            && let [Value::Symbol(head), rest @ ..] = items.as_slice()
            && head == "list"
        {
            return Ok(rest.to_vec());
        }

        match self.eval_expr(expr, env)? {
            Value::List(values) => Ok(values.into_iter().map(Value::quoted).collect()),
            other => Err(type_mismatch(form, ArgType::List, &other)),
        }
    }

    /// Evaluate `(proc args...)` where `args` are already expressions.
    pub fn call_procedure(
        &self,
        proc_expr: &Value,
        args: Vec<Value>,
        env: &Environment,
    ) -> Result<Value, Error> {
        let mut call = Vec::with_capacity(args.len() + 1);
        call.push(proc_expr.clone());
        call.extend(args);
        self.eval_expr(&Value::List(call), env)
    }

    /// Send text to the configured printer.
    pub fn print(&self, text: &str) {
        (self.options.printer)(text);
    }

    pub(crate) fn arm_debug(&self) {
        self.debug_armed.set(true);
    }
}

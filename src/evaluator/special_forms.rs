//! Special forms: syntax whose operands reach the handler unevaluated.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::{ArgType, Interpreter, type_mismatch};
use crate::ast::{Value, sym};
use crate::environment::Environment;
use crate::parser::parse;
use crate::printer::{stringify, stringify_truncated};
use crate::{Arity, Error};

/// Bindings listed by `debug`
const DEBUG_BINDINGS: usize = 20;
/// Longest value text printed by `debug`
const DEBUG_VALUE_TEXT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    And,
    Apply,
    Begin,
    Case,
    Cond,
    Debug,
    Define,
    DefineValues,
    Display,
    Do,
    Eval,
    Format,
    If,
    Lambda,
    Let,
    LetStar,
    Letrec,
    LetrecStar,
    LetValues,
    LetStarValues,
    Newline,
    Or,
    Parse,
    Quasiquote,
    Quote,
    Raise,
    Set,
    Unless,
    Values,
    When,
}

static KEYWORDS: LazyLock<HashMap<&'static str, SpecialForm>> = LazyLock::new(|| {
    SpecialForm::ALL
        .iter()
        .map(|form| (form.keyword(), *form))
        .collect()
});

impl SpecialForm {
    pub const ALL: [SpecialForm; 30] = [
        SpecialForm::And,
        SpecialForm::Apply,
        SpecialForm::Begin,
        SpecialForm::Case,
        SpecialForm::Cond,
        SpecialForm::Debug,
        SpecialForm::Define,
        SpecialForm::DefineValues,
        SpecialForm::Display,
        SpecialForm::Do,
        SpecialForm::Eval,
        SpecialForm::Format,
        SpecialForm::If,
        SpecialForm::Lambda,
        SpecialForm::Let,
        SpecialForm::LetStar,
        SpecialForm::Letrec,
        SpecialForm::LetrecStar,
        SpecialForm::LetValues,
        SpecialForm::LetStarValues,
        SpecialForm::Newline,
        SpecialForm::Or,
        SpecialForm::Parse,
        SpecialForm::Quasiquote,
        SpecialForm::Quote,
        SpecialForm::Raise,
        SpecialForm::Set,
        SpecialForm::Unless,
        SpecialForm::Values,
        SpecialForm::When,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::And => "and",
            SpecialForm::Apply => "apply",
            SpecialForm::Begin => "begin",
            SpecialForm::Case => "case",
            SpecialForm::Cond => "cond",
            SpecialForm::Debug => "debug",
            SpecialForm::Define => "define",
            SpecialForm::DefineValues => "define-values",
            SpecialForm::Display => "display",
            SpecialForm::Do => "do",
            SpecialForm::Eval => "eval",
            SpecialForm::Format => "format",
            SpecialForm::If => "if",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Let => "let",
            SpecialForm::LetStar => "let*",
            SpecialForm::Letrec => "letrec",
            SpecialForm::LetrecStar => "letrec*",
            SpecialForm::LetValues => "let-values",
            SpecialForm::LetStarValues => "let*-values",
            SpecialForm::Newline => "newline",
            SpecialForm::Or => "or",
            SpecialForm::Parse => "parse",
            SpecialForm::Quasiquote => "quasiquote",
            SpecialForm::Quote => "quote",
            SpecialForm::Raise => "raise",
            SpecialForm::Set => "set!",
            SpecialForm::Unless => "unless",
            SpecialForm::Values => "values",
            SpecialForm::When => "when",
        }
    }

    pub fn from_keyword(name: &str) -> Option<SpecialForm> {
        KEYWORDS.get(name).copied()
    }

    pub fn eval(
        self,
        interp: &Interpreter,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        match self {
            SpecialForm::And => eval_and(interp, operands, env),
            SpecialForm::Apply => eval_apply(interp, operands, env),
            SpecialForm::Begin => eval_begin(interp, operands, env),
            SpecialForm::Case => eval_case(interp, operands, env),
            SpecialForm::Cond => eval_cond(interp, operands, env),
            SpecialForm::Debug => eval_debug(interp, env),
            SpecialForm::Define => eval_define(interp, operands, env),
            SpecialForm::DefineValues => eval_define_values(interp, operands, env),
            SpecialForm::Display => eval_display(interp, operands, env),
            SpecialForm::Do => eval_do(interp, operands, env),
            SpecialForm::Eval => eval_eval(interp, operands, env),
            SpecialForm::Format => eval_format(interp, operands, env),
            SpecialForm::If => eval_if(interp, operands, env),
            SpecialForm::Lambda => eval_lambda(interp, operands, env),
            SpecialForm::Let
            | SpecialForm::LetStar
            | SpecialForm::Letrec
            | SpecialForm::LetrecStar
            | SpecialForm::LetValues
            | SpecialForm::LetStarValues => eval_let(self, interp, operands, env),
            SpecialForm::Newline => eval_newline(interp, operands),
            SpecialForm::Or => eval_or(interp, operands, env),
            SpecialForm::Parse => eval_parse(interp, operands, env),
            SpecialForm::Quasiquote => eval_quasiquote(interp, operands, env),
            SpecialForm::Quote => eval_quote(operands),
            SpecialForm::Raise => eval_raise(interp, operands, env),
            SpecialForm::Set => eval_set(interp, operands, env),
            SpecialForm::Unless => eval_guarded(interp, "unless", false, operands, env),
            SpecialForm::Values => Ok(Value::Values(interp.eval_each(operands, env)?)),
            SpecialForm::When => eval_guarded(interp, "when", true, operands, env),
        }
    }
}

fn wrong_arity(form: &str, expected: Arity, operands: &[Value]) -> Error {
    Error::ArityMismatch {
        form: form.to_owned(),
        expected,
        given: operands.len(),
    }
}

fn is_keyword(value: &Value, keyword: &str) -> bool {
    matches!(value, Value::Symbol(name) if name == keyword)
}

/// Evaluate `body` in a new scope tagged `tag`, keeping the scope alive for a closure result.
fn eval_scoped_body(
    interp: &Interpreter,
    tag: &str,
    body: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let marker = env.push_scope(tag);
    let result = interp.eval_sequence(body, env)?;
    env.close_scope(marker, &result);
    Ok(result)
}

fn eval_and(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let mut result = Value::Bool(true);
    for operand in operands {
        result = interp.eval_expr(operand, env)?;
        if !result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

fn eval_or(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let mut result = Value::Bool(false);
    for operand in operands {
        result = interp.eval_expr(operand, env)?;
        if result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

/// `(apply proc args)`: the procedure expression is spliced in unevaluated,
/// so special forms can be applied too.
fn eval_apply(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    match operands {
        [proc_expr, args_expr] => {
            let args = interp.call_args("apply", args_expr, env)?;
            interp.call_procedure(proc_expr, args, env)
        }
        _ => Err(wrong_arity("apply", Arity::Exact(2), operands)),
    }
}

fn eval_begin(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    if operands.is_empty() {
        return Err(Error::improper("begin", "Empty begin"));
    }
    eval_scoped_body(interp, "begin", operands, env)
}

fn case_datum_error(datum: &Value) -> Error {
    Error::improper(
        "case",
        format!(
            "'case' requires datum to be in a list. Given: {}",
            stringify(datum)
        ),
    )
}

/// Data compare by value; a string key also matches a symbol datum with the same text
fn case_matches(datum: &Value, key: &Value) -> bool {
    match (datum, key) {
        (Value::Symbol(name), Value::String(text)) => name == text,
        (Value::Number(_) | Value::Bool(_) | Value::String(_) | Value::Symbol(_), _) => {
            datum == key
        }
        _ => false,
    }
}

fn eval_case(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let Some((key_expr, clauses)) = operands.split_first() else {
        return Err(wrong_arity("case", Arity::AtLeast(1), operands));
    };
    let key = interp.eval_expr(key_expr, env)?;

    for clause in clauses {
        let Value::List(items) = clause else {
            return Err(case_datum_error(clause));
        };
        let Some((datum, body)) = items.split_first() else {
            return Err(case_datum_error(clause));
        };

        let matched = match datum {
            Value::List(data) => data.iter().any(|item| case_matches(item, &key)),
            other if is_keyword(other, "else") => true,
            other => return Err(case_datum_error(other)),
        };
        if body.is_empty() {
            return Err(Error::improper(
                "case",
                "'case' requires a clause with one or more expressions.",
            ));
        }
        if matched {
            return eval_scoped_body(interp, "case", body, env);
        }
    }

    Ok(Value::Unspecified)
}

fn eval_cond(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let marker = env.push_scope("cond");

    for clause in operands {
        let Some((test, body)) = (match clause {
            Value::List(items) => items.split_first(),
            _ => None,
        }) else {
            return Err(Error::improper(
                "cond",
                format!("Improper 'cond' clause. Given: {}", stringify(clause)),
            ));
        };

        let test_value = if is_keyword(test, "else") {
            Value::Bool(true)
        } else {
            interp.eval_expr(test, env)?
        };
        if !test_value.is_truthy() {
            continue;
        }

        // A clause without body yields its test value
        let result = if body.is_empty() {
            test_value
        } else {
            interp.eval_sequence(body, env)?
        };
        env.close_scope(marker, &result);
        return Ok(result);
    }

    env.clear();
    Ok(Value::Unspecified)
}

fn eval_debug(interp: &Interpreter, env: &Environment) -> Result<Value, Error> {
    let lines: Vec<String> = env
        .recent(DEBUG_BINDINGS)
        .iter()
        .map(|binding| {
            let value = binding.value.as_ref().map_or_else(
                || stringify(&Value::Unspecified),
                |value| stringify_truncated(value, DEBUG_VALUE_TEXT),
            );
            format!("{} = {value}", binding.name)
        })
        .collect();

    interp.print(&format!("Environment:\n{}\n", lines.join("\n")));
    interp.arm_debug();
    Ok(Value::Unspecified)
}

fn eval_define(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    match operands {
        [Value::List(signature), body @ ..] => {
            let Some((Value::Symbol(name), params)) = signature.split_first() else {
                return Err(Error::improper(
                    "define",
                    format!(
                        "'define' requires a symbol. Given: {}",
                        stringify(&operands[0])
                    ),
                ));
            };
            // `(name . args)` takes every argument
            let params = match params {
                [dot, rest] if is_keyword(dot, ".") => rest.clone(),
                _ => Value::List(params.to_vec()),
            };

            let mut lambda = Vec::with_capacity(body.len() + 1);
            lambda.push(params);
            lambda.extend_from_slice(body);
            let closure = eval_lambda(interp, &lambda, env)?;
            env.add(name, closure, "closure")?;
        }
        [Value::Symbol(name), expr] => {
            let value = interp.eval_expr(expr, env)?;
            env.add(name, value, "define")?;
        }
        [other, _] => {
            return Err(Error::improper(
                "define",
                format!("'define' requires a symbol. Given: {}", stringify(other)),
            ));
        }
        _ => {
            return Err(Error::improper(
                "define",
                "'define' requires a symbol and an expression.",
            ));
        }
    }
    Ok(Value::Unspecified)
}

fn formal_names<'a>(keyword: &str, formals: &'a Value) -> Result<Vec<&'a str>, Error> {
    let improper = || {
        Error::improper(
            keyword,
            format!("Improper '{keyword}' bindings. Given: {}", stringify(formals)),
        )
    };
    let Value::List(items) = formals else {
        return Err(improper());
    };
    items
        .iter()
        .map(|item| match item {
            Value::Symbol(name) => Ok(name.as_str()),
            _ => Err(improper()),
        })
        .collect()
}

/// Evaluate `expr` to a `values` bundle of exactly `count` items.
fn eval_values(
    interp: &Interpreter,
    keyword: &str,
    count: usize,
    expr: &Value,
    env: &Environment,
) -> Result<Vec<Value>, Error> {
    let Value::Values(values) = interp.eval_expr(expr, env)? else {
        return Err(Error::improper(
            keyword,
            format!("Multiple values required in '{keyword}'"),
        ));
    };
    if values.len() != count {
        return Err(Error::improper(
            keyword,
            format!(
                "Values count does not match. Required: {count}, got: {}",
                values.len()
            ),
        ));
    }
    Ok(values)
}

fn eval_define_values(
    interp: &Interpreter,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let [formals, expr] = operands else {
        return Err(wrong_arity("define-values", Arity::Exact(2), operands));
    };
    let names = formal_names("define-values", formals)?;
    let values = eval_values(interp, "define-values", names.len(), expr, env)?;
    for (name, value) in names.into_iter().zip(values) {
        env.add(name, value, "define-values")?;
    }
    Ok(Value::Unspecified)
}

fn eval_display(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let [value] = interp.eval_args("display", operands, [ArgType::Any], env)?;
    interp.print(&stringify(&value));
    Ok(Value::Unspecified)
}

fn eval_newline(interp: &Interpreter, operands: &[Value]) -> Result<Value, Error> {
    Arity::Exact(0).validate("newline", operands.len())?;
    interp.print("\n");
    Ok(Value::Unspecified)
}

/// One `(name init step)` clause of `do`
struct DoVariable<'a> {
    name: &'a str,
    init: &'a Value,
    step: Option<&'a Value>,
}

fn do_syntax_error(operands: &[Value]) -> Error {
    let mut form = vec![sym("do")];
    form.extend_from_slice(operands);
    Error::improper(
        "do",
        format!("Improper 'do' syntax. Given: {}", stringify(&Value::List(form))),
    )
}

fn eval_do(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let [Value::List(specs), Value::List(exit), body @ ..] = operands else {
        return Err(do_syntax_error(operands));
    };
    let Some((test, result_forms)) = exit.split_first() else {
        return Err(do_syntax_error(operands));
    };
    let variables = specs
        .iter()
        .map(|spec| match spec {
            Value::List(items) => match items.as_slice() {
                [Value::Symbol(name), init] => Ok(DoVariable {
                    name: name.as_str(),
                    init,
                    step: None,
                }),
                [Value::Symbol(name), init, step] => Ok(DoVariable {
                    name: name.as_str(),
                    init,
                    step: Some(step),
                }),
                _ => Err(do_syntax_error(operands)),
            },
            _ => Err(do_syntax_error(operands)),
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let marker = env.push_scope("do");

    let inits = variables
        .iter()
        .map(|variable| interp.eval_expr(variable.init, env))
        .collect::<Result<Vec<_>, Error>>()?;
    for (variable, value) in variables.iter().zip(inits) {
        env.add(variable.name, value, "init")?;
    }

    while !interp.eval_expr(test, env)?.is_truthy() {
        interp.eval_sequence(body, env)?;

        // Every step sees the values of the previous iteration
        let mut steps = Vec::with_capacity(variables.len());
        for variable in &variables {
            if let Some(step) = variable.step {
                steps.push((variable.name, interp.eval_expr(step, env)?));
            }
        }
        for (name, value) in steps {
            env.set(name, value, "step")?;
        }
    }

    let result = interp.eval_sequence(result_forms, env)?;
    env.close_scope(marker, &result);
    Ok(result)
}

fn eval_eval(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let [datum] = interp.eval_args("eval", operands, [ArgType::Any], env)?;
    // A list is always a sequence of forms, as produced by `parse`
    let program = match datum {
        Value::List(items) => items,
        other => vec![other],
    };
    interp.nested()?.eval_program(&program)
}

/// Expand `~` directives in `pattern`; `leading` counts the operands before the arguments.
fn expand_format(pattern: &str, args: &[Value], leading: usize) -> Result<String, Error> {
    let mut out = String::with_capacity(pattern.len());
    let mut remaining = args.iter();
    let mut consumed = 0;
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        if ch != '~' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('\n'),
            Some('~') => out.push('~'),
            Some(_) => {
                consumed += 1;
                let arg = remaining.next().ok_or_else(|| Error::ArityMismatch {
                    form: "format".to_owned(),
                    expected: Arity::AtLeast(leading + consumed),
                    given: leading + args.len(),
                })?;
                out.push_str(&stringify(arg));
            }
            None => out.push('~'),
        }
    }

    Ok(out)
}

fn eval_format(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let values = interp.eval_each(operands, env)?;
    let (print, rest) = match values.split_first() {
        Some((Value::Bool(flag), rest)) => (*flag, rest),
        _ => (false, values.as_slice()),
    };
    let Some((pattern, args)) = rest.split_first() else {
        return Err(wrong_arity("format", Arity::AtLeast(1), operands));
    };
    let Value::String(pattern) = pattern else {
        return Err(type_mismatch("format", ArgType::String, pattern));
    };

    let text = expand_format(pattern, args, values.len() - args.len())?;
    if print {
        interp.print(&text);
        Ok(Value::Unspecified)
    } else {
        Ok(Value::String(text))
    }
}

fn eval_if(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    match operands {
        [test, consequent, alternative @ ..] if alternative.len() <= 1 => {
            if interp.eval_expr(test, env)?.is_truthy() {
                interp.eval_expr(consequent, env)
            } else {
                match alternative.first() {
                    Some(expr) => interp.eval_expr(expr, env),
                    None => Ok(Value::Unspecified),
                }
            }
        }
        _ => Err(wrong_arity("if", Arity::Range(2, 3), operands)),
    }
}

fn eval_lambda(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    match operands {
        [params, body @ ..] if !body.is_empty() => interp.make_closure(params, body, env),
        _ => {
            let mut form = vec![sym("lambda")];
            form.extend_from_slice(operands);
            Err(Error::improper(
                "lambda",
                format!("Improper lambda. Given: {}", stringify(&Value::List(form))),
            ))
        }
    }
}

/// `(name expr)` pairs of a `let`-style binding list
fn binding_pairs<'a>(
    keyword: &str,
    bindings: &'a [Value],
) -> Result<Vec<(&'a str, &'a Value)>, Error> {
    bindings
        .iter()
        .map(|binding| match binding {
            Value::List(items) => match items.as_slice() {
                [Value::Symbol(name), expr] => Ok((name.as_str(), expr)),
                _ => Err(binding_error(keyword, binding)),
            },
            _ => Err(binding_error(keyword, binding)),
        })
        .collect()
}

fn binding_error(keyword: &str, given: &Value) -> Error {
    Error::improper(
        keyword,
        format!("Improper '{keyword}' bindings. Given: {}", stringify(given)),
    )
}

fn eval_let(
    form: SpecialForm,
    interp: &Interpreter,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let keyword = form.keyword();
    if operands.len() < 2 {
        return Err(Error::improper(
            keyword,
            format!("Improper '{keyword}' syntax. Missing body."),
        ));
    }

    if form == SpecialForm::Let
        && let [Value::Symbol(name), Value::List(bindings), body @ ..] = operands
    {
        return eval_named_let(interp, name, bindings, body, env);
    }

    let Some((Value::List(bindings), body)) = operands.split_first() else {
        return Err(binding_error(keyword, &operands[0]));
    };

    let marker = env.push_scope(keyword);
    match form {
        SpecialForm::LetValues | SpecialForm::LetStarValues => {
            bind_let_values(form, interp, bindings, env)?;
        }
        _ => bind_let_variables(form, interp, bindings, env)?,
    }
    let result = interp.eval_sequence(body, env)?;
    env.close_scope(marker, &result);
    Ok(result)
}

/// `(let name ((var init) ...) body...)` runs as
/// `(begin (define name (lambda (var ...) body...)) (name init ...))`.
fn eval_named_let(
    interp: &Interpreter,
    name: &str,
    bindings: &[Value],
    body: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    if body.is_empty() {
        return Err(Error::improper(
            "let",
            "Improper named 'let' syntax. Missing body.",
        ));
    }
    let pairs = binding_pairs("let", bindings)?;

    let mut lambda = vec![
        sym("lambda"),
        Value::List(pairs.iter().map(|(var, _)| sym(var)).collect()),
    ];
    lambda.extend_from_slice(body);
    let define = Value::List(vec![sym("define"), sym(name), Value::List(lambda)]);

    let mut call = vec![sym(name)];
    call.extend(pairs.iter().map(|(_, init)| (*init).clone()));

    eval_begin(interp, &[define, Value::List(call)], env)
}

fn bind_let_variables(
    form: SpecialForm,
    interp: &Interpreter,
    bindings: &[Value],
    env: &Environment,
) -> Result<(), Error> {
    let keyword = form.keyword();
    let pairs = binding_pairs(keyword, bindings)?;

    match form {
        SpecialForm::LetStar => {
            for (name, expr) in pairs {
                let value = interp.eval_expr(expr, env)?;
                env.add(name, value, keyword)?;
            }
        }
        SpecialForm::Letrec => {
            for (name, _) in &pairs {
                env.add_placeholder(name, keyword)?;
            }
            let values = pairs
                .iter()
                .map(|(_, expr)| interp.eval_expr(expr, env))
                .collect::<Result<Vec<_>, Error>>()?;
            for ((name, _), value) in pairs.iter().zip(values) {
                env.set(name, value, keyword)?;
            }
        }
        SpecialForm::LetrecStar => {
            for (name, _) in &pairs {
                env.add_placeholder(name, keyword)?;
            }
            for (name, expr) in pairs {
                let value = interp.eval_expr(expr, env)?;
                env.set(name, value, keyword)?;
            }
        }
        _ => {
            // Inits are evaluated before any name is bound
            let values = pairs
                .iter()
                .map(|(_, expr)| interp.eval_expr(expr, env))
                .collect::<Result<Vec<_>, Error>>()?;
            for ((name, _), value) in pairs.iter().zip(values) {
                env.add(name, value, keyword)?;
            }
        }
    }
    Ok(())
}

fn bind_let_values(
    form: SpecialForm,
    interp: &Interpreter,
    bindings: &[Value],
    env: &Environment,
) -> Result<(), Error> {
    let keyword = form.keyword();
    let sequential = form == SpecialForm::LetStarValues;
    let mut pending = Vec::new();

    for binding in bindings {
        let Value::List(items) = binding else {
            return Err(binding_error(keyword, binding));
        };
        let [formals, expr] = items.as_slice() else {
            return Err(binding_error(keyword, binding));
        };
        let names = formal_names(keyword, formals)?;
        let values = eval_values(interp, keyword, names.len(), expr, env)?;

        if sequential {
            for (name, value) in names.into_iter().zip(values) {
                env.add(name, value, keyword)?;
            }
        } else {
            pending.extend(names.into_iter().zip(values));
        }
    }

    for (name, value) in pending {
        env.add(name, value, keyword)?;
    }
    Ok(())
}

fn eval_parse(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let [source] = interp.eval_args("parse", operands, [ArgType::String], env)?;
    Ok(Value::List(parse(source.as_str().unwrap_or_default())?))
}

fn eval_quasiquote(
    interp: &Interpreter,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    match operands {
        [template] => expand_template(interp, template, env),
        _ => Err(wrong_arity("quasiquote", Arity::Exact(1), operands)),
    }
}

/// `(marker expr)` when `value` is that two-element form
fn marked<'a>(value: &'a Value, marker: &str) -> Option<&'a Value> {
    match value {
        Value::List(items) => match items.as_slice() {
            [head, expr] if is_keyword(head, marker) => Some(expr),
            _ => None,
        },
        _ => None,
    }
}

fn expand_template(interp: &Interpreter, template: &Value, env: &Environment) -> Result<Value, Error> {
    let Value::List(items) = template else {
        return Ok(template.clone());
    };
    if let Some(expr) = marked(template, "unquote") {
        return interp.eval_expr(expr, env);
    }

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(expr) = marked(item, "unquote-splicing") {
            match interp.eval_expr(expr, env)? {
                Value::List(spliced) => out.extend(spliced),
                other => return Err(type_mismatch("unquote-splicing", ArgType::List, &other)),
            }
        } else {
            out.push(expand_template(interp, item, env)?);
        }
    }
    Ok(Value::List(out))
}

fn eval_quote(operands: &[Value]) -> Result<Value, Error> {
    match operands {
        [datum] => Ok(datum.clone()),
        _ => Err(wrong_arity("quote", Arity::Exact(1), operands)),
    }
}

fn eval_raise(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    let [value] = interp.eval_args("raise", operands, [ArgType::Any], env)?;
    Err(Error::Raised(value))
}

fn eval_set(interp: &Interpreter, operands: &[Value], env: &Environment) -> Result<Value, Error> {
    match operands {
        [Value::Symbol(name), expr] => {
            let value = interp.eval_expr(expr, env)?;
            env.set(name, value, "set!")?;
            Ok(Value::Unspecified)
        }
        [other, _] => Err(Error::improper(
            "set!",
            format!("'set!' requires a symbol. Given: {}", stringify(other)),
        )),
        _ => Err(wrong_arity("set!", Arity::Exact(2), operands)),
    }
}

/// `when` runs the body on a true guard, `unless` on a false one.
fn eval_guarded(
    interp: &Interpreter,
    keyword: &str,
    run_on: bool,
    operands: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let Some((test, body)) = operands.split_first() else {
        return Err(Error::improper(keyword, format!("Empty '{keyword}'")));
    };
    if body.is_empty() {
        return Err(Error::improper(keyword, format!("Empty '{keyword}' body")));
    }

    if interp.eval_expr(test, env)?.is_truthy() == run_on {
        eval_scoped_body(interp, keyword, body, env)
    } else {
        Ok(Value::Unspecified)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::options::Options;

    #[test]
    fn test_keyword_table() {
        for form in SpecialForm::ALL {
            assert_eq!(SpecialForm::from_keyword(form.keyword()), Some(form));
        }
        assert_eq!(SpecialForm::from_keyword("car"), None);
        assert_eq!(SpecialForm::from_keyword("import"), None);
    }

    #[test]
    fn test_expand_format() {
        let cases = vec![
            ("plain", vec![], Ok("plain")),
            ("~a and ~s", vec![val(1), val("x")], Ok("1 and x")),
            ("~%~~", vec![], Ok("\n~")),
            ("trailing ~", vec![], Ok("trailing ~")),
            ("~a ~a", vec![val(1)], Err("'format' requires at least 3 arguments. Given: 2 arguments")),
        ];

        for (pattern, args, expected) in cases {
            let result = expand_format(pattern, &args, 1);
            match expected {
                Ok(text) => assert_eq!(result.unwrap(), text, "{pattern}"),
                Err(message) => assert_eq!(result.unwrap_err().to_string(), message, "{pattern}"),
            }
        }
    }

    #[test]
    fn test_case_matching() {
        assert!(case_matches(&val(1), &val(1)));
        assert!(case_matches(&sym("a"), &sym("a")));
        assert!(case_matches(&sym("a"), &val("a")));
        assert!(case_matches(&val("a"), &val("a")));
        assert!(!case_matches(&val("a"), &sym("a")));
        assert!(!case_matches(&val([1]), &val([1])));
    }

    #[test]
    fn test_scoped_forms_leave_environment_balanced() {
        let interp = Interpreter::new(&Options::default()).unwrap();
        let env = Environment::new();
        let forms = [
            "(let ((a 1)) a)",
            "(let* ((a 1) (b a)) b)",
            "(letrec ((f (lambda () 1))) (f))",
            "(begin (define x 1) x)",
            "(when #t (define y 1) y)",
            "(cond (#f 1) (else 2))",
            "(cond (#f 1))",
            "(case 1 ((1) (define z 1) z))",
            "(do ((i 0 (+ i 1))) ((= i 2) i))",
            "(let loop ((i 0)) (if (< i 3) (loop (+ i 1)) i))",
        ];

        for source in forms {
            let program = parse(source).unwrap();
            interp.eval_in(&program, &env).unwrap();
            assert!(env.is_empty(), "{source} left {} bindings", env.len());
        }
    }

    #[test]
    fn test_closure_result_keeps_scope() {
        let interp = Interpreter::new(&Options::default()).unwrap();
        let env = Environment::new();
        let program = parse("(define f (let ((hidden 41)) (lambda () (+ hidden 1)))) (f)").unwrap();
        assert_eq!(interp.eval_in(&program, &env).unwrap(), val(42));
        // `hidden` stays reachable for the closure; only its scope marker went away
        assert!(env.recent(2).iter().any(|binding| binding.name == "hidden"));
    }
}

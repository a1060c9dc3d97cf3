//! Primitive procedure libraries.
//!
//! Libraries are consulted after the binding chain: a list headed by a name
//! that some library owns is handed to that library with its operands still
//! unevaluated, so each procedure decides how to evaluate them. Libraries
//! are searched in registration order and the first owner of a name wins.
//!
//! | Library      | Contents                                              |
//! |--------------|-------------------------------------------------------|
//! | `core-lib`   | type predicates, arithmetic, comparison, equality     |
//! | `ext-lib`    | host functions supplied through [`Options`]           |
//! | `list-lib`   | construction and access for flat lists, `map`         |
//! | `string-lib` | string construction, conversion and case mapping      |

use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::environment::Environment;
use crate::evaluator::Interpreter;
use crate::options::Options;

pub mod core;
pub mod ext;
pub mod list;
pub mod string;

/// A group of named procedures.
pub trait Library {
    fn name(&self) -> &str;

    /// Names of every procedure, in definition order
    fn procedures(&self) -> Vec<&str>;

    fn contains(&self, name: &str) -> bool;

    /// Evaluate a call to `name` with its unevaluated operands.
    fn eval_call(
        &self,
        interpreter: &Interpreter,
        name: &str,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error>;
}

/// Signature of builtin procedures: the procedure name and its unevaluated operands
pub type BuiltinFn = fn(&Interpreter, &str, &[Value], &Environment) -> Result<Value, Error>;

/// Definition of a built-in procedure
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    pub id: &'static str,
    pub func: BuiltinFn,
}

/// A static table of builtin procedures with a name index.
#[derive(Debug)]
pub struct BuiltinLibrary {
    name: &'static str,
    ops: Vec<BuiltinOp>,
    index: HashMap<&'static str, usize>,
}

impl BuiltinLibrary {
    fn new(name: &'static str, ops: Vec<BuiltinOp>) -> Self {
        let index = ops
            .iter()
            .enumerate()
            .map(|(position, op)| (op.id, position))
            .collect();
        BuiltinLibrary { name, ops, index }
    }

    pub fn find(&self, id: &str) -> Option<&BuiltinOp> {
        self.index.get(id).map(|&position| &self.ops[position])
    }
}

impl Library for &'static BuiltinLibrary {
    fn name(&self) -> &str {
        self.name
    }

    fn procedures(&self) -> Vec<&str> {
        self.ops.iter().map(|op| op.id).collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn eval_call(
        &self,
        interpreter: &Interpreter,
        name: &str,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        let op = self
            .find(name)
            .ok_or_else(|| Error::UnboundIdentifier(name.to_owned()))?;
        (op.func)(interpreter, name, operands, env)
    }
}

static CORE_LIB: LazyLock<BuiltinLibrary> =
    LazyLock::new(|| BuiltinLibrary::new("core-lib", self::core::ops()));

static LIST_LIB: LazyLock<BuiltinLibrary> =
    LazyLock::new(|| BuiltinLibrary::new("list-lib", self::list::ops()));

static STRING_LIB: LazyLock<BuiltinLibrary> =
    LazyLock::new(|| BuiltinLibrary::new("string-lib", self::string::ops()));

/// The libraries that can be named in [`Options::libs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryKind {
    Core,
    Ext,
    List,
    String,
}

impl LibraryKind {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "core-lib" => Ok(LibraryKind::Core),
            "ext-lib" => Ok(LibraryKind::Ext),
            "list-lib" => Ok(LibraryKind::List),
            "string-lib" => Ok(LibraryKind::String),
            _ => Err(Error::UnrecognizedLibrary(name.to_owned())),
        }
    }

    fn create(self, options: &Options) -> Box<dyn Library> {
        match self {
            LibraryKind::Core => Box::new(&*CORE_LIB),
            LibraryKind::Ext => Box::new(ext::ExtLibrary::new(options)),
            LibraryKind::List => Box::new(&*LIST_LIB),
            LibraryKind::String => Box::new(&*STRING_LIB),
        }
    }
}

/// Instantiate the libraries named in `options`, in order.
pub fn create_libraries(options: &Options) -> Result<Vec<Box<dyn Library>>, Error> {
    options
        .libs
        .iter()
        .map(|name| {
            let library = LibraryKind::from_name(name)?.create(options);
            debug!(
                library = name.as_str(),
                procedures = library.procedures().len(),
                "registered library"
            );
            Ok(library)
        })
        .collect()
}

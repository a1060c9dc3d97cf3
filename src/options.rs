use std::any::Any;
use std::io::Write;
use std::rc::Rc;

use crate::MAX_EVAL_DEPTH;
use crate::libs::ext::{HostFn, IntoHostFunction};

/// Library names registered when none are specified, in lookup order
pub const DEFAULT_LIBS: [&str; 4] = ["core-lib", "ext-lib", "list-lib", "string-lib"];

/// Evaluation settings shared by every interpreter built from them.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use schemy::{Options, evaluate};
///
/// let output = Rc::new(RefCell::new(String::new()));
/// let sink = Rc::clone(&output);
/// let options = Options::default()
///     .with_printer(move |text| sink.borrow_mut().push_str(text))
///     .with_ext_function("twice", |n: f64| n * 2.0);
///
/// evaluate("(display (twice 21))", &options).unwrap();
/// assert_eq!(output.borrow().as_str(), "42");
/// ```
#[derive(Clone)]
pub struct Options {
    /// Receives every chunk written by `display`, `newline`, `format #t` and `debug`
    pub printer: Rc<dyn Fn(&str)>,
    /// Libraries to register; earlier libraries win name collisions
    pub libs: Vec<String>,
    /// Handed to every host function call
    pub ext_context: Option<Rc<dyn Any>>,
    /// Host functions exposed through `ext-lib`
    pub ext_functions: Vec<(String, Rc<HostFn>)>,
    /// Nesting limit for compound expressions
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            printer: Rc::new(|text| {
                let mut stdout = std::io::stdout();
                // Output is best effort; a closed stdout is not an evaluation error
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }),
            libs: DEFAULT_LIBS.iter().map(|name| (*name).to_owned()).collect(),
            ext_context: None,
            ext_functions: Vec::new(),
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ext_names: Vec<&str> = self
            .ext_functions
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        f.debug_struct("Options")
            .field("libs", &self.libs)
            .field("ext_functions", &ext_names)
            .field("has_ext_context", &self.ext_context.is_some())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Options {
    #[must_use]
    pub fn with_printer<F>(mut self, printer: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.printer = Rc::new(printer);
        self
    }

    #[must_use]
    pub fn with_libs<I, S>(mut self, libs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libs = libs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_ext_context<T: Any>(mut self, context: T) -> Self {
        self.ext_context = Some(Rc::new(context));
        self
    }

    /// Register a strongly-typed Rust function or closure under `name`.
    ///
    /// Arguments are converted from interpreter values and the return value
    /// converted back; mismatches become interpreter errors.
    #[must_use]
    pub fn with_ext_function<Args, F>(mut self, name: &str, function: F) -> Self
    where
        F: IntoHostFunction<Args>,
    {
        self.ext_functions
            .push((name.to_owned(), function.into_host_function()));
        self
    }

    /// Register a function that sees the raw argument values and the context.
    #[must_use]
    pub fn with_ext_function_raw<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(Vec<crate::ast::Value>, Option<&dyn Any>) -> Result<crate::ast::Value, crate::Error>
            + 'static,
    {
        self.ext_functions.push((name.to_owned(), Rc::new(function)));
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

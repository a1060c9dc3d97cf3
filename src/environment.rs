//! The binding stack.
//!
//! An [`Environment`] is a flat, ordered stack of bindings. A binding named
//! [`SCOPE_MARKER`] opens a scope; names are unique between the top of the
//! stack and the nearest marker. Lookups scan the whole stack from the top,
//! so inner bindings shadow outer ones.
//!
//! Bindings are shared cells: a call frame is a copy of the captured stack
//! whose entries point at the same cells, so `set!` inside a call is visible
//! to every holder of the binding.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;
use crate::libs::Library;

/// Name of the binding that opens a scope
pub const SCOPE_MARKER: &str = "#scope";

struct Slot {
    /// `None` is the placeholder used while `letrec` bindings are initialised
    value: Option<Value>,
    modifier: &'static str,
}

struct Binding {
    name: String,
    slot: RefCell<Slot>,
}

impl Binding {
    fn new(name: &str, value: Option<Value>, modifier: &'static str) -> Rc<Binding> {
        Rc::new(Binding {
            name: name.to_owned(),
            slot: RefCell::new(Slot { value, modifier }),
        })
    }
}

/// Copy of one binding, as reported by [`Environment::recent`]
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSnapshot {
    pub name: String,
    /// `None` for a `letrec` placeholder
    pub value: Option<Value>,
    /// Form that created or last assigned the binding
    pub modifier: &'static str,
}

/// Cheaply clonable handle to a binding stack
#[derive(Clone, Default)]
pub struct Environment {
    bindings: Rc<RefCell<Vec<Rc<Binding>>>>,
}

impl std::fmt::Debug for Environment {
    // Bindings may hold closures that capture this environment
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.len())
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }

    fn exists_in_scope(&self, name: &str) -> bool {
        self.bindings
            .borrow()
            .iter()
            .rev()
            .take_while(|binding| binding.name != SCOPE_MARKER)
            .any(|binding| binding.name == name)
    }

    /// Bind `name` in the current scope.
    pub fn add(&self, name: &str, value: Value, modifier: &'static str) -> Result<(), Error> {
        if matches!(value, Value::Unspecified) {
            return Err(Error::CannotBindUnspecified(name.to_owned()));
        }
        if self.exists_in_scope(name) {
            return Err(Error::AlreadyDefined(name.to_owned()));
        }
        self.bindings
            .borrow_mut()
            .push(Binding::new(name, Some(value), modifier));
        Ok(())
    }

    /// Declare `name` without a value; looking it up fails until it is `set`.
    pub fn add_placeholder(&self, name: &str, modifier: &'static str) -> Result<(), Error> {
        if self.exists_in_scope(name) {
            return Err(Error::AlreadyDefined(name.to_owned()));
        }
        self.bindings
            .borrow_mut()
            .push(Binding::new(name, None, modifier));
        Ok(())
    }

    /// Update the most recent binding of `name` anywhere in the stack.
    pub fn set(&self, name: &str, value: Value, modifier: &'static str) -> Result<(), Error> {
        if matches!(value, Value::Unspecified) {
            return Err(Error::CannotBindUnspecified(name.to_owned()));
        }
        let bindings = self.bindings.borrow();
        let binding = bindings
            .iter()
            .rev()
            .find(|binding| binding.name == name)
            .ok_or_else(|| Error::NotDefined(name.to_owned()))?;
        let mut slot = binding.slot.borrow_mut();
        slot.value = Some(value);
        slot.modifier = modifier;
        Ok(())
    }

    /// Resolve `name`: bindings first, then library procedures.
    ///
    /// A library procedure resolves to its own name as a symbol.
    pub fn lookup(&self, name: &str, libs: &[Box<dyn Library>]) -> Result<Value, Error> {
        {
            let bindings = self.bindings.borrow();
            if let Some(binding) = bindings.iter().rev().find(|binding| binding.name == name) {
                return binding
                    .slot
                    .borrow()
                    .value
                    .clone()
                    .ok_or_else(|| Error::UnspecifiedValue(name.to_owned()));
            }
        }

        if libs.iter().any(|lib| lib.contains(name)) {
            return Ok(Value::Symbol(name.to_owned()));
        }
        Err(Error::UnboundIdentifier(name.to_owned()))
    }

    pub fn has(&self, name: &str, libs: &[Box<dyn Library>]) -> bool {
        self.bindings
            .borrow()
            .iter()
            .any(|binding| binding.name == name)
            || libs.iter().any(|lib| lib.contains(name))
    }

    /// Open a scope tagged with the form that opened it.
    /// Returns the marker's index for [`Environment::close_scope`].
    pub fn push_scope(&self, tag: &str) -> usize {
        let mut bindings = self.bindings.borrow_mut();
        bindings.push(Binding::new(
            SCOPE_MARKER,
            Some(Value::String(tag.to_owned())),
            "scope",
        ));
        bindings.len() - 1
    }

    /// Pop bindings up to and including the most recent scope marker.
    pub fn clear(&self) {
        let mut bindings = self.bindings.borrow_mut();
        while let Some(binding) = bindings.pop() {
            if binding.name == SCOPE_MARKER {
                break;
            }
        }
    }

    /// Drop only the scope marker at `index`, keeping the scope's bindings.
    pub fn remove_scope_marker(&self, index: usize) {
        let mut bindings = self.bindings.borrow_mut();
        if bindings
            .get(index)
            .is_some_and(|binding| binding.name == SCOPE_MARKER)
        {
            bindings.remove(index);
        }
    }

    /// End a scope opened by [`Environment::push_scope`].
    ///
    /// When the scope produced a closure its bindings stay alive for that
    /// closure and only the marker goes; otherwise the scope is cleared.
    pub fn close_scope(&self, marker: usize, result: &Value) {
        if matches!(result, Value::Closure(_)) {
            self.remove_scope_marker(marker);
        } else {
            self.clear();
        }
    }

    /// Drop bindings above `len`, restoring an earlier stack height.
    pub fn truncate(&self, len: usize) {
        self.bindings.borrow_mut().truncate(len);
    }

    /// A new stack holding the same binding cells, used as a call frame.
    pub fn extend_for_call(&self) -> Environment {
        Environment {
            bindings: Rc::new(RefCell::new(self.bindings.borrow().clone())),
        }
    }

    /// The `count` most recent bindings, newest first.
    pub fn recent(&self, count: usize) -> Vec<BindingSnapshot> {
        self.bindings
            .borrow()
            .iter()
            .rev()
            .take(count)
            .map(|binding| {
                let slot = binding.slot.borrow();
                BindingSnapshot {
                    name: binding.name.clone(),
                    value: slot.value.clone(),
                    modifier: slot.modifier,
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::libs::create_libraries;
    use crate::options::Options;

    #[test]
    fn test_add_and_lookup() {
        let env = Environment::new();
        env.add("x", val(1), "define").unwrap();
        assert_eq!(env.lookup("x", &[]).unwrap(), val(1));
        assert_eq!(
            env.add("x", val(2), "define").unwrap_err(),
            Error::AlreadyDefined("x".into())
        );
        assert_eq!(
            env.add("y", Value::Unspecified, "define").unwrap_err(),
            Error::CannotBindUnspecified("y".into())
        );
        assert_eq!(
            env.lookup("missing", &[]).unwrap_err(),
            Error::UnboundIdentifier("missing".into())
        );
    }

    #[test]
    fn test_scopes_shadow_and_clear() {
        let env = Environment::new();
        env.add("x", val(1), "define").unwrap();

        env.push_scope("let");
        env.add("x", val(2), "let").unwrap();
        assert_eq!(env.lookup("x", &[]).unwrap(), val(2));
        env.clear();

        assert_eq!(env.lookup("x", &[]).unwrap(), val(1));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_set_searches_whole_stack() {
        let env = Environment::new();
        env.add("x", val(1), "define").unwrap();
        env.push_scope("begin");
        env.set("x", val(5), "set!").unwrap();
        env.clear();

        assert_eq!(env.lookup("x", &[]).unwrap(), val(5));
        assert_eq!(env.recent(1)[0].modifier, "set!");
        assert_eq!(
            env.set("nope", val(1), "set!").unwrap_err(),
            Error::NotDefined("nope".into())
        );
    }

    #[test]
    fn test_placeholder() {
        let env = Environment::new();
        env.add_placeholder("f", "letrec").unwrap();
        assert!(env.has("f", &[]));
        assert_eq!(
            env.lookup("f", &[]).unwrap_err(),
            Error::UnspecifiedValue("f".into())
        );
        env.set("f", val(3), "letrec").unwrap();
        assert_eq!(env.lookup("f", &[]).unwrap(), val(3));
    }

    #[test]
    fn test_call_frame_shares_cells() {
        let env = Environment::new();
        env.add("counter", val(0), "define").unwrap();

        let frame = env.extend_for_call();
        frame.push_scope("f");
        frame.add("local", val(1), "arg").unwrap();
        frame.set("counter", val(1), "set!").unwrap();

        assert_eq!(env.lookup("counter", &[]).unwrap(), val(1));
        assert!(!env.has("local", &[]));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_close_scope_retains_frame_for_closures() {
        let env = Environment::new();
        let marker = env.push_scope("let");
        env.add("x", val(1), "let").unwrap();
        env.close_scope(marker, &val(1));
        assert!(env.is_empty());

        let marker = env.push_scope("let");
        env.add("x", val(1), "let").unwrap();
        let closure = crate::evaluate("(lambda () 1)", &Options::default()).unwrap();
        env.close_scope(marker, &closure);
        assert_eq!(env.len(), 1);
        assert_eq!(env.lookup("x", &[]).unwrap(), val(1));
    }

    #[test]
    fn test_library_fallthrough() {
        let libs = create_libraries(&Options::default()).unwrap();
        let env = Environment::new();
        assert_eq!(env.lookup("car", &libs).unwrap(), Value::Symbol("car".into()));
        assert!(env.has("+", &libs));

        env.add("car", val(1), "define").unwrap();
        assert_eq!(env.lookup("car", &libs).unwrap(), val(1));
    }

    #[test]
    fn test_recent_newest_first() {
        let env = Environment::new();
        env.add("a", val(1), "define").unwrap();
        env.add("b", val(2), "define").unwrap();
        env.add_placeholder("c", "letrec").unwrap();

        let recent = env.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "c");
        assert_eq!(recent[0].value, None);
        assert_eq!(
            recent[1],
            BindingSnapshot {
                name: "b".to_owned(),
                value: Some(val(2)),
                modifier: "define",
            }
        );
    }
}

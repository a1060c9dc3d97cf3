//! Top-level `(import "<location>")` resolution.
//!
//! Before a program runs, every top-level import form is replaced in place by
//! the parsed forms of the code it names. Resolvers fetch source text; a
//! [`CachedResolver`] keeps parsed code keyed by location so later imports of
//! the same location skip fetching and parsing. [`JsonFileCache`] persists
//! that cache as JSON between runs.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::parser::parse;

/// Bumped whenever the cached code encoding changes
const CACHE_VERSION: u32 = 1;

fn import_error(location: &str, message: impl Into<String>) -> Error {
    Error::Import {
        location: location.to_owned(),
        message: message.into(),
    }
}

/// Source of imported code.
pub trait ImportResolver {
    /// Source text stored at `location`.
    fn fetch(&mut self, location: &str) -> Result<String, Error>;

    /// Parsed forms for `location`.
    fn load(&mut self, location: &str) -> Result<Vec<Value>, Error> {
        let source = self.fetch(location)?;
        parse(&source)
    }
}

/// Reads imports as files relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileResolver {
    base: PathBuf,
}

impl FileResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FileResolver { base: base.into() }
    }
}

impl ImportResolver for FileResolver {
    fn fetch(&mut self, location: &str) -> Result<String, Error> {
        let path = self.base.join(location);
        fs::read_to_string(&path).map_err(|e| import_error(location, e.to_string()))
    }
}

/// Storage for parsed import code, keyed by location.
pub trait CodeCache {
    fn get(&self, location: &str) -> Option<Vec<Value>>;
    fn put(&mut self, location: &str, code: &[Value]) -> Result<(), Error>;
}

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, Vec<Value>>,
}

impl CodeCache for MemoryCache {
    fn get(&self, location: &str) -> Option<Vec<Value>> {
        self.entries.get(location).cloned()
    }

    fn put(&mut self, location: &str, code: &[Value]) -> Result<(), Error> {
        self.entries.insert(location.to_owned(), code.to_vec());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, Vec<serde_json::Value>>,
}

impl Default for CacheFile {
    fn default() -> Self {
        CacheFile {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Encode parsed code as JSON: symbols are strings, string literals are
/// `{"str": text}` objects and lists are arrays.
fn code_to_json(value: &Value) -> Result<serde_json::Value, String> {
    match value {
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| format!("cannot encode number {n}")),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Symbol(name) => Ok(serde_json::Value::String(name.clone())),
        Value::String(text) => Ok(serde_json::json!({ "str": text })),
        Value::List(items) => items
            .iter()
            .map(code_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        other => Err(format!("cannot cache a {} value", other.type_name())),
    }
}

fn code_from_json(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::String(name) => Some(Value::Symbol(name.clone())),
        serde_json::Value::Object(fields) => match fields.get("str") {
            Some(serde_json::Value::String(text)) if fields.len() == 1 => {
                Some(Value::String(text.clone()))
            }
            _ => None,
        },
        serde_json::Value::Array(items) => items
            .iter()
            .map(code_from_json)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        serde_json::Value::Null => None,
    }
}

/// Cache persisted as a JSON file, rewritten on every insert.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    file: CacheFile,
}

impl JsonFileCache {
    /// Open the cache at `path`; a missing file or a file written by another
    /// cache version starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();

        let file = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| import_error(&location, e.to_string()))?;
            let file: CacheFile = serde_json::from_str(&text)
                .map_err(|e| import_error(&location, format!("Invalid cache file: {e}")))?;
            if file.version == CACHE_VERSION {
                file
            } else {
                debug!(path = %location, version = file.version, "discarding stale import cache");
                CacheFile::default()
            }
        } else {
            CacheFile::default()
        };

        Ok(JsonFileCache { path, file })
    }

    pub fn len(&self) -> usize {
        self.file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.entries.is_empty()
    }
}

impl CodeCache for JsonFileCache {
    fn get(&self, location: &str) -> Option<Vec<Value>> {
        self.file
            .entries
            .get(location)?
            .iter()
            .map(code_from_json)
            .collect()
    }

    fn put(&mut self, location: &str, code: &[Value]) -> Result<(), Error> {
        let encoded = code
            .iter()
            .map(code_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| import_error(location, message))?;
        self.file.entries.insert(location.to_owned(), encoded);

        let text = serde_json::to_string_pretty(&self.file)
            .map_err(|e| import_error(location, e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| import_error(location, e.to_string()))
    }
}

/// Wraps a resolver with a cache of parsed code.
#[derive(Debug)]
pub struct CachedResolver<R, C> {
    inner: R,
    cache: C,
}

impl<R: ImportResolver, C: CodeCache> CachedResolver<R, C> {
    pub fn new(inner: R, cache: C) -> Self {
        CachedResolver { inner, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

impl<R: ImportResolver, C: CodeCache> ImportResolver for CachedResolver<R, C> {
    fn fetch(&mut self, location: &str) -> Result<String, Error> {
        self.inner.fetch(location)
    }

    fn load(&mut self, location: &str) -> Result<Vec<Value>, Error> {
        if let Some(code) = self.cache.get(location)
            && !code.is_empty()
        {
            debug!(location, forms = code.len(), "import cache hit");
            return Ok(code);
        }

        let code = self.inner.load(location)?;
        self.cache.put(location, &code)?;
        Ok(code)
    }
}

/// The location named by an `(import ...)` form, or `None` for any other form
fn import_location(form: &Value) -> Option<Result<&str, Error>> {
    let Value::List(items) = form else {
        return None;
    };
    match items.as_slice() {
        [Value::Symbol(head), rest @ ..] if head == "import" => Some(match rest {
            [Value::String(location)] if !location.is_empty() => Ok(location.as_str()),
            _ => Err(import_error("", "Empty library name")),
        }),
        _ => None,
    }
}

/// Replace each top-level import form with the code it names, in order.
pub fn resolve_imports(
    program: Vec<Value>,
    resolver: &mut dyn ImportResolver,
) -> Result<Vec<Value>, Error> {
    let mut resolved = Vec::with_capacity(program.len());

    for form in program {
        match import_location(&form) {
            Some(location) => {
                let location = location?;
                let code = resolver.load(location)?;
                debug!(location, forms = code.len(), "resolved import");
                resolved.extend(code);
            }
            None => resolved.push(form),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use pretty_assertions::assert_eq;

    /// Serves sources from memory and counts fetches
    #[derive(Default)]
    struct MapResolver {
        sources: HashMap<String, String>,
        fetches: usize,
    }

    impl MapResolver {
        fn with(location: &str, source: &str) -> Self {
            let mut resolver = MapResolver::default();
            resolver.sources.insert(location.to_owned(), source.to_owned());
            resolver
        }
    }

    impl ImportResolver for MapResolver {
        fn fetch(&mut self, location: &str) -> Result<String, Error> {
            self.fetches += 1;
            self.sources
                .get(location)
                .cloned()
                .ok_or_else(|| import_error(location, "not found"))
        }
    }

    #[test]
    fn test_imports_are_spliced_in_place() {
        let mut resolver = MapResolver::with("lib.scm", "(define a 1) (define b 2)");
        let program = parse("(define z 0) (import \"lib.scm\") (+ a b)").unwrap();

        let resolved = resolve_imports(program, &mut resolver).unwrap();
        let expected = parse("(define z 0) (define a 1) (define b 2) (+ a b)").unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_import_errors() {
        let mut resolver = MapResolver::default();
        let cases = vec![
            ("(import \"\")", "Cannot import '': Empty library name"),
            ("(import lib)", "Cannot import '': Empty library name"),
            ("(import)", "Cannot import '': Empty library name"),
            ("(import \"missing.scm\")", "Cannot import 'missing.scm': not found"),
        ];

        for (source, expected) in cases {
            let err = resolve_imports(parse(source).unwrap(), &mut resolver).unwrap_err();
            assert_eq!(err.to_string(), expected, "{source}");
        }
    }

    #[test]
    fn test_nested_import_forms_are_left_alone() {
        let mut resolver = MapResolver::default();
        let program = parse("(begin (import \"x\"))").unwrap();
        assert_eq!(resolve_imports(program.clone(), &mut resolver).unwrap(), program);
        assert_eq!(resolver.fetches, 0);
    }

    #[test]
    fn test_memory_cache_skips_refetch() {
        let inner = MapResolver::with("lib.scm", "(define a 1)");
        let mut resolver = CachedResolver::new(inner, MemoryCache::default());

        for _ in 0..3 {
            let program = parse("(import \"lib.scm\")").unwrap();
            resolve_imports(program, &mut resolver).unwrap();
        }
        assert_eq!(resolver.inner.fetches, 1);
    }

    #[test]
    fn test_json_encoding_keeps_strings_and_symbols_apart() {
        let code = parse("(define s \"text\") (f 1.5 #t '(a \"b\"))").unwrap();
        let encoded: Vec<_> = code.iter().map(|form| code_to_json(form).unwrap()).collect();
        let decoded: Vec<_> = encoded.iter().map(|json| code_from_json(json).unwrap()).collect();
        assert_eq!(decoded, code);

        assert_eq!(code_to_json(&sym("x")).unwrap(), serde_json::json!("x"));
        assert_eq!(code_to_json(&val("x")).unwrap(), serde_json::json!({ "str": "x" }));
        assert!(code_to_json(&Value::Unspecified).is_err());
        assert_eq!(code_from_json(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_json_file_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("imports.json");

        let mut cache = JsonFileCache::open(&cache_path).unwrap();
        assert!(cache.is_empty());
        let code = parse("(define greeting \"hi\")").unwrap();
        cache.put("greet.scm", &code).unwrap();

        let reopened = JsonFileCache::open(&cache_path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("greet.scm"), Some(code));
        assert_eq!(reopened.get("other.scm"), None);
    }

    #[test]
    fn test_stale_cache_version_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("imports.json");
        fs::write(&cache_path, r#"{"version": 0, "entries": {"a": [1]}}"#).unwrap();

        let cache = JsonFileCache::open(&cache_path).unwrap();
        assert!(cache.is_empty());

        fs::write(&cache_path, "not json").unwrap();
        let err = JsonFileCache::open(&cache_path).unwrap_err();
        assert!(err.to_string().contains("Invalid cache file"));
    }

    #[test]
    fn test_file_resolver() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("math.scm"), "(define (sq x) (* x x))").unwrap();

        let mut resolver = FileResolver::new(dir.path());
        let code = resolver.load("math.scm").unwrap();
        assert_eq!(code.len(), 1);
        assert!(resolver.load("nope.scm").is_err());
    }
}

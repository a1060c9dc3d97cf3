//! Whole-program behaviour through the public entry points.
#![expect(clippy::unwrap_used)] // test code OK

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use schemy::ast::{Value, sym, val};
use schemy::import::{CachedResolver, FileResolver, JsonFileCache};
use schemy::{
    Arity, Error, Options, ParseErrorKind, evaluate, evaluate_to_string, evaluate_with_imports,
};

fn run(source: &str) -> Result<Value, Error> {
    evaluate(source, &Options::default())
}

#[test]
fn lambda_arity_is_checked() {
    assert_eq!(run("((lambda (a b) a) 1 2)"), Ok(val(1)));

    for (source, given) in [("((lambda (a b) a) 1)", 1), ("((lambda (a b) a) 1 2 3)", 3)] {
        match run(source) {
            Err(Error::ArityMismatch { expected, given: actual, .. }) => {
                assert_eq!(expected, Arity::Exact(2), "{source}");
                assert_eq!(actual, given, "{source}");
            }
            other => panic!("{source}: expected an arity error, got {other:?}"),
        }
    }
}

#[test]
fn variadic_parameters_collect_the_rest() {
    assert_eq!(run("((lambda (h . t) t) 1 2 3)"), Ok(val([2, 3])));
    assert_eq!(run("((lambda a a) 1 2 3)"), Ok(val([1, 2, 3])));
    assert_eq!(run("((lambda (h . t) t) 1)"), Ok(val(Vec::<Value>::new())));
}

#[test]
fn named_let_recursion() {
    let source = "(let loop ([n 5] [acc 0]) (if (> n 0) (loop (- n 1) (+ acc n)) acc))";
    assert_eq!(run(source), Ok(val(15)));
}

#[test]
fn escaping_closures_keep_their_frame() {
    assert_eq!(
        run("(define add2 ((lambda (m) (lambda (n) (+ m n))) 2)) (add2 3)"),
        Ok(val(5))
    );

    let source = "
        (define (make-counter)
          (define count 0)
          (lambda () (set! count (+ count 1)) count))
        (define c1 (make-counter))
        (define c2 (make-counter))
        (c1) (c1) (c2)
        (list (c1) (c2))";
    assert_eq!(run(source), Ok(val([3, 2])));
}

#[test]
fn closures_see_set_but_not_later_frames() {
    let shadowed = "
        (define a 1)
        (define f (lambda () a))
        (define (g a) (f))
        (g 2)";
    assert_eq!(run(shadowed), Ok(val(1)));

    let mutated = "
        (define a 1)
        (define f (lambda () a))
        (set! a 2)
        (f)";
    assert_eq!(run(mutated), Ok(val(2)));
}

#[test]
fn division_by_zero_is_an_error() {
    assert_eq!(run("(/ 5 0)"), Err(Error::DivisionByZero("/".into())));
    assert_eq!(
        evaluate_to_string("(/ 5 0)", &Options::default()),
        "Error: '/' division by zero."
    );
}

#[test]
fn unbalanced_brackets_are_rejected() {
    for (source, family) in [("(define x 1", "round"), ("(define x 1]", "square")] {
        match run(source) {
            Err(Error::Parse(err)) => {
                assert_eq!(err.kind, ParseErrorKind::UnmatchedBrackets, "{source}");
                assert!(err.message.contains(family), "{source}: {}", err.message);
            }
            other => panic!("{source}: expected a parse error, got {other:?}"),
        }
    }
}

#[test]
fn quote_and_list_agree() {
    assert_eq!(run("'(1 2 3)"), run("(list 1 2 3)"));
    assert_eq!(run("(equal? '(1 2 3) (list 1 2 3))"), Ok(val(true)));
}

#[test]
fn raised_values_pass_through_the_string_boundary() {
    let options = Options::default();
    assert_eq!(evaluate_to_string("(raise \"bad input\")", &options), "bad input");
    assert_eq!(evaluate_to_string("(raise '(code 42))", &options), "(code 42)");
    assert_eq!(run("(raise 'oops)"), Err(Error::Raised(sym("oops"))));
    assert_eq!(evaluate_to_string("(define x 1)", &options), "");
}

#[test]
fn errors_abort_the_rest_of_the_program() {
    let output = Rc::new(RefCell::new(String::new()));
    let sink = Rc::clone(&output);
    let options = Options::default().with_printer(move |text| sink.borrow_mut().push_str(text));

    let result = evaluate("(display 1) (car '()) (display 2)", &options);
    assert!(result.is_err());
    assert_eq!(output.borrow().as_str(), "1");
}

#[test]
fn library_selection_limits_procedures() {
    let options = Options::default().with_libs(["core-lib"]);
    assert_eq!(evaluate("(+ 1 2)", &options), Ok(val(3)));
    assert_eq!(
        evaluate("(list 1 2)", &options),
        Err(Error::UnboundIdentifier("list".into()))
    );

    let unknown = Options::default().with_libs(["core-lib", "math-lib"]);
    assert_eq!(
        evaluate("1", &unknown),
        Err(Error::UnrecognizedLibrary("math-lib".into()))
    );
}

#[test]
fn host_functions_receive_context() {
    let options = Options::default()
        .with_ext_context(10.0_f64)
        .with_ext_function_raw("scaled", |args, context| {
            let factor = context
                .and_then(|c| c.downcast_ref::<f64>())
                .copied()
                .unwrap_or(1.0);
            let n = args.first().and_then(Value::as_number).unwrap_or_default();
            Ok(Value::Number(n * factor))
        });
    assert_eq!(evaluate("(scaled (+ 1 2))", &options), Ok(val(30)));
}

#[test]
fn hundred_doors_runs_under_the_default_limit() {
    let source = "
        (define (toggle nth doors)
            (define (loop n rest acc)
                (if (pair? rest)
                    (if (= n nth)
                        (loop 1 (cdr rest) (cons (if (eq? (car rest) 1) 0 1) acc))
                        (loop (+ n 1) (cdr rest) (cons (car rest) acc)))
                    (reverse acc)))
            (loop 1 doors (list)))
        (define (run doors)
            (define (loop n acc)
                (if (<= n (length doors))
                    (loop (+ n 1) (toggle n acc))
                    acc))
            (loop 1 doors))
        (run (make-list 100 0))";
    let open_doors: Vec<Value> = (1..=100)
        .map(|door: u32| {
            let root = door.isqrt();
            val(if root * root == door { 1 } else { 0 })
        })
        .collect();
    assert_eq!(run(source), Ok(val(open_doors)));
}

#[test]
fn long_loops_run_under_the_default_limit() {
    assert_eq!(
        run("(let loop ((i 0)) (if (< i 1000) (loop (+ i 1)) i))"),
        Ok(val(1000))
    );
}

#[test]
fn runaway_recursion_stops_at_the_default_limit() {
    assert_eq!(
        run("(define (down n) (+ 1 (down n))) (down 0)"),
        Err(Error::EvalDepthExceeded(schemy::MAX_EVAL_DEPTH))
    );
}

#[test]
fn deep_recursion_hits_the_depth_limit() {
    let options = Options::default().with_max_depth(64);
    let down = "(define (down n) (if (= n 0) 0 (down (- n 1))))";
    assert_eq!(
        evaluate(&format!("{down} (down 1000)"), &options),
        Err(Error::EvalDepthExceeded(64))
    );
    assert_eq!(evaluate(&format!("{down} (down 3)"), &options), Ok(val(0)));
}

#[test]
fn imports_resolve_from_files_through_a_persistent_cache() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("math.scm"),
        "(define (square x) (* x x)) (define unit \"cm\")",
    )
    .unwrap();
    let cache_path = dir.path().join("cache.json");
    let source = "(import \"math.scm\") (list (square 4) unit)";
    let options = Options::default();

    let mut resolver = CachedResolver::new(
        FileResolver::new(dir.path()),
        JsonFileCache::open(&cache_path).unwrap(),
    );
    let mut first = None;
    evaluate_with_imports(source, &options, &mut resolver, |result| first = Some(result));
    assert_eq!(first, Some(Ok(val(vec![val(16), val("cm")]))));

    // The library file is gone; the cache alone serves the import
    fs::remove_file(dir.path().join("math.scm")).unwrap();
    let mut resolver = CachedResolver::new(
        FileResolver::new(dir.path()),
        JsonFileCache::open(&cache_path).unwrap(),
    );
    let mut second = None;
    evaluate_with_imports(source, &options, &mut resolver, |result| second = Some(result));
    assert_eq!(second, first);

    let mut missing = None;
    evaluate_with_imports("(import \"nope.scm\")", &options, &mut resolver, |result| {
        missing = Some(result);
    });
    assert!(matches!(missing, Some(Err(Error::Import { ref location, .. })) if location == "nope.scm"));
}

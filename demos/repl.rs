use std::panic;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemy::ast::Value;
use schemy::environment::Environment;
use schemy::import::{CachedResolver, FileResolver, ImportResolver, JsonFileCache, MemoryCache};
use schemy::options::DEFAULT_LIBS;
use schemy::printer::stringify;
use schemy::{Error, Interpreter, Options, parser};
use tracing_subscriber::EnvFilter;

/// Interactive evaluator for schemy programs
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Run this file instead of starting the interactive prompt
    script: Option<PathBuf>,

    /// Library to register, in lookup order (repeatable; defaults to all)
    #[arg(long = "lib", value_name = "NAME")]
    libs: Vec<String>,

    /// Nesting limit for compound expressions
    #[arg(long, default_value_t = schemy::MAX_EVAL_DEPTH)]
    max_depth: usize,

    /// Persist parsed imports in this JSON file
    #[arg(long, value_name = "FILE")]
    import_cache: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = panic::catch_unwind(|| run(&args));

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        Err(panic_info) => {
            eprintln!("The REPL encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let libs = if args.libs.is_empty() {
        DEFAULT_LIBS.iter().map(|name| (*name).to_owned()).collect()
    } else {
        args.libs.clone()
    };
    let options = Options::default()
        .with_libs(libs)
        .with_max_depth(args.max_depth);

    let base = args
        .script
        .as_ref()
        .and_then(|path| path.parent())
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let files = FileResolver::new(base);
    let mut resolver: Box<dyn ImportResolver> = match &args.import_cache {
        Some(path) => Box::new(CachedResolver::new(files, JsonFileCache::open(path)?)),
        None => Box::new(CachedResolver::new(files, MemoryCache::default())),
    };

    match &args.script {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|e| Error::Import {
                location: path.display().to_string(),
                message: e.to_string(),
            })?;
            let interpreter = Interpreter::new(&options)?;
            let result = parser::parse(&source)
                .and_then(|program| schemy::import::resolve_imports(program, resolver.as_mut()))
                .and_then(|program| interpreter.eval_program(&program));
            print_result(result);
            Ok(())
        }
        None => run_repl(&options, resolver.as_mut()),
    }
}

fn run_repl(options: &Options, resolver: &mut dyn ImportResolver) -> Result<(), Error> {
    println!("Schemy interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return Ok(());
        }
    };
    let interpreter = Interpreter::new(options)?;
    let env = Environment::new();

    loop {
        match rl.readline("schemy> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help(&interpreter);
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // A failed line must not leave half-made bindings behind
                let checkpoint = env.len();
                let result = parser::parse(line)
                    .and_then(|program| schemy::import::resolve_imports(program, resolver))
                    .and_then(|program| interpreter.eval_in(&program, &env));
                if result.is_err() {
                    env.truncate(checkpoint);
                }
                print_result(result);
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}

fn print_result(result: Result<Value, Error>) {
    match result {
        // Don't print Unspecified values (e.g., from define)
        Ok(Value::Unspecified) => {}
        Ok(value) => println!("{}", stringify(&value)),
        Err(Error::Raised(value)) => println!("{}", stringify(&value)),
        Err(e) => println!("Error: {e}"),
    }
}

fn print_help(interpreter: &Interpreter) {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show the most recent environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Registered libraries:");
    for lib in interpreter.libraries() {
        println!("  {}", lib.name());
    }
    println!();
    println!("Examples:");
    println!("  (define (square x) (* x x))");
    println!("  (map square '(1 2 3))");
    println!("  (let loop ([i 0]) (when (< i 3) (display i) (loop (+ i 1))))");
    println!("  (import \"lib.scm\")");
    println!();
}

fn print_environment(env: &Environment) {
    const SHOWN: usize = 20;

    let bindings = env.recent(SHOWN);
    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total, newest first):", env.len());
    for binding in bindings {
        let value = binding
            .value
            .as_ref()
            .map_or_else(|| "<unassigned>".to_owned(), stringify);
        println!("  {} = {value}  [{}]", binding.name, binding.modifier);
    }
}

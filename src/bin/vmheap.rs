//! vmheap command line
//!
//! Prints the escaping variables of every function in a source file, or
//! analyzes one function per line interactively.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use vmheap::escape::{EscapeAnalyzer, EscapeMode};
use vmheap::syntax::{parse_body, parse_func};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut mode = EscapeMode::Legacy;
    let mut file = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--scoped" => mode = EscapeMode::Scoped,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            _ if file.is_none() => file = Some(arg),
            _ => {
                print_usage();
                std::process::exit(2);
            }
        }
    }

    let analyzer = EscapeAnalyzer::new(mode);
    match file {
        Some(filename) => run_file(&analyzer, &filename),
        None => run_repl(&analyzer),
    }
}

fn print_usage() {
    eprintln!("usage: vmheap [--scoped] [FILE]");
}

fn run_file(analyzer: &EscapeAnalyzer, filename: &str) {
    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", filename, e);
            std::process::exit(1);
        }
    };

    match analyzer.analyze_source(&source) {
        Ok(results) => {
            for (func, names) in results {
                println!("{}: {}", func, names.join(", "));
            }
        }
        Err(e) => {
            eprintln!("{}:{}", filename, e);
            std::process::exit(1);
        }
    }
}

fn run_repl(analyzer: &EscapeAnalyzer) {
    println!("vmheap escape analyzer ({} mode)", analyzer.mode());
    println!("Enter a func declaration or a {{ ... }} body per line, Ctrl+D to exit.\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error starting line editor: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                let parsed = if line.starts_with("func") {
                    parse_func(line)
                } else {
                    parse_body(line)
                };
                match parsed {
                    Ok(func) => println!("{}", analyzer.analyze(&func).join(", ")),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }
}

use std::io::{self, Write};
use std::process::ExitCode;

use rlox::prelude::*;

/// `EX_USAGE` (see `sysexits.h`): the command was used incorrectly.
const EX_USAGE: u8 = 64;
/// `EX_DATAERR` (see `sysexits.h`): the input data was incorrect. We use it for compile errors.
const EX_DATAERR: u8 = 65;
/// `EX_SOFTWARE` (see `sysexits.h`): an internal software error. We use it for runtime errors.
const EX_SOFTWARE: u8 = 70;
/// `EX_IOERR` (see `sysexits.h`): an error occurred while doing I/O on some file.
const EX_IOERR: u8 = 74;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: rlox [path]");
            ExitCode::from(EX_USAGE)
        }
    }
}

/// Runs an interactive read-eval-print loop, sharing one [VM] (and therefore one set of global
/// variables) across every line typed in.
fn repl() -> ExitCode {
    println!("Welcome to lox");

    let mut vm = VM::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        let bytes_read = stdin.read_line(&mut line);
        match bytes_read {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                // Interpretation errors in a REPL shouldn't kill the session; the error has
                // already been reported to stderr by the time we get here.
                let _ = vm.interpret(&line);
            }
        }
    }

    ExitCode::SUCCESS
}

/// Reads a whole file and runs it as a Lox program.
fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{path}\": {error}");
            return ExitCode::from(EX_IOERR);
        }
    };

    let mut vm = VM::new();
    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretationError::CompileError) => ExitCode::from(EX_DATAERR),
        Err(InterpretationError::RuntimeError) => ExitCode::from(EX_SOFTWARE),
    }
}

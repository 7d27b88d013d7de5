use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use miniscript::Interpreter;

#[derive(Parser)]
#[command(name = "miniscript", about = "MiniScript interpreter", version)]
struct Cli {
    /// Script file to execute
    file: Option<String>,

    /// Evaluate an expression and print its result
    #[arg(short, long)]
    eval: Option<String>,

    /// Enter the REPL after running a file or expression
    #[arg(short, long)]
    interactive: bool,

    /// Suppress the REPL banner
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(expr) = &cli.eval {
        let mut interp = Interpreter::for_repl();
        interp.repl(expr);
        if cli.interactive {
            repl_loop(&mut interp, cli.quiet);
        }
        return ExitCode::SUCCESS;
    }

    if let Some(path) = &cli.file {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("miniscript: can't read {path}: {e}");
                return ExitCode::FAILURE;
            }
        };
        let mut interp = Interpreter::new(source);
        let failed = Rc::new(std::cell::Cell::new(false));
        let flag = failed.clone();
        interp.error_output = Rc::new(move |s| {
            eprintln!("{s}");
            flag.set(true);
        });
        interp.run();
        if cli.interactive {
            repl_loop(&mut interp, cli.quiet);
        }
        return if failed.get() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    let mut interp = Interpreter::for_repl();
    repl_loop(&mut interp, cli.quiet);
    ExitCode::SUCCESS
}

fn repl_loop(interp: &mut Interpreter, quiet: bool) {
    if !quiet {
        println!("MiniScript {} — ctrl-D to exit", env!("CARGO_PKG_VERSION"));
    }
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("miniscript: can't start the line editor: {e}");
            return;
        }
    };
    loop {
        let prompt = if interp.need_more_input() {
            "... "
        } else {
            "> "
        };
        match editor.readline(prompt) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                interp.repl(&line);
            }
            Err(ReadlineError::Interrupted) => {
                interp.dispose();
                println!("(interrupted)");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("miniscript: {e}");
                break;
            }
        }
    }
}

//! Embeddable MiniScript interpreter.
//!
//! [`Interpreter`] ties the pieces together: compile source to TAC, run the
//! machine in host-sized slices, feed a REPL session, and expose the output
//! sinks. The heavy lifting lives in the `miniscript-core`, `-reader`,
//! `-vm`, and `-stdlib` crates.

#![allow(clippy::mutable_key_type)]

pub use miniscript_core::{MsError, Value};
pub use miniscript_stdlib::{install as install_stdlib, register_all};
pub use miniscript_vm::{
    Intrinsic, IntrinsicResult, Machine, MachineEnv, OutputSink,
};

use std::rc::Rc;

use miniscript_reader as reader;

/// Default per-call step budget for [`Interpreter::run_until_done`] wrappers
/// that don't pick their own.
pub const DEFAULT_STEP_LIMIT: usize = 6000;

pub struct Interpreter {
    source: String,
    machine: Option<Machine>,
    /// Where `print` goes.
    pub standard_output: OutputSink,
    /// Where runtime and compiler errors go.
    pub error_output: OutputSink,
    /// Where REPL statement results go; `None` outside REPL-style use.
    pub implicit_output: Option<OutputSink>,
    repl_buffer: String,
}

impl Interpreter {
    pub fn new(source: impl Into<String>) -> Self {
        Interpreter {
            source: source.into(),
            machine: None,
            standard_output: Rc::new(|s| println!("{s}")),
            error_output: Rc::new(|s| eprintln!("{s}")),
            implicit_output: None,
            repl_buffer: String::new(),
        }
    }

    /// An interpreter with no program yet; feed it via [`Interpreter::repl`].
    pub fn for_repl() -> Self {
        Interpreter::new("")
    }

    fn build_env(&self, store_implicit: bool) -> MachineEnv {
        let mut env = MachineEnv::default();
        env.standard_output = self.standard_output.clone();
        env.error_output = self.error_output.clone();
        env.implicit_output = self.implicit_output.clone();
        env.store_implicit = store_implicit;
        env
    }

    /// Compile the source into a fresh machine. Compiler errors are reported
    /// through the error sink as well as returned.
    pub fn compile(&mut self) -> Result<(), MsError> {
        if self.machine.is_some() {
            return Ok(());
        }
        let main = match reader::compile(&self.source) {
            Ok(main) => main,
            Err(e) => {
                (self.error_output)(&e.to_string());
                return Err(e);
            }
        };
        let store_implicit = self.implicit_output.is_some();
        let mut machine = Machine::new(main, self.build_env(store_implicit));
        miniscript_stdlib::install(&mut machine);
        self.machine = Some(machine);
        Ok(())
    }

    /// Run up to `step_limit` TAC lines. Runtime errors stop the machine and
    /// go to the error sink. With `return_early_on_partial`, a suspended
    /// intrinsic hands control back immediately.
    pub fn run_until_done(&mut self, step_limit: usize, return_early_on_partial: bool) {
        if self.machine.is_none() && self.compile().is_err() {
            return;
        }
        if let Some(machine) = self.machine.as_mut() {
            machine.run_until_done(step_limit, return_early_on_partial);
        }
    }

    /// Compile and run to completion (honoring `wait`/`yield` suspensions by
    /// resuming until the program ends).
    pub fn run(&mut self) {
        if self.machine.is_none() && self.compile().is_err() {
            return;
        }
        while !self.is_done() {
            self.run_until_done(DEFAULT_STEP_LIMIT, false);
        }
    }

    pub fn is_done(&self) -> bool {
        self.machine.as_ref().map(Machine::is_done).unwrap_or(true)
    }

    /// Feed one line of REPL input. Statements accumulate until the source
    /// forms a complete block, then compile into the existing global scope
    /// and run. Statement results echo through `implicit_output` (defaulting
    /// to `standard_output`).
    pub fn repl(&mut self, line: &str) {
        if !self.repl_buffer.is_empty() {
            self.repl_buffer.push('\n');
        }
        self.repl_buffer.push_str(line);
        if reader::needs_more_input(&self.repl_buffer) {
            return;
        }
        let source = std::mem::take(&mut self.repl_buffer);
        let main = match reader::compile(&source) {
            Ok(main) => main,
            Err(e) => {
                (self.error_output)(&e.to_string());
                return;
            }
        };
        if self.implicit_output.is_none() {
            self.implicit_output = Some(self.standard_output.clone());
        }
        match self.machine.as_mut() {
            Some(machine) => {
                // A machine compiled outside REPL mode joins it here.
                machine.env.store_implicit = true;
                if machine.env.implicit_output.is_none() {
                    machine.env.implicit_output = self.implicit_output.clone();
                }
                machine.restart_with(main);
            }
            None => {
                let mut machine = Machine::new(main, self.build_env(true));
                miniscript_stdlib::install(&mut machine);
                self.machine = Some(machine);
            }
        }
        while !self.is_done() {
            if let Some(machine) = self.machine.as_mut() {
                machine.run_until_done(DEFAULT_STEP_LIMIT, false);
            }
        }
    }

    /// More REPL input is needed before the pending source can run.
    pub fn need_more_input(&self) -> bool {
        !self.repl_buffer.is_empty()
    }

    /// Read a global variable from the (possibly finished) session.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.machine.as_ref()?.get_global(name)
    }

    /// Abandon the program and any suspended state.
    pub fn dispose(&mut self) {
        if let Some(machine) = self.machine.as_mut() {
            machine.stop();
        }
        self.machine = None;
        self.repl_buffer.clear();
    }
}

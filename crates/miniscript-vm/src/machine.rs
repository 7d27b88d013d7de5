//! The TAC machine: a stack of contexts executing one line per step.
//!
//! The machine owns the assign-family ops (which may zero-arg auto-invoke a
//! function value), calls and returns, and the intrinsic partial-result
//! protocol; pure opcodes are delegated to [`crate::eval`]. Errors unwind
//! out of `step`, get stamped with the source line, and `run_until_done`
//! reports them through the error sink and stops the machine.

use std::rc::Rc;
use std::time::Instant;

use miniscript_core::{FuncDef, FuncValue, Line, MsError, Op, Value};

use crate::context::Context;
use crate::eval::{self, Binding};
use crate::intrinsic::Intrinsic;

/// Call-stack depth cap; blowing it is a runtime error, not a process abort.
pub const MAX_CALL_DEPTH: usize = 256;

pub type OutputSink = Rc<dyn Fn(&str)>;

/// Machine-wide state the evaluator and intrinsics read: output sinks, the
/// per-type default maps, REPL implicit-result mode, and the clock.
pub struct MachineEnv {
    pub standard_output: OutputSink,
    pub error_output: OutputSink,
    pub implicit_output: Option<OutputSink>,
    /// When set (REPL mode), statement results bind `_` and echo.
    pub store_implicit: bool,
    pub map_type: Option<Value>,
    pub list_type: Option<Value>,
    pub string_type: Option<Value>,
    pub number_type: Option<Value>,
    pub function_type: Option<Value>,
    start: Instant,
}

impl Default for MachineEnv {
    fn default() -> Self {
        MachineEnv {
            standard_output: Rc::new(|s| println!("{s}")),
            error_output: Rc::new(|s| eprintln!("{s}")),
            implicit_output: None,
            store_implicit: false,
            map_type: None,
            list_type: None,
            string_type: None,
            number_type: None,
            function_type: None,
            start: Instant::now(),
        }
    }
}

impl MachineEnv {
    /// Seconds since this machine was created; the script-visible clock.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

pub struct Machine {
    stack: Vec<Context>,
    pub env: MachineEnv,
    done: bool,
    /// Set when a step left a suspended intrinsic behind.
    yielded: bool,
}

impl Machine {
    pub fn new(main: Rc<FuncDef>, env: MachineEnv) -> Self {
        Machine {
            stack: vec![Context::new(main)],
            env,
            done: false,
            yielded: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// A suspended intrinsic is waiting to be resumed.
    pub fn has_partial(&self) -> bool {
        self.stack
            .last()
            .is_some_and(|ctx| ctx.partial_result.is_some())
    }

    pub fn call_depth(&self) -> usize {
        self.stack.len()
    }

    /// Replace the program while keeping the global scope; this is how the
    /// REPL feeds successive lines into one session.
    pub fn restart_with(&mut self, main: Rc<FuncDef>) {
        self.stack.truncate(1);
        let root = &mut self.stack[0];
        root.func = main;
        root.line_num = 0;
        root.partial_result = None;
        root.clear_args();
        self.done = false;
        self.yielded = false;
    }

    /// Abandon any in-flight call stack (including suspended intrinsics).
    pub fn stop(&mut self) {
        self.stack.truncate(1);
        if let Some(root) = self.stack.first_mut() {
            root.line_num = root.func.code.len();
            root.partial_result = None;
            root.clear_args();
        }
        self.done = true;
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.stack.first()?.local(miniscript_core::intern(name))
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        if let Some(root) = self.stack.first_mut() {
            root.set_var(miniscript_core::intern(name), value);
        }
    }

    /// Run up to `step_limit` lines. Errors are reported through the error
    /// sink and stop the machine. With `return_early_on_partial`, control
    /// comes back to the host as soon as an intrinsic suspends.
    pub fn run_until_done(&mut self, step_limit: usize, return_early_on_partial: bool) {
        self.yielded = false;
        for _ in 0..step_limit {
            if self.done {
                break;
            }
            if let Err(e) = self.step() {
                (self.env.error_output)(&e.to_string());
                self.stop();
                break;
            }
            if self.yielded {
                if return_early_on_partial {
                    break;
                }
                self.yielded = false;
            }
        }
    }

    /// Execute one line of the top context.
    pub fn step(&mut self) -> Result<(), MsError> {
        if self.done {
            return Ok(());
        }
        let ctx = self.stack.last_mut().expect("machine always has a root context");
        if ctx.done() {
            // Running off the end of a body is an implicit `return null`.
            self.finish_context(Value::Null)?;
            return Ok(());
        }
        let line = ctx.func.code[ctx.line_num].clone();
        ctx.line_num += 1;
        self.execute_line(&line)
            .map_err(|e| e.with_line(line.location))
    }

    fn execute_line(&mut self, line: &Line) -> Result<(), MsError> {
        match line.op {
            Op::Assign | Op::AssignImplicit => {
                let implicit = line.op == Op::AssignImplicit;
                let (value, binding) = self.evaluate_rhs(line)?;
                if should_auto_invoke(&line.a, &value) {
                    self.begin_call(value, Vec::new(), Some(line.lhs.clone()), binding, implicit)
                } else {
                    self.store(&line.lhs, value, implicit)
                }
            }

            Op::Return => {
                let (value, binding) = self.evaluate_rhs(line)?;
                if should_auto_invoke(&line.a, &value) {
                    // The frame ends here; the call delivers straight to
                    // whoever was waiting on this frame's result.
                    if self.stack.len() == 1 {
                        self.stop();
                        return Ok(());
                    }
                    let finished = self.stack.pop().expect("depth checked above");
                    self.begin_call(
                        value,
                        Vec::new(),
                        finished.result_storage.clone(),
                        binding,
                        finished.result_implicit,
                    )
                } else {
                    self.finish_context(value)
                }
            }

            Op::CallFunction => {
                let (args, callee, binding) = {
                    let Machine { stack, env, .. } = self;
                    let ctx = stack.last_mut().expect("machine always has a root context");
                    let argc = eval::val(&line.b, ctx, env)?.int_value();
                    let args = ctx.take_args(argc.max(0) as usize)?;
                    let (callee, binding) = eval::val_with_binding(&line.a, ctx, env)?;
                    (args, callee, binding)
                };
                self.begin_call(callee, args, Some(line.lhs.clone()), binding, false)
            }

            Op::CallIntrinsic => {
                let (result, lhs) = {
                    let Machine { stack, env, .. } = self;
                    let ctx = stack.last_mut().expect("machine always has a root context");
                    let id = eval::val(&line.a, ctx, env)?.int_value();
                    let intrinsic = Intrinsic::get(id.max(0) as usize).ok_or_else(|| {
                        MsError::runtime(format!("unknown intrinsic id {id}"))
                    })?;
                    let partial = ctx.partial_result.take();
                    let result = intrinsic.invoke(ctx, env, partial)?;
                    (result, line.lhs.clone())
                };
                if result.done {
                    self.store(&lhs, result.value, false)
                } else {
                    let ctx = self.stack.last_mut().expect("machine always has a root context");
                    ctx.partial_result = Some(result.value);
                    ctx.line_num -= 1;
                    self.yielded = true;
                    Ok(())
                }
            }

            _ => {
                let result = {
                    let Machine { stack, env, .. } = self;
                    let ctx = stack.last_mut().expect("machine always has a root context");
                    eval::execute(line, ctx, env)?
                };
                match result {
                    Some(value) => self.store(&line.lhs, value, false),
                    None => Ok(()),
                }
            }
        }
    }

    /// Evaluate the `a` operand of an assign-family line: container literals
    /// get the recursive treatment, everything else plain `val`.
    fn evaluate_rhs(&mut self, line: &Line) -> Result<(Value, Option<Binding>), MsError> {
        let Machine { stack, env, .. } = self;
        let ctx = stack.last_mut().expect("machine always has a root context");
        if matches!(line.a, Value::List(_) | Value::Map(_)) {
            Ok((eval::full_eval(&line.a, ctx, env)?, None))
        } else {
            eval::val_with_binding(&line.a, ctx, env)
        }
    }

    /// Push a new context for `callee`, binding parameters, closure
    /// variables, and any method receiver.
    fn begin_call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        result_storage: Option<Value>,
        binding: Option<Binding>,
        result_implicit: bool,
    ) -> Result<(), MsError> {
        let func: &Rc<FuncValue> = callee.as_function().ok_or_else(|| {
            MsError::type_error(format!(
                "attempt to call a {} as a function",
                callee.type_name()
            ))
        })?;
        if self.stack.len() >= MAX_CALL_DEPTH {
            return Err(MsError::runtime("stack overflow (too many nested calls)"));
        }
        // Dot-syntax calls carry the receiver out of band, so a leading
        // `self` parameter is not filled from the argument list.
        let self_name = miniscript_core::intern::names::self_name();
        let skip = usize::from(
            binding.is_some()
                && func
                    .def
                    .params
                    .first()
                    .is_some_and(|p| p.name == self_name),
        );
        let bindable = func.def.params.len() - skip;
        if args.len() > bindable {
            return Err(MsError::runtime(format!(
                "too many arguments ({} given, {bindable} expected)",
                args.len(),
            )));
        }
        let globals = self.stack[0].variables_value();
        let mut ctx = Context::new(func.def.clone());
        ctx.outer_vars = func.outer.clone();
        ctx.globals = Some(globals);
        ctx.result_storage = result_storage;
        ctx.result_implicit = result_implicit;
        let mut args = args.into_iter();
        for param in &func.def.params[skip..] {
            let value = args.next().unwrap_or_else(|| param.default.clone());
            ctx.set_var(param.name, value);
        }
        // The receiver wins over a defaulted `self` parameter.
        if let Some(b) = binding {
            ctx.self_value = Some(b.self_value);
            ctx.super_value = b.super_value;
        }
        self.stack.push(ctx);
        Ok(())
    }

    /// Pop the top context, delivering `value` where its caller asked.
    fn finish_context(&mut self, value: Value) -> Result<(), MsError> {
        if self.stack.len() == 1 {
            let root = &mut self.stack[0];
            root.line_num = root.func.code.len();
            self.done = true;
            return Ok(());
        }
        let finished = self.stack.pop().expect("depth checked above");
        if let Some(storage) = finished.result_storage {
            self.store(&storage, value, finished.result_implicit)?;
        }
        Ok(())
    }

    /// Write `value` to an assignment target in the top context.
    fn store(&mut self, lhs: &Value, value: Value, implicit: bool) -> Result<(), MsError> {
        let Machine { stack, env, .. } = self;
        let ctx = stack.last_mut().expect("machine always has a root context");
        match lhs {
            Value::Null => {}
            Value::Temp(i) => ctx.set_temp(*i, value.clone()),
            Value::Var(v) => ctx.set_var(v.name, value.clone()),
            Value::SeqElem(e) => {
                let seq = eval::val(&e.seq, ctx, env)?;
                let key = eval::val(&e.index, ctx, env)?;
                assign_element(&seq, key, value.clone())?;
            }
            other => {
                return Err(MsError::runtime(format!(
                    "bad assignment target {other:?}"
                )))
            }
        }
        if implicit && env.store_implicit {
            ctx.set_var(miniscript_core::intern::names::implicit_result(), value.clone());
            if !value.is_null() {
                if let Some(sink) = &env.implicit_output {
                    sink(&value.to_display_string());
                }
            }
        }
        Ok(())
    }
}

/// Indexed assignment: `list[i] = v`, `map[k] = v`, `obj.member = v`.
fn assign_element(seq: &Value, key: Value, value: Value) -> Result<(), MsError> {
    match seq {
        Value::List(l) => {
            let n = match key {
                Value::Number(n) => n,
                other => {
                    return Err(MsError::type_error(format!(
                        "list indices must be numbers, not {}",
                        other.type_name()
                    )))
                }
            };
            let mut items = l.borrow_mut();
            let count = items.len();
            let idx = eval::wrap_index(n, count, "list")?;
            items[idx] = value;
            Ok(())
        }
        Value::Map(m) => {
            m.borrow_mut().insert(key, value);
            Ok(())
        }
        Value::String(_) => Err(MsError::type_error(
            "strings are immutable; can't assign into one",
        )),
        Value::Null => Err(MsError::type_error(
            "Null Reference: can't assign into null",
        )),
        other => Err(MsError::type_error(format!(
            "can't assign into {}",
            other.type_name()
        ))),
    }
}

/// Assign-family lines invoke a bare function reference with zero arguments
/// unless the reference carries the no-invoke flag.
fn should_auto_invoke(operand: &Value, value: &Value) -> bool {
    matches!(value, Value::Function(..))
        && matches!(operand, Value::Var(_) | Value::SeqElem(_))
        && !operand.suppresses_invoke()
}

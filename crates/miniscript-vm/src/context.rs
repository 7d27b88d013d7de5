//! Per-call execution state.
//!
//! A `Context` is one frame of the machine's call stack: program counter,
//! temporaries, local variables, captured outer variables, the pending-call
//! argument stack, and the stash for a suspended intrinsic. The root context
//! doubles as the global scope.

use std::rc::Rc;

use lasso::Spur;

use miniscript_core::intern::names;
use miniscript_core::{FuncDef, MsError, Value};

pub struct Context {
    pub func: Rc<FuncDef>,
    /// Index of the next line to execute.
    pub line_num: usize,
    temps: Vec<Value>,
    /// Local variables, as a script-visible Map. Created on first store.
    variables: Option<Value>,
    /// Captured variables of the defining call (closures).
    pub outer_vars: Option<Value>,
    /// The root context's variable map; `None` on the root itself.
    pub globals: Option<Value>,
    /// Arguments pushed for the next `CallFunction`.
    args: Vec<Value>,
    /// Resume token of a suspended intrinsic.
    pub partial_result: Option<Value>,
    /// Where the caller wants this call's result stored.
    pub result_storage: Option<Value>,
    /// Whether the result should also feed the implicit-result protocol
    /// (bind `_`, echo in REPL mode).
    pub result_implicit: bool,
    pub self_value: Option<Value>,
    pub super_value: Option<Value>,
}

impl Context {
    pub fn new(func: Rc<FuncDef>) -> Self {
        Context {
            func,
            line_num: 0,
            temps: Vec::new(),
            variables: None,
            outer_vars: None,
            globals: None,
            args: Vec::new(),
            partial_result: None,
            result_storage: None,
            result_implicit: false,
            self_value: None,
            super_value: None,
        }
    }

    pub fn done(&self) -> bool {
        self.line_num >= self.func.code.len()
    }

    // ── Temporaries ───────────────────────────────────────────────

    pub fn get_temp(&self, index: u16) -> Value {
        self.temps.get(index as usize).cloned().unwrap_or_default()
    }

    pub fn set_temp(&mut self, index: u16, value: Value) {
        let index = index as usize;
        if index >= self.temps.len() {
            self.temps.resize(index + 1, Value::Null);
        }
        self.temps[index] = value;
    }

    // ── Variables ─────────────────────────────────────────────────

    /// The local variable map as a script value, created on demand.
    pub fn variables_value(&mut self) -> Value {
        if self.variables.is_none() {
            self.variables = Some(Value::empty_map());
        }
        self.variables.clone().unwrap()
    }

    pub fn variables(&self) -> Option<&Value> {
        self.variables.as_ref()
    }

    /// A local binding: the implicit `self`/`super` slots, then the
    /// variable map. Does not consult outer or global scope.
    pub fn local(&self, name: Spur) -> Option<Value> {
        if name == names::self_name() {
            return self.self_value.clone();
        }
        if name == names::super_name() {
            return self.super_value.clone();
        }
        let vars = self.variables.as_ref()?;
        let map = vars.as_map()?;
        let map = map.borrow();
        map.get_spur(name).cloned()
    }

    /// Assignment always binds locally; `self` and `super` write their
    /// dedicated slots.
    pub fn set_var(&mut self, name: Spur, value: Value) {
        if name == names::self_name() {
            self.self_value = Some(value);
            return;
        }
        if name == names::super_name() {
            self.super_value = Some(value);
            return;
        }
        let vars = self.variables_value();
        if let Some(map) = vars.as_map() {
            map.borrow_mut().insert_spur(name, value);
        }
    }

    /// Look `name` up in an enclosing scope map (outer vars or globals).
    pub fn scope_lookup(scope: &Value, name: Spur) -> Option<Value> {
        let map = scope.as_map()?;
        let map = map.borrow();
        map.get_spur(name).cloned()
    }

    // ── Pending-call arguments ────────────────────────────────────

    pub fn push_arg(&mut self, value: Value) {
        self.args.push(value);
    }

    pub fn clear_args(&mut self) {
        self.args.clear();
    }

    pub fn take_args(&mut self, count: usize) -> Result<Vec<Value>, MsError> {
        if self.args.len() < count {
            return Err(MsError::runtime(format!(
                "call expected {count} pushed arguments, found {}",
                self.args.len()
            )));
        }
        Ok(self.args.split_off(self.args.len() - count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniscript_core::intern::intern;

    fn empty_func() -> Rc<FuncDef> {
        Rc::new(FuncDef {
            params: Vec::new(),
            code: Vec::new(),
        })
    }

    #[test]
    fn temps_grow_on_demand() {
        let mut ctx = Context::new(empty_func());
        assert!(ctx.get_temp(5).is_null());
        ctx.set_temp(5, Value::Number(42.0));
        assert_eq!(ctx.get_temp(5).as_number(), Some(42.0));
        assert!(ctx.get_temp(4).is_null());
    }

    #[test]
    fn variables_bind_locally() {
        let mut ctx = Context::new(empty_func());
        let x = intern("x");
        assert!(ctx.local(x).is_none());
        ctx.set_var(x, Value::string("hi"));
        assert_eq!(ctx.local(x).unwrap().as_str(), Some("hi"));
    }

    #[test]
    fn self_and_super_use_dedicated_slots() {
        let mut ctx = Context::new(empty_func());
        ctx.set_var(names::self_name(), Value::empty_map());
        assert!(ctx.self_value.is_some());
        assert!(ctx.variables().is_none());
        assert!(ctx.local(names::self_name()).is_some());
    }

    #[test]
    fn arg_stack_is_lifo_per_call() {
        let mut ctx = Context::new(empty_func());
        ctx.push_arg(Value::Number(1.0));
        ctx.push_arg(Value::Number(2.0));
        ctx.push_arg(Value::Number(3.0));
        let args = ctx.take_args(2).unwrap();
        assert_eq!(args[0].as_number(), Some(2.0));
        assert_eq!(args[1].as_number(), Some(3.0));
        assert!(ctx.take_args(2).is_err());
    }
}

//! Host-function registry and the suspendable calling contract.
//!
//! An intrinsic is registered once per thread at host init and addressed by
//! id from `CallIntrinsic` lines. `get_func` wraps it in an ordinary
//! function value (a two-line body: invoke, return), so scripts call
//! intrinsics through the same machinery as user functions — including
//! parameter defaults and `self` binding for type-map methods.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use lasso::Spur;

use miniscript_core::{intern, FuncDef, Line, MsError, Op, Param, Value};

use crate::context::Context;
use crate::machine::MachineEnv;

/// What an intrinsic hands back: a value, and whether it is finished.
/// `done = false` makes the machine stash `value` as the resume token,
/// rewind the program counter, and re-invoke on the next step.
pub struct IntrinsicResult {
    pub value: Value,
    pub done: bool,
}

impl IntrinsicResult {
    pub fn done(value: Value) -> Self {
        IntrinsicResult { value, done: true }
    }

    pub fn null() -> Self {
        IntrinsicResult {
            value: Value::Null,
            done: true,
        }
    }

    pub fn partial(token: Value) -> Self {
        IntrinsicResult {
            value: token,
            done: false,
        }
    }
}

pub type IntrinsicFn =
    Box<dyn Fn(&mut Context, &MachineEnv, Option<Value>) -> Result<IntrinsicResult, MsError>>;

pub struct Intrinsic {
    pub name: String,
    pub id: usize,
    pub params: Vec<Param>,
    code: IntrinsicFn,
    /// The wrapper function value handed to scripts.
    func: Value,
}

impl Intrinsic {
    /// Start registering a new intrinsic. Finish with
    /// [`IntrinsicBuilder::code`], which assigns the id.
    pub fn create(name: &str) -> IntrinsicBuilder {
        IntrinsicBuilder {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn get(id: usize) -> Option<Rc<Intrinsic>> {
        REGISTRY.with(|r| r.borrow().get(id).cloned())
    }

    pub fn get_by_name(name: &str) -> Option<Rc<Intrinsic>> {
        Self::get_by_spur(intern::intern(name))
    }

    pub fn get_by_spur(name: Spur) -> Option<Rc<Intrinsic>> {
        let id = BY_NAME.with(|m| m.borrow().get(&name).copied())?;
        Self::get(id)
    }

    /// The function value scripts see for this intrinsic.
    pub fn get_func(&self) -> Value {
        self.func.clone()
    }

    pub(crate) fn invoke(
        &self,
        ctx: &mut Context,
        env: &MachineEnv,
        partial: Option<Value>,
    ) -> Result<IntrinsicResult, MsError> {
        (self.code)(ctx, env, partial)
    }
}

pub struct IntrinsicBuilder {
    name: String,
    params: Vec<Param>,
}

impl IntrinsicBuilder {
    pub fn param(mut self, name: &str, default: Value) -> Self {
        self.params.push(Param {
            name: intern::intern(name),
            default,
        });
        self
    }

    /// Attach the host function and commit to the registry. Re-registering
    /// a name points it at the new entry; old ids stay valid so compiled
    /// code is never left dangling.
    pub fn code(
        self,
        f: impl Fn(&mut Context, &MachineEnv, Option<Value>) -> Result<IntrinsicResult, MsError>
            + 'static,
    ) -> Rc<Intrinsic> {
        let id = REGISTRY.with(|r| r.borrow().len());
        let def = Rc::new(FuncDef {
            params: self.params.clone(),
            code: vec![
                Line::new(
                    Value::Temp(0),
                    Op::CallIntrinsic,
                    Value::Number(id as f64),
                    Value::Null,
                ),
                Line::new(Value::Null, Op::Return, Value::Temp(0), Value::Null),
            ],
        });
        let spur = intern::intern(&self.name);
        let intrinsic = Rc::new(Intrinsic {
            name: self.name,
            id,
            params: self.params,
            code: Box::new(f),
            func: Value::function(def),
        });
        REGISTRY.with(|r| r.borrow_mut().push(intrinsic.clone()));
        BY_NAME.with(|m| m.borrow_mut().insert(spur, id));
        intrinsic
    }
}

thread_local! {
    static REGISTRY: RefCell<Vec<Rc<Intrinsic>>> = const { RefCell::new(Vec::new()) };
    static BY_NAME: RefCell<HashMap<Spur, usize>> = RefCell::new(HashMap::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_assigns_ids_and_names() {
        let intrinsic = Intrinsic::create("testDouble")
            .param("n", Value::Number(0.0))
            .code(|ctx, _env, _partial| {
                let n = ctx
                    .local(intern::intern("n"))
                    .map(|v| v.double_value())
                    .unwrap_or(0.0);
                Ok(IntrinsicResult::done(Value::Number(n * 2.0)))
            });
        let found = Intrinsic::get_by_name("testDouble").unwrap();
        assert_eq!(found.id, intrinsic.id);
        assert_eq!(found.params.len(), 1);
    }

    #[test]
    fn wrapper_function_calls_through_the_machine() {
        let func = Intrinsic::create("testSeven")
            .code(|_ctx, _env, _partial| Ok(IntrinsicResult::done(Value::Number(7.0))))
            .get_func();
        let f = func.as_function().unwrap();
        assert_eq!(f.def.code.len(), 2);
        assert!(matches!(f.def.code[0].op, Op::CallIntrinsic));
        assert!(matches!(f.def.code[1].op, Op::Return));
    }
}

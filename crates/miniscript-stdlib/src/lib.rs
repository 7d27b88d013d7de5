//! The intrinsic function library: core globals (`print`, `str`, `len`,
//! `range`, math, timing) and the per-type default maps that give strings,
//! lists, maps, numbers, and functions their built-in members.
//!
//! Intrinsics register once per thread; [`install`] then wires a machine's
//! type-map fields and the script-visible type globals.

#![allow(clippy::mutable_key_type)]

mod io;
mod list;
mod math;
mod string;

use std::cell::Cell;

use miniscript_core::{intern, Value, VarMap};
use miniscript_vm::{Intrinsic, Machine};

thread_local! {
    static REGISTERED: Cell<bool> = const { Cell::new(false) };
}

/// Register every intrinsic on this thread (idempotent).
pub fn register_all() {
    if REGISTERED.with(Cell::get) {
        return;
    }
    REGISTERED.with(|c| c.set(true));
    io::register();
    math::register();
    string::register();
    list::register();
}

/// Install the intrinsic library into a machine: the per-type default maps
/// the prototype resolver falls back to, and the matching script globals
/// (`string`, `list`, `map`, `number`, `funcRef`).
pub fn install(machine: &mut Machine) {
    register_all();

    let string_type = type_map(&[
        "upper", "lower", "indexOf", "split", "replace", "hasIndex", "indexes", "values", "len",
    ]);
    let list_type = type_map(&[
        "push", "pop", "pull", "insert", "remove", "indexOf", "hasIndex", "indexes", "values",
        "sum", "join", "len",
    ]);
    let map_type = type_map(&[
        "hasIndex", "indexOf", "remove", "push", "indexes", "values", "len", "sum",
    ]);
    let number_type = Value::map(VarMap::new());
    let function_type = Value::map(VarMap::new());

    machine.env.string_type = Some(string_type.clone());
    machine.env.list_type = Some(list_type.clone());
    machine.env.map_type = Some(map_type.clone());
    machine.env.number_type = Some(number_type.clone());
    machine.env.function_type = Some(function_type.clone());

    machine.set_global("string", string_type);
    machine.set_global("list", list_type);
    machine.set_global("map", map_type);
    machine.set_global("number", number_type);
    machine.set_global("funcRef", function_type);
}

fn type_map(names: &[&str]) -> Value {
    let mut map = VarMap::new();
    for name in names {
        let intrinsic = Intrinsic::get_by_name(name)
            .unwrap_or_else(|| panic!("intrinsic '{name}' not registered"));
        map.insert(Value::string(name), intrinsic.get_func());
    }
    Value::map(map)
}

/// Fetch a named parameter from the intrinsic's wrapper context.
pub(crate) fn arg(ctx: &miniscript_vm::Context, name: &str) -> Value {
    ctx.local(intern(name)).unwrap_or_default()
}

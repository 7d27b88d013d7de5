//! Member resolution through the `__isa` prototype chain.
//!
//! Given a (fully evaluated) sequence and a key, the walk tries the map's own
//! entries, then follows `__isa` links; a chain that ends without a hit gets
//! one shot at the machine's generic map type. Non-map sequences enter the
//! walk at their per-type default map. The hop cap turns reference loops into
//! a reportable error instead of a hang.

use miniscript_core::intern::names;
use miniscript_core::{MsError, Value, MAX_ISA_DEPTH};

use crate::machine::MachineEnv;

/// A successful lookup: the value found, and the map it was found in (used
/// by method calls to bind `self`/`super`). `found_in` is `None` for custom
/// values answering through their direct lookup hook.
#[derive(Debug)]
pub struct Resolved {
    pub value: Value,
    pub found_in: Option<Value>,
}

/// True when both values are the same map object.
pub fn same_map(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Map(x), Value::Map(y)) => std::rc::Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Walk the prototype chain of `seq` looking for `key`.
pub fn lookup_member(seq: &Value, key: &Value, env: &MachineEnv) -> Result<Resolved, MsError> {
    let mut current;
    // Entering through a per-type default map uses up the generic-map
    // fallback: lists don't inherit map members.
    let mut generic_tried;

    match seq {
        Value::Map(_) => {
            current = seq.clone();
            generic_tried = false;
        }
        Value::Custom(c) => {
            if let Value::String(name) = key {
                if let Some(v) = c.lookup(name) {
                    return Ok(Resolved {
                        value: v,
                        found_in: None,
                    });
                }
            }
            match c.type_map() {
                Some(t) => {
                    current = t;
                    generic_tried = true;
                }
                None => return Err(MsError::key_error(key.to_display_string())),
            }
        }
        other => {
            let type_map = match other {
                Value::List(_) => &env.list_type,
                Value::String(_) => &env.string_type,
                Value::Number(_) => &env.number_type,
                Value::Function(_) => &env.function_type,
                Value::Null => {
                    return Err(MsError::type_error("Null Reference: can't look up members of null"))
                }
                _ => {
                    return Err(MsError::type_error(format!(
                        "{} is not something you can look up members in",
                        other.type_name()
                    )))
                }
            };
            match type_map {
                Some(t) => {
                    current = t.clone();
                    generic_tried = true;
                }
                None => return Err(MsError::key_error(key.to_display_string())),
            }
        }
    }

    for _ in 0..MAX_ISA_DEPTH {
        let map = match current.as_map() {
            Some(m) => m,
            None => {
                return Err(MsError::type_error(format!(
                    "__isa must be a map (found {})",
                    current.type_name()
                )))
            }
        };
        let parent = {
            let borrowed = map.borrow();
            if let Some(v) = borrowed.get(key) {
                let value = v.clone();
                drop(borrowed);
                return Ok(Resolved {
                    value,
                    found_in: Some(current.clone()),
                });
            }
            borrowed.get_spur(names::isa()).cloned()
        };
        match parent {
            Some(p) => current = p,
            None => {
                if generic_tried {
                    break;
                }
                generic_tried = true;
                match &env.map_type {
                    Some(t) if !same_map(t, &current) => current = t.clone(),
                    _ => break,
                }
            }
        }
    }

    if isa_chain_too_long(seq, env) {
        return Err(MsError::limit(format!(
            "__isa chain exceeded {MAX_ISA_DEPTH} levels (reference loop?)"
        )));
    }
    Err(MsError::key_error(key.to_display_string()))
}

/// Distinguish "walked the whole chain, key absent" from "the chain itself
/// never ends".
fn isa_chain_too_long(seq: &Value, _env: &MachineEnv) -> bool {
    let mut current = seq.clone();
    for _ in 0..MAX_ISA_DEPTH {
        let parent = match current.as_map() {
            Some(m) => m.borrow().get_spur(names::isa()).cloned(),
            None => return false,
        };
        match parent {
            Some(p) => current = p,
            None => return false,
        }
    }
    true
}

/// The `isa` operator / `Value::is_a` test.
pub fn value_is_a(value: &Value, type_value: &Value, env: &MachineEnv) -> Result<bool, MsError> {
    if type_value.is_null() {
        return Ok(value.is_null());
    }
    match value {
        Value::Null => Ok(false),
        Value::Number(_) => Ok(matches!(&env.number_type, Some(t) if same_map(t, type_value))),
        Value::String(_) => Ok(matches!(&env.string_type, Some(t) if same_map(t, type_value))),
        Value::List(_) => Ok(matches!(&env.list_type, Some(t) if same_map(t, type_value))),
        Value::Function(_) => {
            Ok(matches!(&env.function_type, Some(t) if same_map(t, type_value)))
        }
        Value::Map(_) => {
            if matches!(&env.map_type, Some(t) if same_map(t, type_value)) {
                return Ok(true);
            }
            chain_contains(value.clone(), type_value)
        }
        Value::Custom(c) => match c.type_map() {
            Some(t) => {
                if same_map(&t, type_value) {
                    Ok(true)
                } else {
                    chain_contains(t, type_value)
                }
            }
            None => Ok(false),
        },
        _ => Ok(false),
    }
}

fn chain_contains(start: Value, type_value: &Value) -> Result<bool, MsError> {
    let mut current = start;
    for _ in 0..MAX_ISA_DEPTH {
        if same_map(&current, type_value) {
            return Ok(true);
        }
        let parent = match current.as_map() {
            Some(m) => m.borrow().get_spur(names::isa()).cloned(),
            None => return Ok(false),
        };
        match parent {
            Some(p) => current = p,
            None => return Ok(false),
        }
    }
    Err(MsError::limit(format!(
        "__isa chain exceeded {MAX_ISA_DEPTH} levels (reference loop?)"
    )))
}

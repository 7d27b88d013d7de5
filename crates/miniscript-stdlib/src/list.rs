//! List intrinsics, including the polymorphic sequence members shared with
//! strings and maps (`len`, `indexOf`, `hasIndex`, `indexes`, `values`, …).

use miniscript_core::{MsError, Value, MAX_SEQUENCE_SIZE};
use miniscript_vm::{Intrinsic, IntrinsicResult};

use crate::arg;

pub fn register() {
    Intrinsic::create("len")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            let result = match &v {
                Value::String(s) => Value::Number(s.chars().count() as f64),
                Value::List(l) => Value::Number(l.len() as f64),
                Value::Map(m) => Value::Number(m.len() as f64),
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("range")
        .param("from", Value::Number(0.0))
        .param("to", Value::Number(0.0))
        .param("step", Value::Null)
        .code(|ctx, _env, _partial| {
            let from = arg(ctx, "from").double_value();
            let to = arg(ctx, "to").double_value();
            let step = match arg(ctx, "step") {
                Value::Null => {
                    if to >= from {
                        1.0
                    } else {
                        -1.0
                    }
                }
                v => v.double_value(),
            };
            if step == 0.0 {
                return Err(MsError::runtime("range() step must not be 0"));
            }
            let count = ((to - from) / step).floor() + 1.0;
            if count <= 0.0 {
                return Ok(IntrinsicResult::done(Value::list(Vec::new())));
            }
            if count > MAX_SEQUENCE_SIZE as f64 {
                return Err(MsError::limit("range() result is too large"));
            }
            let count = count as usize;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                items.push(Value::Number(from + step * i as f64));
            }
            Ok(IntrinsicResult::done(Value::list(items)))
        });

    Intrinsic::create("push")
        .param("self", Value::Null)
        .param("value", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let value = arg(ctx, "value");
            match &receiver {
                Value::List(l) => {
                    if l.len() >= MAX_SEQUENCE_SIZE {
                        return Err(MsError::limit("maximum list size exceeded"));
                    }
                    l.borrow_mut().push(value);
                }
                // Maps double as sets: push records the key with value 1.
                Value::Map(m) => m.borrow_mut().insert(value, Value::ONE),
                other => {
                    return Err(MsError::type_error(format!(
                        "push() requires a list or map, not {}",
                        other.type_name()
                    )))
                }
            }
            Ok(IntrinsicResult::done(receiver))
        });

    Intrinsic::create("pop")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let result = match &receiver {
                Value::List(l) => l.borrow_mut().pop().unwrap_or_default(),
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("pull")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let result = match &receiver {
                Value::List(l) => {
                    let mut items = l.borrow_mut();
                    if items.is_empty() {
                        Value::Null
                    } else {
                        items.remove(0)
                    }
                }
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("insert")
        .param("self", Value::Null)
        .param("index", Value::Null)
        .param("value", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let index = arg(ctx, "index");
            let value = arg(ctx, "value");
            match &receiver {
                Value::List(l) => {
                    let mut items = l.borrow_mut();
                    let count = items.len();
                    let mut idx = index.int_value();
                    // Insertion accepts one past the end; negatives count
                    // back from there.
                    if idx < 0 {
                        idx += count as i64 + 1;
                    }
                    if idx < 0 || idx as usize > count {
                        return Err(MsError::index_error(
                            "list",
                            index.double_value(),
                            count,
                        ));
                    }
                    items.insert(idx as usize, value);
                }
                other => {
                    return Err(MsError::type_error(format!(
                        "insert() requires a list, not {}",
                        other.type_name()
                    )))
                }
            }
            Ok(IntrinsicResult::done(receiver))
        });

    Intrinsic::create("remove")
        .param("self", Value::Null)
        .param("index", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let index = arg(ctx, "index");
            match &receiver {
                Value::List(l) => {
                    let mut items = l.borrow_mut();
                    let count = items.len();
                    let idx = miniscript_vm::eval::wrap_index(
                        index.double_value(),
                        count,
                        "list",
                    )?;
                    items.remove(idx);
                    Ok(IntrinsicResult::null())
                }
                Value::Map(m) => {
                    let removed = m.borrow_mut().remove(&index).is_some();
                    Ok(IntrinsicResult::done(Value::truth(removed)))
                }
                other => Err(MsError::type_error(format!(
                    "remove() requires a list or map, not {}",
                    other.type_name()
                ))),
            }
        });

    Intrinsic::create("indexOf")
        .param("self", Value::Null)
        .param("value", Value::Null)
        .param("after", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let value = arg(ctx, "value");
            let after = arg(ctx, "after");
            let result = match &receiver {
                Value::List(l) => {
                    let items = l.borrow();
                    let start = match &after {
                        Value::Null => 0,
                        v => {
                            miniscript_vm::eval::wrap_index(
                                v.double_value(),
                                items.len(),
                                "list",
                            )? + 1
                        }
                    };
                    items
                        .iter()
                        .enumerate()
                        .skip(start)
                        .find(|(_, v)| v.equality(&value) == 1.0)
                        .map(|(i, _)| Value::Number(i as f64))
                        .unwrap_or_default()
                }
                Value::String(s) => {
                    let needle = value.to_display_string();
                    let start_char = match &after {
                        Value::Null => 0,
                        v => {
                            miniscript_vm::eval::wrap_index(
                                v.double_value(),
                                s.chars().count(),
                                "string",
                            )? + 1
                        }
                    };
                    find_char_index(s, &needle, start_char)
                        .map(|i| Value::Number(i as f64))
                        .unwrap_or_default()
                }
                Value::Map(m) => {
                    let map = m.borrow();
                    let result = map
                        .iter()
                        .find(|(_, v)| v.equality(&value) == 1.0)
                        .map(|(k, _)| k.clone())
                        .unwrap_or_default();
                    result
                }
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("hasIndex")
        .param("self", Value::Null)
        .param("index", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let index = arg(ctx, "index");
            let result = match &receiver {
                Value::List(l) => match &index {
                    Value::Number(n) => {
                        let count = l.len() as i64;
                        let i = *n as i64;
                        Value::truth(i >= -count && i < count)
                    }
                    _ => Value::ZERO,
                },
                Value::String(s) => match &index {
                    Value::Number(n) => {
                        let count = s.chars().count() as i64;
                        let i = *n as i64;
                        Value::truth(i >= -count && i < count)
                    }
                    _ => Value::ZERO,
                },
                Value::Map(m) => Value::truth(m.borrow().contains_key(&index)),
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("indexes")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let result = match &receiver {
                Value::List(l) => {
                    Value::list((0..l.len()).map(|i| Value::Number(i as f64)).collect())
                }
                Value::String(s) => Value::list(
                    (0..s.chars().count())
                        .map(|i| Value::Number(i as f64))
                        .collect(),
                ),
                Value::Map(m) => {
                    Value::list(m.borrow().keys().cloned().collect())
                }
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("values")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let result = match &receiver {
                Value::List(l) => Value::list(l.borrow().clone()),
                Value::String(s) => Value::list(
                    s.chars().map(|c| Value::string(&c.to_string())).collect(),
                ),
                Value::Map(m) => {
                    Value::list(m.borrow().values().cloned().collect())
                }
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });

    Intrinsic::create("sum")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let total: f64 = match &receiver {
                Value::List(l) => l.borrow().iter().map(Value::double_value).sum(),
                Value::Map(m) => m.borrow().values().map(Value::double_value).sum(),
                _ => 0.0,
            };
            Ok(IntrinsicResult::done(Value::Number(total)))
        });

    Intrinsic::create("join")
        .param("self", Value::Null)
        .param("delimiter", Value::string(" "))
        .code(|ctx, _env, _partial| {
            let receiver = arg(ctx, "self");
            let delim = arg(ctx, "delimiter").to_display_string();
            let result = match &receiver {
                Value::List(l) => {
                    let parts: Vec<String> = l
                        .borrow()
                        .iter()
                        .map(Value::to_display_string)
                        .collect();
                    Value::string(&parts.join(&delim))
                }
                other => Value::string(&other.to_display_string()),
            };
            Ok(IntrinsicResult::done(result))
        });
}

/// Substring search by character index (not byte offset).
fn find_char_index(haystack: &str, needle: &str, start_char: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let byte_start = haystack
        .char_indices()
        .nth(start_char)
        .map(|(b, _)| b)
        .unwrap_or(haystack.len());
    let found = haystack[byte_start..].find(needle)?;
    let abs_byte = byte_start + found;
    Some(haystack[..abs_byte].chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_index_search_handles_multibyte() {
        assert_eq!(find_char_index("héllo", "llo", 0), Some(2));
        assert_eq!(find_char_index("ababab", "ab", 1), Some(2));
        assert_eq!(find_char_index("abc", "z", 0), None);
    }
}

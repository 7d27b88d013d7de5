//! String intrinsics.

use miniscript_core::{MsError, Value};
use miniscript_vm::{Intrinsic, IntrinsicResult};

use crate::arg;

pub fn register() {
    Intrinsic::create("str")
        .param("self", Value::string(""))
        .code(|ctx, _env, _partial| {
            Ok(IntrinsicResult::done(Value::string(
                &arg(ctx, "self").to_display_string(),
            )))
        });

    Intrinsic::create("upper")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            Ok(IntrinsicResult::done(match v.as_str() {
                Some(s) => Value::string(&s.to_uppercase()),
                None => v,
            }))
        });

    Intrinsic::create("lower")
        .param("self", Value::Null)
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            Ok(IntrinsicResult::done(match v.as_str() {
                Some(s) => Value::string(&s.to_lowercase()),
                None => v,
            }))
        });

    Intrinsic::create("split")
        .param("self", Value::string(""))
        .param("delimiter", Value::string(" "))
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            let s = v.as_str().ok_or_else(|| {
                MsError::type_error(format!("split() requires a string, not {}", v.type_name()))
            })?;
            let delim = arg(ctx, "delimiter").to_display_string();
            let parts: Vec<Value> = if delim.is_empty() {
                s.chars().map(|c| Value::string(&c.to_string())).collect()
            } else {
                s.split(delim.as_str()).map(Value::string).collect()
            };
            Ok(IntrinsicResult::done(Value::list(parts)))
        });

    Intrinsic::create("replace")
        .param("self", Value::string(""))
        .param("oldval", Value::Null)
        .param("newval", Value::string(""))
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            let s = v.as_str().ok_or_else(|| {
                MsError::type_error(format!(
                    "replace() requires a string, not {}",
                    v.type_name()
                ))
            })?;
            let oldval = arg(ctx, "oldval").to_display_string();
            if oldval.is_empty() {
                return Err(MsError::runtime("replace() oldval can't be empty"));
            }
            let newval = arg(ctx, "newval").to_display_string();
            Ok(IntrinsicResult::done(Value::string(
                &s.replace(&oldval, &newval),
            )))
        });
}

//! Numeric intrinsics.

use miniscript_core::Value;
use miniscript_vm::{Intrinsic, IntrinsicResult};

use crate::arg;

fn number_fn(name: &'static str, f: impl Fn(f64) -> f64 + 'static) {
    Intrinsic::create(name)
        .param("x", Value::Number(0.0))
        .code(move |ctx, _env, _partial| {
            Ok(IntrinsicResult::done(Value::Number(f(
                arg(ctx, "x").double_value()
            ))))
        });
}

pub fn register() {
    number_fn("abs", f64::abs);
    number_fn("floor", f64::floor);
    number_fn("ceil", f64::ceil);
    number_fn("sqrt", f64::sqrt);
    number_fn("sign", |x| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    });

    Intrinsic::create("round")
        .param("x", Value::Number(0.0))
        .param("decimalPlaces", Value::Number(0.0))
        .code(|ctx, _env, _partial| {
            let x = arg(ctx, "x").double_value();
            let places = arg(ctx, "decimalPlaces").double_value();
            let factor = 10f64.powf(places.trunc());
            Ok(IntrinsicResult::done(Value::Number(
                (x * factor).round() / factor,
            )))
        });

    Intrinsic::create("pi").code(|_ctx, _env, _partial| {
        Ok(IntrinsicResult::done(Value::Number(std::f64::consts::PI)))
    });

    Intrinsic::create("val")
        .param("self", Value::Number(0.0))
        .code(|ctx, _env, _partial| {
            let v = arg(ctx, "self");
            let result = match &v {
                Value::Number(n) => Value::Number(*n),
                Value::String(s) => Value::Number(s.trim().parse().unwrap_or(0.0)),
                _ => Value::Null,
            };
            Ok(IntrinsicResult::done(result))
        });
}

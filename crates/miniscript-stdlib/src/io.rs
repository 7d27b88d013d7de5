//! Output and timing intrinsics, including the two suspendable ones.

use miniscript_core::Value;
use miniscript_vm::{Intrinsic, IntrinsicResult};

use crate::arg;

pub fn register() {
    Intrinsic::create("print")
        .param("s", Value::string(""))
        .code(|ctx, env, _partial| {
            (env.standard_output)(&arg(ctx, "s").to_display_string());
            Ok(IntrinsicResult::null())
        });

    Intrinsic::create("time").code(|_ctx, env, _partial| {
        Ok(IntrinsicResult::done(Value::Number(env.elapsed_seconds())))
    });

    // Suspends until the deadline passes; the resume token is the deadline.
    Intrinsic::create("wait")
        .param("seconds", Value::Number(1.0))
        .code(|ctx, env, partial| {
            let now = env.elapsed_seconds();
            match partial {
                Some(deadline) => {
                    if now >= deadline.double_value() {
                        Ok(IntrinsicResult::null())
                    } else {
                        Ok(IntrinsicResult::partial(deadline))
                    }
                }
                None => {
                    let seconds = arg(ctx, "seconds").double_value();
                    Ok(IntrinsicResult::partial(Value::Number(now + seconds)))
                }
            }
        });

    // Suspends for exactly one step: gives the host a scheduling point.
    Intrinsic::create("yield").code(|_ctx, _env, partial| match partial {
        Some(_) => Ok(IntrinsicResult::null()),
        None => Ok(IntrinsicResult::partial(Value::ONE)),
    });
}

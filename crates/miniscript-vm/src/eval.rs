//! Per-opcode semantics: operand resolution, arithmetic and comparison over
//! every variant combination, fuzzy logic, and indexing.
//!
//! The machine handles the five stack-shaped ops (`Assign`, `AssignImplicit`,
//! `Return`, `CallFunction`, `CallIntrinsic`); everything else runs through
//! [`execute`] here, which returns the value to store at `lhs`, if any.

use miniscript_core::intern::names;
use miniscript_core::value::SeqElem;
use miniscript_core::{
    resolve as resolve_spur, ArithOp, Line, MsError, Op, Value, VarMap, MAX_SEQUENCE_SIZE,
};

use crate::context::Context;
use crate::intrinsic::Intrinsic;
use crate::machine::MachineEnv;
use crate::resolve;

/// Method-call bindings discovered while resolving a member access.
#[derive(Clone, Debug)]
pub struct Binding {
    pub self_value: Value,
    pub super_value: Option<Value>,
}

// ── Operand resolution ────────────────────────────────────────────

/// Resolve an operand to a concrete value: temporaries and variables read
/// through the context, member accesses run the prototype walk, everything
/// else is already concrete.
pub fn val(operand: &Value, ctx: &mut Context, env: &MachineEnv) -> Result<Value, MsError> {
    Ok(val_with_binding(operand, ctx, env)?.0)
}

/// Like [`val`], but for member accesses also reports the `self`/`super`
/// pair a method call through this operand would bind.
pub fn val_with_binding(
    operand: &Value,
    ctx: &mut Context,
    env: &MachineEnv,
) -> Result<(Value, Option<Binding>), MsError> {
    match operand {
        Value::Temp(i) => Ok((ctx.get_temp(*i), None)),
        Value::Var(v) => Ok((var_value(v.name, ctx, env)?, None)),
        Value::SeqElem(e) => seq_elem_value(e, ctx, env),
        other => Ok((other.clone(), None)),
    }
}

/// Identifier resolution: implicit locals, then the local map, captured
/// outer variables, globals, and finally the intrinsic registry.
pub fn var_value(
    name: miniscript_core::Spur,
    ctx: &Context,
    _env: &MachineEnv,
) -> Result<Value, MsError> {
    if let Some(v) = ctx.local(name) {
        return Ok(v);
    }
    if let Some(outer) = &ctx.outer_vars {
        if let Some(v) = Context::scope_lookup(outer, name) {
            return Ok(v);
        }
    }
    if let Some(globals) = &ctx.globals {
        if let Some(v) = Context::scope_lookup(globals, name) {
            return Ok(v);
        }
    }
    if let Some(intrinsic) = Intrinsic::get_by_spur(name) {
        return Ok(intrinsic.get_func());
    }
    Err(MsError::undefined(resolve_spur(name)))
}

fn seq_elem_value(
    e: &SeqElem,
    ctx: &mut Context,
    env: &MachineEnv,
) -> Result<(Value, Option<Binding>), MsError> {
    let seq = val(&e.seq, ctx, env)?;
    let key = val(&e.index, ctx, env)?;
    let (value, mut binding) = index_value(&seq, &key, env)?;
    // `super.x` keeps the current `self`; only the lookup start moves.
    if let Value::Var(v) = &e.seq {
        if v.name == names::super_name() {
            if let (Some(b), Some(current_self)) = (binding.as_mut(), ctx.self_value.clone()) {
                b.self_value = current_self;
            }
        }
    }
    Ok((value, binding))
}

/// Element/member access for a concrete sequence and key (`Index`, and the
/// resolution step of `SeqElem`).
pub fn index_value(
    seq: &Value,
    key: &Value,
    env: &MachineEnv,
) -> Result<(Value, Option<Binding>), MsError> {
    match seq {
        Value::Map(_) => {
            let found = resolve::lookup_member(seq, key, env)?;
            let binding = Binding {
                self_value: seq.clone(),
                super_value: isa_of(found.found_in.as_ref()),
            };
            Ok((found.value, Some(binding)))
        }
        Value::List(l) => match key {
            Value::Number(n) => {
                let items = l.borrow();
                let idx = wrap_index(*n, items.len(), "list")?;
                Ok((items[idx].clone(), None))
            }
            Value::String(_) => member_of(seq, key, env),
            _ => Err(MsError::type_error(format!(
                "list indices must be numbers, not {}",
                key.type_name()
            ))),
        },
        Value::String(s) => match key {
            Value::Number(n) => {
                let count = s.chars().count();
                let idx = wrap_index(*n, count, "string")?;
                let ch = s.chars().nth(idx).unwrap();
                Ok((Value::string(&ch.to_string()), None))
            }
            Value::String(_) => member_of(seq, key, env),
            _ => Err(MsError::type_error(format!(
                "string indices must be numbers, not {}",
                key.type_name()
            ))),
        },
        Value::Number(_) | Value::Function(..) | Value::Custom(_) => member_of(seq, key, env),
        Value::Null => Err(MsError::type_error(
            "Null Reference: can't index into null",
        )),
        other => Err(MsError::type_error(format!(
            "can't index into {}",
            other.type_name()
        ))),
    }
}

fn member_of(
    seq: &Value,
    key: &Value,
    env: &MachineEnv,
) -> Result<(Value, Option<Binding>), MsError> {
    let found = resolve::lookup_member(seq, key, env)?;
    let binding = Binding {
        self_value: seq.clone(),
        super_value: isa_of(found.found_in.as_ref()),
    };
    Ok((found.value, Some(binding)))
}

fn isa_of(map: Option<&Value>) -> Option<Value> {
    let map = map?.as_map()?;
    let map = map.borrow();
    map.get_spur(names::isa()).cloned()
}

/// Wrap a (possibly negative) numeric index into `[0, count)`.
pub fn wrap_index(raw: f64, count: usize, kind: &str) -> Result<usize, MsError> {
    let mut idx = raw as i64;
    if idx < 0 {
        idx += count as i64;
    }
    if idx < 0 || idx as usize >= count {
        return Err(MsError::index_error(kind, raw, count));
    }
    Ok(idx as usize)
}

/// Recursive `val` for container literals: temp/var elements are rewritten
/// to their resolved values, and nested literal containers are descended
/// into. Concrete elements are left alone.
pub fn full_eval(operand: &Value, ctx: &mut Context, env: &MachineEnv) -> Result<Value, MsError> {
    match operand {
        Value::List(l) => {
            let snapshot: Vec<Value> = l.borrow().clone();
            for (i, item) in snapshot.iter().enumerate() {
                if item.is_reference() {
                    let resolved = val(item, ctx, env)?;
                    l.borrow_mut()[i] = resolved;
                } else if matches!(item, Value::List(_) | Value::Map(_)) {
                    full_eval(item, ctx, env)?;
                }
            }
            Ok(operand.clone())
        }
        Value::Map(m) => {
            let entries: Vec<(Value, Value)> = {
                let map = m.borrow();
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            };
            let needs_rebuild = entries.iter().any(|(k, _)| k.is_reference());
            let mut rebuilt = if needs_rebuild {
                Some(VarMap::new())
            } else {
                None
            };
            for (k, v) in entries {
                let value = if v.is_reference() {
                    val(&v, ctx, env)?
                } else {
                    if matches!(v, Value::List(_) | Value::Map(_)) {
                        full_eval(&v, ctx, env)?;
                    }
                    v.clone()
                };
                match rebuilt.as_mut() {
                    Some(map) => {
                        let key = if k.is_reference() { val(&k, ctx, env)? } else { k };
                        map.insert(key, value);
                    }
                    None => m.borrow_mut().insert(k, value),
                }
            }
            if let Some(map) = rebuilt {
                let fresh = Value::map(map);
                return Ok(fresh);
            }
            Ok(operand.clone())
        }
        other => val(other, ctx, env),
    }
}

/// Evaluate-copy: a fresh list/map whose elements are the resolved elements
/// of the source. Each pass of control through a literal produces a new
/// mutable object. Non-containers behave like [`val`].
pub fn eval_copy(operand: &Value, ctx: &mut Context, env: &MachineEnv) -> Result<Value, MsError> {
    let base = if operand.is_reference() {
        val(operand, ctx, env)?
    } else {
        operand.clone()
    };
    match &base {
        Value::List(l) => {
            let src = l.borrow();
            let mut items = Vec::with_capacity(src.len());
            for item in src.iter() {
                items.push(val(item, ctx, env)?);
            }
            drop(src);
            Ok(Value::list(items))
        }
        Value::Map(m) => {
            let src = m.borrow();
            let mut map = VarMap::new();
            for (k, v) in src.iter() {
                map.insert(val(k, ctx, env)?, val(v, ctx, env)?);
            }
            drop(src);
            Ok(Value::map(map))
        }
        _ => Ok(base),
    }
}

// ── Fuzzy logic ───────────────────────────────────────────────────

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Negative magnitudes count as positive before clamping.
fn abs_clamp01(x: f64) -> f64 {
    clamp01(x.abs())
}

/// The fuzzy truth degree of an operand: numbers carry their own value,
/// everything else coerces through `bool_value`.
fn fuzzy_operand(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        other => {
            if other.bool_value() {
                1.0
            } else {
                0.0
            }
        }
    }
}

// ── Arithmetic ────────────────────────────────────────────────────

/// Null coerces to 0 beside a number.
fn numeric_pair(a: &Value, b: &Value) -> Option<(f64, f64)> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some((*x, *y)),
        (Value::Number(x), Value::Null) => Some((*x, 0.0)),
        (Value::Null, Value::Number(y)) => Some((0.0, *y)),
        _ => None,
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        other => other.to_display_string(),
    }
}

fn type_mismatch(op: &str, a: &Value, b: &Value) -> MsError {
    MsError::type_error(format!(
        "can't {op} {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

fn check_sequence_size(len: usize, kind: &str) -> Result<(), MsError> {
    if len > MAX_SEQUENCE_SIZE {
        return Err(MsError::limit(format!("maximum {kind} size exceeded")));
    }
    Ok(())
}

pub fn add_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    if let Some((x, y)) = numeric_pair(a, b) {
        return Ok(Value::Number(x + y));
    }
    if matches!((a, b), (Value::Null, Value::Null)) {
        return Ok(Value::Null);
    }
    // A string on either side stringifies and concatenates.
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        let (sa, sb) = (stringify(a), stringify(b));
        check_sequence_size(sa.len() + sb.len(), "string")?;
        let mut out = String::with_capacity(sa.len() + sb.len());
        out.push_str(&sa);
        out.push_str(&sb);
        return Ok(Value::String(out.into()));
    }
    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            check_sequence_size(x.len() + y.len(), "list")?;
            let mut items = Vec::with_capacity(x.len() + y.len());
            items.extend(x.iter().cloned());
            items.extend(y.iter().cloned());
            Ok(Value::list(items))
        }
        (Value::List(x), Value::Null) => Ok(Value::list(x.borrow().clone())),
        (Value::Null, Value::List(y)) => Ok(Value::list(y.borrow().clone())),
        (Value::Map(x), Value::Map(y)) => {
            let mut merged = VarMap::new();
            for (k, v) in x.borrow().iter() {
                merged.insert(k.clone(), v.clone());
            }
            for (k, v) in y.borrow().iter() {
                merged.insert(k.clone(), v.clone());
            }
            Ok(Value::map(merged))
        }
        (Value::Map(x), Value::Null) => {
            let mut copy = VarMap::new();
            for (k, v) in x.borrow().iter() {
                copy.insert(k.clone(), v.clone());
            }
            Ok(Value::map(copy))
        }
        _ => Err(type_mismatch("add", a, b)),
    }
}

pub fn sub_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    if let Some((x, y)) = numeric_pair(a, b) {
        return Ok(Value::Number(x - y));
    }
    match a {
        // String subtraction strips a matching suffix.
        Value::String(s) => {
            let suffix = stringify(b);
            if !suffix.is_empty() && s.ends_with(&suffix) {
                Ok(Value::string(&s[..s.len() - suffix.len()]))
            } else {
                Ok(a.clone())
            }
        }
        Value::Null if b.is_null() => Ok(Value::Null),
        _ => Err(type_mismatch("subtract", a, b)),
    }
}

pub fn mul_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    if let Some((x, y)) = numeric_pair(a, b) {
        return Ok(Value::Number(x * y));
    }
    match (a, b) {
        (Value::String(s), Value::Number(n)) => replicate_string(s, *n),
        (Value::List(l), Value::Number(n)) => replicate_list(l, *n),
        _ => Err(type_mismatch("multiply", a, b)),
    }
}

pub fn div_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    if let Some((x, y)) = numeric_pair(a, b) {
        return Ok(Value::Number(x / y));
    }
    match (a, b) {
        (Value::String(s), Value::Number(n)) => replicate_string(s, 1.0 / *n),
        (Value::List(l), Value::Number(n)) => replicate_list(l, 1.0 / *n),
        _ => Err(type_mismatch("divide", a, b)),
    }
}

pub fn mod_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    match numeric_pair(a, b) {
        Some((x, y)) => Ok(Value::Number(x % y)),
        None => Err(type_mismatch("take the remainder of", a, b)),
    }
}

pub fn pow_values(a: &Value, b: &Value) -> Result<Value, MsError> {
    match numeric_pair(a, b) {
        Some((x, y)) => Ok(Value::Number(x.powf(y))),
        None => Err(type_mismatch("raise", a, b)),
    }
}

/// `s * n`: whole copies plus that fraction of one more copy.
fn replicate_string(s: &str, factor: f64) -> Result<Value, MsError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Ok(Value::string(""));
    }
    let count = s.chars().count();
    let whole = factor.trunc() as usize;
    let extra = (factor.fract() * count as f64) as usize;
    let total = whole
        .saturating_mul(count)
        .saturating_add(extra);
    check_sequence_size(total, "string")?;
    let mut out = String::with_capacity(s.len() * whole + extra);
    for _ in 0..whole {
        out.push_str(s);
    }
    out.extend(s.chars().take(extra));
    Ok(Value::String(out.into()))
}

fn replicate_list(l: &std::rc::Rc<miniscript_core::value::ListRep>, factor: f64) -> Result<Value, MsError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Ok(Value::list(Vec::new()));
    }
    let src = l.borrow();
    let whole = factor.trunc() as usize;
    let extra = (factor.fract() * src.len() as f64) as usize;
    let total = whole.saturating_mul(src.len()).saturating_add(extra);
    check_sequence_size(total, "list")?;
    let mut items = Vec::with_capacity(total);
    for _ in 0..whole {
        items.extend(src.iter().cloned());
    }
    items.extend(src.iter().take(extra).cloned());
    Ok(Value::list(items))
}

fn arith(op: Op, a: &Value, b: &Value) -> Result<Value, MsError> {
    // Custom operands get first refusal on the four basic operators.
    let custom_op = match op {
        Op::Add => Some(ArithOp::Add),
        Op::Sub => Some(ArithOp::Sub),
        Op::Mul => Some(ArithOp::Mul),
        Op::Div => Some(ArithOp::Div),
        _ => None,
    };
    if let Some(cop) = custom_op {
        if let Value::Custom(c) = a {
            if let Some(v) = c.arith(cop, b, true) {
                return Ok(v);
            }
        }
        if let Value::Custom(c) = b {
            if let Some(v) = c.arith(cop, a, false) {
                return Ok(v);
            }
        }
    }
    match op {
        Op::Add => add_values(a, b),
        Op::Sub => sub_values(a, b),
        Op::Mul => mul_values(a, b),
        Op::Div => div_values(a, b),
        Op::Mod => mod_values(a, b),
        Op::Pow => pow_values(a, b),
        _ => unreachable!(),
    }
}

// ── Comparison ────────────────────────────────────────────────────

fn ordered(op: Op, a: &Value, b: &Value) -> Value {
    use std::cmp::Ordering;
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    let truth = match (op, ordering) {
        (Op::Greater, Some(Ordering::Greater)) => true,
        (Op::GreaterEq, Some(Ordering::Greater | Ordering::Equal)) => true,
        (Op::Less, Some(Ordering::Less)) => true,
        (Op::LessEq, Some(Ordering::Less | Ordering::Equal)) => true,
        _ => false,
    };
    Value::truth(truth)
}

// ── The evaluator ─────────────────────────────────────────────────

/// Execute one non-call, non-assign line. Returns the value to store at
/// `lhs` (if the opcode produces one); jumps mutate the context directly.
pub fn execute(
    line: &Line,
    ctx: &mut Context,
    env: &MachineEnv,
) -> Result<Option<Value>, MsError> {
    match line.op {
        Op::Noop => Ok(None),

        Op::Copy => Ok(Some(eval_copy(&line.a, ctx, env)?)),

        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Pow => {
            let a = val(&line.a, ctx, env)?;
            let b = val(&line.b, ctx, env)?;
            Ok(Some(arith(line.op, &a, &b)?))
        }

        Op::Equal => {
            let a = val(&line.a, ctx, env)?;
            let b = val(&line.b, ctx, env)?;
            Ok(Some(Value::fuzzy_truth(a.equality(&b))))
        }
        Op::NotEqual => {
            let a = val(&line.a, ctx, env)?;
            let b = val(&line.b, ctx, env)?;
            Ok(Some(Value::truth(a.equality(&b) == 0.0)))
        }

        Op::Greater | Op::GreaterEq | Op::Less | Op::LessEq => {
            let a = val(&line.a, ctx, env)?;
            let b = val(&line.b, ctx, env)?;
            Ok(Some(ordered(line.op, &a, &b)))
        }

        Op::Isa => {
            let a = val(&line.a, ctx, env)?;
            let b = val(&line.b, ctx, env)?;
            Ok(Some(Value::truth(resolve::value_is_a(&a, &b, env)?)))
        }

        Op::And => {
            let a = fuzzy_operand(&val(&line.a, ctx, env)?);
            let b = fuzzy_operand(&val(&line.b, ctx, env)?);
            Ok(Some(Value::Number(clamp01(a * b))))
        }
        Op::Or => {
            let a = fuzzy_operand(&val(&line.a, ctx, env)?);
            let b = fuzzy_operand(&val(&line.b, ctx, env)?);
            Ok(Some(Value::Number(abs_clamp01(a + b - a * b))))
        }
        Op::Not => {
            let a = val(&line.a, ctx, env)?;
            Ok(Some(match a {
                Value::Number(n) => Value::Number(1.0 - abs_clamp01(n)),
                other => Value::truth(!other.bool_value()),
            }))
        }

        Op::Jump => {
            jump_to(ctx, &line.a)?;
            Ok(None)
        }
        Op::JumpIfTrue => {
            let b = val(&line.b, ctx, env)?;
            if b.bool_value() {
                jump_to(ctx, &line.a)?;
            }
            Ok(None)
        }
        Op::JumpIfTruly => {
            let b = val(&line.b, ctx, env)?;
            if b.int_value() != 0 {
                jump_to(ctx, &line.a)?;
            }
            Ok(None)
        }
        Op::JumpIfFalse => {
            let b = val(&line.b, ctx, env)?;
            if !b.bool_value() {
                jump_to(ctx, &line.a)?;
            }
            Ok(None)
        }

        Op::PushArg => {
            let v = val(&line.a, ctx, env)?;
            ctx.push_arg(v);
            Ok(None)
        }

        Op::Index => {
            let seq = val(&line.a, ctx, env)?;
            let key = val(&line.b, ctx, env)?;
            Ok(Some(index_value(&seq, &key, env)?.0))
        }

        Op::IndexIter => {
            let seq = val(&line.a, ctx, env)?;
            let key = val(&line.b, ctx, env)?;
            match &seq {
                Value::Map(m) => {
                    let map = m.borrow();
                    let raw = key.double_value();
                    let idx = wrap_index(raw, map.len(), "map")?;
                    let (k, v) = map.at(idx).expect("ordinal checked against len");
                    let mut entry = VarMap::new();
                    entry.insert_spur(names::key(), k.clone());
                    entry.insert_spur(names::value(), v.clone());
                    drop(map);
                    Ok(Some(Value::map(entry)))
                }
                _ => Ok(Some(index_value(&seq, &key, env)?.0)),
            }
        }

        Op::Length => {
            let a = val(&line.a, ctx, env)?;
            match &a {
                Value::String(s) => Ok(Some(Value::Number(s.chars().count() as f64))),
                Value::List(l) => Ok(Some(Value::Number(l.len() as f64))),
                Value::Map(m) => Ok(Some(Value::Number(m.len() as f64))),
                Value::Null => Ok(Some(Value::Null)),
                other => Err(MsError::type_error(format!(
                    "{} has no length",
                    other.type_name()
                ))),
            }
        }

        Op::BindOuter => {
            let v = val(&line.a, ctx, env)?;
            match &v {
                Value::Function(f) => {
                    let bound = Value::Function(std::rc::Rc::new(
                        miniscript_core::FuncValue {
                            def: f.def.clone(),
                            outer: Some(ctx.variables_value()),
                        },
                    ));
                    Ok(Some(bound))
                }
                other => Err(MsError::type_error(format!(
                    "can't bind outer variables of {}",
                    other.type_name()
                ))),
            }
        }

        Op::Assign | Op::AssignImplicit | Op::Return | Op::CallFunction | Op::CallIntrinsic => {
            Err(MsError::runtime("opcode requires machine-level handling"))
        }
    }
}

fn jump_to(ctx: &mut Context, target: &Value) -> Result<(), MsError> {
    let t = target.int_value();
    if t < 0 {
        return Err(MsError::runtime(format!("bad jump target {t}")));
    }
    ctx.line_num = t as usize;
    Ok(())
}

//! Property tests for the value model's equality/hash contract.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;

use miniscript_core::{Value, VarMap};

fn hash_of(v: &Value) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

/// A structurally identical value built from fresh allocations, so equality
/// can't take any pointer-identity shortcut.
fn deep_copy(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::string(s),
        Value::List(l) => Value::list(l.borrow().iter().map(deep_copy).collect()),
        Value::Map(m) => {
            let mut copy = VarMap::new();
            for (k, val) in m.borrow().iter() {
                copy.insert(deep_copy(k), deep_copy(val));
            }
            Value::map(copy)
        }
        other => other.clone(),
    }
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        (-1000i32..1000).prop_map(|n| Value::Number(n as f64)),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::Number),
        "[a-z]{0,8}".prop_map(|s| Value::string(&s)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            prop::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(|entries| {
                let mut map = VarMap::new();
                for (k, v) in entries {
                    map.insert(Value::string(&k), v);
                }
                Value::map(map)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn equality_is_reflexive_for_copies(v in value_strategy()) {
        let copy = deep_copy(&v);
        prop_assert_eq!(v.equality(&copy), 1.0);
        prop_assert_eq!(copy.equality(&v), 1.0);
    }

    #[test]
    fn probable_equality_implies_equal_hashes(a in value_strategy(), b in value_strategy()) {
        if a.equality(&b) >= 0.5 {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn copies_hash_alike(v in value_strategy()) {
        let copy = deep_copy(&v);
        prop_assert_eq!(hash_of(&v), hash_of(&copy));
    }

    #[test]
    fn equality_is_symmetric(a in value_strategy(), b in value_strategy()) {
        prop_assert_eq!(a.equality(&b), b.equality(&a));
    }

    #[test]
    fn equality_stays_in_unit_range(a in value_strategy(), b in value_strategy()) {
        let e = a.equality(&b);
        prop_assert!((0.0..=1.0).contains(&e));
    }

    #[test]
    fn display_of_round_numbers_has_no_point(n in -10_000i32..10_000) {
        let shown = Value::Number(n as f64).to_display_string();
        prop_assert!(!shown.contains('.'), "got {shown}");
    }
}

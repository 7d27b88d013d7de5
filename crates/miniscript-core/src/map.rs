//! Insertion-ordered map storage for script maps.
//!
//! Keys are whole `Value`s compared structurally; iteration yields entries in
//! insertion order, and replacing a key's value leaves its position alone.

use hashlink::LinkedHashMap;
use lasso::Spur;

use crate::intern;
use crate::value::Value;

/// The backing store of a script map (and of context variable maps).
#[derive(Default)]
pub struct VarMap {
    inner: LinkedHashMap<Value, Value>,
}

impl VarMap {
    pub fn new() -> Self {
        VarMap {
            inner: LinkedHashMap::new(),
        }
    }

    pub(crate) fn from_inner(inner: LinkedHashMap<Value, Value>) -> Self {
        VarMap { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.inner.contains_key(key)
    }

    /// Look up by interned identifier without building a throwaway string:
    /// the key value shares the interner's `Rc<str>` allocation.
    pub fn get_spur(&self, name: Spur) -> Option<&Value> {
        self.inner.get(&Value::String(intern::shared_str(name)))
    }

    /// Insert, replacing any structurally equal key in place (the entry keeps
    /// its original position in iteration order).
    pub fn insert(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.inner.get_mut(&key) {
            *slot = value;
        } else {
            self.inner.insert(key, value);
        }
    }

    pub fn insert_spur(&mut self, name: Spur, value: Value) {
        self.insert(Value::String(intern::shared_str(name)), value);
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.inner.remove(key)
    }

    /// The entry at ordinal `n` in insertion order.
    pub fn at(&self, n: usize) -> Option<(&Value, &Value)> {
        self.inner.iter().nth(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.inner.values()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Tear down for storage recycling: drop all entries but keep capacity.
    pub(crate) fn into_inner(mut self) -> LinkedHashMap<Value, Value> {
        self.inner.clear();
        std::mem::take(&mut self.inner)
    }
}

impl FromIterator<(Value, Value)> for VarMap {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut map = VarMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

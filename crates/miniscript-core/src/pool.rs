//! Per-thread recycling of list and map backing storage.
//!
//! Dropping the last handle to a list or map clears it and parks the
//! allocation on a thread-local free-list; the next construction that wants
//! fresh storage reuses it. The in-use counters let tests assert that a
//! completed script released everything it created.

use std::cell::{Cell, RefCell};

use hashlink::LinkedHashMap;

use crate::value::Value;

const FREE_LIST_CAP: usize = 64;

thread_local! {
    static LIST_STORES: RefCell<Vec<Vec<Value>>> = const { RefCell::new(Vec::new()) };
    static MAP_STORES: RefCell<Vec<LinkedHashMap<Value, Value>>> = const { RefCell::new(Vec::new()) };
    static LISTS_IN_USE: Cell<usize> = const { Cell::new(0) };
    static MAPS_IN_USE: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn note_list_created() {
    LISTS_IN_USE.with(|c| c.set(c.get() + 1));
}

pub(crate) fn note_list_dropped() {
    LISTS_IN_USE.with(|c| c.set(c.get() - 1));
}

pub(crate) fn note_map_created() {
    MAPS_IN_USE.with(|c| c.set(c.get() + 1));
}

pub(crate) fn note_map_dropped() {
    MAPS_IN_USE.with(|c| c.set(c.get() - 1));
}

pub(crate) fn take_list_store(capacity: usize) -> Vec<Value> {
    let recycled = LIST_STORES.with(|p| p.borrow_mut().pop());
    match recycled {
        Some(mut v) => {
            v.reserve(capacity);
            v
        }
        None => Vec::with_capacity(capacity),
    }
}

pub(crate) fn give_list_store(mut store: Vec<Value>) {
    // Clear first: dropping elements can recursively reach this function,
    // and the free-list must not be borrowed while that happens.
    store.clear();
    LIST_STORES.with(|p| {
        let mut pool = p.borrow_mut();
        if pool.len() < FREE_LIST_CAP {
            pool.push(store);
        }
    });
}

pub(crate) fn take_map_store() -> LinkedHashMap<Value, Value> {
    MAP_STORES
        .with(|p| p.borrow_mut().pop())
        .unwrap_or_default()
}

pub(crate) fn give_map_store(mut store: LinkedHashMap<Value, Value>) {
    store.clear();
    MAP_STORES.with(|p| {
        let mut pool = p.borrow_mut();
        if pool.len() < FREE_LIST_CAP {
            pool.push(store);
        }
    });
}

/// Lists currently alive on this thread.
pub fn lists_in_use() -> usize {
    LISTS_IN_USE.with(Cell::get)
}

/// Maps currently alive on this thread.
pub fn maps_in_use() -> usize {
    MAPS_IN_USE.with(Cell::get)
}

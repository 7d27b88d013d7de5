//! Identifier interning.
//!
//! Variable names, map-member names, and a handful of hot reserved words go
//! through a per-thread interner so that name resolution compares 4-byte keys
//! instead of string contents, and so that looking an identifier up in a
//! script map allocates nothing after the first use.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use lasso::{Rodeo, Spur};

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
    static SHARED: RefCell<HashMap<Spur, Rc<str>>> = RefCell::new(HashMap::new());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to an owned String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call `f` with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// A shared `Rc<str>` for an interned identifier. Cached per thread, so the
/// same identifier always hands back a clone of one allocation — this is what
/// lets variable maps be keyed by ordinary string values without a fresh
/// allocation per lookup.
pub fn shared_str(spur: Spur) -> Rc<str> {
    SHARED.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(rc) = cache.get(&spur) {
            return rc.clone();
        }
        let rc: Rc<str> = with_resolved(spur, |s| Rc::from(s));
        cache.insert(spur, rc.clone());
        rc
    })
}

/// Reserved words and single-character strings that name resolution hits
/// constantly. Interned eagerly so their Spurs are stable from first use.
pub mod names {
    use super::{intern, Spur};
    use std::cell::Cell;

    macro_rules! hot_names {
        ($($fn_name:ident => $text:expr),* $(,)?) => {
            $(
                pub fn $fn_name() -> Spur {
                    thread_local! {
                        static CACHED: Cell<Option<Spur>> = const { Cell::new(None) };
                    }
                    CACHED.with(|c| match c.get() {
                        Some(s) => s,
                        None => {
                            let s = intern($text);
                            c.set(Some(s));
                            s
                        }
                    })
                }
            )*
        };
    }

    hot_names! {
        self_name => "self",
        super_name => "super",
        isa => "__isa",
        len => "len",
        to => "to",
        from => "from",
        seq => "seq",
        space => " ",
        implicit_result => "_",
        key => "key",
        value => "value",
    }
}

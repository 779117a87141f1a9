//! Owns string allocations made while compiling a chunk.
//!
//! Lox strings are immutable once created, so plain reference counting is enough to share them
//! safely; there is no need for a tracing collector. [Gc] additionally interns string contents
//! within a single compile, so that e.g. the same identifier referenced many times in one chunk
//! shares one allocation instead of being copied on every use.

use std::collections::HashSet;
use std::rc::Rc;

/// A per-compile string table. Dropping the [Gc] does not invalidate any `Rc<str>` it handed
/// out; those are kept alive independently by whoever holds a clone (the constant pool, the
/// globals table, the value stack).
#[derive(Default)]
pub struct Gc {
    strings: HashSet<Rc<str>>,
}

impl Gc {
    /// Returns a fresh, empty string table.
    pub fn new() -> Self {
        Gc::default()
    }

    /// Interns `text`, returning a cheaply-cloneable handle to its contents. Calling this twice
    /// with equal strings returns clones of the same allocation.
    pub fn intern(&mut self, text: &str) -> Rc<str> {
        if let Some(existing) = self.strings.get(text) {
            return Rc::clone(existing);
        }

        let rc: Rc<str> = Rc::from(text);
        self.strings.insert(Rc::clone(&rc));
        rc
    }

    /// Returns how many distinct strings are currently interned.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_deduplicates_equal_strings() {
        let mut gc = Gc::new();
        let a = gc.intern("hello");
        let b = gc.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(1, gc.len());
    }

    #[test]
    fn distinct_strings_get_distinct_allocations() {
        let mut gc = Gc::new();
        let a = gc.intern("hello");
        let b = gc.intern("goodbye");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(2, gc.len());
    }

    #[test]
    fn strings_outlive_the_gc() {
        let s = {
            let mut gc = Gc::new();
            gc.intern("still here")
        };
        assert_eq!("still here", s.as_ref());
    }
}

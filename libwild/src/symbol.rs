//! The minimal symbol-state surface the classifiers in `plt`/`copy_rel`/
//! `tls` need. Actual symbol interning, resolution and versioning is a
//! non-goal here; `SymbolBody` is the read-only view a real symbol table
//! would hand the backend.

use crate::resolution::ValueFlags;

/// The ELF symbol type bits relevant to relocation processing, collapsed
/// from `STT_*` down to the handful of distinctions the backend actually
/// branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Object,
    Func,
    Tls,
    GnuIFunc,
    /// `STT_NOTYPE`/`STT_SECTION`/anything else the backend doesn't need to
    /// distinguish.
    Other,
}

/// A read-only view of one symbol's resolution state, as the backend needs
/// to see it. A real symbol table implementation would compute
/// `value_flags` once during resolution and hand out `SymbolBody` values (or
/// references to its own rows) cheaply; this type only names the shape.
#[derive(Debug, Clone, Copy)]
pub struct SymbolBody {
    pub kind: SymbolKind,
    pub value_flags: ValueFlags,
}

impl SymbolBody {
    pub fn is_func(&self) -> bool {
        matches!(self.kind, SymbolKind::Func | SymbolKind::GnuIFunc)
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.kind, SymbolKind::Tls)
    }

    pub fn is_gnu_ifunc(&self) -> bool {
        matches!(self.kind, SymbolKind::GnuIFunc)
    }

    /// `isShared()` in the original: is this symbol's definition only known
    /// at load time (it lives in a shared object this link depends on, or is
    /// otherwise not locally defined)?
    pub fn is_shared(&self) -> bool {
        self.value_flags.contains(ValueFlags::DYNAMIC)
    }

    /// Whether the dynamic linker could resolve a reference to this symbol
    /// to a *different* definition than the one this link chose (a
    /// non-hidden symbol in a shared object, or exported from one being
    /// built). Interposability rules out most relaxations, independent of
    /// whether the symbol is locally defined.
    pub fn is_preemptible(&self) -> bool {
        self.value_flags.contains(ValueFlags::DYNAMIC_SYMBOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gnu_ifunc_is_a_func() {
        let body = SymbolBody {
            kind: SymbolKind::GnuIFunc,
            value_flags: ValueFlags::IFUNC,
        };
        assert!(body.is_func());
        assert!(body.is_gnu_ifunc());
        assert!(!body.is_tls());
    }

    #[test]
    fn shared_object_symbol_is_shared_and_preemptible() {
        let body = SymbolBody {
            kind: SymbolKind::Object,
            value_flags: ValueFlags::DYNAMIC | ValueFlags::DYNAMIC_SYMBOL,
        };
        assert!(body.is_shared());
        assert!(body.is_preemptible());
    }
}

//! `ValueFlags`: what a symbol's resolved value actually looks like, as seen
//! by the backend. The symbol table itself, interning, and the resolution
//! algorithm that produces these flags are a non-goal here; this module only
//! names the bits `Arch::Relaxation::new` and the PLT/copy-rel classifiers
//! consult.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValueFlags: u8 {
        /// The symbol resolves to a fixed address (as opposed to, say, an
        /// absolute constant that happens to look like one). Relaxation may
        /// only fold a GOT load into an absolute move when this is set and
        /// the output is non-relocatable.
        const ADDRESS = 1 << 0;

        /// The symbol's value is already a plain absolute value (e.g. it was
        /// defined with `=` in a linker script, or is an undefined weak
        /// resolving to zero), not an address subject to relocation at all.
        const ABSOLUTE = 1 << 1;

        /// The symbol is defined in a shared object, or otherwise can only be
        /// resolved at load time. Forces a dynamic relocation or a PLT/GOT
        /// indirection; rules out most relaxations.
        const DYNAMIC = 1 << 2;

        /// Nothing about this symbol's definition requires routing the
        /// reference through the GOT (it's defined in this link and not
        /// interposable), so a GOT-indirect form may be relaxed down to a
        /// direct one.
        const CAN_BYPASS_GOT = 1 << 3;

        /// The symbol is itself a dynamic symbol in the output (it's
        /// preemptible, or the output is a shared object and the symbol is
        /// exported), so direct references to it need a `GLOB_DAT`-style
        /// dynamic relocation rather than a `RELATIVE` one.
        const DYNAMIC_SYMBOL = 1 << 4;

        /// An `STT_GNU_IFUNC` symbol. References must always resolve through
        /// an indirect call (PLT) or a GOT load patched with an
        /// `R_*_IRELATIVE` relocation; direct references are never valid.
        const IFUNC = 1 << 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifunc_is_not_address() {
        assert!(!ValueFlags::IFUNC.contains(ValueFlags::ADDRESS));
    }

    #[test]
    fn absolute_and_dynamic_are_independent_bits() {
        let flags = ValueFlags::ABSOLUTE | ValueFlags::DYNAMIC;
        assert!(flags.contains(ValueFlags::ABSOLUTE));
        assert!(flags.contains(ValueFlags::DYNAMIC));
        assert!(!(ValueFlags::ABSOLUTE).contains(ValueFlags::DYNAMIC));
    }
}

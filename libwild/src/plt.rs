//! The PLT request classifier (C6): independent of architecture, decides
//! whether a reference to a symbol needs a PLT entry at all, and if so,
//! whether the need is explicit (the relocation itself names a PLT-class
//! type, e.g. `R_X86_64_PLT32`) or merely implicit (a plain call/jump to a
//! symbol that turns out to be dynamic or an ifunc, which still needs
//! indirection even though the relocation type doesn't say so).

use crate::resolution::ValueFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PltNeed {
    /// No indirection required; the reference may go straight to the
    /// symbol's resolved address.
    No,
    /// The relocation type itself calls for a PLT-relative computation.
    Explicit,
    /// The relocation type is an ordinary direct/relative one, but the
    /// symbol it targets can't be referenced directly (it's dynamic, or an
    /// ifunc whose address isn't known until its resolver runs).
    Implicit,
}

/// `is_plt_relocation(r_kind)`: whether a raw relocation type's *classified*
/// kind already routes through the PLT, independent of the symbol it
/// targets.
pub(crate) fn is_plt_relocation_kind(kind: linker_utils::elf::RelocationKind) -> bool {
    matches!(
        kind,
        linker_utils::elf::RelocationKind::Plt | linker_utils::elf::RelocationKind::PltRelative
    )
}

/// Classifies whether a reference needs a PLT entry. `is_explicit_plt_kind`
/// is the result of classifying the relocation's own type (via
/// `Arch::relocation_from_raw`); `value_flags` describes what the backend
/// knows about the symbol the relocation targets.
///
/// Law: a reference can only ever need *at most one* of {direct access, PLT
/// entry, GOT entry for IRELATIVE}; this never returns `Explicit` for a
/// symbol that isn't dynamic and isn't an ifunc and the relocation type
/// itself isn't PLT-class, and it never returns `No` for an ifunc referenced
/// through a call-class relocation. An ifunc always needs a PLT entry
/// regardless of the relocation type used to reach it, since its address
/// isn't known until its resolver runs at load time; that check comes first
/// and is unconditional.
pub fn needs_plt(
    relocation_kind: linker_utils::elf::RelocationKind,
    value_flags: ValueFlags,
) -> PltNeed {
    if value_flags.contains(ValueFlags::IFUNC) {
        return PltNeed::Explicit;
    }
    if is_plt_relocation_kind(relocation_kind) {
        return PltNeed::Explicit;
    }
    if value_flags.contains(ValueFlags::DYNAMIC)
        && matches!(
            relocation_kind,
            linker_utils::elf::RelocationKind::Relative
        )
    {
        return PltNeed::Implicit;
    }
    PltNeed::No
}

#[cfg(test)]
mod tests {
    use super::*;
    use linker_utils::elf::RelocationKind;

    #[test]
    fn plt_class_relocation_is_always_explicit() {
        assert_eq!(
            needs_plt(RelocationKind::PltRelative, ValueFlags::empty()),
            PltNeed::Explicit
        );
    }

    #[test]
    fn ifunc_via_direct_relocation_is_explicit() {
        assert_eq!(
            needs_plt(RelocationKind::Absolute, ValueFlags::IFUNC),
            PltNeed::Explicit
        );
    }

    #[test]
    fn ifunc_is_explicit_regardless_of_relocation_kind() {
        for kind in [
            RelocationKind::Relative,
            RelocationKind::Absolute,
            RelocationKind::PltRelative,
            RelocationKind::Got,
        ] {
            assert_eq!(needs_plt(kind, ValueFlags::IFUNC), PltNeed::Explicit);
        }
    }

    #[test]
    fn plain_defined_symbol_needs_no_plt() {
        assert_eq!(
            needs_plt(RelocationKind::Relative, ValueFlags::ADDRESS),
            PltNeed::No
        );
    }

    #[test]
    fn dynamic_symbol_via_relative_call_is_implicit() {
        assert_eq!(
            needs_plt(RelocationKind::Relative, ValueFlags::DYNAMIC),
            PltNeed::Implicit
        );
    }
}

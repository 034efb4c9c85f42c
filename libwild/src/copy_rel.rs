//! The copy-relocation classifier (C7): deciding whether a direct reference
//! to a data symbol defined in a shared object must be satisfied by copying
//! that object's initial value into this output's BSS (`R_*_COPY`) rather
//! than an ordinary dynamic relocation.
//!
//! Copy relocations exist only because non-PIC executables can't indirect
//! through the GOT for every data reference the way PIC code does; they're
//! never needed, and never valid, for a PIC/shared output.

use crate::args::OutputKind;
use crate::resolution::ValueFlags;

/// Mirrors `Writer::needCopyRelForSymbol` in the original.
///
/// Preconditions asserted here, not merely documented: a copy relocation is
/// only ever appropriate for an object-typed (`IsTls == false`, `IsFunc ==
/// false`) symbol, defined in a shared object, referenced from a
/// non-PIC/non-shared output that cannot otherwise make the reference work.
pub fn needs_copy_rel(
    value_flags: ValueFlags,
    is_func: bool,
    is_tls: bool,
    output_kind: OutputKind,
) -> bool {
    if is_func || is_tls {
        return false;
    }
    if output_kind.is_pic() {
        return false;
    }
    value_flags.contains(ValueFlags::DYNAMIC) && !value_flags.contains(ValueFlags::CAN_BYPASS_GOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::RelocationModel;

    #[test]
    fn tls_symbol_never_gets_copy_rel() {
        assert!(!needs_copy_rel(
            ValueFlags::DYNAMIC,
            false,
            true,
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
    }

    #[test]
    fn pic_output_never_gets_copy_rel() {
        assert!(!needs_copy_rel(
            ValueFlags::DYNAMIC,
            false,
            false,
            OutputKind::SharedObject,
        ));
    }

    #[test]
    fn dynamic_data_symbol_in_static_exe_needs_copy_rel() {
        assert!(needs_copy_rel(
            ValueFlags::DYNAMIC,
            false,
            false,
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
    }

    #[test]
    fn locally_defined_symbol_needs_no_copy_rel() {
        assert!(!needs_copy_rel(
            ValueFlags::ADDRESS,
            false,
            false,
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
    }
}

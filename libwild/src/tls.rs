//! The TLS relaxation dispatcher (C5): one place that decides, independent
//! of architecture, *whether* an access model may be relaxed, leaving *how*
//! to rewrite the bytes to `Arch::Relaxation`/`linker_utils::<arch>`.
//!
//! Mirrors the `R_*_TLS*` branches of each target's `relax`/`relocate`
//! method in the original, which all share the same shape: check the output
//! kind and the symbol's TLS visibility, then either fall through to a
//! dynamic relocation or fold the access down to a cheaper model.

use crate::args::OutputKind;
use crate::resolution::ValueFlags;

/// The TLS access model a relocation was originally emitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsAccess {
    /// General dynamic: calls `__tls_get_addr` with a module ID/offset pair
    /// looked up in the GOT. Works for any symbol in any output.
    GeneralDynamic,
    /// Local dynamic: like general dynamic, but shares one module-ID lookup
    /// across every TLS symbol defined in the same object.
    LocalDynamic,
    /// Initial exec: loads a fixed thread-pointer-relative offset out of the
    /// GOT, filled in by the dynamic linker at load time. Requires that the
    /// module be known not to be dynamically loaded after the initial
    /// program start (not valid from a `dlopen`ed shared object).
    InitialExec,
    /// Local exec: the offset from the thread pointer is a link-time
    /// constant, encoded directly in the instruction. Only valid for
    /// symbols defined in the executable being linked.
    LocalExec,
}

/// Whether `from` may be relaxed at all, given what's known about the
/// symbol and the kind of output being produced. Doesn't say *which*
/// cheaper model it relaxes to; `relax_tls` below (and ultimately the
/// architecture's own relaxation) makes that call once this returns true.
///
/// - General/local dynamic models may only relax in an executable: shared
///   objects must keep the dynamic lookup because they can be `dlopen`ed
///   into a process whose TLS layout isn't fixed until then.
/// - Initial exec may only relax to local exec in a *non-PIC* executable:
///   a PIE can still be `dlopen`ed as a dependency via `LD_PRELOAD`-style
///   tricks that fix up its own TLS block after other modules have already
///   claimed their static slots, so folding straight to a constant isn't
///   safe there either.
pub fn can_relax_tls(from: TlsAccess, value_flags: ValueFlags, output_kind: OutputKind) -> bool {
    if value_flags.contains(ValueFlags::DYNAMIC) {
        return false;
    }
    match from {
        TlsAccess::GeneralDynamic | TlsAccess::LocalDynamic => output_kind.is_executable(),
        TlsAccess::InitialExec => output_kind.is_executable() && !output_kind.is_pic(),
        TlsAccess::LocalExec => false,
    }
}

/// What `from` relaxes to, given that `can_relax_tls` has already returned
/// true. General/local dynamic fold straight to local exec in a non-PIC
/// executable (skipping initial exec entirely, matching the teacher's
/// `R_X86_64_TLSGD`/`R_X86_64_TLSLD` handling), and to initial exec
/// otherwise.
pub fn relax_tls(from: TlsAccess, output_kind: OutputKind) -> TlsAccess {
    match from {
        TlsAccess::GeneralDynamic | TlsAccess::LocalDynamic => {
            if !output_kind.is_pic() {
                TlsAccess::LocalExec
            } else {
                TlsAccess::InitialExec
            }
        }
        TlsAccess::InitialExec => TlsAccess::LocalExec,
        TlsAccess::LocalExec => TlsAccess::LocalExec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::RelocationModel;

    #[test]
    fn dynamic_symbol_never_relaxes() {
        assert!(!can_relax_tls(
            TlsAccess::GeneralDynamic,
            ValueFlags::DYNAMIC,
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
    }

    #[test]
    fn general_dynamic_relaxes_in_any_executable() {
        assert!(can_relax_tls(
            TlsAccess::GeneralDynamic,
            ValueFlags::empty(),
            OutputKind::DynamicExecutable(RelocationModel::Relocatable),
        ));
        assert!(!can_relax_tls(
            TlsAccess::GeneralDynamic,
            ValueFlags::empty(),
            OutputKind::SharedObject,
        ));
    }

    #[test]
    fn initial_exec_requires_non_pic_executable() {
        assert!(can_relax_tls(
            TlsAccess::InitialExec,
            ValueFlags::empty(),
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
        assert!(!can_relax_tls(
            TlsAccess::InitialExec,
            ValueFlags::empty(),
            OutputKind::DynamicExecutable(RelocationModel::Relocatable),
        ));
    }

    #[test]
    fn relax_targets() {
        assert_eq!(
            relax_tls(
                TlsAccess::GeneralDynamic,
                OutputKind::StaticExecutable(RelocationModel::NonRelocatable)
            ),
            TlsAccess::LocalExec
        );
        assert_eq!(
            relax_tls(
                TlsAccess::GeneralDynamic,
                OutputKind::DynamicExecutable(RelocationModel::Relocatable)
            ),
            TlsAccess::InitialExec
        );
        assert_eq!(
            relax_tls(
                TlsAccess::InitialExec,
                OutputKind::StaticExecutable(RelocationModel::NonRelocatable)
            ),
            TlsAccess::LocalExec
        );
    }
}

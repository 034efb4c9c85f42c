//! The `Arch` trait: everything a target-relocation backend must supply.
//! One implementation exists per supported `e_machine`/width/endian
//! combination (`crate::target` picks the right one at runtime); callers
//! drive relocation processing entirely through this trait and never match
//! on the target themselves.

use std::borrow::Cow;
use std::fmt::Debug;

use linker_utils::elf::RelocationKind;
use linker_utils::elf::SectionFlags;
use linker_utils::relaxation::RelocationModifier;

use crate::args::OutputKind;
use crate::elf::DynamicRelocationKind;
use crate::elf::RelocationKindInfo;
use crate::error::Result;
use crate::plt::is_plt_relocation_kind;
use crate::resolution::ValueFlags;

/// The architecture-agnostic fallback for `Arch::get_dyn_rel`: a static
/// absolute or relative reference can always be promoted to the matching
/// dynamic relocation; anything else (GOT-relative forms, TLS access models
/// an architecture doesn't special-case, ...) is rejected. AArch64 and MIPS
/// rely on exactly this fallback to reject the requests spec.md calls out;
/// x86 overrides it for TLS-LE forms.
pub(crate) fn generic_get_dyn_rel<A: Arch>(r_type: u32) -> anyhow::Result<u32> {
    let info = A::relocation_from_raw(r_type)?;
    match info.kind {
        RelocationKind::Absolute => Ok(A::get_dynamic_relocation_type(
            DynamicRelocationKind::DynamicSymbol,
        )),
        RelocationKind::Relative => {
            Ok(A::get_dynamic_relocation_type(DynamicRelocationKind::Relative))
        }
        _ => Err(anyhow::anyhow!(
            "relocation {} cannot be promoted to a dynamic relocation",
            A::rel_type_to_string(r_type)
        )),
    }
}

/// Fixed, backend-specific layout constants that don't vary per-relocation:
/// entry sizes, header reservations and the starting virtual address used
/// when no other constraint pins it down. A non-goal (output-section
/// layout) consumes most of these; the backend only needs to report them.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    /// Size in bytes of one entry in `.plt`.
    pub plt_entry_size: u64,
    /// Size in bytes of the special entry 0 of `.plt` (x86/x86_64 reserve an
    /// entry for the resolver stub; many RISC targets don't).
    pub plt_zero_size: u64,
    /// Number of reserved header entries at the start of `.got.plt` (two on
    /// x86/x86_64: the link map pointer and the resolver entry point).
    pub got_plt_header_entries: u64,
    /// Number of reserved header entries at the start of the plain `.got`
    /// (MIPS reserves two).
    pub got_header_entries: u64,
    /// The minimum page size the backend must align PT_LOAD segments to.
    pub page_size: u64,
    /// Default base address for non-PIE executables when nothing else
    /// constrains it.
    pub va_start: u64,
    /// Whether undefined function symbols get lazily-bound PLT stubs
    /// (`.plt`/`.got.plt`) rather than being resolved eagerly at load time.
    pub use_lazy_binding: bool,
}

/// A single architecture's knowledge of how to classify, size and patch its
/// own relocations. Implementors are zero-sized marker types; all state
/// lives in the `Config`/symbol data the caller passes in.
pub trait Arch {
    type Relaxation: Relaxation;

    /// The `e_machine` value this backend handles (`EM_X86_64` etc.), used to
    /// validate an input object's ELF header against the target the driver
    /// selected.
    fn elf_header_arch_magic() -> u16;

    /// Classifies a raw relocation type into its semantic kind and natural
    /// field width. Returns `Err` for types this backend has never heard of
    /// ("unrecognized relocation", a fatal condition).
    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo>;

    /// Maps one of the fixed dynamic-relocation kinds onto this
    /// architecture's actual `R_*_*` constant, for writing `.rela.dyn`.
    fn get_dynamic_relocation_type(relocation: DynamicRelocationKind) -> u32;

    /// Formats a raw relocation type for diagnostics. Unlike
    /// `relocation_from_raw`, never fails: unknown values still print as
    /// `Unknown (machine relocation type N)`.
    fn rel_type_to_string(r_type: u32) -> Cow<'static, str>;

    /// Extracts the addend a REL-format relocation carries in the
    /// instruction/data bytes at `Loc`, rather than in the relocation record
    /// itself (RELA architectures carry it explicitly and never need this).
    /// Default 0, correct for every RELA backend (x86_64, AArch64, PPC64).
    fn get_implicit_addend(
        _section_bytes: &[u8],
        _offset_in_section: u64,
        _r_type: u32,
    ) -> i64 {
        0
    }

    /// Maps a static relocation to the dynamic relocation that should appear
    /// in `.rel.dyn`/`.rela.dyn` when a reference can't be resolved
    /// statically. The default promotes plain absolute/relative forms to
    /// their matching dynamic kind and rejects everything else; x86
    /// overrides this for TLS-LE forms, which dynamically relocate to a
    /// TPOFF entry instead.
    fn get_dyn_rel(r_type: u32) -> anyhow::Result<u32> {
        generic_get_dyn_rel::<Self>(r_type)
    }

    /// The relocation type a GOT entry created for this TLS reference should
    /// carry, so the dynamic linker knows how to fill it in. Architectures
    /// with no TLS GOT entries (PPC, PPC64, AMDGPU) never call this.
    fn get_tls_got_rel(_r_type: u32) -> u32 {
        unreachable!("architecture has no TLS GOT relocations")
    }

    /// Whether a reference of this type needs a GOT entry materialised at
    /// all. True for relocations classified `Got`, for the initial-exec and
    /// TLS-descriptor families (both load through the GOT), and for
    /// `refers_to_got_entry` forms that read through a GOT slot without
    /// being classified `Got` themselves.
    fn needs_got(r_type: u32, value_flags: ValueFlags) -> bool {
        let _ = value_flags;
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(RelocationKind::Got | RelocationKind::TlsIe | RelocationKind::TlsDesc)
        ) || Self::refers_to_got_entry(r_type)
    }

    /// Whether this relocation's own type demands a PLT entry, independent
    /// of anything known about the symbol it targets. Default: true for
    /// relocations classified PLT-relative.
    fn needs_plt_impl(r_type: u32) -> bool {
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(kind) if is_plt_relocation_kind(kind)
        )
    }

    /// Whether this relocation class demands a copy relocation when it
    /// targets a shared-object `STT_OBJECT` symbol. Default: true for plain
    /// absolute references, which is what every backend in this crate uses.
    fn needs_copy_rel_impl(r_type: u32) -> bool {
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(RelocationKind::Absolute)
        )
    }

    /// x86-only: whether a TLS-IE reference from a shared object needs an
    /// extra `R_386_RELATIVE`-like dynamic entry alongside its ordinary GOT
    /// fixup. False everywhere else.
    fn needs_dyn_relative(_r_type: u32) -> bool {
        false
    }

    /// Whether `S - P` (or another pure PC-relative quantity) already
    /// suffices to resolve this relocation at static link time, so no
    /// load-time base relocation is ever needed for it. Default true
    /// (conservative for most ISAs, where PC-relative forms dominate); PPC
    /// and x86 override to default false and whitelist their relative forms
    /// explicitly, since absolute forms dominate those ISAs instead.
    fn is_rel_relative(_r_type: u32) -> bool {
        true
    }

    /// `SIZE32`/`SIZE64`-style relocations (x86_64 only); everywhere else
    /// false.
    fn is_size_rel(_r_type: u32) -> bool {
        false
    }

    /// MIPS `R_MIPS_JALR` and relocations like it: purely advisory, safe to
    /// leave untouched when the optimisation they hint at doesn't apply.
    fn is_hint_rel(_r_type: u32) -> bool {
        false
    }

    /// GOT-relative but does not itself need a GOT entry (x86 `GOTOFF`,
    /// `GOTPC`).
    fn is_got_relative(_r_type: u32) -> bool {
        false
    }

    /// Implies the relocation reads through a GOT slot even when
    /// `relocation_from_raw` wouldn't otherwise classify it `Got` (x86_64's
    /// `GOTPCREL{,X}`/`REX_GOTPCRELX`, which can additionally be relaxed
    /// away).
    fn refers_to_got_entry(_r_type: u32) -> bool {
        false
    }

    /// Whether this relocation's GOT entry is the single one shared across
    /// every TLS symbol defined in the same object for local-dynamic access
    /// (the module-ID slot), rather than a per-symbol entry. Default: true
    /// exactly when the relocation classifies as local-dynamic.
    fn points_to_local_dynamic_got_entry(r_type: u32) -> bool {
        Self::is_tls_local_dynamic_rel(r_type)
    }

    /// Whether `r_type` is a local-dynamic TLS access (shares one module-ID
    /// GOT lookup with every other TLS symbol defined in the same object).
    fn is_tls_local_dynamic_rel(r_type: u32) -> bool {
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(RelocationKind::TlsLd)
        )
    }

    /// Whether `r_type` is a general-dynamic TLS access (calls
    /// `__tls_get_addr` with a GOT-resident module-ID/offset pair).
    fn is_tls_global_dynamic_rel(r_type: u32) -> bool {
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(RelocationKind::TlsGd)
        )
    }

    /// Whether `r_type` is an initial-exec TLS access (loads a
    /// thread-pointer-relative offset out of the GOT, filled in by the
    /// dynamic linker).
    fn is_tls_initial_exec_rel(r_type: u32) -> bool {
        matches!(
            Self::relocation_from_raw(r_type).map(|info| info.kind),
            Ok(RelocationKind::TlsIe)
        )
    }

    /// Patches `[Loc, BufEnd)` for a single relocation whose expression
    /// (`S+A`, `S+A-P`, `G+A`, `L+A-P`, ...) has already been fully evaluated
    /// by the caller into `value`; this only selects the bits of `value`
    /// each relocation type's field actually wants, range/alignment-checks
    /// them, and writes them. For REL-format architectures (x86, MIPS32),
    /// the implicit addend has already been read out of the existing bytes
    /// by the caller before computing `value`, the same way resolving `A`
    /// from the relocation record itself would work for RELA. `place` is the
    /// final virtual address of the relocation site, used for PC-relative
    /// forms. `plt_range` is the `[start, end)` virtual-address range of the
    /// output's `.plt`, when one exists; PPC64's `REL24` handling uses it to
    /// tell a call that lands inside the PLT (and so returns through a stub
    /// that clobbers the TOC pointer) from an ordinary direct branch to a
    /// function in the same TOC group. Recoverable problems (range,
    /// alignment) are reported to `errors` rather than returned, so that one
    /// bad relocation doesn't stop the rest of the section from being
    /// processed.
    fn relocate_one(
        section_bytes: &mut [u8],
        offset_in_section: u64,
        r_type: u32,
        place: u64,
        value: u64,
        plt_range: Option<(u64, u64)>,
        errors: &crate::error::ErrorSink,
    ) -> Result;

    /// Writes the two architecture-reserved header entries of `.got.plt`
    /// (the link map pointer, left zero for the dynamic linker to fill in,
    /// and the resolver trampoline entry point).
    fn write_got_plt_header(got_plt: &mut [u8]) -> Result {
        got_plt.fill(0);
        Ok(())
    }

    /// Writes the steady-state per-symbol `.got.plt` entry: the address of
    /// the corresponding `.plt` entry's second instruction, so that the
    /// first call lazily binds through the resolver.
    fn write_got_plt_entry(got_plt_entry: &mut [u8], plt_address: u64, config: &BackendConfig);

    /// Writes `.plt`'s entry 0, the shared resolver stub. A no-op for
    /// architectures with no reserved entry 0 (`plt_zero_size == 0`).
    fn write_plt_zero(_plt_zero: &mut [u8], _got_plt_address: u64, _plt_zero_address: u64) -> Result {
        Ok(())
    }

    /// Writes one steady-state `.plt` entry that indirects through
    /// `got_address` to reach the symbol's real address.
    fn write_plt_entry(plt_entry: &mut [u8], got_address: u64, plt_address: u64) -> Result;

    /// `can_relax_tls` (C5): whether this architecture's relaxation pass may
    /// rewrite the access model named by `from`, given what's known about the
    /// output and the symbol.
    fn can_relax_tls(
        _from: crate::tls::TlsAccess,
        _value_flags: ValueFlags,
        _output_kind: OutputKind,
    ) -> bool {
        false
    }
}

/// An in-progress relaxation decision: a relocation type that, given what's
/// known about the symbol it references and the output being produced, can
/// be downgraded to a cheaper form (e.g. a GOT-indirect load folded into a
/// direct absolute move). Mirrors `Target::relaxOnce`/the per-architecture
/// `relaxTls*`/`relax*` hooks, but expressed as a value constructed once and
/// then applied, rather than a mutating visitor.
pub trait Relaxation: Sized + Debug {
    /// Attempts to construct a relaxation for one relocation. Returns `None`
    /// if this relocation/symbol/output combination doesn't qualify; the
    /// caller then falls back to normal (non-relaxed) processing.
    fn new(
        relocation_kind: u32,
        section_bytes: &[u8],
        offset_in_section: u64,
        value_flags: ValueFlags,
        output_kind: OutputKind,
        section_flags: SectionFlags,
    ) -> Option<Self>;

    /// Rewrites the instruction bytes in place. `offset_in_section` and
    /// `addend` are updated in place because some relaxations shift where
    /// the *next* relocation's field starts, or change what value it should
    /// carry (e.g. TLS GD->LE folds the module-ID/offset pair into a single
    /// `%fs`-relative load and zeroes the addend).
    fn apply(
        &self,
        section_bytes: &mut [u8],
        offset_in_section: &mut u64,
        addend: &mut u64,
        next_modifier: &mut RelocationModifier,
    );

    /// The relocation this relaxation has been rewritten to target, used by
    /// the caller to look up the (possibly different) field width/kind for
    /// the now-rewritten relocation.
    fn rel_info(&self) -> RelocationKindInfo;

    /// A `Debug`-capable view of the concrete relaxation kind chosen, purely
    /// for diagnostics.
    fn debug_kind(&self) -> impl Debug;
}

/// A `Relaxation` for architectures that define no relaxations at all
/// (PPC, PPC64, MIPS, AMDGPU): `new` always declines, so the caller always
/// falls back to ordinary relocation processing.
#[derive(Debug)]
pub struct NoRelaxation;

impl Relaxation for NoRelaxation {
    fn new(
        _relocation_kind: u32,
        _section_bytes: &[u8],
        _offset_in_section: u64,
        _value_flags: ValueFlags,
        _output_kind: OutputKind,
        _section_flags: SectionFlags,
    ) -> Option<Self> {
        None
    }

    fn apply(
        &self,
        _section_bytes: &mut [u8],
        _offset_in_section: &mut u64,
        _addend: &mut u64,
        _next_modifier: &mut RelocationModifier,
    ) {
        unreachable!("NoRelaxation::new never returns Some")
    }

    fn rel_info(&self) -> RelocationKindInfo {
        unreachable!("NoRelaxation::new never returns Some")
    }

    fn debug_kind(&self) -> impl Debug {
        "NoRelaxation"
    }
}

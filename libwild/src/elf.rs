//! Per-relocation metadata and the dynamic-relocation vocabulary a backend
//! emits into `.rela.dyn`/`.rela.plt`. Distinct from `linker_utils::elf`,
//! which only knows relocation-type *names*; this module is where the
//! backend's own classification result (kind + natural width) lives.

pub use linker_utils::elf::RelocationKind;

/// How many bytes of the instruction stream a relocation's addend occupies.
/// `Absent` covers relocations like `R_X86_64_TLSDESC_CALL` that carry no
/// immediate field at all (the relocation exists purely to mark a call site).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationSize {
    ByteSize(u8),
}

impl RelocationSize {
    pub fn bytes(self) -> u8 {
        match self {
            RelocationSize::ByteSize(n) => n,
        }
    }
}

/// The result of classifying a raw relocation type: what family it belongs
/// to, how wide its field is, and (for the few relocations that don't occupy
/// a whole aligned word, e.g. some MIPS/PPC64 16-bit fields) a bitmask of the
/// bits within that field that the relocation actually owns.
#[derive(Debug, Clone, Copy)]
pub struct RelocationKindInfo {
    pub kind: RelocationKind,
    pub size: RelocationSize,
    pub mask: Option<u64>,
}

/// The fixed set of relocation types a backend may need to write into a
/// dynamic relocation section. `Arch::get_dynamic_relocation_type` maps each
/// of these onto the architecture's actual `R_*_*` constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicRelocationKind {
    /// Copies the referenced object's initial contents into the output's BSS
    /// at load time (`R_*_COPY`).
    Copy,
    /// Resolves an `STT_GNU_IFUNC` reference by calling the indirect
    /// resolver at load time (`R_*_IRELATIVE`).
    Irelative,
    /// Fills in a TLS module ID for general/local dynamic access
    /// (`R_*_DTPMOD*`).
    DtpMod,
    /// Fills in a TLS module-relative offset (`R_*_DTPOFF*`).
    DtpOff,
    /// Fills in a TLS initial-exec offset from the thread pointer
    /// (`R_*_TPOFF*`).
    TpOff,
    /// Applies `B + A` at load time, for references to a symbol defined in
    /// this link but whose final address isn't known until load (PIE/shared
    /// output) (`R_*_RELATIVE`).
    Relative,
    /// Resolved by the dynamic linker against the symbol table at load time
    /// (`R_*_GLOB_DAT`/`R_*_JUMP_SLOT`).
    DynamicSymbol,
}

/// Size in bytes of one PLT entry, for architectures with a single fixed
/// entry layout (x86/x86_64). Architectures with variable-size PLT entries
/// (PPC64, AArch64 with short/long forms) expose their own sizes via
/// `Arch::PLT_ENTRY_SIZE` overrides rather than this constant.
pub const PLT_ENTRY_SIZE: u64 = 16;

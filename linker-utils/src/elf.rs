//! Section flags and relocation-type-name tables. Endian-free and
//! policy-free: this module never looks at `Config` or symbol state.

use std::borrow::Cow;

use bitflags::bitflags;

bitflags! {
    /// A subset of `sh_flags`. Only the bits relaxation/classification logic
    /// actually consults are named.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u64 {
        const WRITE = object::elf::SHF_WRITE as u64;
        const ALLOC = object::elf::SHF_ALLOC as u64;
        const EXECINSTR = object::elf::SHF_EXECINSTR as u64;
        const TLS = object::elf::SHF_TLS as u64;
    }
}

/// Aliases matching the upstream lower-case `shf::FLAG` spelling used by the
/// teacher's `x86_64.rs` (`shf::EXECINSTR`).
pub mod shf {
    pub use super::SectionFlags::ALLOC;
    pub use super::SectionFlags::EXECINSTR;
    pub use super::SectionFlags::TLS;
    pub use super::SectionFlags::WRITE;
}

/// The semantic bucket a relocation type falls into, independent of which
/// architecture defined it. Used to validate relaxation targets and to drive
/// the handful of classifier predicates that are genuinely architecture
/// agnostic (e.g. "is this a TLS-LE form").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    Absolute,
    Relative,
    Got,
    GotRelative,
    Plt,
    PltRelative,
    TlsGd,
    TlsLd,
    TlsIe,
    TlsLe,
    TlsDesc,
    DtpOff,
    Size,
    None,
}

fn unknown(machine: &str, r_type: u32) -> Cow<'static, str> {
    Cow::Owned(format!("Unknown ({machine} relocation type {r_type})"))
}

macro_rules! rel_type_name_fn {
    ($fn_name:ident, $machine:literal, { $($konst:ident),* $(,)? }) => {
        pub fn $fn_name(r_type: u32) -> Cow<'static, str> {
            match r_type {
                $(x if x == object::elf::$konst => Cow::Borrowed(stringify!($konst)),)*
                other => unknown($machine, other),
            }
        }
    };
}

rel_type_name_fn!(x86_rel_type_to_string, "x86", {
    R_386_NONE, R_386_32, R_386_PC32, R_386_GOT32, R_386_PLT32, R_386_COPY,
    R_386_GLOB_DAT, R_386_JMP_SLOT, R_386_RELATIVE, R_386_GOTOFF, R_386_GOTPC,
    R_386_TLS_TPOFF, R_386_TLS_IE, R_386_TLS_GOTIE, R_386_TLS_LE, R_386_TLS_GD,
    R_386_TLS_LDM, R_386_TLS_GD_32, R_386_TLS_GD_PUSH, R_386_TLS_GD_CALL,
    R_386_TLS_GD_POP, R_386_TLS_LDM_32, R_386_TLS_LDM_PUSH, R_386_TLS_LDM_CALL,
    R_386_TLS_LDM_POP, R_386_TLS_LDO_32, R_386_TLS_IE_32, R_386_TLS_LE_32,
    R_386_TLS_DTPMOD32, R_386_TLS_DTPOFF32, R_386_IRELATIVE, R_386_16, R_386_8,
});

rel_type_name_fn!(x86_64_rel_type_to_string, "x86_64", {
    R_X86_64_NONE, R_X86_64_64, R_X86_64_PC32, R_X86_64_GOT32, R_X86_64_PLT32,
    R_X86_64_COPY, R_X86_64_GLOB_DAT, R_X86_64_JUMP_SLOT, R_X86_64_RELATIVE,
    R_X86_64_GOTPCREL, R_X86_64_32, R_X86_64_32S, R_X86_64_16, R_X86_64_PC16,
    R_X86_64_8, R_X86_64_PC8, R_X86_64_DTPMOD64, R_X86_64_DTPOFF64,
    R_X86_64_TPOFF64, R_X86_64_TLSGD, R_X86_64_TLSLD, R_X86_64_DTPOFF32,
    R_X86_64_GOTTPOFF, R_X86_64_TPOFF32, R_X86_64_PC64, R_X86_64_GOTOFF64,
    R_X86_64_GOTPC32, R_X86_64_GOT64, R_X86_64_GOTPCREL64, R_X86_64_GOTPC64,
    R_X86_64_GOTPLT64, R_X86_64_PLTOFF64, R_X86_64_SIZE32, R_X86_64_SIZE64,
    R_X86_64_GOTPC32_TLSDESC, R_X86_64_TLSDESC_CALL, R_X86_64_TLSDESC,
    R_X86_64_IRELATIVE, R_X86_64_GOTPCRELX, R_X86_64_REX_GOTPCRELX,
});

rel_type_name_fn!(ppc_rel_type_to_string, "PPC", {
    R_PPC_NONE, R_PPC_ADDR32, R_PPC_ADDR16_HA, R_PPC_ADDR16_LO, R_PPC_REL24,
    R_PPC_REL32, R_PPC_PLT24, R_PPC_COPY, R_PPC_GLOB_DAT, R_PPC_JMP_SLOT,
    R_PPC_RELATIVE,
});

rel_type_name_fn!(ppc64_rel_type_to_string, "PPC64", {
    R_PPC64_NONE, R_PPC64_ADDR64, R_PPC64_ADDR32, R_PPC64_ADDR16,
    R_PPC64_ADDR16_LO, R_PPC64_ADDR16_HI, R_PPC64_ADDR16_HA,
    R_PPC64_ADDR16_HIGHER, R_PPC64_ADDR16_HIGHERA, R_PPC64_ADDR16_HIGHEST,
    R_PPC64_ADDR16_HIGHESTA, R_PPC64_ADDR16_DS, R_PPC64_ADDR16_LO_DS,
    R_PPC64_ADDR14, R_PPC64_REL24, R_PPC64_REL32, R_PPC64_REL64,
    R_PPC64_TOC16, R_PPC64_TOC16_LO, R_PPC64_TOC16_HI, R_PPC64_TOC16_HA,
    R_PPC64_TOC16_DS, R_PPC64_TOC16_LO_DS, R_PPC64_TOC, R_PPC64_GLOB_DAT,
    R_PPC64_JMP_SLOT, R_PPC64_RELATIVE, R_PPC64_REL16_HA, R_PPC64_REL16_HI,
    R_PPC64_REL16_LO,
});

rel_type_name_fn!(aarch64_rel_type_to_string, "AArch64", {
    R_AARCH64_NONE, R_AARCH64_ABS64, R_AARCH64_ABS32, R_AARCH64_ABS16,
    R_AARCH64_PREL64, R_AARCH64_PREL32, R_AARCH64_PREL16,
    R_AARCH64_ADR_PREL_LO21, R_AARCH64_ADR_PREL_PG_HI21,
    R_AARCH64_ADD_ABS_LO12_NC, R_AARCH64_LDST8_ABS_LO12_NC,
    R_AARCH64_LDST16_ABS_LO12_NC, R_AARCH64_LDST32_ABS_LO12_NC,
    R_AARCH64_LDST64_ABS_LO12_NC, R_AARCH64_LDST128_ABS_LO12_NC,
    R_AARCH64_TSTBR14, R_AARCH64_CONDBR19, R_AARCH64_JUMP26, R_AARCH64_CALL26,
    R_AARCH64_ADR_GOT_PAGE, R_AARCH64_LD64_GOT_LO12_NC, R_AARCH64_COPY,
    R_AARCH64_GLOB_DAT, R_AARCH64_JUMP_SLOT, R_AARCH64_RELATIVE,
    R_AARCH64_IRELATIVE, R_AARCH64_TLS_DTPMOD64, R_AARCH64_TLS_DTPREL64,
    R_AARCH64_TLS_TPREL64, R_AARCH64_TLSDESC_ADR_PAGE21,
    R_AARCH64_TLSDESC_LD64_LO12_NC, R_AARCH64_TLSDESC_ADD_LO12_NC,
    R_AARCH64_TLSDESC_CALL, R_AARCH64_TLSIE_ADR_GOTTPREL_PAGE21,
    R_AARCH64_TLSIE_LD64_GOTTPREL_LO12_NC, R_AARCH64_TLSLE_ADD_TPREL_HI12,
    R_AARCH64_TLSLE_ADD_TPREL_LO12_NC,
});

rel_type_name_fn!(mips_rel_type_to_string, "MIPS", {
    R_MIPS_NONE, R_MIPS_16, R_MIPS_32, R_MIPS_REL32, R_MIPS_26, R_MIPS_HI16,
    R_MIPS_LO16, R_MIPS_GPREL16, R_MIPS_GOT16, R_MIPS_PC16, R_MIPS_CALL16,
    R_MIPS_GPREL32, R_MIPS_64, R_MIPS_PC21_S2, R_MIPS_PC26_S2, R_MIPS_PC19_S2,
    R_MIPS_PCHI16, R_MIPS_PCLO16, R_MIPS_COPY, R_MIPS_JUMP_SLOT, R_MIPS_PC32,
    R_MIPS_TLS_DTPMOD32, R_MIPS_TLS_DTPREL32, R_MIPS_TLS_DTPMOD64,
    R_MIPS_TLS_DTPREL64, R_MIPS_TLS_GD, R_MIPS_TLS_LDM, R_MIPS_TLS_DTPREL_HI16,
    R_MIPS_TLS_DTPREL_LO16, R_MIPS_TLS_GOTTPREL, R_MIPS_TLS_TPREL32,
    R_MIPS_TLS_TPREL64, R_MIPS_TLS_TPREL_HI16, R_MIPS_TLS_TPREL_LO16,
    R_MIPS_JALR,
});

/// `EM_AMDGPU` (224) and its `R_AMDGPU_*` relocation types are an
/// LLVM-assigned machine value, not part of the official ELF psABI machine
/// registry, so unlike every other architecture here they aren't sourced
/// from `object::elf`.
pub mod amdgpu {
    pub const EM_AMDGPU: u16 = 224;
    pub const R_AMDGPU_NONE: u32 = 0;
    pub const R_AMDGPU_ABS32_LO: u32 = 1;
    pub const R_AMDGPU_ABS32_HI: u32 = 2;
    pub const R_AMDGPU_ABS64: u32 = 3;
    pub const R_AMDGPU_REL32: u32 = 4;
    pub const R_AMDGPU_REL64: u32 = 5;
    pub const R_AMDGPU_ABS32: u32 = 6;
    pub const R_AMDGPU_RELATIVE64: u32 = 11;
}

pub fn amdgpu_rel_type_to_string(r_type: u32) -> Cow<'static, str> {
    use amdgpu::*;
    match r_type {
        R_AMDGPU_NONE => Cow::Borrowed("R_AMDGPU_NONE"),
        R_AMDGPU_ABS32_LO => Cow::Borrowed("R_AMDGPU_ABS32_LO"),
        R_AMDGPU_ABS32_HI => Cow::Borrowed("R_AMDGPU_ABS32_HI"),
        R_AMDGPU_ABS64 => Cow::Borrowed("R_AMDGPU_ABS64"),
        R_AMDGPU_REL32 => Cow::Borrowed("R_AMDGPU_REL32"),
        R_AMDGPU_REL64 => Cow::Borrowed("R_AMDGPU_REL64"),
        R_AMDGPU_ABS32 => Cow::Borrowed("R_AMDGPU_ABS32"),
        R_AMDGPU_RELATIVE64 => Cow::Borrowed("R_AMDGPU_RELATIVE64"),
        other => unknown("AMDGPU", other),
    }
}

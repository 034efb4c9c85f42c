//! The 32-bit x86 backend. REL-format: the addend for each relocation lives
//! in the instruction/data bytes at `Loc` rather than in the relocation
//! record, so callers read it via `get_implicit_addend` before computing the
//! `value` that `relocate_one` is handed. Grounded in `X86TargetInfo` in the
//! original `ELF/Target.cpp`.

use std::borrow::Cow;

use anyhow::anyhow;
use linker_utils::elf::shf;
use linker_utils::elf::x86_rel_type_to_string;
use linker_utils::elf::RelocationKind;
use linker_utils::elf::SectionFlags;
use linker_utils::relaxation::RelocationModifier;
use linker_utils::x86::RelaxationKind;
use object::elf as e;

use crate::arch::BackendConfig;
use crate::args::OutputKind;
use crate::elf::DynamicRelocationKind;
use crate::elf::RelocationKindInfo;
use crate::elf::RelocationSize;
use crate::endian;
use crate::error::ErrorSink;
use crate::error::Result;
use crate::resolution::ValueFlags;

pub(crate) struct X86;

const PLT_ENTRY_TEMPLATE: &[u8] = &[
    0xff, 0x25, 0, 0, 0, 0, // jmp *GOT(%ebx)
    0x68, 0, 0, 0, 0, // push $index
    0xe9, 0, 0, 0, 0, // jmp .plt[0]
];

pub(crate) const PLT_ENTRY_SIZE: u64 = PLT_ENTRY_TEMPLATE.len() as u64;

impl crate::arch::Arch for X86 {
    type Relaxation = Relaxation;

    fn elf_header_arch_magic() -> u16 {
        e::EM_386
    }

    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo> {
        let (kind, size) = match r_type {
            e::R_386_NONE => (RelocationKind::None, 0),
            e::R_386_32 => (RelocationKind::Absolute, 4),
            e::R_386_16 => (RelocationKind::Absolute, 2),
            e::R_386_8 => (RelocationKind::Absolute, 1),
            e::R_386_PC32 => (RelocationKind::Relative, 4),
            e::R_386_GOT32 => (RelocationKind::Got, 4),
            e::R_386_PLT32 => (RelocationKind::PltRelative, 4),
            e::R_386_GOTOFF => (RelocationKind::GotRelative, 4),
            e::R_386_GOTPC => (RelocationKind::GotRelative, 4),
            e::R_386_TLS_TPOFF | e::R_386_TLS_LE => (RelocationKind::TlsLe, 4),
            e::R_386_TLS_IE => (RelocationKind::TlsIe, 4),
            e::R_386_TLS_GOTIE => (RelocationKind::TlsIe, 4),
            e::R_386_TLS_GD => (RelocationKind::TlsGd, 4),
            e::R_386_TLS_LDM => (RelocationKind::TlsLd, 4),
            e::R_386_TLS_LDO_32 => (RelocationKind::DtpOff, 4),
            e::R_386_TLS_DTPOFF32 => (RelocationKind::DtpOff, 4),
            _ => {
                return Err(anyhow!(
                    "Unsupported relocation type {}",
                    Self::rel_type_to_string(r_type)
                ))
            }
        };
        Ok(RelocationKindInfo {
            kind,
            size: RelocationSize::ByteSize(size),
            mask: None,
        })
    }

    fn get_dynamic_relocation_type(relocation: DynamicRelocationKind) -> u32 {
        match relocation {
            DynamicRelocationKind::Copy => e::R_386_COPY,
            DynamicRelocationKind::Irelative => e::R_386_IRELATIVE,
            DynamicRelocationKind::DtpMod => e::R_386_TLS_DTPMOD32,
            DynamicRelocationKind::DtpOff => e::R_386_TLS_DTPOFF32,
            DynamicRelocationKind::TpOff => e::R_386_TLS_TPOFF,
            DynamicRelocationKind::Relative => e::R_386_RELATIVE,
            DynamicRelocationKind::DynamicSymbol => e::R_386_GLOB_DAT,
        }
    }

    fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
        x86_rel_type_to_string(r_type)
    }

    fn get_implicit_addend(section_bytes: &[u8], offset_in_section: u64, r_type: u32) -> i64 {
        let offset = offset_in_section as usize;
        match r_type {
            e::R_386_32 | e::R_386_PC32 | e::R_386_PLT32 | e::R_386_GOTPC | e::R_386_GOT32
            | e::R_386_GOTOFF => endian::read_u32_le(&section_bytes[offset..]) as i32 as i64,
            e::R_386_16 => endian::read_u16_le(&section_bytes[offset..]) as i16 as i64,
            e::R_386_8 => section_bytes[offset] as i8 as i64,
            _ => 0,
        }
    }

    fn get_dyn_rel(r_type: u32) -> anyhow::Result<u32> {
        if matches!(r_type, e::R_386_TLS_LE | e::R_386_TLS_TPOFF) {
            return Ok(e::R_386_TLS_TPOFF);
        }
        crate::arch::generic_get_dyn_rel::<X86>(r_type)
    }

    fn get_tls_got_rel(r_type: u32) -> u32 {
        match r_type {
            e::R_386_TLS_GD | e::R_386_TLS_LDM => e::R_386_TLS_DTPMOD32,
            _ => e::R_386_TLS_TPOFF,
        }
    }

    fn needs_dyn_relative(r_type: u32) -> bool {
        matches!(r_type, e::R_386_TLS_IE)
    }

    fn is_rel_relative(r_type: u32) -> bool {
        matches!(r_type, e::R_386_PC32 | e::R_386_PLT32 | e::R_386_GOTPC)
    }

    fn is_got_relative(r_type: u32) -> bool {
        matches!(r_type, e::R_386_GOTOFF | e::R_386_GOTPC)
    }

    fn relocate_one(
        section_bytes: &mut [u8],
        offset_in_section: u64,
        r_type: u32,
        place: u64,
        value: u64,
        _plt_range: Option<(u64, u64)>,
        errors: &ErrorSink,
    ) -> Result {
        let offset = offset_in_section as usize;
        let signed = value as i64;
        match r_type {
            e::R_386_NONE => {}
            e::R_386_32 | e::R_386_GOTOFF | e::R_386_GOT32 => {
                endian::write_u32_le(&mut section_bytes[offset..], value as u32);
            }
            e::R_386_16 => {
                if endian::fits_signed_or_unsigned::<16>(value) {
                    endian::write_u16_le(&mut section_bytes[offset..], value as u16);
                } else {
                    errors.error(format!(
                        "relocation {} out of range at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    ));
                }
            }
            e::R_386_8 => {
                if endian::fits_signed_or_unsigned::<8>(value) {
                    section_bytes[offset] = value as u8;
                } else {
                    errors.error(format!(
                        "relocation {} out of range at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    ));
                }
            }
            e::R_386_PC32 | e::R_386_PLT32 | e::R_386_GOTPC => {
                let rel = signed.wrapping_sub(place as i64);
                endian::write_u32_le(&mut section_bytes[offset..], rel as u32);
            }
            e::R_386_TLS_LE | e::R_386_TLS_TPOFF | e::R_386_TLS_IE | e::R_386_TLS_GOTIE
            | e::R_386_TLS_GD | e::R_386_TLS_LDM | e::R_386_TLS_LDO_32
            | e::R_386_TLS_DTPOFF32 => {
                endian::write_u32_le(&mut section_bytes[offset..], value as u32);
            }
            _ => {
                return Err(anyhow!(
                    "Unrecognized relocation {}",
                    Self::rel_type_to_string(r_type)
                ));
            }
        }
        let _ = place;
        Ok(())
    }

    fn write_got_plt_entry(got_plt_entry: &mut [u8], plt_address: u64, config: &BackendConfig) {
        let _ = config;
        endian::write_u32_le(got_plt_entry, plt_address as u32);
    }

    fn write_plt_zero(plt_zero: &mut [u8], got_plt_address: u64, _plt_zero_address: u64) -> Result {
        plt_zero[0..2].copy_from_slice(&[0xff, 0x35]); // push *GOT+4(%ebx)
        endian::write_u32_le(&mut plt_zero[2..], (got_plt_address + 4) as u32);
        plt_zero[6..8].copy_from_slice(&[0xff, 0x25]); // jmp *GOT+8(%ebx)
        endian::write_u32_le(&mut plt_zero[8..], (got_plt_address + 8) as u32);
        Ok(())
    }

    fn write_plt_entry(plt_entry: &mut [u8], got_address: u64, _plt_address: u64) -> Result {
        plt_entry.copy_from_slice(PLT_ENTRY_TEMPLATE);
        endian::write_u32_le(&mut plt_entry[2..], got_address as u32);
        Ok(())
    }

    fn can_relax_tls(
        from: crate::tls::TlsAccess,
        value_flags: ValueFlags,
        output_kind: OutputKind,
    ) -> bool {
        crate::tls::can_relax_tls(from, value_flags, output_kind)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Relaxation {
    kind: RelaxationKind,
    rel_info: RelocationKindInfo,
}

impl crate::arch::Relaxation for Relaxation {
    fn new(
        relocation_kind: u32,
        section_bytes: &[u8],
        offset_in_section: u64,
        value_flags: ValueFlags,
        output_kind: OutputKind,
        section_flags: SectionFlags,
    ) -> Option<Self> {
        fn create(kind: RelaxationKind, new_r_type: u32) -> Option<Relaxation> {
            let rel_info = X86::relocation_from_raw(new_r_type)
                .expect("relaxation must only target relocations this backend recognizes");
            Some(Relaxation { kind, rel_info })
        }

        if !section_flags.contains(shf::EXECINSTR) {
            return None;
        }
        let non_relocatable = !output_kind.is_relocatable();
        let is_absolute_address =
            value_flags.contains(ValueFlags::ADDRESS) && non_relocatable;
        let offset = offset_in_section as usize;

        match relocation_kind {
            e::R_386_TLS_GD if output_kind.is_executable() => {
                section_bytes.get(offset.wrapping_sub(2)..offset)?;
                return create(RelaxationKind::TlsGdToLocalExec, e::R_386_TLS_LE);
            }
            e::R_386_TLS_LDM if output_kind.is_executable() => {
                return create(RelaxationKind::TlsLdToLocalExec, e::R_386_NONE);
            }
            e::R_386_TLS_IE if is_absolute_address || output_kind.is_executable() => {
                return create(RelaxationKind::IeToLeMovEax, e::R_386_TLS_LE);
            }
            e::R_386_TLS_GOTIE if output_kind.is_executable() => {
                return create(RelaxationKind::GotIeToLeMov, e::R_386_TLS_LE);
            }
            _ => {}
        }
        None
    }

    fn apply(
        &self,
        section_bytes: &mut [u8],
        offset_in_section: &mut u64,
        addend: &mut u64,
        next_modifier: &mut RelocationModifier,
    ) {
        let _ = (addend, next_modifier);
        self.kind.apply(section_bytes, *offset_in_section as usize);
    }

    fn rel_info(&self) -> RelocationKindInfo {
        self.rel_info
    }

    fn debug_kind(&self) -> impl std::fmt::Debug {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plt_zero_template_is_even_sized() {
        assert_eq!(PLT_ENTRY_SIZE, 16);
    }

    #[test]
    fn absolute_write_out_of_range_16() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 2];
        X86::relocate_one(&mut bytes, 0, e::R_386_16, 0, 0x1_0000, None, &errors).unwrap();
        assert!(errors.has_errors());
    }

    #[test]
    fn absolute_32_writes_value_directly() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 4];
        X86::relocate_one(&mut bytes, 0, e::R_386_32, 0, 0xDEAD_BEEF, None, &errors).unwrap();
        assert_eq!(bytes, 0xDEAD_BEEFu32.to_le_bytes());
        assert!(!errors.has_errors());
    }
}

//! 32-bit PowerPC. Grounded in `PPCTargetInfo` in the original
//! `ELF/Target.cpp`, which supports only the handful of relocation types big
//! enough to link glibc's crt objects; no TLS relaxation is defined for this
//! architecture upstream, so `Relaxation` is `NoRelaxation`.

use std::borrow::Cow;

use anyhow::anyhow;
use linker_utils::elf::ppc_rel_type_to_string;
use linker_utils::elf::RelocationKind;
use object::elf as e;

use crate::arch::BackendConfig;
use crate::arch::NoRelaxation;
use crate::elf::DynamicRelocationKind;
use crate::elf::RelocationKindInfo;
use crate::elf::RelocationSize;
use crate::endian;
use crate::error::ErrorSink;
use crate::error::Result;

pub(crate) struct Ppc;

const PLT_ENTRY_SIZE: u64 = 4;

impl crate::arch::Arch for Ppc {
    type Relaxation = NoRelaxation;

    fn elf_header_arch_magic() -> u16 {
        e::EM_PPC
    }

    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo> {
        let (kind, size) = match r_type {
            e::R_PPC_NONE => (RelocationKind::None, 0),
            e::R_PPC_ADDR32 => (RelocationKind::Absolute, 4),
            e::R_PPC_ADDR16_HA | e::R_PPC_ADDR16_LO => (RelocationKind::Absolute, 2),
            e::R_PPC_REL24 | e::R_PPC_PLT24 => (RelocationKind::PltRelative, 4),
            e::R_PPC_REL32 => (RelocationKind::Relative, 4),
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
            DynamicRelocationKind::Copy => e::R_PPC_COPY,
            DynamicRelocationKind::Irelative => e::R_PPC_IRELATIVE,
            DynamicRelocationKind::Relative => e::R_PPC_RELATIVE,
            DynamicRelocationKind::DynamicSymbol => e::R_PPC_GLOB_DAT,
            DynamicRelocationKind::DtpMod | DynamicRelocationKind::DtpOff
            | DynamicRelocationKind::TpOff => {
                unreachable!("ppc32 TLS dynamic relocations are not supported by this backend")
            }
        }
    }

    fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
        ppc_rel_type_to_string(r_type)
    }

    fn get_implicit_addend(section_bytes: &[u8], offset_in_section: u64, r_type: u32) -> i64 {
        let offset = offset_in_section as usize;
        match r_type {
            e::R_PPC_ADDR32 | e::R_PPC_REL32 => {
                endian::read_u32_be(&section_bytes[offset..]) as i32 as i64
            }
            e::R_PPC_ADDR16_HA | e::R_PPC_ADDR16_LO => {
                endian::read_u16_be(&section_bytes[offset..]) as i16 as i64
            }
            e::R_PPC_REL24 | e::R_PPC_PLT24 => {
                (endian::read_u32_be(&section_bytes[offset..]) & 0x03ff_fffc) as i32 as i64
            }
            _ => 0,
        }
    }

    fn is_rel_relative(r_type: u32) -> bool {
        matches!(r_type, e::R_PPC_REL24 | e::R_PPC_PLT24 | e::R_PPC_REL32)
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
        match r_type {
            e::R_PPC_NONE => {}
            e::R_PPC_ADDR32 => {
                endian::write_u32_be(&mut section_bytes[offset..], value as u32);
            }
            e::R_PPC_ADDR16_HA => {
                let ha = ((value.wrapping_add(0x8000)) >> 16) as u16;
                endian::write_u16_be(&mut section_bytes[offset..], ha);
            }
            e::R_PPC_ADDR16_LO => {
                endian::write_u16_be(&mut section_bytes[offset..], value as u16);
            }
            e::R_PPC_REL24 | e::R_PPC_PLT24 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                if endian::fits_signed::<26>(rel) {
                    endian::or_u32_be(&mut section_bytes[offset..], (rel as u32) & 0x03ff_fffc);
                } else {
                    errors.error(format!(
                        "relocation {} out of range at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    ));
                }
            }
            e::R_PPC_REL32 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                endian::write_u32_be(&mut section_bytes[offset..], rel as u32);
            }
            _ => {
                return Err(anyhow!(
                    "Unrecognized relocation {}",
                    Self::rel_type_to_string(r_type)
                ));
            }
        }
        Ok(())
    }

    fn write_got_plt_entry(got_plt_entry: &mut [u8], plt_address: u64, config: &BackendConfig) {
        let _ = config;
        endian::write_u32_be(got_plt_entry, plt_address as u32);
    }

    fn write_plt_entry(plt_entry: &mut [u8], got_address: u64, plt_address: u64) -> Result {
        let rel = (got_address as i64).wrapping_sub(plt_address as i64);
        if !endian::fits_signed::<26>(rel) {
            return Err(anyhow!("PLT entry is out of branch range of its GOT slot"));
        }
        // b target
        let word = 0x4800_0000u32 | ((rel as u32) & 0x03ff_fffc);
        endian::write_u32_be(plt_entry, word);
        Ok(())
    }
}

pub(crate) const _: () = assert!(PLT_ENTRY_SIZE == 4);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn addr16_ha_rounds_toward_nearest_lo() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 2];
        Ppc::relocate_one(&mut bytes, 0, e::R_PPC_ADDR16_HA, 0, 0x1_0000, None, &errors).unwrap();
        assert_eq!(bytes, [0x00, 0x01]);
    }

    #[test]
    fn rel24_out_of_range_is_reported() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 4];
        Ppc::relocate_one(&mut bytes, 0, e::R_PPC_REL24, 0, 0x1000_0000, None, &errors).unwrap();
        assert!(errors.has_errors());
    }
}

//! AMDGPU code object relocations. `EM_AMDGPU` (224) is an LLVM-assigned
//! machine value, not (as of this writing) part of the official ELF psABI
//! machine registry, so unlike every other backend here it isn't sourced
//! from `object::elf`. Grounded in the `R_AMDGPU_*` switch in the original
//! `ELF/Target.cpp`'s AMDGPU section, which the upstream implementation
//! itself describes as minimal: enough to link HSA code objects, with
//! anything unrecognized treated as fatal rather than silently ignored.

use std::borrow::Cow;

use anyhow::anyhow;
pub(crate) use linker_utils::elf::amdgpu::{
    EM_AMDGPU, R_AMDGPU_ABS32, R_AMDGPU_ABS32_HI, R_AMDGPU_ABS32_LO, R_AMDGPU_ABS64,
    R_AMDGPU_NONE, R_AMDGPU_REL32, R_AMDGPU_REL64, R_AMDGPU_RELATIVE64,
};
use linker_utils::elf::amdgpu_rel_type_to_string;
use linker_utils::elf::RelocationKind;

use crate::arch::BackendConfig;
use crate::arch::NoRelaxation;
use crate::elf::DynamicRelocationKind;
use crate::elf::RelocationKindInfo;
use crate::elf::RelocationSize;
use crate::endian;
use crate::error::ErrorSink;
use crate::error::Result;

pub(crate) struct Amdgpu;

impl crate::arch::Arch for Amdgpu {
    type Relaxation = NoRelaxation;

    fn elf_header_arch_magic() -> u16 {
        EM_AMDGPU
    }

    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo> {
        let (kind, size) = match r_type {
            R_AMDGPU_NONE => (RelocationKind::None, 0),
            R_AMDGPU_ABS32_LO | R_AMDGPU_ABS32_HI | R_AMDGPU_ABS32 => {
                (RelocationKind::Absolute, 4)
            }
            R_AMDGPU_ABS64 => (RelocationKind::Absolute, 8),
            R_AMDGPU_REL32 => (RelocationKind::Relative, 4),
            R_AMDGPU_REL64 => (RelocationKind::Relative, 8),
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
            DynamicRelocationKind::Relative => R_AMDGPU_RELATIVE64,
            other => unreachable!("AMDGPU backend does not support dynamic relocation {other:?}"),
        }
    }

    fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
        amdgpu_rel_type_to_string(r_type)
    }

    fn relocate_one(
        section_bytes: &mut [u8],
        offset_in_section: u64,
        r_type: u32,
        place: u64,
        value: u64,
        _plt_range: Option<(u64, u64)>,
        _errors: &ErrorSink,
    ) -> Result {
        let offset = offset_in_section as usize;
        match r_type {
            R_AMDGPU_NONE => {}
            R_AMDGPU_ABS32 | R_AMDGPU_ABS32_LO => {
                endian::write_u32_le(&mut section_bytes[offset..], value as u32);
            }
            R_AMDGPU_ABS32_HI => {
                endian::write_u32_le(&mut section_bytes[offset..], (value >> 32) as u32);
            }
            R_AMDGPU_ABS64 => {
                endian::write_u64_le(&mut section_bytes[offset..], value);
            }
            R_AMDGPU_REL32 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                endian::write_u32_le(&mut section_bytes[offset..], rel as u32);
            }
            R_AMDGPU_REL64 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                endian::write_u64_le(&mut section_bytes[offset..], rel as u64);
            }
            other => {
                return Err(anyhow!(
                    "Unrecognized relocation {}",
                    Self::rel_type_to_string(other)
                ));
            }
        }
        Ok(())
    }

    fn write_got_plt_entry(got_plt_entry: &mut [u8], plt_address: u64, config: &BackendConfig) {
        let _ = config;
        endian::write_u64_le(got_plt_entry, plt_address);
    }

    fn write_plt_entry(_plt_entry: &mut [u8], _got_address: u64, _plt_address: u64) -> Result {
        Err(anyhow!(
            "AMDGPU code objects do not use a PLT; this backend should never be asked for one"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn abs32_hi_writes_high_word() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 4];
        Amdgpu::relocate_one(
            &mut bytes,
            0,
            R_AMDGPU_ABS32_HI,
            0,
            0x1_0000_0000,
            None,
            &errors,
        )
        .unwrap();
        assert_eq!(bytes, 1u32.to_le_bytes());
    }

    #[test]
    fn unrecognized_type_is_fatal() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 4];
        assert!(Amdgpu::relocate_one(&mut bytes, 0, 0xff, 0, 0, None, &errors).is_err());
    }
}

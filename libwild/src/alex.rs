//! The "Alex" backend: a teaching target with four made-up relocation
//! types, grounded directly on `AlexTargetInfo::relocateOne` in the original
//! `ELF/Target.cpp`. It was never a real machine (no `EM_ALEX` is assigned),
//! so it isn't reachable through `crate::target`'s normal registry; kept
//! behind the `toy-target` feature purely so the simplest possible backend
//! stays around as a worked example alongside the real ones.

use std::borrow::Cow;

use anyhow::anyhow;
use linker_utils::elf::RelocationKind;

use crate::arch::BackendConfig;
use crate::arch::NoRelaxation;
use crate::elf::DynamicRelocationKind;
use crate::elf::RelocationKindInfo;
use crate::elf::RelocationSize;
use crate::endian;
use crate::error::ErrorSink;
use crate::error::Result;

pub(crate) struct Alex;

/// Not part of any real ELF machine registry; chosen only to be distinct
/// from every machine ID `object::elf` actually defines.
pub(crate) const EM_ALEX: u16 = 0xffff;

const R_ALEX_HI16: u32 = 1;
const R_ALEX_LO16: u32 = 2;
const R_ALEX_PC16: u32 = 3;
const R_ALEX_32: u32 = 4;

fn write_u16(loc: &mut [u8], v: u32, is_low16: bool) {
    let half = if is_low16 { v & 0xffff } else { (v >> 16) & 0xffff };
    endian::write_u16_le(loc, half as u16);
}

impl crate::arch::Arch for Alex {
    type Relaxation = NoRelaxation;

    fn elf_header_arch_magic() -> u16 {
        EM_ALEX
    }

    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo> {
        let (kind, size) = match r_type {
            R_ALEX_HI16 | R_ALEX_LO16 => (RelocationKind::Absolute, 2),
            R_ALEX_PC16 => (RelocationKind::Relative, 2),
            R_ALEX_32 => (RelocationKind::Absolute, 4),
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
        unreachable!("the Alex backend defines no dynamic relocations: {relocation:?}")
    }

    fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
        match r_type {
            R_ALEX_HI16 => Cow::Borrowed("R_ALEX_HI16"),
            R_ALEX_LO16 => Cow::Borrowed("R_ALEX_LO16"),
            R_ALEX_PC16 => Cow::Borrowed("R_ALEX_PC16"),
            R_ALEX_32 => Cow::Borrowed("R_ALEX_32"),
            other => Cow::Owned(format!("Unknown (Alex relocation type {other})")),
        }
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
            R_ALEX_HI16 => write_u16(&mut section_bytes[offset..], value as u32, false),
            R_ALEX_LO16 => write_u16(&mut section_bytes[offset..], value as u32, true),
            R_ALEX_PC16 => {
                let rel = ((value as i64).wrapping_sub(place as i64) / 4) as u32;
                write_u16(&mut section_bytes[offset..], rel, true);
            }
            R_ALEX_32 => endian::write_u32_le(&mut section_bytes[offset..], value as u32),
            other => {
                return Err(anyhow!(
                    "Unrecognized relocation {}",
                    Self::rel_type_to_string(other)
                ));
            }
        }
        Ok(())
    }

    fn write_got_plt_entry(_got_plt_entry: &mut [u8], _plt_address: u64, _config: &BackendConfig) {
        unreachable!("the Alex backend defines no GOT/PLT")
    }

    fn write_plt_entry(_plt_entry: &mut [u8], _got_address: u64, _plt_address: u64) -> Result {
        unreachable!("the Alex backend defines no GOT/PLT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn hi16_then_lo16_reconstruct_the_address() {
        let errors = ErrorSink::new();
        let mut hi = [0u8; 2];
        let mut lo = [0u8; 2];
        Alex::relocate_one(&mut hi, 0, R_ALEX_HI16, 0, 0x1234_5678, None, &errors).unwrap();
        Alex::relocate_one(&mut lo, 0, R_ALEX_LO16, 0, 0x1234_5678, None, &errors).unwrap();
        let rebuilt = (u16::from_le_bytes(hi) as u32) << 16 | (u16::from_le_bytes(lo) as u32);
        assert_eq!(rebuilt, 0x1234_5678);
    }

    #[test]
    fn pc16_divides_by_instruction_width() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 2];
        Alex::relocate_one(&mut bytes, 0, R_ALEX_PC16, 100, 108, None, &errors).unwrap();
        assert_eq!(u16::from_le_bytes(bytes), 2);
    }
}

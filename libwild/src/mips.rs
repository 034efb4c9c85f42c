//! 32-bit MIPS, parameterized over endianness (`Mips<BIG_ENDIAN>`) the way
//! the original's `MipsTargetInfo<ELFT>` is parameterized over its `ELFT`
//! traits class. 64-bit MIPS is not a supported target configuration here
//! (see `crate::target`): the original's `n64`/`n32` ABI variants add a
//! second, incompatible relocation-packing scheme (`Elf64_Mips_Rel`, up to
//! three relocations per record) that this backend's single-relocation
//! `relocate_one` contract doesn't model.

use std::borrow::Cow;

use anyhow::anyhow;
use linker_utils::elf::mips_rel_type_to_string;
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

pub(crate) struct Mips<const BIG_ENDIAN: bool>;

pub(crate) type MipsLe = Mips<false>;
pub(crate) type MipsBe = Mips<true>;

/// `_gp`'s conventional offset from the start of the GOT: chosen so that a
/// 16-bit signed `%gp_rel` immediate can reach every "small" GOT/sdata entry
/// on either side of `_gp` without a relocation overflow.
pub(crate) const GP_OFFSET: u64 = 0x7ff0;

/// Applies a generic MIPS PC-relative branch/jump field: `BITS` wide,
/// pre-shifted right by `SHIFT` (2 for word-aligned branches), matching
/// `applyMipsPcReloc<ELFT, BITS, SHIFT>` upstream.
fn apply_pc_reloc<const BITS: u32, const SHIFT: u32>(
    word: u32,
    rel: i64,
    mask: u32,
) -> Option<u32> {
    if rel & ((1 << SHIFT) - 1) != 0 {
        return None;
    }
    let field = ((rel >> SHIFT) as u32) & mask;
    let _ = BITS;
    Some((word & !mask) | field)
}

impl<const BIG_ENDIAN: bool> Mips<BIG_ENDIAN> {
    fn read_u32(bytes: &[u8]) -> u32 {
        if BIG_ENDIAN {
            endian::read_u32_be(bytes)
        } else {
            endian::read_u32_le(bytes)
        }
    }

    fn write_u32(bytes: &mut [u8], value: u32) {
        if BIG_ENDIAN {
            endian::write_u32_be(bytes, value);
        } else {
            endian::write_u32_le(bytes, value);
        }
    }

    fn read_u16(bytes: &[u8]) -> u16 {
        if BIG_ENDIAN {
            endian::read_u16_be(bytes)
        } else {
            endian::read_u16_le(bytes)
        }
    }

    fn write_u16(bytes: &mut [u8], value: u16) {
        if BIG_ENDIAN {
            endian::write_u16_be(bytes, value);
        } else {
            endian::write_u16_le(bytes, value);
        }
    }
}

impl<const BIG_ENDIAN: bool> crate::arch::Arch for Mips<BIG_ENDIAN> {
    type Relaxation = NoRelaxation;

    fn elf_header_arch_magic() -> u16 {
        e::EM_MIPS
    }

    fn relocation_from_raw(r_type: u32) -> anyhow::Result<RelocationKindInfo> {
        let (kind, size) = match r_type {
            e::R_MIPS_NONE => (RelocationKind::None, 0),
            e::R_MIPS_16 => (RelocationKind::Absolute, 2),
            e::R_MIPS_32 | e::R_MIPS_REL32 => (RelocationKind::Absolute, 4),
            e::R_MIPS_26 => (RelocationKind::Relative, 4),
            e::R_MIPS_HI16 | e::R_MIPS_LO16 => (RelocationKind::Absolute, 2),
            e::R_MIPS_GPREL16 | e::R_MIPS_GOT16 | e::R_MIPS_CALL16 => {
                (RelocationKind::GotRelative, 2)
            }
            e::R_MIPS_GPREL32 => (RelocationKind::GotRelative, 4),
            e::R_MIPS_PC16 | e::R_MIPS_PC32 => (RelocationKind::Relative, 4),
            e::R_MIPS_PC21_S2 | e::R_MIPS_PC26_S2 | e::R_MIPS_PC19_S2 => {
                (RelocationKind::Relative, 4)
            }
            e::R_MIPS_PCHI16 | e::R_MIPS_PCLO16 => (RelocationKind::Relative, 2),
            e::R_MIPS_TLS_DTPMOD32 => (RelocationKind::TlsLd, 4),
            e::R_MIPS_TLS_DTPREL32 => (RelocationKind::DtpOff, 4),
            e::R_MIPS_TLS_GD => (RelocationKind::TlsGd, 4),
            e::R_MIPS_TLS_LDM => (RelocationKind::TlsLd, 4),
            e::R_MIPS_TLS_DTPREL_HI16 | e::R_MIPS_TLS_DTPREL_LO16 => {
                (RelocationKind::DtpOff, 2)
            }
            e::R_MIPS_TLS_GOTTPREL => (RelocationKind::TlsIe, 2),
            e::R_MIPS_TLS_TPREL32 => (RelocationKind::TlsLe, 4),
            e::R_MIPS_TLS_TPREL_HI16 | e::R_MIPS_TLS_TPREL_LO16 => (RelocationKind::TlsLe, 2),
            e::R_MIPS_JALR => (RelocationKind::Relative, 4),
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
            DynamicRelocationKind::Copy => e::R_MIPS_COPY,
            DynamicRelocationKind::Relative => e::R_MIPS_REL32,
            DynamicRelocationKind::DynamicSymbol => e::R_MIPS_JUMP_SLOT,
            DynamicRelocationKind::DtpMod => e::R_MIPS_TLS_DTPMOD32,
            DynamicRelocationKind::DtpOff => e::R_MIPS_TLS_DTPREL32,
            DynamicRelocationKind::TpOff => e::R_MIPS_TLS_TPREL32,
            DynamicRelocationKind::Irelative => {
                unreachable!("MIPS has no IRELATIVE dynamic relocation in this backend")
            }
        }
    }

    fn rel_type_to_string(r_type: u32) -> Cow<'static, str> {
        mips_rel_type_to_string(r_type)
    }

    fn get_implicit_addend(section_bytes: &[u8], offset_in_section: u64, r_type: u32) -> i64 {
        let offset = offset_in_section as usize;
        match r_type {
            e::R_MIPS_32 | e::R_MIPS_REL32 | e::R_MIPS_GPREL32 | e::R_MIPS_PC32 => {
                Self::read_u32(&section_bytes[offset..]) as i32 as i64
            }
            e::R_MIPS_16 | e::R_MIPS_HI16 | e::R_MIPS_LO16 | e::R_MIPS_GPREL16
            | e::R_MIPS_GOT16 | e::R_MIPS_CALL16 | e::R_MIPS_PC16 | e::R_MIPS_PCHI16
            | e::R_MIPS_PCLO16 | e::R_MIPS_TLS_DTPREL_HI16 | e::R_MIPS_TLS_DTPREL_LO16
            | e::R_MIPS_TLS_TPREL_HI16 | e::R_MIPS_TLS_TPREL_LO16 | e::R_MIPS_TLS_GOTTPREL => {
                Self::read_u16(&section_bytes[offset..]) as i16 as i64
            }
            e::R_MIPS_26 => (Self::read_u32(&section_bytes[offset..]) & 0x03ff_ffff) as i64,
            _ => 0,
        }
    }

    fn is_rel_relative(r_type: u32) -> bool {
        !matches!(
            r_type,
            e::R_MIPS_32
                | e::R_MIPS_16
                | e::R_MIPS_HI16
                | e::R_MIPS_LO16
                | e::R_MIPS_GPREL16
                | e::R_MIPS_GOT16
                | e::R_MIPS_CALL16
                | e::R_MIPS_GPREL32
                | e::R_MIPS_TLS_DTPMOD32
                | e::R_MIPS_TLS_DTPREL32
                | e::R_MIPS_TLS_GD
                | e::R_MIPS_TLS_LDM
                | e::R_MIPS_TLS_DTPREL_HI16
                | e::R_MIPS_TLS_DTPREL_LO16
                | e::R_MIPS_TLS_GOTTPREL
                | e::R_MIPS_TLS_TPREL32
                | e::R_MIPS_TLS_TPREL_HI16
                | e::R_MIPS_TLS_TPREL_LO16
        )
    }

    fn is_hint_rel(r_type: u32) -> bool {
        matches!(r_type, e::R_MIPS_JALR)
    }

    fn get_tls_got_rel(_r_type: u32) -> u32 {
        e::R_MIPS_TLS_DTPMOD32
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
            e::R_MIPS_NONE => {}
            e::R_MIPS_32 | e::R_MIPS_REL32 => {
                Self::write_u32(&mut section_bytes[offset..], value as u32);
            }
            e::R_MIPS_16 => {
                Self::write_u16(&mut section_bytes[offset..], value as u16);
            }
            e::R_MIPS_26 => {
                let target = value & 0x0fff_ffff;
                if target & 0x3 == 0 {
                    let word = Self::read_u32(&section_bytes[offset..]);
                    let word = (word & !0x03ff_ffff) | ((target >> 2) as u32 & 0x03ff_ffff);
                    Self::write_u32(&mut section_bytes[offset..], word);
                } else {
                    errors.error(format!(
                        "improper alignment for relocation {} at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    ));
                }
            }
            e::R_MIPS_HI16 => {
                let hi = ((value.wrapping_add(0x8000)) >> 16) as u16;
                Self::write_u16(&mut section_bytes[offset..], hi);
            }
            e::R_MIPS_LO16 | e::R_MIPS_PCLO16 => {
                Self::write_u16(&mut section_bytes[offset..], value as u16);
            }
            e::R_MIPS_GPREL16 | e::R_MIPS_GOT16 | e::R_MIPS_CALL16 => {
                Self::write_u16(&mut section_bytes[offset..], value as u16);
            }
            e::R_MIPS_GPREL32 => {
                Self::write_u32(&mut section_bytes[offset..], value as u32);
            }
            e::R_MIPS_PC16 | e::R_MIPS_PCHI16 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                Self::write_u16(&mut section_bytes[offset..], rel as u16);
            }
            e::R_MIPS_PC32 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                Self::write_u32(&mut section_bytes[offset..], rel as u32);
            }
            e::R_MIPS_PC21_S2 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                let word = Self::read_u32(&section_bytes[offset..]);
                match apply_pc_reloc::<21, 2>(word, rel, 0x001f_ffff) {
                    Some(word) => Self::write_u32(&mut section_bytes[offset..], word),
                    None => errors.error(format!(
                        "improper alignment for relocation {} at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    )),
                }
            }
            e::R_MIPS_PC26_S2 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                let word = Self::read_u32(&section_bytes[offset..]);
                match apply_pc_reloc::<26, 2>(word, rel, 0x03ff_ffff) {
                    Some(word) => Self::write_u32(&mut section_bytes[offset..], word),
                    None => errors.error(format!(
                        "improper alignment for relocation {} at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    )),
                }
            }
            e::R_MIPS_PC19_S2 => {
                let rel = (value as i64).wrapping_sub(place as i64);
                let word = Self::read_u32(&section_bytes[offset..]);
                match apply_pc_reloc::<19, 2>(word, rel, 0x0007_ffff) {
                    Some(word) => Self::write_u32(&mut section_bytes[offset..], word),
                    None => errors.error(format!(
                        "improper alignment for relocation {} at offset {offset}",
                        Self::rel_type_to_string(r_type)
                    )),
                }
            }
            e::R_MIPS_JALR => {
                // Purely advisory (lets the linker optimize jalr+nop into a
                // direct jal when it can prove the target is in range); safe
                // to leave the instruction untouched when it can't.
            }
            e::R_MIPS_TLS_DTPREL32 | e::R_MIPS_TLS_TPREL32 => {
                Self::write_u32(&mut section_bytes[offset..], value as u32);
            }
            e::R_MIPS_TLS_DTPREL_HI16 | e::R_MIPS_TLS_TPREL_HI16 => {
                let hi = ((value.wrapping_add(0x8000)) >> 16) as u16;
                Self::write_u16(&mut section_bytes[offset..], hi);
            }
            e::R_MIPS_TLS_DTPREL_LO16 | e::R_MIPS_TLS_TPREL_LO16 => {
                Self::write_u16(&mut section_bytes[offset..], value as u16);
            }
            e::R_MIPS_TLS_GOTTPREL => {
                Self::write_u16(&mut section_bytes[offset..], value as u16);
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

    fn write_got_plt_header(got_plt: &mut [u8]) -> Result {
        got_plt.fill(0);
        // Entry 1 of the MIPS GOT's reserved header carries the high bit set
        // when the object was produced by a GNU toolchain, a marker that
        // dynamic loaders apparently never actually consult but that every
        // MIPS linker has cargo-culted forward since the original psABI
        // supplement. Preserved rather than dropped, since stripping it is
        // an observable (if likely harmless) difference from every other
        // MIPS linker's output.
        if got_plt.len() >= 16 {
            Self::write_u32(&mut got_plt[8..12], 0x8000_0000);
        }
        Ok(())
    }

    fn write_got_plt_entry(got_plt_entry: &mut [u8], plt_address: u64, config: &BackendConfig) {
        let _ = config;
        Self::write_u32(got_plt_entry, plt_address as u32);
    }

    fn write_plt_entry(_plt_entry: &mut [u8], _got_address: u64, _plt_address: u64) -> Result {
        Err(anyhow!(
            "MIPS PLT stubs require `.MIPS.stubs` support, which this backend does not provide"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn got_header_sets_gnu_marker_big_endian() {
        let mut got = [0u8; 16];
        MipsBe::write_got_plt_header(&mut got).unwrap();
        assert_eq!(&got[8..12], &0x8000_0000u32.to_be_bytes());
    }

    #[test]
    fn r_mips_26_out_of_range_alignment_is_reported() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 4];
        MipsLe::relocate_one(&mut bytes, 0, e::R_MIPS_26, 0, 0x1001, None, &errors).unwrap();
        assert!(errors.has_errors());
    }

    #[test]
    fn hi16_rounds_for_following_lo16() {
        let errors = ErrorSink::new();
        let mut bytes = [0u8; 2];
        MipsLe::relocate_one(&mut bytes, 0, e::R_MIPS_HI16, 0, 0x1_8000, None, &errors).unwrap();
        assert_eq!(u16::from_le_bytes(bytes), 2);
    }
}

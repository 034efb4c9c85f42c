//! The target registry (C2): resolves `(e_machine, class, data)` as read
//! from an input object's ELF header into the one backend that knows how to
//! classify and patch its relocations. Nothing downstream of this module
//! ever matches on `e_machine` again.

use crate::args::Endian;
use crate::args::Width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetId {
    pub machine: u16,
    pub width: Width,
    pub endian: Endian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipsVariant {
    pub width: Width,
    pub endian: Endian,
}

/// One entry per backend this crate carries. Variants with no payload are
/// single, fixed `(width, endian)` combinations; MIPS is the one family with
/// more than one valid combination; see `crate::mips` for why 64-bit MIPS
/// isn't one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    X86,
    X86_64,
    Ppc,
    Ppc64,
    AArch64,
    Mips(MipsVariant),
    Amdgpu,
}

impl Target {
    pub fn resolve(id: TargetId) -> anyhow::Result<Target> {
        use crate::amdgpu::EM_AMDGPU;
        match (id.machine, id.width, id.endian) {
            (object::elf::EM_386, Width::Bits32, Endian::Little) => Ok(Target::X86),
            (object::elf::EM_X86_64, Width::Bits64, Endian::Little) => Ok(Target::X86_64),
            (object::elf::EM_PPC, Width::Bits32, Endian::Big) => Ok(Target::Ppc),
            (object::elf::EM_PPC64, Width::Bits64, _) => Ok(Target::Ppc64),
            (object::elf::EM_AARCH64, Width::Bits64, Endian::Little) => Ok(Target::AArch64),
            (object::elf::EM_MIPS, Width::Bits32, endian) => {
                Ok(Target::Mips(MipsVariant { width: Width::Bits32, endian }))
            }
            (object::elf::EM_MIPS, Width::Bits64, _) => Err(anyhow::anyhow!(
                "unsupported target configuration: 64-bit MIPS is not supported by this backend"
            )),
            (EM_AMDGPU, Width::Bits64, Endian::Little) => Ok(Target::Amdgpu),
            (machine, width, endian) => Err(anyhow::anyhow!(
                "unsupported target configuration: machine {machine}, width {width:?}, endian {endian:?}"
            )),
        }
    }

    /// The fixed layout constants for this target. `page_size`/`va_start`
    /// for PPC64 follow its 64KiB-page, high-half-address convention;
    /// every other target uses the common 4KiB/`0x10000`-ish defaults.
    pub fn backend_config(self) -> crate::arch::BackendConfig {
        let mut config = crate::arch::BackendConfig {
            plt_entry_size: 16,
            plt_zero_size: 16,
            got_plt_header_entries: 3,
            got_header_entries: 0,
            page_size: 0x1000,
            va_start: 0x40_0000,
            use_lazy_binding: true,
        };
        match self {
            Target::X86 => {
                config.plt_entry_size = crate::x86::PLT_ENTRY_SIZE;
                config.plt_zero_size = crate::x86::PLT_ENTRY_SIZE;
            }
            Target::X86_64 => {}
            Target::Ppc => {
                config.plt_entry_size = 4;
                config.plt_zero_size = 0;
                config.got_plt_header_entries = 0;
            }
            Target::Ppc64 => {
                config.plt_entry_size = 8;
                config.plt_zero_size = 0;
                config.got_plt_header_entries = 0;
                config.page_size = crate::ppc64::PAGE_SIZE;
                config.va_start = crate::ppc64::VA_START;
            }
            Target::AArch64 => {
                config.plt_entry_size = crate::aarch64::PLT_ENTRY_SIZE;
                config.plt_zero_size = crate::aarch64::PLT_ENTRY_SIZE;
            }
            Target::Mips(_) => {
                config.plt_entry_size = 0;
                config.plt_zero_size = 0;
                config.got_plt_header_entries = 0;
                config.got_header_entries = 2;
                config.use_lazy_binding = false;
            }
            Target::Amdgpu => {
                config.plt_entry_size = 0;
                config.plt_zero_size = 0;
                config.got_plt_header_entries = 0;
                config.use_lazy_binding = false;
            }
        }
        config
    }

    pub fn elf_header_arch_magic(self) -> u16 {
        use crate::arch::Arch as _;
        match self {
            Target::X86 => crate::x86::X86::elf_header_arch_magic(),
            Target::X86_64 => crate::x86_64::X86_64::elf_header_arch_magic(),
            Target::Ppc => crate::ppc::Ppc::elf_header_arch_magic(),
            Target::Ppc64 => crate::ppc64::Ppc64::elf_header_arch_magic(),
            Target::AArch64 => crate::aarch64::AArch64::elf_header_arch_magic(),
            Target::Mips(MipsVariant { endian: Endian::Little, .. }) => {
                crate::mips::MipsLe::elf_header_arch_magic()
            }
            Target::Mips(MipsVariant { endian: Endian::Big, .. }) => {
                crate::mips::MipsBe::elf_header_arch_magic()
            }
            Target::Amdgpu => crate::amdgpu::Amdgpu::elf_header_arch_magic(),
        }
    }

    pub fn rel_type_to_string(self, r_type: u32) -> std::borrow::Cow<'static, str> {
        use crate::arch::Arch as _;
        match self {
            Target::X86 => crate::x86::X86::rel_type_to_string(r_type),
            Target::X86_64 => crate::x86_64::X86_64::rel_type_to_string(r_type),
            Target::Ppc => crate::ppc::Ppc::rel_type_to_string(r_type),
            Target::Ppc64 => crate::ppc64::Ppc64::rel_type_to_string(r_type),
            Target::AArch64 => crate::aarch64::AArch64::rel_type_to_string(r_type),
            Target::Mips(MipsVariant { endian: Endian::Little, .. }) => {
                crate::mips::MipsLe::rel_type_to_string(r_type)
            }
            Target::Mips(MipsVariant { endian: Endian::Big, .. }) => {
                crate::mips::MipsBe::rel_type_to_string(r_type)
            }
            Target::Amdgpu => crate::amdgpu::Amdgpu::rel_type_to_string(r_type),
        }
    }

    /// Patches one relocation using whichever backend this target resolved
    /// to. The one place callers reach for instead of matching on `Target`
    /// themselves to call a specific backend's `relocate_one` directly.
    pub fn relocate_one(
        self,
        section_bytes: &mut [u8],
        offset_in_section: u64,
        r_type: u32,
        place: u64,
        value: u64,
        plt_range: Option<(u64, u64)>,
        errors: &crate::error::ErrorSink,
    ) -> crate::error::Result {
        use crate::arch::Arch as _;
        match self {
            Target::X86 => crate::x86::X86::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
            Target::X86_64 => crate::x86_64::X86_64::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
            Target::Ppc => crate::ppc::Ppc::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
            Target::Ppc64 => crate::ppc64::Ppc64::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
            Target::AArch64 => crate::aarch64::AArch64::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
            Target::Mips(MipsVariant { endian: Endian::Little, .. }) => {
                crate::mips::MipsLe::relocate_one(
                    section_bytes,
                    offset_in_section,
                    r_type,
                    place,
                    value,
                    plt_range,
                    errors,
                )
            }
            Target::Mips(MipsVariant { endian: Endian::Big, .. }) => {
                crate::mips::MipsBe::relocate_one(
                    section_bytes,
                    offset_in_section,
                    r_type,
                    place,
                    value,
                    plt_range,
                    errors,
                )
            }
            Target::Amdgpu => crate::amdgpu::Amdgpu::relocate_one(
                section_bytes,
                offset_in_section,
                r_type,
                place,
                value,
                plt_range,
                errors,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_combinations() {
        assert_eq!(
            Target::resolve(TargetId {
                machine: object::elf::EM_X86_64,
                width: Width::Bits64,
                endian: Endian::Little,
            })
            .unwrap(),
            Target::X86_64
        );
    }

    #[test]
    fn rejects_64_bit_mips() {
        assert!(Target::resolve(TargetId {
            machine: object::elf::EM_MIPS,
            width: Width::Bits64,
            endian: Endian::Big,
        })
        .is_err());
    }

    #[test]
    fn rejects_unknown_machine() {
        assert!(Target::resolve(TargetId {
            machine: 0xdead,
            width: Width::Bits64,
            endian: Endian::Little,
        })
        .is_err());
    }
}

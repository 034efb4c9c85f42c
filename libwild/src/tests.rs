//! End-to-end regression tests that exercise the classifiers and
//! `relocate_one` implementations together the way a real caller would:
//! evaluate a relocation's expression, patch the bytes, and check that
//! nothing outside the intended window moved. Per-backend unit tests live
//! next to each backend; this module is for properties and scenarios that
//! cut across more than one of them.

use linker_utils::elf::RelocationKind;

use crate::aarch64::AArch64;
use crate::arch::Arch;
use crate::args::OutputKind;
use crate::args::RelocationModel;
use crate::copy_rel::needs_copy_rel;
use crate::error::ErrorSink;
use crate::mips::MipsBe;
use crate::plt::needs_plt;
use crate::plt::PltNeed;
use crate::ppc64::Ppc64;
use crate::resolution::ValueFlags;
use crate::symbol::SymbolBody;
use crate::symbol::SymbolKind;
use crate::tls::can_relax_tls;
use crate::tls::TlsAccess;
use crate::x86::X86;
use crate::x86_64::X86_64;

/// A byte buffer with sentinel canaries on either side of the window a
/// `relocate_one` call is allowed to touch. Grounded on §8's
/// "writer-buffer-safety" property: patching `[Loc, BufEnd)` must never
/// read or write outside that window.
struct GuardedBuffer {
    data: Vec<u8>,
    guard_len: usize,
    window_len: usize,
}

impl GuardedBuffer {
    const CANARY: u8 = 0xA5;

    fn new(window_len: usize) -> Self {
        let guard_len = 8;
        let mut data = vec![Self::CANARY; guard_len * 2 + window_len];
        for b in &mut data[guard_len..guard_len + window_len] {
            *b = 0;
        }
        GuardedBuffer {
            data,
            guard_len,
            window_len,
        }
    }

    /// The section slice a backend actually sees: canaries included, so an
    /// out-of-range write would land somewhere this test can see, but
    /// `offset_in_section` is relative to `guard_len` so callers pass
    /// ordinary offsets.
    fn section(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn offset(&self, within_window: usize) -> u64 {
        (self.guard_len + within_window) as u64
    }

    fn assert_guards_untouched(&self) {
        assert!(
            self.data[..self.guard_len].iter().all(|&b| b == Self::CANARY),
            "write landed before the relocation window"
        );
        assert!(
            self.data[self.guard_len + self.window_len..]
                .iter()
                .all(|&b| b == Self::CANARY),
            "write landed after the relocation window"
        );
    }

    fn window(&self) -> &[u8] {
        &self.data[self.guard_len..self.guard_len + self.window_len]
    }
}

#[test]
fn scenario_x86_64_abs32_in_range() {
    let errors = ErrorSink::new();
    let mut buf = GuardedBuffer::new(8);
    let offset = buf.offset(0);
    X86_64::relocate_one(
        buf.section(),
        offset,
        object::elf::R_X86_64_32,
        0,
        0xDEAD_BEEF,
        None,
        &errors,
    )
    .unwrap();
    assert!(!errors.has_errors());
    assert_eq!(buf.window(), &[0xEF, 0xBE, 0xAD, 0xDE, 0, 0, 0, 0]);
    buf.assert_guards_untouched();
}

#[test]
fn scenario_x86_64_32s_overflow_leaves_buffer_unchanged() {
    let errors = ErrorSink::new();
    let mut buf = GuardedBuffer::new(4);
    let offset = buf.offset(0);
    X86_64::relocate_one(
        buf.section(),
        offset,
        object::elf::R_X86_64_32S,
        0,
        0x8000_0000,
        None,
        &errors,
    )
    .unwrap();
    assert!(errors.has_errors());
    assert_eq!(buf.window(), &[0, 0, 0, 0]);
    buf.assert_guards_untouched();
}

#[test]
fn scenario_aarch64_adr_prel_pg_hi21() {
    let errors = ErrorSink::new();
    let mut buf = GuardedBuffer::new(4);
    let offset = buf.offset(0);
    // Opcode/Rd bits outside the immediate field, to check they survive.
    buf.section()[8..12].copy_from_slice(&0x9000_0000u32.to_le_bytes());
    AArch64::relocate_one(
        buf.section(),
        offset,
        object::elf::R_AARCH64_ADR_PREL_PG_HI21,
        0x1000,
        0x201FFF,
        None,
        &errors,
    )
    .unwrap();
    assert!(!errors.has_errors());
    let word = u32::from_le_bytes(buf.window().try_into().unwrap());
    // Page(SA) - Page(P) = 0x201000 - 0x1000 = 0x200000; immhi/immlo per the
    // ADRP encoding, opcode bits outside the 0x6000_1fff mask untouched.
    assert_eq!(word, 0x9000_1000);
    buf.assert_guards_untouched();
}

#[test]
fn scenario_mips_r_mips_26() {
    let errors = ErrorSink::new();
    let mut buf = GuardedBuffer::new(4);
    let offset = buf.offset(0);
    buf.section()[8..12].copy_from_slice(&0x0C00_0000u32.to_be_bytes());
    MipsBe::relocate_one(
        buf.section(),
        offset,
        object::elf::R_MIPS_26,
        0,
        0x0040_0024,
        None,
        &errors,
    )
    .unwrap();
    assert!(!errors.has_errors());
    let word = u32::from_be_bytes(buf.window().try_into().unwrap());
    assert_eq!(word, 0x0C10_0009);
    buf.assert_guards_untouched();
}

#[test]
fn scenario_ppc64_rel24_with_trailing_nop() {
    let errors = ErrorSink::new();
    let mut buf = GuardedBuffer::new(8);
    let offset = buf.offset(0);
    buf.section()[8..12].copy_from_slice(&[0x48, 0x00, 0x00, 0x01]); // bl
    buf.section()[12..16].copy_from_slice(&[0x60, 0x00, 0x00, 0x00]); // nop
    let place = 0x1000_0000u64;
    let target = place + 0x40; // well within the PLT range below
    let plt_range = Some((place, place + 0x1000));
    Ppc64::relocate_one(
        buf.section(),
        offset,
        object::elf::R_PPC64_REL24,
        place,
        target,
        plt_range,
        &errors,
    )
    .unwrap();
    assert!(!errors.has_errors());
    let rel = (target as i64 - place as i64) as u32 & 0x03ff_fffc;
    let word = u32::from_be_bytes(buf.window()[0..4].try_into().unwrap());
    // 0x4800_0001 was the original `bl` opcode/link bits with a zeroed
    // branch-target field; only that field should have changed.
    assert_eq!(word, 0x4800_0001 | rel);
    assert_eq!(&buf.window()[4..8], &[0xE8, 0x41, 0x00, 0x28]);
    buf.assert_guards_untouched();
}

#[test]
fn scenario_x86_tls_gd_to_local_exec() {
    use crate::arch::Relaxation as _;
    use linker_utils::elf::shf::EXECINSTR;

    // leal x@tlsgd(,%ebx,1); call __tls_get_addr@plt, 10 bytes starting 3
    // bytes before the relocated field (which sits on the `leal` immediate).
    let mut bytes = vec![0u8; 16];
    bytes[0] = 0x8d; // part of `leal`, content doesn't matter to the rewrite
    let offset = 3u64;
    let relaxation = <X86 as Arch>::Relaxation::new(
        object::elf::R_386_TLS_GD,
        &bytes,
        offset,
        ValueFlags::ADDRESS,
        OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        EXECINSTR,
    )
    .expect("TLS GD must relax to LE in a static executable");

    let mut offset_in_section = offset;
    let mut addend = 0u64;
    let mut modifier = linker_utils::relaxation::RelocationModifier::Normal;
    relaxation.apply(&mut bytes, &mut offset_in_section, &mut addend, &mut modifier);

    assert_eq!(
        &bytes[0..12],
        &[
            0x65, 0xa1, 0x00, 0x00, 0x00, 0x00, // movl %gs:0,%eax
            0x81, 0xe8, 0x00, 0x00, 0x00, 0x00, // subl 0(%ebx),%eax
        ]
    );

    // The rewritten immediate (the `subl` operand) lands at offset+5, i.e.
    // `Loc + 5`; applying it is ordinary `relocate_one` for the relaxed
    // type, which classifies as a plain 4-byte absolute write.
    let info = relaxation.rel_info();
    assert_eq!(info.kind, RelocationKind::Absolute);
    assert_eq!(info.size.bytes(), 4);

    let errors = ErrorSink::new();
    let tls_phdr_memsz = 0x40u64;
    let sa = 0x10u64;
    X86::relocate_one(
        &mut bytes,
        offset + 5,
        object::elf::R_386_TLS_LE,
        0,
        tls_phdr_memsz - sa,
        None,
        &errors,
    )
    .unwrap();
    assert!(!errors.has_errors());
    assert_eq!(
        u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        (tls_phdr_memsz - sa) as u32
    );
}

#[test]
fn classification_symmetry_tls_kinds_are_mutually_exclusive() {
    let tls_types = [
        object::elf::R_X86_64_TLSGD,
        object::elf::R_X86_64_TLSLD,
        object::elf::R_X86_64_GOTTPOFF,
        object::elf::R_X86_64_TPOFF32,
    ];
    for r_type in tls_types {
        let info = X86_64::relocation_from_raw(r_type).unwrap();
        let tags = [
            matches!(info.kind, RelocationKind::TlsGd),
            matches!(info.kind, RelocationKind::TlsLd),
            matches!(info.kind, RelocationKind::TlsIe),
            matches!(info.kind, RelocationKind::TlsLe),
        ];
        assert_eq!(
            tags.iter().filter(|&&b| b).count(),
            1,
            "relocation {r_type} classified as more than one TLS access model"
        );
    }
}

#[test]
fn can_relax_tls_never_fires_for_dynamic_symbols() {
    for from in [
        TlsAccess::GeneralDynamic,
        TlsAccess::LocalDynamic,
        TlsAccess::InitialExec,
        TlsAccess::LocalExec,
    ] {
        assert!(!can_relax_tls(
            from,
            ValueFlags::DYNAMIC,
            OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
        ));
    }
}

#[test]
fn plt_classifier_law_holds_for_symbol_bodies() {
    let plain = SymbolBody {
        kind: SymbolKind::Func,
        value_flags: ValueFlags::ADDRESS,
    };
    assert_eq!(
        needs_plt(RelocationKind::Relative, plain.value_flags),
        PltNeed::No
    );

    let ifunc = SymbolBody {
        kind: SymbolKind::GnuIFunc,
        value_flags: ValueFlags::IFUNC,
    };
    for kind in [
        RelocationKind::Relative,
        RelocationKind::Absolute,
        RelocationKind::PltRelative,
    ] {
        // An ifunc needs Explicit regardless of the relocation's own class.
        assert_eq!(needs_plt(kind, ifunc.value_flags), PltNeed::Explicit);
    }
}

#[test]
fn copy_rel_preconditions_require_shared_object_symbol() {
    let shared_object_symbol = SymbolBody {
        kind: SymbolKind::Object,
        value_flags: ValueFlags::DYNAMIC,
    };
    assert!(needs_copy_rel(
        shared_object_symbol.value_flags,
        shared_object_symbol.is_func(),
        shared_object_symbol.is_tls(),
        OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
    ));

    let shared_func_symbol = SymbolBody {
        kind: SymbolKind::Func,
        value_flags: ValueFlags::DYNAMIC,
    };
    assert!(!needs_copy_rel(
        shared_func_symbol.value_flags,
        shared_func_symbol.is_func(),
        shared_func_symbol.is_tls(),
        OutputKind::StaticExecutable(RelocationModel::NonRelocatable),
    ));
}

#[test]
fn classification_is_idempotent() {
    let a = X86_64::relocation_from_raw(object::elf::R_X86_64_PC32).unwrap();
    let b = X86_64::relocation_from_raw(object::elf::R_X86_64_PC32).unwrap();
    assert_eq!(a.kind, b.kind);
    assert_eq!(a.size.bytes(), b.size.bytes());
}

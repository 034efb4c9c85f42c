//! Byte-level TLS relaxation rewrites for AArch64, grounded on
//! `AArch64TargetInfo::relaxTls{GdToLe,IeToLe}` in the original
//! `ELF/Target.cpp`.

/// Which of the four TLSDESC-GD instructions a given relocation rewrites.
/// `X` is `S + A + TcbSize` (aligned to the TLS segment's `p_align`),
/// already range-checked by the caller.
#[derive(Debug, Clone, Copy)]
pub enum GdToLeSlot {
    /// `adrp x0, :tlsdesc:v` -> `movz x_n, #X[31:16], lsl #16`.
    AdrPage21,
    /// `ldr x1, [x0, #:tlsdesc_lo12:v]` -> `movk x_n, #X[15:0]`.
    Ld64Lo12,
    /// `add x0, x0, :tlsdesc_lo12:v` -> `nop`.
    AddLo12,
    /// `.tlsdesccall` -> `nop`.
    Call,
}

pub fn gd_to_le_instruction(slot: GdToLeSlot, reg_no: u32, x: u64) -> u32 {
    match slot {
        GdToLeSlot::AdrPage21 => 0xd2a0_0000 | reg_no | (((x >> 16) & 0xffff) as u32) << 5,
        GdToLeSlot::Ld64Lo12 => 0xf280_0000 | reg_no | ((x & 0xffff) as u32) << 5,
        GdToLeSlot::AddLo12 | GdToLeSlot::Call => 0xd503_201f,
    }
}

/// `IE -> LE` rewrites a `movz`/`movk` pair generated from
/// `ADR_GOTTPREL_PAGE21`/`LD64_GOTTPREL_LO12_NC`, preserving the
/// destination register encoded in the original instruction's low 5 bits.
pub fn ie_to_le_instruction(is_page21: bool, reg_no: u32, x: u64) -> u32 {
    if is_page21 {
        0xd2a0_0000 | reg_no | (((x >> 16) & 0xffff) as u32) << 5
    } else {
        0xf280_0000 | reg_no | ((x & 0xffff) as u32) << 5
    }
}

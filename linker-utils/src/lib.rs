//! Endian-free, policy-free per-architecture constants shared by `libwild`'s
//! target backends: relocation-type-name tables, section flags, and the
//! byte-level `RelaxationKind` rewrites used by TLS/GOT relaxation.
//!
//! Nothing in this crate knows about `Config`, symbols, or output-section
//! layout; that belongs to `libwild::arch`.

pub mod aarch64;
pub mod elf;
pub mod relaxation;
pub mod x86;
pub mod x86_64;

//! The error sink (C8): two severities, as specified in §7.
//!
//! Recoverable diagnostics ("relocation out of range", "improper alignment",
//! "cannot be a dynamic relocation when producing a shared object") append to
//! a process-wide, lock-free stream and set a flag; the link keeps going so
//! the user sees every bad relocation in a section, not just the first.
//! Fatal conditions ("unrecognized relocation", "unsupported target
//! configuration") have no natural "abort the process" primitive that
//! composes with `?` in library code, so they're surfaced as
//! `anyhow::Result::Err` all the way up to whatever owns the link.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::SegQueue;

pub type Result<T = ()> = anyhow::Result<T>;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
}

/// Append-only, thread-safe sink for recoverable errors. One instance is
/// shared for the duration of a link; `relocate_one` calls on disjoint
/// `[Loc, BufEnd)` windows may report into it concurrently.
#[derive(Default)]
pub struct ErrorSink {
    messages: SegQueue<Diagnostic>,
    has_error: AtomicBool,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recoverable error. Does not stop processing of the current
    /// relocation batch; the caller is expected to check `has_errors` after
    /// a full section (or the whole link) and abort then.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%message, "recoverable relocation error");
        self.has_error.store(true, Ordering::Relaxed);
        self.messages.push(Diagnostic { message });
    }

    pub fn has_errors(&self) -> bool {
        self.has_error.load(Ordering::Relaxed)
    }

    /// Drains all recorded diagnostics. Intended to be called once, after
    /// the phase that may have reported into this sink has finished.
    pub fn drain(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        while let Some(d) = self.messages.pop() {
            out.push(d);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_without_aborting() {
        let sink = ErrorSink::new();
        assert!(!sink.has_errors());
        sink.error("relocation R_X86_64_32S out of range");
        sink.error("improper alignment for relocation R_PPC64_ADDR16_DS");
        assert!(sink.has_errors());
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
    }
}

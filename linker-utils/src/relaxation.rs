/// Tells the caller whether the relocation immediately following the one
/// just relaxed belongs to the rewritten instruction sequence and should be
/// skipped, rather than processed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationModifier {
    Normal,
    SkipNextRelocation,
}

/// How a page satisfies a request.
///
/// | Policy | Reuses freed extents | Extends the writable region | Coalesces first |
/// |---|---|---|---|
/// | `Balanced` | yes, tried first | yes, as fallback | no |
/// | `Rich` | no | yes | no |
/// | `Poor` | yes | no | no |
/// | `Thrifty` | yes | no | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// No preference: reuse if possible, otherwise extend.
    #[default]
    Balanced,
    /// Always carve fresh words, never touch freed extents.
    Rich,
    /// Only reuse freed extents.
    Poor,
    /// Merge adjacent freed extents, then only reuse.
    Thrifty,
}

impl Policy {
    #[inline]
    pub fn reuses(self) -> bool {
        !matches!(self, Self::Rich)
    }

    #[inline]
    pub fn extends(self) -> bool {
        matches!(self, Self::Balanced | Self::Rich)
    }

    #[inline]
    pub fn coalesces(self) -> bool {
        matches!(self, Self::Thrifty)
    }
}

/// A [`Span`] represents a contiguous byte region of the input. It is used to point diagnostics at
/// a key or a value and to remember where a discriminator entry sits inside an object. An
/// invariant to be maintained is that `lo <= hi`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub lo: u32,
    pub hi: u32,
}

impl Span {
    /// Construct a new span. Will panic if `lo > hi`. Prefer this constructor to construct a new
    /// [`Span`] over using direct struct initialization.
    pub const fn new(lo: u32, hi: u32) -> Self {
        assert!(lo <= hi, "`lo` must not be larger than `hi`");
        Span { lo, hi }
    }

    /// An empty span at `pos`.
    pub const fn point(pos: u32) -> Self {
        Span { lo: pos, hi: pos }
    }

    pub const fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    pub fn into_range(self) -> std::ops::Range<usize> {
        self.lo as usize..self.hi as usize
    }
}

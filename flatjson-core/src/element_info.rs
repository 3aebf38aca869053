use std::fmt;

/// Result of a name lookup: an absolute element index together with the inline site (the
/// flattened ancestor element) through which the element is reached.
///
/// Both halves are packed into a single word, the index in the high 32 bits and the site in the
/// low 32 bits. A negative index means the name is unknown; a negative site means the element is
/// declared directly on the shape the lookup was made against.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementInfo(u64);

impl ElementInfo {
    pub const UNKNOWN: ElementInfo = ElementInfo::pack(-1, -1);

    const fn pack(index: i32, inline_site: i32) -> Self {
        ElementInfo(((index as u32 as u64) << 32) | (inline_site as u32 as u64))
    }

    pub const fn new(index: u32, inline_site: Option<u32>) -> Self {
        let site = match inline_site {
            Some(site) => site as i32,
            None => -1,
        };
        Self::pack(index as i32, site)
    }

    const fn raw_index(self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    const fn raw_site(self) -> i32 {
        self.0 as u32 as i32
    }

    pub const fn is_unknown(self) -> bool {
        self.raw_index() < 0
    }

    pub const fn index(self) -> Option<u32> {
        match self.raw_index() {
            i if i < 0 => None,
            i => Some(i as u32),
        }
    }

    pub const fn inline_site(self) -> Option<u32> {
        match self.raw_site() {
            s if s < 0 => None,
            s => Some(s as u32),
        }
    }
}

impl fmt::Debug for ElementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index(), self.inline_site()) {
            (None, _) => f.write_str("ElementInfo(unknown)"),
            (Some(i), None) => write!(f, "ElementInfo({i})"),
            (Some(i), Some(s)) => write!(f, "ElementInfo({i} via {s})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let info = ElementInfo::new(7, Some(2));
        assert_eq!(info.index(), Some(7));
        assert_eq!(info.inline_site(), Some(2));
        assert!(!info.is_unknown());

        let direct = ElementInfo::new(0, None);
        assert_eq!(direct.index(), Some(0));
        assert_eq!(direct.inline_site(), None);

        assert!(ElementInfo::UNKNOWN.is_unknown());
        assert_eq!(ElementInfo::UNKNOWN.index(), None);
        assert_ne!(ElementInfo::UNKNOWN, direct);
    }
}

//! Sorted, merged code point range tables

/// Inclusive code point ranges, sorted and non-overlapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTable {
    ranges: Vec<(u32, u32)>,
    /// Number of code points before each range
    offsets: Vec<u64>,
    textual: bool,
}

impl RangeTable {
    /// Build a table from inclusive ranges in any order; overlaps are merged
    pub fn from_ranges(ranges: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut sorted: Vec<(u32, u32)> = ranges.into_iter().filter(|(lo, hi)| lo <= hi).collect();
        sorted.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(sorted.len());
        for (lo, hi) in sorted {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }

        let mut offsets = Vec::with_capacity(merged.len());
        let mut total = 0u64;
        for (lo, hi) in &merged {
            offsets.push(total);
            total += u64::from(hi - lo) + 1;
        }

        Self {
            ranges: merged,
            offsets,
            textual: true,
        }
    }

    /// Build a table from individual code points
    pub fn from_code_points(points: impl IntoIterator<Item = u32>) -> Self {
        Self::from_ranges(points.into_iter().map(|cp| (cp, cp)))
    }

    /// Mark the table as a designation that must not be turned into keys
    /// (e.g. noncharacters), even where its members are valid scalar values
    pub fn non_textual(mut self) -> Self {
        self.textual = false;
        self
    }

    pub fn is_textual(&self) -> bool {
        self.textual
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }

    /// Number of code points in the table
    pub fn len(&self) -> u64 {
        match (self.ranges.last(), self.offsets.last()) {
            (Some((lo, hi)), Some(offset)) => offset + u64::from(hi - lo) + 1,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, cp: u32) -> bool {
        self.ranges
            .binary_search_by(|&(lo, hi)| {
                if hi < cp {
                    std::cmp::Ordering::Less
                } else if lo > cp {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// The code point at `index` in ascending order
    pub fn code_point(&self, index: u64) -> Option<u32> {
        if index >= self.len() {
            return None;
        }
        let slot = match self.offsets.binary_search(&index) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let (lo, _) = self.ranges[slot];
        Some(lo + (index - self.offsets[slot]) as u32)
    }

    /// All code points in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(lo, hi)| lo..=hi)
    }

    /// Whether every member converts to a `char`
    pub fn all_scalar_values(&self) -> bool {
        self.ranges
            .iter()
            .all(|&(lo, hi)| hi <= char::MAX as u32 && (hi < 0xD800 || lo > 0xDFFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_sort() {
        let table = RangeTable::from_ranges([(10, 12), (0, 2), (3, 4), (11, 20), (30, 29)]);
        assert_eq!(table.ranges(), &[(0, 4), (10, 20)]);
        assert_eq!(table.len(), 16);
    }

    #[test]
    fn test_index_matches_iteration() {
        let table = RangeTable::from_ranges([(0x41, 0x43), (0x61, 0x62), (0x1F600, 0x1F600)]);
        let all: Vec<u32> = table.iter().collect();
        assert_eq!(all.len() as u64, table.len());
        for (i, cp) in all.iter().enumerate() {
            assert_eq!(table.code_point(i as u64), Some(*cp));
        }
        assert_eq!(table.code_point(table.len()), None);
    }

    #[test]
    fn test_contains() {
        let table = RangeTable::from_code_points([5, 7, 8]);
        assert!(table.contains(7));
        assert!(!table.contains(6));
        assert!(!RangeTable::from_ranges([]).contains(0));
    }

    #[test]
    fn test_scalar_values() {
        assert!(RangeTable::from_ranges([(0, 0xD7FF), (0xE000, 0x10FFFF)]).all_scalar_values());
        assert!(!RangeTable::from_ranges([(0xD800, 0xDFFF)]).all_scalar_values());
        assert!(!RangeTable::from_ranges([(0xD000, 0xE000)]).all_scalar_values());
        assert!(!RangeTable::from_code_points([0x110000]).all_scalar_values());
    }

    #[test]
    fn test_empty_table() {
        let table = RangeTable::from_ranges([]);
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.code_point(0), None);
    }
}

//! The tree of a process's memory mappings (design §3, §4.7).
//!
//! Generalised from the teacher's raw-pointer red-black tree: each mapping
//! is owned data keyed by its start address in a `BTreeMap`, instead of an
//! augmented intrusive tree of `unsafe`-linked nodes. Lookup-by-containing-
//! address and insert-with-overlap-resolution are both `O(log n)` either
//! way; the safe structure costs nothing a kernel this size would notice
//! and removes an entire class of use-after-free bugs the original
//! buys speed with.

use alloc::collections::BTreeMap;

use crate::vma_flags::{Backing, Prot, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vma {
    pub start: u64,
    pub len: u64,
    pub prot: Prot,
    pub visibility: Visibility,
    pub backing: Backing,
}

impl Vma {
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Non-overlapping set of mappings, keyed by start address.
#[derive(Default)]
pub struct VmaTree {
    mappings: BTreeMap<u64, Vma>,
}

impl VmaTree {
    pub fn new() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    pub fn find_containing(&self, addr: u64) -> Option<&Vma> {
        self.mappings
            .range(..=addr)
            .next_back()
            .map(|(_, vma)| vma)
            .filter(|vma| vma.contains(addr))
    }

    /// Insert `vma`, first splitting/truncating/dropping any mappings it
    /// overlaps (design §4.7 `mem_map` with `fixed`).
    pub fn insert_fixed(&mut self, vma: Vma) {
        self.clear_range(vma.start, vma.end());
        self.mappings.insert(vma.start, vma);
    }

    /// Insert `vma` without disturbing existing mappings; fails if it
    /// overlaps any of them (design §4.7 without `fixed`).
    pub fn insert_non_overlapping(&mut self, vma: Vma) -> bool {
        if self.range_overlaps(vma.start, vma.end()) {
            return false;
        }
        self.mappings.insert(vma.start, vma);
        true
    }

    fn range_overlaps(&self, start: u64, end: u64) -> bool {
        self.overlapping(start, end).next().is_some()
    }

    /// Every mapping overlapping `[start, end)`, in descending start order.
    /// All candidates have `start < end` (by construction of the range);
    /// since mappings never overlap each other, once one candidate's end
    /// falls at or below `start` every mapping before it (smaller start,
    /// so also smaller or equal end) is out of range too.
    fn overlapping(&self, start: u64, end: u64) -> impl Iterator<Item = (u64, Vma)> + '_ {
        self.mappings
            .range(..end)
            .rev()
            .take_while(move |(_, vma)| vma.end() > start)
            .map(|(&k, &v)| (k, v))
    }

    /// Remove, split, or truncate every mapping overlapping `[start, end)`.
    pub fn clear_range(&mut self, start: u64, end: u64) {
        let affected: alloc::vec::Vec<(u64, Vma)> = self.overlapping(start, end).collect();

        for (key, vma) in affected {
            self.mappings.remove(&key);

            let left_len = start.saturating_sub(vma.start);
            if left_len > 0 {
                self.mappings.insert(
                    vma.start,
                    Vma {
                        start: vma.start,
                        len: left_len,
                        ..vma
                    },
                );
            }

            if end < vma.end() {
                let right_start = end;
                let right_len = vma.end() - end;
                self.mappings.insert(
                    right_start,
                    Vma {
                        start: right_start,
                        len: right_len,
                        ..vma
                    },
                );
            }
        }
    }

    /// True if `[start, end)` is covered edge-to-edge by mappings with no
    /// gaps (design §4.7 `mem_protect`/`mem_unmap` operate on "the
    /// containing mapping(s)", which implies full coverage).
    pub fn fully_covers(&self, start: u64, end: u64) -> bool {
        let mut cursor = start;
        for (key, vma) in self.overlapping(start, end).collect::<alloc::vec::Vec<_>>().into_iter().rev() {
            if key > cursor {
                return false;
            }
            cursor = cursor.max(vma.end());
            if cursor >= end {
                return true;
            }
        }
        cursor >= end
    }

    /// Rewrite the protection of every mapping in `[start, end)`, splitting
    /// boundary mappings as needed. Caller must have already checked
    /// `fully_covers`.
    pub fn set_protection(&mut self, start: u64, end: u64, prot: Prot) {
        let affected: alloc::vec::Vec<(u64, Vma)> = self.overlapping(start, end).collect();
        for (key, vma) in affected {
            self.mappings.remove(&key);

            let left_len = start.saturating_sub(vma.start);
            if left_len > 0 {
                self.mappings.insert(
                    vma.start,
                    Vma {
                        len: left_len,
                        ..vma
                    },
                );
            }

            let mid_start = vma.start.max(start);
            let mid_end = vma.end().min(end);
            self.mappings.insert(
                mid_start,
                Vma {
                    start: mid_start,
                    len: mid_end - mid_start,
                    prot,
                    ..vma
                },
            );

            if end < vma.end() {
                self.mappings.insert(
                    end,
                    Vma {
                        start: end,
                        len: vma.end() - end,
                        ..vma
                    },
                );
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vma> {
        self.mappings.values()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
#[cfg(test)]
mod tests {
    use super::*;

    fn anon_vma(start: u64, len: u64) -> Vma {
        Vma {
            start,
            len,
            prot: Prot::READ | Prot::WRITE,
            visibility: Visibility::Private,
            backing: Backing::Anonymous,
        }
    }

    #[test]
    fn find_containing_locates_the_right_mapping() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x1000));
        tree.insert_non_overlapping(anon_vma(0x3000, 0x2000));

        assert_eq!(tree.find_containing(0x1500).unwrap().start, 0x1000);
        assert_eq!(tree.find_containing(0x3fff).unwrap().start, 0x3000);
        assert!(tree.find_containing(0x2000).is_none());
        assert!(tree.find_containing(0x5000).is_none());
    }

    #[test]
    fn insert_non_overlapping_rejects_overlap() {
        let mut tree = VmaTree::new();
        assert!(tree.insert_non_overlapping(anon_vma(0x1000, 0x2000)));
        assert!(!tree.insert_non_overlapping(anon_vma(0x1800, 0x1000)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn insert_fixed_truncates_overlapping_mapping_on_both_sides() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x4000)); // [0x1000, 0x5000)

        tree.insert_fixed(anon_vma(0x2000, 0x1000)); // punch out [0x2000, 0x3000)

        let mut starts: alloc::vec::Vec<u64> = tree.iter().map(|v| v.start).collect();
        starts.sort_unstable();
        assert_eq!(starts, alloc::vec![0x1000, 0x2000, 0x3000]);

        let left = tree.find_containing(0x1500).unwrap();
        assert_eq!((left.start, left.len), (0x1000, 0x1000));
        let right = tree.find_containing(0x4000).unwrap();
        assert_eq!((right.start, right.len), (0x3000, 0x2000));
    }

    #[test]
    fn insert_fixed_fully_drops_a_contained_mapping() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x1000));
        tree.insert_fixed(anon_vma(0x0, 0x3000));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.find_containing(0x1000).unwrap().start, 0x0);
    }

    #[test]
    fn clear_range_removes_mapping_with_no_replacement() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x1000));
        tree.clear_range(0x1000, 0x2000);
        assert!(tree.is_empty());
    }

    #[test]
    fn fully_covers_detects_gaps() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x1000));
        tree.insert_non_overlapping(anon_vma(0x3000, 0x1000));
        assert!(tree.fully_covers(0x1000, 0x2000));
        assert!(!tree.fully_covers(0x1000, 0x4000));
    }

    #[test]
    fn set_protection_updates_covered_range_only() {
        let mut tree = VmaTree::new();
        tree.insert_non_overlapping(anon_vma(0x1000, 0x3000)); // [0x1000,0x4000)
        tree.set_protection(0x2000, 0x3000, Prot::READ);

        assert_eq!(tree.find_containing(0x1500).unwrap().prot, Prot::READ | Prot::WRITE);
        assert_eq!(tree.find_containing(0x2500).unwrap().prot, Prot::READ);
        assert_eq!(tree.find_containing(0x3500).unwrap().prot, Prot::READ | Prot::WRITE);
    }
}

//! # Capability Bitmaps
//!
//! Fixed-size packed bit vector used to hold the capability masks the kernel
//! reports for a device (one bit per axis, key or effect id).
//!
//! Out-of-range bits are ignored instead of rejected so scanning code can probe
//! past the end of a capability domain without extra bounds checks.
//!
//! ```
//! use joycal::capability::bitset::BitSet;
//!
//! let mut bits = BitSet::new(64);
//! bits.set(9);
//! bits.set(2);
//! bits.set(5);
//! bits.set(100); // ignored
//!
//! assert_eq!(bits.count_set(), 3);
//! assert_eq!(bits.iter().collect::<Vec<_>>(), vec![2, 5, 9]);
//! ```

const WORD_BITS: usize = u64::BITS as usize;

/// Packed bit vector over a capability id space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    bit_count: usize,
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an empty bitmap able to hold `bit_count` bits.
    #[must_use]
    pub fn new(bit_count: usize) -> Self {
        Self {
            bit_count,
            words: vec![0; bit_count.div_ceil(WORD_BITS)],
        }
    }

    /// Builds a bitmap with the given ids set. Ids outside the domain are dropped.
    #[must_use]
    pub fn from_ids<I>(bit_count: usize, ids: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut bits = Self::new(bit_count);
        for id in ids {
            bits.set(id);
        }
        bits
    }

    /// Number of bits this bitmap covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bit_count
    }

    /// Returns true when the bitmap covers no bits at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bit_count == 0
    }

    /// Sets `bit`. No-op when `bit` is outside the bitmap.
    pub fn set(&mut self, bit: usize) {
        if bit < self.bit_count {
            self.words[bit / WORD_BITS] |= 1u64 << (bit % WORD_BITS);
        }
    }

    /// Clears `bit`. No-op when `bit` is outside the bitmap.
    pub fn clear(&mut self, bit: usize) {
        if bit < self.bit_count {
            self.words[bit / WORD_BITS] &= !(1u64 << (bit % WORD_BITS));
        }
    }

    /// Returns whether `bit` is set. Always false outside the bitmap.
    #[must_use]
    pub fn test(&self, bit: usize) -> bool {
        bit < self.bit_count && self.words[bit / WORD_BITS] & (1u64 << (bit % WORD_BITS)) != 0
    }

    /// Population count.
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lazily yields the positions of set bits in ascending order.
    ///
    /// Every call starts a fresh scan from bit zero.
    pub fn iter(&self) -> SetBits<'_> {
        SetBits {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the set bits of a [`BitSet`].
#[derive(Debug, Clone)]
pub struct SetBits<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let shift = self.current.trailing_zeros() as usize;
                // drop lowest set bit
                self.current &= self.current - 1;
                return Some(self.word_index * WORD_BITS + shift);
            }

            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bitset_is_clear() {
        let bits = BitSet::new(768);
        assert_eq!(bits.len(), 768);
        assert_eq!(bits.count_set(), 0);
        assert_eq!(bits.iter().next(), None);
    }

    #[test]
    fn test_set_and_test() {
        let mut bits = BitSet::new(64);
        bits.set(0);
        bits.set(63);

        assert!(bits.test(0));
        assert!(bits.test(63));
        assert!(!bits.test(1));
        assert_eq!(bits.count_set(), 2);
    }

    #[test]
    fn test_clear() {
        let mut bits = BitSet::new(128);
        bits.set(70);
        bits.set(71);
        bits.clear(70);

        assert!(!bits.test(70));
        assert!(bits.test(71));
        assert_eq!(bits.count_set(), 1);
    }

    #[test]
    fn test_out_of_range_bits_are_ignored() {
        let mut bits = BitSet::new(10);
        bits.set(10);
        bits.set(1000);
        bits.clear(1000);

        assert!(!bits.test(10));
        assert!(!bits.test(1000));
        assert_eq!(bits.count_set(), 0);
    }

    #[test]
    fn test_partial_last_word_ignores_padding_bits() {
        // 70 bits uses two words, the second only partially
        let mut bits = BitSet::new(70);
        bits.set(69);
        bits.set(70);

        assert_eq!(bits.count_set(), 1);
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![69]);
    }

    #[test]
    fn test_iter_is_ascending_across_words() {
        let ids = [767, 0, 64, 63, 300, 128, 1];
        let bits = BitSet::from_ids(768, ids);

        let mut expected = ids.to_vec();
        expected.sort_unstable();

        assert_eq!(bits.count_set(), ids.len());
        assert_eq!(bits.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_iter_restarts_from_beginning() {
        let bits = BitSet::from_ids(64, [3, 7]);

        let mut first = bits.iter();
        assert_eq!(first.next(), Some(3));

        // A new traversal is independent of a partially consumed one
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(first.next(), Some(7));
        assert_eq!(first.next(), None);
    }

    #[test]
    fn test_every_subset_of_small_domain() {
        // Exhaustive over all subsets of [0, 10)
        for mask in 0u32..(1 << 10) {
            let subset: Vec<usize> = (0..10).filter(|b| mask & (1 << b) != 0).collect();
            let bits = BitSet::from_ids(10, subset.iter().copied());

            assert_eq!(bits.count_set(), subset.len());
            assert_eq!(bits.iter().collect::<Vec<_>>(), subset);
        }
    }

    #[test]
    fn test_from_ids_drops_out_of_domain() {
        let bits = BitSet::from_ids(8, [1, 8, 9, 7]);
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![1, 7]);
    }

    #[test]
    fn test_zero_sized_bitset() {
        let mut bits = BitSet::new(0);
        bits.set(0);

        assert!(bits.is_empty());
        assert_eq!(bits.count_set(), 0);
        assert_eq!(bits.iter().next(), None);
    }

    #[test]
    fn test_into_iterator_for_reference() {
        let bits = BitSet::from_ids(16, [4, 2]);
        let mut seen = Vec::new();
        for bit in &bits {
            seen.push(bit);
        }
        assert_eq!(seen, vec![2, 4]);
    }
}

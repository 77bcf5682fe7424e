//! Bit-toggle candidate generation
//!
//! A hash whose least reliable bits are known can be expanded into the
//! `2^P` variants obtained by flipping every subset of those bits. Lookups
//! probe all variants, which makes matching tolerant of a few bit errors.

/// Upper bound on toggles considered per frame
pub const MAX_TOGGLES: usize = 16;

/// Mask for the bit at MSB-first position `bit` (0..32)
#[inline]
pub const fn toggle_mask(bit: u8) -> u32 {
    0x8000_0000 >> (bit & 31)
}

/// Iterator over the candidates of one hash.
///
/// Candidate `k` flips `toggles[b]` for every set bit `b` of `k`, so
/// candidate 0 is always the original hash.
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    hash: u32,
    toggles: &'a [u8],
    next: u32,
    end: u32,
}

impl<'a> Candidates<'a> {
    /// `p` is clamped to the available toggles and [`MAX_TOGGLES`].
    pub fn new(hash: u32, toggles: Option<&'a [u8]>, p: usize) -> Self {
        let toggles = toggles.unwrap_or(&[]);
        let p = p.min(toggles.len()).min(MAX_TOGGLES);
        Self {
            hash,
            toggles: &toggles[..p],
            next: 0,
            end: 1 << p,
        }
    }

    fn candidate(&self, index: u32) -> u32 {
        self.toggles
            .iter()
            .enumerate()
            .filter(|(b, _)| index & (1 << b) != 0)
            .fold(self.hash, |v, (_, &t)| v ^ toggle_mask(t))
    }
}

impl Iterator for Candidates<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next >= self.end {
            return None;
        }
        let v = self.candidate(self.next);
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.next) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Candidates<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_no_toggles_yields_hash_only() {
        let c: Vec<u32> = Candidates::new(0xDEAD_BEEF, None, 4).collect();
        assert_eq!(c, vec![0xDEAD_BEEF]);
    }

    #[test]
    fn test_msb_first_flips() {
        let toggles = [0u8, 31];
        let c: Vec<u32> = Candidates::new(0, Some(&toggles), 2).collect();
        assert_eq!(c, vec![0, 0x8000_0000, 0x0000_0001, 0x8000_0001]);
    }

    #[test]
    fn test_p_clamped_to_available_toggles() {
        let toggles = [3u8];
        assert_eq!(Candidates::new(7, Some(&toggles), 5).len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_candidate_set_laws(
            hash in any::<u32>(),
            toggles in proptest::sample::subsequence((0u8..32).collect::<Vec<_>>(), 0..=6)
                .prop_shuffle(),
        ) {
            let p = toggles.len();
            let c: Vec<u32> = Candidates::new(hash, Some(&toggles), p).collect();
            prop_assert_eq!(c.len(), 1 << p);
            prop_assert_eq!(c[0], hash);
            let distinct: HashSet<u32> = c.iter().copied().collect();
            prop_assert_eq!(distinct.len(), c.len());
        }
    }
}

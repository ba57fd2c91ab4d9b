use rand::Rng;

/// Draws `count` distinct indices from `0..pool_size`, none equal to `exclude`.
///
/// Rejection sampling: `count` is tiny next to the population, so this stays
/// allocation-light on the hot path.
pub(crate) fn distinct_indices<R: Rng + ?Sized, const N: usize>(
    exclude: usize,
    pool_size: usize,
    rng: &mut R,
) -> [usize; N] {
    debug_assert!(N <= pool_size.saturating_sub(1));
    let mut out = [0usize; N];
    let mut filled = 0;
    while filled < N {
        let candidate = rng.random_range(0..pool_size);
        if candidate == exclude || out[..filled].contains(&candidate) {
            continue;
        }
        out[filled] = candidate;
        filled += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_distinct_and_excluded() {
        let mut rng = StdRng::seed_from_u64(7);
        for exclude in 0..6 {
            for _ in 0..200 {
                let idx: [usize; 5] = distinct_indices(exclude, 6, &mut rng);
                assert!(!idx.contains(&exclude));
                for a in 0..5 {
                    assert!(idx[a] < 6);
                    for b in (a + 1)..5 {
                        assert_ne!(idx[a], idx[b]);
                    }
                }
            }
        }
    }
}

//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use rand::thread_rng;
use rand::Rng;

/// Shuffles a slice _in place_ with a uniformly random permutation
///
/// From https://en.wikipedia.org/wiki/Fisher%E2%80%93Yates_shuffle
///
/// # Example
///
/// ```
/// use common::permutations;
/// let mut v = vec!['a', 'b', 'c'];
/// permutations::shuffle(&mut v);
/// v.sort();
/// assert_eq!(v, vec!['a', 'b', 'c']);
/// ```
pub fn shuffle<T>(items: &mut [T]) {
    let n = items.len();
    if n < 2 {
        return;
    }

    let mut rng = thread_rng();
    // To shuffle an array a of n elements (indices 0..n-1):
    for i in 0..n - 1 {
        let j = rng.gen_range(i..n);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const NUM_TEST_ITERATIONS: i32 = 100;

    #[test]
    fn shuffle_keeps_elements() {
        const N: usize = 100;
        let v: Vec<usize> = (0..N).collect();
        for _ in 0..NUM_TEST_ITERATIONS {
            let mut a = v.to_vec();
            shuffle(&mut a);
            assert_ne!(a, v);

            a.sort_unstable();
            assert_eq!(a, v);
        }
    }

    #[test]
    fn shuffle_moves_most_elements() {
        const N: usize = 1024;
        let v: Vec<usize> = (0..N).collect();
        let mut a = v.to_vec();
        shuffle(&mut a);

        let fixed = a.iter().zip(v.iter()).filter(|(x, y)| x == y).count();
        assert!(fixed < N / 100, "{} fixed points", fixed);
    }

    #[test]
    fn shuffle_short_slices() {
        let mut empty: Vec<u8> = vec![];
        shuffle(&mut empty);
        assert!(empty.is_empty());

        let mut one = vec![7];
        shuffle(&mut one);
        assert_eq!(one, vec![7]);
    }
}

// Copyright (c) 2022-2024, Richard Lincoln. All rights reserved.

use num_complex::Complex64;

pub const J: Complex64 = Complex64 { re: 0.0, im: 1.0 };

#[macro_export]
macro_rules! cmplx {
    () => {
        num_complex::Complex64::new(0.0, 0.0)
    };
    ($arg1:expr) => {
        num_complex::Complex64::new($arg1, 0.0)
    };
    ($arg1:expr, $arg2:expr) => {
        num_complex::Complex64::new($arg1, $arg2)
    };
}

/// Returns the row permutation that sorts `rows` by `key` (stable).
pub(crate) fn permutation_by_key<T, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..rows.len()).collect();
    perm.sort_by_key(|&i| key(&rows[i]));
    perm
}

pub(crate) fn apply_permutation<T: Clone>(rows: &[T], perm: &[usize]) -> Vec<T> {
    perm.iter().map(|&i| rows[i].clone()).collect()
}

/// Inverse of `apply_permutation`: scatters `rows[k]` back to position `perm[k]`.
pub(crate) fn undo_permutation<T: Clone>(rows: &[T], perm: &[usize]) -> Vec<T> {
    let mut out = rows.to_vec();
    for (k, &i) in perm.iter().enumerate() {
        out[i] = rows[k].clone();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_round_trip() {
        let rows = vec![30, 10, 20, 5];
        let perm = permutation_by_key(&rows, |&v| v);
        let sorted = apply_permutation(&rows, &perm);
        assert_eq!(sorted, vec![5, 10, 20, 30]);
        assert_eq!(undo_permutation(&sorted, &perm), rows);
    }
}

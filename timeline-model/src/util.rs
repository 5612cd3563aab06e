//! Ordered-slice helpers shared by the models.

use std::cmp::Ordering;

/// Index of the first element whose key is not less than `value`.
pub fn lower_bound<T>(items: &[T], value: f64, key: impl Fn(&T) -> f64) -> usize {
    items.partition_point(|item| key(item) < value)
}

/// Index of the first element whose key is greater than `value`.
pub fn upper_bound<T>(items: &[T], value: f64, key: impl Fn(&T) -> f64) -> usize {
    items.partition_point(|item| key(item) <= value)
}

/// Merges two ordered sequences. On ties the element from `first` comes
/// first and both are kept.
pub fn merge_ordered<T: Copy>(first: &[T], second: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    let mut merged = Vec::with_capacity(first.len() + second.len());
    let (mut i, mut j) = (0, 0);
    while i < first.len() && j < second.len() {
        if cmp(&first[i], &second[j]) == Ordering::Greater {
            merged.push(second[j]);
            j += 1;
        } else {
            merged.push(first[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&first[i..]);
    merged.extend_from_slice(&second[j..]);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.5, 0, 0)]
    #[case(1.0, 0, 2)]
    #[case(2.0, 2, 3)]
    #[case(9.0, 4, 4)]
    fn bounds(#[case] value: f64, #[case] lower: usize, #[case] upper: usize) {
        let items = [1.0, 1.0, 2.0, 3.0];
        assert_eq!(lower_bound(&items, value, |v| *v), lower);
        assert_eq!(upper_bound(&items, value, |v| *v), upper);
    }

    #[test]
    fn merge_keeps_ties_from_both_sides() {
        let first = [(1, 'a'), (2, 'a'), (4, 'a')];
        let second = [(1, 'b'), (3, 'b')];
        let merged = merge_ordered(&first, &second, |a, b| a.0.cmp(&b.0));
        assert_eq!(
            merged,
            vec![(1, 'a'), (1, 'b'), (2, 'a'), (3, 'b'), (4, 'a')]
        );
    }
}

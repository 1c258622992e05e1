//! Index permutations in lexicographic order.

/// Yields every permutation of `0..n`, starting with the identity and
/// advancing in lexicographic order, so the input order is tried first.
#[derive(Debug, Clone)]
pub struct Permutations {
    next: Option<Vec<usize>>,
}

impl Permutations {
    pub fn new(n: usize) -> Self {
        Self {
            next: (n > 0).then(|| (0..n).collect()),
        }
    }
}

impl Iterator for Permutations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        if advance(&mut following) {
            self.next = Some(following);
        }
        Some(current)
    }
}

/// Step to the next lexicographic permutation in place. Returns `false`
/// when `perm` was the last one.
fn advance(perm: &mut [usize]) -> bool {
    let Some(pivot) = perm.windows(2).rposition(|w| w[0] < w[1]) else {
        return false;
    };
    let Some(successor) = perm.iter().rposition(|&x| x > perm[pivot]) else {
        return false;
    };
    perm.swap(pivot, successor);
    perm[pivot + 1..].reverse();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_in_lexicographic_order() {
        let all: Vec<Vec<usize>> = Permutations::new(3).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
    }

    #[test]
    fn test_counts() {
        assert_eq!(Permutations::new(0).count(), 0);
        assert_eq!(Permutations::new(1).count(), 1);
        assert_eq!(Permutations::new(5).count(), 120);
    }
}

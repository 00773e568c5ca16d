//! Set similarity measures

use std::collections::BTreeSet;

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`. Two empty sets score 0.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<u32> = [1, 2, 3, 4].into_iter().collect();
        let b: BTreeSet<u32> = [3, 4, 5].into_iter().collect();
        assert!((jaccard(&a, &b) - 0.4).abs() < 1e-12);
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn test_jaccard_empty() {
        let empty: BTreeSet<u32> = BTreeSet::new();
        let a: BTreeSet<u32> = [1].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 0.0);
        assert_eq!(jaccard(&empty, &a), 0.0);
    }
}

//! Typo suggestions for names that do not resolve.

/// Levenshtein distance between `a` and `b`, or `None` if it exceeds `limit`.
pub fn edit_distance(a: &str, b: &str, limit: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > limit {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > limit {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= limit).then_some(distance)
}

/// Finds the candidate closest to `lookup`.
///
/// A candidate that only differs in case always wins. Otherwise the closest candidate within
/// `dist` edits is returned, where `dist` defaults to a third of the length of `lookup`.
pub fn find_best_match_for_name<'c>(
    candidates: &[&'c str],
    lookup: &str,
    dist: Option<usize>,
) -> Option<&'c str> {
    if let Some(c) = candidates
        .iter()
        .find(|c| c.to_lowercase() == lookup.to_lowercase())
    {
        return Some(*c);
    }

    let limit = dist.unwrap_or_else(|| lookup.len().max(3) / 3);
    candidates
        .iter()
        .filter_map(|c| edit_distance(lookup, c, limit).map(|d| (d, *c)))
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(edit_distance("kitten", "sitting", 5), Some(3));
        assert_eq!(edit_distance("kitten", "sitting", 2), None);
        assert_eq!(edit_distance("", "abc", 3), Some(3));
        assert_eq!(edit_distance("same", "same", 0), Some(0));
    }

    #[test]
    fn suggestions() {
        let names = ["userId", "maxItems", "name"];
        assert_eq!(find_best_match_for_name(&names, "userid", None), Some("userId"));
        assert_eq!(find_best_match_for_name(&names, "maxItem", Some(3)), Some("maxItems"));
        assert_eq!(find_best_match_for_name(&names, "nmae", Some(3)), Some("name"));
        assert_eq!(find_best_match_for_name(&names, "totally", Some(3)), None);
    }
}

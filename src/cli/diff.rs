//! Classification of merged tuples for `butterfly-stream diff`

use std::fmt;

use butterfly_stream::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Only the first input has the record
    Removed,
    /// The first input lacks the record
    Added,
    /// Present in several inputs with different content, or missing from some
    Modified,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Change::Removed => "-",
            Change::Added => "+",
            Change::Modified => "*",
        })
    }
}

/// Compare one tuple; `None` when every input holds an identical record.
///
/// The returned element is the most recent version: the last present slot,
/// or the first input's record when it was removed.
pub fn classify(tuple: &[Option<Element>]) -> Option<(Change, &Element)> {
    let latest = tuple.iter().rev().flatten().next()?;
    let Some(first) = tuple.first().and_then(Option::as_ref) else {
        return Some((Change::Added, latest));
    };
    if tuple[1..].iter().all(Option::is_none) {
        if tuple.len() == 1 {
            return None;
        }
        return Some((Change::Removed, first));
    }
    if tuple.iter().all(|slot| slot.as_ref() == Some(first)) {
        None
    } else {
        Some((Change::Modified, latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butterfly_stream::{Location, Meta, Node};

    fn node(id: i64, x: i32) -> Option<Element> {
        Some(Element::Node(Node {
            id,
            meta: Meta::default(),
            location: Location::from_fixed(x, 0),
            tags: Default::default(),
        }))
    }

    #[test]
    fn test_identical_records_are_skipped() {
        assert!(classify(&[node(1, 5), node(1, 5)]).is_none());
        assert!(classify(&[node(1, 5)]).is_none());
    }

    #[test]
    fn test_markers() {
        let removed = [node(1, 5), None];
        assert_eq!(classify(&removed).map(|(c, _)| c), Some(Change::Removed));

        let added = [None, node(1, 5)];
        assert_eq!(classify(&added).map(|(c, _)| c), Some(Change::Added));

        let moved = [node(1, 5), node(1, 6)];
        let (change, latest) = classify(&moved).unwrap();
        assert_eq!(change, Change::Modified);
        assert_eq!(Some(latest.clone()), node(1, 6));

        let partial = [node(1, 5), node(1, 5), None];
        assert_eq!(classify(&partial).map(|(c, _)| c), Some(Change::Modified));
        assert_eq!(Change::Modified.to_string(), "*");
    }
}

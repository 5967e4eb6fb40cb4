//! Frequency ranking for "top N" reports

use std::collections::HashMap;
use std::hash::Hash;

/// Values that may be "empty" and must not be counted.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().map(Truthy::is_truthy).unwrap_or(false)
    }
}

macro_rules! truthy_int {
    ($($t:ty),*) => {
        $(impl Truthy for $t {
            fn is_truthy(&self) -> bool {
                *self != 0
            }
        })*
    };
}

truthy_int!(i32, i64, u16, u32, u64, usize);

/// Count occurrences and return `(item, count)` pairs, most frequent first.
///
/// Empty items (`""`, `None`, `false`, `0`) are skipped entirely. Items with
/// equal counts keep the order in which they were first seen.
pub fn set_count<T, I>(items: I) -> Vec<(T, u64)>
where
    I: IntoIterator<Item = T>,
    T: Truthy + Eq + Hash + Clone,
{
    let mut index: HashMap<T, usize> = HashMap::new();
    let mut counts: Vec<(T, u64)> = Vec::new();

    for item in items {
        if !item.is_truthy() {
            continue;
        }
        match index.get(&item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }

    // Stable sort keeps first-seen order among ties.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Like [`set_count`] but unwraps `Option` items, returning plain values.
pub fn set_count_present<T, I>(items: I) -> Vec<(T, u64)>
where
    I: IntoIterator<Item = Option<T>>,
    T: Truthy + Eq + Hash + Clone,
{
    set_count(items.into_iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_count() {
        let inventory = ["apple", "lemon", "apple", "orange", "lemon", "lemon"];
        assert_eq!(
            set_count(inventory),
            vec![("lemon", 3), ("apple", 2), ("orange", 1)]
        );
    }

    #[test]
    fn test_set_count_ignores_falsy() {
        let with_falsy = vec![
            Some("apple"),
            None,
            Some("lemon"),
            Some(""),
            Some("apple"),
            None,
            Some("lemon"),
            Some("lemon"),
            Some("orange"),
        ];
        let stripped = vec![
            Some("apple"),
            Some("lemon"),
            Some("apple"),
            Some("lemon"),
            Some("lemon"),
            Some("orange"),
        ];
        assert_eq!(set_count(with_falsy), set_count(stripped));
    }

    #[test]
    fn test_set_count_bools() {
        assert_eq!(set_count([false, true, false, true]), vec![(true, 2)]);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let items = ["b", "a", "c", "a", "b", "c"];
        assert_eq!(set_count(items), vec![("b", 2), ("a", 2), ("c", 2)]);
    }

    #[test]
    fn test_set_count_present() {
        let items = vec![Some("Firefox".to_string()), None, Some("Firefox".to_string())];
        assert_eq!(set_count_present(items), vec![("Firefox".to_string(), 2)]);
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<&str> = vec![];
        assert!(set_count(items).is_empty());
    }
}

// Navigable sorted set with its ordering fixed in the type

use std::cmp::Ordering;
use std::marker::PhantomData;

/// Ordering used by a [`SortedSet`].
pub trait SortOrder<T> {
    fn compare(a: &T, b: &T) -> Ordering;
}

/// `Ord` order
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

/// Reversed `Ord` order
#[derive(Debug, Clone, Copy, Default)]
pub struct Descending;

impl<T: Ord> SortOrder<T> for Natural {
    fn compare(a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

impl<T: Ord> SortOrder<T> for Descending {
    fn compare(a: &T, b: &T) -> Ordering {
        b.cmp(a)
    }
}

/// Set kept sorted by `O`, with floor/ceiling style lookups and slice views.
#[derive(Debug, Clone)]
pub struct SortedSet<T, O = Natural> {
    items: Vec<T>,
    _order: PhantomData<O>,
}

impl<T, O> Default for SortedSet<T, O> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            _order: PhantomData,
        }
    }
}

impl<T, O: SortOrder<T>> SortedSet<T, O> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, value: &T) -> Result<usize, usize> {
        self.items.binary_search_by(|probe| O::compare(probe, value))
    }

    /// Returns `false` if an equal element is already present.
    pub fn insert(&mut self, value: T) -> bool {
        match self.search(&value) {
            Ok(_) => false,
            Err(at) => {
                self.items.insert(at, value);
                true
            }
        }
    }

    pub fn remove(&mut self, value: &T) -> Option<T> {
        self.search(value).ok().map(|at| self.items.remove(at))
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.search(value).is_ok()
    }

    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn pop_first(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn pop_last(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Greatest element strictly before `value`.
    #[must_use]
    pub fn lower(&self, value: &T) -> Option<&T> {
        let at = self.search(value).unwrap_or_else(|at| at);
        at.checked_sub(1).map(|i| &self.items[i])
    }

    /// Greatest element at or before `value`.
    #[must_use]
    pub fn floor(&self, value: &T) -> Option<&T> {
        match self.search(value) {
            Ok(at) => Some(&self.items[at]),
            Err(at) => at.checked_sub(1).map(|i| &self.items[i]),
        }
    }

    /// Least element at or after `value`.
    #[must_use]
    pub fn ceiling(&self, value: &T) -> Option<&T> {
        let at = self.search(value).unwrap_or_else(|at| at);
        self.items.get(at)
    }

    /// Least element strictly after `value`.
    #[must_use]
    pub fn higher(&self, value: &T) -> Option<&T> {
        match self.search(value) {
            Ok(at) => self.items.get(at + 1),
            Err(at) => self.items.get(at),
        }
    }

    /// Elements before `to` (including it when `inclusive`).
    #[must_use]
    pub fn head(&self, to: &T, inclusive: bool) -> &[T] {
        &self.items[..self.bound(to, inclusive)]
    }

    /// Elements from `from` on (excluding it unless `inclusive`).
    #[must_use]
    pub fn tail(&self, from: &T, inclusive: bool) -> &[T] {
        &self.items[self.bound(from, !inclusive)..]
    }

    /// Index just past `value` when `past_equal`, else the index of the first element not before it.
    fn bound(&self, value: &T, past_equal: bool) -> usize {
        match self.search(value) {
            Ok(at) if past_equal => at + 1,
            Ok(at) | Err(at) => at,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T, O: SortOrder<T>> FromIterator<T> for SortedSet<T, O> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<'a, T, O: SortOrder<T>> IntoIterator for &'a SortedSet<T, O> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

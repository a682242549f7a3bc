//! Change-tracked values and lazily resolved state.
//!
//! # Responsibility
//! - Pair a current value with the baseline captured at last sync.
//! - Represent "not queried yet" separately from "queried, empty".
//!
//! # Invariants
//! - `Tracked::changed` compares by equality only; how many times a setter
//!   was called does not matter.
//! - `Loaded::Unknown` is never the same as `Loaded::Known` of an empty value.

/// Value with a last-synced baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    value: T,
    baseline: T,
}

impl<T: Clone + PartialEq> Tracked<T> {
    /// Creates a clean value (baseline equals current).
    pub fn new(value: T) -> Self {
        Self {
            baseline: value.clone(),
            value,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn baseline(&self) -> &T {
        &self.baseline
    }

    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }

    /// Returns whether the current value differs from the baseline.
    pub fn changed(&self) -> bool {
        self.value != self.baseline
    }

    /// Declares the current value as the new baseline.
    pub fn lock(&mut self) {
        self.baseline = self.value.clone();
    }
}

/// Lazily resolved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    /// Not resolved yet.
    Unknown,
    /// Resolved value (possibly empty).
    Known(T),
}

impl<T> Loaded<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            Self::Unknown => None,
            Self::Known(value) => Some(value),
        }
    }
}

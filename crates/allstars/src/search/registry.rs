//! Best-so-far bookkeeping.
//!
//! Both registries use the same compare-and-swap rule: an empty slot accepts
//! any offer, an occupied slot is replaced only by a strictly greater score.
//! Offers take `&mut self`, so concurrent use needs an outer lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::factory::Family;
use crate::search::candidate::CandidateModel;

#[derive(Debug, Clone)]
pub struct Champion<M> {
    pub score: f64,
    pub model: M,
}

/// Single best (score, model) pair.
#[derive(Debug, Clone)]
pub struct GlobalBest<M> {
    current: Option<Champion<M>>,
}

impl<M> Default for GlobalBest<M> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<M> GlobalBest<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the offer was accepted.
    pub fn offer(&mut self, score: f64, model: M) -> bool {
        let accept = self.current.as_ref().map_or(true, |c| score > c.score);
        if accept {
            self.current = Some(Champion { score, model });
        }
        accept
    }

    pub fn score(&self) -> Option<f64> {
        self.current.as_ref().map(|c| c.score)
    }

    pub fn model(&self) -> Option<&M> {
        self.current.as_ref().map(|c| &c.model)
    }

    pub fn get(&self) -> Option<&Champion<M>> {
        self.current.as_ref()
    }
}

/// Best candidate per estimator family.
#[derive(Debug, Default, Clone)]
pub struct BestModelRegistry {
    entries: BTreeMap<Family, Champion<Arc<CandidateModel>>>,
}

impl BestModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, family: Family, score: f64, model: Arc<CandidateModel>) -> bool {
        match self.entries.get(&family) {
            Some(current) if score <= current.score => false,
            _ => {
                self.entries.insert(family, Champion { score, model });
                true
            }
        }
    }

    pub fn get(&self, family: Family) -> Option<&Champion<Arc<CandidateModel>>> {
        self.entries.get(&family)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn families(&self) -> impl Iterator<Item = Family> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Family, &Champion<Arc<CandidateModel>>)> + '_ {
        self.entries.iter().map(|(f, c)| (*f, c))
    }

    pub fn scores(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(f, c)| (f.name().to_string(), c.score))
            .collect()
    }

    pub fn models(&self) -> BTreeMap<String, Arc<CandidateModel>> {
        self.entries
            .iter()
            .map(|(f, c)| (f.name().to_string(), Arc::clone(&c.model)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_best_only_moves_up() {
        let mut best = GlobalBest::new();
        assert!(best.offer(-530000.0, "first"));
        assert!(best.offer(0.5, "second"));
        assert!(!best.offer(0.5, "tie"));
        assert!(!best.offer(0.1, "worse"));
        assert_eq!(best.score(), Some(0.5));
        assert_eq!(best.model(), Some(&"second"));
    }

    #[test]
    fn nan_never_replaces_an_entry() {
        let mut best = GlobalBest::new();
        best.offer(0.2, 1);
        assert!(!best.offer(f64::NAN, 2));
        assert_eq!(best.model(), Some(&1));
    }
}

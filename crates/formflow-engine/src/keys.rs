//! Scoped random key generation
//!
//! Used-key bookkeeping lives in the generator instance, keyed by scope
//! (e.g. one scope per form being designed), so two sessions never share
//! state by accident.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::warn;

const DEFAULT_LENGTH: usize = 7;
const ALPHABET_SIZE: usize = 36;

/// Generates short random keys that are unique within a scope
pub struct KeyGenerator<R = rand::rngs::ThreadRng> {
    rng: R,
    length: usize,
    used: HashMap<String, HashSet<String>>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::with_rng(rand::thread_rng())
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> KeyGenerator<R> {
    /// Use a specific RNG (seeded RNGs give reproducible keys)
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            length: DEFAULT_LENGTH,
            used: HashMap::new(),
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.max(1);
        self
    }

    /// A new lowercase alphanumeric key not yet used in `scope`.
    ///
    /// `None` once every key of the configured length is taken.
    pub fn generate(&mut self, scope: &str) -> Option<String> {
        if self.taken_in_space(scope) >= self.capacity() {
            warn!(scope = %scope, length = self.length, "key space exhausted");
            return None;
        }
        loop {
            let key: String = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(self.length)
                .map(|b| char::from(b).to_ascii_lowercase())
                .collect();
            if self.reserve(scope, &key) {
                return Some(key);
            }
        }
    }

    /// Number of distinct keys of the configured length
    pub fn capacity(&self) -> usize {
        u32::try_from(self.length)
            .ok()
            .and_then(|length| ALPHABET_SIZE.checked_pow(length))
            .unwrap_or(usize::MAX)
    }

    /// Used keys that `generate` could have produced
    fn taken_in_space(&self, scope: &str) -> usize {
        self.used.get(scope).map_or(0, |keys| {
            keys.iter()
                .filter(|k| k.len() == self.length && k.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
                .count()
        })
    }

    /// Mark an externally chosen key as used; false if it already was
    pub fn reserve(&mut self, scope: &str, key: &str) -> bool {
        self.used.entry(scope.to_string()).or_default().insert(key.to_string())
    }

    pub fn is_used(&self, scope: &str, key: &str) -> bool {
        self.used.get(scope).map_or(false, |keys| keys.contains(key))
    }

    /// Forget every key of a scope
    pub fn release_scope(&mut self, scope: &str) {
        self.used.remove(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_keys_unique_within_scope() {
        let mut keys = KeyGenerator::new().with_length(2);
        let generated: HashSet<String> = (0..200).filter_map(|_| keys.generate("form-a")).collect();
        assert_eq!(generated.len(), 200);
        assert!(generated.iter().all(|k| k.len() == 2 && k.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())));
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut keys = KeyGenerator::new();
        assert!(keys.reserve("a", "taken"));
        assert!(!keys.reserve("a", "taken"));
        assert!(keys.reserve("b", "taken"));
        keys.release_scope("a");
        assert!(!keys.is_used("a", "taken"));
        assert!(keys.is_used("b", "taken"));
    }

    #[test]
    fn test_exhausted_scope_returns_none() {
        let mut keys = KeyGenerator::with_rng(StdRng::seed_from_u64(3)).with_length(1);
        assert_eq!(keys.capacity(), 36);
        let generated: HashSet<String> = (0..36).filter_map(|_| keys.generate("tiny")).collect();
        assert_eq!(generated.len(), 36);
        assert_eq!(keys.generate("tiny"), None);
        // other scopes are unaffected
        assert!(keys.generate("other").is_some());
    }

    #[test]
    fn test_foreign_reserved_keys_do_not_shrink_space() {
        let mut keys = KeyGenerator::with_rng(StdRng::seed_from_u64(5)).with_length(1);
        keys.reserve("s", "Not-A-Key");
        let generated = (0..36).filter_map(|_| keys.generate("s")).count();
        assert_eq!(generated, 36);
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = KeyGenerator::with_rng(StdRng::seed_from_u64(7));
        let mut b = KeyGenerator::with_rng(StdRng::seed_from_u64(7));
        assert_eq!(a.generate("s"), b.generate("s"));
    }

    #[test]
    fn test_separate_generators_share_nothing() {
        let mut a = KeyGenerator::with_rng(StdRng::seed_from_u64(1));
        let mut b = KeyGenerator::with_rng(StdRng::seed_from_u64(1));
        let key = a.generate("s").unwrap();
        assert!(!b.is_used("s", &key));
    }
}

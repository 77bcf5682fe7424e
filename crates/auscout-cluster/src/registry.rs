//! Shard id allocation

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;

/// Number of assignable shard ids; 0xFF is the failure sentinel
pub const MAX_SHARDS: usize = 255;

#[derive(Debug)]
struct RegistryState {
    taken: [bool; MAX_SHARDS],
    active: usize,
}

/// Ids handed out to shards, lowest free first
#[derive(Debug)]
pub struct ShardRegistry {
    state: Mutex<RegistryState>,
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                taken: [false; MAX_SHARDS],
                active: 0,
            }),
        }
    }

    /// Claim the lowest free id, or `None` when all are taken
    pub fn register(&self) -> Option<u8> {
        let mut state = self.state.lock();
        let id = state.taken.iter().position(|t| !t)?;
        state.taken[id] = true;
        state.active += 1;
        Some(id as u8)
    }

    /// Release `id`; returns false when it was not taken
    pub fn deregister(&self, id: u8) -> bool {
        let mut state = self.state.lock();
        match state.taken.get_mut(id as usize) {
            Some(taken) if *taken => {
                *taken = false;
                state.active -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, id: u8) -> bool {
        self.state
            .lock()
            .taken
            .get(id as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    pub fn active_ids(&self) -> Vec<u8> {
        let state = self.state.lock();
        (0..MAX_SHARDS)
            .filter(|&i| state.taken[i])
            .map(|i| i as u8)
            .collect()
    }

    /// Random active shard using `rng`
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u8> {
        self.active_ids().choose(rng).copied()
    }

    /// Random active shard to receive a submission
    pub fn select(&self) -> Option<u8> {
        self.select_with(&mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_lowest_free_id_and_reuse() {
        let registry = ShardRegistry::new();
        assert_eq!(registry.register(), Some(0));
        assert_eq!(registry.register(), Some(1));
        assert_eq!(registry.register(), Some(2));
        assert!(registry.deregister(1));
        assert!(!registry.deregister(1));
        assert_eq!(registry.active_count(), 2);
        assert_eq!(registry.register(), Some(1));
        assert_eq!(registry.active_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_full_registry_fails_without_blocking() {
        let registry = ShardRegistry::new();
        for expected in 0..MAX_SHARDS {
            assert_eq!(registry.register(), Some(expected as u8));
        }
        assert_eq!(registry.register(), None);
        assert_eq!(registry.active_count(), MAX_SHARDS);
        assert!(!registry.deregister(0xFF));
    }

    #[test]
    fn test_select_only_active() {
        let registry = ShardRegistry::new();
        assert_eq!(registry.select(), None);

        for _ in 0..4 {
            registry.register();
        }
        registry.deregister(2);

        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let id = registry.select_with(&mut rng).unwrap();
            assert!(id != 2 && id < 4);
            assert!(registry.is_active(id));
        }
    }
}

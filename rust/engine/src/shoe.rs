use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::cards::{full_deck, Card};

/// Deterministic card shoe used by locally-simulated rounds.
///
/// The authoritative ledger draws its own cards; this shoe exists so the
/// mock ledger and dealer previews are reproducible under a fixed seed.
/// The shoe reshuffles a fresh deck automatically when exhausted.
#[derive(Debug)]
pub struct Shoe {
    cards: Vec<Card>,
    position: usize,
    rng: ChaCha20Rng,
}

impl Shoe {
    pub fn new_with_seed(seed: u64) -> Self {
        let mut shoe = Self {
            cards: full_deck(),
            position: 0,
            rng: ChaCha20Rng::seed_from_u64(seed),
        };
        shoe.shuffle();
        shoe
    }

    pub fn shuffle(&mut self) {
        self.cards = full_deck();
        self.cards.shuffle(&mut self.rng);
        self.position = 0;
    }

    /// Draws the next card, reshuffling first if the shoe is exhausted.
    pub fn draw(&mut self) -> Card {
        if self.position >= self.cards.len() {
            self.shuffle();
        }
        let c = self.cards[self.position];
        self.position += 1;
        c
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_seed_produces_same_order() {
        let mut a = Shoe::new_with_seed(42);
        let mut b = Shoe::new_with_seed(42);
        for _ in 0..52 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn one_pass_deals_every_card_once() {
        let mut shoe = Shoe::new_with_seed(7);
        let mut seen = HashSet::new();
        for _ in 0..52 {
            assert!(seen.insert(shoe.draw()));
        }
        assert_eq!(shoe.remaining(), 0);
    }

    #[test]
    fn exhausted_shoe_reshuffles() {
        let mut shoe = Shoe::new_with_seed(7);
        for _ in 0..52 {
            shoe.draw();
        }
        // 53rd draw comes from a fresh deck rather than panicking.
        let _ = shoe.draw();
        assert_eq!(shoe.remaining(), 51);
    }
}

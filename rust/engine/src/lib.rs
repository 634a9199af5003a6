//! # chainjack-engine: Blackjack Rules Core
//!
//! A pure, deterministic blackjack rules library shared by the sync client
//! and by the in-memory mock ledger. Hand scoring mirrors the rules the
//! on-ledger game enforces, so the client can evaluate and preview hands
//! locally without a round-trip.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and the numeric
//!   wire encoding used across the ledger boundary
//! - [`hand`] - Hand scoring with soft-ace reduction, bust/natural
//!   classification, and the dealer draw rule
//! - [`shoe`] - Deterministic card shoe with ChaCha20 RNG for simulated
//!   rounds
//! - [`amount`] - Bet amounts in ledger base units and their display form
//!
//! ## Quick Start
//!
//! ```rust
//! use chainjack_engine::cards::{Card, Rank, Suit};
//! use chainjack_engine::hand::{score, is_natural};
//!
//! let hand = [
//!     Card { suit: Suit::Spades, rank: Rank::Ace },
//!     Card { suit: Suit::Hearts, rank: Rank::King },
//! ];
//!
//! assert_eq!(score(&hand), 21);
//! assert!(is_natural(&hand));
//! ```

pub mod amount;
pub mod cards;
pub mod hand;
pub mod shoe;

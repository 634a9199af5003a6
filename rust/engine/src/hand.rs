use crate::cards::{Card, Rank};

/// Target total; anything above is a bust.
pub const BLACKJACK: u32 = 21;

/// The dealer stands on any total of 17 or more, hard or soft.
pub const DEALER_STAND_MIN: u32 = 17;

/// Scores a hand under standard blackjack soft-ace rules.
///
/// Every ace starts at 11; while the total exceeds 21 and a soft ace
/// remains, one ace is reduced to 1. The result is the minimal total not
/// exceeding 21 when such an assignment exists, otherwise the minimal
/// possible total. An empty hand scores 0.
pub fn score(hand: &[Card]) -> u32 {
    let mut total = 0u32;
    let mut soft_aces = 0u32;

    for card in hand {
        total += card.rank.pip_value();
        if card.rank == Rank::Ace {
            soft_aces += 1;
        }
    }

    while total > BLACKJACK && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }

    total
}

pub fn is_bust(hand: &[Card]) -> bool {
    score(hand) > BLACKJACK
}

/// A natural: exactly two cards totalling 21.
pub fn is_natural(hand: &[Card]) -> bool {
    hand.len() == 2 && score(hand) == BLACKJACK
}

/// Dealer auto-play rule: draw while below 17, stand on any 17+.
///
/// The ledger executes this rule authoritatively; the client reproduces
/// it for locally-simulated rounds and previews.
pub fn dealer_should_draw(dealer_hand: &[Card]) -> bool {
    score(dealer_hand) < DEALER_STAND_MIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    fn card(rank: Rank) -> Card {
        Card {
            suit: Suit::Clubs,
            rank,
        }
    }

    #[test]
    fn empty_hand_scores_zero() {
        assert_eq!(score(&[]), 0);
        assert!(!is_bust(&[]));
        assert!(!is_natural(&[]));
    }

    #[test]
    fn ace_king_is_a_natural_21() {
        let hand = [card(Rank::Ace), card(Rank::King)];
        assert_eq!(score(&hand), 21);
        assert!(is_natural(&hand));
        assert!(!is_bust(&hand));
    }

    #[test]
    fn two_aces_and_nine_uses_one_soft_ace() {
        // A + A + 9: one ace stays 11, the other drops to 1.
        let hand = [card(Rank::Ace), card(Rank::Ace), card(Rank::Nine)];
        assert_eq!(score(&hand), 21);
        assert!(!is_natural(&hand), "three cards can never be a natural");
    }

    #[test]
    fn all_aces_reduce_until_under_21() {
        let hand = [card(Rank::Ace); 4];
        // 11 + 1 + 1 + 1
        assert_eq!(score(&hand), 14);
    }

    #[test]
    fn face_cards_count_ten() {
        let hand = [card(Rank::Jack), card(Rank::Queen), card(Rank::King)];
        assert_eq!(score(&hand), 30);
        assert!(is_bust(&hand));
    }

    #[test]
    fn twenty_one_with_three_cards_is_not_natural() {
        let hand = [card(Rank::Seven), card(Rank::Seven), card(Rank::Seven)];
        assert_eq!(score(&hand), 21);
        assert!(!is_natural(&hand));
    }

    #[test]
    fn dealer_draws_on_sixteen_and_stands_on_seventeen() {
        let sixteen = [card(Rank::Six), card(Rank::Ten)];
        assert_eq!(score(&sixteen), 16);
        assert!(dealer_should_draw(&sixteen));

        let seventeen = [card(Rank::Seven), card(Rank::Ten)];
        assert!(!dealer_should_draw(&seventeen));
    }

    #[test]
    fn dealer_stands_on_soft_seventeen() {
        let soft_17 = [card(Rank::Ace), card(Rank::Six)];
        assert_eq!(score(&soft_17), 17);
        assert!(!dealer_should_draw(&soft_17));
    }

    #[test]
    fn score_stays_at_or_below_21_whenever_an_assignment_exists() {
        // Exhaustive check over hands of up to 4 aces plus one other card:
        // if assigning aces 1 or 11 can keep the sum <= 21, score() finds it.
        use crate::cards::all_ranks;
        for other in all_ranks() {
            for aces in 0..=4usize {
                let mut hand = vec![card(other)];
                for _ in 0..aces {
                    hand.push(card(Rank::Ace));
                }

                let hard_sum: u32 = hand
                    .iter()
                    .map(|c| match c.rank {
                        Rank::Ace => 1,
                        r => r.pip_value(),
                    })
                    .sum();

                let s = score(&hand);
                if hard_sum <= 21 {
                    assert!(s <= 21, "hand {hand:?} scored {s}");
                } else {
                    assert_eq!(s, hard_sum);
                }
            }
        }
    }
}

//! # Round Resolution
//!
//! Deciding a round and picking the computer's move.

use rand::Rng;

use crate::domain::{Choice, Outcome};

/// Outcome for the player given both moves.
pub fn resolve_outcome(player: Choice, computer: Choice) -> Outcome {
    if player == computer {
        Outcome::Draw
    } else if player.beats() == computer {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}

/// Uniformly random computer move from the given generator.
pub fn computer_choice<R: Rng + ?Sized>(rng: &mut R) -> Choice {
    Choice::ALL[rng.gen_range(0..Choice::ALL.len())]
}

/// Uniformly random computer move from the thread-local generator.
pub fn random_computer_choice() -> Choice {
    computer_choice(&mut rand::thread_rng())
}

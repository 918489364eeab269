/// Starting Elo rating for players new to the ladder
pub const DEFAULT_RATING: i32 = 1000;

/// K-factor for Elo calculation
const K: f64 = 32.0;

/// Outcome of a match from one player's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Win,
    Draw,
    Loss,
}

impl MatchOutcome {
    /// Numeric score used by the Elo formula.
    pub fn score(self) -> f64 {
        match self {
            MatchOutcome::Win => 1.0,
            MatchOutcome::Draw => 0.5,
            MatchOutcome::Loss => 0.0,
        }
    }

    /// The same result seen from the other side of the table.
    pub fn flipped(self) -> MatchOutcome {
        match self {
            MatchOutcome::Win => MatchOutcome::Loss,
            MatchOutcome::Draw => MatchOutcome::Draw,
            MatchOutcome::Loss => MatchOutcome::Win,
        }
    }
}

/// Signed rating delta for `player_rating` after a match against
/// `opponent_rating` ending in `outcome`.
pub fn elo_delta(player_rating: i32, opponent_rating: i32, outcome: MatchOutcome) -> i32 {
    let expected =
        1.0 / (1.0 + 10f64.powf((opponent_rating - player_rating) as f64 / 400.0));
    (K * (outcome.score() - expected)).round() as i32
}

/// Apply a delta to a rating. Ratings never drop below zero.
pub fn apply_delta(rating: i32, delta: i32) -> i32 {
    (rating + delta).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_win() {
        assert_eq!(elo_delta(1000, 1000, MatchOutcome::Win), 16);
    }

    #[test]
    fn equal_ratings_loss() {
        assert_eq!(elo_delta(1000, 1000, MatchOutcome::Loss), -16);
    }

    #[test]
    fn equal_ratings_draw() {
        assert_eq!(elo_delta(1500, 1500, MatchOutcome::Draw), 0);
    }

    #[test]
    fn underdog_gains_more() {
        let underdog = elo_delta(1000, 1400, MatchOutcome::Win);
        let favorite = elo_delta(1400, 1000, MatchOutcome::Win);
        assert!(underdog > 16);
        assert!(favorite < 16);
    }

    #[test]
    fn deltas_sum_to_zero() {
        for (a, b) in [(1000, 1000), (1234, 987), (1800, 200)] {
            for outcome in [MatchOutcome::Win, MatchOutcome::Draw, MatchOutcome::Loss] {
                let d1 = elo_delta(a, b, outcome);
                let d2 = elo_delta(b, a, outcome.flipped());
                assert_eq!(d1 + d2, 0, "ratings {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn rating_floors_at_zero() {
        assert_eq!(apply_delta(10, -16), 0);
        assert_eq!(apply_delta(1000, -16), 984);
    }
}

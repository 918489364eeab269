//! Winner selection for a finished typing test.

const WPM_WEIGHT: f64 = 0.8;
const ACCURACY_WEIGHT: f64 = 0.2;

/// Which side of a match a value refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Player1,
    Player2,
}

/// Composite performance score for a finished test.
pub fn final_score(wpm: f64, accuracy: f64) -> f64 {
    WPM_WEIGHT * wpm + ACCURACY_WEIGHT * accuracy
}

/// Winner between two composite scores. Exact ties are a draw.
pub fn pick_winner(score1: f64, score2: f64) -> Option<Side> {
    if score1 > score2 {
        Some(Side::Player1)
    } else if score2 > score1 {
        Some(Side::Player2)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_weights() {
        assert_eq!(final_score(50.0, 90.0), 58.0);
        assert_eq!(final_score(70.0, 97.0), 75.4);
    }

    #[test]
    fn higher_score_wins() {
        let a = final_score(80.0, 95.0);
        let b = final_score(70.0, 97.0);
        assert_eq!(pick_winner(a, b), Some(Side::Player1));
        assert_eq!(pick_winner(b, a), Some(Side::Player2));
    }

    #[test]
    fn equal_scores_draw() {
        let s = final_score(50.0, 90.0);
        assert_eq!(pick_winner(s, s), None);
    }

    #[test]
    fn accuracy_breaks_equal_speed() {
        let sloppy = final_score(60.0, 80.0);
        let clean = final_score(60.0, 99.0);
        assert_eq!(pick_winner(clean, sloppy), Some(Side::Player1));
    }
}

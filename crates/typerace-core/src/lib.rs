pub mod elo;
pub mod models;
pub mod protocol;
pub mod score;

pub use elo::{apply_delta, elo_delta, MatchOutcome, DEFAULT_RATING};
pub use models::{Match, MatchStatus, Ranking};
pub use protocol::{ClientEvent, ServerEvent};

//! Golf-day team scores
//!
//! A second, much simpler board living next to the auction: one row per team
//! with a gross score and a handicap. Net score and score to par are derived.
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod normalize;
pub mod scoring;

pub type ScoreId = String;
pub type ScoreIdRef<'s> = &'s str;
pub type GrossScore = u32;

/// Lowest gross score a round of golf can plausibly have
pub const MIN_GROSS_SCORE: GrossScore = 18;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GolfScore {
    pub id: ScoreId,
    pub team_name: String,
    /// `None` until the team has handed in a card
    pub gross_score: Option<GrossScore>,
    pub handicap: f64,
    pub net_score: Option<f64>,
    pub to_par: Option<f64>,
}

/// A score handed in for a team
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScoreSubmission {
    pub team_name: String,
    pub gross_score: GrossScore,
    /// Required for a team the store doesn't know yet
    #[serde(default)]
    pub handicap: Option<f64>,
}

/// A team row to create
#[derive(Clone, Debug, PartialEq)]
pub struct NewGolfScore {
    pub team_name: String,
    pub gross_score: GrossScore,
    pub handicap: f64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreRejection {
    #[error("Please select a team")]
    MissingTeam,
    #[error("Please enter a valid gross score (minimum 18)")]
    InvalidGrossScore,
    #[error("Please enter a valid handicap")]
    InvalidHandicap,
    #[error("Team '{team}' not found. Available teams: {available}")]
    UnknownTeam { team: String, available: String },
}

pub fn validate_submission(submission: &ScoreSubmission) -> Result<(), ScoreRejection> {
    if submission.team_name.trim().is_empty() {
        return Err(ScoreRejection::MissingTeam);
    }
    if submission.gross_score < MIN_GROSS_SCORE {
        return Err(ScoreRejection::InvalidGrossScore);
    }
    if let Some(handicap) = submission.handicap {
        if !handicap.is_finite() || handicap < 0.0 {
            return Err(ScoreRejection::InvalidHandicap);
        }
    }
    Ok(())
}

/// Find the row of `team_name`: exact match first, then ignoring case
pub fn find_team<'a>(scores: &'a [GolfScore], team_name: &str) -> Option<&'a GolfScore> {
    let team_name = team_name.trim();
    scores
        .iter()
        .find(|score| score.team_name == team_name)
        .or_else(|| {
            let lowered = team_name.to_lowercase();
            scores
                .iter()
                .find(|score| score.team_name.to_lowercase() == lowered)
        })
}

/// Distinct team names, alphabetically
pub fn team_names(scores: &[GolfScore]) -> Vec<String> {
    let mut names: Vec<String> = scores.iter().map(|s| s.team_name.clone()).collect();
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    names.dedup();
    names
}

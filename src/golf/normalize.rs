//! Golf score row normalization
//!
//! Same rules as item records: loose JSON in, canonical [`GolfScore`] out.
//! Derived columns are recomputed when the row doesn't carry them.
use super::{scoring, GolfScore, GrossScore};
use crate::auction::normalize::{number, text};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGolfScore {
    pub id: Option<Value>,
    #[serde(alias = "teamName")]
    pub team_name: Option<Value>,
    #[serde(alias = "grossScore")]
    pub gross_score: Option<Value>,
    pub handicap: Option<Value>,
    #[serde(alias = "netScore")]
    pub net_score: Option<Value>,
}

impl From<&GolfScore> for RawGolfScore {
    fn from(score: &GolfScore) -> Self {
        Self {
            id: Some(Value::from(score.id.clone())),
            team_name: Some(Value::from(score.team_name.clone())),
            gross_score: score.gross_score.map(Value::from),
            handicap: Some(Value::from(score.handicap)),
            net_score: score.net_score.map(Value::from),
        }
    }
}

/// `None` for rows without an id or a team name
pub fn normalize_score(raw: RawGolfScore) -> Option<GolfScore> {
    let id = text(&raw.id)?;
    let team_name = text(&raw.team_name)?;
    let gross_score = number(&raw.gross_score)
        .map(f64::round)
        .filter(|g| *g <= f64::from(GrossScore::MAX))
        .map(|g| g as GrossScore);
    let handicap = number(&raw.handicap).unwrap_or(0.0);
    let net_score = number(&raw.net_score)
        .or_else(|| gross_score.map(|gross| scoring::net_score(gross, handicap)));

    Some(GolfScore {
        id,
        team_name,
        gross_score,
        handicap,
        net_score,
        to_par: net_score.map(scoring::score_to_par),
    })
}

pub fn normalize_scores(raws: Vec<RawGolfScore>) -> Vec<GolfScore> {
    raws.into_iter()
        .filter_map(|raw| {
            let score = normalize_score(raw.clone());
            if score.is_none() {
                tracing::warn!(record = ?raw, "dropping golf score row without id or team");
            }
            score
        })
        .collect()
}

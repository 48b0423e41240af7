use super::{GolfScore, GrossScore};
use std::cmp::Ordering;

/// Par of the course the golf day is played on
pub const COURSE_PAR: f64 = 69.0;

fn tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Gross score minus handicap, to one decimal
pub fn net_score(gross: GrossScore, handicap: f64) -> f64 {
    tenths(f64::from(gross) - handicap)
}

pub fn score_to_par(net: f64) -> f64 {
    tenths(net - COURSE_PAR)
}

/// `E` at par, signed otherwise
pub fn to_par_label(to_par: f64) -> String {
    if to_par == 0.0 {
        "E".to_owned()
    } else if to_par > 0.0 {
        format!("+{to_par}")
    } else {
        format!("{to_par}")
    }
}

/// Display order: lowest net first, ties by team name; teams without a net
/// score trail in the order they came
pub fn leaderboard(scores: Vec<GolfScore>) -> Vec<GolfScore> {
    let (mut scored, unscored): (Vec<_>, Vec<_>) =
        scores.into_iter().partition(|s| s.net_score.is_some());

    scored.sort_by(|a, b| {
        let by_net = match (a.net_score, b.net_score) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        };
        by_net.then_with(|| a.team_name.to_lowercase().cmp(&b.team_name.to_lowercase()))
    });
    scored.extend(unscored);
    scored
}

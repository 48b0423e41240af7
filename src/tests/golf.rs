use super::*;
use crate::{
    golf::{
        find_team,
        normalize::{normalize_score, normalize_scores, RawGolfScore},
        scoring::{leaderboard, net_score, score_to_par, to_par_label},
        team_names, validate_submission, GolfScore, ScoreRejection, ScoreSubmission,
    },
    service::{ConnectionState, LoopService, ScoreError},
    store::{AuctionStore, ChangeEvent, ChangeKind, ScorePatch, StoreError, StoreNotice},
};
use serde_json::json;

fn team(id: &str, name: &str, gross: Option<u32>, handicap: f64) -> GolfScore {
    let net_score = gross.map(|g| net_score(g, handicap));
    GolfScore {
        id: id.to_owned(),
        team_name: name.to_owned(),
        gross_score: gross,
        handicap,
        net_score,
        to_par: net_score.map(score_to_par),
    }
}

fn card(name: &str, gross: u32, handicap: Option<f64>) -> ScoreSubmission {
    ScoreSubmission {
        team_name: name.to_owned(),
        gross_score: gross,
        handicap,
    }
}

fn golf_harness(scores: &[GolfScore]) -> Result<Harness> {
    let store = Arc::new(InMemoryAuctionStore::new());
    store.seed_golf(scores);
    let ctx = AuctionContext::new(store.clone(), InMemoryPhaseStore::new_shared());
    ctx.init()?;
    Ok(Harness { store, ctx })
}

#[test]
fn net_and_to_par_round_to_tenths() -> Result<()> {
    assert_eq!(net_score(78, 10.5), 67.5);
    assert_eq!(score_to_par(67.5), -1.5);
    assert_eq!(net_score(80, 12.33), 67.7);
    assert_eq!(score_to_par(net_score(72, 0.0)), 3.0);

    assert_eq!(to_par_label(0.0), "E");
    assert_eq!(to_par_label(3.0), "+3");
    assert_eq!(to_par_label(-1.5), "-1.5");
    Ok(())
}

#[test]
fn leaderboard_puts_lowest_net_first_and_incomplete_last() -> Result<()> {
    let board = leaderboard(vec![
        team("1", "Eagles", None, 4.0),
        team("2", "birdies", Some(75), 6.0),
        team("3", "Albatross", Some(71), 2.0),
        team("4", "Bogeys", Some(80), 3.0),
        team("5", "Condors", None, 0.0),
    ]);

    let names: Vec<_> = board.iter().map(|s| s.team_name.as_str()).collect();
    // Albatross and birdies tie on 69.0; case is ignored between them
    assert_eq!(names, vec!["Albatross", "birdies", "Bogeys", "Eagles", "Condors"]);
    Ok(())
}

#[test]
fn rows_are_normalized_and_unusable_ones_dropped() -> Result<()> {
    let raw = |value: serde_json::Value| -> Result<RawGolfScore> { Ok(serde_json::from_value(value)?) };

    let scores = normalize_scores(vec![
        raw(json!({ "id": 7, "teamName": "Fairway Five", "grossScore": "81", "handicap": "9.5" }))?,
        raw(json!({ "id": "8", "team_name": "Sand Traps", "handicap": null }))?,
        raw(json!({ "team_name": "No Id", "gross_score": 70 }))?,
        raw(json!({ "id": "9", "gross_score": 70 }))?,
    ]);

    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].id, "7");
    assert_eq!(scores[0].gross_score, Some(81));
    assert_eq!(scores[0].net_score, Some(71.5));
    assert_eq!(scores[0].to_par, Some(2.5));
    assert_eq!(scores[1].gross_score, None);
    assert_eq!(scores[1].handicap, 0.0);
    assert_eq!(scores[1].net_score, None);

    // a stored net score wins over recomputing it
    let stored = normalize_score(raw(json!({
        "id": "1", "team_name": "Greens", "gross_score": 70, "handicap": 1, "net_score": 68.5
    }))?);
    assert_eq!(stored.and_then(|s| s.net_score), Some(68.5));
    Ok(())
}

#[test]
fn submissions_are_checked_before_any_lookup() -> Result<()> {
    assert_eq!(validate_submission(&card("  ", 80, None)), Err(ScoreRejection::MissingTeam));
    assert_eq!(
        validate_submission(&card("Greens", 17, None)),
        Err(ScoreRejection::InvalidGrossScore)
    );
    assert_eq!(
        validate_submission(&card("Greens", 80, Some(-1.0))),
        Err(ScoreRejection::InvalidHandicap)
    );
    assert_eq!(
        validate_submission(&card("Greens", 80, Some(f64::NAN))),
        Err(ScoreRejection::InvalidHandicap)
    );
    assert_eq!(validate_submission(&card("Greens", 18, Some(0.0))), Ok(()));
    Ok(())
}

#[test]
fn teams_match_exactly_before_ignoring_case() -> Result<()> {
    let scores = vec![
        team("1", "greens", None, 0.0),
        team("2", "Greens", None, 0.0),
        team("3", "Bunkers", None, 0.0),
    ];

    assert_eq!(find_team(&scores, "Greens").map(|s| s.id.as_str()), Some("2"));
    assert_eq!(find_team(&scores, " bunkers ").map(|s| s.id.as_str()), Some("3"));
    assert_eq!(find_team(&scores, "Rough"), None);
    assert_eq!(team_names(&scores), vec!["Bunkers", "Greens", "greens"]);
    Ok(())
}

#[test]
fn score_for_a_known_team_updates_its_row() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", None, 8.0), team("t2", "Bunkers", Some(74), 0.0)])?;
    assert_eq!(h.ctx.scores.len(), 2);

    let saved = h.ctx.score_keeper().submit(card("greens", 79, None))?;

    assert_eq!(saved.id, "t1");
    assert_eq!(saved.gross_score, Some(79));
    assert_eq!(saved.handicap, 8.0);
    assert_eq!(saved.net_score, Some(71.0));
    let board = leaderboard(h.ctx.scores.all());
    assert_eq!(board[0].team_name, "Greens");
    assert_eq!(board[0].to_par, Some(2.0));
    Ok(())
}

#[test]
fn unknown_team_is_added_only_with_a_handicap() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", None, 8.0), team("t2", "Bunkers", None, 0.0)])?;
    let keeper = h.ctx.score_keeper();

    let err = keeper.submit(card("Rough Riders", 90, None)).unwrap_err();
    assert_eq!(
        err,
        ScoreError::Rejected(ScoreRejection::UnknownTeam {
            team: "Rough Riders".to_owned(),
            available: "Bunkers, Greens".to_owned(),
        })
    );
    assert!(err.user_message().contains("Available teams: Bunkers, Greens"));

    let added = keeper.submit(card("Rough Riders", 90, Some(14.2)))?;
    assert_eq!(added.team_name, "Rough Riders");
    assert_eq!(added.net_score, Some(75.8));
    assert_eq!(h.ctx.scores.len(), 3);
    Ok(())
}

#[test]
fn offline_store_fails_the_submission_and_disconnects() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", None, 8.0)])?;
    h.store.set_offline(true);

    let err = h.ctx.score_keeper().submit(card("Greens", 80, None)).unwrap_err();

    assert!(matches!(err, ScoreError::Store(StoreError::Unreachable(_))));
    assert_eq!(err.user_message(), "Failed to save score to database. Please try again.");
    assert_eq!(h.ctx.connection.state(), ConnectionState::Disconnected);
    Ok(())
}

#[test]
fn follower_reloads_board_on_other_clients_scores() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", None, 8.0)])?;
    let mut follower = h.ctx.golf_follower(POLL);
    let generation = h.ctx.scores.generation();

    h.store.update_golf_score(
        "t1",
        &ScorePatch {
            gross_score: 77,
            handicap: None,
        },
    )?;
    // subscription status, then the change
    follower.run_iteration()?;
    follower.run_iteration()?;

    assert!(h.ctx.scores.generation() > generation);
    assert_eq!(h.ctx.scores.all()[0].net_score, Some(69.0));
    assert_eq!(h.ctx.scores.all()[0].to_par, Some(0.0));
    Ok(())
}

#[test]
fn follower_survives_records_it_cannot_read() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", Some(70), 1.0)])?;
    let mut follower = h.ctx.golf_follower(POLL);
    follower.run_iteration()?; // subscribed

    h.store.broadcast(StoreNotice::Change(ChangeEvent {
        kind: ChangeKind::Update,
        new_record: json!("not a row"),
    }));
    follower.run_iteration()?;

    assert!(h.ctx.score_subscription.is_installed());
    assert_eq!(h.ctx.connection.state(), ConnectionState::Connected);
    assert_eq!(h.ctx.scores.len(), 1);
    Ok(())
}

#[test]
fn item_changes_leave_the_golf_board_alone() -> Result<()> {
    let h = golf_harness(&[team("t1", "Greens", Some(70), 1.0)])?;
    h.store.seed(&[item("A", 100, 50)]);
    let mut follower = h.ctx.golf_follower(POLL);
    follower.run_iteration()?; // subscribed
    let generation = h.ctx.scores.generation();

    h.store.update(
        "A",
        &crate::store::BidPatch {
            current_bid: 120,
            high_bidder: "Alice".to_owned(),
            table_number: 4,
            updated_at: chrono::Utc::now(),
        },
    )?;
    follower.run_iteration()?;

    assert_eq!(h.ctx.scores.generation(), generation);
    Ok(())
}

//! HTTP surface for bidders and the auction operator
use super::{BidError, LoopService, ScoreError};
use crate::{
    auction::{
        validate::Rejection, AuctionItem, BidAttempt, BidHistoryRecord, BidderContext, ItemId,
        TableNumber,
    },
    context::SharedContext,
    golf::{
        scoring::{self, to_par_label},
        team_names, GolfScore, ScoreRejection, ScoreSubmission,
    },
    phase::{current_phase, AuctionPhase},
    render::leaderboard,
    service::ConnectionState,
    store::StoreError,
};
use anyhow::{format_err, Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{runtime::Runtime, sync::oneshot};
use tracing::{error, info};

pub struct Ui {
    // cancels all tasks on drop
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

#[derive(Serialize)]
pub(crate) struct BoardRow {
    pub rank: usize,
    pub leader: String,
    #[serde(flatten)]
    pub item: AuctionItem,
}

#[derive(Serialize)]
pub(crate) struct Board {
    pub generation: u64,
    pub connected: bool,
    pub items: Vec<BoardRow>,
}

#[derive(Serialize)]
pub(crate) struct GolfRow {
    pub position: usize,
    /// `E`, `+3`, `-1.5`; absent until the team has a net score
    pub to_par_label: Option<String>,
    #[serde(flatten)]
    pub score: GolfScore,
}

#[derive(Serialize)]
pub(crate) struct GolfBoard {
    pub generation: u64,
    pub connected: bool,
    pub teams: Vec<GolfRow>,
}

#[derive(Deserialize)]
pub(crate) struct BidRequest {
    pub amount: f64,
    pub bidder_name: String,
    pub table_number: TableNumber,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct StatusBody {
    #[serde(rename = "auctionStatus")]
    pub auction_status: AuctionPhase,
}

#[derive(Serialize)]
struct Health {
    connected: bool,
    items: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub(crate) struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        error!(error = %e, "request handler failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal error".to_owned(),
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_connectivity() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<BidError> for ApiError {
    fn from(e: BidError) -> Self {
        let status = match &e {
            BidError::Rejected(Rejection::ItemNotFound(_)) => StatusCode::NOT_FOUND,
            BidError::Rejected(Rejection::AuctionPaused | Rejection::AuctionNotStarted) => {
                StatusCode::CONFLICT
            }
            BidError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BidError::Store(e) => store_status(e),
        };
        Self {
            status,
            message: e.user_message(),
        }
    }
}

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        let status = match &e {
            ScoreError::Rejected(ScoreRejection::UnknownTeam { .. }) => StatusCode::NOT_FOUND,
            ScoreError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScoreError::Store(e) => store_status(e),
        };
        Self {
            status,
            message: e.user_message(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        BidError::Store(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub(crate) fn board(ctx: &SharedContext) -> Board {
    Board {
        generation: ctx.render.generation(),
        connected: ctx.connection.is_connected(),
        items: leaderboard(ctx.cache.all())
            .into_iter()
            .enumerate()
            .map(|(i, item)| BoardRow {
                rank: i + 1,
                leader: item.leading_label(),
                item,
            })
            .collect(),
    }
}

pub(crate) fn golf_board(ctx: &SharedContext) -> GolfBoard {
    GolfBoard {
        generation: ctx.scores.generation(),
        connected: ctx.connection.is_connected(),
        teams: scoring::leaderboard(ctx.scores.all())
            .into_iter()
            .enumerate()
            .map(|(i, score)| GolfRow {
                position: i + 1,
                to_par_label: score.to_par.map(to_par_label),
                score,
            })
            .collect(),
    }
}

async fn list_items(State(ctx): State<SharedContext>) -> Json<Board> {
    Json(board(&ctx))
}

pub(crate) async fn get_item(
    State(ctx): State<SharedContext>,
    Path(id): Path<ItemId>,
) -> Result<Json<AuctionItem>, ApiError> {
    ctx.cache
        .get(&id)
        .map(Json)
        .ok_or_else(|| BidError::Rejected(Rejection::ItemNotFound(id)).into())
}

pub(crate) async fn place_bid(
    State(ctx): State<SharedContext>,
    Path(id): Path<ItemId>,
    Json(request): Json<BidRequest>,
) -> Result<Json<AuctionItem>, ApiError> {
    let attempt = BidAttempt {
        item_id: id,
        proposed_amount: request.amount,
        bidder: BidderContext {
            name: request.bidder_name,
            table_number: request.table_number,
        },
    };

    let outcome = tokio::task::spawn_blocking(move || ctx.bid_placement().place_bid(attempt))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(outcome?))
}

async fn bid_history(
    State(ctx): State<SharedContext>,
    Path(id): Path<ItemId>,
) -> Result<Json<Vec<BidHistoryRecord>>, ApiError> {
    let records = tokio::task::spawn_blocking(move || ctx.store.read_bid_history(&id))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(records?))
}

pub(crate) async fn get_status(State(ctx): State<SharedContext>) -> Json<StatusBody> {
    Json(StatusBody {
        auction_status: current_phase(&*ctx.phase),
    })
}

pub(crate) async fn set_status(
    State(ctx): State<SharedContext>,
    Json(body): Json<StatusBody>,
) -> Result<Json<StatusBody>, ApiError> {
    let phase = body.auction_status;
    tokio::task::spawn_blocking(move || ctx.phase.store(phase))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;
    Ok(Json(StatusBody {
        auction_status: phase,
    }))
}

async fn list_golf_scores(State(ctx): State<SharedContext>) -> Json<GolfBoard> {
    Json(golf_board(&ctx))
}

async fn list_golf_teams(State(ctx): State<SharedContext>) -> Json<Vec<String>> {
    Json(team_names(&ctx.scores.all()))
}

pub(crate) async fn submit_score(
    State(ctx): State<SharedContext>,
    Json(submission): Json<ScoreSubmission>,
) -> Result<Json<GolfScore>, ApiError> {
    let score = tokio::task::spawn_blocking(move || ctx.score_keeper().submit(submission))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(score?))
}

async fn health(State(ctx): State<SharedContext>) -> Json<Health> {
    Json(Health {
        connected: ctx.connection.state() == ConnectionState::Connected,
        items: ctx.cache.len(),
    })
}

pub(crate) fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/items/:id/bids", post(place_bid))
        .route("/items/:id/history", get(bid_history))
        .route("/status", get(get_status).put(set_status))
        .route("/golf", get(list_golf_scores))
        .route("/golf/teams", get(list_golf_teams))
        .route("/golf/scores", post(submit_score))
        .route("/health", get(health))
        .with_state(ctx)
}

async fn run_http_server(ctx: SharedContext, listen: SocketAddr) -> Result<()> {
    let app = router(ctx);

    info!(%listen, "serving the auction board");
    axum::Server::try_bind(&listen)?
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

impl Ui {
    pub fn new(ctx: SharedContext, listen: SocketAddr) -> Result<Self> {
        let runtime = Runtime::new()?;

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            let res = run_http_server(ctx, listen)
                .await
                .with_context(|| format!("Failed to run http server on {listen}"));
            // nobody listening means we're shutting down anyway
            let _ = tx.send(res);
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for Ui {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("ui server died without leaving a response?!"))
            }
        }
    }
}

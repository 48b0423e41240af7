use super::*;
use crate::auction::normalize::RawItem;
use ::postgres::{error::SqlState, fallible_iterator::FallibleIterator, Client, Config};
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};
use serde::Deserialize;
use tracing::{debug, warn};

/// Channel the `auction_items` trigger publishes row changes on
pub const ITEM_CHANGES_CHANNEL: &str = "auction_items_changes";
/// Channel the `golf_scores` trigger publishes row changes on
pub const GOLF_CHANGES_CHANNEL: &str = "golf_scores_changes";

const ITEM_COLUMNS: &str = "id::text AS id, title, description, category, starting_price, \
     current_bid, high_bidder, table_number, updated_at";

const GOLF_COLUMNS: &str = "id::text AS id, team_name, gross_score, handicap::float8 AS handicap, \
     net_score::float8 AS net_score";

pub type PostgresPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
pub type PostgresConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

#[derive(Clone)]
pub struct PostgresAuctionStore {
    pool: PostgresPool,
    // change streams get their own connections, never pooled ones
    config: Config,
}

impl PostgresAuctionStore {
    /// Set up the pool without touching the database
    ///
    /// Connections are opened lazily, so an unreachable database at startup is
    /// handled by the reconnection loop like any later outage.
    pub fn connect(url: &str, pool_size: u32, connect_timeout: Duration) -> anyhow::Result<Self> {
        let mut config: Config = url.parse()?;
        config.connect_timeout(connect_timeout);

        let manager = PostgresConnectionManager::new(config.clone(), NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .connection_timeout(connect_timeout)
            .build_unchecked(manager);
        Ok(Self { pool, config })
    }

    fn connection(&self) -> StoreResult<PostgresConnection> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }
}

fn classify(e: ::postgres::Error) -> StoreError {
    if e.is_closed() {
        return StoreError::Unreachable(e.to_string());
    }
    match e.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
                || *code == SqlState::INSUFFICIENT_PRIVILEGE =>
        {
            StoreError::Unauthorized(e.to_string())
        }
        Some(_) => StoreError::Other(e.to_string()),
        // no SQLSTATE: the failure happened below the protocol
        None => StoreError::Unreachable(e.to_string()),
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(json: &str) -> StoreResult<T> {
    serde_json::from_str(json).map_err(|e| StoreError::Malformed(e.to_string()))
}

fn to_db_amount(amount: Amount) -> StoreResult<i64> {
    i64::try_from(amount).map_err(|_| StoreError::Other(format!("amount out of range: {amount}")))
}

impl AuctionStore for PostgresAuctionStore {
    fn read(&self, query: &ItemQuery) -> StoreResult<Vec<RawItem>> {
        let order = match query.order {
            ItemOrder::CurrentBidDesc => "ORDER BY current_bid DESC",
            ItemOrder::Unordered => "",
        };
        let limit = query
            .limit
            .map(|limit| format!("LIMIT {limit}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT row_to_json(t)::text FROM \
             (SELECT {ITEM_COLUMNS} FROM {AUCTION_ITEMS_TABLE} {order} {limit}) t"
        );

        let rows = self
            .connection()?
            .query(sql.as_str(), &[])
            .map_err(classify)?;

        Ok(rows
            .iter()
            .filter_map(|row| match parse_json::<RawItem>(&row.get::<_, String>(0)) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable auction item row");
                    None
                }
            })
            .collect())
    }

    fn update(&self, id: ItemIdRef, patch: &BidPatch) -> StoreResult<RawItem> {
        let sql = format!(
            "UPDATE {AUCTION_ITEMS_TABLE} \
             SET current_bid = $1::bigint, high_bidder = $2::text, table_number = $3::int4, \
                 updated_at = $4::text::timestamptz \
             WHERE id::text = $5::text \
             RETURNING row_to_json({AUCTION_ITEMS_TABLE})::text"
        );
        let table_number = i32::try_from(patch.table_number)
            .map_err(|_| StoreError::Other(format!("table number out of range: {}", patch.table_number)))?;

        let row = self
            .connection()?
            .query_opt(
                sql.as_str(),
                &[
                    &to_db_amount(patch.current_bid)?,
                    &patch.high_bidder,
                    &table_number,
                    &patch.updated_at.to_rfc3339(),
                    &id,
                ],
            )
            .map_err(classify)?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

        parse_json(&row.get::<_, String>(0))
    }

    fn subscribe(&self, table: &str, kinds: &[ChangeKind]) -> StoreResult<OwnedSubscription> {
        let channel = match table {
            AUCTION_ITEMS_TABLE => ITEM_CHANGES_CHANNEL,
            GOLF_SCORES_TABLE => GOLF_CHANGES_CHANNEL,
            other => return Err(StoreError::Other(format!("no change stream for table {other}"))),
        };
        let mut client = self.config.connect(NoTls).map_err(classify)?;
        client
            .batch_execute(&format!("LISTEN {channel}"))
            .map_err(classify)?;
        debug!(channel, "listening for row changes");

        Ok(Box::new(PostgresSubscription {
            client,
            channel,
            kinds: kinds.to_vec(),
            announced: false,
        }))
    }

    fn insert_bid_history(&self, record: &BidHistoryRecord) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {BID_HISTORY_TABLE} \
             (item_id, item_title, previous_bid, bid_amount, bidder_name, table_number, created_at) \
             VALUES ($1::text::bigint, $2::text, $3::bigint, $4::bigint, $5::text, $6::int4, \
                     $7::text::timestamptz)"
        );
        let table_number = i32::try_from(record.table_number)
            .map_err(|_| StoreError::Other(format!("table number out of range: {}", record.table_number)))?;

        self.connection()?
            .execute(
                sql.as_str(),
                &[
                    &record.item_id,
                    &record.item_title,
                    &to_db_amount(record.previous_bid)?,
                    &to_db_amount(record.bid_amount)?,
                    &record.bidder_name,
                    &table_number,
                    &record.created_at.to_rfc3339(),
                ],
            )
            .map_err(classify)?;
        Ok(())
    }

    fn read_bid_history(&self, item_id: ItemIdRef) -> StoreResult<Vec<BidHistoryRecord>> {
        let sql = format!(
            "SELECT row_to_json(h)::text FROM \
             (SELECT item_id::text AS item_id, item_title, previous_bid::bigint AS previous_bid, \
                     bid_amount::bigint AS bid_amount, bidder_name, table_number, created_at \
              FROM {BID_HISTORY_TABLE} WHERE item_id::text = $1::text ORDER BY created_at DESC) h"
        );

        let rows = self
            .connection()?
            .query(sql.as_str(), &[&item_id])
            .map_err(classify)?;
        rows.iter()
            .map(|row| parse_json(&row.get::<_, String>(0)))
            .collect()
    }

    fn read_golf_scores(&self) -> StoreResult<Vec<RawGolfScore>> {
        let sql = format!(
            "SELECT row_to_json(g)::text FROM (SELECT {GOLF_COLUMNS} FROM {GOLF_SCORES_TABLE}) g"
        );

        let rows = self
            .connection()?
            .query(sql.as_str(), &[])
            .map_err(classify)?;
        Ok(rows
            .iter()
            .filter_map(|row| match parse_json::<RawGolfScore>(&row.get::<_, String>(0)) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable golf score row");
                    None
                }
            })
            .collect())
    }

    fn update_golf_score(&self, id: ScoreIdRef, patch: &ScorePatch) -> StoreResult<RawGolfScore> {
        let sql = format!(
            "WITH g AS ( \
                 UPDATE {GOLF_SCORES_TABLE} \
                 SET gross_score = $1::int4, \
                     handicap = COALESCE($2::float8::numeric, handicap) \
                 WHERE id::text = $3::text \
                 RETURNING {GOLF_COLUMNS}) \
             SELECT row_to_json(g)::text FROM g"
        );
        let gross = gross_to_db(patch.gross_score)?;

        let row = self
            .connection()?
            .query_opt(sql.as_str(), &[&gross, &patch.handicap, &id])
            .map_err(classify)?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        parse_json(&row.get::<_, String>(0))
    }

    fn insert_golf_score(&self, score: &NewGolfScore) -> StoreResult<RawGolfScore> {
        let sql = format!(
            "WITH g AS ( \
                 INSERT INTO {GOLF_SCORES_TABLE} (team_name, gross_score, handicap) \
                 VALUES ($1::text, $2::int4, $3::float8::numeric) \
                 RETURNING {GOLF_COLUMNS}) \
             SELECT row_to_json(g)::text FROM g"
        );
        let gross = gross_to_db(score.gross_score)?;

        let row = self
            .connection()?
            .query_one(sql.as_str(), &[&score.team_name, &gross, &score.handicap])
            .map_err(classify)?;
        parse_json(&row.get::<_, String>(0))
    }
}

fn gross_to_db(gross: GrossScore) -> StoreResult<i32> {
    i32::try_from(gross).map_err(|_| StoreError::Other(format!("gross score out of range: {gross}")))
}

#[derive(Deserialize)]
struct NotifyPayload {
    #[serde(rename = "type")]
    operation: String,
    #[serde(default)]
    record: Value,
}

/// A `LISTEN` on a connection of its own
///
/// Dropping it closes the connection, which ends the listen server-side.
pub struct PostgresSubscription {
    client: Client,
    channel: &'static str,
    kinds: Vec<ChangeKind>,
    announced: bool,
}

impl Subscription for PostgresSubscription {
    fn poll(&mut self, timeout: Option<Duration>) -> StoreResult<Option<StoreNotice>> {
        if !self.announced {
            self.announced = true;
            return Ok(Some(StoreNotice::Status(SubscriptionStatus::Subscribed)));
        }
        if self.client.is_closed() {
            return Ok(Some(StoreNotice::Status(SubscriptionStatus::Closed)));
        }

        let mut notifications = self.client.notifications();
        let notification = match timeout {
            Some(timeout) => notifications.timeout_iter(timeout).next(),
            None => notifications.blocking_iter().next(),
        }
        .map_err(classify)?;

        let Some(notification) = notification else {
            return Ok(None);
        };

        Ok(decode_notification(self.channel, notification.payload(), &self.kinds))
    }
}

/// Turn a NOTIFY payload into a change notice
///
/// `None` for payloads we can't use; one bad payload is not worth dropping
/// the stream over.
pub fn decode_notification(channel: &str, payload: &str, kinds: &[ChangeKind]) -> Option<StoreNotice> {
    let payload: NotifyPayload = match parse_json(payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(channel, error = %e, "skipping undecodable change notification");
            return None;
        }
    };
    let Some(kind) = ChangeKind::from_operation(&payload.operation) else {
        warn!(channel, operation = %payload.operation, "ignoring unknown change operation");
        return None;
    };
    if !kinds.contains(&kind) {
        return None;
    }

    Some(StoreNotice::Change(ChangeEvent {
        kind,
        new_record: payload.record,
    }))
}

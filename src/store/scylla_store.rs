use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::try_join_all;
use futures_util::{pin_mut, TryStreamExt};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::deserialize::row::DeserializeRow;
use scylla::response::query_result::QueryResult;
use scylla::serialize::row::SerializeRow;
use scylla::statement::unprepared::Statement;
use scylla::value::{CqlValue, Row};
use std::fmt::Display;
use std::sync::Arc;
use uuid::Uuid;

use super::{OrderStore, StoreError, StoreResult};
use crate::domain::order::{DeadLetter, Order, OrderStatus, OutboxMessage};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// Table layout:
// - `orders`: one row per order. The full aggregate lives in `payload` (JSON);
//   status, payment and tracking columns are duplicated for lookups.
//   Undelivered notifications live in the `outbox` list column so a single
//   lightweight transaction writes status and outbox together:
//
//     UPDATE orders SET ..., outbox = outbox + ? WHERE id = ? IF status = ?
//
// - `outbox`: the relay's queue. Each message the row list gains is copied
//   here once the transaction applies, spread over a fixed set of buckets and
//   clustered by creation time, so polling reads a bounded slice per bucket.
//   A copy lost to a crash between the two writes is restored from the row
//   lists by `restore_outbox` at startup.
//
// - `orders_by_day`: order ids partitioned by creation date, for range reads.
//
// - `outbox_dead_letters`: messages the relay gave up on.
//
// Every write to an `orders` row is a lightweight transaction, acks included.
//
// ============================================================================

const OUTBOX_BUCKETS: i32 = 16;
const PAGE_SIZE: i32 = 500;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        order_number text,
        user_id uuid,
        status text,
        payment_status text,
        payment_reference text,
        transaction_id text,
        tracking_number text,
        created_at timestamp,
        updated_at timestamp,
        payload text,
        outbox list<text>
    )",
    "CREATE INDEX IF NOT EXISTS orders_status_idx ON orders (status)",
    "CREATE INDEX IF NOT EXISTS orders_tracking_idx ON orders (tracking_number)",
    "CREATE INDEX IF NOT EXISTS orders_payment_reference_idx ON orders (payment_reference)",
    "CREATE INDEX IF NOT EXISTS orders_transaction_idx ON orders (transaction_id)",
    "CREATE TABLE IF NOT EXISTS orders_by_day (
        created_day date,
        created_at timestamp,
        id uuid,
        PRIMARY KEY ((created_day), created_at, id)
    )",
    "CREATE TABLE IF NOT EXISTS outbox (
        bucket int,
        created_at timestamp,
        id uuid,
        order_id uuid,
        payload text,
        PRIMARY KEY ((bucket), created_at, id)
    ) WITH CLUSTERING ORDER BY (created_at ASC, id ASC)",
    "CREATE TABLE IF NOT EXISTS outbox_dead_letters (
        id uuid PRIMARY KEY,
        order_id uuid,
        event_type text,
        payload text,
        error_message text,
        attempts int,
        failed_at timestamp
    )",
];

/// Queue partition for an order's messages; one order always maps to one bucket
fn outbox_bucket(order_id: Uuid) -> i32 {
    (order_id.as_u128() % OUTBOX_BUCKETS as u128) as i32
}

/// Every calendar day touched by `[start, end]`, in order
fn days_covering(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start
        .date_naive()
        .iter_days()
        .take_while(|day| *day <= end.date_naive())
        .collect()
}

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

fn backend<E: Display>(err: E) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Connect, create the keyspace and tables if needed, and switch to the keyspace
    pub async fn connect(node: &str, keyspace: &str) -> anyhow::Result<Self> {
        tracing::info!(node = %node, keyspace = %keyspace, "Connecting to ScyllaDB...");

        let session: Session = SessionBuilder::new().known_node(node).build().await?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    keyspace
                ),
                &[],
            )
            .await?;
        session.use_keyspace(keyspace, false).await?;

        for statement in SCHEMA {
            session.query_unpaged(*statement, &[]).await?;
        }

        let store = Self::new(Arc::new(session));
        let restored = store.restore_outbox().await?;
        tracing::info!(keyspace = %keyspace, restored, "✅ ScyllaDB schema ready");
        Ok(store)
    }

    /// Copy every message still listed on an order row into the relay queue.
    /// Queue inserts are keyed by message, so copies already present are
    /// overwritten in place.
    pub async fn restore_outbox(&self) -> StoreResult<usize> {
        let rows = self
            .paged_rows::<(Option<Vec<String>>,)>("SELECT outbox FROM orders", ())
            .await?;

        let mut restored = 0;
        for (outbox,) in rows {
            let messages = outbox
                .unwrap_or_default()
                .iter()
                .map(|encoded| serde_json::from_str::<OutboxMessage>(encoded))
                .collect::<Result<Vec<_>, _>>()?;
            for message in &messages {
                self.enqueue(message).await?;
            }
            restored += messages.len();
        }
        Ok(restored)
    }

    fn encode_outbox(outbox: &[OutboxMessage]) -> StoreResult<Vec<String>> {
        outbox
            .iter()
            .map(|message| serde_json::to_string(message).map_err(StoreError::from))
            .collect()
    }

    async fn enqueue(&self, message: &OutboxMessage) -> StoreResult<()> {
        let payload = serde_json::to_string(message)?;
        self.session
            .query_unpaged(
                "INSERT INTO outbox (bucket, created_at, id, order_id, payload) VALUES (?, ?, ?, ?, ?)",
                (
                    outbox_bucket(message.order_id),
                    message.created_at,
                    message.id,
                    message.order_id,
                    payload,
                ),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    /// Queue messages whose row write already applied. A failed copy stays
    /// on the row and is picked up by `restore_outbox`.
    async fn enqueue_applied(&self, outbox: &[OutboxMessage]) {
        for message in outbox {
            if let Err(e) = self.enqueue(message).await {
                tracing::warn!(
                    order_id = %message.order_id,
                    message_id = %message.id,
                    error = %e,
                    "Outbox message not queued, left on the order row"
                );
            }
        }
    }

    /// Read the `[applied]` column of a lightweight transaction result
    fn was_applied(result: QueryResult) -> StoreResult<bool> {
        let rows_result = result.into_rows_result().map_err(backend)?;
        let row: Option<Row> = rows_result.maybe_first_row::<Row>().map_err(backend)?;

        Ok(row
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|value| match value {
                CqlValue::Boolean(applied) => Some(applied),
                _ => None,
            })
            .unwrap_or(false))
    }

    /// Run `query` page by page and collect every row
    async fn paged_rows<R>(&self, query: &str, values: impl SerializeRow) -> StoreResult<Vec<R>>
    where
        R: for<'frame, 'metadata> DeserializeRow<'frame, 'metadata> + 'static,
    {
        let mut statement = Statement::new(query);
        statement.set_page_size(PAGE_SIZE);

        let pager = self.session.query_iter(statement, values).await.map_err(backend)?;
        let rows = pager.rows_stream::<R>().map_err(backend)?;
        pin_mut!(rows);

        let mut collected = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(backend)? {
            collected.push(row);
        }
        Ok(collected)
    }

    async fn paged_orders(&self, query: &str, values: impl SerializeRow) -> StoreResult<Vec<Order>> {
        let mut orders = self
            .paged_rows::<(String,)>(query, values)
            .await?
            .into_iter()
            .map(|(payload,)| serde_json::from_str::<Order>(&payload))
            .collect::<Result<Vec<_>, _>>()?;
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    /// Lookup expected to match at most one row
    async fn select_one(&self, query: &str, values: impl SerializeRow) -> StoreResult<Option<Order>> {
        let result = self.session.query_unpaged(query, values).await.map_err(backend)?;
        let rows_result = result.into_rows_result().map_err(backend)?;

        match rows_result.maybe_first_row::<(String,)>().map_err(backend)? {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Oldest `limit` queued messages of one bucket
    async fn bucket_head(&self, bucket: i32, limit: i32) -> StoreResult<Vec<OutboxMessage>> {
        self.paged_rows::<(String,)>("SELECT payload FROM outbox WHERE bucket = ? LIMIT ?", (bucket, limit))
            .await?
            .into_iter()
            .map(|(payload,)| serde_json::from_str(&payload).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn insert(&self, order: &Order, outbox: Vec<OutboxMessage>) -> StoreResult<()> {
        let payload = serde_json::to_string(order)?;
        let encoded = Self::encode_outbox(&outbox)?;

        // Written first: an entry whose order never lands is dropped on read
        self.session
            .query_unpaged(
                "INSERT INTO orders_by_day (created_day, created_at, id) VALUES (?, ?, ?)",
                (order.created_at.date_naive(), order.created_at, order.id),
            )
            .await
            .map_err(backend)?;

        let result = self
            .session
            .query_unpaged(
                "INSERT INTO orders (
                    id, order_number, user_id, status, payment_status, payment_reference,
                    transaction_id, tracking_number, created_at, updated_at, payload, outbox
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                (
                    order.id,
                    &order.order_number,
                    order.user_id,
                    order.status.as_str(),
                    order.payment.status.as_str(),
                    &order.payment.reference,
                    &order.payment.transaction_id,
                    &order.tracking_info.tracking_number,
                    order.created_at,
                    order.updated_at,
                    payload,
                    encoded,
                ),
            )
            .await
            .map_err(backend)?;

        if !Self::was_applied(result)? {
            return Err(StoreError::Duplicate(order.id));
        }
        self.enqueue_applied(&outbox).await;

        tracing::debug!(order_id = %order.id, order_number = %order.order_number, "Inserted order");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        self.select_one("SELECT payload FROM orders WHERE id = ?", (id,)).await
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>> {
        self.select_one("SELECT payload FROM orders WHERE tracking_number = ?", (tracking_number,))
            .await
    }

    async fn find_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        if let Some(order) = self
            .select_one("SELECT payload FROM orders WHERE payment_reference = ?", (reference,))
            .await?
        {
            return Ok(Some(order));
        }
        self.select_one("SELECT payload FROM orders WHERE transaction_id = ?", (reference,))
            .await
    }

    async fn compare_and_set(
        &self,
        order: &Order,
        expected: OrderStatus,
        outbox: Vec<OutboxMessage>,
    ) -> StoreResult<bool> {
        let payload = serde_json::to_string(order)?;
        let encoded = Self::encode_outbox(&outbox)?;

        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET
                    status = ?, payment_status = ?, payment_reference = ?, transaction_id = ?,
                    tracking_number = ?, updated_at = ?, payload = ?, outbox = outbox + ?
                 WHERE id = ? IF status = ?",
                (
                    order.status.as_str(),
                    order.payment.status.as_str(),
                    &order.payment.reference,
                    &order.payment.transaction_id,
                    &order.tracking_info.tracking_number,
                    order.updated_at,
                    payload,
                    encoded,
                    order.id,
                    expected.as_str(),
                ),
            )
            .await
            .map_err(backend)?;

        let applied = Self::was_applied(result)?;
        if applied {
            self.enqueue_applied(&outbox).await;
        } else {
            tracing::debug!(
                order_id = %order.id,
                expected = %expected,
                "Conditional status write not applied"
            );
        }
        Ok(applied)
    }

    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        self.paged_orders("SELECT payload FROM orders WHERE status = ?", (status.as_str(),))
            .await
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        let mut ids = Vec::new();
        for day in days_covering(start, end) {
            let rows = self
                .paged_rows::<(Uuid,)>(
                    "SELECT id FROM orders_by_day WHERE created_day = ? AND created_at >= ? AND created_at <= ?",
                    (day, start, end),
                )
                .await?;
            ids.extend(rows.into_iter().map(|(id,)| id));
        }

        let mut orders = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(PAGE_SIZE as usize) {
            let loaded = try_join_all(chunk.iter().map(|id| self.get(*id))).await?;
            orders.extend(
                loaded
                    .into_iter()
                    .flatten()
                    .filter(|order| order.created_at >= start && order.created_at <= end),
            );
        }
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let per_bucket = i32::try_from(limit).unwrap_or(i32::MAX);
        let heads = try_join_all((0..OUTBOX_BUCKETS).map(|bucket| self.bucket_head(bucket, per_bucket))).await?;

        let mut pending: Vec<OutboxMessage> = heads.into_iter().flatten().collect();
        pending.sort_by_key(|message| (message.created_at, message.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn ack_outbox(&self, message: &OutboxMessage) -> StoreResult<()> {
        let encoded = serde_json::to_string(message)?;
        self.session
            .query_unpaged(
                "UPDATE orders SET outbox = outbox - ? WHERE id = ? IF EXISTS",
                (vec![encoded], message.order_id),
            )
            .await
            .map_err(backend)?;

        self.session
            .query_unpaged(
                "DELETE FROM outbox WHERE bucket = ? AND created_at = ? AND id = ?",
                (outbox_bucket(message.order_id), message.created_at, message.id),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn dead_letter(&self, letter: DeadLetter) -> StoreResult<()> {
        let payload = serde_json::to_string(&letter.message)?;
        let attempts = i32::try_from(letter.attempts).unwrap_or(i32::MAX);

        self.session
            .query_unpaged(
                "INSERT INTO outbox_dead_letters (
                    id, order_id, event_type, payload, error_message, attempts, failed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    letter.message.id,
                    letter.message.order_id,
                    letter.message.event_type(),
                    payload,
                    &letter.error_message,
                    attempts,
                    letter.failed_at,
                ),
            )
            .await
            .map_err(backend)?;

        self.ack_outbox(&letter.message).await
    }

    async fn dead_letters(&self, limit: usize) -> StoreResult<Vec<DeadLetter>> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let rows = self
            .paged_rows::<(String, String, i32, DateTime<Utc>)>(
                "SELECT payload, error_message, attempts, failed_at FROM outbox_dead_letters LIMIT ?",
                (limit,),
            )
            .await?;

        let mut letters = Vec::with_capacity(rows.len());
        for (payload, error_message, attempts, failed_at) in rows {
            letters.push(DeadLetter {
                message: serde_json::from_str(&payload)?,
                error_message,
                attempts: u32::try_from(attempts).unwrap_or_default(),
                failed_at,
            });
        }

        letters.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(letters)
    }
}

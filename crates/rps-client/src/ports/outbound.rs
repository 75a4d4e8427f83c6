//! # Outbound Ports
//!
//! The hosted store as seen by this crate: authentication, table queries and
//! inserts, and a change feed. Rows cross the port as JSON; [`TableStoreExt`]
//! adds typed helpers on top.

use async_trait::async_trait;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::{AuthUser, StoreError, NO_ROWS_CODE};

/// Round history table.
pub const GAME_RESULTS_TABLE: &str = "game_results";

/// Per-user statistics table.
pub const USER_STATS_TABLE: &str = "user_stats";

/// Schema holding both tables.
pub const PUBLIC_SCHEMA: &str = "public";

// =============================================================================
// Queries
// =============================================================================

/// Row filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// `column = value`.
    Eq(String, String),
    /// `column > value`.
    Gt(String, String),
}

impl Filter {
    /// Column the filter applies to.
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::Gt(column, _) => column,
        }
    }

    /// PostgREST operator form, e.g. `eq.abc`.
    pub fn operator_value(&self) -> String {
        match self {
            Filter::Eq(_, value) => format!("eq.{value}"),
            Filter::Gt(_, value) => format!("gt.{value}"),
        }
    }

    /// Evaluate against a JSON row. Missing columns never match.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(field) = row.get(self.column()).filter(|v| !v.is_null()) else {
            return false;
        };
        let field = value_as_text(field);
        match self {
            Filter::Eq(_, value) => field == *value,
            Filter::Gt(_, value) => compare_text(&field, value) == Ordering::Greater,
        }
    }
}

/// Sort key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Column to sort on.
    pub column: String,
    /// Ascending when true.
    pub ascending: bool,
    /// Nulls before non-null values. Postgres defaults to nulls first for
    /// descending keys and last for ascending ones.
    pub nulls_first: bool,
}

impl Order {
    /// PostgREST form, e.g. `win_rate.desc.nullslast`. The nulls suffix is
    /// only written when it differs from the server default.
    pub fn to_param(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        if self.nulls_first == !self.ascending {
            format!("{}.{direction}", self.column)
        } else if self.nulls_first {
            format!("{}.{direction}.nullsfirst", self.column)
        } else {
            format!("{}.{direction}.nullslast", self.column)
        }
    }
}

/// `select(columns).eq(..).order(..).limit(n)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Comma-separated column list, `*` for all.
    pub columns: String,
    /// Conjunctive filters.
    pub filters: Vec<Filter>,
    /// Sort keys, most significant first.
    pub orders: Vec<Order>,
    /// Maximum rows.
    pub limit: Option<usize>,
}

impl Query {
    /// Start a select over `columns`.
    pub fn select(columns: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    /// Add an equality filter.
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.into(), value.to_string()));
        self
    }

    /// Add a greater-than filter.
    pub fn gt(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter::Gt(column.into(), value.to_string()));
        self
    }

    /// Add a sort key.
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.orders.push(Order {
            column: column.into(),
            ascending,
            nulls_first: !ascending,
        });
        self
    }

    /// Sort nulls after every value on the most recent sort key.
    pub fn nulls_last(mut self) -> Self {
        if let Some(order) = self.orders.last_mut() {
            order.nulls_first = false;
        }
        self
    }

    /// Cap the row count.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compare two rows by this query's sort keys.
    pub fn compare_rows(&self, a: &Value, b: &Value) -> Ordering {
        for order in &self.orders {
            let left = a.get(&order.column).filter(|v| !v.is_null());
            let right = b.get(&order.column).filter(|v| !v.is_null());
            let null_side = if order.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let ord = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => null_side,
                (Some(_), None) => null_side.reverse(),
                (Some(l), Some(r)) => {
                    let ord = compare_text(&value_as_text(l), &value_as_text(r));
                    if order.ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Keep only the requested columns of a row.
    pub fn project(&self, row: &Value) -> Value {
        if self.columns.trim() == "*" {
            return row.clone();
        }
        let Some(object) = row.as_object() else {
            return row.clone();
        };
        let projected = self
            .columns
            .split(',')
            .map(str::trim)
            .filter_map(|c| object.get(c).map(|v| (c.to_string(), v.clone())))
            .collect();
        Value::Object(projected)
    }
}

/// Text form of a JSON scalar as PostgREST would compare it.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric comparison when both sides are numbers, chronological when both
/// are RFC 3339 timestamps, else lexical.
fn compare_text(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return x.total_cmp(&y);
    }
    if let (Ok(x), Ok(y)) = (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

// =============================================================================
// Change feed
// =============================================================================

/// Kind of row change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
    /// Any of the above (subscription side only).
    #[serde(rename = "*")]
    All,
}

/// What a subscription listens for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSpec {
    /// Event kind.
    pub kind: ChangeKind,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Optional row filter.
    pub filter: Option<Filter>,
}

impl ChangeSpec {
    /// Listen for inserts on `table`.
    pub fn inserts(table: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Insert,
            schema: PUBLIC_SCHEMA.to_string(),
            table: table.into(),
            filter: None,
        }
    }

    /// Listen for updates on `table`.
    pub fn updates(table: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Update,
            ..Self::inserts(table)
        }
    }

    /// Restrict to rows matching `filter`.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether `event` falls under this spec.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        (self.kind == ChangeKind::All || self.kind == event.kind)
            && self.schema == event.schema
            && self.table == event.table
            && self.filter.as_ref().map_or(true, |f| f.matches(&event.record))
    }
}

/// A row change pushed by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event kind.
    pub kind: ChangeKind,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// New row (`{}` for deletes).
    pub record: Value,
    /// Previous row, when the store sends it.
    #[serde(default)]
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    /// Decode the new row.
    pub fn record_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.record.clone()).map_err(|e| StoreError::Parse(e.to_string()))
    }
}

/// Live change-feed subscription.
///
/// Dropping or calling [`ChangeSubscription::unsubscribe`] releases the
/// channel; no further events are delivered afterwards.
pub struct ChangeSubscription {
    channel: String,
    receiver: mpsc::Receiver<ChangeEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ChangeSubscription {
    /// Wrap an adapter's event receiver and its shutdown signal.
    pub fn new(
        channel: impl Into<String>,
        receiver: mpsc::Receiver<ChangeEvent>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            shutdown: Some(shutdown),
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Release the channel.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
            self.receiver.close();
            debug!(channel = %self.channel, "Change subscription released");
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Port traits
// =============================================================================

/// Authentication - outbound port.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account with `username` stored as user metadata.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthUser, StoreError>;

    /// Verify credentials and open a remote session.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<AuthUser, StoreError>;

    /// Close the remote session.
    async fn sign_out(&self) -> Result<(), StoreError>;

    /// User behind the current remote session, if any.
    async fn get_user(&self) -> Result<Option<AuthUser>, StoreError>;
}

/// Table access - outbound port.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows matching `query`.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Insert rows and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError>;

    /// Exactly one row; `PGRST116` when none matches.
    async fn select_single(&self, table: &str, query: &Query) -> Result<Value, StoreError> {
        let query = query.clone().limit(2);
        let mut rows = self.select(table, &query).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            _ => Err(StoreError::Api {
                code: Some(NO_ROWS_CODE.to_string()),
                message: "JSON object requested, multiple (or no) rows returned".to_string(),
                status: 406,
            }),
        }
    }
}

/// Change notifications - outbound port.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open `channel` listening for `specs`.
    async fn subscribe(
        &self,
        channel: &str,
        specs: Vec<ChangeSpec>,
    ) -> Result<ChangeSubscription, StoreError>;
}

/// Everything the client needs from the hosted store.
pub trait RemoteStore: AuthProvider + TableStore + ChangeFeed {}

impl<T: AuthProvider + TableStore + ChangeFeed> RemoteStore for T {}

/// Typed helpers over [`TableStore`].
#[async_trait]
pub trait TableStoreExt: TableStore {
    /// Select and decode rows.
    async fn select_as<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, StoreError> {
        self.select(table, query)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| StoreError::Parse(e.to_string())))
            .collect()
    }

    /// Select and decode exactly one row.
    async fn select_single_as<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<T, StoreError> {
        let row = self.select_single(table, query).await?;
        serde_json::from_value(row).map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Insert one typed row and decode what the store echoes back.
    async fn insert_one<T, R>(&self, table: &str, row: &T) -> Result<Option<R>, StoreError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let value = serde_json::to_value(row).map_err(|e| StoreError::Parse(e.to_string()))?;
        let echoed = self.insert(table, vec![value]).await?;
        echoed
            .into_iter()
            .next()
            .map(|v| serde_json::from_value(v).map_err(|e| StoreError::Parse(e.to_string())))
            .transpose()
    }
}

impl<S: TableStore + ?Sized> TableStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let row = json!({"user_id": "u-1", "total_games": 3});
        assert!(Filter::Eq("user_id".into(), "u-1".into()).matches(&row));
        assert!(!Filter::Eq("user_id".into(), "u-2".into()).matches(&row));
        assert!(Filter::Gt("total_games".into(), "0".into()).matches(&row));
        assert!(!Filter::Gt("total_games".into(), "3".into()).matches(&row));
        assert!(!Filter::Eq("missing".into(), "x".into()).matches(&row));
    }

    #[test]
    fn test_operator_value() {
        assert_eq!(Filter::Eq("a".into(), "1".into()).operator_value(), "eq.1");
        assert_eq!(Filter::Gt("a".into(), "0".into()).operator_value(), "gt.0");
    }

    #[test]
    fn test_compare_rows_multi_key() {
        let query = Query::select("*")
            .order("win_rate", false)
            .order("total_games", false);
        let a = json!({"win_rate": 50.0, "total_games": 10});
        let b = json!({"win_rate": 50.0, "total_games": 2});
        let c = json!({"win_rate": 75.5, "total_games": 1});
        assert_eq!(query.compare_rows(&a, &b), Ordering::Less);
        assert_eq!(query.compare_rows(&c, &a), Ordering::Less);
    }

    #[test]
    fn test_numeric_not_lexical() {
        let query = Query::select("*").order("n", true);
        assert_eq!(query.compare_rows(&json!({"n": 9}), &json!({"n": 10})), Ordering::Less);
    }

    #[test]
    fn test_nulls_placement() {
        let rated = json!({"win_rate": 10.0});
        let unrated = json!({"win_rate": null});
        let missing = json!({});

        let server_default = Query::select("*").order("win_rate", false);
        assert_eq!(server_default.compare_rows(&unrated, &rated), Ordering::Less);

        let query = Query::select("*").order("win_rate", false).nulls_last();
        assert_eq!(query.compare_rows(&rated, &unrated), Ordering::Less);
        assert_eq!(query.compare_rows(&missing, &rated), Ordering::Greater);
        assert_eq!(query.compare_rows(&unrated, &missing), Ordering::Equal);

        let ascending = Query::select("*").order("win_rate", true);
        assert_eq!(ascending.compare_rows(&rated, &unrated), Ordering::Less);
    }

    #[test]
    fn test_order_param() {
        let query = Query::select("*")
            .order("win_rate", false)
            .nulls_last()
            .order("total_games", false)
            .order("username", true);
        let params: Vec<String> = query.orders.iter().map(Order::to_param).collect();
        assert_eq!(
            params,
            vec!["win_rate.desc.nullslast", "total_games.desc", "username.asc"]
        );
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let query = Query::select("*").order("played_at", false);
        let whole = json!({"played_at": "2024-05-01T12:00:00Z"});
        let fraction = json!({"played_at": "2024-05-01T12:00:00.123Z"});
        let offset = json!({"played_at": "2024-05-01T13:00:00.500+01:00"});
        assert_eq!(query.compare_rows(&fraction, &whole), Ordering::Less);
        assert_eq!(query.compare_rows(&offset, &whole), Ordering::Less);
        assert_eq!(query.compare_rows(&fraction, &offset), Ordering::Greater);
    }

    #[test]
    fn test_project_columns() {
        let query = Query::select("username, result");
        let row = json!({"username": "a", "result": "win", "user_id": "u"});
        assert_eq!(query.project(&row), json!({"username": "a", "result": "win"}));
        assert_eq!(Query::select("*").project(&row), row);
    }

    #[test]
    fn test_change_spec_matches() {
        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            schema: PUBLIC_SCHEMA.into(),
            table: GAME_RESULTS_TABLE.into(),
            record: json!({"user_id": "u-1"}),
            old_record: None,
        };
        assert!(ChangeSpec::inserts(GAME_RESULTS_TABLE).matches(&event));
        assert!(!ChangeSpec::updates(GAME_RESULTS_TABLE).matches(&event));
        assert!(!ChangeSpec::inserts(USER_STATS_TABLE).matches(&event));
        assert!(!ChangeSpec::inserts(GAME_RESULTS_TABLE)
            .with_filter(Filter::Eq("user_id".into(), "u-2".into()))
            .matches(&event));
    }

    #[tokio::test]
    async fn test_unsubscribe_signals_adapter() {
        let (_tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sub = ChangeSubscription::new("test", rx, shutdown_tx);
        sub.unsubscribe();
        assert!(shutdown_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_signals_adapter() {
        let (_tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            let _sub = ChangeSubscription::new("test", rx, shutdown_tx);
        }
        assert!(shutdown_rx.await.is_ok());
    }
}

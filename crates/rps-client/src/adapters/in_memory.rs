//! In-Memory Remote Store Adapter
//!
//! Process-local stand-in for the hosted service. Implements every outbound
//! port: accounts, tables with the `user_stats.user_id` unique constraint, and
//! a broadcast change feed. Used by tests and the CLI's offline mode.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::{AuthUser, GameResult, StoreError, UserId, UserStats, UNIQUE_VIOLATION_CODE};
use crate::ports::outbound::{
    AuthProvider, ChangeEvent, ChangeFeed, ChangeKind, ChangeSpec, ChangeSubscription, Filter,
    Query, TableStore, GAME_RESULTS_TABLE, PUBLIC_SCHEMA, USER_STATS_TABLE,
};

/// Change bus capacity.
const CHANGE_BUS_CAPACITY: usize = 1000;

/// Per-subscription buffer.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Operation that can be made to fail on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `sign_up`.
    SignUp,
    /// `sign_in_with_password`.
    SignIn,
    /// `sign_out`.
    SignOut,
    /// `get_user`.
    GetUser,
    /// `select` / `select_single`.
    Select,
    /// `insert`.
    Insert,
    /// `subscribe`.
    Subscribe,
}

#[derive(Clone, Debug)]
struct Account {
    id: UserId,
    email: String,
    password: String,
    username: String,
}

impl Account {
    fn to_user(&self) -> AuthUser {
        AuthUser {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            username: Some(self.username.clone()),
        }
    }
}

#[derive(Default)]
struct StoreState {
    accounts: HashMap<String, Account>,
    current_user: Option<UserId>,
    tables: HashMap<String, Vec<Value>>,
    next_row_ids: HashMap<String, i64>,
    next_user: u64,
}

/// In-memory implementation of the remote store ports.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    bus: broadcast::Sender<ChangeEvent>,
    failures: RwLock<HashSet<FailPoint>>,
    stats_trigger: bool,
    uuid_row_ids: bool,
    echo_inserts: AtomicBool,
    active_subscriptions: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            state: RwLock::new(StoreState::default()),
            bus,
            failures: RwLock::new(HashSet::new()),
            stats_trigger: false,
            uuid_row_ids: false,
            echo_inserts: AtomicBool::new(true),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Empty store that maintains `user_stats` on every round insert and
    /// publishes the resulting UPDATE, like the hosted database trigger.
    #[must_use]
    pub fn with_stats_trigger() -> Self {
        Self {
            stats_trigger: true,
            ..Self::new()
        }
    }

    /// Key rows with uuid-shaped text ids instead of serial numbers.
    #[must_use]
    pub fn with_uuid_row_ids(mut self) -> Self {
        self.uuid_row_ids = true;
        self
    }

    /// Whether `insert` returns the stored rows (`Prefer: return=representation`).
    pub fn set_insert_echo(&self, echo: bool) {
        self.echo_inserts.store(echo, Ordering::SeqCst);
    }

    /// Make `point` fail until cleared.
    pub fn fail_on(&self, point: FailPoint) {
        self.failures.write().insert(point);
    }

    /// Stop failing `point`.
    pub fn recover(&self, point: FailPoint) {
        self.failures.write().remove(&point);
    }

    /// Number of live change subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.state.read().tables.get(table).map_or(0, Vec::len)
    }

    /// Register an account without opening a session (another player).
    pub fn register(&self, email: &str, password: &str, username: &str) -> Result<UserId, StoreError> {
        let mut state = self.state.write();
        Self::create_account(&mut state, email, password, username).map(|a| a.id)
    }

    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.failures.read().contains(&point) {
            return Err(StoreError::Network(format!("injected failure: {point:?}")));
        }
        Ok(())
    }

    fn create_account(
        state: &mut StoreState,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Account, StoreError> {
        if state.accounts.contains_key(email) {
            return Err(StoreError::Auth("User already registered".to_string()));
        }
        if password.len() < 6 {
            return Err(StoreError::Auth(
                "Password should be at least 6 characters.".to_string(),
            ));
        }
        state.next_user += 1;
        let account = Account {
            id: UserId::new(format!("user-{:04}", state.next_user)),
            email: email.to_string(),
            password: password.to_string(),
            username: username.to_string(),
        };
        state.accounts.insert(email.to_string(), account.clone());
        Ok(account)
    }

    fn publish(&self, kind: ChangeKind, table: &str, record: Value, old_record: Option<Value>) {
        let event = ChangeEvent {
            kind,
            schema: PUBLIC_SCHEMA.to_string(),
            table: table.to_string(),
            record,
            old_record,
        };
        match self.bus.send(event) {
            Ok(receivers) => debug!(table, ?kind, receivers, "Change published"),
            Err(_) => debug!(table, ?kind, "Change dropped (no subscribers)"),
        }
    }

    /// Apply the statistics trigger for one inserted round.
    fn apply_stats_trigger(state: &mut StoreState, round: &Value) -> Option<(ChangeKind, Value, Option<Value>)> {
        let game: GameResult = serde_json::from_value(round.clone()).ok()?;
        let rows = state.tables.entry(USER_STATS_TABLE.to_string()).or_default();
        let owner = Filter::Eq("user_id".to_string(), game.user_id.to_string());

        match rows.iter_mut().find(|row| owner.matches(row)) {
            Some(row) => {
                let old = row.clone();
                let mut stats: UserStats = serde_json::from_value(row.clone()).ok()?;
                stats.record(game.result);
                let mut updated = serde_json::to_value(&stats).ok()?;
                if let (Some(object), Some(id)) = (updated.as_object_mut(), old.get("id")) {
                    object.insert("id".to_string(), id.clone());
                }
                *row = updated;
                Some((ChangeKind::Update, row.clone(), Some(old)))
            }
            None => {
                let mut stats = UserStats::empty(game.user_id, game.username);
                stats.record(game.result);
                let row = serde_json::to_value(&stats).ok()?;
                rows.push(row.clone());
                Some((ChangeKind::Insert, row, None))
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for InMemoryStore {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthUser, StoreError> {
        self.check(FailPoint::SignUp)?;
        let mut state = self.state.write();
        let account = Self::create_account(&mut state, email, password, username)?;
        state.current_user = Some(account.id.clone());
        Ok(account.to_user())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, StoreError> {
        self.check(FailPoint::SignIn)?;
        let mut state = self.state.write();
        let account = state
            .accounts
            .get(email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| StoreError::Auth("Invalid login credentials".to_string()))?;
        state.current_user = Some(account.id.clone());
        Ok(account.to_user())
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.check(FailPoint::SignOut)?;
        self.state.write().current_user = None;
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, StoreError> {
        self.check(FailPoint::GetUser)?;
        let state = self.state.read();
        let Some(current) = state.current_user.as_ref() else {
            return Ok(None);
        };
        Ok(state
            .accounts
            .values()
            .find(|a| &a.id == current)
            .map(Account::to_user))
    }
}

#[async_trait]
impl TableStore for InMemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.check(FailPoint::Select)?;
        let state = self.state.read();
        let mut rows: Vec<Value> = state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| query.compare_rows(a, b));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows.iter().map(|row| query.project(row)).collect())
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        self.check(FailPoint::Insert)?;

        let mut inserted = Vec::with_capacity(rows.len());
        let mut triggered = Vec::new();
        {
            let mut state = self.state.write();

            if table == USER_STATS_TABLE {
                let existing = state.tables.get(table).cloned().unwrap_or_default();
                for row in &rows {
                    let Some(owner) = row.get("user_id") else {
                        continue;
                    };
                    if existing.iter().any(|r| r.get("user_id") == Some(owner)) {
                        return Err(StoreError::Api {
                            code: Some(UNIQUE_VIOLATION_CODE.to_string()),
                            message: "duplicate key value violates unique constraint \"user_stats_user_id_key\"".to_string(),
                            status: 409,
                        });
                    }
                }
            }

            for mut row in rows {
                let row_id = {
                    let next = state.next_row_ids.entry(table.to_string()).or_insert(0);
                    *next += 1;
                    *next
                };
                if let Some(object) = row.as_object_mut() {
                    let id = if self.uuid_row_ids {
                        json!(format!("00000000-0000-4000-8000-{row_id:012x}"))
                    } else {
                        json!(row_id)
                    };
                    object.entry("id").or_insert(id);
                    if table == GAME_RESULTS_TABLE {
                        object
                            .entry("played_at")
                            .or_insert_with(|| json!(Utc::now().to_rfc3339()));
                    }
                }
                state
                    .tables
                    .entry(table.to_string())
                    .or_default()
                    .push(row.clone());

                if self.stats_trigger && table == GAME_RESULTS_TABLE {
                    if let Some(change) = Self::apply_stats_trigger(&mut state, &row) {
                        triggered.push(change);
                    }
                }
                inserted.push(row);
            }
        }

        for row in &inserted {
            self.publish(ChangeKind::Insert, table, row.clone(), None);
        }
        for (kind, record, old) in triggered {
            self.publish(kind, USER_STATS_TABLE, record, old);
        }
        if !self.echo_inserts.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(inserted)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryStore {
    async fn subscribe(
        &self,
        channel: &str,
        specs: Vec<ChangeSpec>,
    ) -> Result<ChangeSubscription, StoreError> {
        self.check(FailPoint::Subscribe)?;

        let mut bus = self.bus.subscribe();
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let active = self.active_subscriptions.clone();
        let name = channel.to_string();

        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = bus.recv() => match received {
                        Ok(event) => {
                            if !specs.iter().any(|spec| spec.matches(&event)) {
                                continue;
                            }
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            warn!(channel = %name, lagged = count, "Subscriber lagged, some changes dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            active.fetch_sub(1, Ordering::SeqCst);
            debug!(channel = %name, "In-memory channel closed");
        });

        Ok(ChangeSubscription::new(channel, events_rx, shutdown_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Choice, Outcome, RowId, NO_ROWS_CODE};
    use crate::ports::outbound::TableStoreExt;
    use std::time::Duration;
    use tokio::time::timeout;

    fn round(user: &UserId, name: &str, result: Outcome) -> GameResult {
        GameResult::new(user.clone(), name, Choice::Rock, Choice::Scissors, result)
    }

    #[tokio::test]
    async fn test_sign_up_and_sign_in() {
        let store = InMemoryStore::new();
        let user = store.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(store.get_user().await.unwrap(), Some(user.clone()));

        store.sign_out().await.unwrap();
        assert_eq!(store.get_user().await.unwrap(), None);

        let again = store.sign_in_with_password("a@x.io", "secret1").await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_auth_errors_are_verbatim() {
        let store = InMemoryStore::new();
        store.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        let dup = store.sign_up("a@x.io", "secret1", "alice").await.unwrap_err();
        assert_eq!(dup.to_string(), "User already registered");
        let bad = store.sign_in_with_password("a@x.io", "wrong!").await.unwrap_err();
        assert_eq!(bad.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn test_select_filter_order_limit() {
        let store = InMemoryStore::new();
        let user = UserId::new("u-1");
        for _ in 0..12 {
            store
                .insert_one::<_, GameResult>(GAME_RESULTS_TABLE, &round(&user, "alice", Outcome::Win))
                .await
                .unwrap();
        }
        store
            .insert_one::<_, GameResult>(
                GAME_RESULTS_TABLE,
                &round(&UserId::new("u-2"), "bob", Outcome::Loss),
            )
            .await
            .unwrap();

        let query = Query::select("*")
            .eq("user_id", &user)
            .order("id", false)
            .limit(10);
        let rows: Vec<GameResult> = store.select_as(GAME_RESULTS_TABLE, &query).await.unwrap();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|g| g.user_id == user));
        assert_eq!(rows[0].id, Some(RowId::Serial(12)));
    }

    #[tokio::test]
    async fn test_select_single_no_rows() {
        let store = InMemoryStore::new();
        let err = store
            .select_single(USER_STATS_TABLE, &Query::select("*").eq("user_id", "nobody"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(NO_ROWS_CODE));
    }

    #[tokio::test]
    async fn test_user_stats_unique() {
        let store = InMemoryStore::new();
        let stats = UserStats::empty(UserId::new("u-1"), "alice");
        store
            .insert_one::<_, UserStats>(USER_STATS_TABLE, &stats)
            .await
            .unwrap();
        let err = store
            .insert_one::<_, UserStats>(USER_STATS_TABLE, &stats)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.row_count(USER_STATS_TABLE), 1);
    }

    #[tokio::test]
    async fn test_stats_trigger_publishes_update() {
        let store = InMemoryStore::with_stats_trigger();
        let user = UserId::new("u-1");
        store
            .insert_one::<_, UserStats>(USER_STATS_TABLE, &UserStats::empty(user.clone(), "alice"))
            .await
            .unwrap();

        let mut sub = store
            .subscribe("stats", vec![ChangeSpec::updates(USER_STATS_TABLE)])
            .await
            .unwrap();
        store
            .insert_one::<_, GameResult>(GAME_RESULTS_TABLE, &round(&user, "alice", Outcome::Win))
            .await
            .unwrap();

        let event = timeout(Duration::from_millis(200), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        let stats: UserStats = event.record_as().unwrap();
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.total_games, 1);
        assert_eq!(stats.win_rate, Some(100.0));
    }

    #[tokio::test]
    async fn test_subscription_filters_specs() {
        let store = InMemoryStore::new();
        let mut sub = store
            .subscribe("games", vec![ChangeSpec::inserts(GAME_RESULTS_TABLE)])
            .await
            .unwrap();

        store
            .insert_one::<_, UserStats>(USER_STATS_TABLE, &UserStats::empty(UserId::new("u-1"), "a"))
            .await
            .unwrap();
        store
            .insert_one::<_, GameResult>(
                GAME_RESULTS_TABLE,
                &round(&UserId::new("u-1"), "a", Outcome::Draw),
            )
            .await
            .unwrap();

        let event = timeout(Duration::from_millis(200), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(event.table, GAME_RESULTS_TABLE);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_channel() {
        let store = InMemoryStore::new();
        let sub = store
            .subscribe("games", vec![ChangeSpec::inserts(GAME_RESULTS_TABLE)])
            .await
            .unwrap();
        assert_eq!(store.active_subscriptions(), 1);
        sub.unsubscribe();

        timeout(Duration::from_secs(1), async {
            while store.active_subscriptions() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription not released");
    }

    #[tokio::test]
    async fn test_fail_points() {
        let store = InMemoryStore::new();
        store.fail_on(FailPoint::Select);
        assert!(store.select(GAME_RESULTS_TABLE, &Query::select("*")).await.is_err());
        store.recover(FailPoint::Select);
        assert!(store.select(GAME_RESULTS_TABLE, &Query::select("*")).await.is_ok());
    }

    #[tokio::test]
    async fn test_uuid_row_ids_and_silent_insert() {
        let store = InMemoryStore::new().with_uuid_row_ids();
        let user = UserId::new("u-1");
        let echoed: Option<GameResult> = store
            .insert_one(GAME_RESULTS_TABLE, &round(&user, "alice", Outcome::Win))
            .await
            .unwrap();
        assert_eq!(
            echoed.unwrap().id,
            Some(RowId::from("00000000-0000-4000-8000-000000000001"))
        );

        store.set_insert_echo(false);
        let echoed: Option<GameResult> = store
            .insert_one(GAME_RESULTS_TABLE, &round(&user, "alice", Outcome::Win))
            .await
            .unwrap();
        assert!(echoed.is_none());
        assert_eq!(store.row_count(GAME_RESULTS_TABLE), 2);
    }
}

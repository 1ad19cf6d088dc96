//! Connection pool over pipelined [`Session`]s.
//!
//! The pool owns every session it creates; callers borrow one through
//! [`ScopedConnection`], which returns it on drop. An entry sits in the
//! idle queue exactly when nobody holds it and it is not being torn down.
//! Every entry completes the full connect/auth/select handshake before it
//! can be acquired — the pool never hands out an unconnected session.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::Notify;

use crate::cmd::cmd;
use crate::connection::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use crate::errors::ErrorKind;
use crate::types::{ProtocolVersion, RedisResult};

use super::session::{Session, SessionConfig};

/// Deadline for PING probes used by validation and health checks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional username for AUTH.
    pub username: Option<String>,
    /// Optional password for AUTH.
    pub password: Option<String>,
    /// Database index selected on every connection.
    pub db: i64,
    /// Protocol negotiated on every connection.
    pub protocol: ProtocolVersion,

    /// Lower bound the pool maintains (health checks replenish to this).
    pub min_connections: usize,
    /// Hard upper bound on live connections.
    pub max_connections: usize,
    /// Connections created by [`ConnectionPool::initialize`].
    pub initial_connections: usize,

    /// How long [`ConnectionPool::acquire`] waits for an entry.
    pub acquire_timeout: Duration,
    /// Idle entries older than this are evicted (down to `min_connections`).
    pub idle_timeout: Duration,
    /// Deadline for establishing one TCP connection.
    pub connect_timeout: Duration,

    /// Whether the background health check task runs.
    pub health_check_enabled: bool,
    /// Period of the background health check task.
    pub health_check_interval: Duration,

    /// PING entries before handing them out.
    pub validate_on_acquire: bool,
    /// PING entries when they come back.
    pub validate_on_return: bool,

    /// Creation retries when replacing a dead connection.
    pub max_reconnect_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
            protocol: ProtocolVersion::RESP2,
            min_connections: 2,
            max_connections: 10,
            initial_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(3),
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
            validate_on_acquire: false,
            validate_on_return: false,
            max_reconnect_attempts: 3,
        }
    }
}

impl PoolConfig {
    /// A configuration for the given address with default sizing.
    pub fn new(host: impl Into<String>, port: u16) -> PoolConfig {
        PoolConfig {
            host: host.into(),
            port,
            ..PoolConfig::default()
        }
    }

    /// Checks the sizing invariants: `min ≤ initial ≤ max` and `max ≥ 1`.
    pub fn validate(&self) -> bool {
        self.min_connections <= self.initial_connections
            && self.initial_connections <= self.max_connections
            && self.max_connections >= 1
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                protocol: self.protocol,
            },
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Some(self.connect_timeout),
            ..SessionConfig::default()
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Clone, Debug, Default)]
pub struct PoolStats {
    /// Live connections owned by the pool.
    pub total_connections: usize,
    /// Connections sitting in the idle queue.
    pub available_connections: usize,
    /// Connections currently checked out.
    pub active_connections: usize,
    /// Acquirers blocked waiting for an entry.
    pub waiting_requests: usize,
    /// Lifetime acquire count.
    pub total_acquired: u64,
    /// Lifetime release count.
    pub total_released: u64,
    /// Lifetime connection creations.
    pub total_created: u64,
    /// Lifetime connection destructions.
    pub total_destroyed: u64,
    /// PING probes that failed during health checks.
    pub health_check_failures: u64,
    /// Replacement connection attempts.
    pub reconnect_attempts: u64,
    /// Replacement connections that handshook successfully.
    pub reconnect_successes: u64,
    /// Validation probes that failed on acquire or return.
    pub validation_failures: u64,
    /// Mean time an acquire took, in milliseconds.
    pub avg_acquire_time_ms: f64,
    /// Worst time an acquire took, in milliseconds.
    pub max_acquire_time_ms: f64,
    /// Highest number of simultaneously checked-out connections seen.
    pub peak_active_connections: usize,
}

struct PoolEntry {
    id: u64,
    session: Session,
    last_used: Mutex<Instant>,
    healthy: AtomicBool,
}

impl PoolEntry {
    fn new(id: u64, session: Session) -> Arc<PoolEntry> {
        Arc::new(PoolEntry {
            id,
            session,
            last_used: Mutex::new(Instant::now()),
            healthy: AtomicBool::new(true),
        })
    }

    fn touch(&self) {
        *self
            .last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_time(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst) && !self.session.is_closed()
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct PoolCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    health_check_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_successes: AtomicU64,
    validation_failures: AtomicU64,
    waiting: AtomicUsize,
    total_acquire_time_ms: AtomicU64,
    max_acquire_time_ms: AtomicU64,
    peak_active: AtomicUsize,
}

struct PoolState {
    all: Vec<Arc<PoolEntry>>,
    idle: VecDeque<Arc<PoolEntry>>,
    /// Handshakes in flight; these reserve capacity so concurrent acquires
    /// cannot push the pool past `max_connections`.
    creating: usize,
    next_id: u64,
}

struct PoolShared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Notify,
    shutting_down: AtomicBool,
    initialized: AtomicBool,
    counters: PoolCounters,
}

impl PoolShared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Removes the entry from the book-keeping and closes its session.
    /// Counts a destruction only when this call actually removed it, so a
    /// racing shutdown cannot double-count.
    fn destroy_entry(&self, entry: &Arc<PoolEntry>) {
        let removed = {
            let mut state = self.state();
            let before = state.all.len();
            state.all.retain(|candidate| candidate.id != entry.id);
            state.idle.retain(|candidate| candidate.id != entry.id);
            state.all.len() != before
        };
        entry.session.close();
        if removed {
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            log::debug!("pool destroyed connection #{}", entry.id);
        }
        // Capacity freed: someone waiting may now create a replacement.
        self.available.notify_one();
    }

    fn return_to_idle(&self, entry: Arc<PoolEntry>) {
        entry.touch();
        let mut state = self.state();
        if state.all.iter().any(|candidate| candidate.id == entry.id) {
            state.idle.push_back(entry);
            drop(state);
        } else {
            drop(state);
            // A shutdown raced the return; the entry is no longer tracked.
            entry.session.close();
        }
        self.available.notify_one();
    }

    fn record_acquire(&self, started: Instant) {
        let counters = &self.counters;
        counters.acquired.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        counters
            .total_acquire_time_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        counters
            .max_acquire_time_ms
            .fetch_max(elapsed_ms, Ordering::Relaxed);
        let active = {
            let state = self.state();
            state.all.len() - state.idle.len()
        };
        counters.peak_active.fetch_max(active, Ordering::Relaxed);
    }
}

/// Releases an entry back to the pool; shared by explicit release and the
/// guard's `Drop`.
fn release_entry(shared: &Arc<PoolShared>, entry: Arc<PoolEntry>) {
    shared.counters.released.fetch_add(1, Ordering::Relaxed);

    let over_cap = shared.state().all.len() > shared.config.max_connections;
    if shared.is_shutting_down() || !entry.is_healthy() || over_cap {
        shared.destroy_entry(&entry);
        return;
    }

    if shared.config.validate_on_return {
        // `Drop` cannot await; probe on a task and pool or destroy after.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shared = Arc::clone(shared);
            handle.spawn(async move {
                if probe(&entry.session).await {
                    shared.return_to_idle(entry);
                } else {
                    shared
                        .counters
                        .validation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    shared.destroy_entry(&entry);
                }
            });
            return;
        }
    }
    shared.return_to_idle(entry);
}

/// PING probe with a bounded deadline; any non-error reply passes.
async fn probe(session: &Session) -> bool {
    let ping_cmd = cmd("PING");
    let ping = session.execute(&ping_cmd);
    match tokio::time::timeout(PROBE_TIMEOUT, ping).await {
        Ok(Ok(reply)) => !reply.is_error(),
        _ => false,
    }
}

/// A pool of pipelined sessions with lifecycle management: sizing between
/// `min` and `max`, acquire with deadline, optional validation, periodic
/// health checks and idle eviction.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("total", &stats.total_connections)
            .field("available", &stats.available_connections)
            .field("shutting_down", &self.shared.is_shutting_down())
            .finish()
    }
}

impl ConnectionPool {
    /// Creates a pool. No connections are opened until
    /// [`initialize`](Self::initialize).
    pub fn new(config: PoolConfig) -> RedisResult<ConnectionPool> {
        if !config.validate() {
            fail!((
                ErrorKind::Command,
                "Invalid pool configuration",
                format!(
                    "min={} initial={} max={}",
                    config.min_connections, config.initial_connections, config.max_connections
                )
            ));
        }
        Ok(ConnectionPool {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    all: Vec::new(),
                    idle: VecDeque::new(),
                    creating: 0,
                    next_id: 0,
                }),
                available: Notify::new(),
                shutting_down: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                counters: PoolCounters::default(),
            }),
        })
    }

    /// Opens the initial connections, each through the full handshake.
    /// Succeeds when at least `min_connections` of them came up.
    pub async fn initialize(&self) -> RedisResult<()> {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let wanted = self.shared.config.initial_connections;
        // Reserve the slots up front: `initialized` is already observable,
        // so a concurrent acquire must see these handshakes as capacity in
        // use or it could push the pool past `max_connections`.
        self.shared.state().creating += wanted;
        let attempts = (0..wanted).map(|_| async {
            let result = self.create_entry().await;
            self.shared.state().creating -= 1;
            result
        });
        let results = join_all(attempts).await;

        let mut connected = 0usize;
        let mut last_error = None;
        for result in results {
            match result {
                Ok(entry) => {
                    self.shared.return_to_idle(entry);
                    connected += 1;
                }
                Err(err) => last_error = Some(err),
            }
        }
        if connected < self.shared.config.min_connections {
            self.shared.initialized.store(false, Ordering::SeqCst);
            self.shutdown_entries();
            let detail = last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no connection attempt succeeded".to_string());
            fail!((
                ErrorKind::Network,
                "Pool initialization failed",
                format!("{connected}/{wanted} connections established: {detail}")
            ));
        }
        log::debug!("pool initialized with {connected} connections");
        if self.shared.config.health_check_enabled {
            self.spawn_maintenance();
        }
        Ok(())
    }

    /// Borrows a session, waiting up to `acquire_timeout` for one to free
    /// up. Unhealthy idle entries found along the way are destroyed.
    pub async fn acquire(&self) -> RedisResult<ScopedConnection> {
        if self.shared.is_shutting_down() {
            fail!((ErrorKind::ConnectionClosed, "Pool is shutting down"));
        }
        if !self.shared.initialized.load(Ordering::SeqCst) {
            fail!((ErrorKind::Command, "Pool is not initialized"));
        }
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.shared.config.acquire_timeout;

        self.shared.counters.waiting.fetch_add(1, Ordering::Relaxed);
        let result = self.acquire_inner(started, deadline).await;
        self.shared.counters.waiting.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn acquire_inner(
        &self,
        started: Instant,
        deadline: tokio::time::Instant,
    ) -> RedisResult<ScopedConnection> {
        loop {
            if self.shared.is_shutting_down() {
                fail!((ErrorKind::ConnectionClosed, "Pool is shutting down"));
            }
            // Idle entries first, discarding the dead ones. The lock is
            // released before any await point.
            loop {
                let popped = { self.shared.state().idle.pop_front() };
                let Some(entry) = popped else { break };
                if !entry.is_healthy() {
                    self.shared.destroy_entry(&entry);
                    continue;
                }
                if self.shared.config.validate_on_acquire && !probe(&entry.session).await {
                    self.shared
                        .counters
                        .validation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    self.shared.destroy_entry(&entry);
                    continue;
                }
                entry.touch();
                self.shared.record_acquire(started);
                return Ok(ScopedConnection {
                    shared: Arc::clone(&self.shared),
                    entry: Some(entry),
                });
            }

            // Room below the cap: create a fresh connection, reserving the
            // slot while the handshake runs.
            let reserved = {
                let mut state = self.shared.state();
                if state.all.len() + state.creating < self.shared.config.max_connections {
                    state.creating += 1;
                    true
                } else {
                    false
                }
            };
            if reserved {
                let created = self.create_entry().await;
                self.shared.state().creating -= 1;
                let entry = created?;
                entry.touch();
                self.shared.record_acquire(started);
                return Ok(ScopedConnection {
                    shared: Arc::clone(&self.shared),
                    entry: Some(entry),
                });
            }

            // At capacity: wait for a release or the deadline.
            if tokio::time::timeout_at(deadline, self.shared.available.notified())
                .await
                .is_err()
            {
                fail!((ErrorKind::Timeout, "Timed out waiting for a pooled connection"));
            }
        }
    }

    /// Returns a borrowed connection to the pool. Equivalent to dropping
    /// the handle; provided for callers that prefer the explicit form.
    pub fn release(&self, conn: ScopedConnection) {
        conn.release();
    }

    /// Probes every idle connection, destroys the failures, and replenishes
    /// the pool back to `min_connections`. Returns how many were removed.
    pub async fn health_check(&self) -> usize {
        if self.shared.is_shutting_down() {
            return 0;
        }
        let candidates: Vec<Arc<PoolEntry>> = {
            let mut state = self.shared.state();
            state.idle.drain(..).collect()
        };
        let probes = candidates.iter().map(|entry| probe(&entry.session));
        let outcomes = join_all(probes).await;

        let mut removed = 0;
        for (entry, ok) in candidates.into_iter().zip(outcomes) {
            if ok {
                self.shared.return_to_idle(entry);
            } else {
                self.shared
                    .counters
                    .health_check_failures
                    .fetch_add(1, Ordering::Relaxed);
                entry.set_healthy(false);
                self.shared.destroy_entry(&entry);
                removed += 1;
            }
        }
        if removed > 0 {
            log::warn!("pool health check removed {removed} connections");
        }
        self.replenish_to_min().await;
        removed
    }

    /// Evicts idle entries older than `idle_timeout`, never dropping the
    /// pool below `min_connections`. Returns how many were evicted.
    pub fn idle_cleanup(&self) -> usize {
        let idle_timeout = self.shared.config.idle_timeout;
        let min = self.shared.config.min_connections;
        let expired: Vec<Arc<PoolEntry>> = {
            let mut state = self.shared.state();
            let mut expired = Vec::new();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut total = state.all.len();
            while let Some(entry) = state.idle.pop_front() {
                if total > min && entry.idle_time() > idle_timeout {
                    expired.push(entry);
                    total -= 1;
                } else {
                    kept.push_back(entry);
                }
            }
            state.idle = kept;
            expired
        };
        let evicted = expired.len();
        for entry in expired {
            self.shared.destroy_entry(&entry);
        }
        if evicted > 0 {
            log::debug!("pool evicted {evicted} idle connections");
        }
        evicted
    }

    /// Tops the pool back up to `min_connections`.
    pub async fn warmup(&self) {
        self.replenish_to_min().await;
    }

    /// Creates up to `count` additional connections, bounded by
    /// `max_connections`. Returns how many were actually created.
    pub async fn expand(&self, count: usize) -> usize {
        let mut created = 0;
        for _ in 0..count {
            let reserved = {
                let mut state = self.shared.state();
                if state.all.len() + state.creating < self.shared.config.max_connections
                    && !self.shared.is_shutting_down()
                {
                    state.creating += 1;
                    true
                } else {
                    false
                }
            };
            if !reserved {
                break;
            }
            let result = self.create_entry().await;
            self.shared.state().creating -= 1;
            match result {
                Ok(entry) => {
                    self.shared.return_to_idle(entry);
                    created += 1;
                }
                Err(err) => {
                    log::warn!("pool expand failed: {err}");
                    break;
                }
            }
        }
        created
    }

    /// Destroys idle connections until the total drops to `target`
    /// (clamped to at least `min_connections`). Checked-out entries are
    /// not touched. Returns how many were removed.
    pub fn shrink(&self, target: usize) -> usize {
        let target = target.max(self.shared.config.min_connections);
        let victims: Vec<Arc<PoolEntry>> = {
            let mut state = self.shared.state();
            let mut victims = Vec::new();
            while state.all.len() - victims.len() > target {
                match state.idle.pop_front() {
                    Some(entry) => victims.push(entry),
                    None => break,
                }
            }
            victims
        };
        let removed = victims.len();
        for entry in victims {
            self.shared.destroy_entry(&entry);
        }
        removed
    }

    /// Closes every connection and fails all waiters. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("pool shutting down");
        self.shutdown_entries();
        // Wake every waiter so they observe the shutdown flag.
        self.shared.available.notify_waiters();
    }

    fn shutdown_entries(&self) {
        let entries: Vec<Arc<PoolEntry>> = {
            let mut state = self.shared.state();
            state.idle.clear();
            state.all.drain(..).collect()
        };
        for entry in entries {
            entry.session.close();
            self.shared.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A snapshot of the pool metrics.
    pub fn stats(&self) -> PoolStats {
        let (total, available) = {
            let state = self.shared.state();
            (state.all.len(), state.idle.len())
        };
        let counters = &self.shared.counters;
        let acquired = counters.acquired.load(Ordering::Relaxed);
        let total_acquire_time = counters.total_acquire_time_ms.load(Ordering::Relaxed);
        PoolStats {
            total_connections: total,
            available_connections: available,
            active_connections: total - available,
            waiting_requests: counters.waiting.load(Ordering::Relaxed),
            total_acquired: acquired,
            total_released: counters.released.load(Ordering::Relaxed),
            total_created: counters.created.load(Ordering::Relaxed),
            total_destroyed: counters.destroyed.load(Ordering::Relaxed),
            health_check_failures: counters.health_check_failures.load(Ordering::Relaxed),
            reconnect_attempts: counters.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_successes: counters.reconnect_successes.load(Ordering::Relaxed),
            validation_failures: counters.validation_failures.load(Ordering::Relaxed),
            avg_acquire_time_ms: if acquired == 0 {
                0.0
            } else {
                total_acquire_time as f64 / acquired as f64
            },
            max_acquire_time_ms: counters.max_acquire_time_ms.load(Ordering::Relaxed) as f64,
            peak_active_connections: counters.peak_active.load(Ordering::Relaxed),
        }
    }

    /// The configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    async fn create_entry(&self) -> RedisResult<Arc<PoolEntry>> {
        let info = self.shared.config.connection_info();
        let session = Session::connect(&info, self.shared.config.session_config()).await?;
        let entry = {
            // The shutdown check must hold the state lock: shutdown drains
            // `all` under this lock after raising the flag, so either the
            // entry is registered before the drain (and gets closed by it)
            // or the flag is already visible here and the entry never
            // registers at all.
            let mut state = self.shared.state();
            if self.shared.is_shutting_down() {
                drop(state);
                session.close();
                fail!((ErrorKind::ConnectionClosed, "Pool is shutting down"));
            }
            state.next_id += 1;
            let entry = PoolEntry::new(state.next_id, session);
            state.all.push(Arc::clone(&entry));
            entry
        };
        self.shared.counters.created.fetch_add(1, Ordering::Relaxed);
        log::debug!("pool created connection #{}", entry.id);
        Ok(entry)
    }

    async fn create_entry_with_retry(&self) -> RedisResult<Arc<PoolEntry>> {
        let attempts = self.shared.config.max_reconnect_attempts.max(1);
        let mut last_error = None;
        for _ in 0..attempts {
            self.shared
                .counters
                .reconnect_attempts
                .fetch_add(1, Ordering::Relaxed);
            match self.create_entry().await {
                Ok(entry) => {
                    self.shared
                        .counters
                        .reconnect_successes
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(entry);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| (ErrorKind::Network, "Reconnect failed").into()))
    }

    async fn replenish_to_min(&self) {
        loop {
            let reserved = {
                let mut state = self.shared.state();
                if state.all.len() + state.creating < self.shared.config.min_connections
                    && !self.shared.is_shutting_down()
                {
                    state.creating += 1;
                    true
                } else {
                    false
                }
            };
            if !reserved {
                return;
            }
            let result = self.create_entry_with_retry().await;
            self.shared.state().creating -= 1;
            match result {
                Ok(entry) => self.shared.return_to_idle(entry),
                Err(err) => {
                    log::warn!("pool replenish failed: {err}");
                    return;
                }
            }
        }
    }

    fn spawn_maintenance(&self) {
        let weak = Arc::downgrade(&self.shared);
        let interval = self.shared.config.health_check_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let pool = match weak.upgrade() {
                    Some(shared) => ConnectionPool { shared },
                    None => break,
                };
                if pool.shared.is_shutting_down() {
                    break;
                }
                pool.health_check().await;
                pool.idle_cleanup();
            }
        });
    }
}

/// RAII handle to a pooled session.
///
/// Move-only; the entry flows back to the pool when the handle drops. A
/// handle that was explicitly [`release`](Self::release)d (or moved from)
/// releases nothing on drop.
pub struct ScopedConnection {
    shared: Arc<PoolShared>,
    entry: Option<Arc<PoolEntry>>,
}

impl ScopedConnection {
    /// The borrowed session.
    pub fn session(&self) -> &Session {
        // The entry is only ever `None` after release(), which consumes
        // the handle.
        match &self.entry {
            Some(entry) => &entry.session,
            None => unreachable!("ScopedConnection used after release"),
        }
    }

    /// Marks the borrowed connection as broken; the pool will destroy it
    /// on return instead of pooling it.
    pub fn mark_unhealthy(&self) {
        if let Some(entry) = &self.entry {
            entry.set_healthy(false);
        }
    }

    /// Returns the connection to the pool early.
    pub fn release(mut self) {
        if let Some(entry) = self.entry.take() {
            release_entry(&self.shared, entry);
        }
    }
}

impl Deref for ScopedConnection {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session()
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            release_entry(&self.shared, entry);
        }
    }
}

impl fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("entry", &self.entry.as_ref().map(|entry| entry.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(PoolConfig::default().validate());

        let bad = PoolConfig {
            min_connections: 5,
            initial_connections: 2,
            max_connections: 10,
            ..PoolConfig::default()
        };
        assert!(!bad.validate());
        assert!(ConnectionPool::new(bad).is_err());

        let bad = PoolConfig {
            min_connections: 0,
            initial_connections: 0,
            max_connections: 0,
            ..PoolConfig::default()
        };
        assert!(!bad.validate());
    }

    #[test]
    fn stats_start_at_zero() {
        let pool = ConnectionPool::new(PoolConfig::default()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.total_acquired, 0);
        assert_eq!(stats.avg_acquire_time_ms, 0.0);
    }
}

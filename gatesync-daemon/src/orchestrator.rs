//! Credential → fetch → merge, once or in a loop.
//!
//! ```text
//! ACQUIRE_CREDENTIAL → FETCH → UPDATE → (done | SLEEP → ACQUIRE_CREDENTIAL)
//! ```
//!
//! - Acquire: a fresh stored token is used as-is; a stale one is refreshed
//!   with its refresh token. Only the one-shot run falls back to the
//!   interactive device flow; the continuous loop fails with
//!   [`DaemonError::NoSession`] / [`DaemonError::ReauthRequired`] instead.
//! - Fetch: one forced refresh-and-retry on 401, a second 401 is fatal.
//!   403 is fatal immediately. Network errors are fatal for a one-shot run
//!   and skip the cycle in the loop.
//! - Update: an empty server list is fatal for a one-shot run and a warning
//!   in the loop.
//! - Sleep: see [`next_sleep`].
//!
//! HTTP and file work is blocking and runs on the blocking pool; the
//! orchestrator itself only awaits and sleeps.

use std::sync::Arc;
use std::time::Duration;

use gatesync_client::{
    ApiError, DevicePollSchedule, HttpTransport, OAuthDeviceClient, PollOutcome, RegistryClient,
};
use gatesync_core::{
    Clock, GatewayPaths, RunMode, ServerEntry, SyncConfig, SystemClock, TokenRecord, TokenStore,
    EXPIRY_SAFETY_SECS,
};
use gatesync_settings::{MergeMode, SettingsFile, SettingsUpdate, WriteResult};

use crate::error::DaemonError;
use crate::guard::InstanceGuard;
use crate::shutdown::{Shutdown, Wait};
use crate::sink::{OutputSink, TracingSink};

/// Floor for the loop's sleep between cycles.
pub const MIN_SLEEP_SECS: u64 = 10;

/// Sleep until shortly before `record` goes stale:
/// `max(10, min(expires_in - 60, stale_at - now))` seconds.
pub fn next_sleep(record: &TokenRecord, now: u64) -> Duration {
    let by_lifetime = record.expires_in.saturating_sub(EXPIRY_SAFETY_SECS);
    let by_deadline = record.stale_at().saturating_sub(now);
    Duration::from_secs(by_lifetime.min(by_deadline).max(MIN_SLEEP_SECS))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub servers: Vec<ServerEntry>,
    pub update: SettingsUpdate,
    pub token: TokenRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Synced { report: SyncReport, next_sleep: Duration },
    /// Soft failure; the loop tries again after `next_sleep`.
    Skipped { reason: String, next_sleep: Duration },
    Cancelled,
}

impl CycleOutcome {
    pub fn next_sleep(&self) -> Option<Duration> {
        match self {
            CycleOutcome::Synced { next_sleep, .. } | CycleOutcome::Skipped { next_sleep, .. } => {
                Some(*next_sleep)
            }
            CycleOutcome::Cancelled => None,
        }
    }
}

/// Result of the non-interactive credential path.
enum Credential {
    Ready(TokenRecord),
    /// No record, no refresh token, or the refresh failed.
    Unavailable(Option<ApiError>),
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    oauth: OAuthDeviceClient,
    registry: RegistryClient,
    registry_base: String,
    tokens: TokenStore,
    settings: SettingsFile,
    guard: InstanceGuard,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn OutputSink>,
}

impl SyncOrchestrator {
    pub fn new(
        config: &SyncConfig,
        paths: &GatewayPaths,
        transport: Arc<dyn HttpTransport>,
        guard: InstanceGuard,
    ) -> Self {
        Self {
            oauth: OAuthDeviceClient::new(config, transport.clone()),
            registry: RegistryClient::new(config, transport),
            registry_base: config.registry_base().to_string(),
            tokens: TokenStore::new(&paths.token),
            settings: SettingsFile::new(&paths.settings),
            guard,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn guard(&self) -> &InstanceGuard {
        &self.guard
    }

    // -- one-shot -----------------------------------------------------------

    /// Login entry point: guard check, credential (interactive fallback
    /// allowed), fetch, merge. Does not claim the loop.
    pub async fn run_once(&self, mode: MergeMode, shutdown: &Shutdown) -> Result<SyncReport, DaemonError> {
        self.guard.ensure_available()?;

        let token = match self.acquire_noninteractive().await? {
            Credential::Ready(token) => {
                self.sink.info("Using existing session (no browser login needed).");
                token
            }
            Credential::Unavailable(reason) => {
                if let Some(err) = reason {
                    tracing::warn!(error = %err, "token refresh failed; falling back to browser login");
                }
                self.login_interactive(shutdown).await?
            }
        };
        if shutdown.is_triggered() {
            return Err(DaemonError::Cancelled);
        }

        let (token, servers) = self.fetch_with_retry(token).await?;
        if servers.is_empty() {
            return Err(DaemonError::NoServers);
        }
        if shutdown.is_triggered() {
            return Err(DaemonError::Cancelled);
        }

        let update = self.apply_settings(&token, &servers, mode).await?;
        Ok(SyncReport {
            servers,
            update,
            token,
        })
    }

    // -- continuous ---------------------------------------------------------

    /// Claim the loop and run cycles until cancelled or a fatal error. The
    /// state file is released on every exit path.
    pub async fn run_watch(&self, mode: MergeMode, run_mode: RunMode, shutdown: &Shutdown) -> Result<(), DaemonError> {
        let claim = self.guard.claim(run_mode, self.clock.now_unix())?;
        tracing::info!(pid = claim.pid(), %run_mode, ?mode, "sync loop started");

        let result = self.watch_cycles(mode, shutdown).await;
        match &result {
            Ok(()) => tracing::info!("sync loop stopped"),
            Err(err) => tracing::error!(error = %err, "sync loop failed"),
        }
        drop(claim);
        result
    }

    async fn watch_cycles(&self, mode: MergeMode, shutdown: &Shutdown) -> Result<(), DaemonError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }
            let Some(sleep) = self.run_cycle(mode, shutdown).await?.next_sleep() else {
                return Ok(());
            };
            tracing::debug!(secs = sleep.as_secs(), "sleeping until next sync");
            if shutdown.sleep(sleep).await == Wait::Cancelled {
                return Ok(());
            }
        }
    }

    /// One non-interactive cycle of the continuous loop.
    pub async fn run_cycle(&self, mode: MergeMode, shutdown: &Shutdown) -> Result<CycleOutcome, DaemonError> {
        let token = match self.acquire_noninteractive().await? {
            Credential::Ready(token) => token,
            Credential::Unavailable(None) => return Err(DaemonError::NoSession),
            Credential::Unavailable(Some(err)) if err.is_transient() => {
                self.sink.warn(&format!("token refresh failed, retrying later: {err}"));
                return Ok(CycleOutcome::Skipped {
                    reason: err.to_string(),
                    next_sleep: Duration::from_secs(MIN_SLEEP_SECS),
                });
            }
            Credential::Unavailable(Some(err)) => return Err(refresh_failure(err)),
        };
        if shutdown.is_triggered() {
            return Ok(CycleOutcome::Cancelled);
        }

        let (token, servers) = match self.fetch_with_retry(token.clone()).await {
            Ok(fetched) => fetched,
            Err(err) if err.is_transient() => {
                self.sink.warn(&format!("registry unreachable, skipping this cycle: {err}"));
                return Ok(CycleOutcome::Skipped {
                    reason: err.to_string(),
                    next_sleep: next_sleep(&token, self.clock.now_unix()),
                });
            }
            Err(err) => return Err(err),
        };
        let sleep = next_sleep(&token, self.clock.now_unix());

        if servers.is_empty() {
            self.sink.warn("no servers in registry; settings left unchanged this cycle");
            return Ok(CycleOutcome::Skipped {
                reason: "registry returned no servers".to_string(),
                next_sleep: sleep,
            });
        }
        if shutdown.is_triggered() {
            return Ok(CycleOutcome::Cancelled);
        }

        let update = self.apply_settings(&token, &servers, mode).await?;
        Ok(CycleOutcome::Synced {
            report: SyncReport {
                servers,
                update,
                token,
            },
            next_sleep: sleep,
        })
    }

    // -- credential ---------------------------------------------------------

    async fn acquire_noninteractive(&self) -> Result<Credential, DaemonError> {
        let Some(current) = self.tokens.load() else {
            return Ok(Credential::Unavailable(None));
        };
        if current.is_fresh_at(self.clock.now_unix()) {
            tracing::debug!("using fresh access token");
            return Ok(Credential::Ready(current));
        }
        if current.refresh_token().is_none() {
            return Ok(Credential::Unavailable(None));
        }
        match self.refresh(&current).await? {
            Ok(token) => Ok(Credential::Ready(token)),
            Err(err) => Ok(Credential::Unavailable(Some(err))),
        }
    }

    /// Refresh and persist. The outer error is local (join/store, or no
    /// refresh token at all); the inner one is the provider's answer.
    async fn refresh(&self, current: &TokenRecord) -> Result<Result<TokenRecord, ApiError>, DaemonError> {
        let Some(refresh_token) = current.refresh_token().map(str::to_owned) else {
            return Err(DaemonError::ReauthRequired);
        };
        let oauth = self.oauth.clone();
        let grant = blocking("token refresh", move || Ok(oauth.refresh(&refresh_token))).await?;
        match grant {
            Ok(grant) => {
                let token = current.superseded_by(grant, self.clock.now_unix());
                self.tokens.save(&token)?;
                tracing::info!(expires_in = token.expires_in, "access token refreshed");
                Ok(Ok(token))
            }
            Err(err) => Ok(Err(err)),
        }
    }

    /// Device authorization grant, polled until granted, rejected, expired
    /// or cancelled.
    pub async fn login_interactive(&self, shutdown: &Shutdown) -> Result<TokenRecord, DaemonError> {
        let oauth = self.oauth.clone();
        let authorization =
            blocking("device authorization", move || Ok(oauth.start_device_authorization()?)).await?;

        self.sink.info(&format!(
            "Open this URL in your browser to authenticate:\n    {}",
            authorization.verification_target()
        ));
        self.sink.info("Waiting for login...");

        let mut schedule = DevicePollSchedule::for_authorization(&authorization);
        let started = tokio::time::Instant::now();
        loop {
            if schedule.expired(started.elapsed()) {
                return Err(ApiError::DeviceFlowExpired.into());
            }
            if shutdown.sleep(schedule.interval()).await == Wait::Cancelled {
                return Err(DaemonError::Cancelled);
            }

            let oauth = self.oauth.clone();
            let device_code = authorization.device_code.clone();
            let outcome =
                blocking("device token poll", move || Ok(oauth.poll_device_token(&device_code)?)).await?;
            match outcome {
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => {
                    schedule.slow_down();
                    tracing::debug!(interval = ?schedule.interval(), "provider asked to slow down");
                }
                PollOutcome::Granted(grant) => {
                    let token = TokenRecord::from_grant(grant, self.clock.now_unix());
                    self.tokens.save(&token)?;
                    self.sink.info("Login successful.");
                    return Ok(token);
                }
            }
        }
    }

    // -- fetch / update -----------------------------------------------------

    /// Registry fetch with exactly one forced refresh on 401. Returns the
    /// token actually used.
    async fn fetch_with_retry(&self, token: TokenRecord) -> Result<(TokenRecord, Vec<ServerEntry>), DaemonError> {
        match self.fetch(&token).await? {
            Ok(servers) => return Ok((token, servers)),
            Err(err) if err.is_unauthorized() => {
                tracing::warn!("registry rejected the access token; refreshing once");
            }
            Err(err) => return Err(err.into()),
        }

        let token = self.refresh(&token).await?.map_err(refresh_failure)?;

        match self.fetch(&token).await? {
            Ok(servers) => Ok((token, servers)),
            Err(err) if err.is_unauthorized() => Err(DaemonError::ReauthRequired),
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch(&self, token: &TokenRecord) -> Result<Result<Vec<ServerEntry>, ApiError>, DaemonError> {
        let registry = self.registry.clone();
        let access_token = token.access_token.clone();
        blocking("registry fetch", move || Ok(registry.fetch(&access_token))).await
    }

    async fn apply_settings(
        &self,
        token: &TokenRecord,
        servers: &[ServerEntry],
        mode: MergeMode,
    ) -> Result<SettingsUpdate, DaemonError> {
        let settings = self.settings.clone();
        let access_token = token.access_token.clone();
        let servers = servers.to_vec();
        let base = self.registry_base.clone();
        let update = blocking("settings update", move || {
            Ok(settings.apply(&access_token, &servers, &base, mode)?)
        })
        .await?;
        let report = &update.report;
        for name in &report.upserted {
            self.sink.info(&format!("Upserted MCP server (registry): {name}"));
        }
        for name in &report.pruned {
            self.sink.info(&format!("Pruned MCP server (no longer in registry): {name}"));
        }
        match &update.write {
            WriteResult::Written { path } => self.sink.info(&format!("Updated {}.", path.display())),
            WriteResult::Unchanged { path } => {
                self.sink.info(&format!("{} already up to date.", path.display()))
            }
        }
        Ok(update)
    }
}

/// A rejected refresh means the session is gone, except for network
/// trouble and permission denials, which keep their own kind.
fn refresh_failure(err: ApiError) -> DaemonError {
    match err {
        err if err.is_transient() => err.into(),
        err @ ApiError::Forbidden { .. } => err.into(),
        _ => DaemonError::ReauthRequired,
    }
}

async fn blocking<T, F>(task: &'static str, work: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> Result<T, DaemonError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| DaemonError::Join {
            task,
            detail: err.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::Map;

    fn record(obtained_at: u64, expires_in: u64) -> TokenRecord {
        TokenRecord {
            access_token: "tok".into(),
            refresh_token: Some("ref".into()),
            expires_in,
            obtained_at,
            extra: Map::new(),
        }
    }

    #[rstest]
    #[case::fresh_login(1_000, 300, 1_000, 240)]
    #[case::short_lived(1_000, 30, 1_000, 10)]
    #[case::half_used(1_000, 300, 1_120, 120)]
    #[case::already_stale(1_000, 300, 2_000, 10)]
    #[case::clock_behind_grant(1_000, 300, 900, 240)]
    fn sleep_targets_staleness(
        #[case] obtained_at: u64,
        #[case] expires_in: u64,
        #[case] now: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(
            next_sleep(&record(obtained_at, expires_in), now),
            Duration::from_secs(expected)
        );
    }

    #[test]
    fn skipped_and_synced_carry_a_sleep() {
        let skipped = CycleOutcome::Skipped {
            reason: "x".into(),
            next_sleep: Duration::from_secs(10),
        };
        assert_eq!(skipped.next_sleep(), Some(Duration::from_secs(10)));
        assert_eq!(CycleOutcome::Cancelled.next_sleep(), None);
    }
}

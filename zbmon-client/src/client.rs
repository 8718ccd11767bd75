use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::StatsError;
use crate::proto::stats_report_client::StatsReportClient;
use crate::proto::{StatsReply, StatsRequest};
use crate::settings::SettingsStore;

const REQUEST_LABEL: &str = "Stats from zbmon";
const POLL_DEADLINE: Duration = Duration::from_secs(10);

/// Snapshot of the client-owned display state.
///
/// `last_reply`, `last_message` and `is_error` are always updated in a
/// single `watch` modification, so a reader never observes a reply
/// paired with an error flag from a different poll.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub last_message: String,
    pub is_error: bool,
    pub last_reply: StatsReply,
    pub is_polling: bool,
}

/// Client for the zbstats reporting service.
///
/// Owns one outbound gRPC channel and coordinates single-shot and
/// periodic polls. Cheap to clone; all clones share the transport,
/// the state channel and the repeat ticker.
#[derive(Clone)]
pub struct StatsClient {
    stub: StatsReportClient<Channel>,
    settings: Arc<SettingsStore>,
    state: Arc<watch::Sender<ClientState>>,
    ticker: Arc<Mutex<Option<CancellationToken>>>,
    clear_reply_on_error: Arc<AtomicBool>,
}

impl StatsClient {
    /// Creates a client for the service at `addr`
    /// (`scheme://host:port`, `https` selects TLS with native roots).
    ///
    /// Fails fast on a malformed URI. The transport itself is
    /// established lazily, so an unreachable endpoint surfaces from
    /// `poll_once` as [`StatsError::Connection`].
    pub fn connect(addr: &str, settings: Arc<SettingsStore>) -> Result<Self, StatsError> {
        let endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|err| StatsError::InvalidEndpoint(err.to_string()))?;

        let endpoint = if endpoint.uri().scheme_str() == Some("https") {
            endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|err| StatsError::InvalidEndpoint(err.to_string()))?
        } else {
            endpoint
        };

        let channel = endpoint.connect_lazy();

        Ok(Self {
            stub: StatsReportClient::new(channel),
            settings,
            state: Arc::new(watch::Sender::new(ClientState::default())),
            ticker: Arc::new(Mutex::new(None)),
            clear_reply_on_error: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Whether a failed poll clears `last_reply` (default: retained,
    /// so a renderer can keep showing last known good values next to
    /// the error message).
    pub fn set_clear_reply_on_error(&self, clear: bool) {
        self.clear_reply_on_error.store(clear, Ordering::Relaxed);
    }

    /// Immutable snapshot of the current client state.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Change notifications for the client state.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Sends one stats request built from the current settings and
    /// wall-clock time, then publishes the outcome.
    ///
    /// The error is returned for callers that want it, but it is also
    /// folded into the state, so the repeat driver can ignore it and a
    /// single failed poll never terminates the repeating sequence.
    pub async fn poll_once(&self) -> Result<StatsReply, StatsError> {
        let result = self.send(self.build_request()).await;

        match &result {
            Ok(reply) => {
                let reply = reply.clone();
                self.state.send_modify(|state| {
                    state.last_message = format!("Received: {} items.", reply.stats_count);
                    state.is_error = false;
                    state.last_reply = reply;
                });
            }
            Err(err) => {
                log::error!("stats request failed: {}", err);

                let clear = self.clear_reply_on_error.load(Ordering::Relaxed);
                let message = err.to_string();
                self.state.send_modify(|state| {
                    state.last_message = message;
                    state.is_error = true;
                    if clear {
                        state.last_reply = StatsReply::default();
                    }
                });
            }
        }

        result
    }

    /// Starts periodic polling. No-op if already repeating: at most
    /// one ticker exists per client, so a second call never spawns a
    /// concurrent timer. The first poll fires immediately; each
    /// subsequent poll fires `period` after the previous one finished,
    /// so ticker-driven polls never overlap.
    pub fn start_repeating(&self, period: Duration) {
        let mut ticker = self.ticker.lock();

        if ticker.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let client = self.clone();
        let tick_token = token.clone();

        tokio::spawn(async move {
            loop {
                let _ = client.poll_once().await;

                tokio::select! {
                    _ = tick_token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
        });

        self.state.send_modify(|state| state.is_polling = true);
        *ticker = Some(token);
    }

    /// Cancels the repeat ticker if one is active. Idempotent; never
    /// blocks on an in-flight poll — the poll is allowed to complete
    /// and its result is still applied, only future ticks are
    /// prevented.
    pub fn stop_repeating(&self) {
        if let Some(token) = self.ticker.lock().take() {
            token.cancel();
            self.state.send_modify(|state| state.is_polling = false);
        }
    }

    /// Stops polling and releases this handle on the transport. The
    /// channel itself is dropped once the last clone goes away.
    pub fn close(self) {
        self.stop_repeating();
    }

    fn build_request(&self) -> StatsRequest {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let lookback_secs = self.settings.lookback_minutes() as i64 * 60;

        StatsRequest {
            channel: self.settings.channel(),
            name: REQUEST_LABEL.to_string(),
            lqi: self.settings.min_lqi(),
            timestamp: (now_secs - lookback_secs) * 1_000_000,
        }
    }

    async fn send(&self, request: StatsRequest) -> Result<StatsReply, StatsError> {
        let mut stub = self.stub.clone();

        match timeout(POLL_DEADLINE, stub.get_stats(request)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(StatsError::from(status)),
            Err(_) => Err(StatsError::DeadlineExceeded),
        }
    }
}

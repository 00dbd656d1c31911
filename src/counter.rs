//! Remote engagement counter updates.
//!
//! The backend only offers "set field to value", so every like/view change is
//! sent as an absolute [`CounterCommand`]. Commands go through a
//! [`CounterOutbox`]: a bounded queue drained by one background thread, so the
//! reader's thread never waits on the network and commands land in the order
//! they were issued. Failed deliveries are retried with exponential backoff and
//! then logged and dropped; local optimistic state is never rolled back.

use crate::config::EngineConfig;
use crate::engagement::EntityKey;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterField {
    ViewCount,
    LikeCount,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            CounterField::ViewCount => "view_count",
            CounterField::LikeCount => "like_count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCommand {
    pub entity: EntityKey,
    pub field: CounterField,
    pub value: i64,
}

/// Remote store accepting absolute counter values.
pub trait CounterService: Send + Sync {
    fn set_count(&self, command: &CounterCommand) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; the first retry waits `backoff`.
        let exp = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

pub struct CounterOutbox {
    sender: Option<SyncSender<CounterCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl CounterOutbox {
    pub fn spawn(service: Arc<dyn CounterService>, capacity: usize, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::sync_channel::<CounterCommand>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("counter-outbox".to_string())
            .spawn(move || {
                for command in rx {
                    deliver(service.as_ref(), &command, policy);
                }
                debug!("Counter outbox drained");
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("Failed to start counter outbox worker: {err}");
                None
            }
        };
        Self {
            sender: Some(tx),
            worker,
        }
    }

    pub fn from_config(service: Arc<dyn CounterService>, config: &EngineConfig) -> Self {
        Self::spawn(
            service,
            config.outbox_capacity,
            RetryPolicy::from_config(config),
        )
    }

    /// Queue a command without blocking. Returns false if it was dropped.
    pub fn submit(&self, command: CounterCommand) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            warn!(entity = %command.entity, "Counter outbox closed; dropping update");
            return false;
        };
        match sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!(
                    entity = %command.entity,
                    field = command.field.column(),
                    value = command.value,
                    "Counter outbox full; dropping update"
                );
                false
            }
            Err(TrySendError::Disconnected(command)) => {
                warn!(entity = %command.entity, "Counter outbox worker gone; dropping update");
                false
            }
        }
    }

    /// Stop accepting commands and wait for queued ones to be delivered.
    pub fn shutdown(mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Counter outbox worker panicked");
            }
        }
    }
}

impl Drop for CounterOutbox {
    fn drop(&mut self) {
        // Queued commands keep draining in the background; nothing waits.
        self.sender.take();
    }
}

fn deliver(service: &dyn CounterService, command: &CounterCommand, policy: RetryPolicy) {
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            std::thread::sleep(policy.delay_before(attempt));
        }
        match service.set_count(command) {
            Ok(()) => {
                debug!(
                    entity = %command.entity,
                    field = command.field.column(),
                    value = command.value,
                    attempt,
                    "Counter updated"
                );
                return;
            }
            Err(err) => {
                debug!(
                    entity = %command.entity,
                    attempt,
                    "Counter update attempt failed: {err:#}"
                );
            }
        }
    }
    warn!(
        entity = %command.entity,
        field = command.field.column(),
        value = command.value,
        attempts = policy.max_attempts,
        "Giving up on counter update"
    );
}

/// PostgREST-style backend: `PATCH /rest/v1/<table>?id=eq.<id>`.
pub struct RestCounterService {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestCounterService {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        info!(endpoint = %base_url, "Using remote counter service");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Option<Self>> {
        match config.counter_endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => Self::new(
                endpoint,
                config.counter_api_key.clone(),
                config.request_timeout(),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    fn url_for(&self, entity: &EntityKey) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!(
            "{}/rest/v1/{}",
            self.base_url,
            entity.kind.table()
        ))
        .with_context(|| format!("invalid counter endpoint {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", entity.id));
        Ok(url)
    }
}

impl CounterService for RestCounterService {
    fn set_count(&self, command: &CounterCommand) -> Result<()> {
        let url = self.url_for(&command.entity)?;
        let mut body = serde_json::Map::new();
        body.insert(command.field.column().to_string(), command.value.into());
        let body = serde_json::to_string(&body).context("encoding counter body")?;

        let mut request = self
            .client
            .patch(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .body(body);
        if let Some(key) = self.api_key.as_deref() {
            request = request
                .header("apikey", key)
                .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().context("sending counter update")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("counter update rejected with status {status}"));
        }
        Ok(())
    }
}

/// Used when no endpoint is configured: updates are only logged.
#[derive(Debug, Default)]
pub struct LoggingCounterService;

impl CounterService for LoggingCounterService {
    fn set_count(&self, command: &CounterCommand) -> Result<()> {
        info!(
            entity = %command.entity,
            field = command.field.column(),
            value = command.value,
            "Counter update (no remote configured)"
        );
        Ok(())
    }
}

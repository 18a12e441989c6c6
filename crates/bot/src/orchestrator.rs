//! The reply loop: stream events in, policy decides, the model
//! generates, the reply goes out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mastomend_config::AppConfig;
use mastomend_core::{
    BotEvent, Error, EventBus, OutboundReply, PostedId, Provider, PublishError, Publisher,
    StreamEvent, Timeline,
};
use mastomend_policy::ReplyPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compose;
use crate::dedup::RepliedCache;

const PUBLISH_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Lifecycle of the reply loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Starting,
    Connecting,
    Running,
    Stopping,
    Stopped,
}

/// Counters reported when the loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub events_seen: u64,
    pub replies_posted: u64,
    pub skipped: u64,
    pub completion_failures: u64,
    pub publish_failures: u64,
}

/// Drives one bot session over injected backends.
pub struct Orchestrator {
    /// The watched timeline
    timeline: Arc<dyn Timeline>,

    /// The completion backend, already wrapped with retry
    provider: Arc<dyn Provider>,

    /// The posting side of the social network
    publisher: Arc<dyn Publisher>,

    /// Decides which statuses deserve an answer
    policy: ReplyPolicy,

    /// Full application config
    config: AppConfig,

    /// Resolved system instruction for the persona
    system_prompt: String,

    /// Lifecycle events for observers
    event_bus: Arc<EventBus>,

    /// Statuses already answered this session
    replied: RepliedCache,

    /// First delay between posting retries
    publish_base_delay: Duration,

    state: BotState,
    stats: SessionStats,
}

impl Orchestrator {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        provider: Arc<dyn Provider>,
        publisher: Arc<dyn Publisher>,
        policy: ReplyPolicy,
        config: AppConfig,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let replied = RepliedCache::new(config.reply.dedup_capacity);
        Self {
            timeline,
            provider,
            publisher,
            policy,
            config,
            system_prompt: system_prompt.into(),
            event_bus,
            replied,
            publish_base_delay: Duration::from_secs(1),
            state: BotState::Starting,
            stats: SessionStats::default(),
        }
    }

    /// Overrides the first posting retry delay. Tests use milliseconds.
    pub fn with_publish_base_delay(mut self, delay: Duration) -> Self {
        self.publish_base_delay = delay;
        self
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Runs until the stream fails fatally or `cancel` fires.
    ///
    /// Per-status failures (model errors, posting errors) are logged,
    /// counted, and dropped; they never bring the loop down. Only a
    /// rejected credential is fatal.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SessionStats, Error> {
        self.state = BotState::Connecting;
        info!(timeline = %self.timeline.name(), "Starting reply loop");

        let mut events = self.timeline.subscribe().await.map_err(|e| {
            self.state = BotState::Stopped;
            Error::Stream(e)
        })?;

        self.state = BotState::Running;
        self.event_bus.publish(BotEvent::StreamConnected {
            timeline: self.timeline.name().to_string(),
            timestamp: Utc::now(),
        });

        let outcome = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                event = events.recv() => event,
            };

            match event {
                None => {
                    warn!("Event stream ended");
                    break Ok(());
                }
                Some(Err(stream_error)) if stream_error.is_fatal() => {
                    error!(error = %stream_error, "Stream failed, shutting down");
                    break Err(Error::Stream(stream_error));
                }
                Some(Err(stream_error)) => {
                    warn!(error = %stream_error, "Stream error");
                }
                Some(Ok(event)) => {
                    // Processing runs under the token too: a shutdown
                    // mid-completion or mid-post drops the reply instead
                    // of waiting it out.
                    let handled = tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Shutdown requested, dropping the reply in flight");
                            break Ok(());
                        }
                        handled = self.handle_event(event) => handled,
                    };
                    if let Err(fatal) = handled {
                        break Err(fatal);
                    }
                }
            }
        };

        // ── Drain and report ──
        self.state = BotState::Stopping;
        if let Err(stop_error) = self.timeline.stop().await {
            debug!(error = %stop_error, "Timeline stop reported an error");
        }
        self.state = BotState::Stopped;

        info!(
            events = self.stats.events_seen,
            replies = self.stats.replies_posted,
            skipped = self.stats.skipped,
            completion_failures = self.stats.completion_failures,
            publish_failures = self.stats.publish_failures,
            "Session finished"
        );

        outcome.map(|_| self.stats)
    }

    /// Processes one stream event end to end. `Err` only for fatal
    /// credential failures.
    async fn handle_event(&mut self, event: StreamEvent) -> Result<(), Error> {
        self.stats.events_seen += 1;

        // ── Dedup before anything else ──
        if let Some(status) = event.status() {
            self.event_bus.publish(BotEvent::StatusSeen {
                status_id: status.id.clone(),
                author: status.account.acct.clone(),
                timestamp: Utc::now(),
            });

            if self.replied.contains(&status.id) {
                self.stats.skipped += 1;
                debug!(status_id = %status.id, "Already answered");
                self.event_bus.publish(BotEvent::ReplySkipped {
                    status_id: status.id.clone(),
                    reason: "duplicate".to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(());
            }
        }

        // ── Policy ──
        let decision = self.policy.evaluate(&event);
        if !decision.should_reply {
            let reason = decision.skip_reason.unwrap_or("unspecified");
            self.stats.skipped += 1;
            match event.status() {
                Some(status) => {
                    debug!(status_id = %status.id, reason, "Skipping status");
                    self.event_bus.publish(BotEvent::ReplySkipped {
                        status_id: status.id.clone(),
                        reason: reason.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                None => debug!(event_type = event.event_type(), reason, "Skipping event"),
            }
            return Ok(());
        }

        // A positive decision always carries the status.
        let Some(status) = event.status().cloned() else {
            return Ok(());
        };

        // ── Generate ──
        let request =
            compose::build_request(&self.config.llm, &self.system_prompt, &decision.extracted_context);
        let completion = match self.provider.generate(request).await {
            Ok(completion) => completion,
            Err(completion_error) => {
                self.event_bus.publish(BotEvent::CompletionFailed {
                    status_id: status.id.clone(),
                    error: completion_error.to_string(),
                    timestamp: Utc::now(),
                });
                if completion_error.is_fatal() {
                    error!(error = %completion_error, "Completion backend rejected the API key");
                    return Err(Error::Completion(completion_error));
                }
                self.stats.completion_failures += 1;
                warn!(
                    status_id = %status.id,
                    error = %completion_error,
                    "Completion failed, dropping reply"
                );
                return Ok(());
            }
        };

        // ── Post ──
        let reply = compose::compose_reply(&status, &completion.text, &self.config.reply);
        match self.post_with_retry(&reply).await {
            Ok(posted) => {
                self.replied.insert(status.id.clone());
                self.stats.replies_posted += 1;
                info!(
                    status_id = %status.id,
                    posted_id = %posted,
                    author = %status.account.acct,
                    visibility = %reply.visibility,
                    "Reply published"
                );
                self.event_bus.publish(BotEvent::ReplyPublished {
                    status_id: status.id,
                    posted_id: posted.0,
                    timestamp: Utc::now(),
                });
            }
            Err(publish_error) => {
                self.event_bus.publish(BotEvent::PublishFailed {
                    status_id: status.id.clone(),
                    error: publish_error.to_string(),
                    timestamp: Utc::now(),
                });
                if publish_error.is_fatal() {
                    error!(error = %publish_error, "Server rejected the access token");
                    return Err(Error::Publish(publish_error));
                }

                self.stats.publish_failures += 1;
                if matches!(publish_error, PublishError::NotFound(_)) {
                    // The original vanished; remember it so retries
                    // and duplicate deliveries stop here.
                    self.replied.insert(status.id.clone());
                    debug!(status_id = %status.id, "Reply target deleted before posting");
                } else {
                    warn!(
                        status_id = %status.id,
                        error = %publish_error,
                        "Posting failed, dropping reply"
                    );
                }
            }
        }

        Ok(())
    }

    async fn post_with_retry(&self, reply: &OutboundReply) -> Result<PostedId, PublishError> {
        let mut attempt: u32 = 0;
        loop {
            match self.publisher.post_reply(reply).await {
                Ok(posted) => return Ok(posted),
                Err(publish_error) if !publish_error.is_retryable() => return Err(publish_error),
                Err(publish_error) => {
                    if attempt >= self.config.reply.max_retries {
                        warn!(
                            error = %publish_error,
                            attempts = attempt + 1,
                            "Posting retries exhausted"
                        );
                        return Err(publish_error);
                    }
                    let delay = self.publish_delay(&publish_error, attempt);
                    warn!(
                        error = %publish_error,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Posting failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn publish_delay(&self, error: &PublishError, attempt: u32) -> Duration {
        if let PublishError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            // Server hints obey the same cap as computed backoff.
            return Duration::from_secs(*secs)
                .max(self.publish_base_delay)
                .min(PUBLISH_BACKOFF_CAP);
        }
        let factor = 1u32 << attempt.min(5);
        (self.publish_base_delay * factor).min(PUBLISH_BACKOFF_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mastomend_config::PolicyConfig;
    use mastomend_core::{
        Account, Completion, CompletionError, CompletionRequest, Status, StreamError, Visibility,
    };
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn status(id: &str, acct: &str, visibility: Visibility) -> Status {
        Status {
            id: id.into(),
            account: Account {
                id: format!("acct-{acct}"),
                acct: acct.into(),
                username: acct.split('@').next().unwrap_or(acct).into(),
                bot: false,
                display_name: String::new(),
            },
            content: format!("<p>post {id} from {acct}</p>"),
            visibility,
            created_at: Utc::now(),
            reblog: None,
            in_reply_to_id: None,
        }
    }

    /// Delivers a fixed script of events, then closes the stream.
    struct ScriptedTimeline {
        events: Mutex<Vec<Result<StreamEvent, StreamError>>>,
        hold_open: bool,
    }

    impl ScriptedTimeline {
        fn new(events: Vec<Result<StreamEvent, StreamError>>) -> Self {
            Self {
                events: Mutex::new(events),
                hold_open: false,
            }
        }

        fn held_open(mut self) -> Self {
            self.hold_open = true;
            self
        }
    }

    #[async_trait]
    impl Timeline for ScriptedTimeline {
        fn name(&self) -> &str {
            "public"
        }

        async fn subscribe(
            &self,
        ) -> Result<mpsc::Receiver<Result<StreamEvent, StreamError>>, StreamError> {
            let (tx, rx) = mpsc::channel(64);
            let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
            let hold_open = self.hold_open;
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if hold_open {
                    // Keep the channel open so only cancellation ends the run.
                    std::future::pending::<()>().await;
                }
            });
            Ok(rx)
        }
    }

    struct FixedProvider {
        text: String,
        errors: Mutex<Vec<CompletionError>>,
        calls: Mutex<usize>,
    }

    impl FixedProvider {
        fn new(text: &str) -> Self {
            Self {
                text: text.into(),
                errors: Mutex::new(vec![]),
                calls: Mutex::new(0),
            }
        }

        fn failing_with(errors: Vec<CompletionError>) -> Self {
            Self {
                text: "fallback".into(),
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(
            &self,
            request: CompletionRequest,
        ) -> Result<Completion, CompletionError> {
            *self.calls.lock().unwrap() += 1;
            let mut errors = self.errors.lock().unwrap();
            if errors.is_empty() {
                Ok(Completion {
                    text: self.text.clone(),
                    model: request.model,
                })
            } else {
                Err(errors.remove(0))
            }
        }
    }

    struct CapturingPublisher {
        posted: Mutex<Vec<OutboundReply>>,
        errors: Mutex<Vec<PublishError>>,
        calls: Mutex<usize>,
    }

    impl CapturingPublisher {
        fn new() -> Self {
            Self {
                posted: Mutex::new(vec![]),
                errors: Mutex::new(vec![]),
                calls: Mutex::new(0),
            }
        }

        fn failing_with(errors: Vec<PublishError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                ..Self::new()
            }
        }

        fn posted(&self) -> Vec<OutboundReply> {
            self.posted.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Publisher for CapturingPublisher {
        async fn verify_credentials(&self) -> Result<Account, PublishError> {
            Ok(Account {
                id: "bot-id".into(),
                acct: "counsel".into(),
                username: "counsel".into(),
                bot: true,
                display_name: "Counsel".into(),
            })
        }

        async fn post_reply(&self, reply: &OutboundReply) -> Result<PostedId, PublishError> {
            *self.calls.lock().unwrap() += 1;
            let mut errors = self.errors.lock().unwrap();
            if errors.is_empty() {
                self.posted.lock().unwrap().push(reply.clone());
                Ok(PostedId(format!("posted-{}", reply.in_reply_to_id)))
            } else {
                Err(errors.remove(0))
            }
        }
    }

    fn orchestrator(
        timeline: Arc<dyn Timeline>,
        provider: Arc<dyn Provider>,
        publisher: Arc<dyn Publisher>,
    ) -> Orchestrator {
        let config = AppConfig::default();
        let policy = ReplyPolicy::new(PolicyConfig::default(), "counsel")
            .with_account_id("bot-id");
        Orchestrator::new(
            timeline,
            provider,
            publisher,
            policy,
            config,
            "Be supportive.",
            Arc::new(EventBus::default()),
        )
        .with_publish_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn replies_to_an_eligible_status() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![Ok(StreamEvent::Update(status(
            "100",
            "alice",
            Visibility::Public,
        )))]));
        let provider = Arc::new(FixedProvider::new("That sounds heavy."));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        let posted = publisher.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].in_reply_to_id, "100");
        assert_eq!(posted[0].body, "@alice That sounds heavy.");
        assert_eq!(posted[0].visibility, Visibility::Public);
        assert_eq!(stats.replies_posted, 1);
        assert_eq!(orchestrator.state(), BotState::Stopped);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_answered_once() {
        let event = StreamEvent::Update(status("100", "alice", Visibility::Public));
        let timeline = Arc::new(ScriptedTimeline::new(vec![
            Ok(event.clone()),
            Ok(event),
        ]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(publisher.posted().len(), 1);
        assert_eq!(stats.replies_posted, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn policy_rejections_post_nothing() {
        let mut own_post = status("101", "counsel", Visibility::Public);
        own_post.account.id = "bot-id".into();
        let timeline = Arc::new(ScriptedTimeline::new(vec![
            Ok(StreamEvent::Update(own_post)),
            Ok(StreamEvent::Update(status("102", "bob", Visibility::Direct))),
            Ok(StreamEvent::Delete {
                status_id: "103".into(),
            }),
        ]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider.clone(), publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert!(publisher.posted().is_empty());
        assert_eq!(provider.calls(), 0);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.events_seen, 3);
    }

    #[tokio::test]
    async fn completion_failure_drops_only_that_status() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![
            Ok(StreamEvent::Update(status("100", "alice", Visibility::Public))),
            Ok(StreamEvent::Update(status("200", "bob", Visibility::Public))),
        ]));
        let provider = Arc::new(FixedProvider::failing_with(vec![
            CompletionError::InvalidRequest("Prompt blocked: SAFETY".into()),
        ]));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        // The blocked status is dropped silently, the next one answered.
        let posted = publisher.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].in_reply_to_id, "200");
        assert_eq!(stats.completion_failures, 1);
        assert_eq!(stats.replies_posted, 1);
    }

    #[tokio::test]
    async fn fatal_completion_error_stops_the_run() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![Ok(StreamEvent::Update(status(
            "100",
            "alice",
            Visibility::Public,
        )))]));
        let provider = Arc::new(FixedProvider::failing_with(vec![
            CompletionError::AuthenticationFailed("API key not valid".into()),
        ]));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let result = orchestrator.run(CancellationToken::new()).await;

        assert!(result.unwrap_err().is_fatal());
        assert!(publisher.posted().is_empty());
        assert_eq!(orchestrator.state(), BotState::Stopped);
    }

    #[tokio::test]
    async fn rate_limited_post_is_retried_with_hint() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![Ok(StreamEvent::Update(status(
            "100",
            "alice",
            Visibility::Public,
        )))]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::failing_with(vec![
            PublishError::RateLimited {
                retry_after_secs: Some(0),
            },
        ]));

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(publisher.calls(), 2);
        assert_eq!(publisher.posted().len(), 1);
        assert_eq!(stats.replies_posted, 1);
        assert_eq!(stats.publish_failures, 0);
    }

    #[tokio::test]
    async fn exhausted_posting_retries_drop_the_reply() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![
            Ok(StreamEvent::Update(status("100", "alice", Visibility::Public))),
            Ok(StreamEvent::Update(status("200", "bob", Visibility::Public))),
        ]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let always_503: Vec<PublishError> = (0..8)
            .map(|_| PublishError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            })
            .collect();
        let publisher = Arc::new(CapturingPublisher::failing_with(always_503));

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        // Default budget is 1 + 3 retries, then the loop moves on; the
        // second status eats the remaining scripted failures.
        assert_eq!(stats.publish_failures, 2);
        assert_eq!(stats.replies_posted, 0);
    }

    #[tokio::test]
    async fn deleted_target_is_not_retried_on_redelivery() {
        let event = StreamEvent::Update(status("100", "alice", Visibility::Public));
        let timeline = Arc::new(ScriptedTimeline::new(vec![
            Ok(event.clone()),
            Ok(event),
        ]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::failing_with(vec![
            PublishError::NotFound("Record not found".into()),
        ]));

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        // One attempt for the first delivery; the second is a dedup skip.
        assert_eq!(publisher.calls(), 1);
        assert_eq!(stats.publish_failures, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn cancellation_ends_an_idle_run() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![]).held_open());
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher);
        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let stats = orchestrator.run(cancel).await.unwrap();
        assert_eq!(stats, SessionStats::default());
        assert_eq!(orchestrator.state(), BotState::Stopped);
    }

    /// Hangs on generate far past any reasonable test deadline.
    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(
            &self,
            _request: CompletionRequest,
        ) -> Result<Completion, CompletionError> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(Completion {
                text: "too late".into(),
                model: "stalled".into(),
            })
        }
    }

    #[tokio::test]
    async fn cancellation_abandons_a_reply_in_flight() {
        let timeline = Arc::new(
            ScriptedTimeline::new(vec![Ok(StreamEvent::Update(status(
                "100",
                "alice",
                Visibility::Public,
            )))])
            .held_open(),
        );
        let provider = Arc::new(StalledProvider);
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher.clone());
        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let started = std::time::Instant::now();
        let stats = orchestrator.run(cancel).await.unwrap();

        // The stalled completion is dropped, not waited out, and nothing
        // is published for it.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(publisher.posted().is_empty());
        assert_eq!(stats.replies_posted, 0);
        assert_eq!(orchestrator.state(), BotState::Stopped);
    }

    #[tokio::test]
    async fn oversized_publish_hint_is_capped() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedTimeline::new(vec![])),
            Arc::new(FixedProvider::new("ok")),
            Arc::new(CapturingPublisher::new()),
        );

        let hinted = orchestrator.publish_delay(
            &PublishError::RateLimited {
                retry_after_secs: Some(86_400),
            },
            0,
        );
        assert_eq!(hinted, PUBLISH_BACKOFF_CAP);
    }

    #[tokio::test]
    async fn fatal_stream_error_surfaces() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![Err(StreamError::AuthRejected(
            "The access token is invalid".into(),
        ))]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::new());

        let mut orchestrator = orchestrator(timeline, provider, publisher);
        let result = orchestrator.run(CancellationToken::new()).await;

        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn direct_mention_reply_stays_direct() {
        let sender = status("300", "carol", Visibility::Direct);
        let timeline = Arc::new(ScriptedTimeline::new(vec![Ok(StreamEvent::Notification {
            kind: mastomend_core::NotificationKind::Mention,
            account: sender.account.clone(),
            status: Some(sender),
        })]));
        let provider = Arc::new(FixedProvider::new("I hear you."));
        let publisher = Arc::new(CapturingPublisher::new());

        let config = AppConfig::default();
        let policy_config = PolicyConfig {
            reply_to_mentions: true,
            visibilities: vec![
                Visibility::Public,
                Visibility::Unlisted,
                Visibility::Private,
                Visibility::Direct,
            ],
            ..PolicyConfig::default()
        };
        let policy = ReplyPolicy::new(policy_config, "counsel").with_account_id("bot-id");
        let mut orchestrator = Orchestrator::new(
            timeline,
            provider,
            publisher.clone(),
            policy,
            config,
            "Be supportive.",
            Arc::new(EventBus::default()),
        );

        let stats = orchestrator.run(CancellationToken::new()).await.unwrap();

        let posted = publisher.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].visibility, Visibility::Direct);
        assert_eq!(stats.replies_posted, 1);
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let timeline = Arc::new(ScriptedTimeline::new(vec![Ok(StreamEvent::Update(status(
            "100",
            "alice",
            Visibility::Public,
        )))]));
        let provider = Arc::new(FixedProvider::new("ok"));
        let publisher = Arc::new(CapturingPublisher::new());

        let event_bus = Arc::new(EventBus::default());
        let mut observed = event_bus.subscribe();

        let config = AppConfig::default();
        let policy = ReplyPolicy::new(PolicyConfig::default(), "counsel");
        let mut orchestrator = Orchestrator::new(
            timeline,
            provider,
            publisher,
            policy,
            config,
            "Be supportive.",
            event_bus,
        );
        orchestrator.run(CancellationToken::new()).await.unwrap();

        let mut kinds = vec![];
        while let Ok(event) = observed.try_recv() {
            kinds.push(match event.as_ref() {
                BotEvent::StreamConnected { .. } => "connected",
                BotEvent::StatusSeen { .. } => "seen",
                BotEvent::ReplySkipped { .. } => "skipped",
                BotEvent::ReplyPublished { .. } => "published",
                BotEvent::CompletionFailed { .. } => "completion_failed",
                BotEvent::PublishFailed { .. } => "publish_failed",
            });
        }
        assert_eq!(kinds, vec!["connected", "seen", "published"]);
    }
}

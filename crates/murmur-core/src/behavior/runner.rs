//! One behavior loop per persona.
//!
//! Each tick refreshes the persona from the repository, checks engagement
//! hours, then runs due work strictly in sequence: mentions first, then the
//! scheduled tweet. Manual engagement commands are executed while the loop
//! sleeps between ticks, so at most one platform call is ever in flight for a
//! persona. Tick failures are retried with backoff; only setup failures and
//! fatal platform errors end the loop.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use murmur_types::action::{ActionKind, ActionStats, LoopState};
use murmur_types::agent::Agent;
use murmur_types::config::EngineConfig;
use murmur_types::error::EngineError;
use murmur_types::event::{BehaviorEvent, StopReason};
use murmur_types::mention::Mention;

use crate::behavior::backoff::{FailureAction, FailureBackoff};
use crate::behavior::clock::Clock;
use crate::behavior::command::LoopCommand;
use crate::behavior::dedup::{filter_new, mark_replied};
use crate::behavior::gate::{ContentCheck, ContentGate};
use crate::behavior::ratelimit::{RateLimiter, TWEETS, category_for};
use crate::behavior::selector::{ScheduleState, plan_tick, within_engagement_hours};
use crate::behavior::timeout::with_timeout;
use crate::event::EventBroadcaster;
use crate::generator::{ContentGenerator, RECENT_TWEETS_LIMIT, TweetContext};
use crate::platform::{PlatformConnector, SocialPlatformClient};
use crate::repository::character::CharacterRepository;

/// Collaborators shared by every loop.
pub struct LoopContext<R, C, G> {
    pub repo: Arc<R>,
    pub connector: Arc<C>,
    pub generator: Arc<G>,
    pub events: EventBroadcaster,
    pub config: Arc<EngineConfig>,
    pub clock: Clock,
}

impl<R, C, G> Clone for LoopContext<R, C, G> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            connector: Arc::clone(&self.connector),
            generator: Arc::clone(&self.generator),
            events: self.events.clone(),
            config: Arc::clone(&self.config),
            clock: self.clock,
        }
    }
}

/// Result of one tick.
enum TickOutcome {
    /// Sleep this long, then tick again.
    Continue(Duration),
    /// The circuit is still open; nothing ran. Sleep out the rest of the pause.
    Paused(Duration),
    Stop(StopReason),
}

/// What happened to one mention picked for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyOutcome {
    /// The mention was claimed and a reply attempted.
    Claimed,
    /// The content gate blocked the reply. The mention is skipped for the
    /// rest of this loop's life unless the persona's ethics change.
    Rejected,
    /// No reply budget left. Retry the same mention on the backlog recheck.
    RateLimited,
}

/// The running state of one persona.
pub struct BehaviorLoop<R, C, G> {
    ctx: LoopContext<R, C, G>,
    agent: Agent,
    cancel: CancellationToken,
    commands: mpsc::Receiver<LoopCommand>,
    commands_open: bool,
    state: watch::Sender<LoopState>,
    stats: watch::Sender<ActionStats>,
    rate_limiter: RateLimiter,
    gate: ContentGate,
    backoff: FailureBackoff,
    schedule: ScheduleState,
    recent_tweets: VecDeque<String>,
    /// Mentions whose reply the gate rejected. Never persisted as replied.
    skipped_mentions: HashSet<String>,
}

impl<R, C, G> BehaviorLoop<R, C, G>
where
    R: CharacterRepository,
    C: PlatformConnector,
    G: ContentGenerator,
{
    pub fn new(
        ctx: LoopContext<R, C, G>,
        agent: Agent,
        cancel: CancellationToken,
        commands: mpsc::Receiver<LoopCommand>,
        state: watch::Sender<LoopState>,
        stats: watch::Sender<ActionStats>,
    ) -> Self {
        let config = Arc::clone(&ctx.config);
        let now = ctx.clock.now();
        Self {
            rate_limiter: RateLimiter::new_at(&config.rate_limits, now),
            gate: ContentGate::new(&agent.ethics, config.gate.baseline_patterns),
            backoff: FailureBackoff::new(&config.backoff),
            ctx,
            agent,
            cancel,
            commands,
            commands_open: true,
            state,
            stats,
            schedule: ScheduleState::default(),
            recent_tweets: VecDeque::with_capacity(RECENT_TWEETS_LIMIT),
            skipped_mentions: HashSet::new(),
        }
    }

    /// Run until cancelled, deactivated or fatally failed.
    ///
    /// Returns `Err` only for failures that make the persona unable to run
    /// (setup failures, revoked credentials).
    pub async fn run(self) -> Result<StopReason, EngineError> {
        let span = tracing::info_span!("behavior_loop", agent_id = %self.agent.id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<StopReason, EngineError> {
        self.set_state(LoopState::Initializing);

        let client = match self.initialize().await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "behavior loop failed to initialize");
                self.set_state(LoopState::Stopped);
                return Err(e);
            }
        };
        self.emit(BehaviorEvent::BehaviorLoopInitialized {});
        tracing::info!(name = %self.agent.name, "behavior loop initialized");

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Ok(StopReason::Cancelled);
            }

            let wait = match self.tick(&client).await {
                Ok(TickOutcome::Continue(wait)) => {
                    self.backoff.record_success();
                    wait
                }
                Ok(TickOutcome::Paused(wait)) => wait,
                Ok(TickOutcome::Stop(reason)) => break Ok(reason),
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "fatal error, stopping behavior loop");
                    self.track(|stats| stats.errors += 1);
                    break Err(e);
                }
                Err(e) => self.on_tick_failure(&e),
            };

            self.emit(BehaviorEvent::CharacterSleeping {
                sleep_secs: wait.as_secs(),
            });
            if !self.sleep(wait, &client).await {
                break Ok(StopReason::Cancelled);
            }
        };

        self.set_state(LoopState::Stopping);
        if let Ok(reason) = &outcome {
            tracing::info!(%reason, "behavior loop stopping");
            self.emit(BehaviorEvent::BehaviorLoopStopping { reason: *reason });
        }
        self.set_state(LoopState::Stopped);
        outcome
    }

    /// Reload the persona and connect its platform client.
    async fn initialize(&mut self) -> Result<C::Client, EngineError> {
        let config = Arc::clone(&self.ctx.config);
        let timeouts = &config.timeouts;
        let agent = with_timeout("repository.get", timeouts.repository(), self.ctx.repo.get(&self.agent.id))
            .await?
            .ok_or_else(|| EngineError::NotFound(self.agent.id.clone()))?;
        self.refresh(agent);

        with_timeout(
            "platform.connect",
            timeouts.platform(),
            self.ctx.connector.connect(&self.agent),
        )
        .await
        .map_err(|e| EngineError::Configuration(format!("platform connect failed: {e}")))
    }

    async fn tick(&mut self, client: &C::Client) -> Result<TickOutcome, EngineError> {
        if !self.backoff.poll() {
            self.set_state(LoopState::Paused);
            return Ok(TickOutcome::Paused(
                self.backoff.remaining_pause().unwrap_or_default(),
            ));
        }

        let timing = self.ctx.config.timing.clone();
        let stored = with_timeout(
            "repository.get",
            self.ctx.config.timeouts.repository(),
            self.ctx.repo.get(&self.agent.id),
        )
        .await?;
        match stored {
            Some(agent) if agent.active => self.refresh(agent),
            _ => {
                tracing::info!("character deleted or inactive");
                return Ok(TickOutcome::Stop(StopReason::CharacterInactive));
            }
        }

        let now = self.ctx.clock.now();
        if !within_engagement_hours(&self.agent, now) {
            let hours = self.agent.engagement_hours;
            self.set_state(LoopState::Sleeping);
            self.emit(BehaviorEvent::OutsideEngagementHours {
                current_hour: chrono::Timelike::hour(&now),
                start: hours.start,
                end: hours.end,
            });
            return Ok(TickOutcome::Continue(timing.off_hours_sleep()));
        }

        let plan = plan_tick(&self.agent, now, &self.schedule, &timing);
        if plan.mentions_due {
            self.check_mentions(client).await?;
        }
        if plan.tweet_due {
            self.post_tweet(client).await?;
        }

        self.set_state(LoopState::Sleeping);
        Ok(TickOutcome::Continue(timing.poll_interval()))
    }

    async fn check_mentions(&mut self, client: &C::Client) -> Result<(), EngineError> {
        self.set_state(LoopState::CheckingMentions);
        self.emit(BehaviorEvent::CheckingMentions {});

        let notifications = with_timeout(
            "platform.fetch_notifications",
            self.ctx.config.timeouts.platform(),
            client.fetch_notifications(),
        )
        .await;
        self.reconcile_limits(client);
        let notifications = notifications?;

        self.schedule.last_mention_check_at = Some(self.ctx.clock.now());
        let fresh: Vec<Mention> = filter_new(notifications, &self.agent.reply_settings.replied_ids)
            .into_iter()
            .filter(|m| !self.skipped_mentions.contains(&m.tweet_id))
            .collect();
        if fresh.is_empty() {
            self.schedule.mention_backlog = false;
            return Ok(());
        }

        tracing::info!(count = fresh.len(), "new mentions");
        self.emit(BehaviorEvent::MentionsFound { count: fresh.len() });

        // Until a reply result is known the backlog counts as pending.
        self.schedule.mention_backlog = true;
        let total = fresh.len();
        for (index, mention) in fresh.iter().enumerate() {
            match self.reply_to(client, mention).await? {
                ReplyOutcome::Claimed => {
                    self.schedule.mention_backlog = index + 1 < total;
                    return Ok(());
                }
                ReplyOutcome::Rejected => {
                    tracing::debug!(tweet_id = %mention.tweet_id, "skipping mention with rejected reply");
                    self.skipped_mentions.insert(mention.tweet_id.clone());
                }
                ReplyOutcome::RateLimited => return Ok(()),
            }
        }
        self.schedule.mention_backlog = false;
        Ok(())
    }

    /// Reply to one mention. At most one reply is claimed per mention.
    async fn reply_to(
        &mut self,
        client: &C::Client,
        mention: &Mention,
    ) -> Result<ReplyOutcome, EngineError> {
        self.emit(BehaviorEvent::ActionStarted {
            action: ActionKind::Reply,
        });

        if !self.rate_limiter.check_limit_at(TWEETS, self.ctx.clock.now()) {
            self.rate_limited(TWEETS, ActionKind::Reply);
            return Ok(ReplyOutcome::RateLimited);
        }

        let text = with_timeout(
            "generator.generate_reply",
            self.ctx.config.timeouts.generation(),
            self.ctx
                .generator
                .generate_reply(&self.agent, &mention.text, &mention.author_handle),
        )
        .await?;

        let check = self.gate.check_content(&text, ActionKind::Reply);
        if !check.approved {
            self.reject(ActionKind::Reply, check);
            return Ok(ReplyOutcome::Rejected);
        }

        // Claim before publishing: a mention is answered at most once.
        mark_replied(
            self.ctx.repo.as_ref(),
            &mut self.agent,
            &mention.tweet_id,
            self.ctx.config.timeouts.repository(),
        )
        .await?;

        let result = with_timeout(
            "platform.reply",
            self.ctx.config.timeouts.platform(),
            client.reply(&text, &mention.tweet_id),
        )
        .await;
        self.rate_limiter.use_limit(TWEETS);
        self.reconcile_limits(client);

        match result {
            Ok(receipt) => {
                tracing::info!(reply_id = %receipt.id, in_reply_to = %mention.tweet_id, "reply posted");
                let now = self.ctx.clock.now();
                self.track(|stats| stats.record_action(ActionKind::Reply, now));
                self.emit(BehaviorEvent::ReplyPosted {
                    reply_id: receipt.id,
                    in_reply_to: mention.tweet_id.clone(),
                    author_handle: mention.author_handle.clone(),
                    content: text,
                });
                Ok(ReplyOutcome::Claimed)
            }
            Err(e) => {
                let outcome_unknown = matches!(e, EngineError::Timeout { .. });
                tracing::warn!(
                    error = %e,
                    in_reply_to = %mention.tweet_id,
                    outcome_unknown,
                    "reply failed after claim, not retried"
                );
                self.emit(BehaviorEvent::TweetError {
                    error: e.to_string(),
                    outcome_unknown,
                });
                if outcome_unknown {
                    Ok(ReplyOutcome::Claimed)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn post_tweet(&mut self, client: &C::Client) -> Result<(), EngineError> {
        self.set_state(LoopState::Tweeting);
        self.emit(BehaviorEvent::ActionStarted {
            action: ActionKind::Tweet,
        });

        if !self.rate_limiter.check_limit_at(TWEETS, self.ctx.clock.now()) {
            self.rate_limited(TWEETS, ActionKind::Tweet);
            return Ok(());
        }

        self.emit(BehaviorEvent::GeneratingTweet {});
        let context = TweetContext {
            content_focus: self.agent.content_focus.clone(),
            now: self.ctx.clock.now(),
            recent_tweets: self.recent_tweets.iter().cloned().collect(),
        };
        let text = with_timeout(
            "generator.generate_tweet",
            self.ctx.config.timeouts.generation(),
            self.ctx.generator.generate_tweet(&self.agent, &context),
        )
        .await?;
        self.emit(BehaviorEvent::TweetGenerated {
            content: text.clone(),
        });

        let check = self.gate.check_content(&text, ActionKind::Tweet);
        if !check.approved {
            self.reject(ActionKind::Tweet, check);
            return Ok(());
        }

        self.emit(BehaviorEvent::PostingTweet {
            content: text.clone(),
        });
        let result = with_timeout(
            "platform.publish",
            self.ctx.config.timeouts.platform(),
            client.publish(&text),
        )
        .await;
        self.rate_limiter.use_limit(TWEETS);
        self.reconcile_limits(client);

        match result {
            Ok(receipt) => {
                tracing::info!(tweet_id = %receipt.id, "tweet posted");
                let now = self.ctx.clock.now();
                self.schedule.last_tweet_at = Some(now);
                self.track(|stats| stats.record_action(ActionKind::Tweet, now));
                self.remember_tweet(text.clone());
                self.emit(BehaviorEvent::TweetPosted {
                    tweet_id: receipt.id,
                    content: text,
                });
                Ok(())
            }
            Err(e @ EngineError::Timeout { .. }) => {
                // May have been published; do not post into the same slot again.
                tracing::warn!(error = %e, "tweet outcome unknown");
                self.schedule.last_tweet_at = Some(self.ctx.clock.now());
                self.emit(BehaviorEvent::TweetError {
                    error: EngineError::OutcomeUnknown(e.to_string()).to_string(),
                    outcome_unknown: true,
                });
                Ok(())
            }
            Err(e) => {
                self.emit(BehaviorEvent::TweetError {
                    error: e.to_string(),
                    outcome_unknown: false,
                });
                Err(e)
            }
        }
    }

    /// Sleep until `wait` elapses, serving commands meanwhile. Returns false
    /// when cancelled.
    async fn sleep(&mut self, wait: Duration, client: &C::Client) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command, client).await,
                    None => self.commands_open = false,
                },
                _ = tokio::time::sleep_until(deadline) => return true,
            }
        }
    }

    async fn handle_command(&mut self, command: LoopCommand, client: &C::Client) {
        let (kind, target_id, reply) = command.into_parts();
        let action = kind.action();
        let category = category_for(action).unwrap_or(TWEETS);

        if !self.rate_limiter.check_limit_at(category, self.ctx.clock.now()) {
            self.rate_limited(category, action);
            let _ = reply.send(Err(EngineError::Policy(format!(
                "{category} rate limit exhausted"
            ))));
            return;
        }

        self.emit(BehaviorEvent::ActionStarted { action });
        let budget = self.ctx.config.timeouts.platform();
        let result = match action {
            ActionKind::Like => with_timeout("platform.like", budget, client.like(&target_id)).await,
            _ => with_timeout("platform.retweet", budget, client.retweet(&target_id)).await,
        };
        self.rate_limiter.use_limit(category);
        self.reconcile_limits(client);

        match &result {
            Ok(()) => {
                tracing::info!(%action, %target_id, "engagement performed");
                let now = self.ctx.clock.now();
                self.track(|stats| stats.record_action(action, now));
                self.emit(BehaviorEvent::EngagementPerformed { action, target_id });
            }
            Err(e) => {
                tracing::warn!(%action, %target_id, error = %e, "engagement failed");
                self.track(|stats| stats.errors += 1);
            }
        }
        if reply.send(result).is_err() {
            tracing::debug!(%action, "engagement caller went away");
        }
    }

    fn on_tick_failure(&mut self, error: &EngineError) -> Duration {
        self.track(|stats| stats.errors += 1);
        match self.backoff.record_failure() {
            FailureAction::Retry {
                delay,
                consecutive_failures,
            } => {
                tracing::error!(error = %error, consecutive_failures, "error in behavior loop");
                self.set_state(LoopState::Sleeping);
                self.emit(BehaviorEvent::Error {
                    error: error.to_string(),
                });
                delay
            }
            FailureAction::Pause {
                duration,
                consecutive_failures,
            } => {
                tracing::error!(
                    error = %error,
                    consecutive_failures,
                    pause_secs = duration.as_secs(),
                    "too many consecutive failures, pausing agent"
                );
                self.set_state(LoopState::Paused);
                self.emit(BehaviorEvent::AgentPaused {
                    consecutive_failures,
                    pause_secs: duration.as_secs(),
                    last_error: error.to_string(),
                });
                duration
            }
        }
    }

    /// Adopt a freshly loaded record without ever dropping answered ids.
    fn refresh(&mut self, mut agent: Agent) {
        agent
            .reply_settings
            .replied_ids
            .extend(self.agent.reply_settings.replied_ids.iter().cloned());
        if agent.ethics != self.agent.ethics {
            self.gate = ContentGate::new(&agent.ethics, self.ctx.config.gate.baseline_patterns);
            self.skipped_mentions.clear();
        }
        self.agent = agent;
    }

    fn reject(&self, action: ActionKind, check: ContentCheck) {
        tracing::info!(%action, issues = ?check.issues, "content rejected");
        self.track(|stats| stats.rejections += 1);
        self.emit(BehaviorEvent::ContentRejected {
            action,
            issues: check.issues,
            suggestions: check.suggestions,
        });
    }

    fn rate_limited(&self, category: &str, action: ActionKind) {
        tracing::info!(category, %action, "rate limit reached");
        self.track(|stats| stats.rate_limited += 1);
        self.emit(BehaviorEvent::RateLimited {
            category: category.to_string(),
            action,
        });
    }

    fn reconcile_limits(&mut self, client: &C::Client) {
        let headers = client.rate_limit_headers();
        if !headers.is_empty() {
            self.rate_limiter.update_limits(&headers);
        }
    }

    fn remember_tweet(&mut self, text: String) {
        self.recent_tweets.push_front(text);
        self.recent_tweets.truncate(RECENT_TWEETS_LIMIT);
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }

    fn track(&self, update: impl FnOnce(&mut ActionStats)) {
        self.stats.send_modify(update);
    }

    fn emit(&self, event: BehaviorEvent) {
        self.ctx
            .events
            .broadcast(&self.agent.id, &self.agent.name, event);
    }
}

//! Scheduler owning one behavior loop per persona.
//!
//! The registry maps each agent id to the handles of its single running loop.
//! A loop deregisters itself when it ends; `stop` deregisters after a
//! cooperative cancel (or a forced abort once the grace period runs out).
//! An aborted loop cannot report its own stop, so the scheduler emits
//! `behavior_loop_stopping` with reason `aborted` on its behalf.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use murmur_types::action::{ActionStats, LoopState, LoopStatus};
use murmur_types::agent::AgentId;
use murmur_types::error::EngineError;
use murmur_types::event::{BehaviorEvent, EventEnvelope, StopReason};

use crate::behavior::command::{EngagementKind, LoopCommand};
use crate::behavior::runner::{BehaviorLoop, LoopContext};
use crate::behavior::timeout::with_timeout;
use crate::generator::ContentGenerator;
use crate::platform::PlatformConnector;
use crate::repository::character::{AgentFilter, CharacterRepository};

/// Pending commands a loop will buffer before senders wait.
const COMMAND_BUFFER: usize = 16;

/// Handles to one registered loop.
struct LoopHandle {
    /// Distinguishes this loop from a later one for the same agent.
    loop_id: Uuid,
    agent_name: String,
    cancel: CancellationToken,
    abort: AbortHandle,
    commands: mpsc::Sender<LoopCommand>,
    state: watch::Receiver<LoopState>,
    stats: watch::Receiver<ActionStats>,
    started_at: DateTime<Utc>,
}

/// Owns the set of running behavior loops.
///
/// Generic over the collaborator traits -- murmur-core never depends on
/// murmur-infra.
pub struct Scheduler<R, C, G> {
    ctx: LoopContext<R, C, G>,
    loops: Arc<DashMap<AgentId, LoopHandle>>,
}

impl<R, C, G> Scheduler<R, C, G>
where
    R: CharacterRepository,
    C: PlatformConnector,
    G: ContentGenerator,
{
    pub fn new(ctx: LoopContext<R, C, G>) -> Self {
        Self {
            ctx,
            loops: Arc::new(DashMap::new()),
        }
    }

    /// Receive every event emitted by the scheduler and its loops.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.ctx.events.subscribe()
    }

    pub fn is_running(&self, agent_id: &AgentId) -> bool {
        self.loops.contains_key(agent_id)
    }

    /// Start the behavior loop for `agent_id`.
    ///
    /// No-op if a loop is already registered. Fails with `NotFound` when the
    /// persona does not exist, and with the loop's own error when it dies
    /// within the start grace period.
    pub async fn start(&self, agent_id: &AgentId) -> Result<(), EngineError> {
        if self.loops.contains_key(agent_id) {
            tracing::info!(%agent_id, "behavior loop already running");
            return Ok(());
        }

        let agent = with_timeout(
            "repository.get",
            self.ctx.config.timeouts.repository(),
            self.ctx.repo.get(agent_id),
        )
        .await?
        .ok_or_else(|| EngineError::NotFound(agent_id.clone()))?;

        let loop_id = Uuid::now_v7();
        let agent_name = agent.name.clone();

        let mut join = match self.loops.entry(agent_id.clone()) {
            Entry::Occupied(_) => {
                tracing::info!(%agent_id, "behavior loop already running");
                return Ok(());
            }
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                let (state_tx, state_rx) = watch::channel(LoopState::Initializing);
                let (stats_tx, stats_rx) = watch::channel(ActionStats::default());
                let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
                let behavior = BehaviorLoop::new(
                    self.ctx.clone(),
                    agent,
                    cancel.clone(),
                    cmd_rx,
                    state_tx,
                    stats_tx,
                );

                let loops = Arc::clone(&self.loops);
                let events = self.ctx.events.clone();
                let id = agent_id.clone();
                let name = agent_name.clone();
                let join = tokio::spawn(async move {
                    let result = behavior.run().await;
                    loops.remove_if(&id, |_, handle| handle.loop_id == loop_id);
                    if let Err(e) = &result {
                        tracing::error!(agent_id = %id, error = %e, "behavior loop terminated");
                        events.broadcast(&id, &name, BehaviorEvent::CharacterError {
                            error: e.to_string(),
                        });
                    }
                    result
                });

                slot.insert(LoopHandle {
                    loop_id,
                    agent_name: agent_name.clone(),
                    cancel,
                    abort: join.abort_handle(),
                    commands: cmd_tx,
                    state: state_rx,
                    stats: stats_rx,
                    started_at: Utc::now(),
                });
                join
            }
        };

        tracing::info!(%agent_id, %loop_id, "started behavior loop");
        self.ctx.events.broadcast(
            agent_id,
            &agent_name,
            BehaviorEvent::BehaviorLoopStarted {
                status: "running".to_string(),
                task_id: loop_id,
            },
        );

        // Surface setup failures that happen right away.
        match tokio::time::timeout(self.ctx.config.timing.start_grace(), &mut join).await {
            Ok(Ok(Ok(_reason))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join_err)) => Err(EngineError::Transient(format!(
                "behavior loop task failed: {join_err}"
            ))),
            Err(_still_running) => Ok(()),
        }
    }

    /// Stop the loop for `agent_id`. Idempotent.
    ///
    /// Cancels cooperatively, waits up to the stop grace period, then aborts.
    /// An aborted loop may have been mid-call, so the outcome of that call is
    /// unknown.
    pub async fn stop(&self, agent_id: &AgentId) {
        let Some((loop_id, name, cancel, abort, mut state)) = self.loops.get(agent_id).map(|h| {
            (
                h.loop_id,
                h.agent_name.clone(),
                h.cancel.clone(),
                h.abort.clone(),
                h.state.clone(),
            )
        }) else {
            tracing::debug!(%agent_id, "no behavior loop to stop");
            return;
        };

        cancel.cancel();
        let grace = self.ctx.config.timing.stop_grace();
        let stopped = tokio::time::timeout(grace, async {
            // A closed channel means the task is already gone.
            let _ = state.wait_for(LoopState::is_terminal).await;
        })
        .await;

        if stopped.is_err() {
            tracing::warn!(
                %agent_id,
                grace_secs = grace.as_secs(),
                "behavior loop did not stop in time, aborting; in-flight outcome unknown"
            );
            abort.abort();
            self.ctx.events.broadcast(
                agent_id,
                &name,
                BehaviorEvent::BehaviorLoopStopping {
                    reason: StopReason::Aborted,
                },
            );
        }

        self.loops
            .remove_if(agent_id, |_, handle| handle.loop_id == loop_id);
        tracing::info!(%agent_id, "stopped behavior loop");
    }

    /// Stop every registered loop and clear the registry.
    pub async fn stop_all(&self) -> usize {
        let ids: Vec<AgentId> = self.loops.iter().map(|e| e.key().clone()).collect();
        let count = ids.len();
        join_all(ids.iter().map(|id| self.stop(id))).await;
        self.loops.clear();
        count
    }

    /// Snapshot of registered loops.
    pub fn list(&self) -> Vec<LoopStatus> {
        let mut statuses: Vec<LoopStatus> = self
            .loops
            .iter()
            .map(|entry| {
                let handle = entry.value();
                LoopStatus {
                    agent_id: entry.key().clone(),
                    state: *handle.state.borrow(),
                    alive: !handle.commands.is_closed(),
                    started_at: handle.started_at,
                    stats: handle.stats.borrow().clone(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        statuses
    }

    /// Start a loop for every active persona in the repository.
    pub async fn start_all_active(&self) -> Result<Vec<(AgentId, Result<(), EngineError>)>, EngineError> {
        let agents = with_timeout(
            "repository.list",
            self.ctx.config.timeouts.repository(),
            self.ctx.repo.list(Some(AgentFilter::active_only())),
        )
        .await?;

        let ids: Vec<AgentId> = agents.into_iter().map(|a| a.id).collect();
        let results = join_all(ids.iter().map(|id| self.start(id))).await;
        for (id, result) in ids.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!(agent_id = %id, error = %e, "failed to start behavior loop");
            }
        }
        Ok(ids.into_iter().zip(results).collect())
    }

    /// Ask a running loop to retweet or like `target_id` and wait for it.
    pub async fn engage(
        &self,
        agent_id: &AgentId,
        kind: EngagementKind,
        target_id: String,
    ) -> Result<(), EngineError> {
        let sender = self
            .loops
            .get(agent_id)
            .map(|h| h.commands.clone())
            .ok_or_else(|| EngineError::NotFound(agent_id.clone()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(LoopCommand::new(kind, target_id, reply_tx))
            .await
            .map_err(|_| EngineError::Transient("behavior loop is not accepting commands".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Transient("behavior loop stopped before replying".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeZone;
    use murmur_types::agent::{Agent, AgentPatch, EngagementHours};
    use murmur_types::config::EngineConfig;

    use crate::behavior::clock::Clock;
    use crate::event::EventBroadcaster;
    use crate::testing::{FakeConnector, MemoryRepo, ScriptedGenerator};

    type TestScheduler = Scheduler<MemoryRepo, FakeConnector, ScriptedGenerator>;

    fn agent(name: &str) -> Agent {
        let mut agent = Agent::new(name);
        agent.engagement_hours = EngagementHours::new(0, 23);
        agent
    }

    fn scheduler_with(repo: MemoryRepo, connector: FakeConnector) -> (TestScheduler, Arc<MemoryRepo>) {
        scheduler_with_config(repo, connector, EngineConfig::default())
    }

    fn scheduler_with_config(
        repo: MemoryRepo,
        connector: FakeConnector,
        config: EngineConfig,
    ) -> (TestScheduler, Arc<MemoryRepo>) {
        let repo = Arc::new(repo);
        let ctx = LoopContext {
            repo: Arc::clone(&repo),
            connector: Arc::new(connector),
            generator: Arc::new(ScriptedGenerator::default()),
            events: EventBroadcaster::new(256),
            config: Arc::new(config),
            clock: Clock::anchored(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()),
        };
        (Scheduler::new(ctx), repo)
    }

    #[tokio::test(start_paused = true)]
    async fn start_registers_and_emits_started() {
        let a = agent("Luna");
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::default());
        let mut events = scheduler.subscribe();

        scheduler.start(&a.id).await.unwrap();

        assert!(scheduler.is_running(&a.id));
        let first = events.recv().await.unwrap();
        assert_eq!(first.event.event_type(), "behavior_loop_started");
        assert_eq!(first.to_wire().data["status"], "running");

        let statuses = scheduler.list();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].alive);
        assert_eq!(statuses[0].state, LoopState::Sleeping);

        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_noop() {
        let a = agent("Luna");
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::default());
        let mut events = scheduler.subscribe();

        scheduler.start(&a.id).await.unwrap();
        scheduler.start(&a.id).await.unwrap();

        assert_eq!(scheduler.list().len(), 1);
        let started = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.event.event_type() == "behavior_loop_started")
            .count();
        assert_eq!(started, 1);
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_unknown_agent_is_not_found() {
        let (scheduler, _) = scheduler_with(MemoryRepo::default(), FakeConnector::default());
        let missing = AgentId::new();
        let err = scheduler.start(&missing).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(id) if id == missing));
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn setup_failure_is_surfaced_and_deregistered() {
        let a = agent("Luna");
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::failing_auth());
        let mut events = scheduler.subscribe();

        let err = scheduler.start(&a.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(!scheduler.is_running(&a.id));

        let types: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event.event_type())
            .collect();
        assert!(types.contains(&"character_error"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let a = agent("Luna");
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::default());

        scheduler.start(&a.id).await.unwrap();
        scheduler.stop(&a.id).await;
        assert!(!scheduler.is_running(&a.id));
        scheduler.stop(&a.id).await;
        scheduler.stop(&AgentId::new()).await;
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_emits_stopping_event() {
        let a = agent("Luna");
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::default());
        let mut events = scheduler.subscribe();

        scheduler.start(&a.id).await.unwrap();
        scheduler.stop(&a.id).await;

        let types: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event.event_type())
            .collect();
        assert_eq!(types.last(), Some(&"behavior_loop_stopping"));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_loop_is_aborted_after_grace() {
        let mut a = agent("Luna");
        a.tweet_settings.enabled = true;
        a.tweet_settings.posts_per_minute = 1.0 / 30.0;
        let connector = FakeConnector::default();
        let log = connector.log();
        // The first publish outlasts the stop grace.
        log.set_publish_delay(Duration::from_secs(25));
        let mut config = EngineConfig::default();
        config.timing.stop_grace_secs = 5;
        let (scheduler, _) = scheduler_with_config(MemoryRepo::with(a.clone()), connector, config);
        let mut events = scheduler.subscribe();

        scheduler.start(&a.id).await.unwrap();
        let before = tokio::time::Instant::now();
        scheduler.stop(&a.id).await;

        assert!(!scheduler.is_running(&a.id));
        assert!(before.elapsed() <= Duration::from_secs(6));
        // The aborted call never completed.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(log.published().is_empty());

        let envelopes: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        let last = envelopes.last().unwrap();
        assert_eq!(last.agent_id, a.id);
        assert_eq!(
            last.event,
            BehaviorEvent::BehaviorLoopStopping {
                reason: StopReason::Aborted
            }
        );
        assert_eq!(last.to_wire().data["reason"], "aborted");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_clears_registry() {
        let (a, b) = (agent("Luna"), agent("Nova"));
        let repo = MemoryRepo::with(a.clone());
        repo.insert(b.clone());
        let (scheduler, _) = scheduler_with(repo, FakeConnector::default());

        scheduler.start(&a.id).await.unwrap();
        scheduler.start(&b.id).await.unwrap();
        assert_eq!(scheduler.list().len(), 2);

        assert_eq!(scheduler.stop_all().await, 2);
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_active_skips_inactive() {
        let (a, mut b) = (agent("Luna"), agent("Nova"));
        b.active = false;
        let repo = MemoryRepo::with(a.clone());
        repo.insert(b.clone());
        let (scheduler, _) = scheduler_with(repo, FakeConnector::default());

        let results = scheduler.start_all_active().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        assert!(scheduler.is_running(&a.id));
        assert!(!scheduler.is_running(&b.id));
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deactivated_loop_deregisters_itself() {
        let a = agent("Luna");
        let (scheduler, repo) = scheduler_with(MemoryRepo::with(a.clone()), FakeConnector::default());

        scheduler.start(&a.id).await.unwrap();
        repo.patch(&a.id, &AgentPatch::active(false));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(!scheduler.is_running(&a.id));
    }

    #[tokio::test(start_paused = true)]
    async fn engage_reaches_running_loop() {
        let a = agent("Luna");
        let connector = FakeConnector::default();
        let log = connector.log();
        let (scheduler, _) = scheduler_with(MemoryRepo::with(a.clone()), connector);

        let err = scheduler
            .engage(&a.id, EngagementKind::Like, "5".into())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        scheduler.start(&a.id).await.unwrap();
        scheduler
            .engage(&a.id, EngagementKind::Retweet, "5".into())
            .await
            .unwrap();
        assert_eq!(log.retweets(), vec!["5".to_string()]);
        assert_eq!(scheduler.list()[0].stats.retweets, 1);
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loops_run_independently() {
        let (mut a, b) = (agent("Luna"), agent("Nova"));
        a.tweet_settings.enabled = true;
        a.tweet_settings.posts_per_minute = 1.0;
        let repo = MemoryRepo::with(a.clone());
        repo.insert(b.clone());
        let (scheduler, _) = scheduler_with(repo, FakeConnector::default());

        scheduler.start(&a.id).await.unwrap();
        scheduler.start(&b.id).await.unwrap();
        scheduler.stop(&b.id).await;

        assert!(scheduler.is_running(&a.id));
        assert!(!scheduler.is_running(&b.id));
        scheduler.stop_all().await;
    }
}

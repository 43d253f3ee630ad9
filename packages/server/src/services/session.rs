//! One running session: a tokio task that owns its [`Game`] and drives it from lobby to
//! teardown. Everything else talks to it through a [`SessionHandle`].

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use werewolf_rules::filler::{filler_night_targets, filler_reactive_target, filler_vote};
use werewolf_rules::night::resolve_night;
use werewolf_rules::{
    assign_roles, plan_roles, ActionError, ChannelId, Death, DeathCause, Game, GamePhase,
    PauseCategory, PlayerId, Role, RoleSet, Seat, SeatKind, SessionId, SetupError, VoteOutcome,
    WinReport,
};

use super::channels::ChannelOrchestrator;
use super::entitlement::{owned_roles, EntitlementStore};
use super::narration::{NarrationQueue, Narrator};
use super::rewards::RewardSink;
use super::selection::RoleSelection;
use crate::error::{EventError, SessionError};
use crate::models::config::GameConfig;
use crate::models::session::{
    Envelope, FeedEvent, GameSnapshot, InputWindow, PlayerView, SessionEvent, SessionStage,
};
use crate::platform::{ChatPlatform, PlatformError};

/// Collaborators a session calls out to.
#[derive(Clone)]
pub struct SessionDeps {
    pub platform: Arc<dyn ChatPlatform>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub rewards: Arc<dyn RewardSink>,
    pub narrator: Arc<dyn Narrator>,
    pub feed: broadcast::Sender<FeedEvent>,
    pub config: Arc<GameConfig>,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub origin: ChannelId,
    pub initiator: PlayerId,
    pub initiator_name: String,
    /// Pad the lobby with fillers up to this many seats.
    pub player_hint: Option<usize>,
}

#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    origin: ChannelId,
    events: mpsc::Sender<Envelope>,
    snapshot: watch::Receiver<GameSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn origin(&self) -> ChannelId {
        self.origin
    }

    /// Queue an event and wait until the session has applied or rejected it.
    pub async fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.events
            .try_send(Envelope {
                event,
                reply: Some(reply),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionError::QueueFull,
                TrySendError::Closed(_) => SessionError::Closed,
            })?;
        outcome.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GameSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed() || self.snapshot.borrow().stage.is_closed()
    }

    /// Wait for the first snapshot satisfying `condition`.
    pub async fn wait_for(
        &self,
        condition: impl FnMut(&GameSnapshot) -> bool,
    ) -> Result<GameSnapshot, SessionError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(condition)
            .await
            .map_err(|_| SessionError::Closed)?;
        let value = (*snapshot).clone();
        Ok(value)
    }

    /// Wait until the session has finished or aborted and released its spaces.
    pub async fn closed(&self) -> GameSnapshot {
        match self.wait_for(|s| s.stage.is_closed()).await {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }
}

/// The deadline of the current window. Re-arming or dropping it aborts the pending sleep, and
/// every deadline carries the epoch it was armed under so a late one can be told apart.
struct PhaseTimer {
    tx: mpsc::Sender<Envelope>,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl PhaseTimer {
    fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            tx,
            epoch: 0,
            task: None,
        }
    }

    fn arm(&mut self, after: Duration) -> u64 {
        self.cancel();
        self.epoch += 1;
        let epoch = self.epoch;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx
                .send(Envelope {
                    event: SessionEvent::Deadline { epoch },
                    reply: None,
                })
                .await;
        }));
        epoch
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    Deadline,
    Complete,
    Start,
    Confirmed,
    Cancelled(PlayerId),
    Closed,
}

struct Window {
    kind: InputWindow,
    /// Real players expected to submit. Fillers are handled when the window closes.
    eligible: BTreeSet<PlayerId>,
    submitted: BTreeSet<PlayerId>,
}

impl Window {
    fn timed(kind: InputWindow) -> Self {
        Self {
            kind,
            eligible: BTreeSet::new(),
            submitted: BTreeSet::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.kind.closes_early() && self.eligible.is_subset(&self.submitted)
    }
}

#[derive(Debug)]
enum Abort {
    Cancelled(PlayerId),
    Provisioning(PlatformError),
    Setup(SetupError),
    Closed,
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Cancelled(by) => write!(f, "cancelled by {}", by),
            Abort::Provisioning(e) => write!(f, "could not set up the game spaces: {}", e),
            Abort::Setup(e) => write!(f, "{}", e),
            Abort::Closed => write!(f, "the session was shut down"),
        }
    }
}

/// Start a session task. The returned join handle resolves to the final snapshot.
pub fn spawn(request: SessionRequest, deps: SessionDeps) -> (SessionHandle, JoinHandle<GameSnapshot>) {
    let id = SessionId::new();
    let (tx, rx) = mpsc::channel(deps.config.queue_capacity.max(1));
    let (snapshot_tx, snapshot_rx) =
        watch::channel(GameSnapshot::new(id, request.origin, request.initiator));

    let handle = SessionHandle {
        id,
        origin: request.origin,
        events: tx.clone(),
        snapshot: snapshot_rx,
    };

    let rng = match deps.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let session = Session {
        id,
        origin: request.origin,
        initiator: request.initiator,
        initiator_name: request.initiator_name,
        player_hint: request.player_hint,
        narration: NarrationQueue::new(
            request.origin,
            deps.platform.clone(),
            deps.narrator.clone(),
            deps.feed.clone(),
            deps.config.narration.clone(),
        ),
        channels: ChannelOrchestrator::new(deps.platform.clone(), &deps.config),
        platform: deps.platform,
        entitlements: deps.entitlements,
        rewards: deps.rewards,
        feed: deps.feed,
        config: deps.config,
        events: rx,
        timer: PhaseTimer::new(tx),
        snapshot: snapshot_tx,
        stage: SessionStage::Provisioning,
        seats: Vec::new(),
        selection: None,
        game: None,
        window: None,
        reactive_choice: None,
        announced_phase: GamePhase::Lobby,
        outcome: None,
        abort_reason: None,
        rng,
    };

    let span = tracing::info_span!("session", session_id = %id, origin = %request.origin);
    let task = tokio::spawn(session.run().instrument(span));
    (handle, task)
}

struct Session {
    id: SessionId,
    origin: ChannelId,
    initiator: PlayerId,
    initiator_name: String,
    player_hint: Option<usize>,
    config: Arc<GameConfig>,
    platform: Arc<dyn ChatPlatform>,
    entitlements: Arc<dyn EntitlementStore>,
    rewards: Arc<dyn RewardSink>,
    feed: broadcast::Sender<FeedEvent>,
    narration: NarrationQueue,
    channels: ChannelOrchestrator,
    events: mpsc::Receiver<Envelope>,
    timer: PhaseTimer,
    snapshot: watch::Sender<GameSnapshot>,
    stage: SessionStage,
    seats: Vec<Seat>,
    selection: Option<RoleSelection>,
    game: Option<Game>,
    window: Option<Window>,
    /// Target named by the hunter currently taking a last shot. `Some(None)` is a pass.
    reactive_choice: Option<Option<PlayerId>>,
    announced_phase: GamePhase,
    outcome: Option<WinReport>,
    abort_reason: Option<String>,
    rng: StdRng,
}

impl Session {
    async fn run(mut self) -> GameSnapshot {
        tracing::info!(initiator = %self.initiator, "session started");
        let result = self.play().await;
        self.timer.cancel();

        let aborted = match result {
            Ok(()) => false,
            Err(abort) => {
                tracing::warn!("session aborted: {}", abort);
                self.report_abort(&abort).await;
                self.abort_reason = Some(abort.to_string());
                true
            }
        };

        self.channels.teardown().await;
        self.stage = if aborted {
            SessionStage::Aborted
        } else {
            SessionStage::Finished
        };
        self.publish();
        tracing::info!(stage = ?self.stage, "session closed");
        self.build_snapshot()
    }

    async fn play(&mut self) -> Result<(), Abort> {
        self.channels
            .provision(self.origin)
            .await
            .map_err(Abort::Provisioning)?;
        self.publish();

        self.lobby().await?;
        let role_set = self.select_roles().await?;
        self.deal(role_set).await?;

        let report = loop {
            if let Some(report) = self.night().await {
                break report;
            }
            if let Some(report) = self.day().await {
                break report;
            }
        };
        self.finish(report).await;
        Ok(())
    }

    // ---- setup ----

    async fn lobby(&mut self) -> Result<(), Abort> {
        self.seats
            .push(Seat::human(self.initiator, self.initiator_name.clone()));
        self.stage = SessionStage::Lobby;
        self.publish();

        if let Some(village) = self.channels.village() {
            let text = format!(
                "{} is gathering a game of Werewolf. Join within {} seconds.",
                self.initiator_name,
                self.config.join_duration.as_secs()
            );
            self.narration.announce(village, &text, None).await;
        }

        let end = self
            .run_window(Window::timed(InputWindow::Lobby), self.config.join_duration)
            .await;
        match end {
            WindowEnd::Cancelled(by) => return Err(Abort::Cancelled(by)),
            WindowEnd::Closed => return Err(Abort::Closed),
            _ => {}
        }

        let target = self.seat_target();
        let mut index = 0;
        while self.seats.len() < target {
            self.seats.push(Seat::filler(index));
            index += 1;
        }
        let need = self.config.limits.min;
        if self.seats.len() < need {
            return Err(Abort::Setup(SetupError::NotEnoughPlayers {
                have: self.seats.len(),
                need,
            }));
        }
        tracing::info!(seats = self.seats.len(), fillers = index, "lobby closed");
        Ok(())
    }

    /// Seats the lobby will have once fillers are added.
    fn seat_target(&self) -> usize {
        let hint = self.player_hint.unwrap_or(0).min(self.config.limits.max);
        hint.max(self.seats.len())
    }

    async fn select_roles(&mut self) -> Result<RoleSet, Abort> {
        let offered =
            owned_roles(self.entitlements.as_ref(), self.initiator, &Role::OPTIONAL).await;
        if offered.is_empty() {
            tracing::info!("initiator owns no optional roles");
            return Ok(RoleSet::default());
        }

        let names: Vec<&str> = offered.iter().map(|r| r.name()).collect();
        self.selection = Some(RoleSelection::new(self.initiator, offered.clone()));
        self.stage = SessionStage::RoleSelection;
        self.direct(
            self.initiator,
            &format!(
                "Choose the roles for this game: {}. All are enabled; toggle any off, then confirm.",
                names.join(", ")
            ),
        )
        .await;

        let end = self
            .run_window(
                Window::timed(InputWindow::RoleSelection),
                self.config.selection_duration,
            )
            .await;
        match end {
            WindowEnd::Cancelled(by) => Err(Abort::Cancelled(by)),
            WindowEnd::Closed => Err(Abort::Closed),
            end => {
                if end == WindowEnd::Deadline {
                    tracing::info!("role selection timed out, confirming current toggles");
                }
                Ok(self
                    .selection
                    .as_ref()
                    .map(RoleSelection::role_set)
                    .unwrap_or_default())
            }
        }
    }

    async fn deal(&mut self, role_set: RoleSet) -> Result<(), Abort> {
        let plan = plan_roles(
            self.seats.len(),
            &role_set,
            &self.config.thresholds,
            self.config.limits,
        )
        .map_err(Abort::Setup)?;
        let roles = assign_roles(&plan, &mut self.rng);
        let seats = std::mem::take(&mut self.seats);
        let mut game = Game::new(self.id, self.origin, seats, roles, role_set)
            .map_err(Abort::Setup)?;
        game.spaces = self.channels.spaces().ids();
        tracing::info!(quotas = ?plan.quotas, "roles dealt");

        let humans: Vec<(PlayerId, Role)> = game
            .players
            .iter()
            .filter(|p| !p.is_filler())
            .map(|p| (p.id, p.role))
            .collect();
        let pack: Vec<String> = game
            .players
            .iter()
            .filter(|p| p.role.is_werewolf())
            .map(|p| p.name.clone())
            .collect();
        self.game = Some(game);
        self.stage = SessionStage::Playing;
        self.publish();

        for (player, role) in &humans {
            self.direct(*player, &format!("Your role is {}.", role)).await;
        }
        let wolves: Vec<PlayerId> = humans
            .iter()
            .filter(|(_, role)| role.is_werewolf())
            .map(|(id, _)| *id)
            .collect();
        self.channels.admit_werewolves(&wolves).await;
        if let Some(den) = self.channels.den() {
            let text = format!("The pack: {}.", pack.join(", "));
            if let Err(e) = self.platform.send_message(den, &text).await {
                tracing::warn!("failed to greet the pack: {}", e);
            }
        }
        Ok(())
    }

    // ---- night ----

    async fn night(&mut self) -> Option<WinReport> {
        let night = {
            let game = self.game.as_mut()?;
            game.begin_night();
            game.night
        };
        self.phase_changed();
        self.say(&format!("Night {} falls. The village sleeps.", night), None)
            .await;

        let cupids = self.game.as_ref()?.night_actors(Role::Cupid);
        if !cupids.is_empty() {
            self.collect(InputWindow::Link, cupids, self.config.night_duration)
                .await;
        }

        let wolves = self.game.as_ref()?.night_actors(Role::Werewolf);
        self.collect(InputWindow::Pack, wolves, self.config.night_duration)
            .await;
        let victim = {
            let game = self.game.as_mut()?;
            game.lock_team_target(&mut self.rng)
        };
        self.tell_pack(victim).await;

        let powers = self.powers_actors(victim)?;
        if !powers.is_empty() {
            self.collect(InputWindow::Powers, powers, self.config.night_duration)
                .await;
        }

        let resolution = {
            let game = self.game.as_mut()?;
            resolve_night(game, &mut self.rng)
        };
        self.publish();

        for inspection in &resolution.inspections {
            let verdict = if inspection.is_werewolf {
                "is a werewolf"
            } else {
                "is not a werewolf"
            };
            let text = format!("{} {}.", self.name_of(inspection.target), verdict);
            self.direct(inspection.seer, &text).await;
        }
        if let Some((first, second)) = resolution.linked {
            let text = format!(
                "Cupid has bound {} and {}. If one dies, so does the other.",
                self.name_of(first),
                self.name_of(second)
            );
            self.direct(first, &text).await;
            self.direct(second, &text).await;
        }

        self.say("The sun rises over the village.", Some(PauseCategory::Morning))
            .await;
        if resolution.deaths.is_empty() {
            self.say("Nobody died during the night.", Some(PauseCategory::NoVictim))
                .await;
        }
        self.bury(&resolution.deaths).await;

        if let Some(report) = self.game.as_mut()?.check_victory() {
            return Some(report);
        }
        self.reactive(resolution.reactive).await
    }

    /// Guard, seer, and the witch while she has a potion and there is someone to save.
    fn powers_actors(&self, victim: Option<PlayerId>) -> Option<Vec<PlayerId>> {
        let game = self.game.as_ref()?;
        let mut actors = game.night_actors(Role::Guard);
        if victim.is_some() {
            actors.extend(game.night_actors(Role::Witch));
        }
        actors.extend(game.night_actors(Role::Seer));
        Some(actors)
    }

    async fn tell_pack(&mut self, victim: Option<PlayerId>) {
        let text = match victim {
            Some(victim) => format!("The pack has chosen {}.", self.name_of(victim)),
            None => "The pack could not agree on a victim.".to_string(),
        };
        if let Some(den) = self.channels.den() {
            if let Err(e) = self.platform.send_message(den, &text).await {
                tracing::warn!("failed to post to the den: {}", e);
            }
        }
        let Some(victim) = victim else {
            return;
        };
        let witches = match &self.game {
            Some(game) => game.night_actors(Role::Witch),
            None => return,
        };
        let text = format!(
            "The werewolves are coming for {}. Use your potion on them to save them.",
            self.name_of(victim)
        );
        for witch in witches {
            self.direct(witch, &text).await;
        }
    }

    /// Fire death-triggered abilities one at a time. A shot can trigger another.
    async fn reactive(&mut self, pending: Vec<PlayerId>) -> Option<WinReport> {
        let mut queue: VecDeque<PlayerId> = pending.into();
        while let Some(hunter) = queue.pop_front() {
            let is_filler = self.game.as_ref()?.player(hunter)?.is_filler();
            let target = if is_filler {
                let game = self.game.as_ref()?;
                filler_reactive_target(game, &mut self.rng)
            } else {
                self.direct(
                    hunter,
                    "You have fallen. Name one living player to take with you, or pass.",
                )
                .await;
                self.reactive_choice = None;
                let mut window = Window::timed(InputWindow::Reactive(hunter));
                window.eligible.insert(hunter);
                self.run_window(window, self.config.reactive_duration).await;
                self.reactive_choice.take().flatten()
            };

            let game = self.game.as_mut()?;
            let target = target.filter(|t| game.is_alive(*t));
            let deaths = match game.resolve_reactive(hunter, target) {
                Ok(deaths) => deaths,
                Err(e) => {
                    tracing::warn!(%hunter, "reactive ability rejected: {}", e);
                    continue;
                }
            };
            queue.extend(game.pending_reactive(&deaths));

            if deaths.is_empty() {
                let text = format!("{} fell without taking anyone along.", self.name_of(hunter));
                self.say(&text, None).await;
            }
            self.bury(&deaths).await;
            if let Some(report) = self.game.as_mut()?.check_victory() {
                return Some(report);
            }
        }
        None
    }

    // ---- day ----

    async fn day(&mut self) -> Option<WinReport> {
        let day = {
            let game = self.game.as_mut()?;
            game.begin_discussion();
            game.day
        };
        self.phase_changed();
        self.say(
            &format!("Day {}. Discuss who among you is a werewolf.", day),
            None,
        )
        .await;
        self.run_window(
            Window::timed(InputWindow::Discussion),
            self.config.discussion_duration,
        )
        .await;

        let voters = {
            let game = self.game.as_mut()?;
            game.begin_vote();
            game.living().map(|p| p.id).collect::<Vec<_>>()
        };
        self.phase_changed();
        self.say("Voting is open. Vote for a living player or abstain.", None)
            .await;
        self.collect(InputWindow::Vote, voters, self.config.vote_duration)
            .await;

        let tally = {
            let game = self.game.as_mut()?;
            game.begin_resolution();
            game.tally_votes()
        };
        self.phase_changed();
        tracing::info!(counts = ?tally.counts, abstentions = tally.abstentions, outcome = ?tally.outcome, "vote tallied");

        match tally.outcome {
            VoteOutcome::Eliminated(target) => {
                let deaths = self.game.as_mut()?.kill(target, DeathCause::Lynch);
                self.bury(&deaths).await;
                if let Some(report) = self.game.as_mut()?.check_victory() {
                    return Some(report);
                }
                let pending = self.game.as_ref()?.pending_reactive(&deaths);
                self.reactive(pending).await
            }
            VoteOutcome::Tie(_) => {
                self.say(
                    "The vote is tied. Nobody is eliminated today.",
                    Some(PauseCategory::NoVictim),
                )
                .await;
                None
            }
            VoteOutcome::Abstained | VoteOutcome::NoVotes => {
                self.say(
                    "The village could not agree. Nobody is eliminated today.",
                    Some(PauseCategory::NoVictim),
                )
                .await;
                None
            }
        }
    }

    // ---- end ----

    async fn finish(&mut self, report: WinReport) {
        self.outcome = Some(report.clone());
        self.phase_changed();
        let Some(game) = self.game.as_mut() else {
            return;
        };
        for player in game.players.iter_mut() {
            player.revealed = true;
        }
        let roster: Vec<String> = game
            .players
            .iter()
            .map(|p| format!("{} ({})", p.name, p.role))
            .collect();
        let human_winners: Vec<PlayerId> = report
            .winners
            .iter()
            .copied()
            .filter(|id| game.player(*id).map_or(false, |p| !p.is_filler()))
            .collect();
        self.publish();

        let text = format!(
            "{} win! The table was: {}.",
            report.victory,
            roster.join(", ")
        );
        self.say(&text, None).await;

        let reason = format!("werewolf victory ({})", report.victory);
        for winner in human_winners {
            if let Err(e) = self
                .rewards
                .grant(winner, self.config.reward_amount, &reason)
                .await
            {
                tracing::warn!(%winner, "failed to grant reward: {}", e);
            }
        }
        tracing::info!(victory = ?report.victory, winners = ?report.winners, "game over");
    }

    async fn report_abort(&mut self, abort: &Abort) {
        let text = format!("The game was called off: {}.", abort);
        if let Some(village) = self.channels.village() {
            if let Err(e) = self.platform.send_message(village, &text).await {
                tracing::warn!("failed to announce abort: {}", e);
            }
        }
        self.direct(self.initiator, &text).await;
    }

    // ---- windows ----

    /// Open a collection window for `actors` and let fillers among them act once it closes.
    async fn collect(&mut self, kind: InputWindow, actors: Vec<PlayerId>, duration: Duration) {
        let Some(game) = &self.game else {
            return;
        };
        let (fillers, humans): (Vec<PlayerId>, Vec<PlayerId>) = actors
            .into_iter()
            .partition(|id| game.player(*id).map_or(false, |p| p.is_filler()));
        let window = Window {
            kind,
            eligible: humans.into_iter().collect(),
            submitted: BTreeSet::new(),
        };
        let end = self.run_window(window, duration).await;
        tracing::debug!(window = kind.label(), ?end, "window closed");
        self.fillers_act(kind, &fillers);
        self.publish();
    }

    fn fillers_act(&mut self, kind: InputWindow, fillers: &[PlayerId]) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        let now = Utc::now();
        for filler in fillers {
            let result = match kind {
                InputWindow::Vote => {
                    let target = filler_vote(game, *filler, &mut self.rng);
                    game.cast_vote(*filler, target, now)
                }
                _ => match filler_night_targets(game, *filler, &mut self.rng) {
                    Some(targets) => game.submit_night_action(*filler, &targets, now).map(|_| ()),
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                tracing::debug!(%filler, "filler action rejected: {}", e);
            }
        }
    }

    async fn run_window(&mut self, window: Window, duration: Duration) -> WindowEnd {
        let epoch = self.timer.arm(duration);
        self.window = Some(window);
        self.publish();

        let end = loop {
            if self.window.as_ref().map_or(false, Window::is_complete) {
                break WindowEnd::Complete;
            }
            let Some(Envelope { event, reply }) = self.events.recv().await else {
                break WindowEnd::Closed;
            };
            if let SessionEvent::Deadline { epoch: fired } = event {
                // Only the phase timer sends deadlines, and it never waits for a reply.
                if let Some(reply) = reply {
                    let _ = reply.send(Err(self.not_now()));
                    continue;
                }
                if fired == epoch {
                    break WindowEnd::Deadline;
                }
                tracing::debug!(fired, current = epoch, "ignoring stale deadline");
                continue;
            }

            let name = event.name();
            let (outcome, end) = match self.apply(event) {
                Ok(end) => (Ok(()), end),
                Err(e) => {
                    tracing::info!(event = name, "event rejected: {}", e);
                    (Err(e), None)
                }
            };
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
            self.publish();
            if let Some(end) = end {
                break end;
            }
        };

        self.timer.cancel();
        self.window = None;
        self.publish();
        end
    }

    fn current_window(&self) -> Option<InputWindow> {
        self.window.as_ref().map(|w| w.kind)
    }

    fn not_now(&self) -> EventError {
        EventError::NotAcceptedNow(
            self.current_window()
                .map_or("this stage of the game", InputWindow::label),
        )
    }

    fn mark_submitted(&mut self, player: PlayerId) {
        if let Some(window) = self.window.as_mut() {
            window.submitted.insert(player);
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Result<Option<WindowEnd>, EventError> {
        let window = self.current_window();
        match event {
            SessionEvent::Join { player, name } if window == Some(InputWindow::Lobby) => {
                self.join(player, name)?;
                Ok(None)
            }
            SessionEvent::Leave { player } if window == Some(InputWindow::Lobby) => {
                self.leave(player)?;
                Ok(None)
            }
            SessionEvent::StartNow { by } if window == Some(InputWindow::Lobby) => {
                if by != self.initiator {
                    return Err(EventError::NotInitiator);
                }
                let have = self.seat_target();
                let need = self.config.limits.min;
                if have < need {
                    return Err(SetupError::NotEnoughPlayers { have, need }.into());
                }
                Ok(Some(WindowEnd::Start))
            }
            SessionEvent::Cancel { by, operator } => match window {
                Some(InputWindow::Lobby) | Some(InputWindow::RoleSelection) => {
                    if by != self.initiator && !operator {
                        return Err(EventError::NotInitiator);
                    }
                    tracing::info!(%by, operator, "lobby cancelled");
                    Ok(Some(WindowEnd::Cancelled(by)))
                }
                _ => Err(EventError::NotAcceptedNow("a game in progress")),
            },
            SessionEvent::ToggleRole { by, role } if window == Some(InputWindow::RoleSelection) => {
                let Some(selection) = self.selection.as_mut() else {
                    return Err(EventError::NotAcceptedNow(InputWindow::RoleSelection.label()));
                };
                let enabled = selection.toggle(by, role)?;
                tracing::debug!(%role, enabled, "role toggled");
                Ok(None)
            }
            SessionEvent::ConfirmRoles { by } if window == Some(InputWindow::RoleSelection) => {
                self.authorize_selection(by)?;
                Ok(Some(WindowEnd::Confirmed))
            }
            SessionEvent::CancelSelection { by }
                if window == Some(InputWindow::RoleSelection) =>
            {
                self.authorize_selection(by)?;
                Ok(Some(WindowEnd::Cancelled(by)))
            }
            SessionEvent::Vote { voter, target } if window == Some(InputWindow::Vote) => {
                let game = self.game.as_mut().ok_or(EventError::NotSeated)?;
                game.cast_vote(voter, target, Utc::now())?;
                self.mark_submitted(voter);
                Ok(None)
            }
            SessionEvent::Vote { .. } => match &self.game {
                Some(game) => Err(ActionError::WrongPhase(game.phase).into()),
                None => Err(self.not_now()),
            },
            SessionEvent::NightAction { actor, targets } => match window {
                Some(InputWindow::Reactive(hunter)) => {
                    self.reactive_target(hunter, actor, &targets)?;
                    self.mark_submitted(actor);
                    Ok(None)
                }
                Some(kind) if !kind.night_roles().is_empty() => {
                    let game = self.game.as_mut().ok_or(EventError::NotSeated)?;
                    let player = game
                        .player(actor)
                        .ok_or(ActionError::UnknownPlayer(actor))?;
                    if !kind.night_roles().contains(&player.role) {
                        return Err(EventError::NotAcceptedNow(kind.label()));
                    }
                    let action = game.submit_night_action(actor, &targets, Utc::now())?;
                    tracing::debug!(%actor, ?action, "night action recorded");
                    self.mark_submitted(actor);
                    Ok(None)
                }
                _ => Err(self.not_now()),
            },
            _ => Err(self.not_now()),
        }
    }

    fn join(&mut self, player: PlayerId, name: String) -> Result<(), EventError> {
        if self.seats.iter().any(|s| s.id == player) {
            return Err(EventError::AlreadyJoined);
        }
        if self.seats.len() >= self.config.limits.max {
            return Err(EventError::LobbyFull);
        }
        tracing::info!(%player, "player joined");
        self.seats.push(Seat::human(player, name));
        Ok(())
    }

    fn leave(&mut self, player: PlayerId) -> Result<(), EventError> {
        if player == self.initiator {
            return Err(EventError::NotAcceptedNow("the lobby for its initiator; cancel instead"));
        }
        let before = self.seats.len();
        self.seats.retain(|s| s.id != player);
        if self.seats.len() == before {
            return Err(EventError::NotSeated);
        }
        tracing::info!(%player, "player left");
        Ok(())
    }

    fn authorize_selection(&self, by: PlayerId) -> Result<(), EventError> {
        match &self.selection {
            Some(selection) => selection.authorize(by),
            None => Err(self.not_now()),
        }
    }

    fn reactive_target(
        &mut self,
        hunter: PlayerId,
        actor: PlayerId,
        targets: &[PlayerId],
    ) -> Result<(), EventError> {
        if actor != hunter {
            return Err(self.not_now());
        }
        let game = self.game.as_ref().ok_or(EventError::NotSeated)?;
        let target = match targets {
            [] => None,
            [target] if game.is_alive(*target) => Some(*target),
            [target] => return Err(ActionError::InvalidTarget(*target).into()),
            _ => {
                return Err(ActionError::TargetCount {
                    role: Role::Hunter,
                    expected: 1,
                    got: targets.len(),
                }
                .into())
            }
        };
        self.reactive_choice = Some(target);
        Ok(())
    }

    // ---- output ----

    async fn say(&self, text: &str, category: Option<PauseCategory>) {
        match self.channels.village() {
            Some(village) => {
                self.narration.announce(village, text, category).await;
            }
            None => tracing::warn!("no village space for announcement: {}", text),
        }
    }

    /// Private message to a real player. Fillers have nobody to receive it.
    async fn direct(&self, player: PlayerId, text: &str) {
        let is_filler = match &self.game {
            Some(game) => game.player(player).map_or(false, |p| p.is_filler()),
            None => self
                .seats
                .iter()
                .any(|s| s.id == player && s.kind == SeatKind::Filler),
        };
        if is_filler {
            return;
        }
        if let Err(e) = self.platform.send_direct(player, text).await {
            tracing::warn!(%player, "failed to send direct message: {}", e);
        }
    }

    /// Announce each death and apply its platform consequences.
    async fn bury(&mut self, deaths: &[Death]) {
        for death in deaths {
            let name = self.name_of(death.player);
            let mut text = match death.cause {
                DeathCause::Werewolves => format!("{} was killed by the werewolves.", name),
                DeathCause::Lynch => format!("The village has eliminated {}.", name),
                DeathCause::Hunter => format!("{} was shot by the hunter.", name),
                DeathCause::Heartbreak => format!("{} died of a broken heart.", name),
            };
            if death.revealed {
                text.push_str(&format!(" They were a {}.", death.role));
            }
            let category = match death.cause {
                DeathCause::Lynch => PauseCategory::Lynch,
                _ => PauseCategory::VictimReveal,
            };

            let is_filler = self
                .game
                .as_ref()
                .and_then(|g| g.player(death.player))
                .map_or(true, |p| p.is_filler());
            if !is_filler {
                self.channels
                    .player_died(death.player, death.role.is_werewolf())
                    .await;
            }
            self.publish();
            self.say(&text, Some(category)).await;
        }
    }

    fn name_of(&self, player: PlayerId) -> String {
        self.game
            .as_ref()
            .and_then(|g| g.player(player))
            .map_or_else(|| player.to_string(), |p| p.name.clone())
    }

    fn phase_changed(&mut self) {
        let Some(phase) = self.game.as_ref().map(|g| g.phase) else {
            return;
        };
        if phase != self.announced_phase {
            tracing::info!(from = ?self.announced_phase, to = ?phase, "phase change");
            let _ = self.feed.send(FeedEvent::PhaseChange {
                origin: self.origin,
                from_phase: self.announced_phase,
                to_phase: phase,
                timestamp: Utc::now(),
            });
            self.announced_phase = phase;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.build_snapshot());
    }

    fn build_snapshot(&self) -> GameSnapshot {
        let mut snapshot = GameSnapshot::new(self.id, self.origin, self.initiator);
        snapshot.stage = self.stage;
        snapshot.awaiting = self.current_window();
        snapshot.spaces = self.channels.spaces().ids();
        snapshot.abort_reason = self.abort_reason.clone();
        if let Some(selection) = &self.selection {
            snapshot.offered_roles = selection.offered().iter().copied().collect();
            snapshot.enabled_roles = selection.enabled().iter().copied().collect();
        }

        match &self.game {
            Some(game) => {
                snapshot.phase = game.phase;
                snapshot.night = game.night;
                snapshot.day = game.day;
                snapshot.outcome = self.outcome.clone();
                snapshot.players = game
                    .players
                    .iter()
                    .map(|p| PlayerView {
                        id: p.id,
                        name: p.name.clone(),
                        kind: p.kind,
                        alive: p.is_alive(),
                        role: (p.revealed || self.config.show_player_roles).then_some(p.role),
                        death: p.death,
                    })
                    .collect();
            }
            None => {
                snapshot.players = self
                    .seats
                    .iter()
                    .map(|s| PlayerView {
                        id: s.id,
                        name: s.name.clone(),
                        kind: s.kind,
                        alive: true,
                        role: None,
                        death: None,
                    })
                    .collect();
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadline(envelope: Envelope) -> u64 {
        match envelope.event {
            SessionEvent::Deadline { epoch } => epoch,
            other => panic!("expected a deadline, got {}", other.name()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_deadline() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = PhaseTimer::new(tx);
        assert_eq!(timer.arm(Duration::from_secs(10)), 1);
        assert_eq!(timer.arm(Duration::from_secs(20)), 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(deadline(first), 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_or_dropped_timers_stay_silent() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = PhaseTimer::new(tx.clone());
        timer.arm(Duration::from_secs(5));
        timer.cancel();

        let mut other = PhaseTimer::new(tx);
        other.arm(Duration::from_secs(5));
        drop(other);
        drop(timer);

        assert!(rx.recv().await.is_none());
    }
}

//! Peer session: one peer's cooperative event loop

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::net::protocol::{
    keys, MatchResult, PeerId, PropValue, PropertyWrite, ResultTrigger, Rpc, RpcEnvelope, RpcTarget,
    RoomEvent, Scope, WeaponKind, Winner,
};
use crate::net::room::{Room, RoomError};
use crate::net::rpc::{Outbox, RpcInbox};
use crate::net::store::ReplicatedStore;

use super::arbiter::{ResultArbiter, ScoreSnapshot};
use super::clock::{clock_display, round_active};
use super::combat::WeaponStats;
use super::orchestrator::{CoordinatorSignal, RoundOrchestrator};
use super::player::{CharacterSelection, DamageOutcome, PlayerState, CHARACTER_ROSTER};
use super::presentation::{AnimationCue, SessionContext};
use super::spawn::{SpawnPoint, SpawnRegistry, Vec3};
use super::MatchRules;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No character selected")]
    MissingCharacterSelection,

    #[error("Character index {index} is outside the roster of {roster}")]
    InvalidCharacter { index: usize, roster: usize },

    #[error(transparent)]
    Room(#[from] RoomError),
}

/// How the match ended for this peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost { winner: String },
    NoWinner,
}

/// Read model of a session, published after every step of its loop
#[derive(Debug, Clone, PartialEq)]
pub struct PeerView {
    pub peer: PeerId,
    pub is_coordinator: bool,
    pub health: f32,
    pub lives: u32,
    pub eliminated: bool,
    pub movement_enabled: bool,
    pub position: Vec3,
    /// Last rendered timer text
    pub clock: Option<String>,
    /// "Round complete" panel is up
    pub intermission: bool,
    /// Peers in the room, self included
    pub population: usize,
    pub outcome: Option<Outcome>,
    /// Coordinator left before a result was settled
    pub abandoned: bool,
    pub left: bool,
}

/// Final state handed back when a session ends
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: PeerId,
    pub display_name: String,
    pub lives: u32,
    pub health: f32,
    pub result: Option<MatchResult>,
    pub outcome: Option<Outcome>,
}

/// Local input to a running session
#[derive(Debug, Clone)]
enum SessionCommand {
    #[cfg(test)]
    Damage { amount: f32 },
    Attack { target: PeerId, weapon: WeaponKind },
    SetRunning(bool),
    Leave,
}

/// Everything a peer brings into a room
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub rules: MatchRules,
    pub character: Option<CharacterSelection>,
    pub spawn_points: Vec<SpawnPoint>,
    pub seed: u64,
}

/// Handle to a running session
pub struct SessionHandle {
    pub peer: PeerId,
    pub is_coordinator: bool,
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<PeerView>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Hit this peer's own avatar, as the local hit-detection layer would
    #[cfg(test)]
    pub fn damage(&self, amount: f32) -> bool {
        self.command(SessionCommand::Damage { amount })
    }

    pub fn attack(&self, target: PeerId, weapon: WeaponKind) -> bool {
        self.command(SessionCommand::Attack { target, weapon })
    }

    pub fn set_running(&self, running: bool) -> bool {
        self.command(SessionCommand::SetRunning(running))
    }

    pub fn leave(&self) -> bool {
        self.command(SessionCommand::Leave)
    }

    pub fn view(&self) -> PeerView {
        self.view.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<PeerView> {
        self.view.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end
    pub async fn finished(self) -> Option<SessionReport> {
        match self.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Session task failed");
                None
            }
        }
    }

    fn command(&self, cmd: SessionCommand) -> bool {
        self.commands.send(cmd).is_ok()
    }
}

/// One peer's view of the match, authoritative for its own avatar.
///
/// The coordinator session additionally owns the round orchestrator task and the result
/// arbiter.
pub struct PeerSession {
    me: PeerId,
    coordinator: PeerId,
    room_id: Uuid,
    outbox: Arc<Outbox>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    signals_tx: mpsc::UnboundedSender<CoordinatorSignal>,
    signals: mpsc::UnboundedReceiver<CoordinatorSignal>,
    view_tx: watch::Sender<PeerView>,

    ctx: SessionContext,
    rules: MatchRules,
    store: ReplicatedStore,
    inbox: RpcInbox,
    roster: BTreeMap<PeerId, String>,
    player: PlayerState,
    spawns: SpawnRegistry,

    orchestrator: Option<JoinHandle<()>>,
    arbiter: Option<ResultArbiter>,
    result: Option<MatchResult>,
    outcome: Option<Outcome>,

    clock_text: Option<String>,
    intermission: bool,
    grace_deadline: Option<Instant>,
    abandoned: bool,
    weapon_ready_at: HashMap<WeaponKind, Instant>,
    left: bool,
}

impl PeerSession {
    /// Join `room` and start the session loop.
    ///
    /// The character selection is checked first; on failure the room is never joined.
    pub fn start(
        room: &Arc<Room>,
        params: SessionParams,
        ctx: SessionContext,
    ) -> Result<SessionHandle, SessionError> {
        let character = params
            .character
            .ok_or(SessionError::MissingCharacterSelection)?;
        if character.index >= CHARACTER_ROSTER.len() {
            return Err(SessionError::InvalidCharacter {
                index: character.index,
                roster: CHARACTER_ROSTER.len(),
            });
        }

        let membership = room.join(&character.nickname)?;
        let me = membership.peer;
        let is_coordinator = me == membership.coordinator;

        let mut spawns = SpawnRegistry::new(params.spawn_points, params.seed.wrapping_add(me.0 as u64));
        let spawn = spawns.pick();
        let player = PlayerState::new(me, character, params.rules.combat, spawn);

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (signals_tx, signals) = mpsc::unbounded_channel();

        let mut session = Self {
            me,
            coordinator: membership.coordinator,
            room_id: room.id(),
            outbox: Arc::new(Outbox::new(room.clone(), me)),
            events: membership.events,
            commands,
            signals_tx,
            signals,
            view_tx: watch::channel(PeerView {
                peer: me,
                is_coordinator,
                health: player.health,
                lives: player.lives,
                eliminated: false,
                movement_enabled: player.movement_enabled,
                position: player.position,
                clock: None,
                intermission: false,
                population: membership.roster.len(),
                outcome: None,
                abandoned: false,
                left: false,
            })
            .0,
            ctx,
            rules: params.rules,
            store: ReplicatedStore::new(),
            inbox: RpcInbox::new(),
            roster: membership
                .roster
                .into_iter()
                .map(|info| (info.peer, info.display_name))
                .collect(),
            player,
            spawns,
            orchestrator: None,
            arbiter: is_coordinator.then(ResultArbiter::new),
            result: None,
            outcome: None,
            clock_text: None,
            intermission: false,
            grace_deadline: None,
            abandoned: false,
            weapon_ready_at: HashMap::new(),
            left: false,
        };

        if let Err(e) = session.announce() {
            room.leave(me);
            return Err(e.into());
        }

        if is_coordinator {
            let orchestrator =
                RoundOrchestrator::new(session.outbox.clone(), &session.rules, session.signals_tx.clone());
            session.orchestrator = Some(orchestrator.spawn());
        }

        let view = session.view_tx.subscribe();
        let task = tokio::spawn(session.run());

        Ok(SessionHandle {
            peer: me,
            is_coordinator,
            commands: commands_tx,
            view,
            task,
        })
    }

    /// Publish the selection and initial score to this peer's metadata
    fn announce(&self) -> Result<(), RoomError> {
        self.outbox
            .publish(Scope::Peer(self.me), self.player.selection_props())?;
        self.outbox
            .publish(Scope::Peer(self.me), self.player.score_props())?;

        info!(
            room_id = %self.room_id,
            peer = %self.me,
            name = %self.player.display_name,
            character = CHARACTER_ROSTER[self.player.character.index],
            coordinator = self.is_coordinator(),
            "Avatar spawned"
        );
        Ok(())
    }

    fn is_coordinator(&self) -> bool {
        self.me == self.coordinator
    }

    async fn run(mut self) -> SessionReport {
        let mut display = interval(self.rules.timer_poll);
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let grace = self.grace_deadline;
            // Observers only poll the timer while a round is counting down
            let poll_display = self.result.is_none() && round_active(&self.store);

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!(peer = %self.me, "Room dropped this peer");
                        self.left = true;
                        break;
                    }
                },

                Some(cmd) = self.commands.recv() => {
                    if self.handle_command(cmd).is_break() {
                        break;
                    }
                }

                Some(signal) = self.signals.recv() => self.handle_signal(signal),

                _ = display.tick(), if poll_display => self.refresh_clock(),

                _ = wait_until(grace) => {
                    info!(peer = %self.me, "Grace period over, removing defeated avatar");
                    break;
                }
            }

            self.publish_view();
        }

        self.shutdown()
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::PeerEntered(info) => {
                debug!(peer = %self.me, joined = %info.peer, "Peer entered");
                self.roster.insert(info.peer, info.display_name);
            }
            RoomEvent::PeerLeft { peer, remaining } => {
                self.roster.remove(&peer);
                self.store.remove_peer(peer);
                if peer == self.coordinator && self.result.is_none() {
                    warn!(peer = %self.me, coordinator = %peer, "Coordinator left, no more rounds will start");
                    self.abandoned = true;
                }
                self.on_population_drop(remaining);
            }
            RoomEvent::PropertiesChanged(writes) => self.apply_writes(writes),
            RoomEvent::Rpc(env) => self.handle_rpc(env),
        }
    }

    fn apply_writes(&mut self, writes: Vec<PropertyWrite>) {
        let mut clock_changed = false;
        let mut defeated = Vec::new();

        for write in &writes {
            self.outbox.observe(write.stamp.version);
            if !self.store.apply(write) {
                continue;
            }
            match (write.scope, write.key.as_str()) {
                (Scope::Match, keys::CURRENT_ROUND | keys::ROUND_TIME) => clock_changed = true,
                (Scope::Peer(peer), keys::DEFEATED) if write.value.as_bool() == Some(true) => {
                    defeated.push(peer)
                }
                _ => {}
            }
        }

        if clock_changed {
            self.refresh_clock();
        }
        for peer in defeated {
            self.on_defeat_notice(peer);
        }
    }

    fn handle_rpc(&mut self, env: RpcEnvelope) {
        if !self.inbox.accept(&env) {
            debug!(peer = %self.me, sender = %env.sender, seq = env.seq, "Dropping duplicate invocation");
            return;
        }

        match env.call {
            Rpc::ShowRoundComplete { completed_round } => {
                self.intermission = true;
                self.ctx.presentation.show_round_complete(completed_round);

                let spawn = self.spawns.pick();
                self.player.reset_for_intermission(spawn);
                self.publish_score();
            }
            Rpc::HideRoundComplete => {
                self.intermission = false;
                self.ctx.presentation.hide_round_complete();
                if !self.player.enable_movement() {
                    debug!(peer = %self.me, "Defeated avatar stays frozen");
                }
            }
            Rpc::ShowResult { result } => self.observe_result(result),
            Rpc::ApplyDamage { target, amount, weapon } => {
                if target != self.me {
                    return;
                }
                debug!(peer = %self.me, attacker = %env.sender, ?weapon, amount, "Hit");
                self.take_damage(amount);
            }
        }
    }

    fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            #[cfg(test)]
            SessionCommand::Damage { amount } => self.take_damage(amount),
            SessionCommand::Attack { target, weapon } => self.attack(target, weapon),
            SessionCommand::SetRunning(running) => {
                if self.player.movement_enabled || !running {
                    self.ctx.animation.fire(AnimationCue::Run(running));
                }
            }
            SessionCommand::Leave => {
                info!(peer = %self.me, "Leaving room");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_signal(&mut self, signal: CoordinatorSignal) {
        match signal {
            CoordinatorSignal::RoundsExhausted => {
                self.orchestrator = None;
                self.conclude(ResultTrigger::RoundsExhausted);
            }
        }
    }

    fn take_damage(&mut self, amount: f32) {
        match self.player.apply_damage(self.me, amount, &mut self.spawns) {
            DamageOutcome::Ignored => {}
            DamageOutcome::Damaged { .. } => self.publish_score(),
            DamageOutcome::Respawned { lives, .. } => {
                self.ctx.presentation.show_lives(lives);
                self.publish_score();
            }
            DamageOutcome::Defeated => self.enter_defeated(),
        }
    }

    fn enter_defeated(&mut self) {
        self.ctx.animation.fire(AnimationCue::Run(false));
        self.ctx.animation.fire(AnimationCue::Die);
        self.ctx.presentation.show_lives(0);
        self.ctx.show_local_defeat();

        // Score first, so the coordinator sees Lives=0 before it reacts to the flag
        self.publish_score();
        self.publish(Scope::Peer(self.me), [(keys::DEFEATED, PropValue::Bool(true))]);
        self.publish(Scope::Match, [(keys::IS_DEAD, PropValue::Bool(true))]);

        self.grace_deadline = Some(Instant::now() + self.rules.defeat_grace);
    }

    fn attack(&mut self, target: PeerId, weapon: WeaponKind) {
        if target == self.me || !self.player.can_act() {
            return;
        }
        let now = Instant::now();
        if self.weapon_ready_at.get(&weapon).is_some_and(|ready| now < *ready) {
            debug!(peer = %self.me, ?weapon, "Attack on cooldown");
            return;
        }

        let stats = WeaponStats::for_kind(weapon);
        self.ctx.animation.fire(match weapon {
            WeaponKind::Punch => AnimationCue::Punch,
            WeaponKind::Projectile => AnimationCue::Throw,
        });
        self.weapon_ready_at.insert(weapon, now + stats.cooldown);

        let call = Rpc::ApplyDamage {
            target,
            amount: stats.damage,
            weapon,
        };
        match self.outbox.send(RpcTarget::All, call) {
            Ok(_) => {}
            Err(e @ RoomError::RateLimited(_)) => {
                warn!(peer = %self.me, target = %target, error = %e, "Hit dropped by the room");
            }
            Err(e) => debug!(peer = %self.me, error = %e, "Attack not delivered"),
        }
    }

    /// Render the timer from the replica once both clock keys are present
    fn refresh_clock(&mut self) {
        let Some(text) = clock_display(&self.store) else {
            return;
        };
        if self.clock_text.as_deref() != Some(text.as_str()) {
            self.ctx.presentation.show_timer(&text);
            self.clock_text = Some(text);
        }
    }

    fn observe_result(&mut self, result: MatchResult) {
        if self.result.is_some() {
            return;
        }

        let outcome = match &result.winner {
            None => {
                self.ctx.presentation.show_no_winner();
                Outcome::NoWinner
            }
            Some(w) if w.peer == self.me => {
                self.ctx.presentation.show_win(&w.display_name);
                Outcome::Won
            }
            Some(w) => {
                self.ctx.show_global_loss(&w.display_name);
                Outcome::Lost {
                    winner: w.display_name.clone(),
                }
            }
        };

        info!(peer = %self.me, ?outcome, trigger = ?result.trigger, "Match result received");
        self.result = Some(result);
        self.outcome = Some(outcome);
    }

    fn on_population_drop(&mut self, remaining: usize) {
        if !self.is_coordinator() || remaining != 1 {
            return;
        }
        self.conclude(ResultTrigger::LastPeerStanding);
    }

    fn on_defeat_notice(&mut self, peer: PeerId) {
        if !self.is_coordinator() {
            return;
        }
        let participants = self.roster.len();
        if participants > 2 {
            info!(
                room_id = %self.room_id,
                defeated = %peer,
                participants,
                "Defeat noted, result deferred until the endgame"
            );
            return;
        }
        self.conclude(ResultTrigger::Elimination);
    }

    /// Coordinator only: stop the rounds, settle and broadcast the result
    fn conclude(&mut self, trigger: ResultTrigger) {
        if !self.is_coordinator() {
            return;
        }
        self.halt_rounds();

        let result = match trigger {
            ResultTrigger::LastPeerStanding => {
                let winner = self.roster.iter().next().map(|(peer, name)| Winner {
                    peer: *peer,
                    display_name: name.clone(),
                });
                self.arbiter.as_mut().and_then(|a| a.settle_with(trigger, winner))
            }
            _ => {
                let snapshots = self.score_snapshots();
                self.arbiter.as_mut().and_then(|a| a.settle(trigger, &snapshots))
            }
        };

        if let Some(result) = result {
            if let Err(e) = self.outbox.send(RpcTarget::AllBuffered, Rpc::ShowResult { result }) {
                warn!(room_id = %self.room_id, error = %e, "Failed to broadcast match result");
            }
        }
    }

    fn halt_rounds(&mut self) {
        if let Some(handle) = self.orchestrator.take() {
            handle.abort();
            info!(room_id = %self.room_id, "Round sequence halted");
        }
    }

    /// Scores of every participant, own state read directly and others from the replica.
    /// Peers that never published a score are skipped.
    fn score_snapshots(&self) -> Vec<ScoreSnapshot> {
        self.roster
            .iter()
            .filter_map(|(peer, name)| {
                if *peer == self.me {
                    return Some(ScoreSnapshot {
                        peer: *peer,
                        display_name: name.clone(),
                        lives: self.player.lives as i64,
                        health: self.player.health,
                    });
                }
                let scope = Scope::Peer(*peer);
                Some(ScoreSnapshot {
                    peer: *peer,
                    display_name: name.clone(),
                    lives: self.store.get_i64(scope, keys::LIVES)?,
                    health: self.store.get_f64(scope, keys::HEALTH)? as f32,
                })
            })
            .collect()
    }

    fn publish_score(&self) {
        self.publish(Scope::Peer(self.me), self.player.score_props());
    }

    fn publish<I>(&self, scope: Scope, props: I)
    where
        I: IntoIterator<Item = (&'static str, PropValue)>,
    {
        if let Err(e) = self.outbox.publish(scope, props) {
            debug!(peer = %self.me, error = %e, "Metadata write not delivered");
        }
    }

    fn view(&self) -> PeerView {
        PeerView {
            peer: self.me,
            is_coordinator: self.is_coordinator(),
            health: self.player.health,
            lives: self.player.lives,
            eliminated: self.player.is_eliminated(),
            movement_enabled: self.player.movement_enabled,
            position: self.player.position,
            clock: self.clock_text.clone(),
            intermission: self.intermission,
            population: self.roster.len(),
            outcome: self.outcome.clone(),
            abandoned: self.abandoned,
            left: self.left,
        }
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(self.view());
    }

    fn shutdown(mut self) -> SessionReport {
        self.halt_rounds();
        if !self.left {
            self.outbox.room().leave(self.me);
            self.left = true;
        }
        self.publish_view();

        SessionReport {
            peer: self.me,
            display_name: self.player.display_name.clone(),
            lives: self.player.lives,
            health: self.player.health,
            result: self.result,
            outcome: self.outcome,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

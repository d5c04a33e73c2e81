//! Hosted ("Kahoot-style") quiz session.
//!
//! Every access code is served by one [`HostedActor`] task owning the game, its
//! broadcast room and its round timer. Intents, timer ticks and deferred closes all
//! go through the same mailbox, so they are applied strictly in arrival order.

use std::{sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    config::HostedConfig,
    dto::{
        game::GameSummary,
        validation::validate_nickname,
        ws::{GameSnapshot, PlayerSummary, QuestionView, ServerMessage},
    },
    error::ServiceError,
    state::{
        game::{GameStatus, OPTION_COUNT, Player, Question, nickname_key},
        registry::SessionRegistry,
        room::{ConnectionId, Outbox, Room},
        round::{AnswerBook, ClosePolicy, RoundPolicy, Submission},
        scoring::{histogram, rank},
        state_machine::{HostedEvent, HostedPhase, HostedTable, StateMachine},
        timer::RoundTimer,
    },
};

type Reply = oneshot::Sender<Result<(), ServiceError>>;

enum HostedCommand {
    AttachHost {
        connection: ConnectionId,
        outbox: Outbox,
        reply: Reply,
    },
    Join {
        connection: ConnectionId,
        outbox: Outbox,
        nickname: String,
        reply: Reply,
    },
    Rejoin {
        connection: ConnectionId,
        outbox: Outbox,
        nickname: String,
        reply: Reply,
    },
    Start {
        connection: ConnectionId,
        reply: Reply,
    },
    ShowScoreboard {
        connection: ConnectionId,
        reply: Reply,
    },
    Advance {
        connection: ConnectionId,
        reply: Reply,
    },
    SubmitAnswer {
        connection: ConnectionId,
        option_index: usize,
        remaining_time: f64,
        reply: Reply,
    },
    Cancel {
        connection: ConnectionId,
        reply: Reply,
    },
    Disconnect {
        connection: ConnectionId,
        reply: Reply,
    },
    Summary {
        reply: oneshot::Sender<GameSummary>,
    },
    OpenQuestion {
        epoch: u64,
    },
    Tick {
        epoch: u64,
        remaining: i64,
    },
    CloseRound {
        epoch: u64,
    },
    HostWaitElapsed {
        epoch: u64,
    },
}

/// Whether the actor keeps serving its mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct HostedAnswer {
    option_index: usize,
    remaining_time: f64,
}

/// State of one hosted game.
struct HostedGame {
    code: String,
    questions: Arc<[Question]>,
    /// Index of the question being played or last played; `None` before the first one.
    current: Option<usize>,
    status: GameStatus,
    machine: StateMachine<HostedTable>,
    /// Keyed by normalized nickname, in join order.
    players: IndexMap<String, Player>,
    host: Option<ConnectionId>,
    answers: AnswerBook<String, HostedAnswer>,
    policy: RoundPolicy,
    duration_secs: u32,
    /// Last remaining time broadcast for the open round.
    remaining: Option<i64>,
    epoch: u64,
    created_at: SystemTime,
}

impl HostedGame {
    fn new(code: String, questions: Vec<Question>, config: &HostedConfig) -> Self {
        Self {
            code,
            questions: questions.into(),
            current: None,
            status: GameStatus::Lobby,
            machine: StateMachine::new(),
            players: IndexMap::new(),
            host: None,
            answers: AnswerBook::new(),
            policy: RoundPolicy::hosted(config),
            duration_secs: config.question_duration_secs,
            remaining: None,
            epoch: 0,
            created_at: SystemTime::now(),
        }
    }

    fn phase(&self) -> HostedPhase {
        *self.machine.phase()
    }

    fn total_questions(&self) -> usize {
        self.questions.len()
    }

    fn next_index(&self) -> usize {
        self.current.map_or(0, |index| index + 1)
    }

    /// Key of the connected player bound to `connection`.
    fn player_key_of(&self, connection: ConnectionId) -> Option<String> {
        self.players
            .iter()
            .find(|(_, player)| player.connected && player.connection == connection)
            .map(|(key, _)| key.clone())
    }

    fn connected_count(&self) -> usize {
        self.players
            .values()
            .filter(|player| player.connected)
            .count()
    }

    fn roster(&self) -> Vec<PlayerSummary> {
        self.players.values().map(PlayerSummary::from).collect()
    }

    fn ranking(&self) -> Vec<PlayerSummary> {
        rank(self.players.values().cloned())
            .iter()
            .map(PlayerSummary::from)
            .collect()
    }

    fn question_view(&self, index: usize) -> Option<QuestionView> {
        self.questions.get(index).map(|question| {
            QuestionView::new(index, question, self.duration_secs, self.total_questions())
        })
    }

    /// Snapshot tailored to `connection`: its score, and whether it already answered.
    fn snapshot_for(&self, connection: ConnectionId) -> ServerMessage {
        let open = self.phase() == HostedPhase::QuestionOpen;
        let key = self.player_key_of(connection);

        ServerMessage::GameSnapshot(GameSnapshot {
            access_code: self.code.clone(),
            status: self.status,
            phase: self.phase(),
            question_index: self.current,
            total_questions: self.total_questions(),
            players: self.roster(),
            current_question: self
                .current
                .filter(|_| open)
                .and_then(|index| self.question_view(index)),
            remaining_time: self.remaining.filter(|_| open),
            already_answered: open && key.as_ref().is_some_and(|key| self.answers.contains(key)),
            your_score: key
                .as_ref()
                .and_then(|key| self.players.get(key))
                .map(|player| player.score),
        })
    }

    fn summary(&self) -> GameSummary {
        GameSummary::new(
            &self.code,
            self.status,
            self.phase(),
            self.current,
            self.total_questions(),
            self.roster(),
            self.created_at,
        )
    }
}

/// Cheap, cloneable entry point to a running hosted game.
#[derive(Clone)]
pub struct HostedHandle {
    code: Arc<str>,
    sender: mpsc::UnboundedSender<HostedCommand>,
}

impl HostedHandle {
    /// Register a new game under `code` and start its actor.
    ///
    /// Nothing is spawned when the code is already taken.
    pub fn spawn(
        registry: Arc<SessionRegistry<HostedHandle>>,
        code: String,
        questions: Vec<Question>,
        config: &HostedConfig,
    ) -> Result<Self, ServiceError> {
        if questions.is_empty() {
            return Err(ServiceError::InvalidInput(
                "a game needs at least one question".into(),
            ));
        }

        let (sender, mailbox) = mpsc::unbounded_channel();
        let handle = Self {
            code: code.as_str().into(),
            sender: sender.clone(),
        };
        registry.create(code.clone(), handle.clone())?;

        let mut actor = HostedActor {
            game: HostedGame::new(code, questions, config),
            room: Room::new(),
            timer: RoundTimer::new(sender),
            config: config.clone(),
            registry,
            mailbox,
        };
        if let Some(wait) = config.host_wait() {
            let epoch = actor.game.epoch;
            actor
                .timer
                .schedule(wait, HostedCommand::HostWaitElapsed { epoch });
        }
        tokio::spawn(actor.run());
        Ok(handle)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> HostedCommand,
    ) -> Result<(), ServiceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)?
    }

    /// Bind `connection` as the controlling host.
    pub async fn attach_host(
        &self,
        connection: ConnectionId,
        outbox: Outbox,
    ) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::AttachHost {
            connection,
            outbox,
            reply,
        })
        .await
    }

    /// Enter the lobby under `nickname`.
    pub async fn join(
        &self,
        connection: ConnectionId,
        outbox: Outbox,
        nickname: String,
    ) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Join {
            connection,
            outbox,
            nickname,
            reply,
        })
        .await
    }

    /// Resume the disconnected player called `nickname`.
    pub async fn rejoin(
        &self,
        connection: ConnectionId,
        outbox: Outbox,
        nickname: String,
    ) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Rejoin {
            connection,
            outbox,
            nickname,
            reply,
        })
        .await
    }

    pub async fn start(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Start { connection, reply })
            .await
    }

    pub async fn show_scoreboard(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::ShowScoreboard { connection, reply })
            .await
    }

    pub async fn advance(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Advance { connection, reply })
            .await
    }

    pub async fn submit_answer(
        &self,
        connection: ConnectionId,
        option_index: usize,
        remaining_time: f64,
    ) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::SubmitAnswer {
            connection,
            option_index,
            remaining_time,
            reply,
        })
        .await
    }

    pub async fn cancel(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Cancel { connection, reply })
            .await
    }

    /// Transport of `connection` dropped. Idempotent.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| HostedCommand::Disconnect { connection, reply })
            .await
    }

    /// Public view of the game.
    pub async fn summary(&self) -> Result<GameSummary, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(HostedCommand::Summary { reply })
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)
    }
}

struct HostedActor {
    game: HostedGame,
    room: Room,
    timer: RoundTimer<HostedCommand>,
    config: HostedConfig,
    registry: Arc<SessionRegistry<HostedHandle>>,
    mailbox: mpsc::UnboundedReceiver<HostedCommand>,
}

impl HostedActor {
    async fn run(mut self) {
        info!(
            code = %self.game.code,
            questions = self.game.total_questions(),
            "hosted game opened"
        );

        while let Some(command) = self.mailbox.recv().await {
            if self.handle(command) == Flow::Stop {
                break;
            }
        }

        self.timer.cancel();
        debug!(code = %self.game.code, "hosted game actor stopped");
    }

    fn handle(&mut self, command: HostedCommand) -> Flow {
        match command {
            HostedCommand::AttachHost {
                connection,
                outbox,
                reply,
            } => {
                let _ = reply.send(self.attach_host(connection, outbox));
            }
            HostedCommand::Join {
                connection,
                outbox,
                nickname,
                reply,
            } => {
                let _ = reply.send(self.join(connection, outbox, nickname));
            }
            HostedCommand::Rejoin {
                connection,
                outbox,
                nickname,
                reply,
            } => {
                let _ = reply.send(self.rejoin(connection, outbox, &nickname));
            }
            HostedCommand::Start { connection, reply } => {
                let _ = reply.send(self.start(connection));
            }
            HostedCommand::ShowScoreboard { connection, reply } => {
                let _ = reply.send(self.show_scoreboard(connection));
            }
            HostedCommand::Advance { connection, reply } => {
                let _ = reply.send(self.advance(connection));
            }
            HostedCommand::SubmitAnswer {
                connection,
                option_index,
                remaining_time,
                reply,
            } => {
                let _ = reply.send(self.submit_answer(connection, option_index, remaining_time));
            }
            HostedCommand::Cancel { connection, reply } => {
                return match self.cancel(connection) {
                    Ok(flow) => {
                        let _ = reply.send(Ok(()));
                        flow
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        Flow::Continue
                    }
                };
            }
            HostedCommand::Disconnect { connection, reply } => {
                let flow = self.disconnect(connection);
                let _ = reply.send(Ok(()));
                return flow;
            }
            HostedCommand::Summary { reply } => {
                let _ = reply.send(self.game.summary());
            }
            HostedCommand::OpenQuestion { epoch } => self.open_question(epoch),
            HostedCommand::Tick { epoch, remaining } => self.tick(epoch, remaining),
            HostedCommand::CloseRound { epoch } => self.close_round(epoch),
            HostedCommand::HostWaitElapsed { epoch } => return self.host_wait_elapsed(epoch),
        }
        Flow::Continue
    }

    fn require_host(&self, connection: ConnectionId, action: &str) -> Result<(), ServiceError> {
        if self.game.host == Some(connection) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized(format!(
                "only the host can {action}"
            )))
        }
    }

    fn attach_host(&mut self, connection: ConnectionId, outbox: Outbox) -> Result<(), ServiceError> {
        match self.game.host {
            Some(host) if host == connection => {}
            Some(_) => {
                return Err(ServiceError::Unauthorized(format!(
                    "game `{}` already has a host",
                    self.game.code
                )));
            }
            None => {
                if self.game.player_key_of(connection).is_some() {
                    return Err(ServiceError::InvalidState(
                        "this connection already joined as a player".into(),
                    ));
                }
                self.game.host = Some(connection);
                self.room.join(connection, outbox);
                self.registry.bind_member(connection, &self.game.code);
                info!(code = %self.game.code, connection = %connection, "host attached");
            }
        }

        self.room
            .send_to(&connection, self.game.snapshot_for(connection));
        Ok(())
    }

    fn join(
        &mut self,
        connection: ConnectionId,
        outbox: Outbox,
        nickname: String,
    ) -> Result<(), ServiceError> {
        validate_nickname(&nickname).map_err(|err| {
            ServiceError::InvalidInput(
                err.message
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| "invalid nickname".into()),
            )
        })?;
        if self.game.host == Some(connection) {
            return Err(ServiceError::InvalidState(
                "the host cannot join as a player".into(),
            ));
        }

        let nickname = nickname.trim().to_string();
        let key = nickname_key(&nickname);
        if let Some(player) = self.game.players.get(&key) {
            if !player.connected {
                return self.rejoin(connection, outbox, &nickname);
            }
            if player.connection == connection {
                self.room
                    .send_to(&connection, self.game.snapshot_for(connection));
                return Ok(());
            }
            return Err(ServiceError::InvalidInput(format!(
                "nickname `{nickname}` is already taken"
            )));
        }

        if self.game.phase() != HostedPhase::Lobby {
            return Err(ServiceError::InvalidState(
                "the game has already started; only rejoins are accepted".into(),
            ));
        }
        if self.game.player_key_of(connection).is_some() {
            return Err(ServiceError::InvalidState(
                "this connection already joined the game".into(),
            ));
        }

        self.game.players.insert(
            key,
            Player {
                nickname: nickname.clone(),
                connection,
                score: 0,
                connected: true,
            },
        );
        self.room.join(connection, outbox);
        self.registry.bind_member(connection, &self.game.code);
        info!(code = %self.game.code, nickname = %nickname, "player joined");

        self.room
            .send_to(&connection, self.game.snapshot_for(connection));
        self.broadcast_roster();
        Ok(())
    }

    fn rejoin(
        &mut self,
        connection: ConnectionId,
        outbox: Outbox,
        nickname: &str,
    ) -> Result<(), ServiceError> {
        if self.game.phase().is_terminal() {
            return Err(ServiceError::InvalidState("the game is over".into()));
        }

        let key = nickname_key(nickname);
        if self
            .game
            .player_key_of(connection)
            .is_some_and(|bound| bound != key)
        {
            return Err(ServiceError::InvalidState(
                "this connection already plays under another nickname".into(),
            ));
        }

        let Some(player) = self.game.players.get_mut(&key) else {
            return Err(ServiceError::NotFound(format!(
                "no player named `{}` in game `{}`",
                nickname.trim(),
                self.game.code
            )));
        };
        if player.connected && player.connection != connection {
            return Err(ServiceError::InvalidInput(format!(
                "nickname `{}` is in use by a connected player",
                player.nickname
            )));
        }

        let previous = std::mem::replace(&mut player.connection, connection);
        player.connected = true;
        let nickname = player.nickname.clone();

        if previous != connection {
            self.room.leave(&previous);
            self.registry
                .unbind_member_from(&previous, &self.game.code);
        }
        self.room.join(connection, outbox);
        self.registry.bind_member(connection, &self.game.code);
        info!(code = %self.game.code, nickname = %nickname, "player rejoined");

        self.room
            .send_to(&connection, self.game.snapshot_for(connection));
        self.broadcast_roster();
        self.notify_live_count();
        Ok(())
    }

    fn start(&mut self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.require_host(connection, "start the game")?;
        if self.game.machine.can_fire(&HostedEvent::Start) && self.game.connected_count() == 0 {
            return Err(ServiceError::InvalidState(
                "at least one connected player is required to start".into(),
            ));
        }
        self.game.machine.fire(HostedEvent::Start)?;
        self.game.status = GameStatus::InProgress;
        info!(
            code = %self.game.code,
            players = self.game.connected_count(),
            "hosted game started"
        );

        self.room.broadcast(&ServerMessage::GameStarted {
            total_questions: self.game.total_questions(),
        });
        self.begin_countdown();
        Ok(())
    }

    /// Announce the next question and open it once the countdown elapses.
    fn begin_countdown(&mut self) {
        self.game.epoch += 1;
        let epoch = self.game.epoch;

        if self.config.countdown_secs == 0 {
            self.open_question(epoch);
            return;
        }

        self.room.broadcast(&ServerMessage::Countdown {
            next_index: self.game.next_index(),
            seconds: self.config.countdown_secs,
        });
        self.timer
            .schedule(self.config.countdown(), HostedCommand::OpenQuestion { epoch });
    }

    fn open_question(&mut self, epoch: u64) {
        if epoch != self.game.epoch {
            debug!(code = %self.game.code, epoch, "ignoring stale open-question callback");
            return;
        }

        let index = self.game.next_index();
        let Some(view) = self.game.question_view(index) else {
            warn!(code = %self.game.code, index, "no question left to open");
            return;
        };
        if let Err(err) = self.game.machine.fire(HostedEvent::OpenQuestion) {
            debug!(code = %self.game.code, error = %err, "question not opened");
            return;
        }

        self.game.current = Some(index);
        self.game.answers.clear();
        self.game.remaining = Some(i64::from(self.game.duration_secs));
        self.game.epoch += 1;
        let epoch = self.game.epoch;

        self.room.broadcast(&ServerMessage::NewQuestion(view));
        self.notify_live_count();
        match self.game.policy.close {
            ClosePolicy::Timer { duration, grace } => self.timer.start_round(
                duration,
                grace,
                move |remaining| HostedCommand::Tick { epoch, remaining },
                move || HostedCommand::CloseRound { epoch },
            ),
            ClosePolicy::AllAnswered => self.timer.cancel(),
        }
        debug!(code = %self.game.code, index, "question opened");
    }

    fn tick(&mut self, epoch: u64, remaining: i64) {
        if epoch != self.game.epoch || self.game.phase() != HostedPhase::QuestionOpen {
            return;
        }
        self.game.remaining = Some(remaining);
        self.room.broadcast(&ServerMessage::Tick {
            remaining_time: remaining,
        });
    }

    /// Score the round once and publish the result.
    fn close_round(&mut self, epoch: u64) {
        if epoch != self.game.epoch {
            debug!(code = %self.game.code, epoch, "ignoring stale round close");
            return;
        }
        if let Err(err) = self.game.machine.fire(HostedEvent::CloseRound) {
            debug!(code = %self.game.code, error = %err, "round not closed");
            return;
        }
        self.timer.cancel();
        self.game.epoch += 1;
        self.game.remaining = None;

        let Some(index) = self.game.current else {
            return;
        };
        let questions = Arc::clone(&self.game.questions);
        let Some(question) = questions.get(index) else {
            return;
        };

        let policy = self.game.policy;
        for (key, answer) in self.game.answers.iter() {
            let correct = question.is_correct_index(answer.option_index);
            let points = policy.score(correct, answer.remaining_time);
            if let Some(player) = self.game.players.get_mut(key) {
                player.score = player.score.saturating_add(points);
            }
        }

        let answer_histogram = histogram(
            self.game
                .answers
                .iter()
                .map(|(_, answer)| answer.option_index),
        );
        info!(
            code = %self.game.code,
            index,
            answers = self.game.answers.count(),
            "round closed"
        );

        self.room.broadcast(&ServerMessage::RoundResult {
            correct_option_index: question.correct,
            ranking: self.game.ranking(),
            answer_histogram: answer_histogram.to_vec(),
        });
    }

    fn show_scoreboard(&mut self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.require_host(connection, "show the scoreboard")?;
        self.game.machine.fire(HostedEvent::ShowScoreboard)?;
        self.room.broadcast(&ServerMessage::Scoreboard {
            ranking: self.game.ranking(),
        });
        Ok(())
    }

    fn advance(&mut self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.require_host(connection, "advance the game")?;

        if self.game.next_index() < self.game.total_questions() {
            self.game.machine.fire(HostedEvent::Advance)?;
            self.begin_countdown();
            return Ok(());
        }

        self.game.machine.fire(HostedEvent::Finish)?;
        self.game.status = GameStatus::Finished;
        self.timer.cancel();
        self.game.epoch += 1;
        info!(code = %self.game.code, "hosted game finished");

        self.room.broadcast(&ServerMessage::GameOver {
            final_ranking: self.game.ranking(),
        });
        Ok(())
    }

    fn submit_answer(
        &mut self,
        connection: ConnectionId,
        option_index: usize,
        remaining_time: f64,
    ) -> Result<(), ServiceError> {
        let Some(key) = self.game.player_key_of(connection) else {
            return Err(if self.game.host == Some(connection) {
                ServiceError::InvalidState("the host cannot answer".into())
            } else {
                ServiceError::Unauthorized(format!(
                    "connection is not a player of game `{}`",
                    self.game.code
                ))
            });
        };
        if self.game.phase() != HostedPhase::QuestionOpen {
            return Err(ServiceError::InvalidState("no question is open".into()));
        }
        if option_index >= OPTION_COUNT {
            return Err(ServiceError::InvalidInput(format!(
                "option index {option_index} is out of range"
            )));
        }

        match self.game.answers.submit(
            key,
            HostedAnswer {
                option_index,
                remaining_time,
            },
        ) {
            Submission::Recorded => {
                self.notify_live_count();
                if self
                    .game
                    .policy
                    .should_close(self.game.answers.count(), self.game.connected_count())
                {
                    self.close_round(self.game.epoch);
                }
            }
            Submission::Duplicate => {
                debug!(code = %self.game.code, connection = %connection, "duplicate answer ignored")
            }
        }
        Ok(())
    }

    fn cancel(&mut self, connection: ConnectionId) -> Result<Flow, ServiceError> {
        self.require_host(connection, "cancel the game")?;
        if self.game.phase() != HostedPhase::GameOver {
            self.game.machine.fire(HostedEvent::Cancel)?;
            self.room.broadcast(&ServerMessage::GameCanceled {
                reason: "the host cancelled the game".into(),
            });
        }
        Ok(self.dispose())
    }

    fn disconnect(&mut self, connection: ConnectionId) -> Flow {
        if self.game.host == Some(connection) {
            self.game.host = None;
            self.room.leave(&connection);
            if self.game.machine.fire(HostedEvent::Cancel).is_ok() {
                self.room.broadcast(&ServerMessage::GameCanceled {
                    reason: "the host disconnected".into(),
                });
            }
            return self.dispose();
        }

        let Some(key) = self.game.player_key_of(connection) else {
            return Flow::Continue;
        };
        if let Some(player) = self.game.players.get_mut(&key) {
            player.connected = false;
            info!(code = %self.game.code, nickname = %player.nickname, "player disconnected");
        }
        self.room.leave(&connection);
        self.registry
            .unbind_member_from(&connection, &self.game.code);
        self.broadcast_roster();
        self.notify_live_count();
        Flow::Continue
    }

    /// Discard a game whose host never showed up.
    fn host_wait_elapsed(&mut self, epoch: u64) -> Flow {
        if epoch != self.game.epoch
            || self.game.host.is_some()
            || self.game.phase() != HostedPhase::Lobby
        {
            return Flow::Continue;
        }
        let _ = self.game.machine.fire(HostedEvent::Cancel);
        warn!(code = %self.game.code, "no host joined in time");
        self.room.broadcast(&ServerMessage::GameCanceled {
            reason: "no host joined the game".into(),
        });
        self.dispose()
    }

    /// Tear the session down: no callback may act on it afterwards.
    fn dispose(&mut self) -> Flow {
        self.timer.cancel();
        self.game.epoch += 1;
        self.game.status = GameStatus::Finished;
        self.registry.remove(&self.game.code);
        info!(code = %self.game.code, "hosted game disposed");
        Flow::Stop
    }

    fn broadcast_roster(&self) {
        self.room.broadcast(&ServerMessage::PlayerRosterUpdate {
            players: self.game.roster(),
        });
    }

    /// Tell the host how many connected players answered the open question.
    fn notify_live_count(&self) {
        if self.game.phase() != HostedPhase::QuestionOpen {
            return;
        }
        if let Some(host) = self.game.host {
            self.room.send_to(
                &host,
                ServerMessage::LiveAnswerCount {
                    count: self.game.answers.count(),
                    total_connected: self.game.connected_count(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn question(correct: usize) -> Question {
        Question::new(
            "Who composed the Messiah?",
            ["Handel", "Bach", "Purcell", "Rameau"].map(String::from),
            correct,
        )
        .unwrap()
    }

    #[test]
    fn snapshot_hides_the_question_outside_open_rounds() {
        let mut game = HostedGame::new("ABC234".into(), vec![question(0)], &HostedConfig::default());
        let ana = Uuid::new_v4();
        game.players.insert(
            "ana".into(),
            Player {
                nickname: "Ana".into(),
                connection: ana,
                score: 120,
                connected: true,
            },
        );
        game.current = Some(0);

        let ServerMessage::GameSnapshot(snapshot) = game.snapshot_for(ana) else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.phase, HostedPhase::Lobby);
        assert!(snapshot.current_question.is_none());
        assert_eq!(snapshot.your_score, Some(120));
        assert!(!snapshot.already_answered);
    }

    #[test]
    fn ranking_keeps_join_order_on_ties() {
        let mut game = HostedGame::new("ABC234".into(), vec![question(0)], &HostedConfig::default());
        for (key, score) in [("ana", 10), ("bea", 30), ("cid", 10)] {
            game.players.insert(
                key.into(),
                Player {
                    nickname: key.into(),
                    connection: Uuid::new_v4(),
                    score,
                    connected: true,
                },
            );
        }
        let order: Vec<_> = game
            .ranking()
            .into_iter()
            .map(|player| player.nickname)
            .collect();
        assert_eq!(order, vec!["bea", "ana", "cid"]);
    }
}

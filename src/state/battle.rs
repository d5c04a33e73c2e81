//! Head-to-head battle session.
//!
//! A [`BattleActor`] owns one match between two paired connections. Questions are
//! produced fresh for every round by a spawned generation task whose result re-enters
//! the mailbox tagged with the epoch it was requested in; anything tagged with an
//! older epoch is dropped.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    catalog::Topic,
    config::BattleConfig,
    dao::profile_store::ProfileStore,
    dto::ws::{ParticipantResult, ParticipantSummary, ServerMessage},
    error::ServiceError,
    services::question_source::{FallbackError, QuestionOrigin, QuestionSource},
    state::{
        game::{Participant, Question},
        matchmaking::QueueEntry,
        registry::SessionRegistry,
        room::{ConnectionId, Room},
        round::{AnswerBook, RoundPolicy, Submission},
        state_machine::{BattleEvent, BattlePhase, BattleTable, StateMachine},
        timer::RoundTimer,
    },
};

type Reply = oneshot::Sender<Result<(), ServiceError>>;

enum BattleCommand {
    Answer {
        connection: ConnectionId,
        answer: String,
        reply: Reply,
    },
    RequestEnd {
        connection: ConnectionId,
        reply: Reply,
    },
    AcceptEnd {
        connection: ConnectionId,
        reply: Reply,
    },
    DeclineEnd {
        connection: ConnectionId,
        reply: Reply,
    },
    Disconnect {
        connection: ConnectionId,
        reply: Reply,
    },
    QuestionReady {
        epoch: u64,
        result: Result<(Question, QuestionOrigin), FallbackError>,
    },
    NextQuestion {
        epoch: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Identifier of the battle between two connections.
pub fn battle_id(first: ConnectionId, second: ConnectionId) -> String {
    format!("{}:{}", first.simple(), second.simple())
}

/// Collaborators every battle needs.
#[derive(Clone)]
pub struct BattleContext {
    pub registry: Arc<SessionRegistry<BattleHandle>>,
    pub source: Arc<QuestionSource>,
    pub profiles: Arc<dyn ProfileStore>,
    pub config: BattleConfig,
}

struct BattleGame {
    id: String,
    topic: Topic,
    participants: [Participant; 2],
    machine: StateMachine<BattleTable>,
    question: Option<Question>,
    answers: AnswerBook<ConnectionId, String>,
    end_requests: HashSet<ConnectionId>,
    policy: RoundPolicy,
    epoch: u64,
}

impl BattleGame {
    fn phase(&self) -> BattlePhase {
        *self.machine.phase()
    }

    fn seat(&self, connection: ConnectionId) -> Option<usize> {
        self.participants
            .iter()
            .position(|participant| participant.connection == connection)
    }

    fn scores(&self) -> BTreeMap<String, u32> {
        self.participants
            .iter()
            .map(|participant| (participant.profile.user_id.clone(), participant.score))
            .collect()
    }
}

/// Cheap, cloneable entry point to a running battle.
#[derive(Clone)]
pub struct BattleHandle {
    id: Arc<str>,
    sender: mpsc::UnboundedSender<BattleCommand>,
}

impl BattleHandle {
    /// Register the battle between two dequeued entries and start its actor.
    pub fn spawn(
        context: BattleContext,
        first: QueueEntry,
        second: QueueEntry,
    ) -> Result<Self, ServiceError> {
        let id = battle_id(first.connection, second.connection);
        let (sender, mailbox) = mpsc::unbounded_channel();
        let handle = Self {
            id: id.as_str().into(),
            sender: sender.clone(),
        };
        context.registry.create(id.clone(), handle.clone())?;
        context.registry.bind_member(first.connection, &id);
        context.registry.bind_member(second.connection, &id);

        let mut room = Room::new();
        room.join(first.connection, first.outbox.clone());
        room.join(second.connection, second.outbox.clone());

        let game = BattleGame {
            id,
            topic: first.topic,
            participants: [first, second].map(|entry| Participant {
                connection: entry.connection,
                profile: entry.profile,
                score: 0,
            }),
            machine: StateMachine::new(),
            question: None,
            answers: AnswerBook::new(),
            end_requests: HashSet::new(),
            policy: RoundPolicy::battle(&context.config),
            epoch: 0,
        };

        let actor = BattleActor {
            game,
            room,
            timer: RoundTimer::new(sender.clone()),
            sender,
            generation: None,
            context,
            mailbox,
        };
        tokio::spawn(actor.run());
        Ok(handle)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> BattleCommand,
    ) -> Result<(), ServiceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)?
    }

    /// Answer the open question with one of its option texts.
    pub async fn answer(
        &self,
        connection: ConnectionId,
        answer: String,
    ) -> Result<(), ServiceError> {
        self.request(|reply| BattleCommand::Answer {
            connection,
            answer,
            reply,
        })
        .await
    }

    pub async fn request_end(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| BattleCommand::RequestEnd { connection, reply })
            .await
    }

    pub async fn accept_end(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| BattleCommand::AcceptEnd { connection, reply })
            .await
    }

    pub async fn decline_end(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| BattleCommand::DeclineEnd { connection, reply })
            .await
    }

    /// Forfeit on behalf of `connection`.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), ServiceError> {
        self.request(|reply| BattleCommand::Disconnect { connection, reply })
            .await
    }
}

struct BattleActor {
    game: BattleGame,
    room: Room,
    timer: RoundTimer<BattleCommand>,
    sender: mpsc::UnboundedSender<BattleCommand>,
    generation: Option<JoinHandle<()>>,
    context: BattleContext,
    mailbox: mpsc::UnboundedReceiver<BattleCommand>,
}

impl BattleActor {
    async fn run(mut self) {
        let [first, second] = &self.game.participants;
        info!(
            battle = %self.game.id,
            topic = %self.game.topic,
            first = %first.profile.user_id,
            second = %second.profile.user_id,
            "battle paired"
        );

        if let Err(err) = self.game.machine.fire(BattleEvent::Paired) {
            warn!(battle = %self.game.id, error = %err, "battle could not start");
            self.terminate();
            return;
        }
        self.room.broadcast(&ServerMessage::OpponentFound {
            session_id: self.game.id.clone(),
            participants: self
                .game
                .participants
                .iter()
                .map(ParticipantSummary::from)
                .collect(),
            scores: self.game.scores(),
        });
        self.request_question();

        while let Some(command) = self.mailbox.recv().await {
            if self.handle(command).await == Flow::Stop {
                break;
            }
        }

        self.stop_background();
        debug!(battle = %self.game.id, "battle actor stopped");
    }

    async fn handle(&mut self, command: BattleCommand) -> Flow {
        match command {
            BattleCommand::Answer {
                connection,
                answer,
                reply,
            } => {
                let _ = reply.send(self.answer(connection, &answer));
                Flow::Continue
            }
            BattleCommand::RequestEnd { connection, reply } => {
                respond(reply, self.request_end(connection).await)
            }
            BattleCommand::AcceptEnd { connection, reply } => {
                respond(reply, self.accept_end(connection).await)
            }
            BattleCommand::DeclineEnd { connection, reply } => {
                let _ = reply.send(self.decline_end(connection));
                Flow::Continue
            }
            BattleCommand::Disconnect { connection, reply } => {
                let flow = self.disconnect(connection).await;
                let _ = reply.send(Ok(()));
                flow
            }
            BattleCommand::QuestionReady { epoch, result } => self.question_ready(epoch, result),
            BattleCommand::NextQuestion { epoch } => {
                if epoch == self.game.epoch && self.game.phase() == BattlePhase::RoundResult {
                    self.request_question();
                }
                Flow::Continue
            }
        }
    }

    fn participant(&self, connection: ConnectionId) -> Result<usize, ServiceError> {
        self.game.seat(connection).ok_or_else(|| {
            ServiceError::Unauthorized(format!(
                "connection is not a participant of battle `{}`",
                self.game.id
            ))
        })
    }

    /// Start producing the next question in the background.
    fn request_question(&mut self) {
        self.game.epoch += 1;
        let epoch = self.game.epoch;
        let topic = self.game.topic;
        let source = Arc::clone(&self.context.source);
        let mailbox = self.sender.clone();

        if let Some(task) = self.generation.take() {
            task.abort();
        }
        self.generation = Some(tokio::spawn(async move {
            let result = source.next_question(topic).await;
            let _ = mailbox.send(BattleCommand::QuestionReady { epoch, result });
        }));
    }

    fn question_ready(
        &mut self,
        epoch: u64,
        result: Result<(Question, QuestionOrigin), FallbackError>,
    ) -> Flow {
        if epoch != self.game.epoch {
            debug!(battle = %self.game.id, epoch, "discarding stale question");
            return Flow::Continue;
        }
        self.generation = None;

        match result {
            Ok((question, origin)) => {
                if let Err(err) = self.game.machine.fire(BattleEvent::QuestionPosted) {
                    debug!(battle = %self.game.id, error = %err, "question not posted");
                    return Flow::Continue;
                }
                debug!(battle = %self.game.id, ?origin, "question posted");
                self.game.answers.clear();
                self.room.broadcast(&ServerMessage::BattleQuestion {
                    prompt_text: question.prompt.clone(),
                    options: question.options.to_vec(),
                });
                self.game.question = Some(question);
                Flow::Continue
            }
            Err(err) => {
                warn!(battle = %self.game.id, error = %err, "no question available; aborting battle");
                let _ = self.game.machine.fire(BattleEvent::Abort);
                self.context.registry.remove(&self.game.id);
                self.room.broadcast(&ServerMessage::BattleError {
                    message: err.to_string(),
                });
                self.terminate()
            }
        }
    }

    fn answer(&mut self, connection: ConnectionId, answer: &str) -> Result<(), ServiceError> {
        self.participant(connection)?;
        if self.game.phase() != BattlePhase::QuestionOpen {
            return Err(ServiceError::InvalidState("no question is open".into()));
        }
        let Some(question) = self.game.question.as_ref() else {
            return Err(ServiceError::InvalidState("no question is open".into()));
        };
        let Some(index) = question.option_index(answer) else {
            return Err(ServiceError::InvalidInput(format!(
                "`{}` is not one of the options",
                answer.trim()
            )));
        };
        let option = question.options[index].clone();

        if self.game.answers.submit(connection, option) == Submission::Duplicate {
            debug!(battle = %self.game.id, connection = %connection, "duplicate answer ignored");
            return Ok(());
        }
        if self
            .game
            .policy
            .should_close(self.game.answers.count(), self.game.participants.len())
        {
            self.close_round();
        }
        Ok(())
    }

    fn close_round(&mut self) {
        if let Err(err) = self.game.machine.fire(BattleEvent::BothAnswered) {
            debug!(battle = %self.game.id, error = %err, "round not closed");
            return;
        }
        let Some(question) = self.game.question.as_ref() else {
            return;
        };

        let policy = self.game.policy;
        let mut results = Vec::with_capacity(self.game.participants.len());
        for participant in &mut self.game.participants {
            let answer = self.game.answers.get(&participant.connection).cloned();
            let correct = answer
                .as_deref()
                .is_some_and(|answer| question.is_correct_text(answer));
            participant.score = participant
                .score
                .saturating_add(policy.score(correct, 0.0));
            results.push(ParticipantResult {
                user_id: participant.profile.user_id.clone(),
                name: participant.profile.name.clone(),
                answer,
                correct,
            });
        }
        let correct_option = question.correct_option().to_string();

        self.room.broadcast(&ServerMessage::BattleRoundResult {
            results,
            scores: self.game.scores(),
            correct_option,
        });
        self.timer.schedule(
            self.context.config.next_question_delay(),
            BattleCommand::NextQuestion {
                epoch: self.game.epoch,
            },
        );
    }

    async fn request_end(&mut self, connection: ConnectionId) -> Result<Flow, ServiceError> {
        let seat = self.participant(connection)?;
        if self.game.phase() == BattlePhase::NegotiatingEnd {
            if self.game.end_requests.contains(&connection) {
                return Ok(Flow::Continue);
            }
            // Both sides asked to stop: that is an agreement.
            return self.accept_end(connection).await;
        }

        self.game.machine.fire(BattleEvent::EndRequested)?;
        self.game.end_requests.insert(connection);
        self.stop_background();
        self.game.epoch += 1;

        let requester_name = self.game.participants[seat].profile.name.clone();
        info!(battle = %self.game.id, requester = %requester_name, "early end requested");
        self.room
            .broadcast(&ServerMessage::EarlyEndRequested { requester_name });
        Ok(Flow::Continue)
    }

    async fn accept_end(&mut self, connection: ConnectionId) -> Result<Flow, ServiceError> {
        self.participant(connection)?;
        if self.game.phase() != BattlePhase::NegotiatingEnd {
            return Err(ServiceError::InvalidState(
                "no early end has been requested".into(),
            ));
        }
        if self.game.end_requests.contains(&connection) {
            return Err(ServiceError::InvalidInput(
                "the other participant must accept the early end".into(),
            ));
        }
        self.game.machine.fire(BattleEvent::EndAccepted)?;

        let [first, second] = &self.game.participants;
        let (winner, prize) = match first.score.cmp(&second.score) {
            Ordering::Greater => (Some(first.profile.clone()), self.context.config.winner_prize),
            Ordering::Less => (Some(second.profile.clone()), self.context.config.winner_prize),
            Ordering::Equal => (None, self.context.config.tie_consolation),
        };
        match &winner {
            Some(profile) => award(self.context.profiles.as_ref(), &profile.user_id, prize).await,
            None => {
                let ids: Vec<_> = self
                    .game
                    .participants
                    .iter()
                    .map(|participant| participant.profile.user_id.clone())
                    .collect();
                for user_id in ids {
                    award(self.context.profiles.as_ref(), &user_id, prize).await;
                }
            }
        }

        let winner_name = winner.map(|profile| profile.name);
        info!(
            battle = %self.game.id,
            winner = winner_name.as_deref().unwrap_or("tie"),
            prize,
            "battle finished"
        );
        self.context.registry.remove(&self.game.id);
        self.room
            .broadcast(&ServerMessage::MatchOver { winner_name, prize });
        Ok(self.terminate())
    }

    fn decline_end(&mut self, connection: ConnectionId) -> Result<(), ServiceError> {
        let seat = self.participant(connection)?;
        if self.game.phase() != BattlePhase::NegotiatingEnd {
            return Err(ServiceError::InvalidState(
                "no early end has been requested".into(),
            ));
        }
        if self.game.end_requests.contains(&connection) {
            return Err(ServiceError::InvalidInput(
                "only the other participant can decline the early end".into(),
            ));
        }
        self.game.machine.fire(BattleEvent::EndDeclined)?;
        self.game.end_requests.clear();

        let decliner_name = self.game.participants[seat].profile.name.clone();
        info!(battle = %self.game.id, decliner = %decliner_name, "early end declined");
        self.room
            .broadcast(&ServerMessage::EarlyEndDeclined { decliner_name });
        self.request_question();
        Ok(())
    }

    /// The leaver forfeits: the other participant wins without a prize and the leaver
    /// loses the disconnect penalty.
    async fn disconnect(&mut self, connection: ConnectionId) -> Flow {
        let Some(seat) = self.game.seat(connection) else {
            return Flow::Continue;
        };
        if self.game.machine.fire(BattleEvent::Forfeit).is_err() {
            return Flow::Continue;
        }
        self.room.leave(&connection);

        let leaver = self.game.participants[seat].profile.clone();
        let winner = self.game.participants[1 - seat].clone();
        award(
            self.context.profiles.as_ref(),
            &leaver.user_id,
            -self.context.config.disconnect_penalty,
        )
        .await;
        info!(
            battle = %self.game.id,
            leaver = %leaver.user_id,
            winner = %winner.profile.user_id,
            "battle forfeited"
        );

        self.context.registry.remove(&self.game.id);
        self.room.send_to(
            &winner.connection,
            ServerMessage::OpponentDisconnected {
                winner_name: winner.profile.name.clone(),
            },
        );
        self.room.send_to(
            &winner.connection,
            ServerMessage::MatchOver {
                winner_name: Some(winner.profile.name),
                prize: 0,
            },
        );
        self.terminate()
    }

    fn stop_background(&mut self) {
        self.timer.cancel();
        if let Some(task) = self.generation.take() {
            task.abort();
        }
    }

    fn terminate(&mut self) -> Flow {
        self.stop_background();
        self.game.epoch += 1;
        self.context.registry.remove(&self.game.id);
        Flow::Stop
    }
}

/// Apply a persistent score change; storage failures never block the match.
async fn award(profiles: &dyn ProfileStore, user_id: &str, delta: i64) {
    match profiles.adjust_score(user_id, delta).await {
        Ok(total) => info!(user = %user_id, delta, total, "persistent score adjusted"),
        Err(err) => warn!(
            user = %user_id,
            delta,
            error = %err,
            "failed to persist score adjustment"
        ),
    }
}

fn respond(reply: Reply, result: Result<Flow, ServiceError>) -> Flow {
    match result {
        Ok(flow) => {
            let _ = reply.send(Ok(()));
            flow
        }
        Err(err) => {
            let _ = reply.send(Err(err));
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn battle_ids_combine_both_connections() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let id = battle_id(a, b);
        assert_eq!(id, format!("{}:{}", a.simple(), b.simple()));
        assert_ne!(id, battle_id(b, a));
    }
}

use std::fmt::{self, Debug};

use serde::Serialize;
use utoipa::ToSchema;

/// Transition table of one game variant: which event moves which phase where.
pub trait TransitionTable {
    /// Phases the machine can be in.
    type Phase: Clone + PartialEq + Debug;
    /// Events the machine reacts to.
    type Event: Clone + Debug;

    /// Phase a fresh machine starts in.
    fn initial() -> Self::Phase;

    /// Phase reached by applying `event` in `from`, or `None` when the event is illegal there.
    fn next(from: &Self::Phase, event: &Self::Event) -> Option<Self::Phase>;
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition<P, E> {
    /// The phase the state machine was in when the invalid event was received.
    pub from: P,
    /// The event that cannot be applied from this phase.
    pub event: E,
}

impl<P: Debug, E: Debug> fmt::Display for InvalidTransition<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition: {:?} cannot be applied while in {:?}",
            self.event, self.from
        )
    }
}

impl<P: Debug, E: Debug> std::error::Error for InvalidTransition<P, E> {}

/// State machine driven by a [`TransitionTable`].
#[derive(Debug, Clone)]
pub struct StateMachine<T: TransitionTable> {
    phase: T::Phase,
}

impl<T: TransitionTable> Default for StateMachine<T> {
    fn default() -> Self {
        Self {
            phase: T::initial(),
        }
    }
}

impl<T: TransitionTable> StateMachine<T> {
    /// Create a machine in the table's initial phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &T::Phase {
        &self.phase
    }

    /// Whether `event` would be accepted from the current phase.
    pub fn can_fire(&self, event: &T::Event) -> bool {
        T::next(&self.phase, event).is_some()
    }

    /// Apply `event`, returning the new phase.
    pub fn fire(
        &mut self,
        event: T::Event,
    ) -> Result<T::Phase, InvalidTransition<T::Phase, T::Event>> {
        let Some(next) = T::next(&self.phase, &event) else {
            return Err(InvalidTransition {
                from: self.phase.clone(),
                event,
            });
        };
        self.phase = next;
        Ok(self.phase.clone())
    }
}

/// Phases of a hosted quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostedPhase {
    /// Players may join; waiting for the host to start.
    Lobby,
    /// Short pause before the next question opens.
    Countdown,
    /// Answers are accepted until the round timer closes the round.
    QuestionOpen,
    /// Scores computed and the answer revealed.
    RoundClosed,
    /// Ranking shown publicly by the host.
    Scoreboard,
    /// Last question played; final ranking broadcast.
    GameOver,
    /// Host cancelled or left.
    Cancelled,
}

impl HostedPhase {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, HostedPhase::GameOver | HostedPhase::Cancelled)
    }
}

/// Events applied to the hosted state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedEvent {
    /// Host starts the game from the lobby.
    Start,
    /// Countdown elapsed; the current question opens.
    OpenQuestion,
    /// Round timer fired its authoritative close.
    CloseRound,
    /// Host reveals the ranking.
    ShowScoreboard,
    /// Host moves on to the next question.
    Advance,
    /// Host moves on after the last question.
    Finish,
    /// Host cancels or disconnects.
    Cancel,
}

/// Transition table of hosted games.
#[derive(Debug, Clone)]
pub struct HostedTable;

impl TransitionTable for HostedTable {
    type Phase = HostedPhase;
    type Event = HostedEvent;

    fn initial() -> HostedPhase {
        HostedPhase::Lobby
    }

    fn next(from: &HostedPhase, event: &HostedEvent) -> Option<HostedPhase> {
        use HostedEvent as E;
        use HostedPhase as P;

        let next = match (*from, *event) {
            (P::Lobby, E::Start) => P::Countdown,
            (P::Countdown, E::OpenQuestion) => P::QuestionOpen,
            (P::QuestionOpen, E::CloseRound) => P::RoundClosed,
            (P::RoundClosed, E::ShowScoreboard) => P::Scoreboard,
            (P::RoundClosed | P::Scoreboard, E::Advance) => P::Countdown,
            (P::RoundClosed | P::Scoreboard, E::Finish) => P::GameOver,
            (phase, E::Cancel) if !phase.is_terminal() => P::Cancelled,
            _ => return None,
        };
        Some(next)
    }
}

/// Phases of a head-to-head battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    /// Waiting in the matchmaking queue.
    Searching,
    /// Opponent found; first question being generated.
    Paired,
    /// Both participants may answer.
    QuestionOpen,
    /// Both answered; next question pending.
    RoundResult,
    /// One participant asked to stop; waiting for the other one.
    NegotiatingEnd,
    /// Match decided, forfeited, or aborted.
    GameOver,
}

/// Events applied to the battle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleEvent {
    /// Two queue entries were paired.
    Paired,
    /// A question was posted to both participants.
    QuestionPosted,
    /// The second answer of the round arrived.
    BothAnswered,
    /// A participant asked for an early end.
    EndRequested,
    /// The early end was declined; play resumes.
    EndDeclined,
    /// The other participant accepted the early end.
    EndAccepted,
    /// A participant disconnected.
    Forfeit,
    /// No question could be produced.
    Abort,
}

/// Transition table of battles.
#[derive(Debug, Clone)]
pub struct BattleTable;

impl TransitionTable for BattleTable {
    type Phase = BattlePhase;
    type Event = BattleEvent;

    fn initial() -> BattlePhase {
        BattlePhase::Searching
    }

    fn next(from: &BattlePhase, event: &BattleEvent) -> Option<BattlePhase> {
        use BattleEvent as E;
        use BattlePhase as P;

        let next = match (*from, *event) {
            (P::Searching, E::Paired) => P::Paired,
            (P::Paired | P::RoundResult, E::QuestionPosted) => P::QuestionOpen,
            (P::QuestionOpen, E::BothAnswered) => P::RoundResult,
            (P::Paired | P::QuestionOpen | P::RoundResult, E::EndRequested) => P::NegotiatingEnd,
            (P::NegotiatingEnd, E::EndDeclined) => P::RoundResult,
            (P::NegotiatingEnd, E::EndAccepted) => P::GameOver,
            (phase, E::Forfeit | E::Abort) if phase != P::GameOver => P::GameOver,
            _ => return None,
        };
        Some(next)
    }
}

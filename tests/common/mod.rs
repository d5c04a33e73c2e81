#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use encore_back::{
    catalog::Catalog,
    config::{AppConfig, GeneratorConfig},
    dao::profile_store::{MemoryProfileStore, ProfileStore},
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{
        question_source::{DisabledGenerator, GenerationError, QuestionSource, TextGenerator},
        websocket_service,
    },
    state::{
        AppState, SharedState,
        room::{ConnectionId, Outbox},
    },
};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

/// Upper bound on how long (virtual time) a test waits for one event.
const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Generator replying with the same well-formed question every time.
pub struct FixedGenerator(pub &'static str);

impl TextGenerator for FixedGenerator {
    fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
        let reply = self.0.to_string();
        async move { Ok(reply) }.boxed()
    }
}

/// Generator whose replies wait for a permit of `gate`; one permit per reply.
pub struct GatedGenerator {
    pub gate: Arc<Semaphore>,
    pub reply: &'static str,
}

impl TextGenerator for GatedGenerator {
    fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
        let gate = Arc::clone(&self.gate);
        let reply = self.reply.to_string();
        async move {
            if let Ok(permit) = gate.acquire_owned().await {
                permit.forget();
            }
            Ok(reply)
        }
        .boxed()
    }
}

pub const BACH_REPLY: &str = "Question: Who composed the Brandenburg Concertos?\n\
     Options: A) Bach | B) Handel | C) Vivaldi | D) Telemann\n\
     Answer: A";

pub fn state_with(
    config: AppConfig,
    generator: Arc<dyn TextGenerator>,
    catalog: Catalog,
    profiles: Arc<dyn ProfileStore>,
) -> SharedState {
    let source = QuestionSource::new(generator, Arc::new(catalog), &GeneratorConfig::default());
    AppState::with_parts(config, source, profiles)
}

pub fn catalog_state() -> SharedState {
    state_with(
        AppConfig::default(),
        Arc::new(DisabledGenerator),
        Catalog::builtin(),
        Arc::new(MemoryProfileStore::new()),
    )
}

/// Simulated WebSocket client: an id plus the receiving end of its outbox.
pub struct Client {
    pub id: ConnectionId,
    pub outbox: Outbox,
    events: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Client {
    pub fn new() -> Self {
        let (outbox, events) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            outbox,
            events,
        }
    }

    /// Send an intent through the gateway dispatcher.
    pub async fn send(
        &self,
        state: &SharedState,
        intent: ClientMessage,
    ) -> Result<(), ServiceError> {
        websocket_service::dispatch(state, self.id, &self.outbox, intent).await
    }

    /// Drop the transport.
    pub async fn disconnect(&self, state: &SharedState) {
        websocket_service::release(state, self.id).await;
    }

    pub async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("outbox closed")
    }

    /// Skip events until one matches `wanted`, returning it.
    pub async fn until(&mut self, wanted: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let event = self.next().await;
            if wanted(&event) {
                return event;
            }
        }
    }

    /// Everything already queued, without waiting.
    pub fn pending(&mut self) -> Vec<ServerMessage> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

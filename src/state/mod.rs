pub mod battle;
pub mod game;
pub mod hosted;
pub mod matchmaking;
pub mod registry;
pub mod room;
pub mod round;
pub mod scoring;
pub mod state_machine;
pub mod timer;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    catalog::Catalog,
    config::AppConfig,
    dao::profile_store::{MemoryProfileStore, ProfileStore},
    services::question_source::QuestionSource,
};

use self::{
    battle::{BattleContext, BattleHandle},
    hosted::HostedHandle,
    matchmaking::MatchmakingQueue,
    registry::SessionRegistry,
};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, collaborators and the live session registries.
pub struct AppState {
    config: Arc<AppConfig>,
    source: Arc<QuestionSource>,
    profiles: Arc<dyn ProfileStore>,
    hosted: Arc<SessionRegistry<HostedHandle>>,
    battles: Arc<SessionRegistry<BattleHandle>>,
    matchmaking: Mutex<MatchmakingQueue>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Questions come from the configured generator with the built-in catalog as fallback;
    /// persistent scores live in memory.
    pub fn new(config: AppConfig) -> SharedState {
        let source = QuestionSource::from_config(&config.generator, Arc::new(Catalog::builtin()));
        Self::with_parts(config, source, Arc::new(MemoryProfileStore::new()))
    }

    /// Assemble the state from explicit collaborators.
    pub fn with_parts(
        config: AppConfig,
        source: QuestionSource,
        profiles: Arc<dyn ProfileStore>,
    ) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            source: Arc::new(source),
            profiles,
            hosted: Arc::new(SessionRegistry::new("game")),
            battles: Arc::new(SessionRegistry::new("battle")),
            matchmaking: Mutex::new(MatchmakingQueue::new()),
        })
    }

    /// Shared read-only configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn question_source(&self) -> &Arc<QuestionSource> {
        &self.source
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Live hosted games keyed by access code.
    pub fn hosted(&self) -> &Arc<SessionRegistry<HostedHandle>> {
        &self.hosted
    }

    /// Live battles keyed by battle id.
    pub fn battles(&self) -> &Arc<SessionRegistry<BattleHandle>> {
        &self.battles
    }

    /// Waiting line of the battle mode; hold the guard across enqueue and pairing.
    pub fn matchmaking(&self) -> &Mutex<MatchmakingQueue> {
        &self.matchmaking
    }

    /// Collaborators handed to every new battle.
    pub fn battle_context(&self) -> BattleContext {
        BattleContext {
            registry: Arc::clone(&self.battles),
            source: Arc::clone(&self.source),
            profiles: Arc::clone(&self.profiles),
            config: self.config.battle.clone(),
        }
    }
}

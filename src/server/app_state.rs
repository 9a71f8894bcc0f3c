use std::{sync::Arc, time::Duration};

use crate::{
    audio::AudioDataFormat,
    configs::Config,
    monitoring::StatsCollector,
    player::PlayerContext,
    routeplanner::{BalancingIpRoutePlanner, RoutePlanner},
    server::registry::SessionRegistry,
    sources::SourceManager,
    voice::{VoiceClient, local::LocalVoiceClient},
};

/// Top-level application state.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub sources: Arc<SourceManager>,
    pub routeplanner: Option<Arc<dyn RoutePlanner>>,
}

impl AppState {
    /// Composition root: wires sources, the route planner, players and the
    /// session registry from one configuration.
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_voice_client(config, Arc::new(LocalVoiceClient::new()))
    }

    pub fn with_voice_client(config: Config, voice_client: Arc<dyn VoiceClient>) -> Arc<Self> {
        let routeplanner = BalancingIpRoutePlanner::from_config(&config.route_planner)
            .map(|rp| Arc::new(rp) as Arc<dyn RoutePlanner>);
        let sources = Arc::new(SourceManager::new(&config.sources, routeplanner.clone()));

        let player_context = Arc::new(PlayerContext {
            sources: sources.clone(),
            filters: config.filters.clone(),
            update_interval: Duration::from_secs(config.server.player_update_interval.max(1)),
            format: AudioDataFormat::DISCORD_PCM,
        });
        let registry = SessionRegistry::new(
            config.server.clone(),
            voice_client,
            player_context,
            Arc::new(StatsCollector::new()),
        );

        Arc::new(Self {
            config,
            registry,
            sources,
            routeplanner,
        })
    }
}

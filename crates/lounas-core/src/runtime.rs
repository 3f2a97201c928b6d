//! Wires config into a running core: sources, cache, votes, truncation and
//! scheduled jobs.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    blocks::MenuRenderer,
    cache::{AggregationService, MenuCache},
    calendar::{Clock, SystemClock},
    config::Config,
    jobs::{CacheSweepJob, JobScheduler, PrefetchJob},
    messaging::{MessagingPort, ThrottleConfig, ThrottledMessenger},
    normalize::TextNormalizer,
    router::SourceRouter,
    service::LunchService,
    sources::{HttpFetcher, IconResolver, SourceDeps},
    truncation::TruncationScheduler,
    votes::{FileLedgerStore, LedgerStore, VotePolicy, VotingEngine},
    weather::OpenMeteoClient,
    Result,
};

/// Everything started by [`start`]. Dropping it does not stop background
/// tasks; call [`Runtime::shutdown`].
pub struct Runtime {
    pub service: Arc<LunchService>,
    pub jobs: JobScheduler,
    pub truncation: TruncationScheduler,
}

impl Runtime {
    pub async fn shutdown(&self) {
        self.jobs.stop().await;
        self.truncation.stop().await;
        info!("Background tasks stopped");
    }
}

/// Build the core on top of `transport`, recover pending truncations and
/// start the background jobs.
pub async fn start(cfg: Arc<Config>, transport: Arc<dyn MessagingPort>) -> Result<Runtime> {
    let clock = Arc::new(SystemClock::new(cfg.settings.timezone));
    start_with_clock(cfg, transport, clock).await
}

pub async fn start_with_clock(
    cfg: Arc<Config>,
    transport: Arc<dyn MessagingPort>,
    clock: Arc<dyn Clock>,
) -> Result<Runtime> {
    let settings = Arc::new(cfg.settings.clone());

    let http = Arc::new(HttpFetcher::new(
        cfg.fetch_timeout,
        &HttpFetcher::user_agent(settings.git_url.as_deref()),
    )?);
    let deps = SourceDeps {
        http: http.clone(),
        clock: clock.clone(),
        normalizer: Arc::new(TextNormalizer::new(settings.strip_rules.clone())),
        icons: IconResolver::new(settings.override_icons_url.clone()),
    };
    let router = Arc::new(SourceRouter::from_settings(
        &settings,
        deps,
        cfg.source_deadline,
    ));

    let mut aggregation = AggregationService::new(
        router,
        Arc::new(MenuCache::new()),
        clock.clone(),
        MenuRenderer::from_settings(&settings),
    );
    if let Some(url) = &settings.open_meteo_url {
        aggregation = aggregation.with_weather(Arc::new(OpenMeteoClient::new(http, url.clone())));
    }
    let aggregation = Arc::new(aggregation);

    let store: Arc<dyn LedgerStore> = match &cfg.store_file {
        Some(path) => {
            info!("Vote ledgers in {}", path.display());
            Arc::new(FileLedgerStore::open(path)?)
        }
        None => {
            warn!("Vote ledgers are kept in memory only");
            Arc::new(FileLedgerStore::memory())
        }
    };
    let engine = Arc::new(VotingEngine::new(
        store.clone(),
        VotePolicy::new(settings.limit_to_one_vote_per_user, settings.display_voters),
    ));

    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(transport, ThrottleConfig::default()));

    let truncation = TruncationScheduler::new(
        settings.instance_id.clone(),
        store.clone(),
        messenger.clone(),
        clock.clone(),
        cfg.truncation_policy,
        cfg.sweep_interval,
    );
    match truncation.recover().await {
        Ok(n) => info!("Truncation recovery done ({n} pending)"),
        Err(e) => warn!("Truncation recovery failed: {e}"),
    }
    truncation.start_sweeper().await;

    let jobs = JobScheduler::new(clock.clone());
    jobs.add(
        &settings.prefetch_cron,
        Arc::new(PrefetchJob::new(
            aggregation.clone(),
            settings.default_restaurants.clone(),
        )),
    )
    .await?;
    jobs.add(
        &settings.cache_sweep_cron,
        Arc::new(CacheSweepJob::new(aggregation.clone())),
    )
    .await?;

    let service = Arc::new(LunchService::new(
        settings,
        aggregation,
        engine,
        store,
        messenger,
        truncation.clone(),
        clock,
    ));

    Ok(Runtime {
        service,
        jobs,
        truncation,
    })
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use super::*;
    use crate::{
        calendar::{DateOffset, ManualClock},
        config::Settings,
        domain::{ChatId, Voter},
        messaging::fake::FakeMessenger,
        truncation::TruncationPolicy,
    };

    fn config() -> Config {
        let settings = Settings::from_json_str(
            r#"{
                "instanceId": "rt",
                "latLon": {"lat": 61.68, "lon": 27.27},
                "dataProvider": "mock",
                "defaultRestaurants": ["savo", "talli", "holvi"]
            }"#,
        )
        .unwrap();
        Config {
            telegram_bot_token: "token".into(),
            settings_file: PathBuf::from("config.json"),
            store_file: None,
            fetch_timeout: Duration::from_secs(1),
            source_deadline: Duration::from_secs(2),
            truncation_policy: TruncationPolicy::default(),
            sweep_interval: Duration::from_secs(60),
            settings,
        }
    }

    #[tokio::test]
    async fn mock_provider_runtime_serves_a_menu() {
        let clock = Arc::new(ManualClock::at(2026, 10, 19, 10, 45).unwrap());
        let transport = Arc::new(FakeMessenger::default());
        let rt = start_with_clock(Arc::new(config()), transport.clone(), clock)
            .await
            .unwrap();

        let status = rt.jobs.status().await;
        let names: Vec<&str> = status.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["cache-sweep", "prefetch"]);

        let msg = rt
            .service
            .request_menu(ChatId(9), &Voter::new(1, "Alice"), DateOffset::Today)
            .await
            .unwrap();
        assert_eq!(msg.chat_id, ChatId(9));
        assert_eq!(rt.truncation.armed().await, 1);

        rt.shutdown().await;
        assert_eq!(rt.truncation.armed().await, 0);
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gasless_relayer::{
    api::{self, state::AppState},
    chain::{ChainClient, EthersChain},
    config::Config,
    contracts::constants::{DOMAIN_NAME, DOMAIN_VERSION},
    humanity::WorldIdClient,
    unix_now,
    verify::Verifier,
    Intake, Relayer, Rewards, Store,
};
use market_primitives::Domain;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gasless_relayer=info,tower_http=info")),
        )
        .init();

    let cfg = Config::parse();
    let key = cfg.relayer_key()?;

    let chain = EthersChain::connect(&cfg.rpc_url, &key, Some(cfg.chain_id))
        .await
        .context("failed to connect to the chain")?;
    let chain: Arc<dyn ChainClient> = Arc::new(chain);
    let relayer_address = chain.relayer_address();
    let store = Arc::new(
        Store::open(&cfg.database_path)
            .with_context(|| format!("failed to open database {}", cfg.database_path.display()))?,
    );
    info!(
        relayer = %relayer_address,
        chain_id = cfg.chain_id,
        entrypoint = %cfg.entrypoint,
        db = %cfg.database_path.display(),
        "starting gasless relayer"
    );

    let settings = cfg.relay_settings();
    let relayer = Relayer::new(chain.clone(), store.clone(), settings.clone());
    // PENDING_RELAY rows can only be resolved before the worker owns the wallet nonce.
    let report = relayer
        .reconcile(true)
        .await
        .context("startup reconciliation failed")?;
    info!(?report, "startup reconciliation done");
    let (handle, _worker) = relayer.start();
    let _reconciler = relayer.spawn_reconciler(cfg.reconcile_interval());

    let humanity = WorldIdClient::new(
        &cfg.world_id_api,
        &cfg.world_id_app_id,
        cfg.world_id_action.clone(),
        std::time::Duration::from_secs(cfg.world_id_timeout_secs),
    )
    .context("failed to build the World ID client")?;
    let domain = Domain::new(DOMAIN_NAME, DOMAIN_VERSION, cfg.chain_id, cfg.entrypoint);
    let intake = Intake::new(
        Verifier::new(domain),
        handle.clone(),
        store.clone(),
        chain.clone(),
        Arc::new(humanity),
        &settings,
    );
    let rewards = Rewards::new(store.clone());
    spawn_expiry(rewards.clone(), cfg.reconcile_interval());

    let state = AppState::new(Arc::new(intake), rewards, handle, relayer_address, cfg.chain_id)
        .with_response_wait(cfg.response_wait())
        .with_admin_token(cfg.admin_token.clone());
    let app = api::create_app(state, cfg.enable_cors);

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!(addr = %cfg.listen, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

fn spawn_expiry(rewards: Rewards, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match rewards.expire_due(unix_now()) {
                Ok(0) => {}
                Ok(n) => info!(expired = n, "expired reward distributions"),
                Err(err) => warn!(%err, "failed to expire distributions"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    agent::AccountAgent,
    cli::Args,
    client::{create_ledger, create_shared_client},
    config::TestConfig,
    generator::LoadGenerator,
    keys::KeyPair,
    ledger::{Address, SharedLedger},
    pool::AgentPool,
    provisioner::Provisioner,
    script::ScriptCache,
    stats::{print_final_report, run_stats_reporter},
    tracker::{self, create_tracker_channel, run_tracker, TrackerEvent},
};

/// Main entry point for the load test
pub async fn run_load_test(args: Args) -> Result<()> {
    info!("Starting tokenbrr load tester");

    args.validate().map_err(|e| anyhow::anyhow!(e))?;
    let config = match args.config.as_deref() {
        Some(path) => TestConfig::load(path)?,
        None => TestConfig::default(),
    };
    let agent_config = config.agent_config()?;
    info!(
        rpc = %args.rpc,
        accounts = args.num,
        tps = args.tps,
        gas_limit = agent_config.gas_limit,
        seal_timeout = ?agent_config.promise.deadline,
        "Configuration loaded"
    );

    let duration = args.parse_duration().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(d) = duration {
        info!(duration_secs = d.as_secs(), "Test duration configured");
    } else {
        info!("Running until Ctrl+C");
    }
    if args.num < 2 {
        warn!(
            accounts = args.num,
            "Fewer than two accounts, no transfers will be generated"
        );
    }

    // Step 1: Connect the root account
    let http_client = create_shared_client()?;
    let ledger: SharedLedger = Arc::new(create_ledger(http_client.clone(), &args.rpc)?);
    let address = Address::from_hex(&args.address).context("Invalid root account address")?;
    let key = KeyPair::from_hex(&args.hex).context("Failed to parse root account key")?;
    let root = AccountAgent::connect(ledger, address, key, agent_config)
        .await
        .context("Failed to load root account")?;
    info!(address = %root.address(), "Root account loaded");

    // Step 2: Deploy contracts and provision users
    let cache = Arc::new(ScriptCache::http(http_client));
    let provisioner = Provisioner::new(Arc::new(root), cache, &config);
    let deployment = provisioner.deploy().await.context("Deployment phase failed")?;
    let users = provisioner
        .provision(&deployment, args.num)
        .await
        .context("Provisioning phase failed")?;
    info!(accounts = users.len(), "Provisioning complete");

    // Step 3: Tracker and stats reporter
    let (tracker_tx, tracker_rx) = create_tracker_channel();
    let tracker_handle = tokio::spawn(run_tracker(tracker_rx));

    // Reporter keeps running while in-flight transfers drain
    let reporter_shutdown = CancellationToken::new();
    let stats_handle = tokio::spawn(run_stats_reporter(
        tracker_tx.clone(),
        reporter_shutdown.clone(),
    ));

    // Step 4: Generate load until the duration elapses or Ctrl+C
    let rng = config
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut generator = LoadGenerator::new(
        Arc::new(AgentPool::new(users)),
        provisioner.transfer_plan(&deployment),
        tracker_tx.clone(),
        rng,
        args.tps,
    );

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let stop_handle = tokio::spawn(async move {
        let outcome = wait_for_stop(duration).await;
        stop.cancel();
        outcome
    });

    info!(
        interval_us = generator.interval().as_micros() as u64,
        "Load test running..."
    );
    generator.run(shutdown).await;

    // Step 5: Drain
    info!(in_flight = generator.in_flight(), "Shutting down...");
    generator.drain().await;
    info!("All transfers sealed, failed or timed out");

    reporter_shutdown.cancel();
    let _ = stats_handle.await;

    // Step 6: Final report
    let final_stats = tracker::get_stats(&tracker_tx).await.unwrap_or_default();
    if let Err(e) = tracker_tx.send(TrackerEvent::Shutdown) {
        warn!(error = %e, "Failed to send shutdown to tracker");
    }
    if let Err(e) = tracker_handle.await {
        warn!(error = %e, "Tracker task panicked");
    }

    print_final_report(&final_stats);

    stop_handle.await.context("Stop signal task panicked")?
}

async fn wait_for_stop(duration: Option<Duration>) -> Result<()> {
    if let Some(d) = duration {
        tokio::select! {
            () = tokio::time::sleep(d) => {
                info!("Duration elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
            }
        }
    } else {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Ctrl+C received");
    }
    Ok(())
}

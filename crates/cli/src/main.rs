use clap::Parser;
use config::Config;
use lowmemd::{
    cli::Cli,
    priority::protect_process,
    signals::{SignalEvent, wait_for_signal},
};
use reclaimer::{
    ControlEvent, LowMemoryKiller, ProcfsHost, ReclaimEngine, Services, SystemClock, Tunables,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. `LOWMEMD_LOG` can only set the level per crate, e.g.
    // `LOWMEMD_LOG=reclaimer=trace lowmemd -v` traces the reclaim path while
    // everything else logs at info.
    let env_filter = EnvFilter::builder()
        .with_env_var("LOWMEMD_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    let config = load_config(&cli)?;
    debug!(?config, ?cli);

    protect_process();

    // install signal handlers
    let (signals_tx, mut signals_rx) = mpsc::channel(8);
    let mut signal_handle = tokio::spawn(async move { wait_for_signal(signals_tx).await });

    let host = Arc::new(ProcfsHost::new(
        config.daemon.dry_run,
        config.daemon.background_balancer,
    ));
    let clock = Arc::new(SystemClock);
    let killer = Arc::new(LowMemoryKiller::new(
        Tunables::from_config(&config),
        host.clone(),
        host.clone(),
        clock.clone(),
    ));
    let mut engine = ReclaimEngine::new(
        config,
        Services {
            killer,
            source: host,
            clock,
        },
    );

    let cancel = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let mut engine_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_until(cancel, control_rx).await })
    };
    info!("lowmemd started");

    loop {
        tokio::select! {
            // bubble up any errors from the signal handlers
            res = &mut signal_handle => {
                let res = res?;
                if let Err(err) = &res {
                    error!("error happened during handling signals: {}", err);
                }
                res?;
                // Signal stream ended without a shutdown request.
                cancel.cancel();
                break;
            }

            // bubble up any errors from the engine
            res = &mut engine_handle => {
                let res = res?;
                if let Err(err) = &res {
                    error!("error happened in reclaim engine: {}", err);
                }
                res?;
                return Ok(());
            }

            // handle the signal events
            Some(event) = signals_rx.recv() => {
                debug!(?event, "Received signal event");

                match event {
                    SignalEvent::DumpStatus => {
                        control_tx.send(ControlEvent::DumpStatus)?;
                    }
                    SignalEvent::ReloadConfig => match load_config(&cli) {
                        Ok(config) => control_tx.send(ControlEvent::Reload(Box::new(config)))?,
                        Err(err) => warn!(%err, "keeping current config"),
                    },
                    SignalEvent::Shutdown => {
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    engine_handle.await??;
    info!("lowmemd stopped");
    Ok(())
}

/// Read the configuration files and apply the command line on top.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/lowmemd/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/lowmemd/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    cli.apply(&mut config)?;
    Ok(config)
}

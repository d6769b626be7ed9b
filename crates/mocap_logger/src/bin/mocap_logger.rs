use anyhow::Context;
use argh::FromArgs;
use mocap_logger::config::{LoggerConfig, SourceKind, TransportMode};
use mocap_logger::{source, Supervisor, SupervisorState};
use std::path::PathBuf;

#[derive(FromArgs)]
/// Record live motion-capture frames and rigid-body poses to CSV
struct Args {
    /// path to a YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// output directory for the CSV logs (default: mocap_recordings)
    #[argh(option, short = 'o')]
    output_dir: Option<PathBuf>,

    /// local address of this machine on the tracking network
    #[argh(option)]
    client_address: Option<String>,

    /// address of the tracking server
    #[argh(option)]
    server_address: Option<String>,

    /// transport mode: unicast or multicast
    #[argh(option)]
    transport: Option<TransportMode>,

    /// streaming source: zenoh or synthetic
    #[argh(option)]
    source: Option<SourceKind>,
}

fn load_config(args: Args) -> mocap_logger::Result<LoggerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            LoggerConfig::from_file(path)?
        }
        None => LoggerConfig::default(),
    };

    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(client_address) = args.client_address {
        config.source.client_address = client_address;
    }
    // Flag > MOCAP_SERVER_ADDRESS > config file > default
    if let Some(server_address) = args
        .server_address
        .or_else(|| std::env::var("MOCAP_SERVER_ADDRESS").ok())
    {
        config.source.server_address = server_address;
    }
    if let Some(transport) = args.transport {
        config.source.transport = transport;
    }
    if let Some(kind) = args.source {
        config.source.kind = kind;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();
    let config = load_config(args).context("Invalid configuration")?;

    log::info!("Output directory: {}", config.output_dir.display());

    // Create shutdown channel
    let shutdown_tx = tokio::sync::watch::Sender::new(());
    let shutdown_rx = shutdown_tx.subscribe();

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            println!("\nStopping recording...");
            if let Err(e) = shutdown_tx.send(()) {
                log::warn!(
                    "Failed to send shutdown signal: {}. Receiver may have been dropped.",
                    e
                );
            }
        }
    })?;

    let mut source = source::from_config(&config.source);
    let mut supervisor = Supervisor::new(config.clone());

    let mut state_rx = supervisor.watch_state();
    let output_dir = config.output_dir.clone();
    let banner = tokio::spawn(async move {
        if state_rx
            .wait_for(|state| *state == SupervisorState::Streaming)
            .await
            .is_ok()
        {
            println!("Successfully connected to the tracking system!");
            println!("Recording data to: {}", output_dir.display());
            println!("Press Ctrl+C to stop recording...");
        }
    });

    let result = supervisor.run(source.as_mut(), shutdown_rx).await;
    banner.abort();

    match result {
        Ok(summary) => {
            println!("Recording finished! {}", summary.stats);
            println!("  frames:       {}", summary.frame_log.display());
            println!("  rigid bodies: {}", summary.rigid_body_log.display());
            Ok(())
        }
        Err(e) if supervisor.transitions().contains(&SupervisorState::Streaming) => {
            Err(e).context("Recording did not shut down cleanly")
        }
        Err(e) => {
            eprintln!("ERROR: {}", e.startup_diagnostic());
            Err(e).context("Capture did not start")
        }
    }
}

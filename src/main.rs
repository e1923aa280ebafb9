use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    thread,
};

use beeline::{
    BeelineError, Coord, PeerProfile, TrackerConfig,
    alerts::{ChannelFeedback, LogFeedback, simulation::SimulatedApproach},
    clock::SystemClock,
    roster,
    routing::{HttpDirectionsProvider, RouteSession, link::walking_directions_link},
    tracking::{self, producer::ReplayFixProducer},
    writer,
};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, arg};
use itertools::Itertools;
use log::{info, warn};
use tokio::sync::Notify;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replays recorded fixes through the proximity alerts
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        /// Writes raised alerts as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "target")]
        peer: String,
    },
    /// Walks a simulated approach through the proximity alerts
    Simulate {
        #[arg(long, default_value_t = 20.)]
        start: f64,

        #[arg(long, default_value_t = 5.)]
        step: f64,
    },
    /// Fetches walking directions and keeps them fresh until Ctrl-C
    Route {
        #[arg(long)]
        from: Coord,

        #[arg(long)]
        to: Coord,

        #[arg(long)]
        api_key: Option<String>,

        /// Keep refreshing the route until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Prints a deep link for walking directions in an external map viewer
    Link {
        #[arg(long)]
        to: Coord,

        #[arg(long)]
        from: Option<Coord>,
    },
}

fn load_config() -> TrackerConfig {
    match TrackerConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => TrackerConfig::default(),
        Err(e) => {
            warn!("Ignoring local config: {}", e);
            TrackerConfig::default()
        }
    }
}

fn install_exit_handler() {
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }
}

fn replay(input: &Path, output: Option<PathBuf>, peer: &str) -> Result<(), BeelineError> {
    let config = load_config();
    let producer = ReplayFixProducer::from_file(input)?;
    let session = config.position_session("replay", PeerProfile::new(peer, peer));
    let mut engine = config.alert_engine(config.tier_table()?);
    let clock = SystemClock;

    // with an output file the alerts go through a channel to the writer thread
    let (summary, writer_handle) = if let Some(output_file) = output {
        let (alert_tx, alert_rx) = mpsc::channel();
        let handle = thread::spawn(move || writer::write_alerts(&output_file, alert_rx));
        let mut feedback = ChannelFeedback::new(alert_tx);
        let summary = tracking::track_fixes(producer, &session, &mut engine, &clock, &mut feedback)?;
        (summary, Some(handle))
    } else {
        let mut feedback = LogFeedback;
        let summary = tracking::track_fixes(producer, &session, &mut engine, &clock, &mut feedback)?;
        (summary, None)
    };

    if let Some(handle) = writer_handle {
        match handle.join() {
            Ok(written) => info!("Alert log holds {} alerts", written?),
            Err(_) => warn!("Alert writer thread panicked"),
        }
    }

    println!(
        "{} fixes ingested, {} rejected",
        summary.fixes_ingested, summary.fixes_rejected
    );
    for event in &summary.alerts {
        println!("  {}", event);
    }

    let report = session.signal_report();
    println!(
        "Signal {:?} ({:?}), {:.0}% good{}",
        report.quality,
        report.trend,
        report.percent_good * 100.,
        if report.indoor { ", indoors" } else { "" }
    );

    let now_ms = session.last_updated_at();
    for entry in roster::snapshot([&session], now_ms) {
        let distance = entry
            .distance_m
            .map_or_else(|| "--".to_string(), |d| format!("{:.1} m", d));
        println!("{} {} [{}]", entry.display_name, distance, entry.freshness);
    }
    Ok(())
}

fn simulate(start: f64, step: f64) -> Result<(), BeelineError> {
    let config = load_config();
    let mut engine = config.alert_engine(config.tier_table()?);
    let approach = SimulatedApproach::new(start, step);
    let distances = approach.clone().map(|d| format!("{:.0}", d)).join(" -> ");
    println!("Walking {} m", distances);

    for event in approach.run(&mut engine) {
        println!("  {}", event);
    }
    Ok(())
}

fn route(
    from: Coord,
    to: Coord,
    api_key: Option<String>,
    watch: bool,
) -> Result<(), BeelineError> {
    let config = load_config();
    let api_key = api_key.or(config.directions_api_key.clone());
    let provider = HttpDirectionsProvider::new(&config.directions_endpoint, api_key)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BeelineError::RouteFetchFailed {
            reason: format!("could not start runtime: {}", e),
        })?;

    runtime.block_on(async move {
        let session = RouteSession::new(provider, Arc::new(SystemClock), config.route_settings());
        session.start(from, to).await?;
        print_route(&session);
        println!("{}", walking_directions_link(Some(from), to));

        if watch {
            let interrupted = Arc::new(Notify::new());
            let notifier = interrupted.clone();
            if let Err(e) = ctrlc::set_handler(move || notifier.notify_one()) {
                warn!("Could not set Ctrl-C handler: {}", e);
            }
            interrupted.notified().await;
            println!("Exiting...");
        }
        session.teardown();
        Ok::<(), BeelineError>(())
    })
}

fn print_route(session: &RouteSession<HttpDirectionsProvider>) {
    let Some(plan) = session.plan() else {
        return;
    };
    for (i, step) in plan.steps().iter().enumerate() {
        println!(
            "{:>2}. {} ({:.0} m)",
            i + 1,
            step.instruction,
            step.distance_m
        );
    }
    if let Some(eta) = session
        .eta_millis()
        .and_then(DateTime::from_timestamp_millis)
    {
        println!(
            "{:.0} m total, arriving around {}",
            plan.total_distance_m,
            eta.with_timezone(&Local).format("%H:%M")
        );
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let result = match cli.command {
        Commands::Replay {
            input,
            output,
            peer,
        } => {
            install_exit_handler();
            replay(&input, output, &peer)
        }
        Commands::Simulate { start, step } => simulate(start, step),
        Commands::Route {
            from,
            to,
            api_key,
            watch,
        } => route(from, to, api_key, watch),
        Commands::Link { to, from } => {
            println!("{}", walking_directions_link(from, to));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

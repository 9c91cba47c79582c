//! Command-line interface for cta-events
//!
//! # Usage Examples
//!
//! ## Arrivals
//! ```bash
//! # Ten arrivals of train BL012 at Clark/Lake heading in direction b
//! cta-events arrivals \
//!   --station-id 40380 --name "Clark/Lake" --line blue \
//!   --train-id BL012 --direction b --count 10 --interval-ms 500
//! ```
//!
//! ## Consumers
//! ```bash
//! # Log arrivals for every station
//! cta-events consume --brokers localhost:9092 --offset-reset earliest
//!
//! # Maintain the stations table, skipping changelog replay
//! cta-events stations-stream --skip-recovery
//! ```
//!
//! ## Streaming SQL
//! ```bash
//! cta-events ksql --ksql-url http://localhost:8088
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cta_events::{ArrivalLogger, StationArrivals, Train};
use cta_events_kafka::{
    BrokerArgs, ConsumerArgs, ConsumerOptions, EventConsumer, ProducerArgs, ProducerOptions,
    Transport,
};
use cta_ksql::{turnstile_summary, KsqlArgs, QueryRegistrar, Registration, TURNSTILE_SUMMARY_TABLE};
use cta_types::topics::ARRIVALS_PATTERN;
use cta_types::{Direction, Line, TrainStatus};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "cta-events")]
#[command(about = "Produce, stream and summarise CTA station events on Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit train arrival events for one station
    Arrivals(ArrivalsArgs),

    /// Log arrival events from every station's arrivals topic
    Consume(ConsumeArgs),

    /// Keep the stations table up to date from raw station rows
    StationsStream(cta_stations_stream::Config),

    /// Register the turnstile summary with the streaming-SQL server
    Ksql(KsqlArgs),
}

#[derive(Args)]
struct ArrivalsArgs {
    #[command(flatten)]
    broker: BrokerArgs,

    #[command(flatten)]
    producer: ProducerArgs,

    /// Station ID
    #[arg(long)]
    station_id: i64,

    /// Station name; the arrivals topic is derived from it
    #[arg(long)]
    name: String,

    /// Line the station is served by (red, blue or green)
    #[arg(long)]
    line: Line,

    /// Train ID
    #[arg(long, default_value = "RL001")]
    train_id: String,

    /// Train status (in_service, out_of_service or broken_down)
    #[arg(long, default_value = "in_service")]
    status: TrainStatus,

    /// Direction the train is heading (a or b)
    #[arg(long, default_value = "a")]
    direction: Direction,

    /// Station the train arrived from
    #[arg(long)]
    prev_station_id: Option<i64>,

    /// Direction the train was heading at the previous station
    #[arg(long)]
    prev_direction: Option<Direction>,

    /// Number of arrivals to emit
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Pause between arrivals in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

#[derive(Args)]
struct ConsumeArgs {
    #[command(flatten)]
    broker: BrokerArgs,

    #[command(flatten)]
    consumer: ConsumerArgs,

    /// Topic or regex pattern to subscribe to
    #[arg(long, default_value = ARRIVALS_PATTERN)]
    pattern: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Arrivals(args) => run_arrivals(args).await,
        Commands::Consume(args) => run_consume(args).await,
        Commands::StationsStream(config) => cta_stations_stream::run_stations_stream(config).await,
        Commands::Ksql(args) => run_ksql(args).await,
    }
}

async fn run_arrivals(args: ArrivalsArgs) -> anyhow::Result<()> {
    let transport = Transport::from_args(&args.broker)
        .context("Failed to create Kafka producer")?;
    let mut station = StationArrivals::new(
        &transport,
        args.station_id,
        &args.name,
        args.line,
        &ProducerOptions::from(&args.producer),
    )
    .await?;
    info!("Producing arrivals to {}", station.topic());

    let train = Train::new(args.train_id, args.status);
    for i in 0..args.count {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
        match args.direction {
            Direction::A => station.arrive_a(&train, args.prev_station_id, args.prev_direction)?,
            Direction::B => station.arrive_b(&train, args.prev_station_id, args.prev_direction)?,
        }
    }

    station.close()?;
    info!("{station}");
    Ok(())
}

async fn run_consume(args: ConsumeArgs) -> anyhow::Result<()> {
    let handler = ArrivalLogger::new().context("Failed to load arrival schemas")?;
    let mut consumer = EventConsumer::kafka(
        &args.broker.bootstrap_servers(),
        &args.pattern,
        handler,
        ConsumerOptions::from(&args.consumer),
    )
    .context("Failed to create arrivals consumer")?;

    tokio::select! {
        _ = consumer.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    consumer.close();
    info!("Logged {} arrival(s)", consumer.handler().seen());
    Ok(())
}

async fn run_ksql(args: KsqlArgs) -> anyhow::Result<()> {
    let registrar = QueryRegistrar::from_args(&args)?;
    info!("Registering {TURNSTILE_SUMMARY_TABLE} at {}", registrar.endpoint());

    match registrar
        .register_if_absent(TURNSTILE_SUMMARY_TABLE, &turnstile_summary())
        .await
        .context("Failed to register the turnstile summary")?
    {
        Registration::AlreadyPresent => info!("{TURNSTILE_SUMMARY_TABLE} already registered"),
        Registration::Submitted => info!("{TURNSTILE_SUMMARY_TABLE} registered"),
    }
    Ok(())
}

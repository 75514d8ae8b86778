//! `silo-state` – runs the silo pipeline over a recorded or live stream.
//!
//! 1. Loads the TOML config (plus `SILO_*` overrides and CLI flags).
//! 2. Spawns the estimator and matcher nodes on a fresh event bus.
//! 3. Replays NDJSON input records (`detections` / `odometry`) from a file or
//!    stdin through the bridge.
//! 4. Prints every global silo state (and with `--emit-local` every local one)
//!    as NDJSON on stdout, one line per processed frame. Logs go to stderr.
//!
//! Input and output both travel through bounded queues, so a fast file is
//! read no faster than the pipeline and stdout can take it.
//! 5. With `--ws`, also fans states out to WebSocket clients and keeps running
//!    after the input ends until Ctrl-C.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use silo_middleware::{DEFAULT_QUEUE_CAPACITY, EventBus, QueueReceiver, SiloBridge, event_queue};
use silo_runtime::Pipeline;
use silo_types::{EventPayload, SiloArray, SiloError, TeamColor};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// How long the nodes get to drain after the input ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "silo-state", version, about = "Silo state estimation and global matching")]
struct Args {
    /// TOML config file with [estimator] and [matcher] tables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NDJSON input records; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Serve silo states to WebSocket clients on this address.
    #[arg(long)]
    ws: Option<SocketAddr>,

    /// Override the team color from the config.
    #[arg(long)]
    team_color: Option<TeamColor>,

    /// Also print image-indexed silo states.
    #[arg(long)]
    emit_local: bool,
}

/// One output line.
#[derive(Serialize)]
struct OutputRecord<'a> {
    topic: &'static str,
    msg: &'a SiloArray,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _telemetry = match silo_runtime::init_tracing("silo-state") {
        Ok(guard) => {
            info!(otlp = guard.exporting(), "tracing initialised");
            Some(guard)
        }
        Err(e) => {
            eprintln!("[silo-state] {e}");
            None
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "silo-state failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), SiloError> {
    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(team) = args.team_color {
        cfg.estimator.team_color = team;
    }
    info!(
        team = %cfg.estimator.team_color,
        silos = cfg.matcher.silos_x.len(),
        "configuration loaded"
    );

    let bus = Arc::new(EventBus::default());
    let (inputs, input_rx) = event_queue(DEFAULT_QUEUE_CAPACITY);
    let (sink, sink_rx) = event_queue(DEFAULT_QUEUE_CAPACITY);

    let printer = tokio::spawn(print_states(sink_rx, args.emit_local));
    let mut pipeline = Pipeline::spawn(&bus, input_rx, Some(sink), cfg.estimator, &cfg.matcher)?;
    let bridge = SiloBridge::new(Arc::clone(&bus), inputs);
    drop(bus);

    let ws_server = args.ws.map(|addr| tokio::spawn(bridge.clone().run_ws_server(addr)));

    let input_done = async {
        match &args.input {
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    SiloError::Config(format!("cannot open {}: {e}", path.display()))
                })?;
                replay(BufReader::new(file), &bridge).await
            }
            None => replay(BufReader::new(tokio::io::stdin()), &bridge).await,
        }
    };

    tokio::select! {
        result = input_done => {
            let records = result?;
            info!(records, "input finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            pipeline.abort();
            return Ok(());
        }
    }

    if let Some(server) = ws_server {
        info!("serving WebSocket clients until Ctrl-C");
        tokio::select! {
            joined = server => match joined {
                Ok(Err(e)) => return Err(e),
                Ok(Ok(())) => {}
                Err(e) => warn!(error = %e, "ws server task failed"),
            },
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
        }
        pipeline.abort();
        return Ok(());
    }

    // Dropping the last input sender closes the queue; the pipeline drains,
    // releases the sink and the printer finishes.
    drop(bridge);
    if tokio::time::timeout(DRAIN_TIMEOUT, pipeline.join()).await.is_err() {
        warn!("pipeline did not drain in time");
        pipeline.abort();
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, printer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "printer task failed"),
        Err(_) => warn!("printer did not finish in time"),
    }
    Ok(())
}

/// Feed every NDJSON line of `reader` to the bridge, waiting whenever the
/// input queue is full. Bad lines are logged and skipped. Returns the number
/// of records accepted.
async fn replay<R>(reader: R, bridge: &SiloBridge) -> Result<usize, SiloError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;
    let mut line_no = 0;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| SiloError::Serialization(format!("input read error: {e}")))?
    {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match bridge.ingest_json_line(&line).await {
            Ok(()) => published += 1,
            Err(SiloError::Channel(e)) => {
                return Err(SiloError::Channel(format!("pipeline stopped at line {line_no}: {e}")));
            }
            Err(e) => warn!(line = line_no, error = %e, "skipping input record"),
        }
    }
    Ok(published)
}

/// Print global states, and local ones with `emit_local`, until the sink
/// closes.
async fn print_states(mut sink: QueueReceiver, emit_local: bool) {
    while let Some(event) = sink.recv().await {
        let (topic, silos) = match &event.payload {
            EventPayload::StateMap(silos) => ("state_map", silos),
            EventPayload::StateImage(silos) if emit_local => ("state_image", silos),
            _ => continue,
        };
        match serde_json::to_string(&OutputRecord { topic, msg: silos }) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "cannot encode output record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_all_flags() {
        let args = Args::try_parse_from([
            "silo-state",
            "--config",
            "silo.toml",
            "--input",
            "run.ndjson",
            "--ws",
            "127.0.0.1:9090",
            "--team-color",
            "red",
            "--emit-local",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("silo.toml")));
        assert_eq!(args.input, Some(PathBuf::from("run.ndjson")));
        assert_eq!(args.ws, Some("127.0.0.1:9090".parse().unwrap()));
        assert_eq!(args.team_color, Some(TeamColor::Red));
        assert!(args.emit_local);
    }

    #[test]
    fn args_default_to_stdin_without_ws() {
        let args = Args::try_parse_from(["silo-state"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.input.is_none());
        assert!(args.ws.is_none());
        assert!(!args.emit_local);
    }

    #[test]
    fn unknown_team_color_is_rejected() {
        assert!(Args::try_parse_from(["silo-state", "--team-color", "green"]).is_err());
    }

    #[tokio::test]
    async fn replay_skips_blank_and_bad_lines() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(EventBus::default());
        let (inputs, mut queued) = event_queue(8);
        let bridge = SiloBridge::new(Arc::clone(&bus), inputs);

        let input = concat!(
            "\n",
            "{\"topic\":\"odometry\",\"msg\":{}}\n",
            "garbage\n",
            "{\"topic\":\"odometry\",\"msg\":{\"position\":{\"x\":1.0,\"y\":0.0,\"z\":0.0}}}\n",
        );
        let published = replay(BufReader::new(input.as_bytes()), &bridge).await?;
        assert_eq!(published, 2);
        drop(bridge);
        let mut poses = 0;
        while let Some(event) = queued.recv().await {
            assert!(matches!(event.payload, EventPayload::Odometry(_)));
            poses += 1;
        }
        assert_eq!(poses, 2);
        Ok(())
    }

    #[tokio::test]
    async fn replay_waits_for_the_pipeline_instead_of_dropping() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(EventBus::default());
        let (inputs, mut queued) = event_queue(2);
        let bridge = SiloBridge::new(Arc::clone(&bus), inputs);

        let input = "{\"topic\":\"odometry\",\"msg\":{}}\n".repeat(50);
        let consumer = tokio::spawn(async move {
            let mut seen = 0;
            while queued.recv().await.is_some() {
                seen += 1;
                tokio::task::yield_now().await;
            }
            seen
        });
        let published = replay(BufReader::new(input.as_bytes()), &bridge).await?;
        drop(bridge);
        assert_eq!(published, 50);
        assert_eq!(consumer.await?, 50);
        Ok(())
    }

    #[tokio::test]
    async fn replay_stops_when_the_pipeline_is_gone() {
        let bus = Arc::new(EventBus::default());
        let (inputs, queued) = event_queue(2);
        let bridge = SiloBridge::new(Arc::clone(&bus), inputs);
        drop(queued);

        let input = "{\"topic\":\"odometry\",\"msg\":{}}\n";
        let result = replay(BufReader::new(input.as_bytes()), &bridge).await;
        assert!(matches!(result, Err(SiloError::Channel(_))));
    }

    #[test]
    fn output_record_shape() {
        let silos = SiloArray::default();
        let line = serde_json::to_string(&OutputRecord {
            topic: "state_map",
            msg: &silos,
        })
        .unwrap();
        assert_eq!(line, r#"{"topic":"state_map","msg":{"silos":[]}}"#);
    }
}

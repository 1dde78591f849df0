use std::path::PathBuf;

use clap::{ArgAction, Parser};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use pixelroom::core::{
    CanvasStore, CellHandle, CellSnapshot, Clock, ParticipantId, Point, Rgba, Stamp,
};
use pixelroom::sync::{BusEndpoint, LocalBus, Session};
use pixelroom::{config, telemetry};

const PALETTE: [Rgba; 5] = [Rgba::RED, Rgba::GREEN, Rgba::BLUE, Rgba::BLACK, Rgba::WHITE];

/// Drive a room of simulated painters over the in-process bus.
#[derive(Parser, Debug)]
#[command(name = "pixelroom-sim", version, about)]
struct Args {
    /// Painters in the room.
    #[arg(short = 'n', long, default_value_t = 3)]
    participants: usize,

    /// Requests issued across all painters.
    #[arg(short = 's', long, default_value_t = 200)]
    strokes: usize,

    /// Workload seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// User config file (defaults to the platform config dir).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory searched for `pixelroom.toml`.
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Write the effective config to the user config path and exit.
    #[arg(long)]
    write_config: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Report {
    seed: u64,
    participants: usize,
    strokes: usize,
    converged: bool,
    peers: Vec<PeerReport>,
    canvas: Vec<CellSnapshot>,
}

#[derive(Serialize)]
struct PeerReport {
    id: ParticipantId,
    cells: usize,
    sent: u64,
    applied: u64,
    stale: u64,
    erased: u64,
    cleared: u64,
    evicted: u64,
    duplicates: u64,
    rejected: u64,
    skipped: u64,
}

struct Painter {
    session: Session<BusEndpoint>,
    store: CanvasStore,
}

fn main() {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let project_dir = args
        .project_dir
        .clone()
        .or_else(|| std::env::current_dir().ok());
    let cfg = config::load_or_default(&config_path, project_dir.as_deref());

    let _telemetry_guard = telemetry::init(telemetry::TelemetryConfig::new(
        args.verbose,
        cfg.logging.clone(),
    ));

    if args.write_config {
        if let Err(e) = config::write_config(&config_path, &cfg) {
            tracing::error!("error: {e}");
            std::process::exit(1);
        }
        println!("{}", config_path.display());
        return;
    }

    match simulate(&args, &cfg) {
        Ok(report) => print_report(&report, args.json),
        Err(e) => {
            tracing::error!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn simulate(args: &Args, cfg: &config::Config) -> pixelroom::Result<Report> {
    let bus = LocalBus::new(cfg.bus_limits()?);
    let mut painters = Vec::with_capacity(args.participants);
    for _ in 0..args.participants {
        let id = ParticipantId::random();
        let endpoint = bus.join(id)?;
        let session = Session::new(id, cfg.session_settings(), endpoint, Clock::system());
        painters.push(Painter {
            session,
            store: cfg.canvas_store()?,
        });
    }
    for painter in &mut painters {
        painter.session.announce()?;
    }
    pump(&mut painters);

    let mut rng = StdRng::seed_from_u64(args.seed);
    for step in 0..args.strokes {
        if painters.is_empty() {
            break;
        }
        let who = rng.random_range(0..painters.len());
        let Painter { session, store } = &mut painters[who];
        let point = Point::new(rng.random_range(-16.0..16.0), rng.random_range(-16.0..16.0));
        let roll = rng.random_range(0..100u32);
        match roll {
            0 => {
                session.request_clear()?;
            }
            1..=9 => {
                session.request_erase(store, point)?;
            }
            10..=14 => {
                let color = PALETTE[rng.random_range(0..PALETTE.len())];
                session.set_color(color)?;
            }
            15..=17 => {
                session.set_size(rng.random_range(0.5..3.0))?;
            }
            _ => {
                session.end_stroke();
                session.request_place(store, point)?;
            }
        }
        if step % 8 == 7 {
            pump(&mut painters);
        }
    }
    pump(&mut painters);

    let converged = painters
        .windows(2)
        .all(|pair| canvas(&pair[0].store) == canvas(&pair[1].store));
    if !converged {
        tracing::warn!("replicas differ after the run; eviction is local to each replica");
    }

    let peers = painters
        .iter()
        .map(|painter| {
            let stats = painter.session.stats();
            PeerReport {
                id: painter.session.id(),
                cells: painter.store.len(),
                sent: stats.sent,
                applied: stats.applied,
                stale: stats.stale,
                erased: stats.erased,
                cleared: stats.cleared,
                evicted: stats.evicted,
                duplicates: stats.duplicates,
                rejected: stats.rejected,
                skipped: stats.skipped,
            }
        })
        .collect();
    let snapshot = painters
        .first()
        .map(|painter| painter.store.snapshot())
        .unwrap_or_default();

    for painter in &mut painters {
        painter.session.leave()?;
    }
    pump(&mut painters);

    Ok(Report {
        seed: args.seed,
        participants: args.participants,
        strokes: args.strokes,
        converged,
        peers,
        canvas: snapshot,
    })
}

/// Deliver queued frames until every endpoint is empty.
fn pump(painters: &mut [Painter]) {
    loop {
        let mut moved = 0usize;
        for painter in painters.iter_mut() {
            for delivery in painter.session.transport().drain() {
                moved += 1;
                if let Err(e) = painter
                    .session
                    .deliver(&mut painter.store, delivery.origin, &delivery.frame)
                {
                    tracing::debug!("delivery from {} failed: {e}", delivery.origin);
                }
            }
        }
        if moved == 0 {
            return;
        }
    }
}

fn canvas(store: &CanvasStore) -> Vec<(CellHandle, Rgba, Stamp)> {
    let mut cells: Vec<_> = store
        .snapshot()
        .into_iter()
        .map(|cell| (cell.handle, cell.color, cell.stamp))
        .collect();
    cells.sort_by_key(|(handle, _, _)| *handle);
    cells
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{out}"),
            Err(e) => tracing::error!("render report: {e}"),
        }
        return;
    }

    println!(
        "seed {} | {} painters | {} strokes | converged: {}",
        report.seed, report.participants, report.strokes, report.converged
    );
    for peer in &report.peers {
        println!(
            "  {}  cells={} sent={} applied={} stale={} erased={} evicted={} dup={} rejected={} skipped={}",
            peer.id,
            peer.cells,
            peer.sent,
            peer.applied,
            peer.stale,
            peer.erased,
            peer.evicted,
            peer.duplicates,
            peer.rejected,
            peer.skipped
        );
    }
}

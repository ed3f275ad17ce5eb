//! main.rs — Dash telemetry simulator entry point
//!
//! Drives one simulated car at `rate_hz` and sends a Dash datagram per tick
//! to the relay's UDP port, so the whole pipeline can be exercised without
//! the game running. Optionally injects a truncated datagram every N ticks
//! to check the relay drops them.

mod car_sim;
mod udp_tx;

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use telemetry_types::DASH_SCHEMA;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

use car_sim::{CarSim, SimConfig, DEFAULT_PROFILE};
use udp_tx::UdpTransmitter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "telemetry-sim", about = "Synthetic Dash telemetry sender")]
struct Args {
    /// Car/track profile (TOML). Uses the built-in profile when omitted.
    #[arg(short, long)]
    config: Option<String>,
    /// Relay UDP address
    #[arg(long, default_value = "127.0.0.1:5555")]
    relay_addr: String,
    /// Packets per second (overrides the profile)
    #[arg(long)]
    rate_hz: Option<f64>,
    /// Send a truncated datagram every N ticks
    #[arg(long)]
    malformed_every: Option<u64>,
    /// Stop after this many seconds
    #[arg(long)]
    duration_s: Option<f64>,
    /// RNG seed for sensor noise
    #[arg(long)]
    seed: Option<u64>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let raw = match &args.config {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading profile {path}"))?,
        None => DEFAULT_PROFILE.to_string(),
    };
    let cfg = SimConfig::from_toml(&raw).context("invalid car profile")?;

    let rate_hz = args.rate_hz.unwrap_or(cfg.simulation.rate_hz);
    ensure!(rate_hz.is_finite() && rate_hz > 0.0, "rate must be positive, got {rate_hz}");
    if let Some(d) = args.duration_s {
        ensure!(d.is_finite() && d >= 0.0, "duration must be non-negative, got {d}");
    }

    let tx = UdpTransmitter::new(&args.relay_addr, &DASH_SCHEMA).context("binding UDP socket")?;
    let mut sim = CarSim::new(&cfg, args.seed.unwrap_or_else(rand::random));

    info!(
        "🏎  Simulator starting: {:.0} Hz → {} ({:.0} m lap, {} corners)",
        rate_hz,
        tx.target(),
        cfg.track.lap_length_m,
        cfg.track.corners
    );

    run(&mut sim, &tx, rate_hz, args.malformed_every, args.duration_s).await;
    Ok(())
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

async fn run(sim: &mut CarSim, tx: &UdpTransmitter, rate_hz: f64, malformed_every: Option<u64>, duration_s: Option<f64>) {
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let dt = period.as_secs_f64();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = duration_s.map(|s| Instant::now() + Duration::from_secs_f64(s));
    let report_every = (rate_hz * 5.0).round().max(1.0) as u64;

    let stop = tokio::signal::ctrl_c();
    tokio::pin!(stop);

    let (mut ticks, mut sent, mut malformed) = (0u64, 0u64, 0u64);
    loop {
        tokio::select! {
            _ = &mut stop => {
                info!("Ctrl-C received");
                break;
            }
            _ = ticker.tick() => {}
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        sim.tick(dt);
        ticks += 1;

        if malformed_every.is_some_and(|n| n > 0 && ticks % n == 0) && tx.send_malformed() {
            malformed += 1;
        }
        if tx.send_values(&sim.values()) {
            sent += 1;
        }

        if ticks % report_every == 0 {
            info!(
                "⏱ lap {} | {:.0} km/h | gear {} | {:.0} rpm | sent={sent}",
                sim.lap_number,
                sim.speed_mps * 3.6,
                sim.gear,
                sim.rpm
            );
        }
    }

    info!("Simulator stopped: {sent} packets, {malformed} malformed, {ticks} ticks");
}

//! Strider quadruped control-core CLI.
//!
//! Provides three modes of operation:
//! - `run`: headless scripted scenario (passive, stand, trot) against the
//!   built-in surrogate plant, printing per-phase statistics
//! - `check-config`: load and validate a TOML configuration file
//! - `info`: print the compiled-in defaults

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use tracing::info;

use strider_control::balance::SolveStatus;
use strider_core::prelude::*;
use strider_estimator::EstimatorStatus;
use strider_fsm::{ControlContext, Mode};

mod plant;

use plant::SurrogatePlant;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Strider quadruped motion-control core.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted stand-then-trot scenario headlessly.
    Run {
        /// Total scenario duration in seconds.
        #[arg(short, long, default_value_t = 6.0)]
        seconds: f64,

        /// Forward velocity command during the trot phase, m/s.
        #[arg(short, long, default_value_t = 0.3)]
        velocity: f64,

        /// Optional TOML configuration file (defaults otherwise).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pace the loop against the wall clock instead of running flat out.
        #[arg(long)]
        realtime: bool,
    },

    /// Validate a configuration file.
    CheckConfig {
        /// Path to the TOML file.
        path: PathBuf,
    },

    /// Print the compiled-in default configuration.
    Info,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Run {
            seconds,
            velocity,
            config,
            realtime,
        }) => run_scenario(seconds, velocity, config, realtime),
        Some(Commands::CheckConfig { path }) => check_config(&path),
        Some(Commands::Info) | None => {
            print_info();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn check_config(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = StriderConfig::from_file(path)?;
    println!(
        "ok: {} Hz control, trot period {} s, friction {}",
        1.0 / config.control.dt,
        config.gait.trot.period,
        config.balance.friction_coeff
    );
    Ok(())
}

fn print_info() {
    let config = StriderConfig::default();
    println!("strider control core");
    println!("  control rate : {} Hz", 1.0 / config.control.dt);
    println!("  stand height : {} m", config.robot.stand_height);
    println!("  mass         : {} kg", config.robot.mass);
    println!(
        "  trot         : period {} s, duty {}",
        config.gait.trot.period, config.gait.trot.duty_ratio
    );
    println!(
        "  force bounds : [{}, {}] N, mu {}",
        config.balance.min_normal_force,
        config.balance.max_normal_force,
        config.balance.friction_coeff
    );
}

// ---------------------------------------------------------------------------
// Scenario runner
// ---------------------------------------------------------------------------

/// Aggregate statistics of one scenario run.
#[derive(Debug, Default)]
struct ScenarioStats {
    ticks: u64,
    degraded_solves: u64,
    covariance_resets: u64,
    forced_passive: bool,
    final_position: Vector3<f64>,
    final_estimate: Vector3<f64>,
}

/// Scripted scenario: half a second passive, stand up, then trot forward
/// until the time budget runs out.
fn run_scenario(
    seconds: f64,
    velocity: f64,
    config_path: Option<PathBuf>,
    realtime: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => StriderConfig::from_file(path)?,
        None => StriderConfig::default(),
    };
    let mut context = ControlContext::new(config.clone())?;
    let mut plant = SurrogatePlant::new(&config);

    let stats = if realtime {
        drive_realtime(&mut context, &mut plant, seconds, velocity)
    } else {
        drive(&mut context, &mut plant, seconds, velocity)
    };

    println!("scenario finished after {} ticks", stats.ticks);
    println!(
        "  body position (truth)    : [{:.3}, {:.3}, {:.3}]",
        stats.final_position.x, stats.final_position.y, stats.final_position.z
    );
    println!(
        "  body position (estimate) : [{:.3}, {:.3}, {:.3}]",
        stats.final_estimate.x, stats.final_estimate.y, stats.final_estimate.z
    );
    println!("  degraded solves          : {}", stats.degraded_solves);
    println!("  covariance resets        : {}", stats.covariance_resets);
    if stats.forced_passive {
        println!("  NOTE: safety forced passive during the run");
    }
    Ok(())
}

/// Phase scripting and statistics for one scenario run.
struct ScenarioScript {
    velocity: f64,
    total_ticks: u64,
    passive_ticks: u64,
    requested_stand: bool,
    requested_trot: bool,
    stats: ScenarioStats,
}

impl ScenarioScript {
    fn new(seconds: f64, velocity: f64, dt: f64) -> Self {
        Self {
            velocity,
            total_ticks: (seconds / dt) as u64,
            passive_ticks: (0.5 / dt) as u64,
            requested_stand: false,
            requested_trot: false,
            stats: ScenarioStats::default(),
        }
    }

    fn finished(&self) -> bool {
        self.stats.ticks >= self.total_ticks
    }

    /// One control tick: script the command, tick the controller, step the
    /// plant, accumulate statistics.
    fn step(&mut self, context: &mut ControlContext, plant: &mut SurrogatePlant) {
        let dt = context.config().control.dt;
        let mut command = UserCommand::default();

        if self.stats.ticks >= self.passive_ticks && !self.requested_stand {
            command.mode_request = Some(ModeRequest::FixedStand);
            self.requested_stand = true;
            info!(tick = self.stats.ticks, "requesting fixed stand");
        }
        if self.requested_stand && !self.requested_trot && context.stand_settled() {
            command.mode_request = Some(ModeRequest::Trotting);
            self.requested_trot = true;
            info!(tick = self.stats.ticks, "requesting trot at {} m/s", self.velocity);
        }
        if self.requested_trot {
            command.velocity = Vector3::new(self.velocity, 0.0, 0.0);
        }

        let sample = plant.sample();
        let output = context.tick(&command, &sample);
        plant.apply(&output.commands, dt);

        self.stats.ticks += 1;
        if output.status.solve == Some(SolveStatus::Degraded) {
            self.stats.degraded_solves += 1;
        }
        if output.status.estimator == EstimatorStatus::CovarianceReset {
            self.stats.covariance_resets += 1;
        }
        if output.status.safety.is_some() && output.mode == Mode::Passive && self.requested_trot {
            self.stats.forced_passive = true;
        }
        self.stats.final_estimate = output.body.position;
    }

    fn finish(mut self, plant: &SurrogatePlant) -> ScenarioStats {
        self.stats.final_position = plant.position();
        self.stats
    }
}

/// Drive the controller against the plant as fast as the host allows.
fn drive(
    context: &mut ControlContext,
    plant: &mut SurrogatePlant,
    seconds: f64,
    velocity: f64,
) -> ScenarioStats {
    let mut script = ScenarioScript::new(seconds, velocity, context.config().control.dt);
    while !script.finished() {
        script.step(context, plant);
    }
    script.finish(plant)
}

/// Drive the scenario paced against the wall clock: accumulate real frame
/// deltas and dispense fixed control steps.
fn drive_realtime(
    context: &mut ControlContext,
    plant: &mut SurrogatePlant,
    seconds: f64,
    velocity: f64,
) -> ScenarioStats {
    let dt = context.config().control.dt;
    let mut script = ScenarioScript::new(seconds, velocity, dt);
    let mut accumulator = Accumulator::new(dt).with_max_steps(8);
    let mut last = std::time::Instant::now();

    while !script.finished() {
        let now = std::time::Instant::now();
        accumulator.accumulate(now - last);
        last = now;
        while accumulator.should_step() && !script.finished() {
            script.step(context, plant);
        }
        std::thread::sleep(std::time::Duration::from_micros(200));
    }
    script.finish(plant)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

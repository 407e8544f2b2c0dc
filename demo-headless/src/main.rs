use clap::{Parser, ValueEnum};
use fluid_sim_core::{
    BorderType, CourantReport, CourantStatus, FieldKind, FluidSimulation, FrameInfo,
    SimulationConfig, SimulationObserver, SolverKind,
};
use parking_lot::Mutex;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless wind-tunnel run with periodic statistics
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-headless")]
#[command(about = "2D stable-fluids wind tunnel, no rendering", long_about = None)]
struct Args {
    /// YAML file with a full or partial simulation configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid width in cells (overrides the config file)
    #[arg(long)]
    width: Option<usize>,

    /// Grid height in cells (overrides the config file)
    #[arg(long)]
    height: Option<usize>,

    /// Time step in seconds (overrides the config file)
    #[arg(long)]
    dt: Option<f64>,

    /// Inflow speed in m/s (overrides the config file)
    #[arg(long)]
    inflow_speed: Option<f64>,

    /// Kernel backend
    #[arg(long, value_enum)]
    solver: Option<Backend>,

    /// Border layout
    #[arg(long, value_enum)]
    border: Option<Border>,

    /// Worker threads for the parallel backend (0 = rayon global pool)
    #[arg(long)]
    threads: Option<usize>,

    /// Stop after this many steps
    #[arg(short, long, default_value_t = 500)]
    steps: u64,

    /// Wall-clock limit in seconds
    #[arg(long, default_value_t = 60.0)]
    max_seconds: f64,

    /// Statistics interval in seconds
    #[arg(short, long, default_value_t = 1.0)]
    report_interval: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Border {
    WindTunnel,
    Box,
    Open,
}

impl Args {
    fn build_config(&self) -> Result<SimulationConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                let config: SimulationConfig = serde_yaml::from_str(&contents)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => SimulationConfig::default(),
        };
        if let Some(width) = self.width {
            config.grid_width = width;
        }
        if let Some(height) = self.height {
            config.grid_height = height;
        }
        if let Some(dt) = self.dt {
            config.time_step = dt;
        }
        if let Some(speed) = self.inflow_speed {
            config.initial_inflow_speed = speed;
        }
        if let Some(threads) = self.threads {
            config.parallel.threads = threads;
        }
        if let Some(backend) = self.solver {
            config.solver = match backend {
                Backend::Sequential => SolverKind::Sequential,
                Backend::Parallel => SolverKind::Parallel,
            };
        }
        if let Some(border) = self.border {
            config.border_type = match border {
                Border::WindTunnel => BorderType::WindTunnel,
                Border::Box => BorderType::Box,
                Border::Open => BorderType::Open,
            };
        }
        config.validate()?;
        Ok(config)
    }
}

/// Collects what the periodic report prints
#[derive(Default)]
struct Stats {
    frames: AtomicU64,
    evicted: AtomicUsize,
    pressure_sweeps: AtomicUsize,
    last_stability: Mutex<Option<CourantReport>>,
}

impl SimulationObserver for Stats {
    fn on_frame_ready(&self, frame: &FrameInfo) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.evicted.fetch_add(frame.evicted_frames, Ordering::Relaxed);
        self.pressure_sweeps
            .fetch_add(frame.pressure.sweeps, Ordering::Relaxed);
    }

    fn on_stability_changed(&self, report: &CourantReport) {
        *self.last_stability.lock() = Some(*report);
    }
}

/// Drains the render queue the way a renderer would
fn spawn_consumer(
    sim: Arc<FluidSimulation>,
    done: Arc<AtomicBool>,
    consumed: Arc<AtomicU64>,
    peak_speed: Arc<Mutex<f64>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !done.load(Ordering::Acquire) {
            let Some(frame) = sim.poll_render_queue() else {
                thread::sleep(Duration::from_millis(2));
                continue;
            };
            let (_, max) = frame.range(FieldKind::VelocityMagnitude).bounds();
            {
                let mut peak = peak_speed.lock();
                *peak = peak.max(max);
            }
            consumed.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = sim.recycle(frame) {
                warn!("Could not recycle frame: {}", e);
            }
        }
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.build_config()?;

    println!("=== Fluid Simulation Demo ===\n");
    println!(
        "Grid: {}x{} cells over {:.1}x{:.1} m, dt {:.4} s, border {:?}",
        config.grid_width,
        config.grid_height,
        config.physical_width,
        config.physical_height,
        config.time_step,
        config.border_type
    );

    let sim = Arc::new(FluidSimulation::new(config)?);
    println!("Solver backend: {}\n", sim.solver_name());

    let stats = Arc::new(Stats::default());
    sim.add_observer(stats.clone());

    let done = Arc::new(AtomicBool::new(false));
    let consumed = Arc::new(AtomicU64::new(0));
    let peak_speed = Arc::new(Mutex::new(0.0_f64));
    let consumer = spawn_consumer(
        Arc::clone(&sim),
        Arc::clone(&done),
        Arc::clone(&consumed),
        Arc::clone(&peak_speed),
    );

    sim.start()?;
    let started = Instant::now();
    let mut next_report = args.report_interval;

    println!("Wall(s) | Steps | Sim time(s) | Step(ms) | Courant | Queue | Pressure sweeps");
    println!("--------|-------|-------------|----------|---------|-------|----------------");
    while sim.iteration() < args.steps && sim.is_running() {
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed >= args.max_seconds {
            warn!("Wall-clock limit reached after {} steps", sim.iteration());
            break;
        }
        if elapsed >= next_report {
            next_report += args.report_interval;
            let frames = stats.frames.load(Ordering::Relaxed).max(1);
            let (_, avg_ms) = sim.step_timing();
            let courant = sim
                .courant_number()
                .map_or_else(|| "-".to_string(), |c| format!("{c:.3}"));
            println!(
                "{:7.1} | {:5} | {:11.4} | {:8.2} | {:>7} | {:5} | {:15.1}",
                elapsed,
                sim.iteration(),
                sim.simulated_time(),
                avg_ms,
                courant,
                sim.render_queue().len(),
                stats.pressure_sweeps.load(Ordering::Relaxed) as f64 / frames as f64
            );
        }
        thread::sleep(Duration::from_millis(5));
    }

    sim.stop();
    done.store(true, Ordering::Release);
    if consumer.join().is_err() {
        warn!("Consumer thread panicked");
    }

    println!("\n=== Simulation Complete ===");
    println!("Steps: {}", sim.iteration());
    println!("Simulated time: {:.4} s", sim.simulated_time());
    println!("Frames consumed: {}", consumed.load(Ordering::Relaxed));
    println!("Frames evicted: {}", stats.evicted.load(Ordering::Relaxed));
    println!("Peak |v|: {:.3} m/s", *peak_speed.lock());
    let (min_p, max_p) = sim.field_range(FieldKind::Pressure).bounds();
    println!("Pressure range: [{:.4}, {:.4}]", min_p, max_p);
    match *stats.last_stability.lock() {
        Some(report) if report.status != CourantStatus::Ok => println!(
            "Stability: {:?} (C = {:?}, suggested dt {:?})",
            report.status, report.number, report.suggested_time_step
        ),
        Some(report) => println!("Stability: {:?}", report.status),
        None => println!("Stability: not checked"),
    }
    Ok(())
}

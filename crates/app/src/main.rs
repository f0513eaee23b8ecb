use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vkeys_core::{
    accuracy, AppConfig, Beat, BeatListener, ClickSynth, ClickTrack, DispatchStats, EventLoop,
    HitReport, ManualClock, Metronome, RecordedEvent, Recorder, RunSummary, SystemClock, Tempo,
    TimeSignature, Visualizer,
};

fn main() -> vkeys_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { settings } => run_live(&settings),
        Commands::Simulate {
            settings,
            hits,
            sample_rate,
        } => run_simulation(&settings, &hits, sample_rate),
        Commands::Score {
            bpm,
            anchor,
            config,
            hits,
        } => run_score(bpm, anchor, config.as_deref(), &hits),
    }
}

fn run_live(settings: &Settings) -> vkeys_core::Result<()> {
    let config = settings.resolve()?;
    tracing::info!(
        bpm = config.metronome.bpm.bpm(),
        beats = config.metronome.time_signature.beats(),
        seconds = settings.seconds,
        "starting live metronome"
    );

    let clock = SystemClock::new();
    let visualizer = Visualizer::new(config.visual.clone(), config.metronome.bpm);
    let mut metronome =
        Metronome::from_config(clock.clone(), (TickLogger, visualizer), &config.metronome);
    metronome.set_accuracy_bands(config.accuracy);

    if let Err(err) = metronome.start(config.metronome.delay_first_beat) {
        tracing::error!(%err, "metronome could not start");
        return Err(err);
    }

    let end = vkeys_core::ClockSource::current_time(&clock)? + settings.seconds;
    let summary = EventLoop::from_config(&config).run_until(&mut metronome, end, |metronome, now| {
        if let Some(frame) = metronome.listener_mut().1.render_frame(now) {
            tracing::trace!(
                frame = frame.frame,
                markers = frame.beat_markers.len(),
                "rendered frame"
            );
        }
    })?;
    metronome.stop();

    tracing::info!(
        passes = summary.passes,
        ticks = summary.ticks,
        frames = summary.frames,
        missed = metronome.dispatch_stats().missed,
        "live metronome finished"
    );
    Ok(())
}

fn run_simulation(settings: &Settings, hits: &[f64], sample_rate: u32) -> vkeys_core::Result<()> {
    let config = settings.resolve()?;
    tracing::info!(seconds = settings.seconds, hits = hits.len(), "running simulation");

    let clock = ManualClock::new();
    let listener = (
        Recorder::new(clock.clone()),
        (
            ClickTrack::new(ClickSynth::with_sample_rate(sample_rate), 0.0),
            Visualizer::new(config.visual.clone(), config.metronome.bpm),
        ),
    );
    let mut metronome = Metronome::from_config(clock.clone(), listener, &config.metronome);
    metronome.set_accuracy_bands(config.accuracy);
    metronome.start(config.metronome.delay_first_beat)?;

    let event_loop = EventLoop::from_config(&config);
    let mut hit_times: Vec<f64> = hits
        .iter()
        .copied()
        .filter(|hit| *hit >= 0.0 && *hit <= settings.seconds)
        .collect();
    hit_times.sort_by(f64::total_cmp);

    let mut summary = RunSummary::default();
    let mut reports = Vec::with_capacity(hit_times.len());
    for hit in hit_times {
        let segment = event_loop.run_until(&mut metronome, hit, render)?;
        accumulate(&mut summary, segment);

        let report = metronome.report_hit(hit);
        metronome.listener_mut().1 .1.spawn_hit_marker(&report);
        tracing::debug!(hit, score = report.score, rating = %report.rating, "scored hit");
        reports.push(report);
    }
    let segment = event_loop.run_until(&mut metronome, settings.seconds, render)?;
    accumulate(&mut summary, segment);
    metronome.stop();

    let stats = metronome.dispatch_stats();
    let (recorder, (track, _)) = metronome.into_listener();
    let report = SimulationReport {
        config,
        summary,
        stats,
        hits: reports,
        click_track: ClickSummary {
            sample_rate,
            clicks: track.clicks(),
            duration_seconds: track.duration_seconds(),
            peak: track.peak(),
        },
        events: recorder.events().to_vec(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_score(bpm: f64, anchor: f64, config: Option<&Path>, hits: &[f64]) -> vkeys_core::Result<()> {
    let bands = load_config(config)?.accuracy;
    let tempo = Tempo::new(bpm)?;

    for &hit in hits {
        let score = accuracy::score(hit, anchor, tempo.seconds_per_beat());
        println!("{hit:>10.4}  {score:.3}  {}", bands.classify(score));
    }
    Ok(())
}

type SimulationListener = (Recorder<ManualClock>, (ClickTrack, Visualizer));

fn render(metronome: &mut Metronome<ManualClock, SimulationListener>, now: f64) {
    metronome.listener_mut().1 .1.render_frame(now);
}

fn accumulate(total: &mut RunSummary, segment: RunSummary) {
    total.passes += segment.passes;
    total.ticks += segment.ticks;
    total.frames += segment.frames;
}

fn load_config(path: Option<&Path>) -> vkeys_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::from_path(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Logs every tick as it fires.
#[derive(Debug, Default, Clone, Copy)]
struct TickLogger;

impl BeatListener for TickLogger {
    fn on_beat_scheduled(&mut self, beat: &Beat) {
        tracing::debug!(beat = beat.number, target = beat.target_time, "beat scheduled");
    }

    fn on_tick(&mut self, beat: &Beat) {
        if beat.is_downbeat {
            tracing::info!(beat = beat.number, target = beat.target_time, "TICK");
        } else {
            tracing::info!(beat = beat.number, target = beat.target_time, "tick");
        }
    }
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    config: AppConfig,
    summary: RunSummary,
    stats: DispatchStats,
    hits: Vec<HitReport>,
    click_track: ClickSummary,
    events: Vec<RecordedEvent>,
}

#[derive(Debug, Serialize)]
struct ClickSummary {
    sample_rate: u32,
    clicks: usize,
    duration_seconds: f64,
    peak: f32,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Virtual Keys metronome engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the metronome in real time and log every tick.
    Run {
        #[command(flatten)]
        settings: Settings,
    },
    /// Run the metronome on a virtual clock and print a JSON report.
    Simulate {
        #[command(flatten)]
        settings: Settings,
        /// Hit times in seconds since start, comma separated.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        hits: Vec<f64>,
        /// Sample rate of the rendered click track.
        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,
    },
    /// Score hit times against a beat grid without running the scheduler.
    Score {
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// Time of a beat on the grid.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        anchor: f64,
        /// JSON configuration providing the accuracy bands.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(required = true, allow_negative_numbers = true)]
        hits: Vec<f64>,
    },
}

#[derive(Args, Debug)]
struct Settings {
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Tempo in beats per minute.
    #[arg(long, value_parser = clap::value_parser!(u32).range(40..=240))]
    bpm: Option<u32>,
    /// Beats per measure (2, 3, 4 or 6).
    #[arg(long, value_parser = parse_time_signature)]
    beats: Option<TimeSignature>,
    /// How long to run, in seconds.
    #[arg(long, default_value_t = 4.0)]
    seconds: f64,
    /// Start on the first beat immediately instead of one beat later.
    #[arg(long)]
    no_delay: bool,
    /// Disable beat and hit markers.
    #[arg(long)]
    no_visual: bool,
}

fn parse_time_signature(raw: &str) -> Result<TimeSignature, String> {
    let beats: u32 = raw.parse().map_err(|err| format!("{err}"))?;
    TimeSignature::new(beats).map_err(|err| err.to_string())
}

impl Settings {
    fn resolve(&self) -> vkeys_core::Result<AppConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(bpm) = self.bpm {
            config.metronome.bpm = Tempo::new(f64::from(bpm))?;
        }
        if let Some(beats) = self.beats {
            config.metronome.time_signature = beats;
        }
        if self.no_delay {
            config.metronome.delay_first_beat = false;
        }
        if self.no_visual {
            config.visual.enabled = false;
        }
        config.validate()?;
        Ok(config)
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use seismic_psd::aggregate::{channel_densities, ChannelDensity};
use seismic_psd::batch::{drain_blocking, BatchRunner};
use seismic_psd::config::AppConfig;
use seismic_psd::logging::init_logging;
use seismic_psd::psd::noise_models::{self, NoiseModelTable};
use seismic_psd::psd::{NoiseModels, PsdEngine};
use seismic_psd::store::{PsdStore, StoredPsd};
use seismic_psd::testing::{three_component, write_wav, SyntheticPattern, SyntheticSpec, DEFAULT_SEED};
use seismic_psd::waveform::name_parser::TIMESTAMP_FORMAT;
use seismic_psd::waveform::{AsciiReader, FileNameParser, ReaderRegistry, WaveformSegment};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "psd_cli",
    about = "Power spectral densities of seismic recordings against the Peterson noise models"
)]
struct Cli {
    /// JSON configuration file (`psd`, `batch`, `logging` sections)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Tabulated noise model JSON replacing the built-in curves
    #[arg(long, global = true)]
    noise_models: Option<PathBuf>,
    /// Project file whose naming scheme identifies input files
    #[arg(long, global = true)]
    project_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the PSD of one waveform file
    Compute {
        #[arg(long)]
        input: PathBuf,
        /// Write the result JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the configured Welch window length in seconds
        #[arg(long)]
        window_length: Option<f64>,
    },
    /// Compute and store PSDs for every supported file below a directory
    Batch {
        #[arg(long)]
        input: PathBuf,
        /// Result tree root; results go next to the inputs when omitted
        #[arg(long)]
        output_root: Option<PathBuf>,
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Print progress events to stderr as JSON lines
        #[arg(long)]
        events: bool,
        /// Write the batch report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Cut one waveform file into consecutive pieces, one file each
    Cut {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// Piece length in seconds; a shorter tail is dropped
        #[arg(long, default_value_t = 3600.0)]
        piece_s: f64,
        #[arg(long, value_enum, default_value_t = FormatArg::Ascii)]
        format: FormatArg,
    },
    /// Write deterministic three-component test recordings
    Synth {
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = PatternArg::Mixed)]
        pattern: PatternArg,
        #[arg(long, value_enum, default_value_t = FormatArg::Wav)]
        format: FormatArg,
        #[arg(long, default_value_t = 3600.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 20.0)]
        sample_rate: f64,
        #[arg(long, default_value_t = 1.0)]
        frequency: f64,
        #[arg(long, default_value_t = 1000.0)]
        amplitude: f64,
        #[arg(long, default_value_t = 100.0)]
        noise_amplitude: f64,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
        #[arg(long, default_value = "XX")]
        network: String,
        #[arg(long, default_value = "SYN")]
        station: String,
        /// RFC 3339 start time
        #[arg(long, default_value = "2024-03-01T00:00:00Z")]
        start: String,
    },
    /// Tabulate the low and high noise models
    NoiseModels {
        /// Periods in seconds; log-spaced from 0.1 s to 100000 s when omitted
        #[arg(long, value_delimiter = ',')]
        periods: Vec<f64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show how the naming scheme reads every supported file below a directory
    Names {
        #[arg(long)]
        input: PathBuf,
    },
    /// List the supported waveform formats
    Formats,
    /// Probability density and group means of stored results
    Pdf {
        /// Directory searched for `*_psd.json` files
        #[arg(long)]
        input: PathBuf,
        /// Also average raw curves in groups of this many hours
        #[arg(long)]
        group_hours: Option<u32>,
        /// Only this channel code, e.g. `Z` or `HHZ`
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PatternArg {
    Sine,
    WhiteNoise,
    Mixed,
}

impl From<PatternArg> for SyntheticPattern {
    fn from(value: PatternArg) -> Self {
        match value {
            PatternArg::Sine => SyntheticPattern::Sine,
            PatternArg::WhiteNoise => SyntheticPattern::WhiteNoise,
            PatternArg::Mixed => SyntheticPattern::Mixed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Wav,
    Ascii,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::try_load_from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(project) = cli.project_file {
        config.project_file = Some(project);
    }
    init_logging(&config.logging)?;

    if let Some(path) = cli.noise_models.as_ref().or(config.noise_model_file.as_ref()) {
        let models = NoiseModels::from_json_file(path)
            .with_context(|| format!("loading noise models from {}", path.display()))?;
        if noise_models::install(models).is_err() {
            log::warn!("Noise models already installed, keeping the existing set");
        }
    }

    match cli.command {
        Commands::Compute {
            input,
            output,
            window_length,
        } => run_compute(&config, &input, output, window_length),
        Commands::Batch {
            input,
            output_root,
            max_parallel,
            events,
            output,
        } => run_batch(config, &input, output_root, max_parallel, events, output),
        Commands::Synth {
            output_dir,
            pattern,
            format,
            duration_s,
            sample_rate,
            frequency,
            amplitude,
            noise_amplitude,
            seed,
            network,
            station,
            start,
        } => {
            let spec = SyntheticSpec {
                pattern: pattern.into(),
                frequency_hz: frequency,
                amplitude,
                noise_amplitude,
                seed,
                ..SyntheticSpec::default()
            };
            let start = DateTime::parse_from_rfc3339(&start)
                .with_context(|| format!("parsing start time '{}'", start))?
                .with_timezone(&Utc);
            run_synth(&spec, format, &output_dir, duration_s, sample_rate, start, &network, &station)
        }
        Commands::NoiseModels { periods, output } => run_noise_models(periods, output),
        Commands::Cut {
            input,
            output_dir,
            piece_s,
            format,
        } => run_cut(&config, &input, &output_dir, piece_s, format),
        Commands::Names { input } => run_names(&config, &input),
        Commands::Formats => {
            emit_json(&ReaderRegistry::with_defaults().formats(), None)?;
            Ok(ExitCode::from(0))
        }
        Commands::Pdf {
            input,
            group_hours,
            channel,
            output,
        } => run_pdf(&input, group_hours, channel.as_deref(), output),
    }
}

fn run_compute(
    config: &AppConfig,
    input: &Path,
    output: Option<PathBuf>,
    window_length: Option<f64>,
) -> Result<ExitCode> {
    let mut parameters = config.psd.clone();
    if let Some(seconds) = window_length {
        parameters.window_length_s = seconds;
    }
    let engine = PsdEngine::from_parameters(&parameters).context("invalid PSD parameters")?;
    let segment = config
        .reader_registry()?
        .read(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let result = engine
        .compute(&segment)
        .with_context(|| format!("computing PSD of {}", input.display()))?;

    let stored = StoredPsd {
        channel: segment.channel().clone(),
        start_time: segment.start_time(),
        duration_s: segment.duration_s(),
        source: Some(input.to_path_buf()),
        result,
    };
    emit_json(&stored, output)?;
    Ok(ExitCode::from(0))
}

fn run_batch(
    config: AppConfig,
    input: &Path,
    output_root: Option<PathBuf>,
    max_parallel: Option<usize>,
    events: bool,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let registry = config.reader_registry()?;
    let mut batch_config = config.batch;
    if let Some(root) = output_root {
        batch_config.output_root = Some(root);
    }
    if let Some(max_parallel) = max_parallel {
        batch_config.max_parallel = max_parallel;
    }

    let files = registry
        .scan(input)
        .with_context(|| format!("scanning {}", input.display()))?;
    if files.is_empty() {
        bail!("no supported waveform files under {}", input.display());
    }

    let engine = PsdEngine::from_parameters(&config.psd).context("invalid PSD parameters")?;
    let store = match &batch_config.output_root {
        Some(root) => PsdStore::new(root),
        None => PsdStore::beside_sources(),
    };
    let runner = BatchRunner::new(registry, engine, store, &batch_config);

    let printer = events.then(|| {
        let rx = runner.subscribe();
        std::thread::spawn(move || {
            drain_blocking(rx, |event| {
                if let Ok(line) = serde_json::to_string(event) {
                    eprintln!("{line}");
                }
            })
        })
    });

    let report = runner.run_blocking(files)?;
    if let Some(handle) = printer {
        let _ = handle.join();
    }

    emit_json(&report, output)?;
    Ok(if report.all_succeeded() {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

#[allow(clippy::too_many_arguments)]
fn run_synth(
    spec: &SyntheticSpec,
    format: FormatArg,
    output_dir: &Path,
    duration_s: f64,
    sample_rate: f64,
    start: DateTime<Utc>,
    network: &str,
    station: &str,
) -> Result<ExitCode> {
    let segments = three_component(spec, sample_rate, duration_s, start, network, station)
        .context("generating synthetic segments")?;
    fs::create_dir_all(output_dir).with_context(|| format!("creating {}", output_dir.display()))?;

    let written = segments
        .iter()
        .map(|segment| write_segment(segment, output_dir, format))
        .collect::<Result<Vec<_>>>()?;

    emit_json(&written, None)?;
    Ok(ExitCode::from(0))
}

fn run_cut(
    config: &AppConfig,
    input: &Path,
    output_dir: &Path,
    piece_s: f64,
    format: FormatArg,
) -> Result<ExitCode> {
    if !piece_s.is_finite() || piece_s <= 0.0 {
        bail!("piece length must be a positive number of seconds, got {}", piece_s);
    }
    let segment = config
        .reader_registry()?
        .read(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let pieces = segment.split(piece_s);
    if pieces.is_empty() {
        bail!(
            "{} lasts {} s, shorter than one {} s piece",
            input.display(),
            segment.duration_s(),
            piece_s
        );
    }
    fs::create_dir_all(output_dir).with_context(|| format!("creating {}", output_dir.display()))?;
    log::info!("Cutting {} into {} pieces", input.display(), pieces.len());

    let written = pieces
        .iter()
        .map(|piece| write_segment(piece, output_dir, format))
        .collect::<Result<Vec<_>>>()?;
    emit_json(&written, None)?;
    Ok(ExitCode::from(0))
}

/// Write `segment` as `STA.COMP.YYYYmmddHHMMSS.<ext>` below `output_dir`
fn write_segment(segment: &WaveformSegment, output_dir: &Path, format: FormatArg) -> Result<PathBuf> {
    let id = segment.channel();
    let code = match segment.component() {
        Some(component) => component.letter().to_string(),
        None if id.channel.is_empty() => "Z".to_string(),
        None => id.channel.clone(),
    };
    let stem = format!(
        "{}.{}.{}",
        id.station,
        code,
        segment.start_time().format(TIMESTAMP_FORMAT)
    );
    let path = match format {
        FormatArg::Wav => {
            let path = output_dir.join(format!("{stem}.wav"));
            write_wav(&path, segment)?;
            path
        }
        FormatArg::Ascii => {
            let path = output_dir.join(format!("{stem}.txt"));
            AsciiReader::write(&path, segment)?;
            path
        }
    };
    Ok(path)
}

fn run_noise_models(periods: Vec<f64>, output: Option<PathBuf>) -> Result<ExitCode> {
    let periods = if periods.is_empty() {
        // 0.1 s to 1e5 s, 10 per decade
        (0..=60).map(|k| 10f64.powf(-1.0 + k as f64 / 10.0)).collect()
    } else {
        periods
    };
    if periods.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        bail!("periods must be positive");
    }
    let models = noise_models::global();
    let payload = NoiseModelsPayload {
        source: models.source(),
        table: models.table_at(&periods),
    };
    emit_json(&payload, output)?;
    Ok(ExitCode::from(0))
}

fn run_pdf(
    input: &Path,
    group_hours: Option<u32>,
    channel: Option<&str>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let (mut results, failed) =
        PsdStore::discover(input).with_context(|| format!("searching {}", input.display()))?;
    if let Some(code) = channel {
        results.retain(|stored| stored.channel.channel == code);
    }
    let channels = channel_densities(&results, group_hours);
    if channels.is_empty() {
        bail!("no PSD results under {}", input.display());
    }

    let payload = PdfPayload {
        channels,
        unreadable: failed.into_iter().map(|(path, _)| path).collect(),
    };
    emit_json(&payload, output)?;
    Ok(ExitCode::from(0))
}

fn run_names(config: &AppConfig, input: &Path) -> Result<ExitCode> {
    let registry = config.reader_registry()?;
    let files = registry
        .scan(input)
        .with_context(|| format!("scanning {}", input.display()))?;
    let entries: Vec<NameEntry> = files
        .into_iter()
        .map(|path| match registry.naming().parse_path(&path) {
            Ok(parsed) => NameEntry {
                folder: Some(FileNameParser::folder_architecture(&parsed)),
                name_info: Some(FileNameParser::name_info_string(&parsed)),
                start_time: parsed.start_time,
                error: None,
                path,
            },
            Err(err) => NameEntry {
                path,
                folder: None,
                name_info: None,
                start_time: None,
                error: Some(err.to_string()),
            },
        })
        .collect();
    emit_json(&entries, None)?;
    Ok(ExitCode::from(0))
}

fn emit_json<T: Serialize + ?Sized>(value: &T, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

#[derive(Serialize)]
struct NoiseModelsPayload<'a> {
    source: &'a str,
    #[serde(flatten)]
    table: NoiseModelTable,
}

#[derive(Serialize)]
struct NameEntry {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct PdfPayload {
    channels: Vec<ChannelDensity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unreadable: Vec<PathBuf>,
}

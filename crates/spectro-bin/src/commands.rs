//! Subcommand implementations.

use crate::hardware::{self, GrblOrMock};
use crate::{RunArgs, SweepArgs};
use anyhow::{Context, Result};
use spectro_analysis::{
    model_from_settings, BaselineModel, Blank, MeanBlank, ProcessedSpectrum, SpectrumProcessor,
};
use spectro_core::capabilities::Confirm;
use spectro_core::config::SpectroConfig;
use spectro_core::SensorPin;
use spectro_driver_grbl::available_ports;
use spectro_experiment::{
    export_processed, AutoConfirm, BroadcastObserver, KineticsRequest, Session, StdinConfirm,
    StopHandle, SweepRequest, TracingObserver, MIRROR_FORK_PIN,
};
use spectro_storage::{read_blank, read_spectrum, CsvSink, SessionLayout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sample name of blank sweeps.
pub const BASELINE_SAMPLE: &str = "baseline";

/// Open the session directory, connect hardware, assemble and initialise a
/// session. Ctrl-C requests a stop.
async fn open_session(config: SpectroConfig, run: &RunArgs) -> Result<(Session, Arc<CsvSink>)> {
    let slit = run.slit.unwrap_or(config.motion.default_slit);
    let layout = SessionLayout::today(&config.storage.output_dir, slit);
    layout.create()?;
    info!(dir = %layout.dir().display(), "session directory");
    let sink = Arc::new(CsvSink::new(layout.dir()));

    let instrument = hardware::connect(&config, run.instant).await?;
    let confirm: Arc<dyn Confirm> = if run.yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(StdinConfirm)
    };

    let stop = StopHandle::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested, finishing current point");
            ctrl_c.request_stop();
        }
    });

    let mut builder = Session::builder(config)
        .motion(instrument.motion)
        .voltage(instrument.voltage)
        .sink(sink.clone())
        .confirm(confirm)
        .stop_handle(stop)
        .observer(Arc::new(TracingObserver));
    if let Some(sensors) = instrument.sensors {
        builder = builder.sensors(sensors);
    }
    if run.live {
        let live = BroadcastObserver::new(1024);
        let mut rx = live.subscribe();
        tokio::spawn(async move {
            while let Ok(point) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&point) {
                    println!("{}", line);
                }
            }
        });
        builder = builder.observer(Arc::new(live));
    }

    let mut session = builder.build()?;
    session.initialize().await?;
    if slit != session.config().motion.default_slit {
        session.select_slit(slit).await?;
    }
    Ok((session, sink))
}

fn sweep_request(args: &SweepArgs, sample: &str) -> SweepRequest {
    SweepRequest {
        wavelength_min: args.min,
        wavelength_max: args.max,
        wavelength_step: args.step,
        reference: args.run.reference,
        sample_name: sample.to_string(),
    }
}

/// `spectro sweep`
pub async fn sweep(
    config: SpectroConfig,
    args: &SweepArgs,
    sample: &str,
    analyze: bool,
    blank: Option<PathBuf>,
) -> Result<()> {
    let processing = config.processing.clone();
    let (mut session, sink) = open_session(config, &args.run).await?;
    let report = session.sweep(&sweep_request(args, sample)).await?;
    println!(
        "{} points written to {}{}",
        report.spectrum.len(),
        sink.path_of(&report.table).display(),
        if report.stopped { " (stopped)" } else { "" }
    );

    if analyze && !report.spectrum.is_empty() {
        let blank = blank.map(|p| read_blank(&p)).transpose()?;
        let processor = SpectrumProcessor::from_config(
            &processing,
            blank.as_ref().map(|(w, a)| Blank {
                wavelengths: w,
                absorbance: a,
            }),
        )?;
        let processed = processor.process_spectrum(&report.spectrum)?;
        export_processed(&*sink, sample, &processed).await?;
        print_summary(&processed);
    }
    Ok(())
}

/// `spectro baseline`
pub async fn baseline(config: SpectroConfig, args: &SweepArgs) -> Result<()> {
    let (mut session, sink) = open_session(config, &args.run).await?;
    let report = session
        .sweep(&sweep_request(args, BASELINE_SAMPLE))
        .await?;
    let mean = MeanBlank::from_blank(&report.spectrum.absorbances())
        .map(|m| m.offset)
        .unwrap_or(f64::NAN);
    println!(
        "blank recorded: {} points, mean absorbance {:.4}, file {}",
        report.spectrum.len(),
        mean,
        sink.path_of(&report.table).display()
    );
    Ok(())
}

/// Baseline for kinetics traces: a fixed `offset` if given, otherwise the
/// configured model (built from `blank` when it needs one).
fn kinetics_baseline(
    config: &SpectroConfig,
    blank: Option<&Path>,
    offset: Option<f64>,
) -> Result<Option<Arc<dyn BaselineModel>>> {
    if let Some(offset) = offset {
        return Ok(Some(Arc::new(MeanBlank { offset })));
    }
    let blank = blank.map(read_blank).transpose()?;
    let model = model_from_settings(
        &config.processing.baseline,
        blank.as_ref().map(|(w, a)| Blank {
            wavelengths: w,
            absorbance: a,
        }),
    )?;
    Ok(model.map(Arc::from))
}

/// `spectro kinetics`
#[allow(clippy::too_many_arguments)]
pub async fn kinetics(
    config: SpectroConfig,
    run: &RunArgs,
    sample: &str,
    wavelengths: Vec<f64>,
    duration: f64,
    delay: f64,
    blank: Option<PathBuf>,
    offset: Option<f64>,
) -> Result<()> {
    let duration = Duration::try_from_secs_f64(duration).context("invalid --duration")?;
    let delay = Duration::try_from_secs_f64(delay).context("invalid --delay")?;
    let baseline = kinetics_baseline(&config, blank.as_deref(), offset)?;
    if let Some(model) = &baseline {
        info!(baseline = model.name(), "kinetics traces will be baseline corrected");
    }
    let (mut session, sink) = open_session(config, run).await?;
    let request = KineticsRequest {
        wavelengths,
        duration,
        delay,
        reference: run.reference,
        sample_name: sample.to_string(),
        baseline,
    };
    let report = session.kinetics(&request).await?;
    for trace in &report.traces {
        let finite: Vec<f64> = trace
            .absorbances()
            .into_iter()
            .filter(|a| a.is_finite())
            .collect();
        let last = finite.last().copied().unwrap_or(f64::NAN);
        println!(
            "{} nm: {} samples, last absorbance {:.4}",
            trace.wavelength_nm,
            trace.samples.len(),
            last
        );
    }
    if report.stopped {
        println!("run stopped early");
    }
    println!("tables in {}", sink.dir().display());
    Ok(())
}

/// `spectro analyze`
pub async fn analyze(
    config: &SpectroConfig,
    input: &Path,
    blank: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let spectrum = read_spectrum(input)?;
    let blank = blank.map(read_blank).transpose()?;
    let processor = SpectrumProcessor::from_config(
        &config.processing,
        blank.as_ref().map(|(w, a)| Blank {
            wavelengths: w,
            absorbance: a,
        }),
    )?;
    let processed = processor.process_spectrum(&spectrum)?;

    let dir = match output {
        Some(dir) => dir,
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let sample = sample_of(input);
    let sink = CsvSink::new(dir);
    let (spectrum_table, peaks_table) = export_processed(&sink, &sample, &processed).await?;
    print_summary(&processed);
    println!(
        "wrote {} and {}",
        sink.path_of(&spectrum_table).display(),
        sink.path_of(&peaks_table).display()
    );
    Ok(())
}

/// Sample name from a `raw_<sample>.csv` path.
fn sample_of(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string());
    match stem.strip_prefix("raw_") {
        Some(sample) => sample.to_string(),
        None => stem,
    }
}

fn print_summary(processed: &ProcessedSpectrum) {
    if processed.invalid_points > 0 {
        println!("{} invalid points filled", processed.invalid_points);
    }
    match &processed.global_max {
        Some(top) => println!(
            "maximum absorbance {:.4} at {:.2} nm",
            top.absorbance, top.wavelength_nm
        ),
        None => println!("no finite maximum"),
    }
    for peak in &processed.peaks {
        println!("  peak {:.2} nm  A = {:.4}", peak.wavelength_nm, peak.absorbance);
    }
}

/// `spectro config`
pub fn show_config(config: &SpectroConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// `spectro status`
pub async fn status(config: &SpectroConfig, json: bool) -> Result<()> {
    let ports = available_ports().unwrap_or_default();
    let backend = hardware::connect_motion(config).await?;
    let motion = backend.motion();
    let position = motion.position().await?;
    let idle = motion.is_idle().await?;
    let fork = backend.sensors().read_sensor(MIRROR_FORK_PIN).await?;
    let state = match &*backend {
        GrblOrMock::Grbl(grbl) => grbl.status().await?.state,
        GrblOrMock::Mock(_) => if idle { "Idle" } else { "Run" }.to_string(),
    };
    let (min_nm, max_nm) = config.calibration.wavelength_range();
    let wavelength = config.calibration.wavelength_of(position.x);

    if json {
        let value = serde_json::json!({
            "backend": config.motion.backend,
            "state": state,
            "idle": idle,
            "position": { "x": position.x, "y": position.y, "z": position.z },
            "wavelength_nm": wavelength,
            "mirror_fork": fork,
            "range_nm": [min_nm, max_nm],
            "ports": ports,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("backend     {}", config.motion.backend);
    println!("state       {}", state);
    println!(
        "position    X {:.4}  Y {:.4}  Z {:.4}",
        position.x, position.y, position.z
    );
    println!("wavelength  {:.2} nm ({:.1} to {:.1} nm)", wavelength, min_nm, max_nm);
    println!("mirror fork {}", if fork { "reached" } else { "open" });
    println!(
        "probe       {}",
        backend.sensors().read_sensor(SensorPin::Probe).await.unwrap_or(false)
    );
    if ports.is_empty() {
        println!("no serial port found");
    } else {
        println!("ports       {}", ports.join(", "));
    }
    Ok(())
}

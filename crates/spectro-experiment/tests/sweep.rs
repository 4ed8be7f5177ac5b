//! Sweeps against the simulated instrument.

use spectro_core::capabilities::{ExportSink, PointObserver};
use spectro_core::config::SpectroConfig;
use spectro_core::{Cuvette, SpectroError};
use spectro_driver_mock::{
    ErrorConfig, ErrorScenario, MockMode, MockMotion, MockPhotodiode, SimulatedInstrument,
};
use spectro_experiment::{
    BroadcastObserver, Session, StopHandle, SweepRequest, SERIES_ABSORBANCE,
};
use spectro_storage::{read_table, CsvSink, MemorySink, SWEEP_COLUMNS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn request(sample: &str) -> SweepRequest {
    SweepRequest {
        wavelength_min: 400.0,
        wavelength_max: 410.0,
        wavelength_step: 5.0,
        reference: Cuvette::One,
        sample_name: sample.into(),
    }
}

fn session(config: SpectroConfig, rig: &SimulatedInstrument, sink: Arc<dyn ExportSink>) -> Session {
    Session::builder(config)
        .motion(rig.motion.clone())
        .voltage(rig.photodiode.clone())
        .sink(sink)
        .build()
        .unwrap()
}

/// Photodiode whose `read` fails once `ok_reads` bursts have been served.
fn failing_rig(config: &SpectroConfig, ok_reads: u32) -> SimulatedInstrument {
    let motion = Arc::new(MockMotion::new());
    let photodiode = MockPhotodiode::new(
        motion.clone(),
        config.calibration,
        config.motion.mirror_switch_distance,
        [config.acquisition.first_channel, config.acquisition.second_channel],
    )
    .with_seed(7)
    .with_error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
        operation: "read",
        count: ok_reads,
    }));
    SimulatedInstrument {
        motion,
        photodiode: Arc::new(photodiode),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweep_records_inclusive_range() {
    let config = SpectroConfig::default();
    let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
    let sink = Arc::new(MemorySink::new());
    let mut s = session(config, &rig, sink.clone());

    let report = s.sweep(&request("dye")).await.unwrap();
    assert!(!report.stopped);
    assert_eq!(report.spectrum.len(), 3);

    let wl = report.spectrum.wavelengths();
    let pos = report.spectrum.positions();
    assert!((wl[0] - 410.0).abs() < 1e-6);
    assert!((wl[2] - 400.0).abs() < 1e-6);
    assert!(wl.windows(2).all(|w| w[1] < w[0]));
    assert!(pos.windows(2).all(|w| w[1] > w[0]));
    assert!(report.spectrum.points().iter().all(|p| p.absorbance.is_valid()));

    let table = sink.table(&report.table).unwrap();
    assert!(table.closed);
    assert_eq!(table.columns, SWEEP_COLUMNS.to_vec());
    assert_eq!(table.rows.len(), 3);
    assert!(table.rows.iter().all(|r| r.len() == SWEEP_COLUMNS.len()));

    // screw back at the start of the range
    let x = rig.motion.snapshot().x;
    assert!((x - report.plan.position_start).abs() < 1e-9, "x = {x}");
}

#[tokio::test(start_paused = true)]
async fn test_sweep_sees_sample_band() {
    let config = SpectroConfig::default();
    let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
    let mut s = session(config, &rig, Arc::new(MemorySink::new()));

    let report = s
        .sweep(&SweepRequest {
            wavelength_min: 510.0,
            wavelength_max: 530.0,
            wavelength_step: 10.0,
            reference: Cuvette::One,
            sample_name: "band".into(),
        })
        .await
        .unwrap();
    // 520 nm sits on the 0.8 band of the simulated sample
    let middle = report.spectrum.points()[1].absorbance.value().unwrap();
    assert!((middle - 0.8).abs() < 0.05, "A(520) = {middle}");
}

#[tokio::test(start_paused = true)]
async fn test_hardware_failure_keeps_completed_rows() {
    let config = SpectroConfig::default();
    // three bursts per channel, two channels: 12 reads make two points
    let rig = failing_rig(&config, 12);
    let sink = Arc::new(MemorySink::new());
    let mut s = session(config, &rig, sink.clone());

    let err = s.sweep(&request("broken")).await.unwrap_err();
    assert!(err.is_hardware(), "{err}");
    assert_eq!(sink.rows("raw_broken").len(), 2);
}

/// Simulated rig whose motion controller follows `scenario`.
fn motion_fault_rig(config: &SpectroConfig, scenario: ErrorScenario) -> SimulatedInstrument {
    let motion = Arc::new(MockMotion::new().with_error_config(ErrorConfig::scenario(scenario)));
    let photodiode = MockPhotodiode::new(
        motion.clone(),
        config.calibration,
        config.motion.mirror_switch_distance,
        [config.acquisition.first_channel, config.acquisition.second_channel],
    )
    .with_seed(7);
    SimulatedInstrument {
        motion,
        photodiode: Arc::new(photodiode),
    }
}

#[tokio::test(start_paused = true)]
async fn test_controller_timeout_aborts_before_any_row() {
    let config = SpectroConfig::default();
    let rig = motion_fault_rig(&config, ErrorScenario::Timeout { operation: "status" });
    let sink = Arc::new(MemorySink::new());
    let mut s = session(config, &rig, sink.clone());

    let err = s.sweep(&request("frozen")).await.unwrap_err();
    assert!(err.is_hardware(), "{err}");
    assert!(err.to_string().contains("timed out"), "{err}");
    let table = sink.table("raw_frozen").unwrap();
    assert!(table.rows.is_empty());
    assert!(table.closed);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_keeps_whole_rows() {
    let full = {
        let config = SpectroConfig::default();
        let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
        let sink = Arc::new(MemorySink::new());
        let mut s = session(config, &rig, sink.clone());
        s.sweep(&request("full")).await.unwrap();
        sink.rows("raw_full")
    };

    let mut partial_seen = false;
    for after in 0..40 {
        let config = SpectroConfig::default();
        let rig = motion_fault_rig(&config, ErrorScenario::CommunicationLoss { after });
        let sink = Arc::new(MemorySink::new());
        let mut s = session(config, &rig, sink.clone());

        let rows = match s.sweep(&request("cut")).await {
            Ok(_) => break,
            Err(err) => {
                assert!(err.is_hardware(), "after {after}: {err}");
                assert!(err.to_string().contains("link lost"), "{err}");
                sink.rows("raw_cut")
            }
        };
        // whatever was written is a prefix of the undisturbed sweep
        assert!(rows.len() <= full.len());
        for (row, expected) in rows.iter().zip(&full) {
            assert_eq!(row.len(), SWEEP_COLUMNS.len());
            assert_eq!(row[0], expected[0]);
            assert_eq!(row[4], expected[4]);
        }
        partial_seen |= !rows.is_empty() && rows.len() < full.len();
    }
    assert!(partial_seen, "link loss never hit mid-sweep");
}

#[tokio::test(start_paused = true)]
async fn test_csv_rows_survive_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = SpectroConfig::default();
    let rig = failing_rig(&config, 6);
    let sink = Arc::new(CsvSink::new(dir.path()));
    let mut s = session(config, &rig, sink.clone());

    assert!(s.sweep(&request("partial")).await.is_err());
    let table = read_table(sink.path_of("raw_partial")).unwrap();
    assert_eq!(table.columns, SWEEP_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>());
    assert_eq!(table.len(), 1);
}

struct StopAfter {
    stop: StopHandle,
    remaining: AtomicUsize,
}

impl PointObserver for StopAfter {
    fn publish(&self, _series: &str, _x: f64, _y: f64) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.stop.request_stop();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_request_ends_sweep_and_returns_screw() {
    let config = SpectroConfig::default();
    let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
    let stop = StopHandle::new();
    let sink = Arc::new(MemorySink::new());
    let mut s = Session::builder(config)
        .motion(rig.motion.clone())
        .voltage(rig.photodiode.clone())
        .sink(sink.clone())
        .stop_handle(stop.clone())
        .observer(Arc::new(StopAfter {
            stop: stop.clone(),
            remaining: AtomicUsize::new(2),
        }))
        .build()
        .unwrap();

    let report = s.sweep(&request("stopped")).await.unwrap();
    assert!(report.stopped);
    assert_eq!(report.spectrum.len(), 2);
    assert_eq!(sink.rows("raw_stopped").len(), 2);
    assert!(sink.table("raw_stopped").unwrap().closed);
    let x = rig.motion.snapshot().x;
    assert!((x - report.plan.position_start).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_controller_times_out() {
    let mut config = SpectroConfig::default();
    config.motion.idle_poll.timeout_secs = 5.0;
    let rig = SimulatedInstrument::from_config(&config, MockMode::Realistic);
    rig.motion.set_stalled(true);
    let mut s = session(config, &rig, Arc::new(MemorySink::new()));

    let err = s.sweep(&request("stall")).await.unwrap_err();
    assert!(matches!(err, SpectroError::StallTimeout { .. }), "{err}");
}

#[tokio::test(start_paused = true)]
async fn test_observer_receives_points_in_order() {
    let config = SpectroConfig::default();
    let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
    let live = Arc::new(BroadcastObserver::new(16));
    let mut rx = live.subscribe();
    let mut s = Session::builder(config)
        .motion(rig.motion.clone())
        .voltage(rig.photodiode.clone())
        .sink(Arc::new(MemorySink::new()))
        .observer(live)
        .build()
        .unwrap();

    s.sweep(&request("live")).await.unwrap();
    let mut xs = Vec::new();
    while let Ok(point) = rx.try_recv() {
        assert_eq!(point.series, SERIES_ABSORBANCE);
        xs.push(point.x);
    }
    assert_eq!(xs.len(), 3);
    assert!(xs.windows(2).all(|w| w[1] < w[0]));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_moves_nothing() {
    let config = SpectroConfig::default();
    let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
    let mut s = session(config, &rig, Arc::new(MemorySink::new()));

    let mut bad = request("bad");
    bad.wavelength_step = 0.0;
    assert!(matches!(s.sweep(&bad).await, Err(SpectroError::Configuration(_))));
    assert!(rig.motion.commands().is_empty());
}

//! A sweep written through the CSV sink reads back as the same spectrum.

use spectro_core::capabilities::ExportSink;
use spectro_core::{AbsorbanceResult, SlitWidth, SpectrumPoint};
use spectro_storage::*;

#[tokio::test]
async fn sweep_table_reads_back_as_spectrum() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = SessionLayout::today(tmp.path(), SlitWidth::Nm1);
    layout.create().unwrap();
    let sink = CsvSink::new(layout.dir());
    let name = raw_name("dye");

    let points = [
        SpectrumPoint {
            wavelength_nm: 410.0,
            absorbance: AbsorbanceResult::Value(0.3),
            reference_v: -1.2,
            sample_v: -0.6,
            position_mm: 12.538,
        },
        SpectrumPoint {
            wavelength_nm: 405.0,
            absorbance: AbsorbanceResult::Invalid,
            reference_v: -1.1,
            sample_v: 0.0,
            position_mm: 12.699,
        },
    ];

    sink.open(&name, &SWEEP_COLUMNS).await.unwrap();
    for p in &points {
        sink.append(
            &name,
            &[p.wavelength_nm, p.absorbance.as_f64(), p.reference_v, p.sample_v, p.position_mm],
        )
        .await
        .unwrap();
    }
    sink.close(&name).await.unwrap();

    let spectrum = read_spectrum(layout.path_of(&name)).unwrap();
    assert_eq!(spectrum.points(), &points);

    let (wl, a) = read_blank(layout.path_of(&name)).unwrap();
    assert_eq!(wl, vec![410.0, 405.0]);
    assert!(a[1].is_nan());
}

use approx::assert_abs_diff_eq;
use cal_dac_curves::channel::{
    ChannelId, ChannelTable, CurveTable, DacCurve, DacRange, HalfCurve, UldCurveTable, UldRange, HALF_LEN,
    N_CHANNELS,
};
use cal_dac_curves::fit::settings::{self, DacSetting};
use cal_dac_curves::fit::uld::UldGains;
use cal_dac_curves::{run_pipeline, run_uld_pipeline, DacKind, EnergyWindow, PipelineParams, RunStatus};

/// FLE sweep with pedestal noise below a ramp of 2 ADC per step:
/// `[0, 0, 0, 5, 0, 30, 32, 34, ...]` on fine, `148 + 2 * dac` on coarse.
fn pedestal_ramp() -> DacCurve {
    let fine = HalfCurve::from_fn(|d| match d {
        3 => 5.0,
        d if d >= 5 => 30.0 + 2.0 * (d - 5) as f64,
        _ => 0.0,
    });
    let coarse = HalfCurve::from_fn(|d| 148.0 + 2.0 * d as f64);
    DacCurve::new(fine, coarse)
}

fn single_channel_table(ch: ChannelId, curve: &DacCurve) -> CurveTable {
    let mut table = CurveTable::default();
    table.set(ch, curve);
    table
}

#[test]
fn test_pedestal_ramp_fits_on_coarse() {
    let ch = ChannelId::new(4, 2, 0, 6).unwrap();
    let curves = single_channel_table(ch, &pedestal_ramp());
    let params = PipelineParams::new(DacKind::Fle);
    let gain = ChannelTable::filled(0.5);
    let bias = ChannelTable::filled(0.0);

    let output = run_pipeline(&params, &curves, &gain, Some(&bias)).unwrap();

    // floor drops the pedestal, extrapolation rebuilds the ramp underneath
    let cleaned = output.cleaned.curve(ch);
    for d in 0..64 {
        assert_abs_diff_eq!(cleaned.fine[d], 20.0 + 2.0 * d as f64, epsilon = 1e-9);
    }

    // window 100..300 ADC reaches past the fine top (146), so coarse is used
    assert_eq!(*output.range_used.get(ch), DacRange::Coarse.flag());
    let slope = *output.slope.get(ch);
    assert!((slope - 2.0).abs() / 2.0 < 0.05);
    assert_abs_diff_eq!(*output.offset.get(ch), 148.0, epsilon = 1e-6);

    assert_eq!(
        output.report.status(),
        RunStatus::Partial {
            failed: N_CHANNELS - 1,
            total: N_CHANNELS
        }
    );
    assert!(output.diffs.get(ch).fine.changed > 0);
}

#[test]
fn test_pedestal_ramp_fits_on_fine_with_a_low_window() {
    let ch = ChannelId::new(0, 0, 1, 0).unwrap();
    let curves = single_channel_table(ch, &pedestal_ramp());
    let params = PipelineParams {
        window: Some(EnergyWindow::new(10.0, 40.0).unwrap()),
        ..PipelineParams::new(DacKind::Fle)
    };
    let gain = ChannelTable::filled(0.5);
    let bias = ChannelTable::filled(0.0);

    let output = run_pipeline(&params, &curves, &gain, Some(&bias)).unwrap();
    assert_eq!(*output.range_used.get(ch), DacRange::Fine.flag());
    assert_abs_diff_eq!(*output.slope.get(ch), 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(*output.offset.get(ch), 20.0, epsilon = 1e-6);

    // 30 MeV is 60 ADC on this channel: (60 - 20) / 2 = DAC 20
    let table = settings::settings_table(&output.outcomes, DacKind::Fle, 30.0, &gain, Some(&bias));
    assert_eq!(
        *table.get(ch),
        Some(DacSetting {
            range: DacRange::Fine,
            dac: 20
        })
    );
    assert_eq!(table.as_slice().iter().filter(|s| s.is_some()).count(), 1);
}

#[test]
fn test_smoothing_keeps_a_linear_sweep() {
    let line = HalfCurve::from_fn(|d| 100.0 + 4.0 * d as f64);
    let curves = CurveTable::from_fn(|_| DacCurve::new(line, HalfCurve::from_fn(|d| 150.0 + 16.0 * d as f64)));
    let params = PipelineParams {
        smooth: true,
        ..PipelineParams::new(DacKind::Fhe)
    };
    let gain = ChannelTable::filled(5.0);
    let bias = ChannelTable::filled(0.0);

    let output = run_pipeline(&params, &curves, &gain, Some(&bias)).unwrap();
    assert_eq!(output.report.status(), RunStatus::Pass);
    assert!(output.range_used.as_slice().iter().all(|r| *r == 0));
    assert!(output
        .slope
        .as_slice()
        .iter()
        .all(|s| (s - 4.0).abs() < 1e-9));
}

#[test]
fn test_uld_plateau_is_removed_in_every_range() {
    let saturating = |slope: f64| {
        CurveTable::from_fn(move |_| {
            let coarse = HalfCurve::from_fn(|d| (600.0 + slope * d as f64).min(4095.0));
            DacCurve::new(HalfCurve::default(), coarse)
        })
    };
    let curves = UldCurveTable::new(saturating(70.0), saturating(50.0), saturating(90.0));
    let gains = UldGains::new(
        ChannelTable::filled(20.0),
        ChannelTable::filled(25.0),
        ChannelTable::filled(20.0),
    );

    let output = run_uld_pipeline(&PipelineParams::new(DacKind::Uld), &curves, &gains).unwrap();
    assert_eq!(output.report.status(), RunStatus::Pass);
    assert_eq!(output.report.total, 3 * N_CHANNELS);

    let ch = ChannelId::new(15, 7, 1, 11).unwrap();
    for (range, slope) in [(UldRange::Lex8, 70.0), (UldRange::Lex1, 50.0), (UldRange::Hex8, 90.0)] {
        let fits = output.fits.range(range);
        assert_eq!(*fits.range_used.get(ch), 1);
        assert_abs_diff_eq!(*fits.slope.get(ch), slope, epsilon = 1e-9);
        assert_abs_diff_eq!(*fits.offset.get(ch), 600.0, epsilon = 1e-6);
    }
}

#[test]
fn test_single_point_half_reaches_the_report() {
    let ch = ChannelId::new(11, 6, 0, 2).unwrap();
    let mut coarse = HalfCurve::default();
    coarse[HALF_LEN - 1] = 2000.0;
    let mut curves = CurveTable::from_fn(|_| pedestal_ramp());
    curves.set(ch, &DacCurve::new(pedestal_ramp().fine, coarse));
    let gain = ChannelTable::filled(0.5);
    let bias = ChannelTable::filled(0.0);

    let output = run_pipeline(&PipelineParams::new(DacKind::Fle), &curves, &gain, Some(&bias)).unwrap();

    // the coarse half is kept as recorded and the channel cannot be fitted
    assert_eq!(output.cleaned.curve(ch).coarse, coarse);
    assert_eq!(*output.range_used.get(ch), -1);
    let warnings: Vec<_> = output
        .report
        .warnings()
        .filter(|w| w.kind == "insufficient_points")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].channel, ch);
    assert_eq!(warnings[0].values, vec![("points", 1.0)]);
    assert!(warnings[0].message.contains("COARSE"));
    assert_eq!(
        output.report.status(),
        RunStatus::Partial {
            failed: 1,
            total: N_CHANNELS
        }
    );
}

#[test]
fn test_fhe_without_bias_is_refused() {
    let params = PipelineParams::new(DacKind::Fhe);
    let result = run_pipeline(&params, &CurveTable::default(), &ChannelTable::filled(5.0), None);
    assert!(result.is_err());
}

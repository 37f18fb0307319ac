//! CAL DAC pipeline self-test harness.
//!
//! Generates synthetic threshold sweeps for every discriminator kind, runs
//! the filter and fitter over a full table and checks the recovered slopes.
//!
//! Usage: cargo run --bin cal_selftest -- --seed 7 --smooth

use cal_dac_curves::channel::{ChannelId, ChannelTable, CurveTable, DacCurve, HalfCurve, UldCurveTable};
use cal_dac_curves::fit::settings;
use cal_dac_curves::fit::uld::UldGains;
use cal_dac_curves::pipeline::{self, PipelineOutput, PipelineParams};
use cal_dac_curves::report::RunStatus;
use cal_dac_curves::DacKind;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Synthetic end-to-end check of the CAL DAC curve filter and slope fitter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RNG seed for the synthetic tables
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// JSON pipeline config; its `kind` is overridden per run
    #[arg(short, long)]
    config: Option<String>,

    /// Enable 5-point smoothing
    #[arg(long)]
    smooth: bool,
}

/// Shape of the synthetic sweeps for one kind, in ADC units.
struct Shape {
    gain: f64,
    fine_slope: f64,
    fine_offset: f64,
    coarse_slope: f64,
    coarse_offset: f64,
    bias: f64,
}

impl Shape {
    fn for_kind(kind: DacKind) -> Self {
        match kind {
            DacKind::Lac => Shape {
                gain: 0.02,
                fine_slope: 25.0,
                fine_offset: 15.0,
                coarse_slope: 100.0,
                coarse_offset: 60.0,
                bias: 0.0,
            },
            DacKind::Fle => Shape {
                gain: 0.5,
                fine_slope: 2.0,
                fine_offset: 200.0,
                coarse_slope: 8.0,
                coarse_offset: 250.0,
                bias: 10.0,
            },
            DacKind::Fhe => Shape {
                gain: 5.0,
                fine_slope: 4.0,
                fine_offset: 100.0,
                coarse_slope: 16.0,
                coarse_offset: 150.0,
                bias: 10.0,
            },
            DacKind::Uld => Shape {
                gain: 20.0,
                fine_slope: 0.0,
                fine_offset: 0.0,
                coarse_slope: 60.0,
                coarse_offset: 500.0,
                bias: 0.0,
            },
        }
    }
}

const PEDESTAL: f64 = 20.0;
const NOISE_SIGMA: f64 = 0.5;
const SATURATION: f64 = 4095.0;
const GLITCH_RATE: f64 = 0.01;
const DEAD_RATE: f64 = 0.005;

/// Synthetic input tables plus the true per-channel fine slopes.
struct Synthetic {
    curves: CurveTable,
    gain: ChannelTable<f64>,
    bias: ChannelTable<f64>,
    true_fine_slope: ChannelTable<f64>,
    dead: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let base = match &args.config {
        Some(path) => match PipelineParams::from_json_file(path) {
            Ok(params) => params,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        None => PipelineParams::default(),
    };

    println!("=== CAL DAC Self-Test (seed {}) ===\n", args.seed);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut all_pass = true;

    for &kind in &[DacKind::Lac, DacKind::Fle, DacKind::Fhe] {
        let params = PipelineParams {
            kind,
            smooth: base.smooth || args.smooth,
            ..base.clone()
        };
        all_pass &= test_kind(&params, &mut rng);
    }
    let params = PipelineParams {
        kind: DacKind::Uld,
        smooth: base.smooth || args.smooth,
        ..base.clone()
    };
    all_pass &= test_uld(&params, &mut rng);

    println!("\n=== Results ===");
    if all_pass {
        println!("ALL TESTS PASSED");
    } else {
        println!("SOME TESTS FAILED - check output above");
        std::process::exit(1);
    }
}

fn print_result(name: &str, pass: bool, detail: &str) {
    let status = if pass { "PASS" } else { "FAIL" };
    println!("  [{}] {} - {}", status, name, detail);
}

// === Synthetic Data ===

/// Linear sweep with pedestal noise at the bottom, Gaussian noise and the
/// occasional large glitch.
fn synth_half(rng: &mut StdRng, slope: f64, offset: f64, noise: &Normal<f64>) -> HalfCurve {
    HalfCurve::from_fn(|d| {
        let mut adc = offset + slope * d as f64 + noise.sample(rng);
        if d < 2 {
            adc = PEDESTAL + noise.sample(rng);
        }
        if rng.random_bool(GLITCH_RATE) {
            adc += 400.0;
        }
        adc.clamp(1.0, SATURATION)
    })
}

fn synth_table(kind: DacKind, rng: &mut StdRng) -> Synthetic {
    let shape = Shape::for_kind(kind);
    let noise = Normal::new(0.0, NOISE_SIGMA).unwrap();
    let bias_dist = Normal::new(shape.bias, 2.0).unwrap();

    let mut curves = CurveTable::default();
    let mut gain = ChannelTable::filled(shape.gain);
    let mut bias = ChannelTable::filled(0.0);
    let mut true_fine_slope = ChannelTable::filled(f64::NAN);
    let mut dead = 0;

    for ch in ChannelId::all() {
        if rng.random_bool(DEAD_RATE) {
            dead += 1;
            continue;
        }
        let scale = rng.random_range(0.9..1.1);
        let fine_slope = shape.fine_slope * scale;
        let fine = synth_half(rng, fine_slope, shape.fine_offset, &noise);
        let coarse = synth_half(rng, shape.coarse_slope * scale, shape.coarse_offset, &noise);
        curves.set(ch, &DacCurve::new(fine, coarse));
        gain.set(ch, shape.gain * rng.random_range(0.95..1.05));
        if kind.uses_bias() {
            bias.set(ch, bias_dist.sample(rng));
        }
        true_fine_slope.set(ch, fine_slope);
    }

    Synthetic {
        curves,
        gain,
        bias,
        true_fine_slope,
        dead,
    }
}

/// Coarse-only sweep that saturates at the ADC ceiling.
fn synth_uld_range(rng: &mut StdRng, slope: f64) -> CurveTable {
    let shape = Shape::for_kind(DacKind::Uld);
    let noise = Normal::new(0.0, NOISE_SIGMA).unwrap();
    CurveTable::from_fn(|_| {
        let scale = rng.random_range(0.9..1.1);
        let coarse = HalfCurve::from_fn(|d| {
            let adc = shape.coarse_offset + slope * scale * d as f64 + noise.sample(rng);
            adc.min(SATURATION)
        });
        DacCurve::new(HalfCurve::default(), coarse)
    })
}

// === Test Cases ===

fn test_kind(params: &PipelineParams, rng: &mut StdRng) -> bool {
    let kind = params.kind;
    println!("Test: {} pipeline", kind);

    let synth = synth_table(kind, rng);
    let bias = kind.uses_bias().then_some(&synth.bias);
    let output = match pipeline::run_pipeline(params, &synth.curves, &synth.gain, bias) {
        Ok(output) => output,
        Err(e) => {
            print_result("configuration", false, &e.to_string());
            return false;
        }
    };

    let status = output.report.status();
    let status_ok = status != RunStatus::Fail;
    print_result(
        "run status",
        status_ok,
        &format!("{} ({} dead channels generated)", status, synth.dead),
    );

    let (fine, coarse, failed) = range_counts(&output);
    print_result(
        "range usage",
        fine > 0,
        &format!(
            "fine={} coarse={} failed={} fallbacks={}",
            fine, coarse, failed, output.report.fallbacks
        ),
    );

    let error = mean_fine_slope_error(&output, &synth.true_fine_slope);
    let slope_ok = error.is_some_and(|e| e < 0.05);
    print_result(
        "fine slope recovery",
        slope_ok,
        &format!("mean relative error {:.4}", error.unwrap_or(f64::NAN)),
    );

    let window = params.window();
    let energy = 0.5 * (window.low + window.high);
    let table = settings::settings_table(&output.outcomes, kind, energy, &synth.gain, bias);
    let with_setting = table.as_slice().iter().filter(|s| s.is_some()).count();
    print_result(
        "threshold settings",
        with_setting > 0,
        &format!("{} channels have a DAC setting for {:.1} MeV", with_setting, energy),
    );

    status_ok && fine > 0 && slope_ok && with_setting > 0
}

fn test_uld(params: &PipelineParams, rng: &mut StdRng) -> bool {
    println!("Test: ULD pipeline");

    let curves = UldCurveTable::new(
        synth_uld_range(rng, 60.0),
        synth_uld_range(rng, 45.0),
        synth_uld_range(rng, 70.0),
    );
    let gain = Shape::for_kind(DacKind::Uld).gain;
    let gains = UldGains::new(
        ChannelTable::filled(gain),
        ChannelTable::filled(gain),
        ChannelTable::filled(gain),
    );

    let output = match pipeline::run_uld_pipeline(params, &curves, &gains) {
        Ok(output) => output,
        Err(e) => {
            print_result("configuration", false, &e.to_string());
            return false;
        }
    };

    let status = output.report.status();
    print_result("run status", status == RunStatus::Pass, &status.to_string());

    let all_coarse = [&output.fits.lex8, &output.fits.lex1, &output.fits.hex8]
        .iter()
        .all(|fits| fits.range_used.as_slice().iter().all(|r| *r == 1));
    print_result("coarse only", all_coarse, "every ULD fit uses the coarse range");

    status == RunStatus::Pass && all_coarse
}

// === Statistics ===

fn range_counts(output: &PipelineOutput) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for r in output.range_used.as_slice() {
        match r {
            0 => counts.0 += 1,
            1 => counts.1 += 1,
            _ => counts.2 += 1,
        }
    }
    counts
}

fn mean_fine_slope_error(output: &PipelineOutput, truth: &ChannelTable<f64>) -> Option<f64> {
    let errors: Vec<f64> = ChannelId::all()
        .filter(|&ch| *output.range_used.get(ch) == 0)
        .map(|ch| ((output.slope.get(ch) - truth.get(ch)) / truth.get(ch)).abs())
        .filter(|e| e.is_finite())
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some(errors.iter().sum::<f64>() / errors.len() as f64)
}

//! Drives an [`SbmlModel`](crate::model::SbmlModel) forward in time,
//! sampling it onto a fixed output grid and firing discrete events
//! between accepted internal steps.
//!
//! `Dopri5` (adaptive Dormand-Prince 5(4) with PI step control) is the
//! default; it is the only stepper the original `SBMLSim::run` used
//! (via Boost.Odeint's `make_controlled`). The other three generalize a
//! capability the original only stubbed out (`Rosenbrock4`, whose
//! Jacobian hook was dead code) or never offered at all (`Rk4`,
//! `Rkf78`). Which one a build gets is a Cargo feature, not a
//! `RunConfiguration` field — the stepper is a build-time choice, never
//! a per-run one. A build with more than one of `rk4`/`rkf78`/
//! `rosenbrock4` enabled at once resolves to the most specialized:
//! `rosenbrock4` > `rkf78` > `rk4` > plain `Dopri5`.

use crate::config::RunConfiguration;
use crate::eval::ResolutionMode;
use crate::observe::Observer;
use crate::system::{apply_initial_assignments, fire_events, SystemBuilder};
use crate::view::{EventRuntime, ModelView};
use oldies_core::{OldiesError, Result};

/// Initial/max/min step-size bounds and the internal-step cap are fixed
/// constants, not `RunConfiguration` fields: spec's external interface
/// fixes that struct at exactly six knobs, none of them step-size
/// tuning.
const INITIAL_STEP: f64 = 1e-3;
const MAX_STEP: f64 = 1.0;
const MIN_STEP: f64 = 1e-10;
const MAX_INTERNAL_STEPS: usize = 1_000_000;

const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 5.0;

/// Weighted RMS error norm, `sqrt(mean((err_i / (atol + rtol*max(|y0|,|y1|)))^2))`.
fn error_norm(err: &[f64], y0: &[f64], y1: &[f64], atol: f64, rtol: f64) -> f64 {
    let n = err.len() as f64;
    let sum_sq: f64 = err
        .iter()
        .zip(y0.iter().zip(y1))
        .map(|(&e, (&a, &b))| {
            let scale = atol + rtol * a.abs().max(b.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum_sq / n).sqrt()
}

fn vec_add_scaled(base: &[f64], scaled: &[(&[f64], f64)]) -> Vec<f64> {
    let mut out = base.to_vec();
    for (v, k) in scaled {
        for (o, x) in out.iter_mut().zip(v.iter()) {
            *o += k * x;
        }
    }
    out
}

#[cfg(not(any(feature = "rk4", feature = "rkf78", feature = "rosenbrock4")))]
struct Dopri5Stage {
    y1: Vec<f64>,
    err_norm: f64,
    f0: Vec<f64>,
    f1: Vec<f64>,
}

/// One attempted Dormand-Prince 5(4) step from `(t, y)` of size `h`.
#[cfg(not(any(feature = "rk4", feature = "rkf78", feature = "rosenbrock4")))]
fn dopri5_step(
    builder: &SystemBuilder,
    t: f64,
    y: &[f64],
    h: f64,
    atol: f64,
    rtol: f64,
) -> Result<Dopri5Stage> {
    let k1 = builder.compute(t, y)?;
    let k2 = builder.compute(t + h / 5.0, &vec_add_scaled(y, &[(&k1, h / 5.0)]))?;
    let k3 = builder.compute(
        t + 3.0 * h / 10.0,
        &vec_add_scaled(y, &[(&k1, h * 3.0 / 40.0), (&k2, h * 9.0 / 40.0)]),
    )?;
    let k4 = builder.compute(
        t + 4.0 * h / 5.0,
        &vec_add_scaled(
            y,
            &[(&k1, h * 44.0 / 45.0), (&k2, h * -56.0 / 15.0), (&k3, h * 32.0 / 9.0)],
        ),
    )?;
    let k5 = builder.compute(
        t + 8.0 * h / 9.0,
        &vec_add_scaled(
            y,
            &[
                (&k1, h * 19372.0 / 6561.0),
                (&k2, h * -25360.0 / 2187.0),
                (&k3, h * 64448.0 / 6561.0),
                (&k4, h * -212.0 / 729.0),
            ],
        ),
    )?;
    let k6 = builder.compute(
        t + h,
        &vec_add_scaled(
            y,
            &[
                (&k1, h * 9017.0 / 3168.0),
                (&k2, h * -355.0 / 33.0),
                (&k3, h * 46732.0 / 5247.0),
                (&k4, h * 49.0 / 176.0),
                (&k5, h * -5103.0 / 18656.0),
            ],
        ),
    )?;
    let y1 = vec_add_scaled(
        y,
        &[
            (&k1, h * 35.0 / 384.0),
            (&k3, h * 500.0 / 1113.0),
            (&k4, h * 125.0 / 192.0),
            (&k5, h * -2187.0 / 6784.0),
            (&k6, h * 11.0 / 84.0),
        ],
    );
    let k7 = builder.compute(t + h, &y1)?; // FSAL: also next step's k1

    let err: Vec<f64> = (0..y.len())
        .map(|i| {
            h * ((35.0 / 384.0 - 5179.0 / 57600.0) * k1[i]
                + (500.0 / 1113.0 - 7571.0 / 16695.0) * k3[i]
                + (125.0 / 192.0 - 393.0 / 640.0) * k4[i]
                + (-2187.0 / 6784.0 - -92097.0 / 339200.0) * k5[i]
                + (11.0 / 84.0 - 187.0 / 2100.0) * k6[i]
                + (0.0 - 1.0 / 40.0) * k7[i])
        })
        .collect();
    let err_norm = error_norm(&err, y, &y1, atol, rtol);
    Ok(Dopri5Stage { y1, err_norm, f0: k1, f1: k7 })
}

/// Fixed-step classical 4-stage Runge-Kutta.
#[cfg(feature = "rk4")]
fn rk4_step(builder: &SystemBuilder, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
    let k1 = builder.compute(t, y)?;
    let k2 = builder.compute(t + h / 2.0, &vec_add_scaled(y, &[(&k1, h / 2.0)]))?;
    let k3 = builder.compute(t + h / 2.0, &vec_add_scaled(y, &[(&k2, h / 2.0)]))?;
    let k4 = builder.compute(t + h, &vec_add_scaled(y, &[(&k3, h)]))?;
    Ok(vec_add_scaled(
        y,
        &[(&k1, h / 6.0), (&k2, h / 3.0), (&k3, h / 3.0), (&k4, h / 6.0)],
    ))
}

/// Cubic Hermite dense output between two accepted points, using the
/// endpoint values and derivatives. A lighter-weight stand-in for
/// Dopri5's own 4th-order continuous extension (which needs additional
/// stage evaluations this driver doesn't keep around); accurate enough
/// for sampling onto an output grid finer than the step size, looser for
/// an output grid coarser than it.
fn dense_output(t0: f64, y0: &[f64], f0: &[f64], t1: f64, y1: &[f64], f1: &[f64], t: f64) -> Vec<f64> {
    let h = t1 - t0;
    if h == 0.0 {
        return y1.to_vec();
    }
    let theta = (t - t0) / h;
    let h00 = 2.0 * theta.powi(3) - 3.0 * theta.powi(2) + 1.0;
    let h10 = theta.powi(3) - 2.0 * theta.powi(2) + theta;
    let h01 = -2.0 * theta.powi(3) + 3.0 * theta.powi(2);
    let h11 = theta.powi(3) - theta.powi(2);
    (0..y0.len())
        .map(|i| h00 * y0[i] + h10 * h * f0[i] + h01 * y1[i] + h11 * h * f1[i])
        .collect()
}

/// Orchestrates one complete simulation: builds the RHS from a
/// [`ModelView`], steps it from `config.start` to `config.start +
/// config.duration`, samples it onto an evenly-spaced output grid, and
/// fires events between accepted steps.
pub struct Driver<'a> {
    view: &'a ModelView,
}

impl<'a> Driver<'a> {
    pub fn new(view: &'a ModelView) -> Driver<'a> {
        Driver { view }
    }

    pub fn run(&self, config: &RunConfiguration, observer: &mut dyn Observer) -> Result<()> {
        let mode = ResolutionMode::Lenient;
        let (initial_state, constants) = apply_initial_assignments(self.view, mode)?;
        let builder = SystemBuilder::new(self.view, mode).with_constants(constants);
        let mut runtime = EventRuntime::new(self.view);

        if config.step_interval <= 0.0 || config.duration <= 0.0 {
            return Err(OldiesError::SimulationError(
                "step_interval and duration must both be positive".to_string(),
            ));
        }
        let t_end = config.start + config.duration;
        let n_intervals = (config.duration / config.step_interval).round().max(1.0);
        let output_dt = config.duration / n_intervals;
        let output_times: Vec<f64> = (0..=(n_intervals as usize))
            .map(|i| config.start + i as f64 * output_dt)
            .collect();
        let mut next_output = 0usize;

        let mut t = config.start;
        let mut y = initial_state;

        self.run_selected(
            &builder,
            &mut runtime,
            config,
            t_end,
            mode,
            &mut t,
            &mut y,
            &output_times,
            &mut next_output,
            observer,
        )?;

        // Guarantee the final grid point is emitted even if float
        // accumulation left `next_output` one short of the end.
        if next_output < output_times.len() {
            let overrides = builder.overrides(t_end, &y)?;
            observer.observe_with_overrides(t_end, &y, &overrides)?;
        }
        Ok(())
    }

    /// Dispatches to the one stepper this build was compiled with. See
    /// the module doc comment for the feature-resolution priority.
    #[cfg(not(any(feature = "rk4", feature = "rkf78", feature = "rosenbrock4")))]
    #[allow(clippy::too_many_arguments)]
    fn run_selected(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        self.run_dopri5(builder, runtime, config, t_end, mode, t, y, output_times, next_output, observer)
    }

    #[cfg(all(feature = "rk4", not(any(feature = "rkf78", feature = "rosenbrock4"))))]
    #[allow(clippy::too_many_arguments)]
    fn run_selected(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let _ = config;
        self.run_fixed(builder, runtime, t_end, mode, t, y, output_times, next_output, observer, rk4_step)
    }

    #[cfg(all(feature = "rkf78", not(feature = "rosenbrock4")))]
    #[allow(clippy::too_many_arguments)]
    fn run_selected(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        self.run_rkf78(builder, runtime, config, t_end, mode, t, y, output_times, next_output, observer)
    }

    #[cfg(feature = "rosenbrock4")]
    #[allow(clippy::too_many_arguments)]
    fn run_selected(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        self.run_rosenbrock4(builder, runtime, config, t_end, mode, t, y, output_times, next_output, observer)
    }

    #[cfg(not(any(feature = "rk4", feature = "rkf78", feature = "rosenbrock4")))]
    #[allow(clippy::too_many_arguments)]
    fn run_dopri5(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let mut h = INITIAL_STEP.min(MAX_STEP);
        let mut steps = 0usize;
        while *t < t_end && steps < MAX_INTERNAL_STEPS {
            steps += 1;
            let h_try = h.min(t_end - *t);
            let stage = dopri5_step(builder, *t, y, h_try, config.absolute_tolerance, config.relative_tolerance)?;
            if stage.err_norm <= 1.0 {
                let t0 = *t;
                let y0 = y.clone();
                let f0 = stage.f0;
                let f1 = stage.f1;
                *t += h_try;
                *y = stage.y1;

                while *next_output < output_times.len() && output_times[*next_output] <= *t + 1e-12 {
                    let ot = output_times[*next_output];
                    let sample = dense_output(t0, &y0, &f0, *t, y, &f1, ot);
                    let overrides = builder.overrides(ot, &sample)?;
                    observer.observe_with_overrides(ot, &sample, &overrides)?;
                    *next_output += 1;
                }

                let overrides = builder.overrides(*t, y)?;
                fire_events(self.view, runtime, *t, y, &overrides, mode)?;

                let fac = (SAFETY * stage.err_norm.powf(-0.2)).clamp(FAC_MIN, FAC_MAX);
                h = (h_try * fac).clamp(MIN_STEP, MAX_STEP);
            } else {
                tracing::debug!(t, h = h_try, err_norm = stage.err_norm, "step rejected");
                let fac = (SAFETY * stage.err_norm.powf(-0.2)).clamp(FAC_MIN, 1.0);
                h = (h_try * fac).max(MIN_STEP);
            }
        }
        Ok(())
    }

    #[cfg(feature = "rk4")]
    #[allow(clippy::too_many_arguments)]
    fn run_fixed(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
        step_fn: fn(&SystemBuilder, f64, &[f64], f64) -> Result<Vec<f64>>,
    ) -> Result<()> {
        let h = INITIAL_STEP.min(MAX_STEP);
        let mut steps = 0usize;
        while *t < t_end && steps < MAX_INTERNAL_STEPS {
            steps += 1;
            let h_try = h.min(t_end - *t);
            let t0 = *t;
            let y0 = y.clone();
            let f0 = builder.compute(t0, &y0)?;
            let y1 = step_fn(builder, t0, &y0, h_try)?;
            *t += h_try;
            let f1 = builder.compute(*t, &y1)?;
            *y = y1;

            while *next_output < output_times.len() && output_times[*next_output] <= *t + 1e-12 {
                let ot = output_times[*next_output];
                let sample = dense_output(t0, &y0, &f0, *t, y, &f1, ot);
                let overrides = builder.overrides(ot, &sample)?;
                observer.observe_with_overrides(ot, &sample, &overrides)?;
                *next_output += 1;
            }

            let overrides = builder.overrides(*t, y)?;
            fire_events(self.view, runtime, *t, y, &overrides, mode)?;
        }
        Ok(())
    }

    #[cfg(feature = "rkf78")]
    #[allow(clippy::too_many_arguments)]
    fn run_rkf78(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        rkf78::run(self, builder, runtime, config, t_end, mode, t, y, output_times, next_output, observer)
    }

    #[cfg(feature = "rosenbrock4")]
    #[allow(clippy::too_many_arguments)]
    fn run_rosenbrock4(
        &self,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        rosenbrock::run(self, builder, runtime, config, t_end, mode, t, y, output_times, next_output, observer)
    }
}

#[cfg(feature = "rkf78")]
mod rkf78 {
    //! Runge-Kutta-Fehlberg 7(8), 13 stages. Used when a model's error
    //! behavior needs a higher-order embedded pair than Dopri5 offers;
    //! substantially more expensive per step in exchange.
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub(super) fn run(
        driver: &Driver,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let mut h = INITIAL_STEP.min(MAX_STEP);
        let mut steps = 0usize;
        while *t < t_end && steps < MAX_INTERNAL_STEPS {
            steps += 1;
            let h_try = h.min(t_end - *t);
            let (y1, err_norm) =
                step(builder, *t, y, h_try, config.absolute_tolerance, config.relative_tolerance)?;
            if err_norm <= 1.0 {
                let t0 = *t;
                let y0 = y.clone();
                let f0 = builder.compute(t0, &y0)?;
                *t += h_try;
                let f1 = builder.compute(*t, &y1)?;
                *y = y1;

                while *next_output < output_times.len() && output_times[*next_output] <= *t + 1e-12 {
                    let ot = output_times[*next_output];
                    let sample = dense_output(t0, &y0, &f0, *t, y, &f1, ot);
                    let overrides = builder.overrides(ot, &sample)?;
                    observer.observe_with_overrides(ot, &sample, &overrides)?;
                    *next_output += 1;
                }

                let overrides = builder.overrides(*t, y)?;
                fire_events(driver.view, runtime, *t, y, &overrides, mode)?;

                let fac = (SAFETY * err_norm.powf(-1.0 / 8.0)).clamp(FAC_MIN, FAC_MAX);
                h = (h_try * fac).clamp(MIN_STEP, MAX_STEP);
            } else {
                tracing::debug!(t = *t, h = h_try, err_norm, "step rejected");
                let fac = (SAFETY * err_norm.powf(-1.0 / 8.0)).clamp(FAC_MIN, 1.0);
                h = (h_try * fac).max(MIN_STEP);
            }
        }
        Ok(())
    }

    /// Fehlberg's 7(8) coefficients (13 stages); returns the 8th-order
    /// solution and a weighted error norm against the 7th-order one.
    fn step(
        builder: &SystemBuilder,
        t: f64,
        y: &[f64],
        h: f64,
        atol: f64,
        rtol: f64,
    ) -> Result<(Vec<f64>, f64)> {
        const C: [f64; 13] = [
            0.0,
            2.0 / 27.0,
            1.0 / 9.0,
            1.0 / 6.0,
            5.0 / 12.0,
            0.5,
            5.0 / 6.0,
            1.0 / 6.0,
            2.0 / 3.0,
            1.0 / 3.0,
            1.0,
            0.0,
            1.0,
        ];
        let mut k: Vec<Vec<f64>> = Vec::with_capacity(13);
        let a: Vec<Vec<f64>> = vec![
            vec![],
            vec![2.0 / 27.0],
            vec![1.0 / 36.0, 1.0 / 12.0],
            vec![1.0 / 24.0, 0.0, 1.0 / 8.0],
            vec![5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0],
            vec![1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0],
            vec![-25.0 / 108.0, 0.0, 0.0, 125.0 / 108.0, -65.0 / 27.0, 125.0 / 54.0],
            vec![31.0 / 300.0, 0.0, 0.0, 0.0, 61.0 / 225.0, -2.0 / 9.0, 13.0 / 900.0],
            vec![2.0, 0.0, 0.0, -53.0 / 6.0, 704.0 / 45.0, -107.0 / 9.0, 67.0 / 90.0, 3.0],
            vec![
                -91.0 / 108.0, 0.0, 0.0, 23.0 / 108.0, -976.0 / 135.0, 311.0 / 54.0, -19.0 / 60.0,
                17.0 / 6.0, -1.0 / 12.0,
            ],
            vec![
                2383.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -301.0 / 82.0,
                2133.0 / 4100.0, 45.0 / 82.0, 45.0 / 164.0, 18.0 / 41.0,
            ],
            vec![
                3.0 / 205.0, 0.0, 0.0, 0.0, 0.0, -6.0 / 41.0, -3.0 / 205.0, -3.0 / 41.0, 3.0 / 41.0,
                6.0 / 41.0, 0.0,
            ],
            vec![
                -1777.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -289.0 / 82.0,
                2193.0 / 4100.0, 51.0 / 82.0, 33.0 / 164.0, 12.0 / 41.0, 0.0, 1.0,
            ],
        ];
        for (i, &ci) in C.iter().enumerate() {
            let yi = if i == 0 {
                y.to_vec()
            } else {
                let mut acc = y.to_vec();
                for (j, coeff) in a[i].iter().enumerate() {
                    if *coeff != 0.0 {
                        for (o, kj) in acc.iter_mut().zip(&k[j]) {
                            *o += h * coeff * kj;
                        }
                    }
                }
                acc
            };
            k.push(builder.compute(t + ci * h, &yi)?);
        }

        const B8: [f64; 13] = [
            41.0 / 840.0, 0.0, 0.0, 0.0, 0.0, 34.0 / 105.0, 9.0 / 35.0, 9.0 / 35.0, 9.0 / 280.0,
            9.0 / 280.0, 41.0 / 840.0, 0.0, 0.0,
        ];
        const B7: [f64; 13] = [
            0.0, 0.0, 0.0, 0.0, 0.0, 34.0 / 105.0, 9.0 / 35.0, 9.0 / 35.0, 9.0 / 280.0, 9.0 / 280.0,
            0.0, 41.0 / 840.0, 41.0 / 840.0,
        ];
        let n = y.len();
        let mut y1 = y.to_vec();
        let mut err = vec![0.0; n];
        for i in 0..13 {
            if B8[i] != 0.0 {
                for (o, ki) in y1.iter_mut().zip(&k[i]) {
                    *o += h * B8[i] * ki;
                }
            }
            let d = B8[i] - B7[i];
            if d != 0.0 {
                for (o, ki) in err.iter_mut().zip(&k[i]) {
                    *o += h * d * ki;
                }
            }
        }
        let err_norm = error_norm(&err, y, &y1, atol, rtol);
        Ok((y1, err_norm))
    }
}

#[cfg(feature = "rosenbrock4")]
mod rosenbrock {
    //! A four-stage linearly-implicit Rosenbrock method (the classical
    //! Kaps-Rentrop/Shampine formulation), using `jacobian::compute` and
    //! a hand-rolled Gaussian elimination solve (no LAPACK dependency).
    //! `df/dt` is taken as zero: the models this targets have no
    //! explicit time dependence in their kinetic laws outside of event
    //! triggers, which don't feed into the Jacobian.
    use super::*;
    use ndarray::Array2;

    const GAMMA: f64 = 0.5;

    #[allow(clippy::too_many_arguments)]
    pub(super) fn run(
        driver: &Driver,
        builder: &SystemBuilder,
        runtime: &mut EventRuntime,
        config: &RunConfiguration,
        t_end: f64,
        mode: ResolutionMode,
        t: &mut f64,
        y: &mut Vec<f64>,
        output_times: &[f64],
        next_output: &mut usize,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let _ = config;
        let h = INITIAL_STEP.min(MAX_STEP);
        let mut steps = 0usize;
        while *t < t_end && steps < MAX_INTERNAL_STEPS {
            steps += 1;
            let h_try = h.min(t_end - *t);
            let t0 = *t;
            let y0 = y.clone();
            let f0 = builder.compute(t0, &y0)?;
            let y1 = step(builder, t0, &y0, h_try)?;
            *t += h_try;
            let f1 = builder.compute(*t, &y1)?;
            *y = y1;

            while *next_output < output_times.len() && output_times[*next_output] <= *t + 1e-12 {
                let ot = output_times[*next_output];
                let sample = dense_output(t0, &y0, &f0, *t, y, &f1, ot);
                let overrides = builder.overrides(ot, &sample)?;
                observer.observe_with_overrides(ot, &sample, &overrides)?;
                *next_output += 1;
            }

            let overrides = builder.overrides(*t, y)?;
            fire_events(driver.view, runtime, *t, y, &overrides, mode)?;
        }
        Ok(())
    }

    fn step(builder: &SystemBuilder, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
        let n = y.len();
        let jac = crate::jacobian::compute(builder.view, t, &oldies_core::StateVector::from(y.to_vec()))?
            .unwrap_or_else(|| Array2::zeros((n, n)));

        let mut a = Array2::<f64>::eye(n);
        for i in 0..n {
            for j in 0..n {
                a[[i, j]] -= h * GAMMA * jac[[i, j]];
            }
        }

        let f0 = builder.compute(t, y)?;
        let g1 = solve_linear(&a, &f0.iter().map(|v| h * v).collect::<Vec<_>>())?;

        let y_a31 = add(y, &g1, 48.0 / 25.0);
        let f_a = builder.compute(t, &y_a31)?;
        let rhs2: Vec<f64> = (0..n).map(|i| h * f_a[i] + -8.0 * g1[i]).collect();
        let g2 = solve_linear(&a, &rhs2)?;

        let y_a32 = add(&y_a31, &g2, 6.0 / 25.0);
        let f_b = builder.compute(t, &y_a32)?;
        let rhs3: Vec<f64> =
            (0..n).map(|i| h * f_b[i] + 372.0 / 25.0 * g1[i] + 12.0 / 5.0 * g2[i]).collect();
        let g3 = solve_linear(&a, &rhs3)?;

        let rhs4: Vec<f64> = (0..n)
            .map(|i| h * f_b[i] + -112.0 / 125.0 * g1[i] + -54.0 / 125.0 * g2[i] + -2.0 / 5.0 * g3[i])
            .collect();
        let g4 = solve_linear(&a, &rhs4)?;

        Ok((0..n)
            .map(|i| y[i] + 19.0 / 9.0 * g1[i] + 0.5 * g2[i] + 25.0 / 108.0 * g3[i] + 125.0 / 108.0 * g4[i])
            .collect())
    }

    fn add(y: &[f64], g: &[f64], coeff: f64) -> Vec<f64> {
        y.iter().zip(g).map(|(yi, gi)| yi + coeff * gi).collect()
    }

    /// Gaussian elimination with partial pivoting. `a` is consumed by
    /// value (cloned by the caller is unnecessary here since we own it).
    fn solve_linear(a: &Array2<f64>, b: &[f64]) -> Result<Vec<f64>> {
        let n = b.len();
        let mut m = a.clone();
        let mut x = b.to_vec();
        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&i, &j| m[[i, col]].abs().partial_cmp(&m[[j, col]].abs()).unwrap())
                .unwrap();
            if m[[pivot, col]].abs() < 1e-14 {
                return Err(OldiesError::NumericalError(
                    "singular matrix in Rosenbrock stage solve".to_string(),
                ));
            }
            if pivot != col {
                for k in 0..n {
                    m.swap((col, k), (pivot, k));
                }
                x.swap(col, pivot);
            }
            let diag = m[[col, col]];
            for row in (col + 1)..n {
                let factor = m[[row, col]] / diag;
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    let v = m[[col, k]];
                    m[[row, k]] -= factor * v;
                }
                x[row] -= factor * x[col];
            }
        }
        for col in (0..n).rev() {
            let mut sum = x[col];
            for k in (col + 1)..n {
                sum -= m[[col, k]] * x[k];
            }
            x[col] = sum / m[[col, col]];
        }
        Ok(x)
    }
}

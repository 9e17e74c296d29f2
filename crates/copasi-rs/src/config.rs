//! Everything a run of the integrator needs besides the model itself:
//! the time window, the output sampling grid, and tolerances. This is
//! the one configuration surface a run exposes; which stepper runs and
//! how strictly names are resolved are build-time/library-level choices
//! (see `integrate`'s Cargo-feature-gated steppers and
//! `eval::ResolutionMode`), not fields here.

use serde::{Deserialize, Serialize};

/// Which table an output field's `id` is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Species,
    Compartment,
    Parameter,
}

/// One column of the CSV trajectory, beyond the leading `time` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub kind: FieldKind,
    pub id: String,
}

impl OutputField {
    pub fn species(id: impl Into<String>) -> OutputField {
        OutputField { kind: FieldKind::Species, id: id.into() }
    }

    pub fn compartment(id: impl Into<String>) -> OutputField {
        OutputField { kind: FieldKind::Compartment, id: id.into() }
    }

    pub fn parameter(id: impl Into<String>) -> OutputField {
        OutputField { kind: FieldKind::Parameter, id: id.into() }
    }
}

/// Exactly the knobs a run exposes; no others. Step-size bounds and the
/// internal-step cap are fixed constants in `integrate` rather than
/// fields here, and which stepper runs is chosen at build time (Cargo
/// feature), not per-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub start: f64,
    pub duration: f64,
    /// Spacing of the output grid: samples land at `start, start+step_interval,
    /// …, start+duration` (both endpoints included).
    pub step_interval: f64,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    /// Columns of the CSV trajectory, in order, after `time`. Empty means
    /// "every species, in model order" (the common case and the CLI's
    /// default when `--output` is never passed).
    #[serde(default)]
    pub output_fields: Vec<OutputField>,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        RunConfiguration {
            start: 0.0,
            duration: 10.0,
            step_interval: 0.1,
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-9,
            output_fields: Vec::new(),
        }
    }
}

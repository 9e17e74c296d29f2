//! # OldiesRules Core
//!
//! Shared types and utilities for legacy simulator revival.
//!
//! ## Supported Legacy Simulators
//!
//! | Simulator | Original Language | Era | Status |
//! |-----------|------------------|-----|--------|
//! | COPASI/libSBMLSim | C++ | 2000s | Revived here |
//!
//! ## Design Philosophy
//!
//! 1. Preserve numerical equivalence with originals
//! 2. Modern Rust safety and performance
//! 3. Shared error taxonomy and time-series plumbing across simulators

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common errors across the simulator revivals.
///
/// The `Unsupported*` variants correspond to the error taxonomy a
/// rate-law/trigger evaluator and a symbolic differentiator can hit when a
/// model uses a construct outside the supported subset.
#[derive(Debug, Error)]
pub enum OldiesError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Simulation error: {0}")]
    SimulationError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// The evaluator was asked to evaluate an AST node type it does not
    /// implement.
    #[error("unsupported AST node: {0}")]
    UnsupportedAstNode(String),

    /// The differentiator was asked to differentiate an AST node type it
    /// does not implement.
    #[error("unsupported derivative of node: {0}")]
    UnsupportedDerivative(String),

    /// A non-assignment rule (rate rule or algebraic rule) was present in
    /// the model. Only `AssignmentRule` is supported.
    #[error("unsupported rule kind: {0}")]
    UnsupportedRule(String),

    /// A relational operator the trigger evaluator does not implement.
    #[error("unsupported relational operator: {0}")]
    UnsupportedRelational(String),

    /// A `Name` node could not be resolved against species, compartments,
    /// or parameters. Only raised in `ResolutionMode::Strict`; the default
    /// lenient mode evaluates to 0.0 instead (see `eval::ResolutionMode`).
    #[error("undefined symbol: {0}")]
    UndefinedSymbol(String),
}

pub type Result<T> = std::result::Result<T, OldiesError>;

/// Time point.
pub type Time = f64;

/// State vector for ODE systems.
pub type StateVector = Array1<f64>;

/// Time series data: one named trajectory sampled at a sequence of times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub time: Vec<Time>,
    pub values: Vec<f64>,
    pub name: String,
    pub units: Option<String>,
}

impl TimeSeries {
    pub fn new(name: &str) -> Self {
        Self {
            time: Vec::new(),
            values: Vec::new(),
            name: name.to_string(),
            units: None,
        }
    }

    pub fn push(&mut self, t: Time, v: f64) {
        self.time.push(t);
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// ODE system trait shared by the simulator revivals in this workspace.
///
/// A type implementing `OdeSystem` is a pure function of `(t, y)`; any
/// model-specific mutable bookkeeping (event trigger state, assignment
/// rule bindings) lives outside it and is applied by the caller between
/// calls, not inside `derivatives`.
pub trait OdeSystem {
    /// System dimension.
    fn dimension(&self) -> usize;

    /// Compute derivatives: dy/dt = f(t, y). Fallible because evaluating a
    /// rate law can hit an unresolvable symbol in strict resolution mode.
    fn derivatives(&self, t: Time, y: &StateVector) -> Result<StateVector>;

    /// Optional Jacobian for stiff systems: J[i][j] = d(dy_i/dt)/dy_j.
    fn jacobian(&self, _t: Time, _y: &StateVector) -> Result<Option<Array2<f64>>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series() {
        let mut ts = TimeSeries::new("A");
        ts.push(0.0, 1.0);
        ts.push(0.1, 0.99);
        assert_eq!(ts.len(), 2);
        assert!(!ts.is_empty());
    }
}

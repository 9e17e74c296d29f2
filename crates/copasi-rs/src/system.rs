//! Assembles the right-hand side of the ODE system from a model's
//! reactions, applies initial assignments before integration starts, and
//! fires discrete events between integration steps.
//!
//! Grounded on `SBMLSystem.cpp`'s `getDifferentialEquation`, which walks
//! every reaction once per species and accumulates `+stoichiometry*rate`
//! for products and `-stoichiometry*rate` for reactants; boundary and
//! constant species are forced to zero afterward rather than skipped
//! during accumulation, matching the source's own two-pass structure.

use crate::eval::{evaluate, evaluate_trigger, EvalContext, ResolutionMode};
use crate::view::{EventRuntime, ModelView};
use oldies_core::{OldiesError, OdeSystem, Result, StateVector, Time};
use std::collections::HashMap;

/// Evaluate every initial assignment once, producing the starting state
/// vector (species targets) and a constant overlay (compartment/parameter
/// targets, which `ModelView` itself cannot hold since it is immutable).
pub fn apply_initial_assignments(
    view: &ModelView,
    mode: ResolutionMode,
) -> Result<(Vec<f64>, HashMap<String, f64>)> {
    let mut state = view.initial_state.clone();
    let mut constants = HashMap::new();
    for assignment in &view.model.initial_assignments {
        let ctx = EvalContext::new(view, &state, 0.0).with_mode(mode).with_overrides(&constants);
        let value = evaluate(&assignment.math, &ctx)?;
        if let Some(&i) = view.species_index.get(&assignment.symbol) {
            state[i] = to_amount(view, &constants, i, value);
        } else {
            constants.insert(assignment.symbol.clone(), value);
        }
    }
    Ok((state, constants))
}

fn compartment_size(view: &ModelView, overrides: &HashMap<String, f64>, compartment_id: &str) -> f64 {
    overrides.get(compartment_id).copied().unwrap_or_else(|| {
        view.compartment_index
            .get(compartment_id)
            .map(|&ci| view.model.compartments[ci].size)
            .unwrap_or(1.0)
    })
}

fn to_amount(view: &ModelView, overrides: &HashMap<String, f64>, species_index: usize, value: f64) -> f64 {
    let species = &view.model.species[species_index];
    if species.should_divide_by_compartment_size() {
        value * compartment_size(view, overrides, &species.compartment)
    } else {
        value
    }
}

/// Builds the ODE right-hand side for a model snapshot, with a constant
/// overlay carried forward from `apply_initial_assignments`.
pub struct SystemBuilder<'a> {
    pub view: &'a ModelView,
    pub mode: ResolutionMode,
    pub constants: HashMap<String, f64>,
}

impl<'a> SystemBuilder<'a> {
    pub fn new(view: &'a ModelView, mode: ResolutionMode) -> SystemBuilder<'a> {
        SystemBuilder { view, mode, constants: HashMap::new() }
    }

    pub fn with_constants(mut self, constants: HashMap<String, f64>) -> SystemBuilder<'a> {
        self.constants = constants;
        self
    }

    /// Assignment-rule targets, recomputed from the current state, merged
    /// on top of the initial-assignment constant overlay. Rules are
    /// evaluated independently of one another against the base state,
    /// not against each other's freshly-computed values: the models this
    /// crate targets do not chain assignment rules, and resolving mutual
    /// dependency order is out of scope.
    pub fn overrides(&self, t: Time, state: &[f64]) -> Result<HashMap<String, f64>> {
        let mut overrides = self.constants.clone();
        for (variable, math) in &self.view.assignment_rules {
            let ctx = EvalContext::new(self.view, state, t).with_mode(self.mode);
            let value = evaluate(math, &ctx)?;
            overrides.insert(variable.clone(), value);
        }
        Ok(overrides)
    }

    fn reaction_rate(
        &self,
        reaction_index: usize,
        t: Time,
        state: &[f64],
        overrides: &HashMap<String, f64>,
    ) -> Result<f64> {
        let ctx = EvalContext::new(self.view, state, t)
            .with_reaction(reaction_index)
            .with_mode(self.mode)
            .with_overrides(overrides);
        let reaction = &self.view.model.reactions[reaction_index];
        evaluate(&reaction.kinetic_law, &ctx)
    }

    /// dy/dt for every species, as a plain `Vec<f64>`.
    pub fn compute(&self, t: Time, state: &[f64]) -> Result<Vec<f64>> {
        let overrides = self.overrides(t, state)?;
        let mut dxdt = vec![0.0; self.view.dimension()];
        for (ri, reaction) in self.view.model.reactions.iter().enumerate() {
            let rate = self.reaction_rate(ri, t, state, &overrides)?;
            for sr in &reaction.reactants {
                let i = *self.view.species_index.get(&sr.species).ok_or_else(|| {
                    OldiesError::UndefinedSymbol(sr.species.clone())
                })?;
                dxdt[i] -= sr.stoichiometry * rate;
            }
            for sr in &reaction.products {
                let i = *self.view.species_index.get(&sr.species).ok_or_else(|| {
                    OldiesError::UndefinedSymbol(sr.species.clone())
                })?;
                dxdt[i] += sr.stoichiometry * rate;
            }
        }
        for (i, species) in self.view.model.species.iter().enumerate() {
            if species.boundary_condition || species.constant {
                dxdt[i] = 0.0;
            }
        }
        Ok(dxdt)
    }
}

impl OdeSystem for SystemBuilder<'_> {
    fn dimension(&self) -> usize {
        self.view.dimension()
    }

    fn derivatives(&self, t: Time, y: &StateVector) -> Result<StateVector> {
        let state: Vec<f64> = y.to_vec();
        let dxdt = self.compute(t, &state)?;
        Ok(StateVector::from(dxdt))
    }

    fn jacobian(&self, t: Time, y: &StateVector) -> Result<Option<ndarray::Array2<f64>>> {
        crate::jacobian::compute(self.view, t, y)
    }
}

/// Check every event's trigger and apply the assignments of any event
/// whose trigger just rose from false to true. Returns whether any event
/// fired, so the driver can log it. Event assignment targets are
/// restricted to species.
pub fn fire_events(
    view: &ModelView,
    runtime: &mut EventRuntime,
    t: Time,
    state: &mut [f64],
    overrides: &HashMap<String, f64>,
    mode: ResolutionMode,
) -> Result<bool> {
    let mut any_fired = false;
    for (i, event) in view.events().iter().enumerate() {
        let ctx = EvalContext::new(view, state, t).with_mode(mode).with_overrides(overrides);
        let active = evaluate_trigger(&event.trigger, &ctx)?;
        let was_active = runtime.was_active(i);
        if active && !was_active {
            for assignment in &event.assignments {
                let ctx = EvalContext::new(view, state, t).with_mode(mode).with_overrides(overrides);
                let value = evaluate(&assignment.math, &ctx)?;
                let species_i = *view.species_index.get(&assignment.variable).ok_or_else(|| {
                    OldiesError::UndefinedSymbol(assignment.variable.clone())
                })?;
                state[species_i] = to_amount(view, overrides, species_i, value);
            }
            any_fired = true;
            tracing::debug!(event = %event.id, time = t, "event fired");
        }
        runtime.set_active(i, active);
    }
    Ok(any_fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{kinetic_law, Compartment, Event, EventAssignment, Parameter, Reaction, SbmlModel, Species, SpeciesReference};

    fn decay_model() -> ModelView {
        let mut model = SbmlModel::new("decay");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_species(Species::new("A", "c", 10.0));
        model.add_parameter(Parameter::new("k", 0.1));
        let law = kinetic_law::mass_action("k", &[("A", 1.0)]);
        let mut reaction = Reaction::new("r1", law);
        reaction.reactants.push(SpeciesReference::new("A", 1.0));
        model.add_reaction(reaction);
        ModelView::new(model).unwrap()
    }

    #[test]
    fn decay_rhs_is_negative() {
        let view = decay_model();
        let builder = SystemBuilder::new(&view, ResolutionMode::Strict);
        let dxdt = builder.compute(0.0, &view.initial_state).unwrap();
        assert_eq!(dxdt.len(), 1);
        assert!((dxdt[0] - (-1.0)).abs() < 1e-12); // -k*A = -0.1*10
    }

    #[test]
    fn boundary_species_forced_to_zero_derivative() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 1.0));
        let mut species = Species::new("A", "c", 5.0);
        species.boundary_condition = true;
        model.add_species(species);
        model.add_parameter(Parameter::new("k", 1.0));
        let mut reaction = Reaction::new("r", kinetic_law::mass_action("k", &[("A", 1.0)]));
        reaction.reactants.push(SpeciesReference::new("A", 1.0));
        model.add_reaction(reaction);
        let view = ModelView::new(model).unwrap();
        let builder = SystemBuilder::new(&view, ResolutionMode::Strict);
        let dxdt = builder.compute(0.0, &view.initial_state).unwrap();
        assert_eq!(dxdt[0], 0.0);
    }

    #[test]
    fn event_fires_once_on_rising_edge() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_species(Species::new("A", "c", 1.0));
        model.add_event(Event {
            id: "e".into(),
            trigger: crate::ast::Ast::rel2(
                crate::ast::RelOp::Ge,
                crate::ast::Ast::NameTime,
                crate::ast::Ast::real(1.0),
            ),
            assignments: vec![EventAssignment { variable: "A".into(), math: crate::ast::Ast::real(99.0) }],
        });
        let view = ModelView::new(model).unwrap();
        let mut runtime = EventRuntime::new(&view);
        let mut state = view.initial_state.clone();

        let fired_before = fire_events(&view, &mut runtime, 0.5, &mut state, &HashMap::new(), ResolutionMode::Strict).unwrap();
        assert!(!fired_before);
        assert_eq!(state[0], 1.0);

        let fired_at = fire_events(&view, &mut runtime, 1.0, &mut state, &HashMap::new(), ResolutionMode::Strict).unwrap();
        assert!(fired_at);
        assert_eq!(state[0], 99.0);

        let fired_again = fire_events(&view, &mut runtime, 1.5, &mut state, &HashMap::new(), ResolutionMode::Strict).unwrap();
        assert!(!fired_again);
        assert_eq!(state[0], 99.0);
    }
}

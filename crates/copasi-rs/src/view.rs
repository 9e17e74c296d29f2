//! An immutable, indexed snapshot of an [`SbmlModel`], built once before
//! integration starts.
//!
//! The original `ModelWrapper` resolves every name by scanning its
//! `std::vector`s linearly on every evaluation — fine for the model sizes
//! it was built against, ruinous for anything bigger once it's being
//! called from an RHS function invoked thousands of times per integrated
//! second. `ModelView` trades a one-time indexing pass for O(1) lookups
//! afterward, and unlike `ModelWrapper` (whose raw-pointer copy
//! constructor double-frees on copy, see the source's own comment) it is
//! plain owned data: `Clone`, `Send`, `Sync`, safe to share across
//! concurrently-running simulations of the same model.
//!
//! Event trigger state is *not* stored here — see [`EventRuntime`] — so
//! that sharing a `ModelView` across simulations never means sharing
//! mutable state between them.

use crate::ast::Ast;
use crate::model::{Event, FunctionDefinition, Rule, SbmlModel};
use oldies_core::{OldiesError, Result};
use std::collections::HashMap;

/// An indexed, immutable snapshot of a model, plus the initial state
/// vector derived from it.
#[derive(Debug, Clone)]
pub struct ModelView {
    pub model: SbmlModel,
    pub species_index: HashMap<String, usize>,
    pub compartment_index: HashMap<String, usize>,
    pub parameter_index: HashMap<String, usize>,
    pub reaction_index: HashMap<String, usize>,
    pub function_index: HashMap<String, usize>,
    /// `local_parameter_index[r]` maps a local parameter id to its value
    /// within reaction `r`'s `local_parameters` vector.
    pub local_parameter_index: Vec<HashMap<String, usize>>,
    /// Assignment-rule targets, filtered from `model.rules`: variable id
    /// to the expression that continuously redefines it.
    pub assignment_rules: Vec<(String, Ast)>,
    pub initial_state: Vec<f64>,
}

impl ModelView {
    /// Index `model`, rejecting any `RateRule`/`AlgebraicRule` it
    /// contains (only `AssignmentRule` is supported) and computing the
    /// initial amount-space state vector.
    pub fn new(model: SbmlModel) -> Result<ModelView> {
        let species_index: HashMap<String, usize> =
            model.species.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
        let compartment_index: HashMap<String, usize> =
            model.compartments.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        let parameter_index: HashMap<String, usize> =
            model.parameters.iter().enumerate().map(|(i, p)| (p.id.clone(), i)).collect();
        let reaction_index: HashMap<String, usize> =
            model.reactions.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
        let function_index: HashMap<String, usize> = model
            .function_definitions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();

        let local_parameter_index: Vec<HashMap<String, usize>> = model
            .reactions
            .iter()
            .map(|r| {
                r.local_parameters
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.id.clone(), i))
                    .collect()
            })
            .collect();

        let mut assignment_rules = Vec::new();
        for rule in &model.rules {
            match rule {
                Rule::Assignment { variable, math } => {
                    assignment_rules.push((variable.clone(), math.clone()));
                }
                Rule::Rate { variable, .. } => {
                    return Err(OldiesError::UnsupportedRule(format!(
                        "rate rule for '{variable}'"
                    )));
                }
                Rule::Algebraic { .. } => {
                    return Err(OldiesError::UnsupportedRule("algebraic rule".to_string()));
                }
            }
        }

        let initial_state = model
            .species
            .iter()
            .map(|s| {
                if let Some(amount) = s.initial_amount {
                    amount
                } else {
                    let conc = s.initial_concentration.unwrap_or(0.0);
                    let size = compartment_index
                        .get(&s.compartment)
                        .map(|&i| model.compartments[i].size)
                        .unwrap_or(1.0);
                    conc * size
                }
            })
            .collect();

        Ok(ModelView {
            model,
            species_index,
            compartment_index,
            parameter_index,
            reaction_index,
            function_index,
            local_parameter_index,
            assignment_rules,
            initial_state,
        })
    }

    pub fn dimension(&self) -> usize {
        self.model.species.len()
    }

    pub fn species_id(&self, index: usize) -> &str {
        &self.model.species[index].id
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.function_index.get(name).map(|&i| &self.model.function_definitions[i])
    }

    pub fn events(&self) -> &[Event] {
        &self.model.events
    }
}

/// Per-run mutable companion to a shared [`ModelView`]: one bool per
/// event, true once that event's trigger has fired and not yet reset by
/// the trigger going false again (rising-edge detection needs the
/// previous sample to compare against).
#[derive(Debug, Clone)]
pub struct EventRuntime {
    trigger_state: Vec<bool>,
}

impl EventRuntime {
    pub fn new(view: &ModelView) -> EventRuntime {
        EventRuntime { trigger_state: vec![false; view.events().len()] }
    }

    pub fn was_active(&self, event_index: usize) -> bool {
        self.trigger_state[event_index]
    }

    pub fn set_active(&mut self, event_index: usize, active: bool) {
        self.trigger_state[event_index] = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Compartment, Species};

    #[test]
    fn concentration_species_converted_to_amount() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 2.0));
        model.add_species(Species::new("S", "c", 4.0));
        let view = ModelView::new(model).unwrap();
        assert_eq!(view.initial_state, vec![8.0]);
    }

    #[test]
    fn amount_species_kept_as_is() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 2.0));
        model.add_species(crate::model::Species::with_amount("S", "c", 5.0));
        let view = ModelView::new(model).unwrap();
        assert_eq!(view.initial_state, vec![5.0]);
    }

    #[test]
    fn rate_rule_is_rejected() {
        let mut model = SbmlModel::new("m");
        model.add_rule(Rule::Rate { variable: "x".into(), math: Ast::int(1) });
        assert!(ModelView::new(model).is_err());
    }

    #[test]
    fn event_runtime_tracks_rising_edge() {
        let mut model = SbmlModel::new("m");
        model.add_event(Event {
            id: "e".into(),
            trigger: Ast::rel2(crate::ast::RelOp::Gt, Ast::name("t"), Ast::real(1.0)),
            assignments: vec![],
        });
        let view = ModelView::new(model).unwrap();
        let mut runtime = EventRuntime::new(&view);
        assert!(!runtime.was_active(0));
        runtime.set_active(0, true);
        assert!(runtime.was_active(0));
    }
}

//! Builds the Jacobian `J[i][j] = d(dxdt_i)/d(y_j)` needed by the
//! implicit Rosenbrock4 stepper.
//!
//! The original wrapper never implemented this — `SBMLSystem::jacobian`
//! is a stub returning a zero matrix with a `// TODO` above it — so there
//! is no legacy behavior to preserve here beyond the shape of the
//! problem. This is the one piece of the redesign that adds real
//! capability rather than reorganizing existing behavior: differentiate
//! each reaction's rate law symbolically (`diff::differentiate`,
//! `simplify::simplify`) with respect to every species it mentions, scale
//! by that reaction's net stoichiometry, and sum.
//!
//! A rate law's `Name(species)` node stands for *concentration*, not the
//! amount the state vector stores, whenever that species divides by its
//! compartment size (see `Species::should_divide_by_compartment_size`).
//! The chain rule turns `d(rate)/d(concentration)` into
//! `d(rate)/d(amount) = d(rate)/d(concentration) * (1/compartment_size)`.

use crate::diff::differentiate;
use crate::eval::{evaluate, EvalContext, ResolutionMode};
use crate::simplify::simplify;
use crate::view::ModelView;
use ndarray::Array2;
use oldies_core::{Result, StateVector, Time};
use std::collections::HashMap;

/// Attempt to build the Jacobian at `(t, y)`. Returns `Ok(None)` (rather
/// than an error) if any reaction's kinetic law uses a construct the
/// differentiator doesn't support, or fails to evaluate numerically —
/// callers fall back to a Jacobian-free stepper in that case.
pub fn compute(view: &ModelView, t: Time, y: &StateVector) -> Result<Option<Array2<f64>>> {
    let dim = view.dimension();
    let state: Vec<f64> = y.to_vec();
    let mut jacobian = Array2::<f64>::zeros((dim, dim));

    for (ri, reaction) in view.model.reactions.iter().enumerate() {
        let mut net_stoich: HashMap<usize, f64> = HashMap::new();
        for sr in &reaction.reactants {
            if let Some(&idx) = view.species_index.get(&sr.species) {
                *net_stoich.entry(idx).or_insert(0.0) -= sr.stoichiometry;
            }
        }
        for sr in &reaction.products {
            if let Some(&idx) = view.species_index.get(&sr.species) {
                *net_stoich.entry(idx).or_insert(0.0) += sr.stoichiometry;
            }
        }
        if net_stoich.is_empty() {
            continue;
        }

        for j in 0..dim {
            let species_j_id = view.species_id(j).to_string();
            if !reaction.kinetic_law.contains_name(&species_j_id) {
                continue;
            }
            let derivative = match differentiate(&reaction.kinetic_law, &species_j_id) {
                Ok(d) => simplify(&d),
                Err(_) => return Ok(None),
            };
            let ctx = EvalContext::new(view, &state, t)
                .with_reaction(ri)
                .with_mode(ResolutionMode::Lenient);
            let mut d_rate = match evaluate(&derivative, &ctx) {
                Ok(v) => v,
                Err(_) => return Ok(None),
            };

            let species_j = &view.model.species[j];
            if species_j.should_divide_by_compartment_size() {
                let size = view
                    .compartment_index
                    .get(&species_j.compartment)
                    .map(|&ci| view.model.compartments[ci].size)
                    .unwrap_or(1.0);
                d_rate /= size;
            }

            for (&i, &coeff) in &net_stoich {
                jacobian[[i, j]] += coeff * d_rate;
            }
        }
    }

    Ok(Some(jacobian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{kinetic_law, Compartment, Parameter, Reaction, SbmlModel, Species, SpeciesReference};

    #[test]
    fn decay_jacobian_is_minus_k() {
        let mut model = SbmlModel::new("decay");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_species(Species::new("A", "c", 10.0));
        model.add_parameter(Parameter::new("k", 0.3));
        let mut reaction = Reaction::new("r1", kinetic_law::mass_action("k", &[("A", 1.0)]));
        reaction.reactants.push(SpeciesReference::new("A", 1.0));
        model.add_reaction(reaction);
        let view = ModelView::new(model).unwrap();

        let y = StateVector::from(view.initial_state.clone());
        let jacobian = compute(&view, 0.0, &y).unwrap().unwrap();
        assert!((jacobian[[0, 0]] - (-0.3)).abs() < 1e-12);
    }

    #[test]
    fn unrelated_species_pair_is_zero() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_species(Species::new("A", "c", 1.0));
        model.add_species(Species::new("B", "c", 1.0));
        model.add_parameter(Parameter::new("k", 1.0));
        let mut reaction = Reaction::new("r", kinetic_law::mass_action("k", &[("A", 1.0)]));
        reaction.reactants.push(SpeciesReference::new("A", 1.0));
        model.add_reaction(reaction);
        let view = ModelView::new(model).unwrap();
        let y = StateVector::from(view.initial_state.clone());
        let jacobian = compute(&view, 0.0, &y).unwrap().unwrap();
        assert_eq!(jacobian[[0, 1]], 0.0);
        assert_eq!(jacobian[[1, 0]], 0.0);
        assert_eq!(jacobian[[1, 1]], 0.0);
    }
}

//! # oldies-copasi
//!
//! Revival of the COPASI/libSBMLSim biochemical network simulator in
//! Rust: given an SBML-shaped model (species, compartments, reactions
//! with AST rate laws, parameters, function definitions, events, initial
//! assignments, assignment rules), numerically integrate the ODE system
//! the reactions imply and stream a CSV trajectory.
//!
//! ## Module map
//!
//! - [`ast`] — the tagged expression tree every piece of model math is
//!   stored as.
//! - [`diff`] — symbolic differentiation over [`ast::Ast`].
//! - [`simplify`] — algebraic simplification and constant folding.
//! - [`model`] — the plain-data SBML object graph (`SbmlModel` and its
//!   entities) an external parser hands us.
//! - [`view`] — [`view::ModelView`], an indexed immutable snapshot of a
//!   model built once before integration, plus [`view::EventRuntime`],
//!   the per-run mutable event trigger state factored out of it.
//! - [`eval`] — evaluates an AST against a `(state, reaction context)`.
//! - [`jacobian`] — assembles `d(dxdt_i)/d(y_j)` via [`diff`] for the
//!   implicit stepper.
//! - [`system`] — builds dxdt from reactions/stoichiometry, applies
//!   initial assignments and fires events.
//! - [`integrate`] — the adaptive embedded Runge-Kutta driver.
//! - [`observe`] — streams `(t, selected fields)` rows to a sink.
//! - [`config`] — `RunConfiguration`: the only knobs a run exposes.
//! - [`models`] — a handful of bundled example models for the CLI's
//!   `list`/`interactive` entries and for tests.

pub mod ast;
pub mod config;
pub mod diff;
pub mod eval;
pub mod integrate;
pub mod jacobian;
pub mod model;
pub mod observe;
pub mod simplify;
pub mod system;
pub mod view;

pub use ast::Ast;
pub use config::{FieldKind, OutputField, RunConfiguration};
pub use eval::ResolutionMode;
pub use integrate::Driver;
pub use model::SbmlModel;
pub use observe::CsvObserver;
pub use view::ModelView;

/// A handful of bundled example models, adapted from the teacher's
/// `models` module to build AST-based kinetic laws via
/// [`model::kinetic_law`] instead of the four fixed `KineticLaw` shapes
/// the teacher's revival used. Used by `oldies-cli`'s `list` entry and
/// exercised directly in tests.
pub mod models {
    use crate::model::{kinetic_law, Compartment, Parameter, Reaction, SbmlModel, Species, SpeciesReference};

    /// A single species `A` decaying via `A -> (nothing)` at rate `k*A`.
    /// Spec §8 scenario 1: `A(10) ≈ 0.3679` for `A(0)=1, k=0.1`.
    pub fn exponential_decay() -> SbmlModel {
        let mut model = SbmlModel::new("ExponentialDecay");
        model.add_compartment(Compartment::new("cell", 1.0));
        model.add_species(Species::new("A", "cell", 1.0));
        model.add_parameter(Parameter::new("k", 0.1));
        let mut reaction = Reaction::new("decay", kinetic_law::mass_action("k", &[("A", 1.0)]));
        reaction.reactants.push(SpeciesReference::new("A", 1.0));
        model.add_reaction(reaction);
        model
    }

    /// Michaelis-Menten enzyme kinetics: `S + E <-> ES -> E + P`.
    pub fn michaelis_menten() -> SbmlModel {
        let mut model = SbmlModel::new("MichaelisMenten");
        model.add_compartment(Compartment::new("cell", 1.0));
        model.add_species(Species::new("S", "cell", 10.0));
        model.add_species(Species::new("E", "cell", 1.0));
        model.add_species(Species::new("ES", "cell", 0.0));
        model.add_species(Species::new("P", "cell", 0.0));

        model.add_parameter(Parameter::new("k1", 0.1));
        model.add_parameter(Parameter::new("k_1", 0.05));
        model.add_parameter(Parameter::new("k2", 0.1));

        let mut binding =
            Reaction::new("binding", kinetic_law::mass_action("k1", &[("S", 1.0), ("E", 1.0)]));
        binding.reactants.push(SpeciesReference::new("S", 1.0));
        binding.reactants.push(SpeciesReference::new("E", 1.0));
        binding.products.push(SpeciesReference::new("ES", 1.0));
        model.add_reaction(binding);

        let mut unbinding =
            Reaction::new("unbinding", kinetic_law::mass_action("k_1", &[("ES", 1.0)]));
        unbinding.reactants.push(SpeciesReference::new("ES", 1.0));
        unbinding.products.push(SpeciesReference::new("S", 1.0));
        unbinding.products.push(SpeciesReference::new("E", 1.0));
        model.add_reaction(unbinding);

        let mut catalysis =
            Reaction::new("catalysis", kinetic_law::mass_action("k2", &[("ES", 1.0)]));
        catalysis.reactants.push(SpeciesReference::new("ES", 1.0));
        catalysis.products.push(SpeciesReference::new("E", 1.0));
        catalysis.products.push(SpeciesReference::new("P", 1.0));
        model.add_reaction(catalysis);

        model
    }

    /// The repressilator: three mutually-repressing genes, each transcribed
    /// via a Hill-type repression law and translated into a protein.
    pub fn repressilator() -> SbmlModel {
        let mut model = SbmlModel::new("Repressilator");
        model.add_compartment(Compartment::new("cell", 1.0));

        for mrna in ["lacI", "tetR", "cI"] {
            model.add_species(Species::new(mrna, "cell", 0.0));
        }
        for protein in ["LacI", "TetR", "CI"] {
            model.add_species(Species::new(protein, "cell", 0.0));
        }

        model.add_parameter(Parameter::new("alpha", 216.0));
        model.add_parameter(Parameter::new("alpha0", 0.216));
        model.add_parameter(Parameter::new("beta", 5.0));
        model.add_parameter(Parameter::new("n", 2.0));

        // Each mRNA is repressed by the *other* ring's protein:
        // lacI <- CI, tetR <- LacI, cI <- TetR.
        let ring = [("lacI", "CI"), ("tetR", "LacI"), ("cI", "TetR")];
        for (mrna, repressor) in ring {
            let transcription = crate::ast::Ast::Plus(vec![
                crate::ast::Ast::name("alpha0"),
                crate::ast::Ast::Divide(vec![
                    crate::ast::Ast::name("alpha"),
                    crate::ast::Ast::Plus(vec![
                        crate::ast::Ast::real(1.0),
                        crate::ast::Ast::power2(
                            crate::ast::Ast::name(repressor),
                            crate::ast::Ast::name("n"),
                        ),
                    ]),
                ]),
            ]);
            let mut r = Reaction::new(&format!("transcribe_{mrna}"), transcription);
            r.products.push(SpeciesReference::new(mrna, 1.0));
            model.add_reaction(r);

            let mut dr = Reaction::new(&format!("decay_{mrna}"), crate::ast::Ast::name(mrna));
            dr.reactants.push(SpeciesReference::new(mrna, 1.0));
            model.add_reaction(dr);
        }

        for (mrna, protein) in [("lacI", "LacI"), ("tetR", "TetR"), ("cI", "CI")] {
            let translation = kinetic_law::mass_action("beta", &[(mrna, 1.0)]);
            let mut tr = Reaction::new(&format!("translate_{protein}"), translation);
            tr.products.push(SpeciesReference::new(protein, 1.0));
            model.add_reaction(tr);

            let decay_protein = kinetic_law::mass_action("beta", &[(protein, 1.0)]);
            let mut dp = Reaction::new(&format!("decay_{protein}"), decay_protein);
            dp.reactants.push(SpeciesReference::new(protein, 1.0));
            model.add_reaction(dp);
        }

        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ModelView;

    #[test]
    fn exponential_decay_model_builds() {
        let model = models::exponential_decay();
        assert_eq!(model.species.len(), 1);
        assert_eq!(model.reactions.len(), 1);
        ModelView::new(model).unwrap();
    }

    #[test]
    fn michaelis_menten_model_builds() {
        let model = models::michaelis_menten();
        assert_eq!(model.species.len(), 4);
        assert_eq!(model.reactions.len(), 3);
        ModelView::new(model).unwrap();
    }

    #[test]
    fn repressilator_model_builds() {
        let model = models::repressilator();
        assert_eq!(model.species.len(), 6);
        ModelView::new(model).unwrap();
    }
}

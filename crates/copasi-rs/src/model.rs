//! The SBML-document-shaped object graph this crate consumes.
//!
//! SBML XML parsing itself is out of scope (an external collaborator's
//! job); `SbmlModel` is the plain-data object graph such a collaborator
//! would hand us — generalized from the teacher's `copasi-rs::SbmlModel`,
//! whose four fixed `KineticLaw` shapes are replaced by a single `Ast`
//! field (a rate law is an arbitrary expression, not one of four
//! templates) and which gains `FunctionDefinition`, `InitialAssignment`
//! and a `Rule` enum that distinguishes assignment rules from the rate
//! and algebraic rules this system does not support.

use crate::ast::Ast;
use serde::{Deserialize, Serialize};

/// Compartment (reaction container) — a bounded region with a size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compartment {
    pub id: String,
    pub name: Option<String>,
    pub size: f64,
    pub constant: bool,
}

impl Compartment {
    pub fn new(id: &str, size: f64) -> Self {
        Self { id: id.to_string(), name: None, size, constant: true }
    }
}

/// Species (molecule, protein, metabolite).
///
/// Exactly one of `initial_amount`/`initial_concentration` is normally
/// set; the state vector always tracks amount internally (stoichiometry
/// bookkeeping is naturally an amount-space operation), so a
/// concentration-specified initial value is converted to amount using its
/// compartment's size when a `ModelView` is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub name: Option<String>,
    pub compartment: String,
    pub initial_amount: Option<f64>,
    pub initial_concentration: Option<f64>,
    pub has_only_substance_units: bool,
    pub boundary_condition: bool,
    pub constant: bool,
}

impl Species {
    pub fn new(id: &str, compartment: &str, initial_concentration: f64) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            compartment: compartment.to_string(),
            initial_amount: None,
            initial_concentration: Some(initial_concentration),
            has_only_substance_units: false,
            boundary_condition: false,
            constant: false,
        }
    }

    pub fn with_amount(id: &str, compartment: &str, initial_amount: f64) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            compartment: compartment.to_string(),
            initial_amount: Some(initial_amount),
            initial_concentration: None,
            has_only_substance_units: false,
            boundary_condition: false,
            constant: false,
        }
    }

    /// Does a bare `Name(id)` reference to this species need to be
    /// divided by its compartment's size to read as a concentration?
    pub fn should_divide_by_compartment_size(&self) -> bool {
        !self.has_only_substance_units
    }
}

/// Parameter (kinetic constant). Global parameters live in
/// `SbmlModel::parameters`; local (reaction-scoped) parameters live in
/// `Reaction::local_parameters` and shadow globals only while that
/// reaction's kinetic law is being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: Option<String>,
    pub value: f64,
    pub constant: bool,
}

impl Parameter {
    pub fn new(id: &str, value: f64) -> Self {
        Self { id: id.to_string(), name: None, value, constant: true }
    }
}

/// A (species, stoichiometry) pair on one side of a reaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesReference {
    pub species: String,
    pub stoichiometry: f64,
}

impl SpeciesReference {
    pub fn new(species: &str, stoichiometry: f64) -> Self {
        Self { species: species.to_string(), stoichiometry }
    }
}

/// A reaction: reactants, products, and a rate-law AST (the kinetic law).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub name: Option<String>,
    pub reversible: bool,
    pub reactants: Vec<SpeciesReference>,
    pub products: Vec<SpeciesReference>,
    pub modifiers: Vec<String>,
    pub kinetic_law: Ast,
    pub local_parameters: Vec<Parameter>,
}

impl Reaction {
    pub fn new(id: &str, kinetic_law: Ast) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            reversible: false,
            reactants: Vec::new(),
            products: Vec::new(),
            modifiers: Vec::new(),
            kinetic_law,
            local_parameters: Vec::new(),
        }
    }
}

/// User-defined function: a named, parametrized AST substituted at every
/// call site during rate-law evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub body: Ast,
}

/// One assignment inside an event: write `math`'s value into `variable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAssignment {
    pub variable: String,
    pub math: Ast,
}

/// A discrete state change triggered on the rising edge of `trigger`.
/// Assignment targets are restricted to species, per spec — compartment
/// or parameter assignment targets are out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub trigger: Ast,
    pub assignments: Vec<EventAssignment>,
}

/// Applied once before integration begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialAssignment {
    pub symbol: String,
    pub math: Ast,
}

/// An SBML `<listOfRules>` entry. Only `Assignment` is implemented; the
/// other two are recognized so a loader can reject them with
/// `UnsupportedRule` rather than silently ignoring a rate/algebraic rule
/// a model actually depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Rule {
    Assignment { variable: String, math: Ast },
    Rate { variable: String, math: Ast },
    Algebraic { math: Ast },
}

/// The complete SBML model object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SbmlModel {
    pub id: String,
    pub name: Option<String>,
    pub compartments: Vec<Compartment>,
    pub species: Vec<Species>,
    pub parameters: Vec<Parameter>,
    pub reactions: Vec<Reaction>,
    pub function_definitions: Vec<FunctionDefinition>,
    pub initial_assignments: Vec<InitialAssignment>,
    pub rules: Vec<Rule>,
    pub events: Vec<Event>,
}

impl SbmlModel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            compartments: Vec::new(),
            species: Vec::new(),
            parameters: Vec::new(),
            reactions: Vec::new(),
            function_definitions: Vec::new(),
            initial_assignments: Vec::new(),
            rules: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn add_compartment(&mut self, compartment: Compartment) {
        self.compartments.push(compartment);
    }

    pub fn add_species(&mut self, species: Species) {
        self.species.push(species);
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    pub fn add_reaction(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    pub fn add_function_definition(&mut self, function: FunctionDefinition) {
        self.function_definitions.push(function);
    }

    pub fn add_initial_assignment(&mut self, assignment: InitialAssignment) {
        self.initial_assignments.push(assignment);
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn get_species(&self, id: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    pub fn get_compartment(&self, id: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.id == id)
    }

    pub fn get_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }
}

/// Ergonomic rate-law constructors preserved from the teacher's closed
/// `KineticLaw` enum, rebuilt as `Ast` factories so hand-written example
/// models and tests don't need to spell out expression trees by hand.
pub mod kinetic_law {
    use crate::ast::Ast;

    /// `k * product(reactant_i ^ stoichiometry_i)`.
    pub fn mass_action(rate_constant: &str, reactants: &[(&str, f64)]) -> Ast {
        let mut factors = vec![Ast::name(rate_constant)];
        for (species, stoich) in reactants {
            if *stoich == 1.0 {
                factors.push(Ast::name(*species));
            } else {
                factors.push(Ast::power2(Ast::name(*species), Ast::real(*stoich)));
            }
        }
        factors.into_iter().reduce(|a, b| Ast::Times(vec![a, b])).unwrap_or(Ast::real(0.0))
    }

    /// `vmax * [S] / (km + [S])`.
    pub fn michaelis_menten(vmax: &str, km: &str, substrate: &str) -> Ast {
        let s = Ast::name(substrate);
        Ast::divide2(
            Ast::Times(vec![Ast::name(vmax), s.clone()]),
            Ast::Plus(vec![Ast::name(km), s]),
        )
    }

    /// `vmax * [S]^n / (k^n + [S]^n)`.
    pub fn hill(vmax: &str, k: &str, substrate: &str, n: f64) -> Ast {
        let s_n = Ast::power2(Ast::name(substrate), Ast::real(n));
        let k_n = Ast::power2(Ast::name(k), Ast::real(n));
        Ast::divide2(Ast::Times(vec![Ast::name(vmax), s_n.clone()]), Ast::Plus(vec![k_n, s_n]))
    }

    /// `vmax_f * [S] / km_f - vmax_r * [P] / km_r` (reversible
    /// Michaelis-Menten).
    pub fn reversible_mm(
        vmax_f: &str,
        km_f: &str,
        substrate: &str,
        vmax_r: &str,
        km_r: &str,
        product: &str,
    ) -> Ast {
        let forward = Ast::divide2(
            Ast::Times(vec![Ast::name(vmax_f), Ast::name(substrate)]),
            Ast::name(km_f),
        );
        let reverse = Ast::divide2(
            Ast::Times(vec![Ast::name(vmax_r), Ast::name(product)]),
            Ast::name(km_r),
        );
        Ast::minus2(forward, reverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_model_with_accessors() {
        let mut model = SbmlModel::new("test");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_species(Species::new("A", "c", 2.0));
        model.add_parameter(Parameter::new("k", 0.1));
        assert_eq!(model.get_species("A").unwrap().initial_concentration, Some(2.0));
        assert_eq!(model.get_parameter("k").unwrap().value, 0.1);
        assert!(model.get_species("B").is_none());
    }

    #[test]
    fn mass_action_shorthand_builds_product() {
        let ast = kinetic_law::mass_action("k", &[("A", 1.0), ("B", 1.0)]);
        assert!(matches!(ast, Ast::Times(_)));
    }
}

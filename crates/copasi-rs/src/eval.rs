//! Evaluates a kinetic-law, rule, or event-trigger/assignment AST against
//! a model snapshot and a state vector.
//!
//! Name resolution follows the order documented in the original
//! `ModelWrapper::getValue` dispatch: a bare identifier could be a
//! species, a compartment, a reaction-local parameter, or a global
//! parameter, tried in that order, and the source silently fell through
//! to zero if none matched. `ResolutionMode::Lenient` keeps that
//! behavior and is the default; `ResolutionMode::Strict` turns an
//! unresolved name into `UndefinedSymbol` instead, for model development
//! where a silently-zeroed rate law is more often a typo than an
//! intentional forcing term.

use crate::ast::{Ast, MathFunction};
use crate::view::ModelView;
use oldies_core::{OldiesError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    #[default]
    Lenient,
    Strict,
}

/// Everything needed to resolve a name while evaluating one AST: the
/// model snapshot, the current state vector, simulation time, which
/// reaction (if any) is in scope for local-parameter shadowing, and an
/// optional innermost scope of function-call formal parameters.
pub struct EvalContext<'a> {
    pub view: &'a ModelView,
    pub state: &'a [f64],
    pub time: f64,
    pub reaction_index: Option<usize>,
    pub mode: ResolutionMode,
    locals: Option<&'a HashMap<String, f64>>,
    /// Assignment-rule results computed once per RHS evaluation; these
    /// shadow a rule target's raw state/parameter storage everywhere
    /// except inside a function-call body's own formal parameters.
    overrides: Option<&'a HashMap<String, f64>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(view: &'a ModelView, state: &'a [f64], time: f64) -> EvalContext<'a> {
        EvalContext {
            view,
            state,
            time,
            reaction_index: None,
            mode: ResolutionMode::default(),
            locals: None,
            overrides: None,
        }
    }

    pub fn with_reaction(mut self, reaction_index: usize) -> EvalContext<'a> {
        self.reaction_index = Some(reaction_index);
        self
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> EvalContext<'a> {
        self.mode = mode;
        self
    }

    pub fn with_overrides(mut self, overrides: &'a HashMap<String, f64>) -> EvalContext<'a> {
        self.overrides = Some(overrides);
        self
    }

    fn with_locals(&self, locals: &'a HashMap<String, f64>) -> EvalContext<'a> {
        EvalContext {
            view: self.view,
            state: self.state,
            time: self.time,
            reaction_index: self.reaction_index,
            mode: self.mode,
            locals: Some(locals),
            overrides: self.overrides,
        }
    }

    /// A compartment's size, honoring an `InitialAssignment`/`AssignmentRule`
    /// override targeting that compartment before falling back to its
    /// static declared size.
    fn compartment_size(&self, compartment_id: &str) -> f64 {
        if let Some(overrides) = self.overrides {
            if let Some(&v) = overrides.get(compartment_id) {
                return v;
            }
        }
        self.view
            .compartment_index
            .get(compartment_id)
            .map(|&i| self.view.model.compartments[i].size)
            .unwrap_or(1.0)
    }

    fn resolve_name(&self, n: &str) -> Result<f64> {
        if let Some(locals) = self.locals {
            if let Some(v) = locals.get(n) {
                return Ok(*v);
            }
        }
        if let Some(overrides) = self.overrides {
            if let Some(v) = overrides.get(n) {
                return Ok(*v);
            }
        }
        let view = self.view;
        if let Some(&i) = view.species_index.get(n) {
            let species = &view.model.species[i];
            let raw = self.state[i];
            return if species.should_divide_by_compartment_size() {
                Ok(raw / self.compartment_size(&species.compartment))
            } else {
                Ok(raw)
            };
        }
        if view.compartment_index.contains_key(n) {
            return Ok(self.compartment_size(n));
        }
        if let Some(reaction_index) = self.reaction_index {
            if let Some(&i) = view.local_parameter_index[reaction_index].get(n) {
                return Ok(view.model.reactions[reaction_index].local_parameters[i].value);
            }
        }
        if let Some(&i) = view.parameter_index.get(n) {
            return Ok(view.model.parameters[i].value);
        }
        match self.mode {
            ResolutionMode::Lenient => {
                tracing::debug!(name = n, "unresolved name, defaulting to 0.0");
                Ok(0.0)
            }
            ResolutionMode::Strict => Err(OldiesError::UndefinedSymbol(n.to_string())),
        }
    }
}

/// Evaluate an arithmetic/function expression to a single value.
pub fn evaluate(ast: &Ast, ctx: &EvalContext) -> Result<f64> {
    match ast {
        Ast::Real(v) => Ok(*v),
        Ast::Integer(v) => Ok(*v as f64),
        Ast::NameTime => Ok(ctx.time),
        Ast::ConstantE => Ok(std::f64::consts::E),
        Ast::Name(n) => ctx.resolve_name(n),
        Ast::Plus(c) => Ok(evaluate(&c[0], ctx)? + evaluate(&c[1], ctx)?),
        Ast::Minus(c) => Ok(evaluate(&c[0], ctx)? - evaluate(&c[1], ctx)?),
        Ast::Times(c) => Ok(evaluate(&c[0], ctx)? * evaluate(&c[1], ctx)?),
        Ast::Divide(c) => {
            let denom = evaluate(&c[1], ctx)?;
            Ok(evaluate(&c[0], ctx)? / denom)
        }
        Ast::Power(c) | Ast::FunctionPower(c) => {
            Ok(evaluate(&c[0], ctx)?.powf(evaluate(&c[1], ctx)?))
        }
        Ast::Function(f, c) => {
            let arg = evaluate(&c[0], ctx)?;
            Ok(match f {
                MathFunction::Ln => arg.ln(),
                MathFunction::Sin => arg.sin(),
                MathFunction::Cos => arg.cos(),
                MathFunction::Tan => arg.tan(),
                MathFunction::Sinh => arg.sinh(),
                MathFunction::Cosh => arg.cosh(),
                MathFunction::Tanh => arg.tanh(),
                MathFunction::Sec => 1.0 / arg.cos(),
                MathFunction::Root => arg.sqrt(),
            })
        }
        Ast::FunctionCall(name, args) => {
            let def = ctx
                .view
                .function(name)
                .ok_or_else(|| OldiesError::UndefinedSymbol(name.clone()))?;
            if def.params.len() != args.len() {
                return Err(OldiesError::ParseError(format!(
                    "function '{name}' takes {} arguments, {} given",
                    def.params.len(),
                    args.len()
                )));
            }
            let mut locals = HashMap::with_capacity(args.len());
            for (param, arg) in def.params.iter().zip(args) {
                locals.insert(param.clone(), evaluate(arg, ctx)?);
            }
            let body = def.body.clone();
            let inner = ctx.with_locals(&locals);
            evaluate(&body, &inner)
        }
        Ast::Rel(..) => Err(OldiesError::UnsupportedAstNode(
            "relational node used outside a trigger".to_string(),
        )),
    }
}

/// Evaluate an event trigger, returning whether it currently holds.
pub fn evaluate_trigger(ast: &Ast, ctx: &EvalContext) -> Result<bool> {
    match ast {
        Ast::Rel(op, c) => {
            let left = evaluate(&c[0], ctx)?;
            let right = evaluate(&c[1], ctx)?;
            Ok(op.apply(left, right))
        }
        other => Err(OldiesError::UnsupportedRelational(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Compartment, Parameter, Reaction, SbmlModel, Species};
    use crate::view::ModelView;

    fn view_with_species_and_param() -> ModelView {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 2.0));
        model.add_species(Species::new("S", "c", 4.0));
        model.add_parameter(Parameter::new("k", 0.5));
        ModelView::new(model).unwrap()
    }

    #[test]
    fn species_divided_by_compartment_size() {
        let view = view_with_species_and_param();
        let ctx = EvalContext::new(&view, &view.initial_state, 0.0);
        let v = evaluate(&Ast::name("S"), &ctx).unwrap();
        assert_eq!(v, 4.0); // state stores amount 8.0, /2.0 compartment size
    }

    #[test]
    fn global_parameter_resolves() {
        let view = view_with_species_and_param();
        let ctx = EvalContext::new(&view, &view.initial_state, 0.0);
        assert_eq!(evaluate(&Ast::name("k"), &ctx).unwrap(), 0.5);
    }

    #[test]
    fn local_parameter_shadows_global() {
        let mut model = SbmlModel::new("m");
        model.add_compartment(Compartment::new("c", 1.0));
        model.add_parameter(Parameter::new("k", 1.0));
        let mut reaction = Reaction::new("r", Ast::name("k"));
        reaction.local_parameters.push(Parameter::new("k", 99.0));
        model.add_reaction(reaction);
        let view = ModelView::new(model).unwrap();
        let ctx = EvalContext::new(&view, &view.initial_state, 0.0).with_reaction(0);
        assert_eq!(evaluate(&Ast::name("k"), &ctx).unwrap(), 99.0);
    }

    #[test]
    fn strict_mode_errors_on_unknown_name() {
        let view = view_with_species_and_param();
        let ctx =
            EvalContext::new(&view, &view.initial_state, 0.0).with_mode(ResolutionMode::Strict);
        assert!(evaluate(&Ast::name("nope"), &ctx).is_err());
    }

    #[test]
    fn lenient_mode_is_the_default_and_zeros_unknown_names() {
        let view = view_with_species_and_param();
        let ctx = EvalContext::new(&view, &view.initial_state, 0.0);
        assert_eq!(evaluate(&Ast::name("nope"), &ctx).unwrap(), 0.0);
    }

    #[test]
    fn trigger_detects_threshold_crossing() {
        let view = view_with_species_and_param();
        let ctx = EvalContext::new(&view, &view.initial_state, 0.0);
        let trigger = Ast::rel2(crate::ast::RelOp::Gt, Ast::name("S"), Ast::real(3.0));
        assert!(evaluate_trigger(&trigger, &ctx).unwrap());
        let trigger_false = Ast::rel2(crate::ast::RelOp::Gt, Ast::name("S"), Ast::real(10.0));
        assert!(!evaluate_trigger(&trigger_false, &ctx).unwrap());
    }
}

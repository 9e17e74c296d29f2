//! End-to-end scenarios exercising a full model → view → integrate →
//! observe pipeline, one per documented behavior this simulator commits
//! to: exponential decay, reversible binding equilibrium, compartment
//! concentration conversion, sawtooth event firing, function-definition
//! substitution, and algebraic simplification/differentiation identities.

use oldies_copasi::ast::{Ast, MathFunction, RelOp};
use oldies_copasi::eval::{evaluate, EvalContext};
use oldies_copasi::model::{
    kinetic_law, Compartment, Event, EventAssignment, FunctionDefinition, Parameter, Reaction,
    SbmlModel, Species, SpeciesReference,
};
use oldies_copasi::observe::Observer;
use oldies_copasi::{config::RunConfiguration, diff, simplify, Driver, ModelView};

struct Recorder {
    rows: Vec<(f64, Vec<f64>)>,
}

impl Recorder {
    fn new() -> Recorder {
        Recorder { rows: Vec::new() }
    }
}

impl Observer for Recorder {
    fn observe(&mut self, t: f64, state: &[f64]) -> oldies_core::Result<()> {
        self.rows.push((t, state.to_vec()));
        Ok(())
    }
}

/// Scenario 1: one species `A` decaying via `A -> (nothing)` at rate
/// `k*A`, k=0.1. `A(10) ≈ 0.3679` for `A(0)=1`.
#[test]
fn exponential_decay_matches_closed_form() {
    let mut model = SbmlModel::new("decay");
    model.add_compartment(Compartment::new("cell", 1.0));
    model.add_species(Species::new("A", "cell", 1.0));
    model.add_parameter(Parameter::new("k", 0.1));
    let mut reaction = Reaction::new("decay", kinetic_law::mass_action("k", &[("A", 1.0)]));
    reaction.reactants.push(SpeciesReference::new("A", 1.0));
    model.add_reaction(reaction);

    let view = ModelView::new(model).unwrap();
    let driver = Driver::new(&view);
    let config = RunConfiguration { duration: 10.0, step_interval: 1.0, ..RunConfiguration::default() };
    let mut recorder = Recorder::new();
    driver.run(&config, &mut recorder).unwrap();

    let (t_final, y_final) = recorder.rows.last().unwrap();
    assert!((t_final - 10.0).abs() < 1e-9);
    assert!((y_final[0] - 0.3679).abs() < 1e-3);
}

/// Scenario 2: `A+B -> C` (k1=1.0) and `C -> A+B` (k2=0.5); initials
/// A=1, B=1, C=0. A+C and B+C are conserved; equilibrium
/// `Keq = k1/k2 = 2` gives `C_eq = 0.5`.
#[test]
fn reversible_binding_reaches_equilibrium_and_conserves_mass() {
    let mut model = SbmlModel::new("binding");
    model.add_compartment(Compartment::new("cell", 1.0));
    model.add_species(Species::new("A", "cell", 1.0));
    model.add_species(Species::new("B", "cell", 1.0));
    model.add_species(Species::new("C", "cell", 0.0));
    model.add_parameter(Parameter::new("k1", 1.0));
    model.add_parameter(Parameter::new("k2", 0.5));

    let mut forward =
        Reaction::new("bind", kinetic_law::mass_action("k1", &[("A", 1.0), ("B", 1.0)]));
    forward.reactants.push(SpeciesReference::new("A", 1.0));
    forward.reactants.push(SpeciesReference::new("B", 1.0));
    forward.products.push(SpeciesReference::new("C", 1.0));
    model.add_reaction(forward);

    let mut reverse = Reaction::new("unbind", kinetic_law::mass_action("k2", &[("C", 1.0)]));
    reverse.reactants.push(SpeciesReference::new("C", 1.0));
    reverse.products.push(SpeciesReference::new("A", 1.0));
    reverse.products.push(SpeciesReference::new("B", 1.0));
    model.add_reaction(reverse);

    let view = ModelView::new(model).unwrap();
    let driver = Driver::new(&view);
    let config = RunConfiguration { duration: 100.0, step_interval: 1.0, ..RunConfiguration::default() };
    let mut recorder = Recorder::new();
    driver.run(&config, &mut recorder).unwrap();

    let (_, y_final) = recorder.rows.last().unwrap();
    let (a, b, c) = (y_final[0], y_final[1], y_final[2]);
    assert!((a + c - 1.0).abs() < 1e-3, "A+C should stay 1.0, got {}", a + c);
    assert!((b + c - 1.0).abs() < 1e-3, "B+C should stay 1.0, got {}", b + c);
    assert!((c - 0.5).abs() < 1e-2, "C should settle near 0.5, got {c}");
    let keq = c / (a * b);
    assert!((keq - 2.0).abs() < 1e-1, "Keq should settle near 2.0, got {keq}");
}

/// Scenario 3: species `S` in a compartment of size 2.0, initial amount
/// 4.0 (concentration 2.0), reaction `S -> (nothing)` at rate `S`
/// (resolved as concentration). `dS/dt = -2.0` at t=0.
#[test]
fn compartment_size_converts_rate_to_concentration() {
    let mut model = SbmlModel::new("m");
    model.add_compartment(Compartment::new("v", 2.0));
    model.add_species(Species::with_amount("S", "v", 4.0));
    let mut reaction = Reaction::new("r", Ast::name("S"));
    reaction.reactants.push(SpeciesReference::new("S", 1.0));
    model.add_reaction(reaction);

    let view = ModelView::new(model).unwrap();
    let builder = oldies_copasi::system::SystemBuilder::new(
        &view,
        oldies_copasi::ResolutionMode::Strict,
    );
    let dxdt = builder.compute(0.0, &view.initial_state).unwrap();
    assert!((dxdt[0] - (-2.0)).abs() < 1e-12, "dS/dt should be -2.0, got {}", dxdt[0]);
}

/// Scenario 4: species `X` initial 10.0, constant decay at rate 1, and
/// an event resetting `X` to 10 whenever it drops below 5. Trajectory is
/// a repeating sawtooth, never drifting far below the 5.0 threshold.
#[test]
fn event_produces_sawtooth_trajectory() {
    let mut model = SbmlModel::new("m");
    model.add_compartment(Compartment::new("cell", 1.0));
    model.add_species(Species::new("X", "cell", 10.0));
    let mut reaction = Reaction::new("decay", Ast::real(1.0));
    reaction.reactants.push(SpeciesReference::new("X", 1.0));
    model.add_reaction(reaction);
    model.add_event(Event {
        id: "reset".into(),
        trigger: Ast::rel2(RelOp::Lt, Ast::name("X"), Ast::real(5.0)),
        assignments: vec![EventAssignment { variable: "X".into(), math: Ast::real(10.0) }],
    });

    let view = ModelView::new(model).unwrap();
    let driver = Driver::new(&view);
    let config =
        RunConfiguration { duration: 20.0, step_interval: 1.0, ..RunConfiguration::default() };
    let mut recorder = Recorder::new();
    driver.run(&config, &mut recorder).unwrap();

    let values: Vec<f64> = recorder.rows.iter().map(|(_, y)| y[0]).collect();
    assert!(values.iter().all(|&v| (4.0..=10.5).contains(&v)), "{values:?}");
    let resets = values.windows(2).filter(|w| w[1] - w[0] > 2.0).count();
    assert!(resets >= 2, "expected at least two sawtooth resets, saw {resets} in {values:?}");
}

/// Scenario 5: `hill(s, K, n) = s^n / (K^n + s^n)` evaluated via a
/// function call must match direct substitution of its body.
#[test]
fn function_definition_call_matches_direct_substitution() {
    let mut model = SbmlModel::new("m");
    model.add_compartment(Compartment::new("cell", 1.0));
    model.add_species(Species::new("X", "cell", 2.0));
    let body = Ast::divide2(
        Ast::power2(Ast::name("s"), Ast::name("n")),
        Ast::Plus(vec![
            Ast::power2(Ast::name("K"), Ast::name("n")),
            Ast::power2(Ast::name("s"), Ast::name("n")),
        ]),
    );
    model.add_function_definition(FunctionDefinition {
        name: "hill".into(),
        params: vec!["s".into(), "K".into(), "n".into()],
        body,
    });

    let view = ModelView::new(model).unwrap();
    let ctx = EvalContext::new(&view, &view.initial_state, 0.0);

    let call = Ast::call("hill", vec![Ast::name("X"), Ast::real(1.0), Ast::real(4.0)]);
    let via_call = evaluate(&call, &ctx).unwrap();

    let direct = Ast::divide2(
        Ast::power2(Ast::name("X"), Ast::real(4.0)),
        Ast::Plus(vec![
            Ast::power2(Ast::real(1.0), Ast::real(4.0)),
            Ast::power2(Ast::name("X"), Ast::real(4.0)),
        ]),
    );
    let via_direct = evaluate(&direct, &ctx).unwrap();

    assert!((via_call - via_direct).abs() < 1e-12);
    // X=2, n=4, K=1: 16 / (1 + 16) = 16/17
    assert!((via_call - 16.0 / 17.0).abs() < 1e-12);
}

/// Scenario 6: `simplify((x+0)*(1*y) + (3+2))` evaluates identically to
/// `x*y + 5`; `simplify(differentiate(x*x, x))` evaluates identically to
/// `2*x`, at several sample points.
#[test]
fn simplify_and_differentiate_identities() {
    let messy = Ast::Plus(vec![
        Ast::Times(vec![
            Ast::Plus(vec![Ast::name("x"), Ast::real(0.0)]),
            Ast::Times(vec![Ast::real(1.0), Ast::name("y")]),
        ]),
        Ast::Plus(vec![Ast::real(3.0), Ast::real(2.0)]),
    ]);
    let simplified = simplify::simplify(&messy);
    let tidy = Ast::Plus(vec![Ast::Times(vec![Ast::name("x"), Ast::name("y")]), Ast::real(5.0)]);

    let square = Ast::power2(Ast::name("x"), Ast::real(2.0));
    let derivative = simplify::simplify(&diff::differentiate(&square, "x").unwrap());
    let expected_derivative = Ast::Times(vec![Ast::real(2.0), Ast::name("x")]);

    for x in [0.0, 1.0, -2.5, 7.0] {
        for y in [0.0, 3.0, -1.5] {
            let mut model = SbmlModel::new("m");
            model.add_parameter(Parameter::new("x", x));
            model.add_parameter(Parameter::new("y", y));
            let view = ModelView::new(model).unwrap();
            let ctx = EvalContext::new(&view, &view.initial_state, 0.0);

            let a = evaluate(&simplified, &ctx).unwrap();
            let b = evaluate(&tidy, &ctx).unwrap();
            assert!((a - b).abs() < 1e-9, "simplify mismatch at x={x},y={y}: {a} vs {b}");

            let d = evaluate(&derivative, &ctx).unwrap();
            let e = evaluate(&expected_derivative, &ctx).unwrap();
            assert!((d - e).abs() < 1e-9, "derivative mismatch at x={x}: {d} vs {e}");
        }
    }
}

/// A relational trigger built from every `RelOp` variant should evaluate
/// consistently with Rust's own comparison operators (spec's "trigger
/// relational operators" open question: all six, not just `<`).
#[test]
fn trigger_supports_all_relational_operators() {
    let mut model = SbmlModel::new("m");
    model.add_parameter(Parameter::new("a", 3.0));
    model.add_parameter(Parameter::new("b", 5.0));
    let view = ModelView::new(model).unwrap();
    let ctx = EvalContext::new(&view, &view.initial_state, 0.0);

    let cases = [
        (RelOp::Lt, 3.0 < 5.0),
        (RelOp::Gt, 3.0 > 5.0),
        (RelOp::Le, 3.0 <= 5.0),
        (RelOp::Ge, 3.0 >= 5.0),
        (RelOp::Eq, 3.0 == 5.0),
        (RelOp::Neq, 3.0 != 5.0),
    ];
    for (op, expected) in cases {
        let trigger = Ast::rel2(op, Ast::name("a"), Ast::name("b"));
        let got = oldies_copasi::eval::evaluate_trigger(&trigger, &ctx).unwrap();
        assert_eq!(got, expected, "{op:?}");
    }
}

/// A trivial sanity check that `MathFunction` unary calls evaluate
/// through the same dispatch path as everything else.
#[test]
fn unary_math_function_dispatches() {
    let model = SbmlModel::new("m");
    let view = ModelView::new(model).unwrap();
    let ctx = EvalContext::new(&view, &view.initial_state, 0.0);
    let sin_zero = evaluate(&Ast::func1(MathFunction::Sin, Ast::real(0.0)), &ctx).unwrap();
    assert!((sin_zero - 0.0).abs() < 1e-12);
}

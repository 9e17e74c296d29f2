//! Symbolic differentiation, ported rule-for-rule from
//! `examples/original_source/src/util/MathUtil.cpp::differentiate`.
//!
//! Used to build the Jacobian (`jacobian` module) for the implicit
//! Rosenbrock4 stepper.

use crate::ast::{Ast, MathFunction};
use oldies_core::{OldiesError, Result};

/// Differentiate `ast` with respect to `target`, the name of a single
/// variable (almost always a species id).
///
/// Mirrors the short-circuit in the source: if `target` does not occur as
/// a `Name` anywhere in `ast`, the result is `Integer(0)` without
/// dispatching on node type at all. This is both an optimization and a
/// safeguard against the generic `Power` rule synthesizing spurious
/// `ln(u)` terms for expressions that have no dependency on `target` to
/// begin with.
pub fn differentiate(ast: &Ast, target: &str) -> Result<Ast> {
    if !ast.contains_name(target) {
        return Ok(Ast::int(0));
    }

    let rtn = match ast {
        Ast::Plus(c) => {
            Ast::Plus(vec![differentiate(&c[0], target)?, differentiate(&c[1], target)?])
        }
        Ast::Minus(c) => {
            Ast::Minus(vec![differentiate(&c[0], target)?, differentiate(&c[1], target)?])
        }
        Ast::Times(c) => {
            let (u, v) = (&c[0], &c[1]);
            let du = differentiate(u, target)?;
            let dv = differentiate(v, target)?;
            // d{u*v}/dx = du/dx * v + u * dv/dx
            Ast::Plus(vec![
                Ast::Times(vec![du, v.clone()]),
                Ast::Times(vec![u.clone(), dv]),
            ])
        }
        Ast::Divide(c) => {
            let (u, v) = (&c[0], &c[1]);
            let du = differentiate(u, target)?;
            if !v.contains_name(target) {
                // d{u/v}/dx = du/dx / v, when v does not depend on x.
                Ast::Divide(vec![du, v.clone()])
            } else {
                let dv = differentiate(v, target)?;
                // d{u/v}/dx = (v*du/dx - u*dv/dx) / v^2
                let numerator = Ast::Minus(vec![
                    Ast::Times(vec![du, v.clone()]),
                    Ast::Times(vec![u.clone(), dv]),
                ]);
                let denominator = Ast::Power(vec![v.clone(), Ast::int(2)]);
                Ast::Divide(vec![numerator, denominator])
            }
        }
        Ast::Power(c) | Ast::FunctionPower(c) => {
            let (u, v) = (&c[0], &c[1]);
            let du = differentiate(u, target)?;
            let dv = differentiate(v, target)?;
            // d{u^v}/dx = v * u^(v-1) * du/dx + u^v * ln(u) * dv/dx
            let left = Ast::Times(vec![
                Ast::Times(vec![
                    v.clone(),
                    Ast::Power(vec![u.clone(), Ast::Minus(vec![v.clone(), Ast::int(1)])]),
                ]),
                du,
            ]);
            let right = Ast::Times(vec![
                Ast::Power(vec![u.clone(), v.clone()]),
                Ast::Times(vec![Ast::func1(MathFunction::Ln, u.clone()), dv]),
            ]);
            Ast::Plus(vec![left, right])
        }
        Ast::Function(MathFunction::Root, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            // d{sqrt(u)}/dx = du/dx * 0.5 * u^(-0.5)
            let power = Ast::Power(vec![u.clone(), Ast::real(-0.5)]);
            Ast::Times(vec![du, Ast::Times(vec![Ast::real(0.5), power])])
        }
        Ast::Function(MathFunction::Sin, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            Ast::Times(vec![du, Ast::func1(MathFunction::Cos, u.clone())])
        }
        Ast::Function(MathFunction::Cos, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            let neg_du = Ast::Times(vec![Ast::int(-1), du]);
            Ast::Times(vec![neg_du, Ast::func1(MathFunction::Sin, u.clone())])
        }
        Ast::Function(MathFunction::Tan, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            let sec2 = Ast::Power(vec![Ast::func1(MathFunction::Sec, u.clone()), Ast::int(2)]);
            Ast::Times(vec![du, sec2])
        }
        Ast::Function(MathFunction::Sinh, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            Ast::Times(vec![du, Ast::func1(MathFunction::Cosh, u.clone())])
        }
        Ast::Function(MathFunction::Cosh, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            Ast::Times(vec![du, Ast::func1(MathFunction::Sinh, u.clone())])
        }
        Ast::Function(MathFunction::Tanh, c) => {
            let u = &c[0];
            let du = differentiate(u, target)?;
            let cosh2 = Ast::Power(vec![Ast::func1(MathFunction::Cosh, u.clone()), Ast::int(2)]);
            Ast::Times(vec![du, Ast::Divide(vec![Ast::int(1), cosh2])])
        }
        Ast::Real(_) | Ast::Integer(_) | Ast::NameTime | Ast::ConstantE => Ast::int(0),
        Ast::Name(n) => {
            if n == target {
                Ast::int(1)
            } else {
                Ast::int(0)
            }
        }
        other => {
            return Err(OldiesError::UnsupportedDerivative(format!("{other:?}")));
        }
    };

    Ok(rtn.reduce_to_binary())
}

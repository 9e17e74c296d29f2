//! Algebraic simplification and constant folding, ported rule-for-rule
//! from `examples/original_source/src/util/MathUtil.cpp::simplify`, plus
//! the factorial helper from the same file.
//!
//! `simplify` is total: every input AST shape produces *some* output AST,
//! even if unchanged. Only `Plus`, `Minus`, `Times`, `Divide`,
//! `Power`/`FunctionPower` and `Ln` get rewritten; every other node
//! (names, literals, the other unary functions, `FunctionCall`, `Rel`) is
//! returned as an independent copy without descending into its children —
//! matching the source, which never needed to simplify inside e.g. a
//! `sin(...)` argument.

use crate::ast::{Ast, MathFunction};

/// Precomputed factorials for n <= 19 (the largest that fits in an
/// `f64` with a `u64`-ranged table lookup before needing iterative
/// multiplication).
const FACTORIAL_TABLE: [f64; 20] = [
    1.0,
    1.0,
    2.0,
    6.0,
    24.0,
    120.0,
    720.0,
    5040.0,
    40320.0,
    362880.0,
    3628800.0,
    39916800.0,
    479001600.0,
    6227020800.0,
    87178291200.0,
    1307674368000.0,
    20922789888000.0,
    355687428096000.0,
    6402373705728000.0,
    121645100408832000.0,
];

/// `n!` as a floating-point value, via the precomputed table for `n <= 19`
/// and iterative multiplication above that.
pub fn factorial(n: u64) -> f64 {
    if let Some(&v) = FACTORIAL_TABLE.get(n as usize) {
        return v;
    }
    let mut acc = FACTORIAL_TABLE[19];
    for i in 20..=n {
        acc *= i as f64;
    }
    acc
}

/// Simplify `ast` to a fixed point on its numerically-constant subtrees.
/// Never fails.
pub fn simplify(ast: &Ast) -> Ast {
    match ast {
        Ast::Real(_) | Ast::Integer(_) | Ast::Name(_) | Ast::NameTime | Ast::ConstantE => {
            ast.clone()
        }
        Ast::Function(MathFunction::Ln, c) => {
            if matches!(c[0], Ast::ConstantE) {
                Ast::real(1.0)
            } else {
                ast.clone()
            }
        }
        Ast::Plus(c) => simplify_plus(&simplify(&c[0]), &simplify(&c[1])),
        Ast::Minus(c) => simplify_minus(&simplify(&c[0]), &simplify(&c[1])),
        Ast::Times(c) => simplify_times(&simplify(&c[0]), &simplify(&c[1])),
        Ast::Divide(c) => simplify_divide(&simplify(&c[0]), &simplify(&c[1])),
        Ast::Power(c) | Ast::FunctionPower(c) => {
            simplify_power(&simplify(&c[0]), &simplify(&c[1]))
        }
        other => other.clone(),
    }
}

fn simplify_plus(left: &Ast, right: &Ast) -> Ast {
    if let Some(lv) = left.as_number() {
        if lv == 0.0 {
            return right.clone();
        }
        if let Some(rv) = right.as_number() {
            return Ast::real(lv + rv);
        } else if !matches!(right, Ast::Plus(_)) {
            // (3 + x) => (x + 3)
            return Ast::Plus(vec![right.clone(), left.clone()]);
        }
    }
    if let Some(rv) = right.as_number() {
        if rv == 0.0 {
            return left.clone();
        }
    }
    // merge "(x + k1) + k2" => "x + (k1+k2)"
    if let Ast::Plus(lc) = left {
        if lc[1].as_number().is_some() && right.as_number().is_some() {
            let merged = simplify_plus(right, &lc[1]);
            return Ast::Plus(vec![lc[0].clone(), merged]);
        }
    }
    // mirror: "k1 + (x + k2)" => "x + (k1+k2)"
    if let Ast::Plus(rc) = right {
        if rc[1].as_number().is_some() && left.as_number().is_some() {
            let merged = simplify_plus(left, &rc[1]);
            return Ast::Plus(vec![rc[0].clone(), merged]);
        }
    }
    Ast::Plus(vec![left.clone(), right.clone()])
}

fn simplify_minus(left: &Ast, right: &Ast) -> Ast {
    if let Some(rv) = right.as_number() {
        if rv == 0.0 {
            return left.clone();
        }
        if let Some(lv) = left.as_number() {
            return Ast::real(lv - rv);
        }
    }
    Ast::Minus(vec![left.clone(), right.clone()])
}

fn simplify_times(left: &Ast, right: &Ast) -> Ast {
    if let Some(lv) = left.as_number() {
        if lv == 0.0 {
            return Ast::real(0.0);
        }
        if lv == 1.0 {
            return right.clone();
        }
        if let Some(rv) = right.as_number() {
            return Ast::real(lv * rv);
        }
    }
    if let Some(rv) = right.as_number() {
        if rv == 0.0 {
            return Ast::real(0.0);
        }
        if rv == 1.0 {
            return left.clone();
        }
        if !matches!(left, Ast::Times(_)) {
            // (x * 2) => (2 * x)
            return Ast::Times(vec![right.clone(), left.clone()]);
        }
    }
    // merge "(k1 * x) * k2" => "(k1*k2) * x"
    if let Ast::Times(lc) = left {
        if lc[0].as_number().is_some() && right.as_number().is_some() {
            let merged = simplify_times(&lc[0], right);
            return Ast::Times(vec![merged, lc[1].clone()]);
        }
    }
    if let Ast::Times(rc) = right {
        if rc[0].as_number().is_some() && left.as_number().is_some() {
            let merged = simplify_times(&rc[0], left);
            return Ast::Times(vec![merged, rc[1].clone()]);
        }
    }
    Ast::Times(vec![left.clone(), right.clone()])
}

fn simplify_divide(left: &Ast, right: &Ast) -> Ast {
    if let Some(lv) = left.as_number() {
        if lv == 0.0 {
            return Ast::real(0.0);
        }
        if let Some(rv) = right.as_number() {
            return Ast::real(lv / rv);
        }
    }
    if let Some(rv) = right.as_number() {
        if rv == 1.0 {
            return left.clone();
        }
    }
    Ast::Divide(vec![left.clone(), right.clone()])
}

fn simplify_power(left: &Ast, right: &Ast) -> Ast {
    if let Some(rv) = right.as_number() {
        if rv == 0.0 {
            return Ast::real(1.0);
        }
        if rv == 1.0 {
            return left.clone();
        }
    }
    match left {
        // pow(pow(x, a), b) => pow(x, a*b)
        Ast::Power(lc) | Ast::FunctionPower(lc) => {
            let combined =
                Ast::Power(vec![lc[0].clone(), Ast::Times(vec![lc[1].clone(), right.clone()])]);
            simplify(&combined)
        }
        _ => Ast::Power(vec![left.clone(), right.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorial_matches_table_and_iterates_beyond() {
        assert_eq!(factorial(0), 1.0);
        assert_eq!(factorial(5), 120.0);
        assert_eq!(factorial(19), 121645100408832000.0);
        assert_eq!(factorial(20), factorial(19) * 20.0);
    }

    #[test]
    fn folds_constants() {
        let ast = Ast::plus(vec![Ast::int(0), Ast::times(vec![Ast::int(1), Ast::name("y")])]);
        let simplified = simplify(&ast.reduce_to_binary());
        assert_eq!(simplified, Ast::name("y"));
    }

    #[test]
    fn merges_plus_with_three_numeric_constants() {
        // simplify((x+0)*(1*y) + (3+2)) == x*y + 5
        let ast = Ast::plus(vec![
            Ast::times(vec![
                Ast::plus(vec![Ast::name("x"), Ast::int(0)]),
                Ast::times(vec![Ast::int(1), Ast::name("y")]),
            ]),
            Ast::plus(vec![Ast::int(3), Ast::int(2)]),
        ])
        .reduce_to_binary();
        let simplified = simplify(&ast);
        assert_eq!(
            simplified,
            Ast::Plus(vec![Ast::times(vec![Ast::name("x"), Ast::name("y")]), Ast::real(5.0)])
        );
    }

    #[test]
    fn power_identities() {
        assert_eq!(simplify(&Ast::power2(Ast::name("x"), Ast::int(0))), Ast::real(1.0));
        assert_eq!(simplify(&Ast::power2(Ast::name("x"), Ast::int(1))), Ast::name("x"));
        let nested = Ast::power2(Ast::power2(Ast::name("x"), Ast::int(2)), Ast::int(3));
        assert_eq!(
            simplify(&nested),
            Ast::Power(vec![Ast::name("x"), Ast::real(6.0)])
        );
    }

    #[test]
    fn ln_of_e_is_one() {
        let ast = Ast::func1(MathFunction::Ln, Ast::ConstantE);
        assert_eq!(simplify(&ast), Ast::real(1.0));
    }

    #[test]
    fn simplify_is_idempotent() {
        let ast = Ast::plus(vec![Ast::name("x"), Ast::int(0), Ast::int(3)]).reduce_to_binary();
        let once = simplify(&ast);
        let twice = simplify(&once);
        assert_eq!(once, twice);
    }
}

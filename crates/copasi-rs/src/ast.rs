//! The mathematical expression tree ("AST model" in the design docs).
//!
//! A single tagged union carries every node shape a kinetic law, event
//! trigger, event assignment, initial assignment or assignment rule can
//! use. Children are stored as an ordered `Vec<Ast>` exactly as the format
//! the tree arrives in from an SBML math parser would shape it (arbitrary
//! arity `Plus`/`Times`); [`Ast::reduce_to_binary`] normalizes the tree so
//! every arithmetic operator has exactly two children, which
//! `differentiate`/`simplify`/the evaluator all assume.

use serde::{Deserialize, Serialize};

/// The built-in unary math functions distinguished from the infix
/// arithmetic operators and from `Power`/`FunctionPower` (which carry
/// their own tags because SBML MathML distinguishes `<power/>` from
/// `<apply><power/>` from a literal `^`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathFunction {
    Ln,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Sec,
    Root,
}

/// Relational operators, used only inside event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,
}

impl RelOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            RelOp::Lt => left < right,
            RelOp::Gt => left > right,
            RelOp::Le => left <= right,
            RelOp::Ge => left >= right,
            RelOp::Eq => left == right,
            RelOp::Neq => left != right,
        }
    }
}

/// A node in a mathematical expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ast {
    Real(f64),
    Integer(i64),
    Name(String),
    /// SBML's `<csymbol>` for simulation time.
    NameTime,
    /// Euler's number, `e`.
    ConstantE,
    Plus(Vec<Ast>),
    Minus(Vec<Ast>),
    Times(Vec<Ast>),
    Divide(Vec<Ast>),
    /// Infix `^`.
    Power(Vec<Ast>),
    /// `pow(x, y)` function-call form; canonicalized to `Power` by `simplify`.
    FunctionPower(Vec<Ast>),
    Function(MathFunction, Vec<Ast>),
    /// Invocation of a user-defined `FunctionDefinition` by name.
    FunctionCall(String, Vec<Ast>),
    Rel(RelOp, Vec<Ast>),
}

impl Ast {
    pub fn real(v: f64) -> Ast {
        Ast::Real(v)
    }

    pub fn int(v: i64) -> Ast {
        Ast::Integer(v)
    }

    pub fn name(n: impl Into<String>) -> Ast {
        Ast::Name(n.into())
    }

    pub fn plus(children: Vec<Ast>) -> Ast {
        Ast::Plus(children)
    }

    pub fn minus2(l: Ast, r: Ast) -> Ast {
        Ast::Minus(vec![l, r])
    }

    pub fn times(children: Vec<Ast>) -> Ast {
        Ast::Times(children)
    }

    pub fn divide2(l: Ast, r: Ast) -> Ast {
        Ast::Divide(vec![l, r])
    }

    pub fn power2(base: Ast, exp: Ast) -> Ast {
        Ast::Power(vec![base, exp])
    }

    pub fn func1(f: MathFunction, arg: Ast) -> Ast {
        Ast::Function(f, vec![arg])
    }

    pub fn call(name: impl Into<String>, args: Vec<Ast>) -> Ast {
        Ast::FunctionCall(name.into(), args)
    }

    pub fn rel2(op: RelOp, l: Ast, r: Ast) -> Ast {
        Ast::Rel(op, vec![l, r])
    }

    /// Ordered children of this node, empty for leaves.
    pub fn children(&self) -> &[Ast] {
        match self {
            Ast::Real(_) | Ast::Integer(_) | Ast::Name(_) | Ast::NameTime | Ast::ConstantE => &[],
            Ast::Plus(c)
            | Ast::Minus(c)
            | Ast::Times(c)
            | Ast::Divide(c)
            | Ast::Power(c)
            | Ast::FunctionPower(c)
            | Ast::Function(_, c)
            | Ast::FunctionCall(_, c)
            | Ast::Rel(_, c) => c,
        }
    }

    fn children_mut(&mut self) -> &mut Vec<Ast> {
        match self {
            Ast::Real(_) | Ast::Integer(_) | Ast::Name(_) | Ast::NameTime | Ast::ConstantE => {
                unreachable!("leaf node has no children")
            }
            Ast::Plus(c)
            | Ast::Minus(c)
            | Ast::Times(c)
            | Ast::Divide(c)
            | Ast::Power(c)
            | Ast::FunctionPower(c)
            | Ast::Function(_, c)
            | Ast::FunctionCall(_, c)
            | Ast::Rel(_, c) => c,
        }
    }

    /// The left (first) child. Valid only on nodes with at least one child,
    /// which after `reduce_to_binary` is every operator node.
    pub fn left(&self) -> &Ast {
        &self.children()[0]
    }

    /// The right (second) child of a binary node.
    pub fn right(&self) -> &Ast {
        &self.children()[1]
    }

    /// The sole child of a unary function node.
    pub fn arg(&self) -> &Ast {
        &self.children()[0]
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Ast::Real(_) | Ast::Integer(_))
    }

    /// The numeric value of a `Real`/`Integer` leaf, or `None` otherwise.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Ast::Real(v) => Some(*v),
            Ast::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Does `Name(target)` occur anywhere in this subtree?
    pub fn contains_name(&self, target: &str) -> bool {
        match self {
            Ast::Name(n) => n == target,
            _ => self.children().iter().any(|c| c.contains_name(target)),
        }
    }

    /// Normalize every n-ary `Plus`/`Times` node to a left-leaning binary
    /// tree, recursively. Nodes that are already binary (every other
    /// operator tag, and unary function nodes) are left structurally
    /// alone but have their children reduced too.
    pub fn reduce_to_binary(&self) -> Ast {
        match self {
            Ast::Real(_) | Ast::Integer(_) | Ast::Name(_) | Ast::NameTime | Ast::ConstantE => {
                self.clone()
            }
            Ast::Plus(c) => reduce_nary(c, |a, b| Ast::Plus(vec![a, b])),
            Ast::Times(c) => reduce_nary(c, |a, b| Ast::Times(vec![a, b])),
            Ast::Minus(c) => Ast::Minus(reduce_children(c)),
            Ast::Divide(c) => Ast::Divide(reduce_children(c)),
            Ast::Power(c) => Ast::Power(reduce_children(c)),
            Ast::FunctionPower(c) => Ast::FunctionPower(reduce_children(c)),
            Ast::Function(f, c) => Ast::Function(*f, reduce_children(c)),
            Ast::FunctionCall(name, c) => Ast::FunctionCall(name.clone(), reduce_children(c)),
            Ast::Rel(op, c) => Ast::Rel(*op, reduce_children(c)),
        }
    }
}

fn reduce_children(children: &[Ast]) -> Vec<Ast> {
    children.iter().map(Ast::reduce_to_binary).collect()
}

/// Left-fold `children` (already reduced) into a binary tree using `join`.
/// A single child collapses to itself (matching the source's handling of
/// k==1 commutative-operator nodes).
fn reduce_nary(children: &[Ast], join: impl Fn(Ast, Ast) -> Ast) -> Ast {
    let mut reduced = reduce_children(children).into_iter();
    let mut acc = reduced.next().expect("operator node has at least one child");
    for child in reduced {
        acc = join(acc, child);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_nary_plus_left_leaning() {
        let ast = Ast::plus(vec![Ast::int(1), Ast::int(2), Ast::int(3)]);
        let bin = ast.reduce_to_binary();
        match &bin {
            Ast::Plus(c) => {
                assert_eq!(c.len(), 2);
                assert_eq!(c[1], Ast::int(3));
                match &c[0] {
                    Ast::Plus(inner) => {
                        assert_eq!(inner.len(), 2);
                        assert_eq!(inner[0], Ast::int(1));
                        assert_eq!(inner[1], Ast::int(2));
                    }
                    other => panic!("expected nested Plus, got {other:?}"),
                }
            }
            other => panic!("expected Plus, got {other:?}"),
        }
    }

    #[test]
    fn single_child_commutative_collapses() {
        let ast = Ast::plus(vec![Ast::name("x")]);
        assert_eq!(ast.reduce_to_binary(), Ast::name("x"));
    }

    #[test]
    fn contains_name_recurses() {
        let ast = Ast::times(vec![Ast::name("k"), Ast::name("A")]);
        assert!(ast.contains_name("A"));
        assert!(!ast.contains_name("B"));
    }
}

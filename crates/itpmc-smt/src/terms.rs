use std::collections::BTreeSet;
use std::fmt;

use crate::backends::smtlib_printer::to_smtlib;

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),
    Neg(Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn tt() -> Self {
        SmtTerm::BoolLit(true)
    }

    pub fn ff() -> Self {
        SmtTerm::BoolLit(false)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: SmtTerm) -> Self {
        SmtTerm::Mul(Box::new(self), Box::new(other))
    }

    pub fn neg(self) -> Self {
        SmtTerm::Neg(Box::new(self))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(false))
    }

    /// Conjunction that flattens nested `And`s and folds boolean constants.
    pub fn conj(terms: impl IntoIterator<Item = SmtTerm>) -> Self {
        let mut out = Vec::new();
        for term in terms {
            match term {
                SmtTerm::BoolLit(true) => {}
                SmtTerm::BoolLit(false) => return SmtTerm::ff(),
                SmtTerm::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::tt(),
            1 => out.pop().unwrap_or_else(SmtTerm::tt),
            _ => SmtTerm::And(out),
        }
    }

    /// Disjunction that flattens nested `Or`s and folds boolean constants.
    pub fn disj(terms: impl IntoIterator<Item = SmtTerm>) -> Self {
        let mut out = Vec::new();
        for term in terms {
            match term {
                SmtTerm::BoolLit(false) => {}
                SmtTerm::BoolLit(true) => return SmtTerm::tt(),
                SmtTerm::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::ff(),
            1 => out.pop().unwrap_or_else(SmtTerm::ff),
            _ => SmtTerm::Or(out),
        }
    }

    /// Negation that folds constants and double negation.
    pub fn negate(self) -> Self {
        match self {
            SmtTerm::BoolLit(b) => SmtTerm::BoolLit(!b),
            SmtTerm::Not(inner) => *inner,
            other => other.not(),
        }
    }

    /// Names of all variables occurring in the term.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            SmtTerm::Var(name) => {
                out.insert(name.clone());
            }
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => {}
            SmtTerm::Neg(inner) | SmtTerm::Not(inner) => inner.collect_vars(out),
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r)
            | SmtTerm::Implies(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            SmtTerm::And(terms) | SmtTerm::Or(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            SmtTerm::Ite(c, t, e) => {
                c.collect_vars(out);
                t.collect_vars(out);
                e.collect_vars(out);
            }
        }
    }

    /// Rebuild the term with every variable name passed through `rename`.
    pub fn rename_vars<F>(&self, rename: &F) -> SmtTerm
    where
        F: Fn(&str) -> String,
    {
        let bin = |l: &SmtTerm, r: &SmtTerm| {
            (
                Box::new(l.rename_vars(rename)),
                Box::new(r.rename_vars(rename)),
            )
        };
        match self {
            SmtTerm::Var(name) => SmtTerm::Var(rename(name)),
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => self.clone(),
            SmtTerm::Neg(inner) => SmtTerm::Neg(Box::new(inner.rename_vars(rename))),
            SmtTerm::Not(inner) => SmtTerm::Not(Box::new(inner.rename_vars(rename))),
            SmtTerm::Add(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Add(l, r)
            }
            SmtTerm::Sub(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Sub(l, r)
            }
            SmtTerm::Mul(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Mul(l, r)
            }
            SmtTerm::Eq(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Eq(l, r)
            }
            SmtTerm::Lt(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Lt(l, r)
            }
            SmtTerm::Le(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Le(l, r)
            }
            SmtTerm::Gt(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Gt(l, r)
            }
            SmtTerm::Ge(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Ge(l, r)
            }
            SmtTerm::Implies(l, r) => {
                let (l, r) = bin(l, r);
                SmtTerm::Implies(l, r)
            }
            SmtTerm::And(terms) => {
                SmtTerm::And(terms.iter().map(|t| t.rename_vars(rename)).collect())
            }
            SmtTerm::Or(terms) => SmtTerm::Or(terms.iter().map(|t| t.rename_vars(rename)).collect()),
            SmtTerm::Ite(c, t, e) => SmtTerm::Ite(
                Box::new(c.rename_vars(rename)),
                Box::new(t.rename_vars(rename)),
                Box::new(e.rename_vars(rename)),
            ),
        }
    }
}

impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_smtlib(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conj_folds_constants_and_flattens() {
        let x = SmtTerm::var("x").gt(SmtTerm::int(0));
        let y = SmtTerm::var("y").lt(SmtTerm::int(3));
        assert_eq!(SmtTerm::conj(vec![]), SmtTerm::tt());
        assert_eq!(SmtTerm::conj(vec![SmtTerm::tt(), x.clone()]), x);
        assert!(SmtTerm::conj(vec![x.clone(), SmtTerm::ff()]).is_false());
        let nested = SmtTerm::conj(vec![SmtTerm::And(vec![x.clone(), y.clone()]), x.clone()]);
        assert_eq!(nested, SmtTerm::And(vec![x.clone(), y, x]));
    }

    #[test]
    fn disj_folds_constants() {
        let x = SmtTerm::var("x").gt(SmtTerm::int(0));
        assert_eq!(SmtTerm::disj(vec![]), SmtTerm::ff());
        assert_eq!(SmtTerm::disj(vec![SmtTerm::ff(), x.clone()]), x);
        assert!(SmtTerm::disj(vec![x, SmtTerm::tt()]).is_true());
    }

    #[test]
    fn negate_removes_double_negation() {
        let x = SmtTerm::var("b");
        assert_eq!(x.clone().not().negate(), x);
        assert_eq!(SmtTerm::tt().negate(), SmtTerm::ff());
    }

    #[test]
    fn free_vars_and_renaming() {
        let term = SmtTerm::ite(
            SmtTerm::var("c"),
            SmtTerm::var("x").add(SmtTerm::int(1)),
            SmtTerm::var("y"),
        )
        .eq(SmtTerm::var("x"));
        let vars: Vec<String> = term.free_vars().into_iter().collect();
        assert_eq!(vars, vec!["c", "x", "y"]);

        let renamed = term.rename_vars(&|n: &str| format!("{n}@1"));
        let vars: Vec<String> = renamed.free_vars().into_iter().collect();
        assert_eq!(vars, vec!["c@1", "x@1", "y@1"]);
    }
}

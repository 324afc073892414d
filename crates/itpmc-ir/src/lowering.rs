use indexmap::IndexMap;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use itpmc_dsl::ast;
use itpmc_smt::sorts::SmtSort;
use itpmc_smt::terms::SmtTerm;

use crate::cfa::{Cfa, Edge, Location, Update, UpdateValue, Variable};
use crate::loops::loop_heads;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoweringError {
    #[error("Unknown variable '{0}' in expression")]
    UnknownVariable(String),
    #[error("Unknown location '{0}'")]
    UnknownLocation(String),
    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: Ty,
        found: Ty,
    },
    #[error("Empty range for variable '{0}': {1}..{2}")]
    EmptyRange(String, i64, i64),
    #[error("Program has no initial location")]
    NoInitialLocation,
    #[error("Program has more than one initial location: {0} and {1}")]
    MultipleInitialLocations(String, String),
}

/// Expression types of the surface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Bool,
    Int,
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
        }
    }
}

/// A lowering error enriched with source span information for pretty-printed diagnostics.
#[derive(Debug, Error, Diagnostic)]
#[error("{inner}")]
#[diagnostic(code(itpmc::lower))]
pub struct SpannedLoweringError {
    #[source_code]
    pub src: NamedSource<String>,
    pub inner: LoweringError,
    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl SpannedLoweringError {
    fn new(err: LoweringError, source: &str, filename: &str, span: Option<ast::Span>) -> Self {
        Self {
            src: NamedSource::new(filename, source.to_string()),
            inner: err,
            span: span.map(|s| SourceSpan::new(s.start.into(), s.end.saturating_sub(s.start).into())),
        }
    }
}

type LowerResult<T> = Result<T, (LoweringError, Option<ast::Span>)>;

/// Lower an AST Program into a control-flow automaton.
pub fn lower(program: &ast::Program) -> Result<Cfa, LoweringError> {
    lower_spanned(program).map_err(|(err, _)| err)
}

/// Like [`lower`], with source-span diagnostics for CLI rendering.
pub fn lower_with_source(
    program: &ast::Program,
    source: &str,
    filename: &str,
) -> Result<Cfa, SpannedLoweringError> {
    lower_spanned(program).map_err(|(err, span)| SpannedLoweringError::new(err, source, filename, span))
}

fn lower_spanned(program: &ast::Program) -> LowerResult<Cfa> {
    let mut variables = Vec::with_capacity(program.vars.len());
    let mut types: IndexMap<String, Ty> = IndexMap::new();
    for decl in &program.vars {
        let sort = match decl.node.ty {
            ast::VarType::Bool => SmtSort::Bool,
            ast::VarType::Range { lo, hi } if lo > hi => {
                return Err((
                    LoweringError::EmptyRange(decl.node.name.clone(), lo, hi),
                    Some(decl.span),
                ));
            }
            ast::VarType::Range { lo, hi } => SmtSort::Range(lo, hi),
        };
        types.insert(
            decl.node.name.clone(),
            if sort.is_bool() { Ty::Bool } else { Ty::Int },
        );
        variables.push(Variable {
            name: decl.node.name.clone(),
            sort,
        });
    }
    let scope = Scope { types: &types };

    let mut init_parts = Vec::with_capacity(program.init.len());
    for init in &program.init {
        let term = scope
            .expect_ty(&init.node, Ty::Bool, "init constraint")
            .map_err(|e| (e, Some(init.span)))?;
        init_parts.push(term);
    }

    let locations: Vec<Location> = program
        .locations
        .iter()
        .map(|l| Location {
            name: l.node.name.clone(),
            is_error: l.node.error,
        })
        .collect();
    let mut initial: Option<usize> = None;
    for (id, loc) in program.locations.iter().enumerate() {
        if loc.node.initial {
            if let Some(prev) = initial {
                return Err((
                    LoweringError::MultipleInitialLocations(
                        locations[prev].name.clone(),
                        loc.node.name.clone(),
                    ),
                    Some(loc.span),
                ));
            }
            initial = Some(id);
        }
    }
    let initial = initial.ok_or((LoweringError::NoInitialLocation, Some(program.span)))?;

    let location_id = |name: &str, span: ast::Span| {
        locations
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| (LoweringError::UnknownLocation(name.to_string()), Some(span)))
    };

    let mut edges = Vec::with_capacity(program.edges.len());
    for edge in &program.edges {
        let from = location_id(&edge.node.from, edge.span)?;
        let to = location_id(&edge.node.to, edge.span)?;
        let guard = match &edge.node.guard {
            Some(g) => scope
                .expect_ty(&g.node, Ty::Bool, "edge guard")
                .map_err(|e| (e, Some(g.span)))?,
            None => SmtTerm::tt(),
        };
        let mut updates = Vec::with_capacity(edge.node.updates.len());
        for update in &edge.node.updates {
            let var = &update.node.var;
            let ty = *types
                .get(var)
                .ok_or_else(|| (LoweringError::UnknownVariable(var.clone()), Some(update.span)))?;
            let value = match &update.node.value {
                ast::AssignValue::Havoc => UpdateValue::Havoc,
                ast::AssignValue::Expr(e) => UpdateValue::Assign(
                    scope
                        .expect_ty(e, ty, &format!("assignment to '{var}'"))
                        .map_err(|err| (err, Some(update.span)))?,
                ),
            };
            updates.push(Update {
                var: var.clone(),
                value,
            });
        }
        edges.push(Edge {
            from,
            to,
            guard,
            updates,
        });
    }

    let loop_heads = loop_heads(&locations, &edges, initial);
    Ok(Cfa {
        name: program.name.clone(),
        variables,
        locations,
        edges,
        initial,
        init: SmtTerm::conj(init_parts),
        loop_heads,
    })
}

struct Scope<'a> {
    types: &'a IndexMap<String, Ty>,
}

impl Scope<'_> {
    fn expect_ty(&self, expr: &ast::Expr, ty: Ty, context: &str) -> Result<SmtTerm, LoweringError> {
        let (term, found) = self.lower_expr(expr, context)?;
        if found != ty {
            return Err(LoweringError::TypeMismatch {
                context: context.to_string(),
                expected: ty,
                found,
            });
        }
        Ok(term)
    }

    fn lower_expr(&self, expr: &ast::Expr, context: &str) -> Result<(SmtTerm, Ty), LoweringError> {
        use ast::Expr;
        let int = |e: &Expr| self.expect_ty(e, Ty::Int, context);
        let boolean = |e: &Expr| self.expect_ty(e, Ty::Bool, context);
        Ok(match expr {
            Expr::IntLit(n) => (SmtTerm::int(*n), Ty::Int),
            Expr::BoolLit(b) => (SmtTerm::bool(*b), Ty::Bool),
            Expr::Var(name) => {
                let ty = self
                    .types
                    .get(name)
                    .ok_or_else(|| LoweringError::UnknownVariable(name.clone()))?;
                (SmtTerm::var(name.clone()), *ty)
            }
            Expr::Add(l, r) => (int(l)?.add(int(r)?), Ty::Int),
            Expr::Sub(l, r) => (int(l)?.sub(int(r)?), Ty::Int),
            Expr::Mul(l, r) => (int(l)?.mul(int(r)?), Ty::Int),
            Expr::Neg(e) => (int(e)?.neg(), Ty::Int),
            Expr::Not(e) => (boolean(e)?.not(), Ty::Bool),
            Expr::And(l, r) => (SmtTerm::and(vec![boolean(l)?, boolean(r)?]), Ty::Bool),
            Expr::Or(l, r) => (SmtTerm::or(vec![boolean(l)?, boolean(r)?]), Ty::Bool),
            Expr::Cmp(op, l, r) => {
                let (lt, lty) = self.lower_expr(l, context)?;
                let rt = self.expect_ty(r, lty, context)?;
                let term = match op {
                    ast::CmpOp::Eq => lt.eq(rt),
                    ast::CmpOp::Ne => lt.eq(rt).not(),
                    _ if lty == Ty::Bool => {
                        return Err(LoweringError::TypeMismatch {
                            context: format!("{context} (operator {op})"),
                            expected: Ty::Int,
                            found: Ty::Bool,
                        })
                    }
                    ast::CmpOp::Lt => lt.lt(rt),
                    ast::CmpOp::Le => lt.le(rt),
                    ast::CmpOp::Gt => lt.gt(rt),
                    ast::CmpOp::Ge => lt.ge(rt),
                };
                (term, Ty::Bool)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn lower_src(src: &str) -> Result<Cfa, LoweringError> {
        let program = itpmc_dsl::parse(src, "test.imc").expect("test source parses");
        lower(&program)
    }

    #[test]
    fn lower_counter_loop() -> TestResult {
        let cfa = lower_src(
            r#"program counter {
                var x: 0..15;
                init x == 0;
                location start initial;
                location head;
                location err error;
                edge start -> head;
                edge head -> head when x < 10 do x := x + 1;
                edge head -> err when x > 10;
            }"#,
        )?;
        assert_eq!(cfa.initial, 0);
        assert_eq!(cfa.loop_heads.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(cfa.var_sorts().get("x"), Some(&SmtSort::Range(0, 15)));
        assert_eq!(cfa.init, SmtTerm::var("x").eq(SmtTerm::int(0)));
        assert_eq!(cfa.edges[1].updates.len(), 1);
        assert!(cfa.is_error(2));
        Ok(())
    }

    #[test]
    fn not_equal_lowers_to_negated_equality() -> TestResult {
        let cfa = lower_src("program p { var b: bool; init b != true; location a initial; }")?;
        assert_eq!(cfa.init, SmtTerm::var("b").eq(SmtTerm::bool(true)).not());
        Ok(())
    }

    #[test]
    fn type_errors_are_reported() {
        let err = lower_src("program p { var x: 0..3; init x + 1; location a initial; }");
        assert!(matches!(err, Err(LoweringError::TypeMismatch { .. })));

        let err = lower_src("program p { var b: bool; init b < true; location a initial; }");
        assert!(matches!(err, Err(LoweringError::TypeMismatch { .. })));

        let err = lower_src(
            "program p { var x: 0..3; location a initial; edge a -> a do x := true; }",
        );
        assert!(matches!(err, Err(LoweringError::TypeMismatch { .. })));
    }

    #[test]
    fn structural_errors_are_reported() {
        assert_eq!(
            lower_src("program p { location a; }"),
            Err(LoweringError::NoInitialLocation)
        );
        assert_eq!(
            lower_src("program p { location a initial; location b initial; }"),
            Err(LoweringError::MultipleInitialLocations("a".into(), "b".into()))
        );
        assert_eq!(
            lower_src("program p { location a initial; edge a -> nowhere; }"),
            Err(LoweringError::UnknownLocation("nowhere".into()))
        );
        assert_eq!(
            lower_src("program p { var x: 3..1; location a initial; }"),
            Err(LoweringError::EmptyRange("x".into(), 3, 1))
        );
        assert_eq!(
            lower_src("program p { location a initial; edge a -> a when y > 0; }"),
            Err(LoweringError::UnknownVariable("y".into()))
        );
    }

    #[test]
    fn spanned_errors_point_at_the_edge() {
        let src = "program p { location a initial; edge a -> nowhere; }";
        let program = itpmc_dsl::parse(src, "p.imc").expect("parse");
        let err = lower_with_source(&program, src, "p.imc").expect_err("must fail");
        let span = err.span.expect("span");
        assert_eq!(&src[span.offset()..span.offset() + span.len()], "edge a -> nowhere;");
    }
}

#![allow(clippy::result_large_err)]

use std::collections::HashSet;

use pest::iterators::Pairs;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct ProgramParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

/// Source text and file name, attached to every error.
struct Ctx<'s> {
    source: &'s str,
    filename: &'s str,
}

impl Ctx<'_> {
    fn syntax(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::syntax(message, span, self.source, self.filename)
    }

    fn duplicate(&self, name: &str, span: Span) -> ParseError {
        ParseError::duplicate(name, span, self.source, self.filename)
    }

    /// Next child of a node whose shape the grammar guarantees.
    fn next<'a>(
        &self,
        inner: &mut Pairs<'a, Rule>,
        parent: Span,
        what: &str,
    ) -> Result<Pair<'a>, ParseError> {
        inner
            .next()
            .ok_or_else(|| self.syntax(format!("expected {what}"), parent))
    }
}

/// Parse a `.imc` source file into an AST Program.
pub fn parse(source: &str, filename: &str) -> Result<Program, ParseError> {
    let ctx = Ctx { source, filename };
    let mut pairs = ProgramParser::parse(Rule::program, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::syntax(format!("{e}"), Span::new(start, end), source, filename)
    })?;
    let whole = Span::new(0, source.len());
    let program_pair = ctx.next(&mut pairs, whole, "program")?;
    parse_program(&ctx, program_pair)
}

fn parse_program(ctx: &Ctx<'_>, pair: Pair<'_>) -> Result<Program, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = ctx.next(&mut inner, span, "program name")?.as_str().to_string();

    let mut program = Program {
        name,
        vars: Vec::new(),
        init: Vec::new(),
        locations: Vec::new(),
        edges: Vec::new(),
        span,
    };
    let mut names: HashSet<String> = HashSet::new();

    for item in inner {
        let item_span = span_from(&item);
        match item.as_rule() {
            Rule::var_decl => {
                let decl = parse_var_decl(ctx, item)?;
                if !names.insert(decl.node.name.clone()) {
                    return Err(ctx.duplicate(&decl.node.name, item_span));
                }
                program.vars.push(decl);
            }
            Rule::init_decl => {
                let mut parts = item.into_inner();
                let expr = parse_expr(ctx, ctx.next(&mut parts, item_span, "expression")?)?;
                program.init.push(Spanned::new(expr, item_span));
            }
            Rule::location_decl => {
                let decl = parse_location(ctx, item)?;
                if !names.insert(decl.node.name.clone()) {
                    return Err(ctx.duplicate(&decl.node.name, item_span));
                }
                program.locations.push(decl);
            }
            Rule::edge_decl => program.edges.push(parse_edge(ctx, item)?),
            Rule::EOI => {}
            other => {
                return Err(ctx.syntax(format!("unexpected {other:?}"), item_span));
            }
        }
    }
    Ok(program)
}

fn parse_signed(ctx: &Ctx<'_>, pair: &Pair<'_>) -> Result<i64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|e| ctx.syntax(format!("Invalid integer literal: {e}"), span_from(pair)))
}

fn parse_var_decl(ctx: &Ctx<'_>, pair: Pair<'_>) -> Result<Spanned<VarDecl>, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = ctx.next(&mut inner, span, "variable name")?.as_str().to_string();
    let ty_pair = ctx.next(&mut inner, span, "variable type")?;
    let ty = match ty_pair.as_rule() {
        Rule::bool_type => VarType::Bool,
        _ => {
            let ty_span = span_from(&ty_pair);
            let mut bounds = ty_pair.into_inner();
            let lo = parse_signed(ctx, &ctx.next(&mut bounds, ty_span, "lower bound")?)?;
            let hi = parse_signed(ctx, &ctx.next(&mut bounds, ty_span, "upper bound")?)?;
            VarType::Range { lo, hi }
        }
    };
    Ok(Spanned::new(VarDecl { name, ty }, span))
}

fn parse_location(ctx: &Ctx<'_>, pair: Pair<'_>) -> Result<Spanned<LocationDecl>, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = ctx.next(&mut inner, span, "location name")?.as_str().to_string();
    let mut decl = LocationDecl {
        name,
        initial: false,
        error: false,
    };
    for flag in inner {
        match flag.as_str() {
            "initial" => decl.initial = true,
            _ => decl.error = true,
        }
    }
    Ok(Spanned::new(decl, span))
}

fn parse_edge(ctx: &Ctx<'_>, pair: Pair<'_>) -> Result<Spanned<EdgeDecl>, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let from = ctx.next(&mut inner, span, "source location")?.as_str().to_string();
    let to = ctx.next(&mut inner, span, "target location")?.as_str().to_string();
    let mut edge = EdgeDecl {
        from,
        to,
        guard: None,
        updates: Vec::new(),
    };
    for clause in inner {
        let clause_span = span_from(&clause);
        match clause.as_rule() {
            Rule::guard_clause => {
                let mut parts = clause.into_inner();
                let expr = parse_expr(ctx, ctx.next(&mut parts, clause_span, "guard")?)?;
                edge.guard = Some(Spanned::new(expr, clause_span));
            }
            _ => {
                let mut assigned = HashSet::new();
                for assignment in clause.into_inner() {
                    let a_span = span_from(&assignment);
                    let mut parts = assignment.into_inner();
                    let var = ctx.next(&mut parts, a_span, "assigned variable")?.as_str().to_string();
                    if !assigned.insert(var.clone()) {
                        return Err(ctx.duplicate(&var, a_span));
                    }
                    let rhs = ctx.next(&mut parts, a_span, "assigned value")?;
                    let value = match rhs.as_rule() {
                        Rule::havoc => AssignValue::Havoc,
                        _ => AssignValue::Expr(parse_expr(ctx, rhs)?),
                    };
                    edge.updates.push(Spanned::new(Assignment { var, value }, a_span));
                }
            }
        }
    }
    Ok(Spanned::new(edge, span))
}

fn parse_cmp_op(pair: &Pair<'_>) -> CmpOp {
    match pair.as_str() {
        ">=" => CmpOp::Ge,
        "<=" => CmpOp::Le,
        ">" => CmpOp::Gt,
        "<" => CmpOp::Lt,
        "!=" => CmpOp::Ne,
        _ => CmpOp::Eq,
    }
}

fn parse_expr(ctx: &Ctx<'_>, pair: Pair<'_>) -> Result<Expr, ParseError> {
    let span = span_from(&pair);
    match pair.as_rule() {
        Rule::expr | Rule::and_expr | Rule::product => {
            let rule = pair.as_rule();
            let mut inner = pair.into_inner();
            let mut result = parse_expr(ctx, ctx.next(&mut inner, span, "operand")?)?;
            for rhs in inner {
                let rhs = Box::new(parse_expr(ctx, rhs)?);
                let lhs = Box::new(result);
                result = match rule {
                    Rule::expr => Expr::Or(lhs, rhs),
                    Rule::and_expr => Expr::And(lhs, rhs),
                    _ => Expr::Mul(lhs, rhs),
                };
            }
            Ok(result)
        }
        Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let lhs = parse_expr(ctx, ctx.next(&mut inner, span, "operand")?)?;
            match inner.next() {
                Some(op) => {
                    let op = parse_cmp_op(&op);
                    let rhs = parse_expr(ctx, ctx.next(&mut inner, span, "operand")?)?;
                    Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
                }
                None => Ok(lhs),
            }
        }
        Rule::sum => {
            let mut inner = pair.into_inner();
            let mut result = parse_expr(ctx, ctx.next(&mut inner, span, "operand")?)?;
            while let Some(op_pair) = inner.next() {
                let rhs = parse_expr(ctx, ctx.next(&mut inner, span, "operand")?)?;
                result = match op_pair.as_str() {
                    "-" => Expr::Sub(Box::new(result), Box::new(rhs)),
                    _ => Expr::Add(Box::new(result), Box::new(rhs)),
                };
            }
            Ok(result)
        }
        Rule::unary => {
            let inner: Vec<_> = pair.into_inner().collect();
            let Some((operand, ops)) = inner.split_last() else {
                return Err(ctx.syntax("empty unary expression", span));
            };
            let mut result = parse_expr(ctx, operand.clone())?;
            for op in ops.iter().rev() {
                result = match op.as_rule() {
                    Rule::not_op => Expr::Not(Box::new(result)),
                    _ => match result {
                        // negated literals stay literals
                        Expr::IntLit(n) => Expr::IntLit(-n),
                        other => Expr::Neg(Box::new(other)),
                    },
                };
            }
            Ok(result)
        }
        Rule::int_literal => {
            let n: i64 = pair
                .as_str()
                .parse()
                .map_err(|e| ctx.syntax(format!("Invalid integer literal: {e}"), span))?;
            Ok(Expr::IntLit(n))
        }
        Rule::bool_literal => Ok(Expr::BoolLit(pair.as_str() == "true")),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        other => Err(ctx.syntax(format!("unexpected {other:?} in expression"), span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const COUNTER: &str = r#"
program counter {
  var x: 0..15;
  var done: bool;
  init x == 0 && !done;
  location start initial;
  location head;
  location exit;
  location err error;
  edge start -> head;
  edge head -> head when x < 10 do x := x + 1;
  edge head -> exit when x >= 10 do done := true;
  edge exit -> err when x > 10; // unreachable
}
"#;

    #[test]
    fn parse_counter_program() -> TestResult {
        let prog = parse(COUNTER, "counter.imc")?;
        assert_eq!(prog.name, "counter");
        assert_eq!(prog.vars.len(), 2);
        assert_eq!(prog.vars[0].node.ty, VarType::Range { lo: 0, hi: 15 });
        assert_eq!(prog.vars[1].node.ty, VarType::Bool);
        assert_eq!(prog.init.len(), 1);
        assert_eq!(prog.locations.len(), 4);
        assert!(prog.locations[0].node.initial);
        assert!(prog.locations[3].node.error);
        assert_eq!(prog.edges.len(), 4);
        assert!(prog.edges[0].node.guard.is_none());
        assert_eq!(prog.edges[1].node.updates.len(), 1);
        Ok(())
    }

    #[test]
    fn operator_precedence() -> TestResult {
        let src = "program p { var x: 0..3; init x + 1 * 2 < 3 || x == 0 && !(x > 1); }";
        let prog = parse(src, "p.imc")?;
        assert_eq!(
            prog.init[0].node.to_string(),
            "(((x + (1 * 2)) < 3) || ((x == 0) && !(x > 1)))"
        );
        Ok(())
    }

    #[test]
    fn negative_bounds_and_literals() -> TestResult {
        let src = "program p { var x: -5..-1; init x == -3 && -x > 0; }";
        let prog = parse(src, "p.imc")?;
        assert_eq!(prog.vars[0].node.ty, VarType::Range { lo: -5, hi: -1 });
        assert_eq!(prog.init[0].node.to_string(), "((x == -3) && (-x > 0))");
        Ok(())
    }

    #[test]
    fn havoc_and_simultaneous_updates() -> TestResult {
        let src = r#"program p {
            var x: 0..3; var y: 0..3;
            location a initial; location b;
            edge a -> b do x := y, y := *;
        }"#;
        let prog = parse(src, "p.imc")?;
        let updates = &prog.edges[0].node.updates;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].node.value, AssignValue::Expr(Expr::Var("y".into())));
        assert_eq!(updates[1].node.value, AssignValue::Havoc);
        Ok(())
    }

    #[test]
    fn identifiers_may_start_with_keywords() -> TestResult {
        let src = "program p { var done: bool; var errors: 0..1; init !done && errors == 0; }";
        let prog = parse(src, "p.imc")?;
        assert_eq!(prog.vars[0].node.name, "done");
        assert_eq!(prog.vars[1].node.name, "errors");
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let src = "program p { var x: 0..3; location x; }";
        assert!(matches!(
            parse(src, "p.imc"),
            Err(ParseError::Duplicate { ref name, .. }) if name == "x"
        ));

        let src = "program p { var x: 0..3; location a initial; edge a -> a do x := 1, x := 2; }";
        assert!(matches!(
            parse(src, "p.imc"),
            Err(ParseError::Duplicate { .. })
        ));
    }

    #[test]
    fn syntax_errors_carry_spans() {
        let src = "program p { var x 0..3; }";
        match parse(src, "p.imc") {
            Err(ParseError::Syntax { span, .. }) => assert!(span.offset() >= 16),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert!(parse("program p { var when: bool; }", "p.imc").is_err());
    }
}

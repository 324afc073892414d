use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Quote symbols that are not simple SMT-LIB identifiers (e.g. `x@3`).
pub fn symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.$".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => symbol(name),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                format!("(- {})", n.unsigned_abs())
            } else {
                n.to_string()
            }
        }
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::Add(lhs, rhs) => format!("(+ {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Sub(lhs, rhs) => format!("(- {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Mul(lhs, rhs) => format!("(* {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Neg(inner) => format!("(- {})", to_smtlib(inner)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Lt(lhs, rhs) => format!("(< {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Le(lhs, rhs) => format!("(<= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Gt(lhs, rhs) => format!("(> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ge(lhs, rhs) => format!("(>= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::And(terms) => match terms.as_slice() {
            [] => "true".to_string(),
            [single] => to_smtlib(single),
            _ => {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(and {})", inner.join(" "))
            }
        },
        SmtTerm::Or(terms) => match terms.as_slice() {
            [] => "false".to_string(),
            [single] => to_smtlib(single),
            _ => {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(or {})", inner.join(" "))
            }
        },
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => {
            format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Ite(cond, then, els) => {
            format!(
                "(ite {} {} {})",
                to_smtlib(cond),
                to_smtlib(then),
                to_smtlib(els)
            )
        }
    }
}

/// Print a sort as SMT-LIB2 format. Ranges are integers plus a side condition.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int | SmtSort::Range(..) => "Int",
    }
}

/// Side condition constraining a variable to its declared range, if any.
pub fn range_constraint(name: &str, sort: &SmtSort) -> Option<SmtTerm> {
    match sort {
        SmtSort::Range(lo, hi) => Some(SmtTerm::and(vec![
            SmtTerm::int(*lo).le(SmtTerm::var(name)),
            SmtTerm::var(name).le(SmtTerm::int(*hi)),
        ])),
        SmtSort::Bool | SmtSort::Int => None,
    }
}

/// Render a self-contained `check-sat` script.
pub fn script(label: &str, declarations: &[(String, SmtSort)], assertions: &[SmtTerm]) -> String {
    let mut out = String::new();
    out.push_str(&format!("; {label}\n(set-logic QF_LIA)\n"));
    for (name, sort) in declarations {
        out.push_str(&format!(
            "(declare-fun {} () {})\n",
            symbol(name),
            sort_to_smtlib(sort)
        ));
        if let Some(range) = range_constraint(name, sort) {
            out.push_str(&format!("(assert {})\n", to_smtlib(&range)));
        }
    }
    for term in assertions {
        out.push_str(&format!("(assert {})\n", to_smtlib(term)));
    }
    out.push_str("(check-sat)\n(exit)\n");
    out
}

#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(itpmc::parse::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Duplicate definition: {name}")]
    #[diagnostic(
        code(itpmc::parse::duplicate),
        help("variable and location names must be unique within a program")
    )]
    Duplicate {
        name: String,
        #[label("duplicate")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

fn source_span(span: Span) -> miette::SourceSpan {
    (span.start, span.end.saturating_sub(span.start)).into()
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: source_span(span),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }

    pub fn duplicate(name: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Duplicate {
            name: name.into(),
            span: source_span(span),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_syntax_error() {
        let err = ParseError::syntax("unexpected EOF", Span::new(0, 5), "hello", "test.imc");
        assert_eq!(err.to_string(), "Syntax error: unexpected EOF");
    }

    #[test]
    fn syntax_constructor_converts_span() {
        let err = ParseError::syntax("bad token", Span::new(5, 10), "some source code", "f.imc");
        match &err {
            ParseError::Syntax { span, src, .. } => {
                assert_eq!(span.offset(), 5);
                assert_eq!(span.len(), 5);
                assert_eq!(src.name(), "f.imc");
            }
            _ => panic!("expected Syntax variant"),
        }
    }

    #[test]
    fn display_duplicate_error() {
        let err = ParseError::duplicate("head", Span::new(0, 4), "head", "test.imc");
        assert_eq!(err.to_string(), "Duplicate definition: head");
    }
}

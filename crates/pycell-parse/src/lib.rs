//! Fragment parsing backed by `rustpython-parser`.
//!
//! A fragment is parsed as a full module. [`split_tail`] then separates the
//! final top-level statement when its value can be captured (a bare
//! expression or a simple/annotated assignment), so the executor can run the
//! body normally and evaluate the tail on its own.

mod depth;
mod split;

pub use depth::{MAX_NESTING, nesting_depth};
pub use rustpython_parser::ast;
pub use split::{ParsedFragment, Tail, split_tail};

use pycell_common::ExecError;
use rustpython_parser::Parse;
use rustpython_parser::text_size::TextRange;

pub type Stmt = ast::Stmt<TextRange>;
pub type Expr = ast::Expr<TextRange>;

/// Parse `source` into top-level statements.
///
/// Line endings are normalized first; the reported syntax-error line is
/// 1-based. Programs nested deeper than [`MAX_NESTING`] fail with
/// `RecursionError`.
pub fn parse_program(source: &str, source_path: &str) -> Result<Vec<Stmt>, ExecError> {
    let normalized = normalize(source);
    let stmts = ast::Suite::parse(&normalized, source_path).map_err(|err| {
        let offset = u32::from(err.offset) as usize;
        let line = line_of(&normalized, offset);
        ExecError::syntax(err.error.to_string(), line)
    })?;
    let depth = nesting_depth(&stmts);
    if depth > MAX_NESTING {
        depth::discard(stmts, depth);
        return Err(ExecError::runtime(
            "RecursionError",
            "maximum recursion depth exceeded during compilation",
        ));
    }
    Ok(stmts)
}

/// Parse and split in one step.
pub fn parse_fragment(source: &str, source_path: &str) -> Result<ParsedFragment, ExecError> {
    parse_program(source, source_path).map(split_tail)
}

fn normalize(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n")
}

fn line_of(source: &str, offset: usize) -> u32 {
    let end = offset.min(source.len());
    let prefix = source.get(..end).unwrap_or(source);
    prefix.matches('\n').count() as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_statement_program() {
        let stmts = parse_program("x = 1\ny = x + 1\ny\n", "<cell>").unwrap();
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = parse_program("x = 1\ny = (\n", "<cell>").unwrap_err();
        assert!(err.is_syntax());
        match err {
            ExecError::Syntax { line, .. } => assert!(line >= 2, "line={line}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn windows_line_endings_are_accepted() {
        let stmts = parse_program("a = 1\r\nb = 2\r\n", "<cell>").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn deeply_nested_programs_are_refused() {
        let chain = vec!["1"; 20_000].join(" + ");
        let err = parse_program(&chain, "<cell>").unwrap_err();
        assert_eq!(err.exception_name(), "RecursionError");

        let nested = format!("{}0{}", "[".repeat(MAX_NESTING + 5), "]".repeat(MAX_NESTING + 5));
        assert!(parse_program(&nested, "<cell>").is_err());

        let within = vec!["1"; 500].join(" + ");
        assert_eq!(parse_program(&within, "<cell>").unwrap().len(), 1);
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        assert!(parse_program("", "<cell>").unwrap().is_empty());
        assert!(parse_program("# only a comment\n", "<cell>").unwrap().is_empty());
    }
}

use crate::{Expr, Stmt, ast};

/// Final statement separated from the body so its value can be captured.
#[derive(Debug, Clone, PartialEq)]
pub enum Tail {
    /// `expr`
    Expr(Expr),
    /// `a = b = expr`, `x, y = expr`, `d["k"] = expr`
    Assign { targets: Vec<Expr>, value: Expr },
    /// `x: T = expr`
    AnnAssign { target: Expr, value: Expr },
}

impl Tail {
    /// The expression whose value becomes the fragment result.
    pub fn value_expr(&self) -> &Expr {
        match self {
            Tail::Expr(e) => e,
            Tail::Assign { value, .. } | Tail::AnnAssign { value, .. } => value,
        }
    }

    /// Dotted name of the called function when the tail is a call on a
    /// name chain, e.g. `plt.show` for `plt.show()`.
    pub fn call_path(&self) -> Option<String> {
        match self.value_expr() {
            ast::Expr::Call(call) => dotted(&call.func),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFragment {
    pub body: Vec<Stmt>,
    pub tail: Option<Tail>,
}

impl ParsedFragment {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.tail.is_none()
    }
}

/// Split off the last top-level statement when it is capturable.
pub fn split_tail(mut stmts: Vec<Stmt>) -> ParsedFragment {
    let tail = match stmts.pop() {
        Some(ast::Stmt::Expr(stmt)) => Some(Tail::Expr(*stmt.value)),
        Some(ast::Stmt::Assign(stmt)) => Some(Tail::Assign {
            targets: stmt.targets,
            value: *stmt.value,
        }),
        Some(ast::Stmt::AnnAssign(stmt)) => match stmt.value {
            Some(value) => Some(Tail::AnnAssign {
                target: *stmt.target,
                value: *value,
            }),
            None => {
                stmts.push(ast::Stmt::AnnAssign(stmt));
                None
            }
        },
        Some(other) => {
            stmts.push(other);
            None
        }
        None => None,
    };
    ParsedFragment { body: stmts, tail }
}

fn dotted(expr: &Expr) -> Option<String> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str().to_string()),
        ast::Expr::Attribute(attr) => {
            dotted(&attr.value).map(|base| format!("{base}.{}", attr.attr.as_str()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_fragment;

    #[test]
    fn bare_expression_is_split() {
        let f = parse_fragment("x = 1\nx + 1", "<t>").unwrap();
        assert_eq!(f.body.len(), 1);
        assert!(matches!(f.tail, Some(Tail::Expr(_))));
    }

    #[test]
    fn assignment_is_split_with_targets() {
        let f = parse_fragment("a = b = 3", "<t>").unwrap();
        assert!(f.body.is_empty());
        match f.tail {
            Some(Tail::Assign { targets, .. }) => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn annotated_assignment_without_value_stays_in_body() {
        let f = parse_fragment("x: int", "<t>").unwrap();
        assert_eq!(f.body.len(), 1);
        assert!(f.tail.is_none());
        let f = parse_fragment("x: int = 4", "<t>").unwrap();
        assert!(matches!(f.tail, Some(Tail::AnnAssign { .. })));
    }

    #[test]
    fn compound_tail_is_not_split() {
        let f = parse_fragment("for i in range(3):\n    pass\n", "<t>").unwrap();
        assert_eq!(f.body.len(), 1);
        assert!(f.tail.is_none());
        let f = parse_fragment("x += 1", "<t>").unwrap();
        assert!(f.tail.is_none());
    }

    #[test]
    fn call_path_of_tail() {
        let f = parse_fragment("import matplotlib.pyplot as plt\nplt.show()", "<t>").unwrap();
        assert_eq!(f.tail.unwrap().call_path().as_deref(), Some("plt.show"));
    }
}

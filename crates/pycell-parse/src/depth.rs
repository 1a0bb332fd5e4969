//! Nesting depth of a parsed program.
//!
//! Trees deeper than [`MAX_NESTING`] are refused before the executor walks
//! them. Measuring and discarding such a tree both recurse, so both run on
//! stack segments grown on demand.

use crate::{Expr, Stmt, ast};

/// Deepest statement/expression nesting a fragment may have.
pub const MAX_NESTING: usize = 1000;

const RED_ZONE: usize = 64 * 1024;
const SEGMENT: usize = 1024 * 1024;
/// Upper bound on the stack one tree level takes while being dropped.
const DROP_FRAME: usize = 1024;

pub fn nesting_depth(stmts: &[Stmt]) -> usize {
    stmts.iter().map(stmt_depth).max().unwrap_or(0)
}

/// Drop a tree of known `depth` without touching the caller's stack.
pub(crate) fn discard(stmts: Vec<Stmt>, depth: usize) {
    let size = depth.saturating_mul(DROP_FRAME).max(SEGMENT);
    stacker::grow(size, move || drop(stmts));
}

fn stmt_depth(stmt: &Stmt) -> usize {
    stacker::maybe_grow(RED_ZONE, SEGMENT, || {
        let mut exprs: Vec<&Expr> = Vec::new();
        let mut blocks: Vec<&[Stmt]> = Vec::new();
        match stmt {
            ast::Stmt::FunctionDef(s) => {
                exprs.extend(&s.decorator_list);
                arguments(&s.args, &mut exprs);
                blocks.push(&s.body);
            }
            ast::Stmt::ClassDef(s) => {
                exprs.extend(&s.decorator_list);
                exprs.extend(&s.bases);
                exprs.extend(s.keywords.iter().map(|k| &k.value));
                blocks.push(&s.body);
            }
            ast::Stmt::Return(s) => exprs.extend(s.value.as_deref()),
            ast::Stmt::Delete(s) => exprs.extend(&s.targets),
            ast::Stmt::Assign(s) => {
                exprs.extend(&s.targets);
                exprs.push(&s.value);
            }
            ast::Stmt::AugAssign(s) => {
                exprs.push(&s.target);
                exprs.push(&s.value);
            }
            ast::Stmt::AnnAssign(s) => {
                exprs.push(&s.target);
                exprs.extend(s.value.as_deref());
            }
            ast::Stmt::For(s) => {
                exprs.push(&s.target);
                exprs.push(&s.iter);
                blocks.push(&s.body);
                blocks.push(&s.orelse);
            }
            ast::Stmt::While(s) => {
                exprs.push(&s.test);
                blocks.push(&s.body);
                blocks.push(&s.orelse);
            }
            ast::Stmt::If(s) => {
                exprs.push(&s.test);
                blocks.push(&s.body);
                blocks.push(&s.orelse);
            }
            ast::Stmt::With(s) => {
                for item in &s.items {
                    exprs.push(&item.context_expr);
                    exprs.extend(item.optional_vars.as_deref());
                }
                blocks.push(&s.body);
            }
            ast::Stmt::Raise(s) => {
                exprs.extend(s.exc.as_deref());
                exprs.extend(s.cause.as_deref());
            }
            ast::Stmt::Try(s) => {
                blocks.push(&s.body);
                blocks.push(&s.orelse);
                blocks.push(&s.finalbody);
                for handler in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    exprs.extend(h.type_.as_deref());
                    blocks.push(&h.body);
                }
            }
            ast::Stmt::Assert(s) => {
                exprs.push(&s.test);
                exprs.extend(s.msg.as_deref());
            }
            ast::Stmt::Expr(s) => exprs.push(&s.value),
            _ => {}
        }
        let deepest_expr = exprs.into_iter().map(expr_depth).max().unwrap_or(0);
        let deepest_block = blocks.into_iter().map(nesting_depth).max().unwrap_or(0);
        1 + deepest_expr.max(deepest_block)
    })
}

fn expr_depth(expr: &Expr) -> usize {
    stacker::maybe_grow(RED_ZONE, SEGMENT, || {
        let mut children: Vec<&Expr> = Vec::new();
        match expr {
            ast::Expr::BoolOp(e) => children.extend(&e.values),
            ast::Expr::NamedExpr(e) => {
                children.push(&e.target);
                children.push(&e.value);
            }
            ast::Expr::BinOp(e) => {
                children.push(&e.left);
                children.push(&e.right);
            }
            ast::Expr::UnaryOp(e) => children.push(&e.operand),
            ast::Expr::Lambda(e) => {
                arguments(&e.args, &mut children);
                children.push(&e.body);
            }
            ast::Expr::IfExp(e) => {
                children.push(&e.test);
                children.push(&e.body);
                children.push(&e.orelse);
            }
            ast::Expr::Dict(e) => {
                children.extend(e.keys.iter().flatten());
                children.extend(&e.values);
            }
            ast::Expr::Set(e) => children.extend(&e.elts),
            ast::Expr::ListComp(e) => {
                children.push(&e.elt);
                comprehensions(&e.generators, &mut children);
            }
            ast::Expr::SetComp(e) => {
                children.push(&e.elt);
                comprehensions(&e.generators, &mut children);
            }
            ast::Expr::GeneratorExp(e) => {
                children.push(&e.elt);
                comprehensions(&e.generators, &mut children);
            }
            ast::Expr::DictComp(e) => {
                children.push(&e.key);
                children.push(&e.value);
                comprehensions(&e.generators, &mut children);
            }
            ast::Expr::Await(e) => children.push(&e.value),
            ast::Expr::Yield(e) => children.extend(e.value.as_deref()),
            ast::Expr::YieldFrom(e) => children.push(&e.value),
            ast::Expr::Compare(e) => {
                children.push(&e.left);
                children.extend(&e.comparators);
            }
            ast::Expr::Call(e) => {
                children.push(&e.func);
                children.extend(&e.args);
                children.extend(e.keywords.iter().map(|k| &k.value));
            }
            ast::Expr::FormattedValue(e) => {
                children.push(&e.value);
                children.extend(e.format_spec.as_deref());
            }
            ast::Expr::JoinedStr(e) => children.extend(&e.values),
            ast::Expr::Attribute(e) => children.push(&e.value),
            ast::Expr::Subscript(e) => {
                children.push(&e.value);
                children.push(&e.slice);
            }
            ast::Expr::Starred(e) => children.push(&e.value),
            ast::Expr::List(e) => children.extend(&e.elts),
            ast::Expr::Tuple(e) => children.extend(&e.elts),
            ast::Expr::Slice(e) => {
                children.extend(e.lower.as_deref());
                children.extend(e.upper.as_deref());
                children.extend(e.step.as_deref());
            }
            ast::Expr::Constant(_) | ast::Expr::Name(_) => {}
        }
        1 + children.into_iter().map(expr_depth).max().unwrap_or(0)
    })
}

fn arguments<'t>(args: &'t ast::Arguments, out: &mut Vec<&'t Expr>) {
    for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
        out.extend(arg.default.as_deref());
    }
}

fn comprehensions<'t>(generators: &'t [ast::Comprehension], out: &mut Vec<&'t Expr>) {
    for generator in generators {
        out.push(&generator.target);
        out.push(&generator.iter);
        out.extend(&generator.ifs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_program;

    #[test]
    fn depth_counts_blocks_and_expressions() {
        let stmts = parse_program("x = 1", "<cell>").unwrap();
        assert_eq!(nesting_depth(&stmts), 2);
        let stmts = parse_program("if a:\n    y = (1 + 2) * 3", "<cell>").unwrap();
        assert_eq!(nesting_depth(&stmts), 5);
        assert_eq!(nesting_depth(&[]), 0);
    }

    #[test]
    fn flat_operator_chains_nest_to_the_left() {
        let chain = vec!["1"; 50].join(" + ");
        let stmts = parse_program(&chain, "<cell>").unwrap();
        assert_eq!(nesting_depth(&stmts), 51);
    }
}

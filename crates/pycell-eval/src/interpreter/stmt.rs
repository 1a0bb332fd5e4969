use std::rc::Rc;

use pycell_common::{ExecError, Value};
use pycell_parse::{Expr, Stmt, ast};

use super::{Flow, FunctionBody, Interpreter, RED_ZONE, STACK_SEGMENT, items, objects, ops};
use crate::builtins::ExceptionClass;

fn statement_kind(stmt: &Stmt) -> &'static str {
    match stmt {
        ast::Stmt::AsyncWith(_) => "async with statements",
        ast::Stmt::Match(_) => "match statements",
        ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::AsyncFor(_) => "async code",
        ast::Stmt::Nonlocal(_) => "nonlocal declarations",
        ast::Stmt::TryStar(_) => "except* clauses",
        _ => "this statement",
    }
}

impl<'a> Interpreter<'a> {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ExecError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ExecError> {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || self.exec_node(stmt))
    }

    fn exec_node(&mut self, stmt: &Stmt) -> Result<Flow, ExecError> {
        match stmt {
            ast::Stmt::Expr(s) => {
                self.eval_expr(&s.value)?;
            }
            ast::Stmt::Assign(s) => {
                let value = self.eval_expr(&s.value)?;
                for target in &s.targets {
                    self.assign_target(target, value.clone())?;
                }
            }
            ast::Stmt::AnnAssign(s) => {
                if let Some(value) = &s.value {
                    let value = self.eval_expr(value)?;
                    self.assign_target(&s.target, value)?;
                }
            }
            ast::Stmt::AugAssign(s) => self.aug_assign(&s.target, s.op, &s.value)?,
            ast::Stmt::If(s) => {
                let branch = if self.eval_expr(&s.test)?.is_truthy() {
                    &s.body
                } else {
                    &s.orelse
                };
                return self.exec_block(branch);
            }
            ast::Stmt::While(s) => {
                while self.eval_expr(&s.test)?.is_truthy() {
                    match self.exec_block(&s.body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(&s.orelse);
            }
            ast::Stmt::For(s) => {
                let iterable = self.eval_expr(&s.iter)?;
                for item in items::iterate(&iterable)? {
                    self.assign_target(&s.target, item)?;
                    match self.exec_block(&s.body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(&s.orelse);
            }
            ast::Stmt::FunctionDef(s) => {
                if !s.decorator_list.is_empty() {
                    return Err(ExecError::not_supported("decorators"));
                }
                let func = self.make_function(
                    s.name.as_str(),
                    &s.args,
                    FunctionBody::Block(Rc::new(s.body.clone())),
                )?;
                self.store(s.name.as_str(), func);
            }
            ast::Stmt::ClassDef(s) => {
                let class = self.make_class(s)?;
                self.store(s.name.as_str(), class);
            }
            ast::Stmt::With(s) => return self.exec_with(&s.items, &s.body),
            ast::Stmt::Return(s) => {
                let value = match &s.value {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            ast::Stmt::Delete(s) => {
                for target in &s.targets {
                    self.delete_target(target)?;
                }
            }
            ast::Stmt::Pass(_) => {}
            ast::Stmt::Break(_) => return Ok(Flow::Break),
            ast::Stmt::Continue(_) => return Ok(Flow::Continue),
            ast::Stmt::Import(s) => {
                for alias in &s.names {
                    self.import_alias(alias)?;
                }
            }
            ast::Stmt::ImportFrom(s) => self.import_from(s)?,
            ast::Stmt::Raise(s) => return Err(self.raised(s)?),
            ast::Stmt::Assert(s) => {
                if !self.eval_expr(&s.test)?.is_truthy() {
                    let message = match &s.msg {
                        Some(m) => self.eval_expr(m)?.to_string(),
                        None => String::new(),
                    };
                    return Err(ExecError::runtime("AssertionError", message));
                }
            }
            ast::Stmt::Try(s) => return self.exec_try(s),
            ast::Stmt::Global(s) => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope
                        .globals
                        .extend(s.names.iter().map(|n| n.as_str().to_string()));
                }
            }
            other => return Err(ExecError::not_supported(statement_kind(other))),
        }
        Ok(Flow::Normal)
    }

    /* ─────────────────────── assignment ─────────────────────── */

    pub(crate) fn assign_target(&mut self, target: &Expr, value: Value) -> Result<(), ExecError> {
        match target {
            ast::Expr::Name(n) => {
                self.store(n.id.as_str(), value);
                Ok(())
            }
            ast::Expr::Tuple(t) => self.unpack(&t.elts, value),
            ast::Expr::List(l) => self.unpack(&l.elts, value),
            ast::Expr::Subscript(s) => {
                if matches!(s.slice.as_ref(), ast::Expr::Slice(_)) {
                    return Err(ExecError::not_supported("slice assignment"));
                }
                let index = self.eval_expr(&s.slice)?;
                let mut pending = Some(value);
                self.with_place(
                    &s.value,
                    &mut |_: &mut Interpreter<'a>, container: &mut Value| {
                        items::set_item(
                            container,
                            index.clone(),
                            pending.take().unwrap_or(Value::None),
                        )?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            ast::Expr::Attribute(a) => {
                let attr = a.attr.as_str();
                let mut pending = Some(value);
                self.with_place(
                    &a.value,
                    &mut |_: &mut Interpreter<'a>, object: &mut Value| {
                        objects::set_attr(object, attr, pending.take().unwrap_or(Value::None))?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            _ => Err(ExecError::syntax("cannot assign to expression", 1)),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value) -> Result<(), ExecError> {
        let values = items::iterate(&value)?;
        let star = targets
            .iter()
            .position(|t| matches!(t, ast::Expr::Starred(_)));
        match star {
            None => {
                if values.len() < targets.len() {
                    return Err(ExecError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        values.len()
                    )));
                }
                if values.len() > targets.len() {
                    return Err(ExecError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (t, v) in targets.iter().zip(values) {
                    self.assign_target(t, v)?;
                }
            }
            Some(at) => {
                let after = targets.len() - at - 1;
                if values.len() < at + after {
                    return Err(ExecError::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        at + after,
                        values.len()
                    )));
                }
                let mut values = values;
                let tail = values.split_off(values.len() - after);
                let middle = values.split_off(at);
                for (t, v) in targets[..at].iter().zip(values) {
                    self.assign_target(t, v)?;
                }
                if let ast::Expr::Starred(s) = &targets[at] {
                    self.assign_target(&s.value, Value::list(middle))?;
                }
                for (t, v) in targets[at + 1..].iter().zip(tail) {
                    self.assign_target(t, v)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(&mut self, target: &Expr, op: ast::Operator, value: &Expr) -> Result<(), ExecError> {
        match target {
            ast::Expr::Name(n) => {
                let current = self.load(n.id.as_str())?;
                let rhs = self.eval_expr(value)?;
                let updated = ops::binary_op(op, &current, &rhs)?;
                self.store(n.id.as_str(), updated);
                Ok(())
            }
            ast::Expr::Subscript(s) if !matches!(s.slice.as_ref(), ast::Expr::Slice(_)) => {
                let index = self.eval_expr(&s.slice)?;
                let rhs = self.eval_expr(value)?;
                self.with_place(
                    &s.value,
                    &mut |_: &mut Interpreter<'a>, container: &mut Value| {
                        let current = items::get_item(container, &index)?;
                        let updated = ops::binary_op(op, &current, &rhs)?;
                        items::set_item(container, index.clone(), updated)?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            ast::Expr::Attribute(a) => {
                let attr = a.attr.as_str();
                let rhs = self.eval_expr(value)?;
                self.with_place(
                    &a.value,
                    &mut |_: &mut Interpreter<'a>, object: &mut Value| {
                        let current = objects::attribute(object, attr)?;
                        let updated = ops::binary_op(op, &current, &rhs)?;
                        objects::set_attr(object, attr, updated)?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            _ => Err(ExecError::syntax(
                "illegal expression for augmented assignment",
                1,
            )),
        }
    }

    fn delete_target(&mut self, target: &Expr) -> Result<(), ExecError> {
        match target {
            ast::Expr::Name(n) => self.delete_name(n.id.as_str()),
            ast::Expr::Tuple(t) => t.elts.iter().try_for_each(|e| self.delete_target(e)),
            ast::Expr::List(l) => l.elts.iter().try_for_each(|e| self.delete_target(e)),
            ast::Expr::Subscript(s) if !matches!(s.slice.as_ref(), ast::Expr::Slice(_)) => {
                let index = self.eval_expr(&s.slice)?;
                self.with_place(
                    &s.value,
                    &mut |_: &mut Interpreter<'a>, container: &mut Value| {
                        items::del_item(container, &index)?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            ast::Expr::Attribute(a) => {
                let attr = a.attr.as_str();
                self.with_place(
                    &a.value,
                    &mut |_: &mut Interpreter<'a>, object: &mut Value| {
                        objects::del_attr(object, attr)?;
                        Ok(Value::None)
                    },
                )?;
                Ok(())
            }
            _ => Err(ExecError::syntax("cannot delete expression", 1)),
        }
    }

    /* ───────────────────────── imports ───────────────────────── */

    fn import_alias(&mut self, alias: &ast::Alias) -> Result<(), ExecError> {
        let name = alias.name.as_str();
        match &alias.asname {
            Some(asname) => {
                let module = self.import(name)?;
                self.store(asname.as_str(), module);
            }
            None => {
                self.import(name)?;
                let top = name.split('.').next().unwrap_or(name);
                let module = self.import(top)?;
                self.store(top, module);
            }
        }
        Ok(())
    }

    fn import_from(&mut self, s: &ast::StmtImportFrom) -> Result<(), ExecError> {
        let Some(module_name) = s.module.as_ref().map(|m| m.as_str().to_string()) else {
            return Err(ExecError::not_supported("relative imports"));
        };
        let Value::Module(module) = self.import(&module_name)? else {
            return Err(ExecError::runtime(
                "ImportError",
                format!("'{module_name}' is not a module"),
            ));
        };
        for alias in &s.names {
            let name = alias.name.as_str();
            if name == "*" {
                for (k, v) in module.attrs.iter().filter(|(k, _)| !k.starts_with('_')) {
                    self.store(k, v.clone());
                }
                continue;
            }
            let value = match module.get(name) {
                Some(v) => v.clone(),
                None => self
                    .import(&format!("{module_name}.{name}"))
                    .map_err(|_| {
                        ExecError::runtime(
                            "ImportError",
                            format!("cannot import name '{name}' from '{module_name}'"),
                        )
                    })?,
            };
            let bound = alias.asname.as_ref().map(|a| a.as_str()).unwrap_or(name);
            self.store(bound, value);
        }
        Ok(())
    }

    /* ─────────────────────── exceptions ─────────────────────── */

    fn raised(&mut self, s: &ast::StmtRaise) -> Result<ExecError, ExecError> {
        let Some(exc) = &s.exc else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                ExecError::runtime("RuntimeError", "No active exception to reraise")
            }));
        };
        match self.eval_expr(exc)? {
            Value::Error(err) => Ok(err.as_ref().clone()),
            Value::Callable(c) => match c.as_any().downcast_ref::<ExceptionClass>() {
                Some(class) => Ok(class.error(String::new())),
                None => Err(ExecError::type_error(
                    "exceptions must derive from BaseException",
                )),
            },
            Value::Class(class) if class.exception_base().is_some() => {
                Ok(ExecError::runtime(class.name.clone(), String::new()))
            }
            _ => Err(ExecError::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }

    fn exec_try(&mut self, s: &ast::StmtTry) -> Result<Flow, ExecError> {
        let outcome = match self.exec_block(&s.body) {
            Ok(Flow::Normal) => self.exec_block(&s.orelse),
            Ok(flow) => Ok(flow),
            Err(err) => self.handle(&s.handlers, err),
        };
        if !s.finalbody.is_empty() {
            match self.exec_block(&s.finalbody)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn handle(&mut self, handlers: &[ast::ExceptHandler], err: ExecError) -> Result<Flow, ExecError> {
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(h) = handler;
            let matched = match &h.type_ {
                None => true,
                Some(t) => {
                    let class = self.eval_expr(t)?;
                    self.exception_matches(&class, &err)?
                }
            };
            if !matched {
                continue;
            }
            if let Some(name) = &h.name {
                self.store(name.as_str(), Value::error(err.clone()));
            }
            self.handling.push(err);
            let result = self.exec_block(&h.body);
            self.handling.pop();
            return result;
        }
        Err(err)
    }

    fn exception_matches(&self, class: &Value, err: &ExecError) -> Result<bool, ExecError> {
        match class {
            Value::Tuple(classes) => {
                for c in classes.iter() {
                    if self.exception_matches(c, err)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Callable(c) => match c.as_any().downcast_ref::<ExceptionClass>() {
                Some(class) => Ok(self
                    .exception_lineage(err)
                    .iter()
                    .any(|name| class.catches(name))),
                None => Err(not_an_exception()),
            },
            Value::Class(class) if class.exception_base().is_some() => Ok(self
                .exception_lineage(err)
                .iter()
                .any(|name| *name == class.name)),
            _ => Err(not_an_exception()),
        }
    }
}

fn not_an_exception() -> ExecError {
    ExecError::type_error("catching classes that do not inherit from BaseException is not allowed")
}

use std::rc::Rc;

use pycell_common::{Dict, ExecError, Set, Value};
use pycell_parse::{Expr, ast};

use super::{FunctionBody, Interpreter, RED_ZONE, STACK_SEGMENT, items, objects, ops};
use crate::args::CallArgs;
use crate::builtins::{format, methods};

type Emit<'e, 'a> = dyn FnMut(&mut Interpreter<'a>) -> Result<(), ExecError> + 'e;

pub(crate) fn constant(c: &ast::Constant) -> Result<Value, ExecError> {
    Ok(match c {
        ast::Constant::None => Value::None,
        ast::Constant::Bool(b) => Value::Bool(*b),
        ast::Constant::Str(s) => Value::str(s),
        ast::Constant::Int(i) => Value::Int(
            i.to_string()
                .parse::<i64>()
                .map_err(|_| ExecError::overflow())?,
        ),
        ast::Constant::Float(f) => Value::Float(*f),
        ast::Constant::Tuple(items) => {
            Value::tuple(items.iter().map(constant).collect::<Result<Vec<_>, _>>()?)
        }
        ast::Constant::Bytes(_) => return Err(ExecError::not_supported("bytes literals")),
        ast::Constant::Complex { .. } => return Err(ExecError::not_supported("complex numbers")),
        ast::Constant::Ellipsis => return Err(ExecError::not_supported("Ellipsis")),
    })
}

impl<'a> Interpreter<'a> {
    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || self.eval_node(expr))
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        match expr {
            ast::Expr::Constant(c) => constant(&c.value),
            ast::Expr::Name(n) => self.load(n.id.as_str()),
            ast::Expr::BinOp(b) => {
                let left = self.eval_expr(&b.left)?;
                let right = self.eval_expr(&b.right)?;
                ops::binary_op(b.op, &left, &right)
            }
            ast::Expr::UnaryOp(u) => {
                let v = self.eval_expr(&u.operand)?;
                ops::unary_op(u.op, &v)
            }
            ast::Expr::BoolOp(b) => {
                let mut last = Value::None;
                for e in &b.values {
                    last = self.eval_expr(e)?;
                    match (b.op, last.is_truthy()) {
                        (ast::BoolOp::And, false) | (ast::BoolOp::Or, true) => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            ast::Expr::Compare(c) => {
                let mut left = self.eval_expr(&c.left)?;
                let mut result = Value::Bool(true);
                for (op, right_expr) in c.ops.iter().zip(&c.comparators) {
                    let right = self.eval_expr(right_expr)?;
                    result = ops::compare(*op, &left, &right)?;
                    if !matches!(result, Value::Series(_)) && !result.is_truthy() {
                        return Ok(result);
                    }
                    left = right;
                }
                Ok(result)
            }
            ast::Expr::IfExp(e) => {
                if self.eval_expr(&e.test)?.is_truthy() {
                    self.eval_expr(&e.body)
                } else {
                    self.eval_expr(&e.orelse)
                }
            }
            ast::Expr::NamedExpr(n) => {
                let value = self.eval_expr(&n.value)?;
                self.assign_target(&n.target, value.clone())?;
                Ok(value)
            }
            ast::Expr::List(l) => Ok(Value::list(self.eval_elements(&l.elts)?)),
            ast::Expr::Tuple(t) => Ok(Value::tuple(self.eval_elements(&t.elts)?)),
            ast::Expr::Dict(d) => self.eval_dict(&d.keys, &d.values),
            ast::Expr::Set(s) => {
                let mut set = Set::new();
                for item in self.eval_elements(&s.elts)? {
                    items::hashable(&item)?;
                    set.insert(item);
                }
                Ok(Value::set(set))
            }
            ast::Expr::SetComp(c) => {
                let mut set = Set::new();
                self.comprehension(&c.generators, &mut |interp: &mut Interpreter<'a>| {
                    let item = interp.eval_expr(&c.elt)?;
                    items::hashable(&item)?;
                    set.insert(item);
                    Ok(())
                })?;
                Ok(Value::set(set))
            }
            ast::Expr::Subscript(s) => self.eval_subscript(s),
            ast::Expr::Attribute(a) => {
                let v = self.eval_expr(&a.value)?;
                objects::attribute(&v, a.attr.as_str())
            }
            ast::Expr::Call(c) => self.eval_call(c),
            ast::Expr::Lambda(l) => self.make_function(
                "<lambda>",
                &l.args,
                FunctionBody::Expr(Rc::new(l.body.as_ref().clone())),
            ),
            ast::Expr::ListComp(c) => {
                let mut out = Vec::new();
                self.comprehension(&c.generators, &mut |interp: &mut Interpreter<'a>| {
                    out.push(interp.eval_expr(&c.elt)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            ast::Expr::GeneratorExp(c) => {
                let mut out = Vec::new();
                self.comprehension(&c.generators, &mut |interp: &mut Interpreter<'a>| {
                    out.push(interp.eval_expr(&c.elt)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            ast::Expr::DictComp(c) => {
                let mut out = Dict::new();
                self.comprehension(&c.generators, &mut |interp: &mut Interpreter<'a>| {
                    let key = interp.eval_expr(&c.key)?;
                    items::hashable(&key)?;
                    let value = interp.eval_expr(&c.value)?;
                    out.insert(key, value);
                    Ok(())
                })?;
                Ok(Value::dict(out))
            }
            ast::Expr::JoinedStr(j) => self.eval_fstring(&j.values),
            ast::Expr::FormattedValue(f) => self.formatted(f).map(Value::str),
            ast::Expr::Starred(_) => Err(ExecError::syntax(
                "can't use starred expression here",
                1,
            )),
            ast::Expr::Slice(_) => Err(ExecError::type_error("slice outside a subscript")),
            ast::Expr::Await(_) | ast::Expr::Yield(_) | ast::Expr::YieldFrom(_) => {
                Err(ExecError::not_supported("generators and coroutines"))
            }
        }
    }

    fn eval_elements(&mut self, elts: &[Expr]) -> Result<Vec<Value>, ExecError> {
        let mut out = Vec::with_capacity(elts.len());
        for e in elts {
            if let ast::Expr::Starred(s) = e {
                let v = self.eval_expr(&s.value)?;
                out.extend(items::iterate(&v)?);
            } else {
                out.push(self.eval_expr(e)?);
            }
        }
        Ok(out)
    }

    fn eval_dict(&mut self, keys: &[Option<Expr>], values: &[Expr]) -> Result<Value, ExecError> {
        let mut dict = Dict::new();
        for (key, value) in keys.iter().zip(values) {
            match key {
                Some(k) => {
                    let k = self.eval_expr(k)?;
                    items::hashable(&k)?;
                    let v = self.eval_expr(value)?;
                    dict.insert(k, v);
                }
                None => match self.eval_expr(value)? {
                    Value::Dict(other) => {
                        for (k, v) in other.iter() {
                            dict.insert(k.clone(), v.clone());
                        }
                    }
                    other => {
                        return Err(ExecError::type_error(format!(
                            "'{}' object is not a mapping",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        Ok(Value::dict(dict))
    }

    fn slice_bound(&mut self, bound: &Option<Box<Expr>>) -> Result<Option<i64>, ExecError> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval_expr(expr)? {
            Value::None => Ok(None),
            v => v.as_i64().map(Some).ok_or_else(|| {
                ExecError::type_error("slice indices must be integers or None")
            }),
        }
    }

    fn eval_subscript(&mut self, sub: &ast::ExprSubscript) -> Result<Value, ExecError> {
        let container = self.eval_expr(&sub.value)?;
        if let ast::Expr::Slice(slice) = sub.slice.as_ref() {
            let lower = self.slice_bound(&slice.lower)?;
            let upper = self.slice_bound(&slice.upper)?;
            let step = self.slice_bound(&slice.step)?;
            return items::get_slice(&container, lower, upper, step);
        }
        let index = self.eval_expr(&sub.slice)?;
        items::get_item(&container, &index)
    }

    pub(crate) fn eval_args(&mut self, call: &ast::ExprCall) -> Result<CallArgs, ExecError> {
        let mut args = CallArgs::default();
        for a in &call.args {
            if let ast::Expr::Starred(s) = a {
                let v = self.eval_expr(&s.value)?;
                args.positional.extend(items::iterate(&v)?);
            } else {
                args.positional.push(self.eval_expr(a)?);
            }
        }
        for kw in &call.keywords {
            let value = self.eval_expr(&kw.value)?;
            match &kw.arg {
                Some(name) => args.keywords.push((name.as_str().to_string(), value)),
                None => match value {
                    Value::Dict(d) => {
                        for (k, v) in d.iter() {
                            let k = k
                                .as_str()
                                .ok_or_else(|| ExecError::type_error("keywords must be strings"))?;
                            args.keywords.push((k.to_string(), v.clone()));
                        }
                    }
                    other => {
                        return Err(ExecError::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        Ok(args)
    }

    fn eval_call(&mut self, call: &ast::ExprCall) -> Result<Value, ExecError> {
        let ast::Expr::Attribute(attr) = call.func.as_ref() else {
            let func = self.eval_expr(&call.func)?;
            let args = self.eval_args(call)?;
            return self.call(&func, args);
        };
        let method = attr.attr.as_str();
        if objects::is_super_call(&attr.value) {
            let args = self.eval_args(call)?;
            return self.call_super(method, args);
        }
        let receiver = self.eval_expr(&attr.value)?;
        if let Value::Module(module) = &receiver {
            let func = module.get(method).cloned().ok_or_else(|| {
                ExecError::runtime(
                    "AttributeError",
                    format!("module '{}' has no attribute '{method}'", module.name),
                )
            })?;
            let args = self.eval_args(call)?;
            return self.call(&func, args);
        }
        let args = self.eval_args(call)?;
        if let Some((owner, func)) = objects::bound_method(&receiver, method) {
            drop(receiver);
            let mut pending = Some(args);
            return self.with_place(
                &attr.value,
                &mut |interp: &mut Interpreter<'a>, recv: &mut Value| {
                    interp.call_bound(recv, owner.clone(), &func, pending.take().unwrap_or_default())
                },
            );
        }
        if matches!(receiver, Value::Instance(_) | Value::Class(_)) {
            let func = objects::attribute(&receiver, method)?;
            return self.call(&func, args);
        }
        if methods::mutates(&receiver, method) {
            // The receiver clone must go before the write so the place holds
            // the only reference.
            drop(receiver);
            let mut pending = Some(args);
            return self.with_place(
                &attr.value,
                &mut |interp: &mut Interpreter<'a>, recv: &mut Value| {
                    methods::call_method(interp, recv, method, pending.take().unwrap_or_default())
                },
            );
        }
        let mut receiver = receiver;
        methods::call_method(self, &mut receiver, method, args)
    }

    fn comprehension(
        &mut self,
        generators: &[ast::Comprehension],
        emit: &mut Emit<'_, 'a>,
    ) -> Result<(), ExecError> {
        self.in_comprehension(|interp| interp.comprehension_level(generators, emit))
    }

    fn comprehension_level(
        &mut self,
        generators: &[ast::Comprehension],
        emit: &mut Emit<'_, 'a>,
    ) -> Result<(), ExecError> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self);
        };
        if first.is_async {
            return Err(ExecError::not_supported("async comprehensions"));
        }
        let iterable = self.eval_expr(&first.iter)?;
        'items: for item in items::iterate(&iterable)? {
            self.assign_target(&first.target, item)?;
            for cond in &first.ifs {
                if !self.eval_expr(cond)?.is_truthy() {
                    continue 'items;
                }
            }
            self.comprehension_level(rest, emit)?;
        }
        Ok(())
    }

    fn eval_fstring(&mut self, parts: &[Expr]) -> Result<Value, ExecError> {
        let mut out = String::new();
        for part in parts {
            match part {
                ast::Expr::Constant(c) => {
                    if let ast::Constant::Str(s) = &c.value {
                        out.push_str(s);
                    }
                }
                ast::Expr::FormattedValue(f) => out.push_str(&self.formatted(f)?),
                other => {
                    let value = self.eval_expr(other)?;
                    out.push_str(&self.str_of(&value)?);
                }
            }
        }
        Ok(Value::str(out))
    }

    fn formatted(&mut self, f: &ast::ExprFormattedValue) -> Result<String, ExecError> {
        let value = self.eval_expr(&f.value)?;
        let value = match f.conversion {
            ast::ConversionFlag::Repr => Value::str(self.repr_of(&value)?),
            ast::ConversionFlag::Str | ast::ConversionFlag::Ascii => Value::str(self.str_of(&value)?),
            ast::ConversionFlag::None if matches!(value, Value::Instance(_)) => {
                Value::str(self.str_of(&value)?)
            }
            ast::ConversionFlag::None => value,
        };
        let spec = match &f.format_spec {
            Some(spec) => self.eval_expr(spec)?.to_string(),
            None => String::new(),
        };
        format::format_value(&value, &spec)
    }
}

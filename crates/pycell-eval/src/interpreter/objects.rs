//! Classes defined by fragments, their instances and the protocols built on
//! them (`with`, `super()`, `__str__`).
//!
//! Objects have the same copy-on-write value semantics as lists: a method
//! runs on the receiver's storage and its final `self` is written back to
//! the place the call came through.

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use pycell_common::{Callable, Class, ExecError, Instance, Value};
use pycell_parse::{Expr, Stmt, ast};

use super::{Flow, Interpreter, Owner, Scope, UserFunction};
use crate::args::CallArgs;
use crate::builtins::{ExceptionClass, exception_message, methods};

/// A method read off an instance without being called.
///
/// Calling it runs on a copy of the receiver taken at lookup time.
#[derive(Debug)]
pub struct BoundMethod {
    receiver: Value,
    owner: Rc<Class>,
    func: Value,
    name: String,
}

impl Callable for BoundMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn user_function(value: &Value) -> Option<&UserFunction> {
    match value {
        Value::Callable(c) => c.as_any().downcast_ref::<UserFunction>(),
        _ => None,
    }
}

fn defining_class(class: &Rc<Class>, attr: &str) -> Option<Rc<Class>> {
    if class.attrs.contains_key(attr) {
        return Some(class.clone());
    }
    class.bases.iter().find_map(|base| defining_class(base, attr))
}

/// A function found on `class` or its bases, with the class defining it.
pub(crate) fn method_of(class: &Rc<Class>, attr: &str) -> Option<(Rc<Class>, Value)> {
    let owner = defining_class(class, attr)?;
    let func = owner.attrs.get(attr).filter(|v| user_function(v).is_some())?.clone();
    Some((owner, func))
}

/// The class method `receiver.method(...)` dispatches to, unless the
/// instance shadows it with an attribute of its own.
pub(crate) fn bound_method(receiver: &Value, method: &str) -> Option<(Rc<Class>, Value)> {
    match receiver {
        Value::Instance(obj) if !obj.attrs.contains_key(method) => method_of(&obj.class, method),
        _ => None,
    }
}

pub(crate) fn is_super_call(expr: &Expr) -> bool {
    matches!(
        expr,
        ast::Expr::Call(c) if c.args.is_empty()
            && c.keywords.is_empty()
            && matches!(c.func.as_ref(), ast::Expr::Name(n) if n.id.as_str() == "super")
    )
}

/// `value.attr` for every runtime value.
pub(crate) fn attribute(value: &Value, attr: &str) -> Result<Value, ExecError> {
    match value {
        Value::Instance(obj) => {
            if attr == "__class__" {
                return Ok(Value::Class(obj.class.clone()));
            }
            if let Some(own) = obj.attrs.get(attr) {
                return Ok(own.clone());
            }
            if let Some((owner, func)) = method_of(&obj.class, attr) {
                return Ok(Value::Callable(Rc::new(BoundMethod {
                    receiver: value.clone(),
                    owner,
                    func,
                    name: attr.to_string(),
                })));
            }
            obj.class
                .lookup(attr)
                .cloned()
                .ok_or_else(|| ExecError::attribute_error(&obj.class.name, attr))
        }
        Value::Class(class) => match attr {
            "__name__" => Ok(Value::str(&class.name)),
            _ => class.lookup(attr).cloned().ok_or_else(|| {
                ExecError::runtime(
                    "AttributeError",
                    format!("type object '{}' has no attribute '{attr}'", class.name),
                )
            }),
        },
        other => methods::get_attribute(other, attr),
    }
}

/// Writable slot of `attr`. An instance updating an attribute it inherits
/// from its class gets its own copy first.
pub(crate) fn attr_slot<'v>(object: &'v mut Value, attr: &str) -> Option<&'v mut Value> {
    match object {
        Value::Instance(obj) => {
            if !obj.attrs.contains_key(attr) {
                let inherited = obj.class.lookup(attr)?.clone();
                if matches!(inherited, Value::Callable(_)) {
                    return None;
                }
                Rc::make_mut(obj).attrs.insert(attr.to_string(), inherited);
            }
            Rc::make_mut(obj).attrs.get_mut(attr)
        }
        Value::Class(class) if class.attrs.contains_key(attr) => {
            Rc::make_mut(class).attrs.get_mut(attr)
        }
        _ => None,
    }
}

pub(crate) fn set_attr(object: &mut Value, attr: &str, value: Value) -> Result<(), ExecError> {
    match object {
        Value::Instance(obj) => {
            Rc::make_mut(obj).attrs.insert(attr.to_string(), value);
            Ok(())
        }
        Value::Class(class) => {
            Rc::make_mut(class).attrs.insert(attr.to_string(), value);
            Ok(())
        }
        other => Err(ExecError::attribute_error(other.type_name(), attr)),
    }
}

pub(crate) fn del_attr(object: &mut Value, attr: &str) -> Result<(), ExecError> {
    let removed = match object {
        Value::Instance(obj) if obj.attrs.contains_key(attr) => {
            Rc::make_mut(obj).attrs.remove(attr)
        }
        Value::Class(class) if class.attrs.contains_key(attr) => {
            Rc::make_mut(class).attrs.remove(attr)
        }
        _ => None,
    };
    removed
        .map(|_| ())
        .ok_or_else(|| ExecError::attribute_error(object.type_name(), attr))
}

fn protocol_error(value: &Value) -> ExecError {
    let name = match value {
        Value::Instance(obj) => obj.class.name.clone(),
        other => other.type_name().to_string(),
    };
    ExecError::type_error(format!(
        "'{name}' object does not support the context manager protocol"
    ))
}

impl<'a> Interpreter<'a> {
    pub(crate) fn make_class(&mut self, def: &ast::StmtClassDef) -> Result<Value, ExecError> {
        if !def.decorator_list.is_empty() {
            return Err(ExecError::not_supported("class decorators"));
        }
        if !def.keywords.is_empty() {
            return Err(ExecError::not_supported("class keywords"));
        }
        let mut class = Class::new(def.name.as_str());
        for base in &def.bases {
            if matches!(base, ast::Expr::Name(n) if n.id.as_str() == "object") {
                continue;
            }
            match self.eval_expr(base)? {
                Value::Class(parent) => class.bases.push(parent),
                Value::Callable(c) => match c.as_any().downcast_ref::<ExceptionClass>() {
                    Some(exc) => class.exception = Some(exc.name.to_string()),
                    None => return Err(ExecError::type_error("bases must be types")),
                },
                other => {
                    return Err(ExecError::type_error(format!(
                        "cannot inherit from '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        class.attrs = self.class_body(&def.body)?;
        Ok(Value::Class(Rc::new(class)))
    }

    fn class_body(&mut self, body: &[Stmt]) -> Result<BTreeMap<String, Value>, ExecError> {
        self.scopes.push(Scope::class_body());
        let flow = self.exec_block(body);
        let scope = self.scopes.pop();
        match flow? {
            Flow::Normal => {}
            Flow::Return(_) => return Err(ExecError::syntax("'return' outside function", 1)),
            Flow::Break => return Err(ExecError::syntax("'break' outside loop", 1)),
            Flow::Continue => return Err(ExecError::syntax("'continue' not properly in loop", 1)),
        }
        Ok(scope.map(|s| s.vars.into_iter().collect()).unwrap_or_default())
    }

    /// `Class(...)`: a new instance initialised by `__init__`, or an error
    /// value for classes deriving from a builtin exception.
    pub(crate) fn instantiate(&mut self, class: &Rc<Class>, args: CallArgs) -> Result<Value, ExecError> {
        if class.exception_base().is_some() {
            let err = ExecError::runtime(class.name.clone(), exception_message(&args));
            return Ok(Value::error(err));
        }
        let mut object = Value::Instance(Rc::new(Instance::new(class.clone())));
        match method_of(class, "__init__") {
            Some((owner, init)) => {
                let returned = self.call_bound(&mut object, owner, &init, args)?;
                if !returned.is_none() {
                    return Err(ExecError::type_error(format!(
                        "__init__() should return None, not '{}'",
                        returned.type_name()
                    )));
                }
            }
            None if !args.is_empty() => {
                return Err(ExecError::type_error(format!(
                    "{}() takes no arguments",
                    class.name
                )));
            }
            None => {}
        }
        Ok(object)
    }

    /// Run `func` with `recv` as `self` and store the final `self` back
    /// into `recv`, also when the method raises.
    pub(crate) fn call_bound(
        &mut self,
        recv: &mut Value,
        owner: Rc<Class>,
        func: &Value,
        mut args: CallArgs,
    ) -> Result<Value, ExecError> {
        let Some(user) = user_function(func) else {
            return self.call(func, args);
        };
        let class = match recv {
            Value::Instance(obj) => Some(obj.class.clone()),
            _ => None,
        };
        args.positional.insert(0, recv.clone());
        let receiver = user.params.first().map(|p| p.name.clone()).unwrap_or_default();
        self.owners.push(Owner { class: owner, receiver });
        let (result, final_self) = self.run_function(user, args);
        self.owners.pop();
        if let (Some(class), Some(Value::Instance(obj))) = (class, final_self) {
            if Rc::ptr_eq(&obj.class, &class) {
                *recv = Value::Instance(obj);
            }
        }
        result
    }

    pub(crate) fn call_bound_method(&mut self, method: &BoundMethod, args: CallArgs) -> Result<Value, ExecError> {
        let mut receiver = method.receiver.clone();
        self.call_bound(&mut receiver, method.owner.clone(), &method.func, args)
    }

    /// `super().method(...)` inside a running method.
    pub(crate) fn call_super(&mut self, method: &str, args: CallArgs) -> Result<Value, ExecError> {
        let owner = self
            .owners
            .last()
            .cloned()
            .ok_or_else(|| ExecError::runtime("RuntimeError", "super(): no arguments"))?;
        let Some((defining, func)) = owner.class.bases.iter().find_map(|base| method_of(base, method))
        else {
            if method == "__init__" {
                return Ok(Value::None);
            }
            return Err(ExecError::attribute_error("super", method));
        };
        let mut pending = Some(args);
        self.with_name(&owner.receiver, &mut |interp: &mut Interpreter<'a>, recv: &mut Value| {
            interp.call_bound(recv, defining.clone(), &func, pending.take().unwrap_or_default())
        })
    }

    /// `str(value)`, honouring `__str__` and then `__repr__`.
    pub(crate) fn str_of(&mut self, value: &Value) -> Result<String, ExecError> {
        match value {
            Value::Instance(_) => self.dunder_text(value, &["__str__", "__repr__"]),
            Value::Error(e) => Ok(e.message().to_string()),
            other => Ok(other.to_string()),
        }
    }

    /// `repr(value)`, honouring `__repr__`.
    pub(crate) fn repr_of(&mut self, value: &Value) -> Result<String, ExecError> {
        match value {
            Value::Instance(_) => self.dunder_text(value, &["__repr__"]),
            other => Ok(other.repr()),
        }
    }

    fn dunder_text(&mut self, value: &Value, names: &[&str]) -> Result<String, ExecError> {
        let found = names.iter().find_map(|name| bound_method(value, name).map(|m| (*name, m)));
        let Some((name, (owner, func))) = found else {
            return Ok(value.to_string());
        };
        let mut receiver = value.clone();
        match self.call_bound(&mut receiver, owner, &func, CallArgs::default())? {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ExecError::type_error(format!(
                "{name} returned non-string (type {})",
                other.type_name()
            ))),
        }
    }

    /// `with a as x, b: body`, entering left to right and exiting in
    /// reverse. A truthy `__exit__` result swallows the body's exception.
    pub(crate) fn exec_with(&mut self, items: &[ast::WithItem], body: &[Stmt]) -> Result<Flow, ExecError> {
        let Some((item, rest)) = items.split_first() else {
            return self.exec_block(body);
        };
        let mut manager = self.eval_expr(&item.context_expr)?;
        let (Some(enter), Some(exit)) = (
            bound_method(&manager, "__enter__"),
            bound_method(&manager, "__exit__"),
        ) else {
            return Err(protocol_error(&manager));
        };
        let entered = self.call_bound(&mut manager, enter.0, &enter.1, CallArgs::default())?;
        if let Some(target) = &item.optional_vars {
            self.assign_target(target, entered)?;
        }
        let outcome = self.exec_with(rest, body);
        let exit_args = match &outcome {
            Ok(_) => CallArgs::new([Value::None, Value::None, Value::None]),
            Err(err) => {
                let class = self.load(err.exception_name()).unwrap_or(Value::None);
                CallArgs::new([class, Value::error(err.clone()), Value::None])
            }
        };
        let suppress = self.call_bound(&mut manager, exit.0, &exit.1, exit_args)?;
        match outcome {
            Err(_) if suppress.is_truthy() => Ok(Flow::Normal),
            other => other,
        }
    }

    /// Class names an `except` clause may match `err` by: the raised class,
    /// its user-defined bases and the builtin exception it derives from.
    pub(crate) fn exception_lineage(&self, err: &ExecError) -> Vec<String> {
        let name = err.exception_name();
        match self.load(name) {
            Ok(Value::Class(class)) if class.exception_base().is_some() => {
                let mut names: Vec<String> = class.lineage().into_iter().map(str::to_string).collect();
                names.extend(class.exception_base().map(str::to_string));
                names
            }
            _ => vec![name.to_string()],
        }
    }
}

//! Tree-walking evaluator for the Python subset fragments are written in.
//!
//! Name resolution follows Python's LEGB order loosely: comprehension
//! scopes see their enclosing scopes, function scopes see only their own
//! locals, the closure captured at definition time, the document namespace
//! and finally the builtins table.

mod expr;
pub(crate) mod items;
mod objects;
pub(crate) mod ops;
mod stmt;

use std::any::Any;
use std::rc::Rc;

use pycell_common::{Callable, Class, ExecError, Figure, Value};
use pycell_parse::{Expr, Stmt, ast};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::args::CallArgs;
use crate::builtins::{Builtin, Builtins, ExceptionClass};
use crate::modules::ModuleTable;
use crate::namespace::Namespace;

/// Side channels of one execution.
#[derive(Debug, Default)]
pub struct Effects {
    /// One entry per `print` call.
    pub output: Vec<String>,
    /// Figure being built by `matplotlib.pyplot` calls.
    pub figure: Option<Figure>,
    /// Figure handed to the host by `show()`/`savefig()`.
    pub shown: Option<Figure>,
    /// Where `show()` pretends to write the current figure.
    pub figure_path: String,
}

/// Stack left before a recursive step moves onto a fresh segment.
const RED_ZONE: usize = 128 * 1024;
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Function,
    Comprehension,
    /// A `class` body. Methods defined in it do not capture its names.
    Class,
}

type Closure = Rc<FxHashMap<String, Value>>;

struct Scope {
    kind: ScopeKind,
    vars: FxHashMap<String, Value>,
    closure: Option<Closure>,
    globals: FxHashSet<String>,
}

impl Scope {
    fn function(vars: FxHashMap<String, Value>, closure: Option<Closure>) -> Self {
        Self {
            kind: ScopeKind::Function,
            vars,
            closure,
            globals: FxHashSet::default(),
        }
    }

    fn comprehension() -> Self {
        Self::nested(ScopeKind::Comprehension)
    }

    fn class_body() -> Self {
        Self::nested(ScopeKind::Class)
    }

    fn nested(kind: ScopeKind) -> Self {
        Self {
            kind,
            vars: FxHashMap::default(),
            closure: None,
            globals: FxHashSet::default(),
        }
    }
}

/// Class whose method is running, and the name its receiver is bound to.
#[derive(Clone)]
struct Owner {
    class: Rc<Class>,
    receiver: String,
}

/// A `def` or `lambda` value.
#[derive(Debug)]
pub struct UserFunction {
    name: String,
    params: Vec<Param>,
    body: FunctionBody,
    closure: Option<Closure>,
}

#[derive(Debug)]
struct Param {
    name: String,
    default: Option<Value>,
}

#[derive(Debug)]
enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Expr(Rc<Expr>),
}

impl Callable for UserFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UserFunction {
    fn bind(&self, args: CallArgs) -> Result<FxHashMap<String, Value>, ExecError> {
        if args.positional.len() > self.params.len() {
            return Err(ExecError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                self.name,
                self.params.len(),
                args.positional.len()
            )));
        }
        let mut vars = FxHashMap::default();
        let mut positional = args.positional.into_iter();
        for param in &self.params {
            if let Some(v) = positional.next() {
                vars.insert(param.name.clone(), v);
            }
        }
        for (name, value) in args.keywords {
            if !self.params.iter().any(|p| p.name == name) {
                return Err(ExecError::type_error(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    self.name
                )));
            }
            if vars.insert(name.clone(), value).is_some() {
                return Err(ExecError::type_error(format!(
                    "{}() got multiple values for argument '{name}'",
                    self.name
                )));
            }
        }
        for param in &self.params {
            if vars.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(d) => {
                    vars.insert(param.name.clone(), d.clone());
                }
                None => {
                    return Err(ExecError::type_error(format!(
                        "{}() missing required positional argument: '{}'",
                        self.name, param.name
                    )));
                }
            }
        }
        Ok(vars)
    }
}

pub type PlaceFn<'f, 'a> =
    dyn FnMut(&mut Interpreter<'a>, &mut Value) -> Result<Value, ExecError> + 'f;

pub struct Interpreter<'a> {
    globals: &'a mut Namespace,
    builtins: &'a Builtins,
    modules: &'a ModuleTable,
    pub(crate) effects: &'a mut Effects,
    scopes: Vec<Scope>,
    /// Exceptions being handled by enclosing `except` blocks, for bare `raise`.
    handling: Vec<ExecError>,
    /// Running methods, innermost last, for `super()`.
    owners: Vec<Owner>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        globals: &'a mut Namespace,
        builtins: &'a Builtins,
        modules: &'a ModuleTable,
        effects: &'a mut Effects,
        max_depth: usize,
    ) -> Self {
        Self {
            globals,
            builtins,
            modules,
            effects,
            scopes: Vec::new(),
            handling: Vec::new(),
            owners: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    /// Run top-level statements. Loop or function control flow escaping to
    /// module level is a syntax error.
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<(), ExecError> {
        match self.exec_block(stmts)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(ExecError::syntax("'return' outside function", 1)),
            Flow::Break => Err(ExecError::syntax("'break' outside loop", 1)),
            Flow::Continue => Err(ExecError::syntax("'continue' not properly in loop", 1)),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        self.eval_expr(expr)
    }

    /* ───────────────────────── names ───────────────────────── */

    pub(crate) fn load(&self, name: &str) -> Result<Value, ExecError> {
        for scope in self.scopes.iter().rev() {
            if scope.globals.contains(name) {
                break;
            }
            if let Some(v) = scope.vars.get(name) {
                return Ok(v.clone());
            }
            if scope.kind == ScopeKind::Function {
                if let Some(v) = scope.closure.as_ref().and_then(|c| c.get(name)) {
                    return Ok(v.clone());
                }
                break;
            }
        }
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
            .ok_or_else(|| ExecError::name_error(name))
    }

    pub(crate) fn store(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) if !scope.globals.contains(name) => {
                scope.vars.insert(name.to_string(), value);
            }
            _ => {
                self.globals.set(name, value);
            }
        }
    }

    fn delete_name(&mut self, name: &str) -> Result<(), ExecError> {
        let removed = match self.scopes.last_mut() {
            Some(scope) if !scope.globals.contains(name) => scope.vars.remove(name),
            _ => self.globals.remove(name),
        };
        removed.map(|_| ()).ok_or_else(|| ExecError::name_error(name))
    }

    /// Storage slot of a writable binding (locals or document namespace).
    fn slot_mut(&mut self, name: &str) -> Option<&mut Value> {
        let mut local = None;
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.globals.contains(name) {
                break;
            }
            if scope.vars.contains_key(name) {
                local = Some(i);
                break;
            }
            if scope.kind == ScopeKind::Function {
                if scope.closure.as_ref().is_some_and(|c| c.contains_key(name)) {
                    return None;
                }
                break;
            }
        }
        match local {
            Some(i) => self.scopes[i].vars.get_mut(name),
            None => self.globals.get_mut(name),
        }
    }

    /// Locals visible at this point, captured for a nested function.
    fn capture(&self) -> Option<Closure> {
        if self.scopes.is_empty() {
            return None;
        }
        let mut captured: FxHashMap<String, Value> = FxHashMap::default();
        for scope in self.scopes.iter().rev() {
            if scope.kind != ScopeKind::Class {
                for (k, v) in &scope.vars {
                    captured.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            if scope.kind == ScopeKind::Function {
                if let Some(outer) = &scope.closure {
                    for (k, v) in outer.iter() {
                        captured.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                break;
            }
        }
        Some(Rc::new(captured))
    }

    /* ───────────────────────── places ───────────────────────── */

    /// Apply `f` to the storage behind `target` and write the result back.
    ///
    /// Names, list/dict items and object attributes are mutated in place;
    /// any other receiver is a temporary and the mutation is discarded.
    pub(crate) fn with_place(
        &mut self,
        target: &Expr,
        f: &mut PlaceFn<'_, 'a>,
    ) -> Result<Value, ExecError> {
        match target {
            ast::Expr::Name(n) => self.with_name(n.id.as_str(), f),
            ast::Expr::Subscript(sub) if !matches!(sub.slice.as_ref(), ast::Expr::Slice(_)) => {
                let index = self.eval_expr(&sub.slice)?;
                self.with_place(&sub.value, &mut |interp: &mut Interpreter<'a>,
                                                  container: &mut Value|
                 -> Result<Value, ExecError> {
                    let taken = items::item_slot(container, &index)?
                        .map(|slot| std::mem::replace(slot, Value::None));
                    match taken {
                        Some(mut item) => {
                            let result = f(interp, &mut item);
                            if let Some(slot) = items::item_slot(container, &index)? {
                                *slot = item;
                            }
                            result
                        }
                        None => {
                            let mut item = items::get_item(container, &index)?;
                            f(interp, &mut item)
                        }
                    }
                })
            }
            ast::Expr::Attribute(a) => {
                let attr = a.attr.as_str();
                self.with_place(&a.value, &mut |interp: &mut Interpreter<'a>,
                                                object: &mut Value|
                 -> Result<Value, ExecError> {
                    let taken = objects::attr_slot(object, attr)
                        .map(|slot| std::mem::replace(slot, Value::None));
                    match taken {
                        Some(mut value) => {
                            let result = f(interp, &mut value);
                            if let Some(slot) = objects::attr_slot(object, attr) {
                                *slot = value;
                            }
                            result
                        }
                        None => {
                            let mut value = objects::attribute(object, attr)?;
                            f(interp, &mut value)
                        }
                    }
                })
            }
            other => {
                let mut value = self.eval_expr(other)?;
                f(self, &mut value)
            }
        }
    }

    fn with_name(&mut self, name: &str, f: &mut PlaceFn<'_, 'a>) -> Result<Value, ExecError> {
        let taken = self
            .slot_mut(name)
            .map(|slot| std::mem::replace(slot, Value::None));
        match taken {
            Some(mut value) => {
                let result = f(self, &mut value);
                match self.slot_mut(name) {
                    Some(slot) => *slot = value,
                    None => self.store(name, value),
                }
                result
            }
            None => {
                let mut value = self.load(name)?;
                f(self, &mut value)
            }
        }
    }

    /* ───────────────────────── calls ───────────────────────── */

    pub fn call(&mut self, func: &Value, args: CallArgs) -> Result<Value, ExecError> {
        if let Value::Class(class) = func {
            return self.instantiate(class, args);
        }
        let Value::Callable(callable) = func else {
            return Err(ExecError::type_error(format!(
                "'{}' object is not callable",
                func.type_name()
            )));
        };
        let any = callable.as_any();
        if let Some(builtin) = any.downcast_ref::<Builtin>() {
            return (builtin.func)(self, args);
        }
        if let Some(user) = any.downcast_ref::<UserFunction>() {
            return self.call_user(user, args);
        }
        if let Some(class) = any.downcast_ref::<ExceptionClass>() {
            return Ok(class.instantiate(&args));
        }
        if let Some(method) = any.downcast_ref::<objects::BoundMethod>() {
            return self.call_bound_method(method, args);
        }
        Err(ExecError::not_supported(format!(
            "calling '{}'",
            callable.name()
        )))
    }

    fn call_user(&mut self, func: &UserFunction, args: CallArgs) -> Result<Value, ExecError> {
        self.run_function(func, args).0
    }

    /// Run `func` and also hand back the final binding of its first
    /// parameter, which is how a method's `self` reaches its caller.
    fn run_function(
        &mut self,
        func: &UserFunction,
        args: CallArgs,
    ) -> (Result<Value, ExecError>, Option<Value>) {
        if self.depth >= self.max_depth {
            let err = ExecError::runtime("RecursionError", "maximum recursion depth exceeded");
            return (Err(err), None);
        }
        let vars = match func.bind(args) {
            Ok(vars) => vars,
            Err(err) => return (Err(err), None),
        };
        self.scopes.push(Scope::function(vars, func.closure.clone()));
        self.depth += 1;
        let result = stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || match &func.body {
            FunctionBody::Block(body) => self.exec_block(body).and_then(|flow| match flow {
                Flow::Return(v) => Ok(v),
                Flow::Normal => Ok(Value::None),
                Flow::Break => Err(ExecError::syntax("'break' outside loop", 1)),
                Flow::Continue => Err(ExecError::syntax("'continue' not properly in loop", 1)),
            }),
            FunctionBody::Expr(expr) => self.eval_expr(expr),
        });
        self.depth -= 1;
        let first = self.scopes.pop().and_then(|mut scope| {
            func.params.first().and_then(|p| scope.vars.remove(&p.name))
        });
        (result, first)
    }

    fn make_function(
        &mut self,
        name: &str,
        args: &ast::Arguments,
        body: FunctionBody,
    ) -> Result<Value, ExecError> {
        if args.vararg.is_some() || args.kwarg.is_some() || !args.kwonlyargs.is_empty() {
            return Err(ExecError::not_supported("*args, **kwargs and keyword-only parameters"));
        }
        let mut params = Vec::with_capacity(args.posonlyargs.len() + args.args.len());
        for arg in args.posonlyargs.iter().chain(args.args.iter()) {
            let default = match &arg.default {
                Some(expr) => Some(self.eval_expr(expr)?),
                None => None,
            };
            params.push(Param {
                name: arg.def.arg.as_str().to_string(),
                default,
            });
        }
        let func = UserFunction {
            name: name.to_string(),
            params,
            body,
            closure: self.capture(),
        };
        Ok(Value::Callable(Rc::new(func)))
    }

    /// Evaluate `body` with a fresh comprehension scope on top.
    fn in_comprehension<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, ExecError>,
    ) -> Result<T, ExecError> {
        self.scopes.push(Scope::comprehension());
        let result = body(self);
        self.scopes.pop();
        result
    }

    pub(crate) fn import(&self, name: &str) -> Result<Value, ExecError> {
        self.modules.import(name)
    }
}

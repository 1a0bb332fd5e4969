//! `matplotlib.pyplot` shim.
//!
//! Plotting calls only track the shape of the current figure in
//! [`Effects::figure`]; `show()` and `savefig()` hand it to the host through
//! [`Effects::shown`]. Nothing is rasterized.

use std::rc::Rc;

use pycell_common::{ExecError, Figure, Module, Value};

use crate::args::CallArgs;
use crate::builtins::{Builtin, BuiltinFn};
use crate::interpreter::{Effects, Interpreter};

/// Add `traces` of `kind` to the current figure, starting one if needed.
pub(crate) fn record(effects: &mut Effects, kind: &str, traces: usize, title: Option<String>) -> Value {
    let fig = effects.figure.get_or_insert_with(Figure::default);
    if fig.kind.is_empty() {
        fig.kind = kind.to_string();
    }
    fig.traces += traces;
    if title.is_some() {
        fig.title = title;
    }
    Value::Figure(Rc::new(fig.clone()))
}

macro_rules! trace_fn {
    ($($name:ident => $kind:literal),* $(,)?) => {
        $(
            fn $name(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
                if args.positional.is_empty() {
                    return Err(ExecError::type_error(concat!(
                        stringify!($name),
                        "() missing required data argument"
                    )));
                }
                let title = args.string(usize::MAX, "title");
                Ok(record(interp.effects, $kind, 1, title))
            }
        )*
    };
}

trace_fn! {
    plot => "line",
    bar => "bar",
    barh => "bar",
    scatter => "scatter",
    hist => "hist",
    pie => "pie",
    boxplot => "box",
}

fn figure(interp: &mut Interpreter<'_>, _: CallArgs) -> Result<Value, ExecError> {
    let fig = Figure::default();
    interp.effects.figure = Some(fig.clone());
    Ok(Value::Figure(Rc::new(fig)))
}

fn gcf(interp: &mut Interpreter<'_>, _: CallArgs) -> Result<Value, ExecError> {
    let fig = interp.effects.figure.get_or_insert_with(Figure::default);
    Ok(Value::Figure(Rc::new(fig.clone())))
}

fn title(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let label = args
        .get(0, "label")
        .ok_or_else(|| ExecError::type_error("title() missing required argument: 'label'"))?
        .to_string();
    interp.effects.figure.get_or_insert_with(Figure::default).title = Some(label);
    Ok(Value::None)
}

/// `xlabel`, `legend`, `grid`, ...: decoration that does not change what the
/// host displays.
fn decorate(interp: &mut Interpreter<'_>, _: CallArgs) -> Result<Value, ExecError> {
    interp.effects.figure.get_or_insert_with(Figure::default);
    Ok(Value::None)
}

fn show(interp: &mut Interpreter<'_>, _: CallArgs) -> Result<Value, ExecError> {
    if let Some(mut fig) = interp.effects.figure.take() {
        fig.saved_to = Some(interp.effects.figure_path.clone());
        interp.effects.shown = Some(fig);
    }
    Ok(Value::None)
}

fn savefig(interp: &mut Interpreter<'_>, args: CallArgs) -> Result<Value, ExecError> {
    let path = args
        .string(0, "fname")
        .ok_or_else(|| ExecError::type_error("savefig() missing required argument: 'fname'"))?;
    if let Some(fig) = &interp.effects.figure {
        let mut saved = fig.clone();
        saved.saved_to = Some(path);
        interp.effects.shown = Some(saved);
    }
    Ok(Value::None)
}

fn close(interp: &mut Interpreter<'_>, _: CallArgs) -> Result<Value, ExecError> {
    interp.effects.figure = None;
    Ok(Value::None)
}

pub(crate) fn module() -> Value {
    let functions: &[(&'static str, BuiltinFn)] = &[
        ("plot", plot),
        ("bar", bar),
        ("barh", barh),
        ("scatter", scatter),
        ("hist", hist),
        ("pie", pie),
        ("boxplot", boxplot),
        ("figure", figure),
        ("gcf", gcf),
        ("title", title),
        ("suptitle", title),
        ("xlabel", decorate),
        ("ylabel", decorate),
        ("legend", decorate),
        ("grid", decorate),
        ("xticks", decorate),
        ("yticks", decorate),
        ("tight_layout", decorate),
        ("show", show),
        ("savefig", savefig),
        ("close", close),
    ];
    let mut m = Module::new("matplotlib.pyplot");
    for &(name, func) in functions {
        m = m.with(name, Builtin::value(name, func));
    }
    Value::Module(Rc::new(m))
}

/// Methods on a figure handle returned by `plt.figure()` or `df.plot()`.
pub(crate) fn figure_method(
    interp: &mut Interpreter<'_>,
    fig: &Figure,
    method: &str,
    args: &CallArgs,
) -> Result<Option<Value>, ExecError> {
    let saved_to = match method {
        "show" => interp.effects.figure_path.clone(),
        "savefig" => args.string(0, "fname").ok_or_else(|| {
            ExecError::type_error("savefig() missing required argument: 'fname'")
        })?,
        _ => return Ok(None),
    };
    let mut shown = fig.clone();
    shown.saved_to = Some(saved_to);
    interp.effects.shown = Some(shown);
    Ok(Some(Value::None))
}

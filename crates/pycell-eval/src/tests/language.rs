use pycell_common::Value;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;

fn run(source: &str) -> Value {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute(source).unwrap_or(Value::None)
}

fn exception_of(value: &Value) -> &str {
    match value {
        Value::Error(e) => e.exception_name(),
        other => panic!("expected an error value, got {other:?}"),
    }
}

#[test]
fn functions_defaults_and_keywords() {
    let v = run("def f(a, b=2, scale=1):\n    return (a + b) * scale\nf(1) + f(1, 3, scale=10)");
    assert_eq!(v, Value::Int(43));
}

#[test]
fn recursion_and_locals_do_not_leak() {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    let v = ctx.execute("def fact(n):\n    acc = 1\n    for i in range(2, n + 1):\n        acc *= i\n    return acc\nfact(10)");
    assert_eq!(v, Some(Value::Int(3_628_800)));
    assert!(!ctx.namespace().contains("acc"));
    assert!(ctx.namespace().contains("fact"));
}

#[test]
fn closures_capture_enclosing_bindings() {
    let v = run("def adder(n):\n    def add(x):\n        return x + n\n    return add\nplus5 = adder(5)\nplus5(10)");
    assert_eq!(v, Value::Int(15));
    let v = run("double = lambda x: x * 2\nlist(map(double, [1, 2, 3]))");
    assert_eq!(v, Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6)]));
}

#[test]
fn functions_defined_in_earlier_fragments_stay_callable() {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("rate = 0.5\ndef cost(q):\n    return q * rate");
    assert_eq!(ctx.execute("cost(4)"), Some(Value::Float(2.0)));
    ctx.execute("rate = 2");
    assert_eq!(ctx.execute("cost(4)"), Some(Value::Int(8)));
}

#[test]
fn comprehensions_and_generators() {
    assert_eq!(
        run("[x * x for x in range(5) if x % 2 == 0]"),
        Value::list(vec![Value::Int(0), Value::Int(4), Value::Int(16)])
    );
    assert_eq!(run("sum(x for x in range(101))"), Value::Int(5050));
    assert_eq!(run("d = {k: len(k) for k in ['a', 'bb']}\nd['bb']"), Value::Int(2));
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("[i for i in range(3)]");
    assert!(!ctx.namespace().contains("i"));
}

#[test]
fn loops_with_break_continue_and_else() {
    let v = run("total = 0\nfor i in range(10):\n    if i == 7:\n        break\n    if i % 2:\n        continue\n    total += i\ntotal");
    assert_eq!(v, Value::Int(12));
    let v = run("n = 0\nwhile n < 5:\n    n += 1\nelse:\n    n = -n\nn");
    assert_eq!(v, Value::Int(-5));
}

#[test]
fn try_except_else_finally() {
    let v = run("log = []\ntry:\n    1 / 0\nexcept ZeroDivisionError as e:\n    log.append(str(e))\nelse:\n    log.append('else')\nfinally:\n    log.append('done')\nlog");
    assert_eq!(v, Value::list(vec![Value::str("division by zero"), Value::str("done")]));

    let v = run("try:\n    raise ValueError('bad input')\nexcept (KeyError, ValueError) as e:\n    msg = str(e)\nmsg");
    assert_eq!(v, Value::str("bad input"));

    let v = run("try:\n    {}['k']\nexcept LookupError:\n    hit = True\nhit");
    assert_eq!(v, Value::Bool(true));
}

#[test]
fn uncaught_raise_becomes_the_fragment_value() {
    let v = run("raise KeyError('missing')");
    assert_eq!(exception_of(&v), "KeyError");
    let v = run("assert 1 == 2, 'nope'");
    assert_eq!(exception_of(&v), "AssertionError");
}

#[test]
fn f_strings_and_format_specs() {
    let v = run("name = 'ann'\nx = 3.14159\nf'{name!r} has {x:.2f} and {1000000:,}'");
    assert_eq!(v, Value::str("'ann' has 3.14 and 1,000,000"));
    assert_eq!(run("'{} + {} = {}'.format(1, 2, 3)"), Value::str("1 + 2 = 3"));
}

#[test]
fn sequences_slices_and_unpacking() {
    assert_eq!(
        run("xs = [1, 2, 3, 4, 5]\nxs[::-2]"),
        Value::list(vec![Value::Int(5), Value::Int(3), Value::Int(1)])
    );
    assert_eq!(run("a, b = 1, 2\na, b = b, a\na * 10 + b"), Value::Int(21));
    assert_eq!(run("'a,b,,c'.split(',')[-1].upper()"), Value::str("C"));
    assert_eq!(
        run("sorted(['bb', 'a', 'ccc'], key=len, reverse=True)"),
        Value::list(vec![Value::str("ccc"), Value::str("bb"), Value::str("a")])
    );
}

#[test]
fn mutation_never_reaches_earlier_snapshots() {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("items = [1, 2]\nconfig = {'k': 1}");
    let before = ctx.snapshot();
    ctx.execute("items.append(3)\nconfig['k'] = 2");
    assert_eq!(
        before.get("items"),
        Some(&Value::list(vec![Value::Int(1), Value::Int(2)]))
    );
    assert_eq!(ctx.execute("len(items) + config['k']"), Some(Value::Int(5)));
}

#[test]
fn modules_are_importable() {
    assert_eq!(run("import math\nmath.floor(math.sqrt(17))"), Value::Int(4));
    assert_eq!(run("from math import pi\nround(pi, 2)"), Value::Float(3.14));
    assert_eq!(
        run("import datetime\ndatetime.date(2024, 3, 1).strftime('%d/%m/%Y')"),
        Value::str("01/03/2024")
    );
    assert_eq!(exception_of(&run("import numpy")), "ModuleNotFoundError");
}

#[test]
fn pandas_frames_through_the_interpreter() {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("import pandas as pd\ndf = pd.DataFrame({'a': [3, 1, 2], 'b': [30, 10, 20]})");
    assert_eq!(ctx.execute("df['a'].sum()"), Some(Value::Int(6)));
    assert_eq!(
        ctx.execute("df.shape"),
        Some(Value::tuple(vec![Value::Int(3), Value::Int(2)]))
    );
    ctx.execute("df['c'] = df['a'] * 2");
    assert_eq!(
        ctx.execute("df.sort_values('a')['c'].tolist()"),
        Some(Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6)]))
    );
    assert_eq!(
        ctx.execute("list(df.columns)"),
        Some(Value::list(vec![Value::str("a"), Value::str("b"), Value::str("c")]))
    );
}

#[test]
fn unsupported_constructs_raise_instead_of_panicking() {
    assert_eq!(
        exception_of(&run("match 1:\n    case 1:\n        pass")),
        "NotImplementedError"
    );
    assert_eq!(exception_of(&run("async def f():\n    pass")), "NotImplementedError");
}

#[test]
fn set_displays_and_methods() {
    assert_eq!(run("s = {1, 2}\nlen(s)"), Value::Int(2));
    assert_eq!(
        run("s = {3, 1, 3}\ns.add(2)\ns.discard(9)\nsorted(s)"),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    assert_eq!(run("{1, 2} | {2, 3} == {3, 2, 1}"), Value::Bool(true));
    assert_eq!(run("len({x % 3 for x in range(10)})"), Value::Int(3));
    assert_eq!(run("2 in set([1, 2]) and {1} <= {1, 2}"), Value::Bool(true));
    assert_eq!(exception_of(&run("{[1]}")), "TypeError");
    assert_eq!(exception_of(&run("s = set()\ns.remove(1)")), "KeyError");

    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("seen = {1}");
    let before = ctx.snapshot();
    ctx.execute("seen.add(2)");
    assert_eq!(before.get("seen").map(Value::to_string), Some("{1}".to_string()));
    assert_eq!(ctx.execute("len(seen)"), Some(Value::Int(2)));
}

#[test]
fn class_attributes_and_methods() {
    assert_eq!(run("class P:\n    x = 1\nP.x"), Value::Int(1));
    let source = "\
class Counter:
    def __init__(self, start=0):
        self.n = start
    def bump(self, by=1):
        self.n += by
        return self.n
c = Counter(5)
c.bump()
c.bump(10)
c.n";
    assert_eq!(run(source), Value::Int(16));
    assert_eq!(exception_of(&run("class P:\n    pass\nP().missing")), "AttributeError");
    assert_eq!(exception_of(&run("class P:\n    pass\nP(1)")), "TypeError");
}

#[test]
fn inheritance_and_super() {
    let source = "\
class Animal:
    def __init__(self, name):
        self.name = name
    def speak(self):
        return self.name + ' makes a sound'
class Dog(Animal):
    def __init__(self, name):
        super().__init__(name)
        self.tricks = []
    def speak(self):
        return self.name + ' barks'
    def learn(self, trick):
        self.tricks.append(trick)
d = Dog('Rex')
d.learn('sit')
[d.speak(), len(d.tricks), isinstance(d, Animal), type(d).__name__]";
    assert_eq!(
        run(source),
        Value::list(vec![
            Value::str("Rex barks"),
            Value::Int(1),
            Value::Bool(true),
            Value::str("Dog"),
        ])
    );
}

#[test]
fn user_exceptions_join_the_builtin_hierarchy() {
    let source = "\
class InputError(ValueError):
    pass
def check(x):
    if x < 0:
        raise InputError('negative: ' + str(x))
    return x
try:
    check(-1)
    r = 'ok'
except ValueError as e:
    r = str(e) if isinstance(e, InputError) else 'other'
r";
    assert_eq!(run(source), Value::str("negative: -1"));
    let v = run("class Stop(Exception):\n    pass\nraise Stop('halt')");
    assert_eq!(exception_of(&v), "Stop");
}

#[test]
fn with_blocks_enter_exit_and_suppress() {
    let source = "\
events = []
class Guard:
    def __init__(self, name):
        self.name = name
    def __enter__(self):
        events.append('enter ' + self.name)
        return self.name
    def __exit__(self, kind, err, tb):
        events.append('exit ' + self.name)
        return err is not None
with Guard('a') as name:
    events.append('body ' + name)
    1 / 0
events";
    assert_eq!(
        run(source),
        Value::list(vec![
            Value::str("enter a"),
            Value::str("body a"),
            Value::str("exit a"),
        ])
    );
    assert_eq!(exception_of(&run("with 5:\n    pass")), "TypeError");
}

#[test]
fn dunder_str_drives_str_and_f_strings() {
    let source = "\
class Money:
    def __init__(self, cents):
        self.cents = cents
    def __str__(self):
        return f'${self.cents / 100:.2f}'
m = Money(1250)
[str(m), f'{m}']";
    assert_eq!(
        run(source),
        Value::list(vec![Value::str("$12.50"), Value::str("$12.50")])
    );
}

#[test]
fn object_mutation_never_reaches_earlier_snapshots() {
    let mut ctx = ExecutionContext::new(EngineConfig::default());
    ctx.execute("class Box:\n    def __init__(self):\n        self.v = 1\nb = Box()");
    let before = ctx.snapshot();
    ctx.execute("b.v = 2");
    match before.get("b") {
        Some(Value::Instance(obj)) => assert_eq!(obj.attrs.get("v"), Some(&Value::Int(1))),
        other => panic!("expected an instance, got {other:?}"),
    }
    assert_eq!(ctx.execute("b.v"), Some(Value::Int(2)));
}

#[test]
fn runaway_recursion_is_bounded() {
    let config = EngineConfig {
        max_call_depth: 16,
        ..EngineConfig::default()
    };
    let mut ctx = ExecutionContext::new(config);
    let v = ctx.execute("def f(n):\n    return f(n + 1)\nf(0)").unwrap();
    assert_eq!(exception_of(&v), "RecursionError");
}

#[test]
fn oversized_repetition_is_an_error_value() {
    assert_eq!(exception_of(&run("'ab' * (10 ** 18)")), "MemoryError");
    assert_eq!(exception_of(&run("[0] * (10 ** 18)")), "MemoryError");
    assert_eq!(exception_of(&run("(1, 2) * (10 ** 18)")), "MemoryError");
    assert_eq!(exception_of(&run("[1, 2, 3, 4, 5] * (2 ** 62)")), "OverflowError");
    assert_eq!(exception_of(&run("'x'.ljust(10 ** 12)")), "MemoryError");
    assert_eq!(
        run("try:\n    b = 'ab' * (10 ** 18)\nexcept MemoryError:\n    b = 'small'\nb"),
        Value::str("small")
    );
    assert_eq!(run("'' * (10 ** 18)"), Value::str(""));
    assert_eq!(run("len([7] * 3)"), Value::Int(3));
}

#[test]
fn recursion_up_to_the_call_limit_returns_normally() {
    let def = "def f(n):\n    return 0 if n == 0 else 1 + f(n - 1)\n";
    let limit = EngineConfig::default().max_call_depth as i64;
    assert_eq!(run(&format!("{def}f({})", limit - 1)), Value::Int(limit - 1));
    assert_eq!(exception_of(&run(&format!("{def}f({limit})"))), "RecursionError");
}

#[test]
fn overly_nested_fragments_are_refused() {
    let chain = vec!["1"; 20_000].join(" + ");
    assert_eq!(exception_of(&run(&chain)), "RecursionError");
    assert_eq!(run(&vec!["1"; 900].join(" + ")), Value::Int(900));
}

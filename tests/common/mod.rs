//! Common test utilities and fixtures.
//!
//! The `Demo` namespace below describes a small native library; [`library`]
//! implements it on the simulated native heap.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use gir_bridge::native::{Argument, SymbolTable};
use gir_bridge::repository::MetadataStore;
use gir_bridge::{Error, Runtime};

/// Error domain used by `demo_parse_int`.
pub const PARSE_DOMAIN: u32 = 7;

/// Id stored in every widget created by `demo_widget_new`.
pub const WIDGET_ID: i32 = 42;

// =============================================================================
// Metadata
// =============================================================================

pub const DEMO_JSON: &str = r#"{
    "namespace": "Demo",
    "version": "1.0",
    "types": [
        {"name": "Point", "kind": "struct", "size": 8},
        {
            "name": "Widget",
            "kind": "object",
            "methods": [
                {
                    "name": "get_self",
                    "symbol": "demo_widget_get_self",
                    "is_method": true,
                    "return_type": {"tag": "interface", "interface": "Demo.Widget", "pointer": true}
                },
                {
                    "name": "get_id",
                    "symbol": "demo_widget_get_id",
                    "is_method": true,
                    "return_type": {"tag": "int32"}
                }
            ]
        },
        {"name": "Label", "kind": "object", "parent": "Demo.Widget"},
        {"name": "Color", "kind": "enum", "storage": "int32"},
        {
            "name": "IntFunc",
            "kind": "callback",
            "signature": {
                "name": "IntFunc",
                "args": [
                    {"name": "value", "type": {"tag": "int32"}},
                    {"name": "user_data", "type": {"tag": "void", "pointer": true}, "closure": 1}
                ],
                "return_type": {"tag": "int32"}
            }
        },
        {
            "name": "NameFunc",
            "kind": "callback",
            "signature": {
                "name": "NameFunc",
                "args": [
                    {"name": "value", "type": {"tag": "int32"}},
                    {"name": "user_data", "type": {"tag": "void", "pointer": true}, "closure": 1}
                ],
                "return_type": {"tag": "utf8", "pointer": true}
            }
        }
    ],
    "functions": [
        {
            "name": "add",
            "symbol": "demo_add",
            "args": [
                {"name": "a", "type": {"tag": "int32"}},
                {"name": "b", "type": {"tag": "int32"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "sum",
            "symbol": "demo_sum",
            "args": [
                {"name": "values", "type": {"tag": "array", "pointer": true, "params": [{"tag": "int32"}], "array_length": 1}},
                {"name": "n_values", "type": {"tag": "int32"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "divmod",
            "symbol": "demo_divmod",
            "args": [
                {"name": "a", "type": {"tag": "int32"}},
                {"name": "b", "type": {"tag": "int32"}},
                {"name": "quotient", "type": {"tag": "int32"}, "direction": "out"},
                {"name": "remainder", "type": {"tag": "int32"}, "direction": "out"}
            ],
            "return_type": {"tag": "boolean"}
        },
        {
            "name": "parse_int",
            "symbol": "demo_parse_int",
            "throws": true,
            "args": [
                {"name": "text", "type": {"tag": "utf8", "pointer": true}},
                {"name": "normalized", "type": {"tag": "utf8", "pointer": true}, "direction": "out", "transfer": "everything"},
                {"name": "value", "type": {"tag": "int32"}, "direction": "out"}
            ],
            "return_type": {"tag": "boolean"}
        },
        {
            "name": "make_range",
            "symbol": "demo_make_range",
            "args": [
                {"name": "n", "type": {"tag": "int32"}},
                {
                    "name": "values",
                    "type": {"tag": "array", "pointer": true, "params": [{"tag": "int32"}], "array_length": 2},
                    "direction": "out",
                    "transfer": "everything"
                },
                {"name": "n_values", "type": {"tag": "int32"}, "direction": "out"}
            ]
        },
        {
            "name": "join",
            "symbol": "demo_join",
            "args": [
                {"name": "words", "type": {"tag": "array", "pointer": true, "zero_terminated": true, "params": [{"tag": "utf8", "pointer": true}]}},
                {"name": "separator", "type": {"tag": "utf8", "pointer": true}}
            ],
            "return_type": {"tag": "utf8", "pointer": true},
            "return_transfer": "everything"
        },
        {
            "name": "split",
            "symbol": "demo_split",
            "args": [
                {"name": "text", "type": {"tag": "utf8", "pointer": true}}
            ],
            "return_type": {"tag": "array", "pointer": true, "zero_terminated": true, "params": [{"tag": "utf8", "pointer": true}]},
            "return_transfer": "everything"
        },
        {
            "name": "count_chars",
            "symbol": "demo_count_chars",
            "args": [
                {"name": "words", "type": {"tag": "glist", "pointer": true, "params": [{"tag": "utf8", "pointer": true}]}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "words",
            "symbol": "demo_words",
            "return_type": {"tag": "gslist", "pointer": true, "params": [{"tag": "utf8", "pointer": true}]},
            "return_transfer": "everything"
        },
        {
            "name": "call_twice",
            "symbol": "demo_call_twice",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}, "closure": 1, "scope": "call"},
                {"name": "user_data", "type": {"tag": "void", "pointer": true}},
                {"name": "value", "type": {"tag": "int32"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "call_async",
            "symbol": "demo_call_async",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}, "closure": 1, "scope": "async"},
                {"name": "user_data", "type": {"tag": "void", "pointer": true}}
            ]
        },
        {
            "name": "run_unscoped",
            "symbol": "demo_run_unscoped",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "set_handler",
            "symbol": "demo_set_handler",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}, "closure": 1, "destroy": 2, "scope": "notified", "nullable": true},
                {"name": "user_data", "type": {"tag": "void", "pointer": true}},
                {"name": "notify", "type": {"tag": "interface", "interface": "GLib.DestroyNotify"}}
            ]
        },
        {
            "name": "fire_handler",
            "symbol": "demo_fire_handler",
            "args": [
                {"name": "value", "type": {"tag": "int32"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "clear_handler",
            "symbol": "demo_clear_handler"
        },
        {
            "name": "broken",
            "symbol": "demo_broken",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}, "destroy": 1},
                {"name": "notify", "type": {"tag": "interface", "interface": "GLib.DestroyNotify"}}
            ]
        },
        {
            "name": "unresolved",
            "symbol": "demo_unresolved",
            "args": [
                {"name": "thing", "type": {"tag": "interface", "interface": "Demo.Missing"}}
            ]
        },
        {
            "name": "point_new",
            "symbol": "demo_point_new",
            "args": [
                {"name": "x", "type": {"tag": "int32"}},
                {"name": "y", "type": {"tag": "int32"}}
            ],
            "return_type": {"tag": "interface", "interface": "Demo.Point", "pointer": true},
            "return_transfer": "everything"
        },
        {
            "name": "point_sum",
            "symbol": "demo_point_sum",
            "args": [
                {"name": "point", "type": {"tag": "interface", "interface": "Demo.Point", "pointer": true}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "point_sum_by_value",
            "symbol": "demo_point_sum",
            "args": [
                {"name": "point", "type": {"tag": "interface", "interface": "Demo.Point"}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "point_origin",
            "symbol": "demo_point_origin",
            "args": [
                {"name": "origin", "type": {"tag": "interface", "interface": "Demo.Point", "pointer": true}, "direction": "out", "caller_allocates": true}
            ]
        },
        {
            "name": "widget_new",
            "symbol": "demo_widget_new",
            "return_type": {"tag": "interface", "interface": "Demo.Widget", "pointer": true},
            "return_transfer": "everything"
        },
        {
            "name": "label_new",
            "symbol": "demo_widget_new",
            "return_type": {"tag": "interface", "interface": "Demo.Label", "pointer": true},
            "return_transfer": "everything"
        },
        {
            "name": "widget_id",
            "symbol": "demo_widget_get_id",
            "args": [
                {"name": "widget", "type": {"tag": "interface", "interface": "Demo.Widget", "pointer": true}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "increment",
            "symbol": "demo_increment",
            "args": [
                {"name": "counter", "type": {"tag": "int32"}, "direction": "inout"}
            ]
        },
        {
            "name": "shade",
            "symbol": "demo_shade",
            "args": [
                {"name": "color", "type": {"tag": "interface", "interface": "Demo.Color"}}
            ],
            "return_type": {"tag": "interface", "interface": "Demo.Color"}
        },
        {
            "name": "name_twice",
            "symbol": "demo_name_twice",
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.NameFunc"}, "closure": 1, "scope": "call"},
                {"name": "user_data", "type": {"tag": "void", "pointer": true}}
            ],
            "return_type": {"tag": "utf8", "pointer": true},
            "return_transfer": "everything"
        },
        {
            "name": "get_data",
            "symbol": "demo_get_data",
            "return_type": {"tag": "void", "pointer": true}
        },
        {
            "name": "bogus_range",
            "symbol": "demo_bogus_range",
            "args": [
                {"name": "n_values", "type": {"tag": "int64"}, "direction": "out"}
            ],
            "return_type": {"tag": "array", "pointer": true, "params": [{"tag": "int32"}], "array_length": 0},
            "return_transfer": "everything"
        },
        {
            "name": "bad_char",
            "symbol": "demo_bad_char",
            "args": [
                {"name": "label", "type": {"tag": "utf8", "pointer": true}, "direction": "out", "transfer": "everything"}
            ],
            "return_type": {"tag": "unichar"}
        },
        {
            "name": "try_callback",
            "symbol": "demo_try_callback",
            "throws": true,
            "args": [
                {"name": "func", "type": {"tag": "interface", "interface": "Demo.IntFunc"}, "closure": 1, "scope": "call"},
                {"name": "user_data", "type": {"tag": "void", "pointer": true}}
            ],
            "return_type": {"tag": "int32"}
        },
        {
            "name": "missing_symbol",
            "symbol": "demo_not_linked"
        }
    ]
}"#;

pub fn store() -> MetadataStore {
    MetadataStore::from_json_str(DEMO_JSON).unwrap()
}

// =============================================================================
// Native implementation
// =============================================================================

fn arg(args: &[Argument], index: usize) -> Argument {
    args.get(index).copied().unwrap_or_default()
}

fn int(value: i32) -> Argument {
    Argument::from_i64(i64::from(value))
}

/// Callback registered through `demo_set_handler`: (func, user_data, notify).
type Handler = Rc<RefCell<Option<(Argument, Argument, Argument)>>>;

pub fn library() -> SymbolTable {
    let mut lib = SymbolTable::new();

    lib.define("demo_add", |_cx, args| {
        Ok(int(arg(args, 0).as_i32().wrapping_add(arg(args, 1).as_i32())))
    });

    lib.define("demo_sum", |cx, args| {
        let data = arg(args, 0).as_ptr();
        let n = arg(args, 1).as_i32().max(0) as u64;
        let mut total = 0i32;
        for i in 0..n {
            total = total.wrapping_add(cx.load(data + i * 4, 4)?.as_i32());
        }
        Ok(int(total))
    });

    lib.define("demo_divmod", |cx, args| {
        let (a, b) = (arg(args, 0).as_i32(), arg(args, 1).as_i32());
        if b == 0 {
            return Ok(Argument::from_bool(false));
        }
        cx.store(arg(args, 2).as_ptr(), 4, int(a / b))?;
        cx.store(arg(args, 3).as_ptr(), 4, int(a % b))?;
        Ok(Argument::from_bool(true))
    });

    lib.define("demo_parse_int", |cx, args| {
        let text = cx.read_cstr(arg(args, 0).as_ptr())?;
        let trimmed = text.trim();
        let normalized = cx.strdup(trimmed)?;
        cx.store_ptr(arg(args, 1).as_ptr(), normalized)?;
        match trimmed.parse::<i32>() {
            Ok(n) => {
                cx.store(arg(args, 2).as_ptr(), 4, int(n))?;
                Ok(Argument::from_bool(true))
            }
            Err(_) => {
                let message = format!("invalid number: '{trimmed}'");
                cx.set_error(arg(args, 3), PARSE_DOMAIN, 1, &message)?;
                Ok(Argument::from_bool(false))
            }
        }
    });

    lib.define("demo_make_range", |cx, args| {
        let n = arg(args, 0).as_i32().max(0);
        let buf = cx.alloc(n as usize * 4);
        for i in 0..n {
            cx.store(buf + i as u64 * 4, 4, int(i))?;
        }
        cx.store_ptr(arg(args, 1).as_ptr(), buf)?;
        cx.store(arg(args, 2).as_ptr(), 4, int(n))?;
        Ok(Argument::NULL)
    });

    lib.define("demo_join", |cx, args| {
        let mut words = Vec::new();
        let mut cursor = arg(args, 0).as_ptr();
        while cursor != 0 {
            let word = cx.load_ptr(cursor)?;
            if word == 0 {
                break;
            }
            words.push(cx.read_cstr(word)?);
            cursor += 8;
        }
        let separator = cx.read_cstr(arg(args, 1).as_ptr())?;
        Ok(Argument::from_ptr(cx.strdup(&words.join(&separator))?))
    });

    lib.define("demo_split", |cx, args| {
        let text = cx.read_cstr(arg(args, 0).as_ptr())?;
        let words: Vec<&str> = text.split_whitespace().collect();
        let buf = cx.alloc((words.len() + 1) * 8);
        for (i, word) in words.iter().enumerate() {
            let ptr = cx.strdup(word)?;
            cx.store_ptr(buf + i as u64 * 8, ptr)?;
        }
        Ok(Argument::from_ptr(buf))
    });

    lib.define("demo_count_chars", |cx, args| {
        let mut total = 0usize;
        let mut node = arg(args, 0).as_ptr();
        while node != 0 {
            total += cx.read_cstr(cx.load_ptr(node)?)?.chars().count();
            node = cx.load_ptr(node + 8)?;
        }
        Ok(int(total as i32))
    });

    lib.define("demo_words", |cx, _args| {
        let mut head = 0u64;
        for word in ["gamma", "beta", "alpha"] {
            let node = cx.alloc(16);
            let data = cx.strdup(word)?;
            cx.store_ptr(node, data)?;
            cx.store_ptr(node + 8, head)?;
            head = node;
        }
        Ok(Argument::from_ptr(head))
    });

    lib.define("demo_call_twice", |cx, args| {
        let (func, data, value) = (arg(args, 0), arg(args, 1), arg(args, 2).as_i32());
        let a = cx.invoke_callback(func, &[int(value), data])?.as_i32();
        let b = cx.invoke_callback(func, &[int(value + 1), data])?.as_i32();
        Ok(int(a + b))
    });

    lib.define("demo_call_async", |cx, args| {
        cx.invoke_callback(arg(args, 0), &[int(1), arg(args, 1)])?;
        Ok(Argument::NULL)
    });

    lib.define("demo_run_unscoped", |cx, args| {
        cx.invoke_callback(arg(args, 0), &[int(5), Argument::NULL])
    });

    let handler: Handler = Rc::default();
    let slot = handler.clone();
    lib.define("demo_set_handler", move |_cx, args| {
        *slot.borrow_mut() = Some((arg(args, 0), arg(args, 1), arg(args, 2)));
        Ok(Argument::NULL)
    });
    let slot = handler.clone();
    lib.define("demo_fire_handler", move |cx, args| {
        let current = *slot.borrow();
        match current {
            Some((func, data, _)) if !func.is_null() => cx.invoke_callback(func, &[arg(args, 0), data]),
            _ => Ok(int(-1)),
        }
    });
    let slot = handler;
    lib.define("demo_clear_handler", move |cx, _args| {
        let current = slot.borrow_mut().take();
        if let Some((_, data, notify)) = current {
            cx.destroy_notify(notify, data)?;
        }
        Ok(Argument::NULL)
    });

    lib.define("demo_point_new", |cx, args| {
        let point = cx.alloc(8);
        cx.store(point, 4, arg(args, 0))?;
        cx.store(point + 4, 4, arg(args, 1))?;
        Ok(Argument::from_ptr(point))
    });

    lib.define("demo_point_sum", |cx, args| {
        let point = arg(args, 0).as_ptr();
        let x = cx.load(point, 4)?.as_i32();
        let y = cx.load(point + 4, 4)?.as_i32();
        Ok(int(x + y))
    });

    lib.define("demo_point_origin", |cx, args| {
        let point = arg(args, 0).as_ptr();
        cx.store(point, 4, int(1))?;
        cx.store(point + 4, 4, int(2))?;
        Ok(Argument::NULL)
    });

    lib.define("demo_widget_new", |cx, _args| {
        let widget = cx.alloc(8);
        cx.store(widget, 4, int(WIDGET_ID))?;
        Ok(Argument::from_ptr(widget))
    });

    lib.define("demo_widget_get_self", |_cx, args| Ok(arg(args, 0)));

    lib.define("demo_widget_get_id", |cx, args| cx.load(arg(args, 0).as_ptr(), 4));

    lib.define("demo_increment", |cx, args| {
        let cell = arg(args, 0).as_ptr();
        let value = cx.load(cell, 4)?.as_i32();
        cx.store(cell, 4, int(value + 1))?;
        Ok(Argument::NULL)
    });

    lib.define("demo_shade", |_cx, args| Ok(int(arg(args, 0).as_i32() * 2)));

    // Joins two names the callback returns without transferring them.
    lib.define("demo_name_twice", |cx, args| {
        let (func, data) = (arg(args, 0), arg(args, 1));
        let first = cx.invoke_callback(func, &[int(1), data])?;
        let second = cx.invoke_callback(func, &[int(2), data])?;
        let joined = format!("{} {}", cx.read_cstr(first.as_ptr())?, cx.read_cstr(second.as_ptr())?);
        Ok(Argument::from_ptr(cx.strdup(&joined)?))
    });

    lib.define("demo_get_data", |_cx, _args| Ok(Argument::from_ptr(0x1234)));

    // Reports far more elements than it allocated.
    lib.define("demo_bogus_range", |cx, args| {
        let buf = cx.alloc(8);
        cx.store(buf, 4, int(1))?;
        cx.store(buf + 4, 4, int(2))?;
        cx.store(arg(args, 0).as_ptr(), 8, Argument::from_i64(1 << 60))?;
        Ok(Argument::from_ptr(buf))
    });

    // Hands over a string, then returns a lone surrogate.
    lib.define("demo_bad_char", |cx, args| {
        let label = cx.strdup("surrogate")?;
        cx.store_ptr(arg(args, 0).as_ptr(), label)?;
        Ok(Argument::from_i64(0xD800))
    });

    // Runs the callback, then fails on its own as well.
    lib.define("demo_try_callback", |cx, args| {
        let value = cx.invoke_callback(arg(args, 0), &[int(1), arg(args, 1)])?;
        cx.set_error(arg(args, 2), PARSE_DOMAIN, 2, "callback failed")?;
        Ok(value)
    });

    lib
}

pub fn runtime() -> Runtime {
    Runtime::new(store(), library())
}

/// A script function adding `offset` to its first argument.
pub fn adder(offset: f64) -> gir_bridge::Value {
    gir_bridge::Value::function(move |args: &[gir_bridge::Value]| -> Result<gir_bridge::Value, Error> {
        let n = args.first().and_then(gir_bridge::Value::as_number).unwrap_or(0.0);
        Ok(gir_bridge::Value::Number(n + offset))
    })
}

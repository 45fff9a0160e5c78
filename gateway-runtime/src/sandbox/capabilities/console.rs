use std::sync::{Arc, Mutex, PoisonError};

use rhai::{Dynamic, Module};
use serde_json::Value;

use super::to_json;
use crate::types::ConsoleOutput;
use crate::sandbox::RhaiResultOf;

/// Shared handle to one execution's console buffers.
pub type ConsoleHandle = Arc<Mutex<ConsoleOutput>>;

pub(crate) fn push_log(console: &ConsoleHandle, args: Vec<Value>) {
    let mut out = console.lock().unwrap_or_else(PoisonError::into_inner);
    out.logs.push(Value::Array(args));
}

pub(crate) fn push_error(console: &ConsoleHandle, args: Vec<Value>) {
    let mut out = console.lock().unwrap_or_else(PoisonError::into_inner);
    out.errors.push(Value::Array(args));
}

/// `console::log` and `console::error`, each taking one to three values.
pub(super) fn module(console: &ConsoleHandle) -> Module {
    let mut module = Module::new();

    for (name, push) in [
        ("log", push_log as fn(&ConsoleHandle, Vec<Value>)),
        ("error", push_error),
    ] {
        let c = console.clone();
        module.set_native_fn(name, move |a: Dynamic| -> RhaiResultOf<()> {
            push(&c, vec![to_json(&a)]);
            Ok(())
        });
        let c = console.clone();
        module.set_native_fn(name, move |a: Dynamic, b: Dynamic| -> RhaiResultOf<()> {
            push(&c, vec![to_json(&a), to_json(&b)]);
            Ok(())
        });
        let c = console.clone();
        module.set_native_fn(
            name,
            move |a: Dynamic, b: Dynamic, d: Dynamic| -> RhaiResultOf<()> {
                push(&c, vec![to_json(&a), to_json(&b), to_json(&d)]);
                Ok(())
            },
        );
    }

    module
}

//! Capability modules granted to sandboxed scripts.
//!
//! Each module is registered under its own namespace (`console::log(..)`)
//! and is also importable by name (`import "crypto" as c`).

mod console;
mod crypto;
mod encoding;
mod html;
mod http;
mod numeric;
mod services;
pub(crate) mod system;
mod timer;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult, Map, Module, Position, Shared};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use tokio::runtime::Handle;

use super::resolver::GatewayModuleResolver;
use super::{Budget, CapabilityProfile, RhaiResultOf};
use crate::error::GatewayError;
use crate::metered::MeteredServiceClient;
use crate::types::ConsoleOutput;

pub use console::ConsoleHandle;

// ── Engine limits ───────────────────────────────────────────────────────────

const MAX_CALL_LEVELS: usize = 64;
const MAX_EXPR_DEPTH: usize = 128;
const MAX_FN_EXPR_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 32 * 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 1_000_000;
const MAX_MAP_SIZE: usize = 100_000;
const MAX_MODULES: usize = 32;
/// Operations between deadline checks.
const PROGRESS_CHECK_INTERVAL: u64 = 64;

/// Per-execution host context shared by the capability functions.
#[derive(Debug, Clone)]
pub struct Host {
    pub budget: Budget,
    pub handle: Handle,
}

impl Host {
    /// Drive an async host operation to completion from the engine thread,
    /// bounded by what is left of the budget.
    pub(crate) fn block_on<T>(
        &self,
        fut: impl Future<Output = Result<T, GatewayError>>,
    ) -> RhaiResultOf<T> {
        let remaining = self.budget.remaining();
        match self.handle.block_on(tokio::time::timeout(remaining, fut)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string().into()),
            Err(_) => Err(terminated()),
        }
    }
}

pub(crate) fn terminated() -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE).into()
}

/// Script value as JSON. Integral decimals that fit become numbers and the
/// rest keep their exact text; blobs become base64. Values with no JSON form
/// are rendered with their display text.
pub(crate) fn to_json(value: &Dynamic) -> Value {
    let value = value.flatten_clone();

    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);
    }
    if let Ok(d) = value.as_decimal() {
        return decimal_to_json(d);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if value.is_string() {
        return Value::String(value.to_string());
    }
    if let Some(blob) = value.read_lock::<Blob>() {
        return Value::String(STANDARD.encode(&*blob));
    }
    if let Some(array) = value.read_lock::<Array>() {
        return Value::Array(array.iter().map(to_json).collect());
    }
    if let Some(map) = value.read_lock::<Map>() {
        return Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), to_json(v)))
                .collect(),
        );
    }
    Value::String(value.to_string())
}

fn decimal_to_json(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
        if let Some(u) = d.to_u64() {
            return Value::from(u);
        }
    }
    Value::String(d.to_string())
}

pub(crate) fn from_json(value: &Value) -> RhaiResultOf<Dynamic> {
    rhai::serde::to_dynamic(value)
}

pub(crate) fn map_to_json(map: &Map) -> serde_json::Map<String, Value> {
    map.iter().map(|(k, v)| (k.to_string(), to_json(v))).collect()
}

pub(crate) fn snapshot(console: &ConsoleHandle) -> ConsoleOutput {
    console.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// The capabilities granted to one execution. Built fresh per call and
/// consumed by the engine it configures.
pub struct CapabilityRegistry {
    profile: CapabilityProfile,
    http: reqwest::Client,
    services: Option<MeteredServiceClient>,
    console: ConsoleHandle,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("profile", &self.profile)
            .field("modules", &self.module_names())
            .finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    pub fn new(profile: CapabilityProfile, http: reqwest::Client) -> Self {
        Self {
            profile,
            http,
            services: None,
            console: Arc::new(Mutex::new(ConsoleOutput::default())),
        }
    }

    /// Grant the `services` module, bound to this call's authorization.
    pub fn with_services(mut self, services: MeteredServiceClient) -> Self {
        self.services = Some(services);
        self
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    /// Handle to this execution's console buffers.
    pub fn console(&self) -> ConsoleHandle {
        self.console.clone()
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        let mut names = vec![
            "console", "timer", "http", "html", "buffer", "url", "decimal", "crypto",
        ];
        if self.services.is_some() {
            names.push("services");
        }
        if self.profile.fs_root().is_some() {
            names.extend(["fs", "process"]);
        }
        names
    }

    fn modules(&self, host: &Host) -> Vec<(&'static str, Module)> {
        let mut modules = vec![
            ("console", console::module(&self.console)),
            ("timer", timer::module(host.budget)),
            ("http", http::module(self.http.clone(), host.clone())),
            ("html", html::module()),
            ("buffer", encoding::buffer_module()),
            ("url", encoding::url_module()),
            ("decimal", numeric::module()),
            ("crypto", crypto::module()),
        ];
        if let Some(services) = &self.services {
            modules.push(("services", services::module(services.clone(), host.clone())));
        }
        if let Some(root) = self.profile.fs_root() {
            modules.push(("fs", system::fs_module(root.clone())));
            modules.push(("process", system::process_module(root.clone(), host.clone())));
        }
        modules
    }

    /// Configure a fresh engine exposing exactly these capabilities.
    pub(crate) fn build_engine(self, host: Host) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);
        engine.set_max_modules(MAX_MODULES);
        engine.disable_symbol("eval");

        let logs = self.console.clone();
        engine.on_print(move |text| console::push_log(&logs, vec![Value::String(text.into())]));
        let logs = self.console.clone();
        engine.on_debug(move |text, _source, _pos| {
            console::push_log(&logs, vec![Value::String(text.into())])
        });

        let budget = host.budget;
        engine.on_progress(move |ops| {
            if ops % PROGRESS_CHECK_INTERVAL == 0 && budget.is_exhausted() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        let mut resolver = GatewayModuleResolver::new(self.profile.fs_root().cloned());
        for (name, mut module) in self.modules(&host) {
            module.build_index();
            let module: Shared<Module> = module.into();
            engine.register_static_module(name, module.clone());
            resolver.insert(name, module);
        }
        engine.set_module_resolver(resolver);

        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_module_names_follow_profile() {
        let restricted = CapabilityRegistry::new(CapabilityProfile::Restricted, reqwest::Client::new());
        let names = restricted.module_names();
        assert!(names.contains(&"crypto"));
        assert!(!names.contains(&"fs"));
        assert!(!names.contains(&"services"));

        let extended = CapabilityRegistry::new(
            CapabilityProfile::Extended {
                fs_root: PathBuf::from("/tmp"),
            },
            reqwest::Client::new(),
        );
        let names = extended.module_names();
        assert!(names.contains(&"fs"));
        assert!(names.contains(&"process"));
    }

    #[test]
    fn test_registries_do_not_share_console() {
        let a = CapabilityRegistry::new(CapabilityProfile::Restricted, reqwest::Client::new());
        let b = CapabilityRegistry::new(CapabilityProfile::Restricted, reqwest::Client::new());
        console::push_log(&a.console(), vec![Value::from("only a")]);
        assert_eq!(snapshot(&a.console()).logs.len(), 1);
        assert!(snapshot(&b.console()).logs.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_block_on_respects_budget() {
        let host = Host {
            budget: Budget::start(Duration::from_millis(50)),
            handle: Handle::current(),
        };
        let terminated = tokio::task::spawn_blocking(move || {
            let result = host.block_on(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, GatewayError>(())
            });
            matches!(result, Err(e) if matches!(*e, EvalAltResult::ErrorTerminated(..)))
        })
        .await
        .unwrap();

        assert!(terminated);
    }
}

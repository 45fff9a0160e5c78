//! Isolated script execution.
//!
//! Every call builds a fresh `rhai` engine from a per-call
//! [`CapabilityRegistry`]; nothing survives between executions. Scripts
//! register their entry point in the `exports` map:
//!
//! ```text
//! exports.handler = |event| #{ body: event.queryParams.x };
//! ```
//!
//! A script-level `fn handler(event)` is accepted when `exports.handler` is
//! unset.

pub mod capabilities;
pub mod resolver;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rhai::{Dynamic, EvalAltResult, ImmutableString, Map, Scope};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::error::GatewayError;
use crate::types::{ConsoleOutput, DEFAULT_EXECUTION_TIMEOUT_SECS};

pub use capabilities::{CapabilityRegistry, ConsoleHandle};

pub(crate) type RhaiResultOf<T> = Result<T, Box<EvalAltResult>>;

/// Name of the export-declaration map seeded into every script scope.
pub const EXPORTS: &str = "exports";

/// Slack given to the in-engine deadline before the outer timeout fires.
const OUTER_GRACE: Duration = Duration::from_millis(250);

/// Which capabilities a script may reach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CapabilityProfile {
    /// Network, parsing, encoding and metered services. No filesystem or
    /// process access.
    #[default]
    Restricted,
    /// Adds `fs` and `process`, both confined to `fs_root`.
    Extended { fs_root: PathBuf },
}

impl CapabilityProfile {
    pub fn from_name(name: &str, fs_root: PathBuf) -> Result<Self, GatewayError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "restricted" => Ok(Self::Restricted),
            "extended" => Ok(Self::Extended { fs_root }),
            other => Err(GatewayError::Config(format!(
                "unknown capability profile '{other}' (expected restricted or extended)"
            ))),
        }
    }

    pub fn fs_root(&self) -> Option<&PathBuf> {
        match self {
            Self::Restricted => None,
            Self::Extended { fs_root } => Some(fs_root),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock ceiling for one execution.
    pub timeout: Duration,
    pub profile: CapabilityProfile,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
            profile: CapabilityProfile::Restricted,
        }
    }
}

/// Wall-clock budget of one execution.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit: Duration,
}

impl Budget {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Result of one execution. Console output is kept on failure too.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: Result<Value, GatewayError>,
    pub console: ConsoleOutput,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    http: reqwest::Client,
}

impl Sandbox {
    pub fn new(config: SandboxConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Fresh capability set for one execution, following this sandbox's
    /// profile. Attach metered services with
    /// [`CapabilityRegistry::with_services`].
    pub fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(self.config.profile.clone(), self.http.clone())
    }

    /// Compile and run `code`, then call its entry point with `event`.
    ///
    /// Runs on the blocking pool so other requests keep being served.
    pub async fn execute(
        &self,
        code: String,
        event: Value,
        registry: CapabilityRegistry,
    ) -> ExecutionOutcome {
        let budget = Budget::start(self.config.timeout);
        let console = registry.console();
        let host = capabilities::Host {
            budget,
            handle: Handle::current(),
        };

        let task = tokio::task::spawn_blocking(move || run(&code, event, registry, host));
        let result = match tokio::time::timeout(budget.limit() + OUTER_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(GatewayError::Sandbox(format!("execution task failed: {e}"))),
            Err(_) => Err(GatewayError::Timeout(budget.limit())),
        };

        if let Err(e) = &result {
            if e.is_script_failure() {
                tracing::debug!("Script failed: {e}");
            } else {
                tracing::warn!("Execution failed: {e}");
            }
        }

        ExecutionOutcome {
            result,
            console: capabilities::snapshot(&console),
        }
    }
}

/// Appended to every script; dispatches to the entry point within the same
/// evaluation so top-level imports stay visible to the handler.
const DISPATCH: &str = r#"
if type_of(exports.handler) == "Fn" {
    let entry = exports.handler;
    entry.call(GATEWAY_EVENT)
} else if is_def_fn("handler", 1) {
    handler(GATEWAY_EVENT)
} else {
    throw GATEWAY_NO_ENTRY;
}
"#;

/// Scope constant holding the event during dispatch.
const EVENT_VAR: &str = "GATEWAY_EVENT";
const NO_ENTRY_VAR: &str = "GATEWAY_NO_ENTRY";
const NO_ENTRY_MARKER: &str = "gateway:no-entry-point";

fn run(
    code: &str,
    event: Value,
    registry: CapabilityRegistry,
    host: capabilities::Host,
) -> Result<Value, GatewayError> {
    let budget = host.budget;
    let engine = registry.build_engine(host);

    let ast = engine
        .compile(code)
        .map_err(|e| GatewayError::Compile(e.to_string()))?;
    let dispatch = engine
        .compile(DISPATCH)
        .map_err(|e| GatewayError::Sandbox(format!("dispatch: {e}")))?;
    let program = ast.merge(&dispatch);

    let event = rhai::serde::to_dynamic(&event)
        .map_err(|e| GatewayError::Serialization(format!("event: {e}")))?;

    let mut scope = Scope::new();
    scope.push(EXPORTS, Map::new());
    scope.push_constant_dynamic(EVENT_VAR, event);
    scope.push_constant(NO_ENTRY_VAR, ImmutableString::from(NO_ENTRY_MARKER));

    let output = engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, &program)
        .map_err(|e| classify(&e, &budget))?;

    Ok(capabilities::to_json(&output))
}

fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => is_terminated(inner),
        _ => false,
    }
}

fn is_missing_entry(err: &EvalAltResult) -> bool {
    matches!(err, EvalAltResult::ErrorRuntime(value, _)
        if value.clone().into_immutable_string().is_ok_and(|s| s.as_str() == NO_ENTRY_MARKER))
}

fn classify(err: &EvalAltResult, budget: &Budget) -> GatewayError {
    if is_terminated(err) {
        GatewayError::Timeout(budget.limit())
    } else if is_missing_entry(err) {
        GatewayError::MissingEntryPoint
    } else {
        GatewayError::HandlerRuntime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox(timeout: Duration) -> Sandbox {
        Sandbox::new(
            SandboxConfig {
                timeout,
                ..Default::default()
            },
            reqwest::Client::new(),
        )
    }

    async fn exec(code: &str, event: Value) -> ExecutionOutcome {
        let sandbox = sandbox(Duration::from_secs(10));
        let registry = sandbox.registry();
        sandbox.execute(code.to_string(), event, registry).await
    }

    #[tokio::test]
    async fn test_exported_closure_receives_event() {
        let outcome = exec(
            "exports.handler = |e| #{ body: e.queryParams.x };",
            json!({"queryParams": {"x": "42"}}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), json!({"body": "42"}));
    }

    #[tokio::test]
    async fn test_script_function_fallback() {
        let outcome = exec(
            r#"
            fn handler(event) {
                event.n * 2
            }
            "#,
            json!({"n": 21}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_decimal_result_keeps_exact_text() {
        let outcome = exec(
            r#"exports.handler = |e| #{ price: decimal::parse("1.50"), whole: decimal::from_int(3) };"#,
            json!({}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), json!({"price": "1.50", "whole": 3}));
    }

    #[tokio::test]
    async fn test_blob_result_is_base64() {
        let outcome = exec(r#"exports.handler = |e| buffer::from_string("hi");"#, json!({})).await;
        assert_eq!(outcome.result.unwrap(), json!("aGk="));
    }

    #[tokio::test]
    async fn test_event_beyond_i64_round_trips() {
        let event = json!({"big": u64::MAX, "small": -1, "f": 0.5});
        let outcome = exec("exports.handler = |e| e;", event.clone()).await;
        assert_eq!(outcome.result.unwrap(), event);
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let outcome = exec("let x = 1;", json!({})).await;
        assert!(matches!(outcome.result, Err(GatewayError::MissingEntryPoint)));
    }

    #[tokio::test]
    async fn test_compile_error_runs_nothing() {
        let outcome = exec(r#"console::log("ran"); let x = ;"#, json!({})).await;
        assert!(matches!(outcome.result, Err(GatewayError::Compile(_))));
        assert!(outcome.console.logs.is_empty());
    }

    #[tokio::test]
    async fn test_throw_is_handler_error_with_console() {
        let outcome = exec(
            r#"
            exports.handler = |e| {
                console::log("before", 1);
                console::error("about to fail");
                throw "boom";
            };
            "#,
            json!({}),
        )
        .await;

        match outcome.result {
            Err(GatewayError::HandlerRuntime(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected HandlerRuntime, got {other:?}"),
        }
        assert_eq!(outcome.console.logs, vec![json!(["before", 1])]);
        assert_eq!(outcome.console.errors, vec![json!(["about to fail"])]);
    }

    #[tokio::test]
    async fn test_print_lands_in_log_buffer() {
        let outcome = exec(
            r#"print("hello"); exports.handler = |e| ();"#,
            json!({}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), Value::Null);
        assert_eq!(outcome.console.logs, vec![json!(["hello"])]);
    }

    #[tokio::test]
    async fn test_endless_loop_times_out() {
        let sandbox = sandbox(Duration::from_millis(300));
        let started = Instant::now();
        let outcome = sandbox
            .execute(
                "exports.handler = |e| { loop { } };".into(),
                json!({}),
                sandbox.registry(),
            )
            .await;

        assert!(matches!(outcome.result, Err(GatewayError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timer_beyond_budget_times_out() {
        let sandbox = sandbox(Duration::from_millis(200));
        let outcome = sandbox
            .execute(
                "exports.handler = |e| timer::set_timeout(|| 1, 60000);".into(),
                json!({}),
                sandbox.registry(),
            )
            .await;
        assert!(matches!(outcome.result, Err(GatewayError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_timer_callback_value() {
        let outcome = exec(
            "exports.handler = |e| timer::set_timeout(|| e.v + 1, 10);",
            json!({"v": 1}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_executions_are_isolated() {
        let sandbox = sandbox(Duration::from_secs(5));
        let code = r#"
            if exports.contains("handler") { throw "stale exports"; }
            console::log("run");
            exports.handler = |e| e.n;
        "#;

        for n in 0..2 {
            let outcome = sandbox
                .execute(code.into(), json!({"n": n}), sandbox.registry())
                .await;
            assert_eq!(outcome.result.unwrap(), json!(n));
            assert_eq!(outcome.console.logs.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_aws_sdk_import_denied() {
        let outcome = exec(
            r#"import "aws-sdk" as aws; exports.handler = |e| 1;"#,
            json!({}),
        )
        .await;
        match outcome.result {
            Err(GatewayError::HandlerRuntime(msg)) => assert!(msg.contains("aws-sdk")),
            other => panic!("expected HandlerRuntime, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capability_import_alias() {
        let outcome = exec(
            r#"
            import "crypto" as c;
            exports.handler = |e| c::sha256("abc");
            "#,
            json!({}),
        )
        .await;
        assert_eq!(
            outcome.result.unwrap(),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[tokio::test]
    async fn test_decimal_is_exact() {
        let outcome = exec(
            r#"exports.handler = |e| (decimal::parse("0.1") + decimal::parse("0.2")).to_string();"#,
            json!({}),
        )
        .await;
        assert_eq!(outcome.result.unwrap(), json!("0.3"));
    }

    #[tokio::test]
    async fn test_restricted_profile_has_no_fs() {
        let outcome = exec(r#"exports.handler = |e| fs::read("x");"#, json!({})).await;
        assert!(matches!(outcome.result, Err(GatewayError::Compile(_) | GatewayError::HandlerRuntime(_))));
    }

    #[test]
    fn test_profile_from_name() {
        let root = PathBuf::from("/srv/scripts");
        assert_eq!(
            CapabilityProfile::from_name("", root.clone()).unwrap(),
            CapabilityProfile::Restricted
        );
        assert_eq!(
            CapabilityProfile::from_name("Extended", root.clone()).unwrap().fs_root(),
            Some(&root)
        );
        assert!(CapabilityProfile::from_name("root", root).is_err());
    }
}

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rhai::{Dynamic, INT, ImmutableString, Map, Module};
use serde_json::{Map as JsonMap, Value};

use super::{Host, from_json, map_to_json};
use crate::error::GatewayError;
use crate::metered::{MeteredServiceClient, RequestConfig};
use crate::sandbox::RhaiResultOf;

type WrapperFuture = LocalBoxFuture<'static, Result<Value, GatewayError>>;
type Wrapper = fn(MeteredServiceClient, String, JsonMap<String, Value>) -> WrapperFuture;

/// Catalog wrappers taking one primary argument plus optional parameters.
fn wrappers() -> [(&'static str, Wrapper); 8] {
    [
        ("text_to_image", |c, prompt, p| {
            async move { c.text_to_image(&prompt, p).await }.boxed_local()
        }),
        ("speech_to_text", |c, audio, p| {
            async move { c.speech_to_text(&audio, p).await }.boxed_local()
        }),
        ("webpage_to_text", |c, url, p| {
            async move { c.webpage_to_text(&url, p).await }.boxed_local()
        }),
        ("google_search", |c, q, p| {
            async move { c.google_search(&q, p).await }.boxed_local()
        }),
        ("document_to_text", |c, url, p| {
            async move { c.document_to_text(&url, p).await }.boxed_local()
        }),
        ("image_to_text", |c, url, p| {
            async move { c.image_to_text(&url, p).await }.boxed_local()
        }),
        ("detect_language", |c, text, p| {
            async move { c.detect_language(&text, p).await }.boxed_local()
        }),
        ("text_to_speech", |c, text, p| {
            async move { c.text_to_speech(&text, p).await }.boxed_local()
        }),
    ]
}

fn request_config(options: &Map) -> RhaiResultOf<RequestConfig> {
    let max_amount = match options.get("maxAmount") {
        None => None,
        Some(v) => {
            let n = v
                .as_int()
                .map_err(|t| format!("maxAmount must be an integer, got {t}"))?;
            Some(u64::try_from(n).map_err(|_| "maxAmount must not be negative")?)
        }
    };
    Ok(RequestConfig {
        max_amount,
        ..Default::default()
    })
}

fn request(
    client: &MeteredServiceClient,
    host: &Host,
    endpoint: &str,
    payee: Option<&str>,
    params: Map,
    options: &Map,
) -> RhaiResultOf<Map> {
    let params = map_to_json(&params);
    let config = request_config(options)?;
    let response = match payee {
        Some(payee) => host.block_on(client.call(endpoint, payee, &params, &config))?,
        None => host.block_on(client.call_catalog_url(endpoint, &params, &config))?,
    };

    let data = match response.json() {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(&response.body).into_owned()),
    };

    let mut out = Map::new();
    out.insert("status".into(), Dynamic::from(INT::from(response.status)));
    out.insert(
        "contentType".into(),
        response.content_type.map_or(Dynamic::UNIT, Dynamic::from),
    );
    out.insert("data".into(), from_json(&data)?);
    Ok(out)
}

/// The metered service client: `services::request(endpoint, payee, params[, options])`
/// plus one function per catalog wrapper.
pub(super) fn module(client: MeteredServiceClient, host: Host) -> Module {
    let mut module = Module::new();

    for (name, wrapper) in wrappers() {
        let (c, h) = (client.clone(), host.clone());
        module.set_native_fn(name, move |arg: ImmutableString| -> RhaiResultOf<Dynamic> {
            let value = h.block_on(wrapper(c.clone(), arg.to_string(), JsonMap::new()))?;
            from_json(&value)
        });
        let (c, h) = (client.clone(), host.clone());
        module.set_native_fn(
            name,
            move |arg: ImmutableString, params: Map| -> RhaiResultOf<Dynamic> {
                let params = map_to_json(&params);
                let value = h.block_on(wrapper(c.clone(), arg.to_string(), params))?;
                from_json(&value)
            },
        );
    }

    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn(
        "translate",
        move |text: ImmutableString, to: ImmutableString| -> RhaiResultOf<Dynamic> {
            let value = h.block_on(c.translate(&text, &to))?;
            from_json(&value)
        },
    );

    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn("request", move |endpoint: ImmutableString, params: Map| {
        request(&c, &h, &endpoint, None, params, &Map::new())
    });
    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn(
        "request",
        move |endpoint: ImmutableString, payee: ImmutableString, params: Map| {
            request(&c, &h, &endpoint, Some(payee.as_str()), params, &Map::new())
        },
    );
    let (c, h) = (client, host);
    module.set_native_fn(
        "request",
        move |endpoint: ImmutableString, payee: ImmutableString, params: Map, options: Map| {
            request(&c, &h, &endpoint, Some(payee.as_str()), params, &options)
        },
    );

    module
}

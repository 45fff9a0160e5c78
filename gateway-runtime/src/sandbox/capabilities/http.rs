use std::collections::BTreeMap;

use reqwest::Method;
use rhai::{Dynamic, INT, ImmutableString, Map, Module};
use serde_json::Value;

use super::{Host, from_json, to_json};
use crate::error::GatewayError;
use crate::sandbox::RhaiResultOf;

#[derive(Debug, Default)]
struct RequestOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl RequestOptions {
    fn from_map(options: &Map) -> RhaiResultOf<Self> {
        let mut parsed = Self::default();
        for (key, value) in options {
            let pairs = || -> RhaiResultOf<Vec<(String, String)>> {
                let map = value
                    .read_lock::<Map>()
                    .ok_or_else(|| format!("http option '{key}' must be a map"))?;
                Ok(map.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            };
            match key.as_str() {
                "headers" => parsed.headers = pairs()?,
                "query" => parsed.query = pairs()?,
                other => return Err(format!("unknown http option '{other}'").into()),
            }
        }
        Ok(parsed)
    }
}

struct RawResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    text: String,
}

fn send(
    client: &reqwest::Client,
    host: &Host,
    method: Method,
    url: &str,
    body: Option<Dynamic>,
    options: &Map,
) -> RhaiResultOf<Map> {
    let options = RequestOptions::from_map(options)?;

    let mut request = client.request(method, url);
    for (name, value) in &options.headers {
        request = request.header(name, value);
    }
    if !options.query.is_empty() {
        request = request.query(&options.query);
    }
    request = match body {
        Some(body) if body.is_string() => request.body(body.to_string()),
        Some(body) => request.json(&to_json(&body)),
        None => request,
    };

    let response = host.block_on(async move {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let text = response.text().await?;
        Ok::<_, GatewayError>(RawResponse {
            status,
            headers,
            text,
        })
    })?;

    if !(200..300).contains(&response.status) {
        return Err(format!("Request failed with status code {}", response.status).into());
    }

    let data = serde_json::from_str::<Value>(&response.text)
        .unwrap_or(Value::String(response.text));

    let mut out = Map::new();
    out.insert("status".into(), Dynamic::from(INT::from(response.status)));
    out.insert("headers".into(), from_json(&serde_json::to_value(&response.headers).unwrap_or_default())?);
    out.insert("data".into(), from_json(&data)?);
    Ok(out)
}

/// `http::get(url[, options])` and `http::post(url, body[, options])`.
/// Options: `headers` and `query` maps. Non-2xx statuses raise.
pub(super) fn module(client: reqwest::Client, host: Host) -> Module {
    let mut module = Module::new();

    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn("get", move |url: ImmutableString| {
        send(&c, &h, Method::GET, &url, None, &Map::new())
    });
    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn("get", move |url: ImmutableString, options: Map| {
        send(&c, &h, Method::GET, &url, None, &options)
    });
    let (c, h) = (client.clone(), host.clone());
    module.set_native_fn("post", move |url: ImmutableString, body: Dynamic| {
        send(&c, &h, Method::POST, &url, Some(body), &Map::new())
    });
    let (c, h) = (client, host);
    module.set_native_fn(
        "post",
        move |url: ImmutableString, body: Dynamic, options: Map| {
            send(&c, &h, Method::POST, &url, Some(body), &options)
        },
    );

    module
}

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rhai::{Blob, Dynamic, ImmutableString, Map, Module};

use crate::sandbox::RhaiResultOf;

// ── buffer ──────────────────────────────────────────────────────────────────

/// Byte buffers as `Blob`s: `from_string`, `to_string`, base64 and hex.
pub(super) fn buffer_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("from_string", |s: ImmutableString| -> RhaiResultOf<Blob> {
        Ok(s.as_bytes().to_vec())
    });
    module.set_native_fn("to_string", |b: Blob| -> RhaiResultOf<String> {
        Ok(String::from_utf8_lossy(&b).into_owned())
    });
    module.set_native_fn("from_base64", |s: ImmutableString| -> RhaiResultOf<Blob> {
        STANDARD
            .decode(s.trim())
            .map_err(|e| format!("invalid base64: {e}").into())
    });
    module.set_native_fn("to_base64", |b: Blob| -> RhaiResultOf<String> {
        Ok(STANDARD.encode(&b))
    });
    module.set_native_fn("from_hex", |s: ImmutableString| -> RhaiResultOf<Blob> {
        let s = s.trim();
        hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| format!("invalid hex: {e}").into())
    });
    module.set_native_fn("to_hex", |b: Blob| -> RhaiResultOf<String> {
        Ok(hex::encode(&b))
    });

    module
}

// ── url ─────────────────────────────────────────────────────────────────────

/// WHATWG-style breakdown of `href`.
fn parse_url(href: &str) -> RhaiResultOf<Map> {
    let url = url::Url::parse(href).map_err(|e| format!("invalid url '{href}': {e}"))?;

    let hostname = url.host_str().unwrap_or_default().to_string();
    let port = url.port().map(|p| p.to_string()).unwrap_or_default();
    let host = if port.is_empty() {
        hostname.clone()
    } else {
        format!("{hostname}:{port}")
    };

    let mut params = Map::new();
    for (k, v) in url.query_pairs() {
        params.insert(k.into_owned().into(), Dynamic::from(v.into_owned()));
    }

    let mut out = Map::new();
    out.insert("href".into(), Dynamic::from(url.as_str().to_string()));
    out.insert("protocol".into(), Dynamic::from(format!("{}:", url.scheme())));
    out.insert("host".into(), Dynamic::from(host));
    out.insert("hostname".into(), Dynamic::from(hostname));
    out.insert("port".into(), Dynamic::from(port));
    out.insert("pathname".into(), Dynamic::from(url.path().to_string()));
    out.insert(
        "search".into(),
        Dynamic::from(url.query().map(|q| format!("?{q}")).unwrap_or_default()),
    );
    out.insert(
        "hash".into(),
        Dynamic::from(url.fragment().map(|f| format!("#{f}")).unwrap_or_default()),
    );
    out.insert("searchParams".into(), Dynamic::from_map(params));
    Ok(out)
}

/// `url::parse(href)`, `url::join(base, relative)` and `url::encode(text)`.
pub(super) fn url_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("parse", |href: ImmutableString| parse_url(&href));
    module.set_native_fn(
        "join",
        |base: ImmutableString, relative: ImmutableString| -> RhaiResultOf<String> {
            let base = url::Url::parse(&base).map_err(|e| format!("invalid url '{base}': {e}"))?;
            let joined = base
                .join(&relative)
                .map_err(|e| format!("cannot join '{relative}': {e}"))?;
            Ok(joined.to_string())
        },
    );
    module.set_native_fn("encode", |text: ImmutableString| -> RhaiResultOf<String> {
        Ok(url::form_urlencoded::byte_serialize(text.as_bytes()).collect())
    });

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_fields() {
        let parts = parse_url("https://api.example.com:8443/v1/items?q=rust&page=2#top").unwrap();
        let field = |k: &str| parts.get(k).unwrap().to_string();

        assert_eq!(field("protocol"), "https:");
        assert_eq!(field("host"), "api.example.com:8443");
        assert_eq!(field("hostname"), "api.example.com");
        assert_eq!(field("port"), "8443");
        assert_eq!(field("pathname"), "/v1/items");
        assert_eq!(field("search"), "?q=rust&page=2");
        assert_eq!(field("hash"), "#top");

        let params = parts.get("searchParams").unwrap().clone().cast::<Map>();
        assert_eq!(params.get("q").unwrap().to_string(), "rust");
    }

    #[test]
    fn test_default_port_is_empty() {
        let parts = parse_url("https://example.com/").unwrap();
        assert_eq!(parts.get("port").unwrap().to_string(), "");
        assert_eq!(parts.get("host").unwrap().to_string(), "example.com");
    }

    #[test]
    fn test_parse_rejects_relative() {
        assert!(parse_url("/just/a/path").is_err());
    }
}

use rhai::{Array, Dynamic, ImmutableString, Module};
use scraper::{ElementRef, Html, Selector};

use crate::sandbox::RhaiResultOf;

fn selector(css: &str) -> RhaiResultOf<Selector> {
    Selector::parse(css).map_err(|e| format!("invalid selector '{css}': {e:?}").into())
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(el.text())
}

fn select_text(html: &str, css: &str) -> RhaiResultOf<Array> {
    let selector = selector(css)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .map(|el| Dynamic::from(element_text(el)))
        .collect())
}

fn select_attr(html: &str, css: &str, attr: &str) -> RhaiResultOf<Array> {
    let selector = selector(css)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| Dynamic::from(v.to_string()))
        .collect())
}

fn document_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body = Selector::parse("body").ok();
    match body.as_ref().and_then(|sel| doc.select(sel).next()) {
        Some(body) => element_text(body),
        None => element_text(doc.root_element()),
    }
}

/// `html::select_text(html, css)`, `html::select_attr(html, css, attr)` and
/// `html::text(html)`.
pub(super) fn module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("select_text", |html: ImmutableString, css: ImmutableString| {
        select_text(&html, &css)
    });
    module.set_native_fn(
        "select_attr",
        |html: ImmutableString, css: ImmutableString, attr: ImmutableString| {
            select_attr(&html, &css, &attr)
        },
    );
    module.set_native_fn("text", |html: ImmutableString| -> RhaiResultOf<String> {
        Ok(document_text(&html))
    });

    module
}

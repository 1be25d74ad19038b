//! Turns a widget configuration into a request descriptor

use reqwest::Url;
use std::collections::BTreeMap;

use crate::errors::{ErrorKind, Result};
use crate::models::service::WidgetConfig;
use crate::models::widget::RequestDescriptor;
use crate::services::widgets::Widget;

const LOCAL_BASE: &str = "http://localhost/";

/// Build the request for a widget's own endpoint.
pub fn build_for(service: &str, config: &WidgetConfig, widget: &dyn Widget) -> Result<RequestDescriptor> {
    let endpoint = widget.build_request(config)?;
    build(service, config, widget, Some(&endpoint.suffix), &endpoint.query)
}

/// Build a request descriptor for `suffix` below the widget's base URL.
///
/// Query precedence, lowest first: configuration options, `query`, then any
/// parameters embedded in `suffix`. Requests that need credentials (or that
/// the widget kind always proxies) are addressed to the gateway's proxy route;
/// the real target is kept in the server-side part of the descriptor.
pub fn build(
    service: &str,
    config: &WidgetConfig,
    widget: &dyn Widget,
    suffix: Option<&str>,
    query: &BTreeMap<String, String>,
) -> Result<RequestDescriptor> {
    let base = base_url(config, widget)?;
    let (path, embedded) = split_suffix(suffix.unwrap_or(""));

    let mut merged = config.options.clone();
    merged.extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(embedded);

    let mut target = base
        .join(path)
        .map_err(|e| ErrorKind::config(format!("invalid endpoint '{}': {}", path, e)))?;
    target.set_query(None);
    if !merged.is_empty() {
        target.query_pairs_mut().extend_pairs(merged.iter());
    }

    let has_credentials = config.credentials.as_ref().is_some_and(|c| !c.is_empty())
        || !base.username().is_empty()
        || base.password().is_some();
    let proxied = widget.requires_proxy() || has_credentials;

    let url = if proxied {
        let mut pairs = vec![("endpoint", path)];
        pairs.extend(merged.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        local_url(&["api", "widgets", service, "proxy"], pairs)
    } else {
        target.to_string()
    };

    let mut headers = BTreeMap::new();
    headers.insert("accept".to_string(), "application/json".to_string());

    Ok(RequestDescriptor {
        method: "GET".to_string(),
        url,
        headers,
        service: proxied.then(|| service.to_string()),
        target: target.to_string(),
    })
}

/// Resolved base URL of a widget, always ending in `/`.
pub fn base_url(config: &WidgetConfig, widget: &dyn Widget) -> Result<Url> {
    let raw = config
        .url
        .as_deref()
        .or(widget.default_base_url())
        .ok_or_else(|| ErrorKind::config(format!("{} widget requires a url", widget.kind())))?;

    let mut url =
        Url::parse(raw).map_err(|e| ErrorKind::config(format!("invalid widget url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ErrorKind::config(format!(
            "widget url must be an absolute http(s) url, got scheme '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Split `path?query` and drop leading slashes so the path stays relative to
/// the base URL.
fn split_suffix(suffix: &str) -> (&str, Vec<(String, String)>) {
    let suffix = suffix.trim_start_matches('/');
    match suffix.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (suffix, Vec::new()),
    }
}

fn local_base() -> Url {
    Url::parse(LOCAL_BASE).expect("static base url is valid")
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    let mut url = local_base();
    url.set_query(Some(query));
    url.query_pairs().into_owned().collect()
}

/// Path and query of a URL served by this process, percent-encoded.
pub(crate) fn local_url<'a, I>(segments: &[&str], query: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut url = local_base();
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }

    let pairs: Vec<_> = query.into_iter().collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

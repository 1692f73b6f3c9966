//! URL assembly: template substitution, parameter encoding, and
//! `api-version` precedence.
//!
//! URLs are built as plain strings. Parsing into a structured URL type would
//! re-encode reserved characters and break the byte-for-byte passthrough
//! guarantees callers rely on for resource IDs embedded in paths.

use crate::error::Error;
use std::borrow::Cow;

const API_VERSION_PARAM: &str = "api-version";

/// A positional path parameter for a `{placeholder}` in a template.
#[derive(Clone, Debug)]
pub struct PathParam {
    value: String,
    allow_reserved: bool,
}

impl PathParam {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            allow_reserved: false,
        }
    }

    /// Pass RFC 3986 reserved characters through unencoded. Needed for
    /// values that are themselves path fragments, e.g. ARM resource IDs.
    pub fn allow_reserved(mut self) -> Self {
        self.allow_reserved = true;
        self
    }

    fn encoded(&self) -> Cow<'_, str> {
        if self.allow_reserved {
            Cow::Borrowed(self.value.as_str())
        } else {
            urlencoding::encode(&self.value)
        }
    }
}

impl From<&str> for PathParam {
    fn from(value: &str) -> Self {
        PathParam::new(value)
    }
}

impl From<String> for PathParam {
    fn from(value: String) -> Self {
        PathParam::new(value)
    }
}

/// A query parameter value: one or more items plus an array serialization
/// mode. Multi-valued parameters default to comma-joining
/// (`colors=blue,red,green`); [`explode`](QueryParam::explode) repeats the
/// key instead (`colors=blue&colors=red&colors=green`).
#[derive(Clone, Debug)]
pub struct QueryParam {
    values: Vec<String>,
    explode: bool,
}

impl QueryParam {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
            explode: false,
        }
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            explode: false,
        }
    }

    /// Serialize a multi-valued parameter by repeating the key.
    pub fn explode(mut self) -> Self {
        self.explode = true;
        self
    }

    fn serialize(&self, name: &str, skip_encoding: bool, out: &mut Vec<String>) {
        let encode = |value: &str| -> String {
            if skip_encoding {
                value.to_string()
            } else {
                urlencoding::encode(value).into_owned()
            }
        };
        let name = encode(name);
        if self.explode {
            for value in &self.values {
                out.push(format!("{name}={}", encode(value)));
            }
        } else {
            let joined = self
                .values
                .iter()
                .map(|value| encode(value))
                .collect::<Vec<_>>()
                .join(",");
            out.push(format!("{name}={joined}"));
        }
    }

    fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::new(value)
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        QueryParam::new(value)
    }
}

impl From<Vec<String>> for QueryParam {
    fn from(values: Vec<String>) -> Self {
        QueryParam::list(values)
    }
}

impl From<Vec<&str>> for QueryParam {
    fn from(values: Vec<&str>) -> Self {
        QueryParam::list(values)
    }
}

/// Assembles the final request URL.
///
/// `api-version` precedence: a value embedded in the endpoint or template
/// query string wins over a per-call query parameter, which wins over the
/// client default. Exactly one survives; the losers are dropped entirely.
pub fn build_url(
    endpoint: &str,
    template: &str,
    path_params: &[PathParam],
    query_params: &[(String, QueryParam)],
    client_api_version: Option<&str>,
    skip_url_encoding: bool,
) -> Result<String, Error> {
    let (endpoint_base, endpoint_query) = split_query(endpoint);
    let (template_path, template_query) = split_query(template);

    let path = substitute(template_path, path_params)?;
    let mut url = endpoint_base.trim_end_matches('/').to_string();
    if !path.is_empty() {
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&path);
    }

    // Caller-embedded query strings are treated as pre-encoded.
    let mut parts: Vec<String> = Vec::new();
    for embedded in [endpoint_query, template_query].into_iter().flatten() {
        if !embedded.is_empty() {
            parts.push(embedded.to_string());
        }
    }
    let embedded_has_api_version = parts
        .iter()
        .any(|part| query_contains(part, API_VERSION_PARAM));

    let call_api_version = query_params
        .iter()
        .find(|(name, _)| name == API_VERSION_PARAM)
        .and_then(|(_, param)| param.first());

    for (name, param) in query_params {
        if name == API_VERSION_PARAM && embedded_has_api_version {
            continue;
        }
        param.serialize(name, skip_url_encoding, &mut parts);
    }

    if !embedded_has_api_version && call_api_version.is_none() {
        if let Some(version) = client_api_version {
            let mut param = Vec::new();
            QueryParam::new(version).serialize(API_VERSION_PARAM, skip_url_encoding, &mut param);
            parts.extend(param);
        }
    }

    if !parts.is_empty() {
        url.push('?');
        url.push_str(&parts.join("&"));
    }
    Ok(url)
}

/// Replaces `{placeholder}`s with positional parameter values.
fn substitute(template: &str, params: &[PathParam]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut params = params.iter();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let close = after.find('}').ok_or_else(|| {
            Error::Configuration(format!("unterminated path placeholder in {template:?}"))
        })?;
        let param = params.next().ok_or_else(|| {
            Error::Configuration(format!("not enough path parameters for {template:?}"))
        })?;
        out.push_str(&param.encoded());
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    if params.next().is_some() {
        return Err(Error::Configuration(format!(
            "too many path parameters for {template:?}"
        )));
    }
    Ok(out)
}

/// Resolves a possibly-relative reference (e.g. a `Location` header)
/// against the URL it was received from.
pub(crate) fn resolve_reference(base_url: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    let origin = match base_url.find("://") {
        Some(scheme_end) => {
            let authority_start = scheme_end + 3;
            match base_url[authority_start..].find('/') {
                Some(path_start) => &base_url[..authority_start + path_start],
                None => base_url,
            }
        }
        None => base_url,
    };
    if reference.starts_with('/') {
        format!("{origin}{reference}")
    } else {
        format!("{origin}/{reference}")
    }
}

fn split_query(input: &str) -> (&str, Option<&str>) {
    match input.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (input, None),
    }
}

fn query_contains(query: &str, name: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.split('=').next() == Some(name))
}

//! Spec codec: canonical text for injection, LZ-string tokens for URL transfer.
//!
//! The host editor reads `?spec=` with lz-string's
//! `decompressFromEncodedURIComponent`, so the token alphabet is the
//! URI-safe one (`A-Za-z0-9+-$`) and needs no further escaping.

use crate::spec::ChartSpec;
use crate::{Error, Result};

/// Transport-safe compressed form of a spec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedToken(String);

impl EncodedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EncodedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize a spec to the pretty JSON text the editor expects.
pub fn serialize(spec: &ChartSpec) -> Result<String> {
    serde_json::to_string_pretty(spec.as_value())
        .map_err(|e| Error::EncodingFailure(format!("Spec is not serializable: {}", e)))
}

/// Compress `serialize(spec)` into a URL-safe token.
#[cfg(feature = "lz")]
pub fn encode_for_transport(spec: &ChartSpec) -> Result<EncodedToken> {
    let text = serialize(spec)?;
    let token = lz_str::compress_to_encoded_uri_component(text.as_str());
    if token.is_empty() {
        return Err(Error::EncodingFailure("Compression produced an empty token".into()));
    }
    Ok(EncodedToken(token))
}

#[cfg(not(feature = "lz"))]
pub fn encode_for_transport(_spec: &ChartSpec) -> Result<EncodedToken> {
    Err(Error::EncodingFailure(
        "URL transfer requires the `lz` feature (lz-string compression is not compiled in)".into(),
    ))
}

/// Reverse of `encode_for_transport`, as the host performs it.
#[cfg(feature = "lz")]
pub fn decode_token(token: &str) -> Result<ChartSpec> {
    let wide = lz_str::decompress_from_encoded_uri_component(token)
        .ok_or_else(|| Error::EncodingFailure("Token is not a valid lz-string payload".into()))?;
    let text = String::from_utf16(&wide)
        .map_err(|e| Error::EncodingFailure(format!("Decoded token is not UTF-16 text: {}", e)))?;
    ChartSpec::from_json_str(&text)
}

#[cfg(not(feature = "lz"))]
pub fn decode_token(_token: &str) -> Result<ChartSpec> {
    Err(Error::EncodingFailure(
        "Token decoding requires the `lz` feature".into(),
    ))
}

/// Build the editor URL that carries `token` as its `spec` query parameter.
///
/// The editor uses hash routing, so the query lives after the fragment
/// (`.../#/Editor?spec=...`) and is appended verbatim.
pub fn editor_url(base: &str, token: &EncodedToken) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}spec={}", base, sep, token)
}

#[cfg(all(test, feature = "lz"))]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonicalize(spec: &ChartSpec) -> serde_json::Value {
        serde_json::from_str(&spec.as_value().to_string()).unwrap()
    }

    #[test]
    fn token_round_trips_through_host_decoding() {
        let spec = ChartSpec::new(json!({
            "source": {"name": "samples", "source": "https://example.org/example_samples.csv"},
            "transformation": [
                {"groupby": ["organ", "organ_condition"]},
                {"rollup": {"count": {"op": "count"}}}
            ],
            "representation": {
                "mark": "bar",
                "mapping": [
                    {"encoding": "x", "field": "count", "type": "quantitative"},
                    {"encoding": "y", "field": "organ", "type": "nominal"},
                    {"encoding": "color", "field": "organ_condition", "type": "nominal"}
                ]
            }
        }));

        let token = encode_for_transport(&spec).unwrap();
        let decoded = decode_token(token.as_str()).unwrap();
        assert_eq!(decoded.as_value(), &canonicalize(&spec));
    }

    #[test]
    fn non_ascii_and_empty_structures_survive() {
        let spec = ChartSpec::new(json!({
            "source": {"name": "größe", "source": "./data/données.csv"},
            "transformation": [],
            "representation": {"mark": "point", "mapping": []}
        }));
        let token = encode_for_transport(&spec).unwrap();
        assert_eq!(decode_token(token.as_str()).unwrap(), spec);
    }

    #[test]
    fn token_is_uri_safe_and_deterministic() {
        let spec = ChartSpec::new(json!({"representation": {"mark": "point"}}));
        let a = encode_for_transport(&spec).unwrap();
        let b = encode_for_transport(&spec).unwrap();
        assert_eq!(a, b);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '$'));
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(matches!(decode_token("%%%"), Err(Error::EncodingFailure(_))));
    }

    #[test]
    fn editor_url_appends_spec_query() {
        let token = EncodedToken("abc".into());
        assert_eq!(
            editor_url("https://host/#/Editor", &token),
            "https://host/#/Editor?spec=abc"
        );
        assert_eq!(editor_url("http://h/?x=1", &token), "http://h/?x=1&spec=abc");
    }

    #[test]
    fn serialize_is_pretty_and_parseable() {
        let spec = ChartSpec::new(json!({"a": {"b": [1, 2]}}));
        let text = serialize(&spec).unwrap();
        assert!(text.contains("\n  \"a\""));
        assert_eq!(ChartSpec::from_json_str(&text).unwrap(), spec);
    }
}

//! Interchangeable client implementations of the "create artifact" operation.
//!
//! Every variant owns its transport and serialization policy and is shared
//! immutably by all measurement threads. Internal synchronization (connection
//! pools, runtimes) is the variant's own business; callers never lock around
//! `invoke_create`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BenchError, InvokeError, Result};
use crate::models::{CreateArtifact, CreateArtifactResponse};
use crate::serialization::SerializationPolicy;

pub mod reqwest_async;
pub mod reqwest_blocking;
pub mod ureq_agent;

pub use reqwest_async::ReqwestAsyncVariant;
pub use reqwest_blocking::ReqwestBlockingVariant;
pub use ureq_agent::UreqVariant;

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// The capability every client variant provides
pub trait ClientVariant: Send + Sync {
    fn kind(&self) -> VariantKind;

    fn base_url(&self) -> &str;

    /// Policy request and response bodies go through
    fn serialization(&self) -> SerializationPolicy;

    /// `POST /groups/{group_id}/artifacts` with `request` as the JSON body
    fn invoke_create(
        &self,
        group_id: &str,
        request: &CreateArtifact,
    ) -> std::result::Result<CreateArtifactResponse, InvokeError>;
}

/// Identity tag of a client variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariantKind {
    #[serde(rename = "reqwest-blocking")]
    ReqwestBlocking,
    #[serde(rename = "ureq-http1")]
    UreqHttp1,
    #[serde(rename = "reqwest-async")]
    ReqwestAsync,
}

impl VariantKind {
    pub const ALL: [VariantKind; 3] = [
        VariantKind::ReqwestBlocking,
        VariantKind::UreqHttp1,
        VariantKind::ReqwestAsync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::ReqwestBlocking => "reqwest-blocking",
            VariantKind::UreqHttp1 => "ureq-http1",
            VariantKind::ReqwestAsync => "reqwest-async",
        }
    }

    /// Serialization and transport a variant is built with unless overridden
    ///
    /// `ureq-http1` pins HTTP/1.1; the reqwest variants negotiate. All write
    /// ISO-8601 dates.
    pub fn default_policies(&self) -> (SerializationPolicy, TransportPolicy) {
        match self {
            VariantKind::ReqwestBlocking | VariantKind::ReqwestAsync => {
                (SerializationPolicy::iso8601(), TransportPolicy::default())
            }
            VariantKind::UreqHttp1 => (
                SerializationPolicy::iso8601(),
                TransportPolicy {
                    http1_only: true,
                    ..TransportPolicy::default()
                },
            ),
        }
    }

    /// Whether the date encoding is part of the variant's construction and
    /// ignores the run-wide setting
    pub fn pins_date_encoding(&self) -> bool {
        matches!(self, VariantKind::ReqwestAsync)
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for VariantKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        VariantKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BenchError::UnknownVariant(s.to_string()))
    }
}

/// Connection handling of one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportPolicy {
    /// Pin HTTP/1.1 instead of negotiating
    pub http1_only: bool,
    /// Idle pooled connections kept per host
    pub pool_max_idle_per_host: usize,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds (none by default)
    pub request_timeout_ms: Option<u64>,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            http1_only: false,
            pool_max_idle_per_host: 64,
            connect_timeout_ms: 10_000,
            request_timeout_ms: None,
        }
    }
}

impl TransportPolicy {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Construct a variant; never contacts the endpoint
pub fn build_variant(
    kind: VariantKind,
    base_url: &str,
    serialization: SerializationPolicy,
    transport: &TransportPolicy,
) -> Result<Box<dyn ClientVariant>> {
    let variant: Box<dyn ClientVariant> = match kind {
        VariantKind::ReqwestBlocking => Box::new(ReqwestBlockingVariant::new(
            base_url,
            serialization,
            transport,
        )?),
        VariantKind::UreqHttp1 => Box::new(UreqVariant::new(base_url, serialization, transport)?),
        VariantKind::ReqwestAsync => Box::new(ReqwestAsyncVariant::new(
            base_url,
            serialization,
            transport,
        )?),
    };

    tracing::debug!(
        variant = %kind,
        base_url = %base_url,
        dates = %serialization.dates,
        http1_only = transport.http1_only,
        "Client variant constructed"
    );
    Ok(variant)
}

pub(crate) fn parse_base_url(kind: VariantKind, base_url: &str) -> Result<reqwest::Url> {
    let url = reqwest::Url::parse(base_url).map_err(|e| BenchError::ClientBuild {
        variant: kind.to_string(),
        message: format!("invalid base URL {base_url:?}: {e}"),
    })?;
    if url.cannot_be_a_base() {
        return Err(BenchError::ClientBuild {
            variant: kind.to_string(),
            message: format!("base URL {base_url:?} cannot carry a path"),
        });
    }
    Ok(url)
}

/// `{base}/groups/{group_id}/artifacts`, with `group_id` percent-encoded
pub(crate) fn create_artifact_url(base: &reqwest::Url, group_id: &str) -> reqwest::Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["groups", group_id, "artifacts"]);
    }
    url
}

/// Short label for a reqwest failure, used as the transport error message
pub(crate) fn describe_reqwest_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    };
    format!("{e} (kind: {kind})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Fixtures, CREATE_ARTIFACT_RESPONSE};
    use mockito::Matcher;
    use serde_json::json;

    fn build(kind: VariantKind, base_url: &str) -> Box<dyn ClientVariant> {
        build_variant(
            kind,
            base_url,
            SerializationPolicy::iso8601(),
            &TransportPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_variant_kind_parsing() {
        assert_eq!("ureq-http1".parse::<VariantKind>().unwrap(), VariantKind::UreqHttp1);
        assert_eq!(
            " Reqwest-Blocking ".parse::<VariantKind>().unwrap(),
            VariantKind::ReqwestBlocking
        );
        assert!(matches!(
            "okhttp".parse::<VariantKind>(),
            Err(BenchError::UnknownVariant(_))
        ));
    }

    #[test]
    fn test_variant_kind_serde_matches_display() {
        for kind in VariantKind::ALL {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{kind}\""));
        }
    }

    #[test]
    fn test_create_artifact_url_encodes_group() {
        let base = reqwest::Url::parse("http://127.0.0.1:9000").unwrap();
        assert_eq!(
            create_artifact_url(&base, "default").as_str(),
            "http://127.0.0.1:9000/groups/default/artifacts"
        );
        assert_eq!(
            create_artifact_url(&base, "my group/x").as_str(),
            "http://127.0.0.1:9000/groups/my%20group%2Fx/artifacts"
        );

        let prefixed = reqwest::Url::parse("http://127.0.0.1:9000/apis/registry/v3/").unwrap();
        assert_eq!(
            create_artifact_url(&prefixed, "g").as_str(),
            "http://127.0.0.1:9000/apis/registry/v3/groups/g/artifacts"
        );
    }

    #[test]
    fn test_invalid_base_url_is_build_error() {
        for kind in VariantKind::ALL {
            let result = build_variant(
                kind,
                "not a url",
                SerializationPolicy::default(),
                &TransportPolicy::default(),
            );
            assert!(matches!(result, Err(BenchError::ClientBuild { .. })));
        }
    }

    #[test]
    fn test_every_variant_sends_the_same_request() {
        let fixtures = Fixtures::build().unwrap();
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/groups/default/artifacts")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_body(Matcher::Json(json!({
                "artifactId": "bench-artifact",
                "artifactType": "AVRO",
                "firstVersion": {
                    "version": "1.0.0",
                    "content": {
                        "content": crate::fixture::SCHEMA_CONTENT,
                        "contentType": "application/json"
                    }
                }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(CREATE_ARTIFACT_RESPONSE)
            .expect(3)
            .create();

        for kind in VariantKind::ALL {
            let variant = build(kind, &server.url());
            assert_eq!(variant.kind(), kind);
            let result = variant.invoke_create("default", &fixtures.request).unwrap();
            assert_eq!(result, fixtures.response.expected, "variant {kind}");
        }

        mock.assert();
    }

    #[test]
    fn test_date_like_description_is_sent_verbatim_under_epoch_millis() {
        let fixtures = Fixtures::build().unwrap();
        let mut request = fixtures.request.clone();
        request.description = Some("2024-01-01T00:00:00Z".to_string());

        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/groups/default/artifacts")
            .match_body(Matcher::PartialJson(json!({
                "description": "2024-01-01T00:00:00Z"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(CREATE_ARTIFACT_RESPONSE)
            .expect(3)
            .create();

        for kind in VariantKind::ALL {
            let variant = build_variant(
                kind,
                &server.url(),
                SerializationPolicy::epoch_millis(),
                &TransportPolicy::default(),
            )
            .unwrap();
            let result = variant.invoke_create("default", &request).unwrap();
            assert_eq!(result, fixtures.response.expected, "variant {kind}");
        }

        mock.assert();
    }

    #[test]
    fn test_construction_does_not_contact_endpoint() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", Matcher::Any).expect(0).create();

        let variants: Vec<_> = VariantKind::ALL
            .into_iter()
            .map(|kind| build(kind, &server.url()))
            .collect();
        assert_eq!(variants.len(), 3);

        mock.assert();
    }

    #[test]
    fn test_not_found_maps_to_unmatched() {
        let fixtures = Fixtures::build().unwrap();
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(404)
            .with_body("Request was not matched")
            .create();

        for kind in VariantKind::ALL {
            let err = build(kind, &server.url())
                .invoke_create("default", &fixtures.request)
                .unwrap_err();
            assert!(matches!(err, InvokeError::Unmatched { .. }), "variant {kind}: {err}");
        }
    }

    #[test]
    fn test_server_error_maps_to_status() {
        let fixtures = Fixtures::build().unwrap();
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create();

        for kind in VariantKind::ALL {
            let err = build(kind, &server.url())
                .invoke_create("default", &fixtures.request)
                .unwrap_err();
            assert!(
                matches!(err, InvokeError::Status { status: 503, ref body } if body == "unavailable"),
                "variant {kind}: {err}"
            );
        }
    }

    #[test]
    fn test_malformed_body_maps_to_decode_error() {
        let fixtures = Fixtures::build().unwrap();
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"artifact": 1}"#)
            .create();

        for kind in VariantKind::ALL {
            let err = build(kind, &server.url())
                .invoke_create("default", &fixtures.request)
                .unwrap_err();
            assert_eq!(err.kind(), "decode", "variant {kind}");
        }
    }

    #[test]
    fn test_refused_connection_maps_to_transport_error() {
        let fixtures = Fixtures::build().unwrap();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        for kind in VariantKind::ALL {
            let err = build(kind, &format!("http://127.0.0.1:{port}"))
                .invoke_create("default", &fixtures.request)
                .unwrap_err();
            assert_eq!(err.kind(), "transport", "variant {kind}: {err}");
        }
    }

    #[test]
    fn test_transport_policy_defaults() {
        let policy = TransportPolicy::default();
        assert!(!policy.http1_only);
        assert_eq!(policy.connect_timeout(), Duration::from_secs(10));
        assert_eq!(policy.request_timeout(), None);
    }

    #[test]
    fn test_default_policies_per_variant() {
        let (_, ureq) = VariantKind::UreqHttp1.default_policies();
        assert!(ureq.http1_only);

        for kind in [VariantKind::ReqwestBlocking, VariantKind::ReqwestAsync] {
            let (serialization, transport) = kind.default_policies();
            assert_eq!(serialization, SerializationPolicy::iso8601());
            assert!(!transport.http1_only, "{kind}");
        }

        assert!(VariantKind::ReqwestAsync.pins_date_encoding());
        assert!(!VariantKind::ReqwestBlocking.pins_date_encoding());
    }
}

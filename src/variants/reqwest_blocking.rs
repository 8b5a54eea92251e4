use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::{
    create_artifact_url, describe_reqwest_error, parse_base_url, ClientVariant, TransportPolicy,
    VariantKind, APPLICATION_JSON,
};
use crate::error::{BenchError, InvokeError, Result};
use crate::models::{CreateArtifact, CreateArtifactResponse};
use crate::serialization::SerializationPolicy;

/// Blocking reqwest client with its own connection pool
pub struct ReqwestBlockingVariant {
    /// Shared HTTP client with connection pooling
    client: Client,
    base_url: reqwest::Url,
    serialization: SerializationPolicy,
}

impl ReqwestBlockingVariant {
    pub fn new(
        base_url: &str,
        serialization: SerializationPolicy,
        transport: &TransportPolicy,
    ) -> Result<Self> {
        let kind = VariantKind::ReqwestBlocking;
        let base_url = parse_base_url(kind, base_url)?;

        let mut builder = Client::builder()
            .pool_max_idle_per_host(transport.pool_max_idle_per_host)
            .connect_timeout(transport.connect_timeout())
            .timeout(transport.request_timeout());
        if transport.http1_only {
            builder = builder.http1_only();
        }

        let client = builder.build().map_err(|e| BenchError::ClientBuild {
            variant: kind.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            serialization,
        })
    }
}

impl ClientVariant for ReqwestBlockingVariant {
    fn kind(&self) -> VariantKind {
        VariantKind::ReqwestBlocking
    }

    fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn serialization(&self) -> SerializationPolicy {
        self.serialization
    }

    fn invoke_create(
        &self,
        group_id: &str,
        request: &CreateArtifact,
    ) -> std::result::Result<CreateArtifactResponse, InvokeError> {
        let body = self.serialization.encode(request).map_err(InvokeError::Encode)?;

        let response = self
            .client
            .post(create_artifact_url(&self.base_url, group_id))
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(body)
            .send()
            .map_err(|e| InvokeError::Transport(describe_reqwest_error(&e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .map_err(|e| InvokeError::Transport(describe_reqwest_error(&e)))?;

        if !status.is_success() {
            return Err(InvokeError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        self.serialization.decode(&bytes).map_err(InvokeError::Decode)
    }
}

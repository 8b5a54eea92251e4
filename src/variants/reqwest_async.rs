use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tokio::runtime::Runtime;

use super::{
    create_artifact_url, describe_reqwest_error, parse_base_url, ClientVariant, TransportPolicy,
    VariantKind, APPLICATION_JSON,
};
use crate::error::{BenchError, InvokeError, Result};
use crate::models::{CreateArtifact, CreateArtifactResponse};
use crate::serialization::SerializationPolicy;

/// Async reqwest client driven from blocking callers through an owned runtime
///
/// Every calling thread enters the runtime with `block_on`; the pool and the
/// runtime's I/O driver are shared across all of them.
pub struct ReqwestAsyncVariant {
    runtime: Runtime,
    client: Client,
    base_url: reqwest::Url,
    serialization: SerializationPolicy,
}

impl ReqwestAsyncVariant {
    pub fn new(
        base_url: &str,
        serialization: SerializationPolicy,
        transport: &TransportPolicy,
    ) -> Result<Self> {
        let kind = VariantKind::ReqwestAsync;
        let base_url = parse_base_url(kind, base_url)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("reqwest-async-variant")
            .enable_all()
            .build()
            .map_err(BenchError::Runtime)?;

        let client = {
            let _guard = runtime.enter();
            let mut builder = Client::builder()
                .pool_max_idle_per_host(transport.pool_max_idle_per_host)
                .connect_timeout(transport.connect_timeout());
            if let Some(timeout) = transport.request_timeout() {
                builder = builder.timeout(timeout);
            }
            if transport.http1_only {
                builder = builder.http1_only();
            }
            builder.build().map_err(|e| BenchError::ClientBuild {
                variant: kind.to_string(),
                message: e.to_string(),
            })?
        };

        Ok(Self {
            runtime,
            client,
            base_url,
            serialization,
        })
    }

    async fn create(
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
            .await
            .map_err(|e| InvokeError::Transport(describe_reqwest_error(&e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
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

impl ClientVariant for ReqwestAsyncVariant {
    fn kind(&self) -> VariantKind {
        VariantKind::ReqwestAsync
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
        self.runtime.block_on(self.create(group_id, request))
    }
}

use ureq::Agent;

use super::{
    create_artifact_url, parse_base_url, ClientVariant, TransportPolicy, VariantKind,
    APPLICATION_JSON,
};
use crate::error::{InvokeError, Result};
use crate::models::{CreateArtifact, CreateArtifactResponse};
use crate::serialization::SerializationPolicy;

/// ureq agent speaking HTTP/1.1 over a pooled set of idle connections
///
/// ureq never negotiates HTTP/2, so the transport policy's `http1_only`
/// flag is always satisfied.
pub struct UreqVariant {
    agent: Agent,
    base_url: reqwest::Url,
    serialization: SerializationPolicy,
}

impl UreqVariant {
    pub fn new(
        base_url: &str,
        serialization: SerializationPolicy,
        transport: &TransportPolicy,
    ) -> Result<Self> {
        let base_url = parse_base_url(VariantKind::UreqHttp1, base_url)?;

        // Status codes are returned as data so the variant can classify them.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .max_idle_connections_per_host(transport.pool_max_idle_per_host)
            .max_idle_connections(transport.pool_max_idle_per_host)
            .timeout_connect(Some(transport.connect_timeout()))
            .timeout_global(transport.request_timeout())
            .build()
            .new_agent();

        Ok(Self {
            agent,
            base_url,
            serialization,
        })
    }
}

impl ClientVariant for UreqVariant {
    fn kind(&self) -> VariantKind {
        VariantKind::UreqHttp1
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
        let url = create_artifact_url(&self.base_url, group_id);

        let mut response = self
            .agent
            .post(url.as_str())
            .header("accept", APPLICATION_JSON)
            .content_type(APPLICATION_JSON)
            .send(&body[..])
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(InvokeError::from_status(
                status,
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        self.serialization.decode(&bytes).map_err(InvokeError::Decode)
    }
}

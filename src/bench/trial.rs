//! Per-trial state: mock endpoint, fixtures and client variants.

use super::config::BenchmarkConfig;
use super::mock_server::{MockEndpoint, StubRule};
use crate::error::Result;
use crate::fixture::Fixtures;
use crate::variants::{build_variant, ClientVariant, VariantKind};

/// Path pattern of the single stub every trial registers
pub const CREATE_ARTIFACT_PATH_PATTERN: &str = "/groups/.*/artifacts";

/// Stub answering every create call with the response fixture
pub fn create_artifact_stub(fixtures: &Fixtures) -> StubRule {
    StubRule::post(CREATE_ARTIFACT_PATH_PATTERN)
        .status(200)
        .header("Content-Type", "application/json")
        .body(fixtures.response.body.clone())
}

/// Everything one trial owns; released on `teardown` or drop
pub struct TrialContext {
    variants: Vec<Box<dyn ClientVariant>>,
    fixtures: Fixtures,
    endpoint: MockEndpoint,
}

impl TrialContext {
    /// Build fixtures, start the endpoint, register the stub, construct variants
    pub fn setup(config: &BenchmarkConfig, kinds: &[VariantKind]) -> Result<Self> {
        let fixtures = Fixtures::build()?;

        let mut endpoint = MockEndpoint::new();
        endpoint.start(0)?;
        endpoint.register_stub(create_artifact_stub(&fixtures))?;

        let base_url = endpoint.base_url();
        let variants = kinds
            .iter()
            .map(|&kind| {
                let (serialization, transport) = config.policies_for(kind);
                build_variant(kind, &base_url, serialization, &transport)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            base_url = %base_url,
            variants = ?kinds,
            "Trial set up"
        );

        Ok(Self {
            variants,
            fixtures,
            endpoint,
        })
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    pub fn endpoint(&self) -> &MockEndpoint {
        &self.endpoint
    }

    pub fn variant(&self, kind: VariantKind) -> Option<&dyn ClientVariant> {
        self.variants
            .iter()
            .find(|variant| variant.kind() == kind)
            .map(|variant| variant.as_ref())
    }

    pub fn variants(&self) -> impl Iterator<Item = &dyn ClientVariant> {
        self.variants.iter().map(|variant| variant.as_ref())
    }

    /// Release clients, then the endpoint
    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for TrialContext {
    fn drop(&mut self) {
        // Close client pools before the endpoint drains its connections.
        self.variants.clear();

        let unmatched = self.endpoint.unmatched_requests();
        if unmatched > 0 {
            tracing::warn!(
                unmatched,
                matched = self.endpoint.matched_requests(),
                "Mock endpoint received requests that matched no stub"
            );
        }

        self.endpoint.stop();
        tracing::debug!("Trial torn down");
    }
}

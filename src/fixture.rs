//! Request and response fixtures shared by every client variant in a trial.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{BenchError, Result};
use crate::models::{CreateArtifact, CreateArtifactResponse, CreateVersion, VersionContent};

pub const ARTIFACT_ID: &str = "bench-artifact";
pub const ARTIFACT_TYPE: &str = "AVRO";
pub const VERSION: &str = "1.0.0";
pub const CONTENT_TYPE: &str = "application/json";
pub const SCHEMA_CONTENT: &str =
    r#"{"type":"record","name":"TestType","fields":[{"name":"id","type":"string"}]}"#;

/// Body served by the mock endpoint for every matched create call
pub const CREATE_ARTIFACT_RESPONSE: &str = r#"{
  "artifact": {
    "groupId": "default",
    "artifactId": "bench-artifact",
    "name": "Bench Artifact",
    "description": "A test artifact",
    "artifactType": "AVRO",
    "owner": "user1",
    "createdOn": "2024-01-01T00:00:00Z",
    "modifiedBy": "user1",
    "modifiedOn": "2024-01-01T00:00:00Z",
    "labels": {}
  },
  "version": {
    "version": "1.0.0",
    "globalId": 1,
    "contentId": 1,
    "groupId": "default",
    "artifactId": "bench-artifact",
    "artifactType": "AVRO",
    "owner": "user1",
    "createdOn": "2024-01-01T00:00:00Z",
    "name": "Version 1",
    "description": "First version",
    "labels": {}
  }
}"#;

/// Fixed response served verbatim, plus its decoded form for parity checks
#[derive(Debug, Clone)]
pub struct ResponseFixture {
    pub body: Bytes,
    pub expected: CreateArtifactResponse,
}

/// Fixtures built once per trial and never mutated afterwards
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub request: CreateArtifact,
    pub response: ResponseFixture,
}

impl Fixtures {
    /// Build the request payload and validate the canned response
    pub fn build() -> Result<Self> {
        let expected: CreateArtifactResponse = serde_json::from_str(CREATE_ARTIFACT_RESPONSE)
            .map_err(|e| BenchError::Fixture(format!("response fixture does not decode: {e}")))?;

        let request = build_request();
        if expected.artifact.artifact_id != request.artifact_id {
            return Err(BenchError::Fixture(format!(
                "response describes artifact {} but request creates {}",
                expected.artifact.artifact_id, request.artifact_id
            )));
        }

        tracing::debug!(
            artifact_id = %request.artifact_id,
            response_bytes = CREATE_ARTIFACT_RESPONSE.len(),
            "Fixtures built"
        );

        Ok(Self {
            request,
            response: ResponseFixture {
                body: Bytes::from_static(CREATE_ARTIFACT_RESPONSE.as_bytes()),
                expected,
            },
        })
    }
}

fn build_request() -> CreateArtifact {
    CreateArtifact {
        artifact_id: ARTIFACT_ID.to_string(),
        artifact_type: ARTIFACT_TYPE.to_string(),
        name: None,
        description: None,
        labels: BTreeMap::new(),
        first_version: CreateVersion {
            version: VERSION.to_string(),
            content: VersionContent {
                content: SCHEMA_CONTENT.to_string(),
                content_type: CONTENT_TYPE.to_string(),
            },
            name: None,
            description: None,
        },
    }
}

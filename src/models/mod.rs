// Data models for the registry API

pub mod registry;

pub use registry::{
    ArtifactMetaData, CreateArtifact, CreateArtifactResponse, CreateVersion, VersionContent,
    VersionMetaData,
};

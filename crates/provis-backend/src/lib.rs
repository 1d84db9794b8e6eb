//! External collaborators of the installer.
//!
//! The installer core talks to three traits: `ProvisioningBackend` reads
//! feature-pack descriptors and materializes a provisioning config into a
//! directory, `ChannelResolver` maps coordinates to the versions a channel
//! offers and fetches their archives, and `LicenseSource` lists the licenses
//! a feature-pack requires. `LocalRepository` + `LocalChannel` implement them
//! over a directory of tar archives; `MockBackend` implements all three in
//! memory for tests.

pub mod archive;
pub mod backend;
pub mod channel;
pub mod config;
pub mod local;
pub mod mock;

pub use archive::{pack_dir, read_descriptor, unpack_content};
pub use backend::{select_backend, Backends, LicenseSource, ProvisioningBackend};
pub use channel::{ChannelManifest, ChannelResolver, LocalChannel, Stream};
pub use config::InstallerConfig;
pub use local::LocalRepository;
pub use mock::MockBackend;

use provis_schema::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("invalid feature-pack descriptor: {0}")]
    Descriptor(#[from] SchemaError),
    #[error("failed to parse channel manifest: {0}")]
    Channel(#[from] toml::de::Error),
    #[error("feature-pack '{0}' has no version to resolve an artifact for")]
    Unversioned(String),
    #[error("failed to fetch artifact '{coordinate}': {reason}")]
    Fetch { coordinate: String, reason: String },
    #[error("archive '{0}' has no feature-pack.toml")]
    MissingDescriptor(String),
    #[error("unsafe path in archive: {0}")]
    UnsafePath(String),
    #[error("installer configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("materialization failed: {0}")]
    Materialize(String),
}

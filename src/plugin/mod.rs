pub mod installer;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod source;

pub use installer::{GitFetcher, SourceFetcher};
pub use manager::{InstallResult, PluginLifecycleManager};
pub use manifest::PluginDescriptor;
pub use registry::{PluginRecord, Registry, RegistryStore};
pub use source::InstallSource;

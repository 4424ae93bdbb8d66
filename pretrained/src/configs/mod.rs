mod loader;
mod registry;

pub use loader::{DEFAULT_BASE_URL, LoaderConfig};
pub use registry::{ModelKind, Registry};

pub mod descriptor;
pub mod gate;
pub mod source;

pub use descriptor::VersionDescriptor;
pub use gate::{newer_release, UpdateCheckOptions, UpdateGate};
pub use source::{HttpVersionSource, VersionSource};

/// Build number of this binary. Bump on every release; remote descriptors
/// are compared against it numerically.
pub const CURRENT_VERSION_CODE: u64 = 1;

pub const CURRENT_VERSION_LABEL: &str = env!("CARGO_PKG_VERSION");

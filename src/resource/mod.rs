//! Reading, merging and applying the operator's managed resources

pub mod apply;
pub mod merge;
pub mod read;

pub use apply::{apply_deployment, apply_directly, ApplyAction, ApplyResult, FIELD_MANAGER};
pub use merge::{expected_deployment_generation, merge_object_meta, set_deployment_generation};
pub use read::{read_deployment, read_manifest, Manifest};

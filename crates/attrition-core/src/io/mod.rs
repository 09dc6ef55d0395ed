pub mod bundle;
pub mod reference;

pub use bundle::{load_artifact, PipelineArtifact};
pub use reference::{read_reference_records, read_request_records};

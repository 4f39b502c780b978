pub mod extraction_job;
pub mod field_map;
pub mod job;
pub mod loaders;
pub mod request;

pub use extraction_job::{ExtractionJob, ExtractionStatus};
pub use field_map::{ExtractedFieldMap, TECH_SPECS_FIELD};
pub use job::{AnalysisJob, JobId, JobStage, JobStatus};
pub use loaders::{load_manifest, load_request, BatchManifest, ManifestEntry};
pub use request::{AnalysisRequest, DocumentUpload};

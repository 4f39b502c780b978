pub mod toml_loader;

pub use toml_loader::{
    guess_content_type, load_manifest, load_request, BatchManifest, ManifestEntry,
};

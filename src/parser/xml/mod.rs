mod manifest;
mod resources;

pub use manifest::{ManifestFacts, ManifestParser};
pub use resources::{ResourceAttribute, ResourceDocument, ResourceElement, ResourceFolder, ResourceParser};

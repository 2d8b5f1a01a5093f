//! The zip container and the JSON shapes stored inside it.

pub mod control_json;
pub mod store;

pub use control_json::{ControlFile, ControlJson, control_from_json, control_to_json};
pub use store::{ArchiveEntry, ArchiveStore, MemoryArchive};

/// Entry names the document model reads and writes itself.
pub mod entries {
    pub const HEADER: &str = "Header.json";
    pub const PROPERTIES: &str = "Properties.json";
    pub const CONTROLS_DIR: &str = "Controls/";
    pub const COMPONENTS_DIR: &str = "Components/";
    pub const TEMPLATES: &str = "References/Templates.json";
    pub const THEMES: &str = "References/Themes.json";
    pub const DATA_SOURCES: &str = "References/DataSources.json";
    pub const RESOURCES: &str = "References/Resources.json";
    pub const CONNECTIONS: &str = "Connections/Connections.json";
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// Config file names probed in the working directory, first match wins.
const CONFIG_PATHS: [&str; 4] = ["appsource.toml", "appsource.yaml", "appsource.json", ".appsource.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Checksum normalization settings
    pub checksum: ChecksumConfig,

    /// Source tree read/write settings
    pub source: SourceConfig,
}

/// Normalization data for the canonical checksum.
///
/// The double-encoded path lists describe known quirks of the archive
/// schema for one algorithm version. Changing them changes digests, so a
/// new list ships together with a new `version_tag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig
{
    /// Prefix of rendered digests, e.g. `C8_<base64>`
    pub version_tag: String,

    /// Property paths whose string values hold a nested JSON document
    pub json_double_paths: Vec<String>,

    /// Property paths whose string values hold a nested XML document
    pub xml_double_paths: Vec<String>,

    /// Entry name excluded from its own digest
    pub artifact_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig
{
    /// Re-emit every parsed source file and compare it with its original text
    pub validate_round_trip: bool,

    /// Verify the stored checksum when packing a source tree
    pub verify_checksum: bool,
}

impl Default for ChecksumConfig
{
    fn default() -> Self
    {
        Self {
            version_tag: "C8".to_string(),
            json_double_paths: [
                "LocalConnectionReferences",
                "LocalDatabaseReferences",
                "LibraryDependencies",
                "DynamicControlDefinitionJson",
                "DataSources\\TableDefinition",
                "DataSources\\DataEntityMetadataJson",
                "DataSources\\ApiInfo",
            ]
            .map(String::from)
            .to_vec(),
            xml_double_paths: ["UsedTemplates\\Template", "PcfTemplates\\Template"]
                .map(String::from)
                .to_vec(),
            artifact_name: "checksum.json".to_string(),
        }
    }
}

impl Default for SourceConfig
{
    fn default() -> Self
    {
        Self { validate_round_trip: true, verify_checksum: true }
    }
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    for path in &CONFIG_PATHS
    {
        if Path::new(path).exists()
        {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // APPSOURCE_CHECKSUM__VERSION_TAG=C9 and friends
    builder = builder.add_source(config::Environment::with_prefix("APPSOURCE").separator("__"));

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("appsource.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

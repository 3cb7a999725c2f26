//! Registry configuration
//!
//! Every registry root carries a `json-schema-manager-config.yml`:
//!
//! ```yaml
//! defaultJsonSchemaVersion: https://json-schema.org/draft/2020-12/schema
//! environments:
//!   dev:
//!     privateUrlRoot: https://schemas.dev.internal.example.com
//!     publicUrlRoot: https://schemas.dev.example.com
//!     allowSchemaMutation: true
//!   prod:
//!     privateUrlRoot: https://schemas.internal.example.com
//!     publicUrlRoot: https://schemas.example.com
//!     isProduction: true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{Result, SchemaError};
use crate::validator::Draft;

/// Name of the configuration file at the registry root
pub const CONFIG_FILENAME: &str = "json-schema-manager-config.yml";

/// On-disk shape; every field optional so missing ones can be named
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    environments: Option<BTreeMap<String, RawEnvConfig>>,
    default_json_schema_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvConfig {
    private_url_root: Option<String>,
    public_url_root: Option<String>,
    #[serde(default)]
    is_production: bool,
    #[serde(default)]
    allow_schema_mutation: bool,
}

/// Settings for one deployment environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub name: String,
    pub private_url_root: String,
    pub public_url_root: String,
    pub is_production: bool,
    pub allow_schema_mutation: bool,
}

impl EnvConfig {
    /// URL prefix for a schema of the given visibility
    pub fn url_root(&self, is_public: bool) -> &str {
        if is_public {
            &self.public_url_root
        } else {
            &self.private_url_root
        }
    }
}

/// Validated registry configuration
#[derive(Debug, Clone)]
pub struct Config {
    environments: BTreeMap<String, EnvConfig>,
    default_draft: Draft,
}

impl Config {
    /// Load and validate the configuration file under `root`
    pub fn load(root: &Path, supported: &[Draft]) -> Result<Self> {
        let path = root.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Err(SchemaError::MissingConfig { path });
        }
        let content = fs::read_to_string(&path).map_err(SchemaError::io(&path))?;
        Self::parse(path, &content, supported)
    }

    /// Validate configuration text; `path` is only used for error context
    pub fn parse(path: PathBuf, content: &str, supported: &[Draft]) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| SchemaError::InvalidYaml {
            path,
            reason: e.to_string(),
        })?;

        let raw_envs = match raw.environments {
            Some(envs) if !envs.is_empty() => envs,
            _ => {
                return Err(SchemaError::MissingProperty {
                    property: "environments".to_string(),
                })
            }
        };

        let mut environments = BTreeMap::new();
        for (name, env) in raw_envs {
            let private_url_root =
                validate_url_root(&name, "privateUrlRoot", env.private_url_root)?;
            let public_url_root = validate_url_root(&name, "publicUrlRoot", env.public_url_root)?;
            environments.insert(
                name.clone(),
                EnvConfig {
                    name,
                    private_url_root,
                    public_url_root,
                    is_production: env.is_production,
                    allow_schema_mutation: env.allow_schema_mutation,
                },
            );
        }

        let production = environments.values().filter(|e| e.is_production).count();
        if production != 1 {
            return Err(SchemaError::MustHaveExactlyOneProductionEnvironment { count: production });
        }

        let version = raw
            .default_json_schema_version
            .ok_or_else(|| SchemaError::MissingProperty {
                property: "defaultJsonSchemaVersion".to_string(),
            })?;
        let default_draft = Draft::from_url(&version)
            .filter(|d| supported.contains(d))
            .ok_or(SchemaError::InvalidDefaultJsonSchemaVersion { version })?;

        Ok(Self {
            environments,
            default_draft,
        })
    }

    pub fn default_draft(&self) -> Draft {
        self.default_draft
    }

    /// Look up an environment by name
    pub fn env(&self, name: &str) -> Result<&EnvConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEnvironment {
                name: name.to_string(),
            })
    }

    /// The single production environment
    pub fn production_env(&self) -> &EnvConfig {
        self.environments
            .values()
            .find(|e| e.is_production)
            .expect("validated config has exactly one production environment")
    }
}

fn validate_url_root(env: &str, field: &str, value: Option<String>) -> Result<String> {
    let property = format!("environments.{}.{}", env, field);
    let value = match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => return Err(SchemaError::MissingProperty { property }),
    };

    let url = Url::parse(&value).map_err(|e| SchemaError::InvalidUrl {
        property: property.clone(),
        url: value.clone(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "https" {
        return Err(SchemaError::InvalidUrl {
            property,
            url: value,
            reason: "URL roots must use https".to_string(),
        });
    }

    Ok(value.trim_end_matches('/').to_string())
}

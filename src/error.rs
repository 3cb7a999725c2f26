//! Error types for the schema manager

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Which of a schema's test directories an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Pass,
    Fail,
}

impl TestKind {
    /// Directory name next to the schema document
    pub fn dir_name(&self) -> &'static str {
        match self {
            TestKind::Pass => "pass",
            TestKind::Fail => "fail",
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Schema manager errors
#[derive(Error, Debug)]
pub enum SchemaError {
    // ---- input validation ----
    #[error("Invalid characters in schema key '{key}': use letters, digits, '-' and '_'")]
    InvalidSchemaKeyCharacters { key: String },

    #[error("Schema key '{key}' has no domain segment")]
    NoDomain { key: String },

    #[error("Invalid major version '{value}' in schema key '{key}'")]
    InvalidMajorVersion { key: String, value: String },

    #[error("Invalid minor version '{value}' in schema key '{key}'")]
    InvalidMinorVersion { key: String, value: String },

    #[error("Invalid patch version '{value}' in schema key '{key}'")]
    InvalidPatchVersion { key: String, value: String },

    #[error("Invalid family name '{name}'")]
    InvalidFamilyName { name: String },

    #[error("Invalid domain segment '{domain}'")]
    InvalidDomain { domain: String },

    #[error("Invalid search scope '{scope}'")]
    InvalidSearchScope { scope: String },

    #[error("Invalid release type '{0}': expected major, minor or patch")]
    InvalidReleaseType(String),

    #[error("Unknown environment '{name}'")]
    UnknownEnvironment { name: String },

    #[error("Not a schema file: {path}")]
    NotASchemaFile { path: String },

    #[error("Location {path:?} is outside the registry root {root:?}")]
    LocationOutsideRootDirectory { path: PathBuf, root: PathBuf },

    #[error("No schema target given: pass a key, id, scope or path")]
    NoSchemaTargets,

    #[error("Target '{scope}' matches {count} schemas, expected exactly one")]
    TargetArgumentTargetsMultipleSchemas { scope: String, count: usize },

    // ---- configuration ----
    #[error("Configuration file not found: {path:?}")]
    MissingConfig { path: PathBuf },

    #[error("Invalid YAML in {path:?}: {reason}")]
    InvalidYaml { path: PathBuf, reason: String },

    #[error("Missing configuration property '{property}'")]
    MissingProperty { property: String },

    #[error("Invalid URL '{url}' for '{property}': {reason}")]
    InvalidUrl {
        property: String,
        url: String,
        reason: String,
    },

    #[error("Unsupported default JSON Schema version '{version}'")]
    InvalidDefaultJsonSchemaVersion { version: String },

    #[error("Exactly one environment must set isProduction, found {count}")]
    MustHaveExactlyOneProductionEnvironment { count: usize },

    // ---- resource state ----
    #[error("Nothing found for '{target}'")]
    NotFound { target: String },

    #[error("Schema {key} not found at {path:?}")]
    SchemaNotFound { key: String, path: PathBuf },

    #[error("Already exists: {path:?}")]
    AlreadyExists { path: PathBuf },

    #[error("Cannot read x-public in schema {key}: value must be a boolean")]
    CannotReadXPublic { key: String },

    #[error("Invalid JSON in {path:?}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema {key} may not change in environment '{env}'")]
    SchemaMutationNotAllowed { key: String, env: String },

    #[error("No deployment anchor found for environment '{env}'")]
    NoDeploymentAnchor { env: String },

    // ---- rendering / compilation ----
    #[error("Schema {key} references an invalid schema key '{reference}': {source}")]
    InvalidReferenceKey {
        key: String,
        reference: String,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("Schema {reference} (referenced from {key}) could not be loaded: {source}")]
    ReferenceNotLoaded {
        key: String,
        reference: String,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("Template format error in {key}: {reason}")]
    TemplateFormat { key: String, reason: String },

    #[error("Template execution error in {key}: {reason}")]
    TemplateExecution { key: String, reason: String },

    #[error("Rendered schema {key} is not valid JSON: {source}")]
    RenderedJsonInvalid {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema id '{id}' was already added to the compiler")]
    SchemaAlreadyAdded { id: String },

    #[error("Schema id '{id}' has not been added to the compiler")]
    SchemaNotAdded { id: String },

    #[error("Failed to compile schema {key}: {reason}")]
    Compile { key: String, reason: String },

    // ---- test infrastructure ----
    #[error("Test directory '{kind}' missing for schema {key}")]
    TestDirMissing { key: String, kind: TestKind },

    #[error("Invalid test document {path:?}: {source}")]
    InvalidTestDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot read test document {path:?}: {source}")]
    CannotReadTestDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is not inside a pass or fail directory")]
    NotATestDocument { path: PathBuf },

    // ---- wrapped library errors ----
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl SchemaError {
    /// Map an `io::Error` to [`SchemaError::Io`] carrying `path`
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> SchemaError {
        let path = path.into();
        move |source| SchemaError::Io { path, source }
    }
}

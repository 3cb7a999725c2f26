//! JSON Schema validation capability
//!
//! The registry never validates documents itself. It hands rendered schemas
//! to a [`SchemaCompiler`], keyed by environment and canonical id, and asks
//! for a [`CompiledSchema`] when it needs to check test documents.

use std::collections::HashMap;
use std::fmt;

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// JSON Schema specification versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Draft {
    Draft4,
    Draft6,
    Draft7,
    Draft201909,
    Draft202012,
}

impl Draft {
    pub const ALL: [Draft; 5] = [
        Draft::Draft4,
        Draft::Draft6,
        Draft::Draft7,
        Draft::Draft201909,
        Draft::Draft202012,
    ];

    /// Canonical `$schema` URL for this draft
    pub fn url(&self) -> &'static str {
        match self {
            Draft::Draft4 => "http://json-schema.org/draft-04/schema#",
            Draft::Draft6 => "http://json-schema.org/draft-06/schema#",
            Draft::Draft7 => "http://json-schema.org/draft-07/schema#",
            Draft::Draft201909 => "https://json-schema.org/draft/2019-09/schema",
            Draft::Draft202012 => "https://json-schema.org/draft/2020-12/schema",
        }
    }

    /// Match a `$schema` URL, ignoring scheme and a trailing empty fragment
    pub fn from_url(url: &str) -> Option<Draft> {
        fn normalize(url: &str) -> &str {
            let url = url.trim().trim_end_matches('#');
            url.strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .unwrap_or(url)
        }
        let wanted = normalize(url);
        Draft::ALL.into_iter().find(|d| normalize(d.url()) == wanted)
    }
}

impl fmt::Display for Draft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

impl From<Draft> for jsonschema::Draft {
    fn from(draft: Draft) -> Self {
        match draft {
            Draft::Draft4 => jsonschema::Draft::Draft4,
            Draft::Draft6 => jsonschema::Draft::Draft6,
            Draft::Draft7 => jsonschema::Draft::Draft7,
            Draft::Draft201909 => jsonschema::Draft::Draft201909,
            Draft::Draft202012 => jsonschema::Draft::Draft202012,
        }
    }
}

/// Why a document was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub errors: Vec<String>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// A schema ready to validate documents
pub trait CompiledSchema {
    fn validate(&self, document: &Value) -> std::result::Result<(), ValidationFailure>;
}

/// Pluggable schema compilation backend
pub trait SchemaCompiler {
    /// Drafts this backend can compile
    fn supported_drafts(&self) -> Vec<Draft>;

    /// Draft used when a document carries no recognised `$schema`
    fn set_default_draft(&mut self, _draft: Draft) {}

    /// Register a document under its canonical id within `env`. Re-adding an
    /// identical document is a no-op; a different document under a known id is
    /// an error until [`SchemaCompiler::clear`] is called. Environments never
    /// see each other's documents.
    fn add_schema(&mut self, env: &str, id: &str, document: Value) -> Result<()>;

    /// Compile a document previously added to `env`
    fn compile(&self, env: &str, id: &str) -> Result<Box<dyn CompiledSchema>>;

    /// Forget every added document
    fn clear(&mut self);
}

/// [`SchemaCompiler`] backed by the `jsonschema` crate
#[derive(Debug)]
pub struct JsonSchemaCompiler {
    default_draft: Draft,
    /// Documents by environment, then id
    documents: HashMap<String, HashMap<String, Value>>,
}

impl Default for JsonSchemaCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonSchemaCompiler {
    pub fn new() -> Self {
        Self {
            default_draft: Draft::Draft202012,
            documents: HashMap::new(),
        }
    }
}

impl SchemaCompiler for JsonSchemaCompiler {
    fn supported_drafts(&self) -> Vec<Draft> {
        Draft::ALL.to_vec()
    }

    fn set_default_draft(&mut self, draft: Draft) {
        self.default_draft = draft;
    }

    fn add_schema(&mut self, env: &str, id: &str, document: Value) -> Result<()> {
        let documents = self.documents.entry(env.to_string()).or_default();
        match documents.get(id) {
            Some(existing) if *existing == document => Ok(()),
            Some(_) => Err(SchemaError::SchemaAlreadyAdded { id: id.to_string() }),
            None => {
                documents.insert(id.to_string(), document);
                Ok(())
            }
        }
    }

    fn compile(&self, env: &str, id: &str) -> Result<Box<dyn CompiledSchema>> {
        let (documents, document) = self
            .documents
            .get(env)
            .and_then(|docs| Some((docs, docs.get(id)?)))
            .ok_or_else(|| SchemaError::SchemaNotAdded { id: id.to_string() })?;

        let draft = document
            .get("$schema")
            .and_then(Value::as_str)
            .and_then(Draft::from_url)
            .unwrap_or(self.default_draft);

        let mut options = JSONSchema::options();
        options.with_draft(draft.into());
        // every other document of the environment is available to $ref resolution
        for (other_id, other) in documents {
            if other_id != id {
                options.with_document(other_id.clone(), other.clone());
            }
        }

        let compiled = options.compile(document).map_err(|e| SchemaError::Compile {
            key: id.to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(env, id, ?draft, "compiled schema");

        Ok(Box::new(JsonSchemaValidator { schema: compiled }))
    }

    fn clear(&mut self) {
        self.documents.clear();
    }
}

struct JsonSchemaValidator {
    schema: JSONSchema,
}

impl CompiledSchema for JsonSchemaValidator {
    fn validate(&self, document: &Value) -> std::result::Result<(), ValidationFailure> {
        self.schema.validate(document).map_err(|errors| ValidationFailure {
            errors: errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect(),
        })
    }
}

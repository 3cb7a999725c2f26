//! JSON Schema Manager
//!
//! A filesystem registry of versioned JSON Schemas. Schemas are grouped into
//! families, versioned with semver, rendered per environment into documents
//! with canonical URLs, and tested against example documents that must pass
//! or fail.
//!
//! ## Features
//!
//! - **Stable Keys**: `domain_family_major_minor_patch` names every schema version
//! - **Templated References**: `{{ ID }}` and ``{{ JSM `key` }}`` resolve to canonical URLs
//! - **Per-Environment Rendering**: public and private URL roots per environment
//! - **Example Based Tests**: `pass/` and `fail/` documents next to every version
//! - **Consumer Compatibility**: older `pass` documents must keep passing within a major
//! - **Watch Mode**: re-test on change
//! - **Distribution**: rendered artifacts with SHA256 checksums
//!
//! ## Layout
//!
//! ```text
//! json-schema-manager-config.yml
//! acme/
//! └── billing/
//!     └── invoice/
//!         └── 1/
//!             └── 2/
//!                 └── 0/
//!                     ├── acme_billing_invoice_1_2_0.schema.json
//!                     ├── pass/
//!                     └── fail/
//! ```

pub mod checksum;
pub mod config;
pub mod dist;
pub mod error;
pub mod gitter;
pub mod key;
pub mod registry;
pub mod render;
pub mod report;
pub mod schema;
pub mod settings;
pub mod target;
pub mod tester;
pub mod validator;
pub mod version;
pub mod watch;

pub use checksum::Checksum;
pub use config::{Config, EnvConfig};
pub use dist::DistBuilder;
pub use error::{Result, SchemaError, TestKind};
pub use gitter::{Anchor, Change, Gitter};
pub use key::{Key, SearchScope};
pub use registry::Registry;
pub use render::RenderInfo;
pub use report::{ReportFormat, TestFailure, TestReport};
pub use schema::Schema;
pub use settings::Settings;
pub use target::{Target, TargetResolver};
pub use tester::{TestScope, Tester};
pub use validator::{CompiledSchema, Draft, JsonSchemaCompiler, SchemaCompiler};
pub use version::ReleaseType;
pub use watch::{WatchExit, WatchLoop};

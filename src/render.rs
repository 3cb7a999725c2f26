//! Schema rendering
//!
//! Source documents carry two directives:
//!
//! - `{{ ID }}`: the schema's own canonical URL
//! - ``{{ JSM `org_family_1_0_0` }}``: the canonical URL of another schema
//!
//! Rendering is two-pass. [`Template::parse`] splits the source into literal
//! text and directives once, when the schema is loaded. [`Renderer`] then walks
//! the directive list for one environment, loading and rendering referenced
//! schemas through the registry.
//!
//! A schema that is already being rendered higher up the stack contributes its
//! URL without recursing, so reference cycles terminate. Everything rendered in
//! one top-level call is added to the compiler first and compiled afterwards,
//! so every `$ref` target is known when compilation runs.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::EnvConfig;
use crate::error::{Result, SchemaError};
use crate::key::Key;
use crate::registry::Registry;
use crate::schema::Schema;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Resolved document for one schema in one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInfo {
    pub key: Key,
    pub env: String,
    /// Canonical URL, also the id the document was compiled under
    pub id: String,
    pub content: Vec<u8>,
}

impl RenderInfo {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.content).unwrap_or_default()
    }

    pub fn document(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

/// Canonical URL of `schema` in `env`
pub fn canonical_id(schema: &Schema, env: &EnvConfig) -> String {
    format!("{}/{}", env.url_root(schema.is_public()), schema.key().filename())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DirectiveKind {
    Id,
    Jsm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Arg {
    Str(String),
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directive {
    kind: DirectiveKind,
    args: Vec<Arg>,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Directive(Directive),
}

/// Parsed directive list of a schema source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r#"^\s*(?:`([^`]*)`|"([^"]*)"|([^\s`"]+))"#).expect("token pattern compiles")
    })
}

impl Template {
    /// Split `source` into text and directives; `Err` carries a format error
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let body_start = start + OPEN.len();
            let end = rest[body_start..]
                .find(CLOSE)
                .ok_or_else(|| format!("unclosed action at offset {}", offset + start))?;
            let body = &rest[body_start..body_start + end];
            segments.push(Segment::Directive(Self::parse_directive(body, offset + start)?));

            let consumed = body_start + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    fn parse_directive(body: &str, offset: usize) -> std::result::Result<Directive, String> {
        let mut tokens = Vec::new();
        let mut rest = body;
        while !rest.trim().is_empty() {
            let caps = token_pattern()
                .captures(rest)
                .ok_or_else(|| format!("unterminated string in action at offset {}", offset))?;
            let token = if let Some(s) = caps.get(1).or_else(|| caps.get(2)) {
                Arg::Str(s.as_str().to_string())
            } else {
                Arg::Bare(caps[3].to_string())
            };
            tokens.push(token);
            rest = &rest[caps[0].len()..];
        }

        let mut tokens = tokens.into_iter();
        let kind = match tokens.next() {
            Some(Arg::Bare(name)) if name == "ID" => DirectiveKind::Id,
            Some(Arg::Bare(name)) if name == "JSM" => DirectiveKind::Jsm,
            Some(Arg::Bare(name)) => {
                return Err(format!("function \"{}\" not defined at offset {}", name, offset))
            }
            Some(Arg::Str(_)) => {
                return Err(format!("expected a directive name at offset {}", offset))
            }
            None => return Err(format!("missing directive at offset {}", offset)),
        };

        Ok(Directive {
            kind,
            args: tokens.collect(),
            offset,
        })
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// One top-level render: walks references for a single environment
pub(crate) struct Renderer<'r> {
    registry: &'r Registry,
    env: &'r EnvConfig,
    in_progress: HashSet<Key>,
    rendered: Vec<(Rc<Schema>, Rc<RenderInfo>)>,
}

impl<'r> Renderer<'r> {
    pub(crate) fn new(registry: &'r Registry, env: &'r EnvConfig) -> Self {
        Self {
            registry,
            env,
            in_progress: HashSet::new(),
            rendered: Vec::new(),
        }
    }

    /// Render `schema` and everything it references, compile, then cache
    pub(crate) fn run(mut self, schema: &Rc<Schema>) -> Result<Rc<RenderInfo>> {
        let info = self.render(schema)?;

        {
            let compiler = self.registry.compiler();
            for (schema, info) in &self.rendered {
                compiler.compile(&info.env, &info.id).map_err(|e| match e {
                    SchemaError::Compile { reason, .. } => SchemaError::Compile {
                        key: schema.key().to_string(),
                        reason,
                    },
                    other => other,
                })?;
            }
        }

        for (schema, info) in &self.rendered {
            schema.store_render(&self.env.name, Rc::clone(info));
        }
        Ok(info)
    }

    fn render(&mut self, schema: &Rc<Schema>) -> Result<Rc<RenderInfo>> {
        if let Some(info) = schema.cached_render(&self.env.name) {
            return Ok(info);
        }
        if let Some((_, info)) = self.rendered.iter().find(|(s, _)| s.key() == schema.key()) {
            return Ok(Rc::clone(info));
        }

        let id = canonical_id(schema, self.env);
        let template = schema.template()?;

        self.in_progress.insert(schema.key().clone());
        let substituted = self.substitute(schema, template, &id);
        self.in_progress.remove(schema.key());
        let content = substituted?.into_bytes();

        let document: Value = serde_json::from_slice(&content).map_err(|source| {
            SchemaError::RenderedJsonInvalid {
                key: schema.key().to_string(),
                source,
            }
        })?;
        self.registry
            .compiler_mut()
            .add_schema(&self.env.name, &id, document)
            .map_err(|e| SchemaError::Compile {
                key: schema.key().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(key = %schema.key(), env = %self.env.name, %id, "rendered schema");

        let info = Rc::new(RenderInfo {
            key: schema.key().clone(),
            env: self.env.name.clone(),
            id,
            content,
        });
        self.rendered.push((Rc::clone(schema), Rc::clone(&info)));
        Ok(info)
    }

    fn substitute(&mut self, schema: &Schema, template: &Template, id: &str) -> Result<String> {
        let mut out = String::with_capacity(schema.source().len());
        for segment in template.segments() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Directive(directive) => match directive.kind {
                    DirectiveKind::Id => {
                        if !directive.args.is_empty() {
                            return Err(execution_error(schema, directive, "ID takes no arguments"));
                        }
                        out.push_str(id);
                    }
                    DirectiveKind::Jsm => {
                        let reference = match directive.args.as_slice() {
                            [Arg::Str(reference)] => reference,
                            _ => {
                                return Err(execution_error(
                                    schema,
                                    directive,
                                    "JSM expects exactly one string argument",
                                ))
                            }
                        };
                        out.push_str(&self.resolve_reference(schema, reference)?);
                    }
                },
            }
        }
        Ok(out)
    }

    fn resolve_reference(&mut self, schema: &Schema, reference: &str) -> Result<String> {
        let target = Key::parse(reference).map_err(|e| SchemaError::InvalidReferenceKey {
            key: schema.key().to_string(),
            reference: reference.to_string(),
            source: Box::new(e),
        })?;

        let referenced = self
            .registry
            .get_schema_by_key(&target)
            .map_err(|e| SchemaError::ReferenceNotLoaded {
                key: schema.key().to_string(),
                reference: reference.to_string(),
                source: Box::new(e),
            })?;

        if self.in_progress.contains(&target) {
            return Ok(canonical_id(&referenced, self.env));
        }
        Ok(self.render(&referenced)?.id.clone())
    }
}

fn execution_error(schema: &Schema, directive: &Directive, reason: &str) -> SchemaError {
    SchemaError::TemplateExecution {
        key: schema.key().to_string(),
        reason: format!("{} (at offset {})", reason, directive.offset),
    }
}

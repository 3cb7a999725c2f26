//! JSON Schema Manager CLI
//!
//! Create, version, render, test and distribute schemas in a registry.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use json_schema_manager::report::write_report;
use json_schema_manager::{
    DistBuilder, Gitter, Key, Registry, ReleaseType, ReportFormat, SearchScope, Settings, Target,
    TargetResolver, TestScope, Tester, WatchExit, WatchLoop,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsm")]
#[command(about = "Manage a registry of versioned JSON Schemas")]
struct Cli {
    /// Path to the schema registry (overrides settings)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Settings file layered over the default locations
    #[arg(long)]
    settings: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// Key, canonical URL, path, scope or "all"
    target: Option<String>,

    /// Schema key, e.g. acme_widget_1_0_0
    #[arg(long)]
    key: Option<String>,

    /// Canonical schema URL
    #[arg(long)]
    id: Option<String>,

    /// Domain/family scope, e.g. acme/widget
    #[arg(long)]
    scope: Option<String>,
}

impl TargetArgs {
    fn resolver<'r>(&self, registry: &'r Registry) -> anyhow::Result<TargetResolver<'r>> {
        let mut resolver = TargetResolver::new(registry, self.target.as_deref());
        if let Some(key) = &self.key {
            resolver.set_key(key)?;
        }
        if let Some(id) = &self.id {
            resolver.set_id(id)?;
        }
        if let Some(scope) = &self.scope {
            resolver.set_scope(scope)?;
        }
        Ok(resolver)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create version 1.0.0 of a new schema family
    CreateSchema {
        /// domain[/domain...]/family
        domain_and_family: String,
    },

    /// Create the next version of a schema
    CreateSchemaVersion {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(short = 't', long, value_enum)]
        release: ReleaseType,
    },

    /// Print a schema rendered for an environment
    Render {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(short, long)]
        env: Option<String>,
    },

    /// Run pass/fail tests and the compatibility sweep
    Validate {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(short, long)]
        env: Option<String>,

        /// Which checks to run
        #[arg(long, value_enum, default_value_t = TestScope::All)]
        tests: TestScope,

        /// Keep going after the first failure
        #[arg(long)]
        continue_on_error: bool,

        #[arg(long)]
        skip_compatibility: bool,

        /// Test one document; its directory decides the expectation
        #[arg(long)]
        document: Option<PathBuf>,

        #[arg(short, long, value_enum)]
        format: Option<ReportFormat>,

        /// Re-run on changes until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Render schemas into a distribution directory
    BuildDist {
        #[arg(short, long)]
        env: Option<String>,

        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        workers: Option<usize>,

        /// Only schemas changed since the environment's last deployment
        #[arg(long)]
        changed: bool,
    },

    /// Tag HEAD as a successful deployment
    TagDeployment {
        #[arg(short, long)]
        env: String,
    },

    /// List schema keys
    List {
        /// Domain/family scope
        #[arg(default_value = "")]
        scope: String,
    },

    /// Write the effective settings to a file
    InitSettings {
        #[arg(default_value = "jsm.toml")]
        path: String,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` means the command ran but tests failed
fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = Settings::load_from(cli.settings.as_deref()).context("loading settings")?;

    // needs no registry
    if let Commands::InitSettings { path, force } = &cli.command {
        if !force && Path::new(path).exists() {
            bail!("{} already exists (use --force to replace it)", path);
        }
        settings.save(path).with_context(|| format!("writing {}", path))?;
        println!("✅ Wrote {}", path);
        return Ok(true);
    }

    let root = cli.registry.unwrap_or_else(|| settings.registry_path());
    let registry = Registry::open(&root)
        .with_context(|| format!("opening registry at {}", root.display()))?;

    let env_or_default = |env: Option<String>| -> String {
        env.or_else(|| settings.registry.environment.clone())
            .unwrap_or_else(|| registry.config().production_env().name.clone())
    };

    match cli.command {
        Commands::CreateSchema { domain_and_family } => {
            let key = registry.create_schema(&domain_and_family)?;
            println!("✅ Created {}", registry.schema_path(&key).display());
        }

        Commands::CreateSchemaVersion { target, release } => {
            let key = target.resolver(&registry)?.resolve_single_key()?;
            let new_key = registry.create_schema_version(&key, release)?;
            println!("✅ Created {} from {}", new_key, key);
        }

        Commands::Render { target, env } => {
            let key = target.resolver(&registry)?.resolve_single_key()?;
            let schema = registry.get_schema_by_key(&key)?;
            let info = registry.coordinate_render(&schema, &env_or_default(env))?;
            println!("{}", info.as_str());
        }

        Commands::Validate {
            target,
            env,
            tests,
            continue_on_error,
            skip_compatibility,
            document,
            format,
            watch,
        } => {
            let tester = Tester::new(&registry)
                .env(env_or_default(env))
                .scope(tests)
                .stop_on_first_error(!continue_on_error && settings.test.stop_on_first_error)
                .skip_compatibility(skip_compatibility);
            let format = format.unwrap_or(settings.test.output_format);

            let resolver = target.resolver(&registry)?;

            if let Some(document) = document {
                let key = resolver.resolve_single_key()?;
                let report = tester.test_specific_document(&key, &document)?;
                write_report(&report, format, &mut io::stdout())?;
                return Ok(report.is_success());
            }

            let resolved = resolver.resolve()?;
            if watch {
                let keys = match &resolved {
                    Target::Key(key) => vec![key.clone()],
                    Target::Scope(scope) => registry.find_keys(scope)?,
                };
                return watch_keys(&tester, &keys, &settings, format);
            }

            let report = match resolved {
                Target::Key(key) => tester.test_single_schema(&key)?,
                Target::Scope(scope) => tester.test_found_schemas(&scope)?,
            };
            write_report(&report, format, &mut io::stdout())?;
            return Ok(report.is_success());
        }

        Commands::BuildDist {
            env,
            out,
            workers,
            changed,
        } => {
            let env = env_or_default(env);
            let out = out.unwrap_or_else(|| settings.dist.out_dir.clone());
            let mut builder = DistBuilder::new(&registry, out);
            if let Some(workers) = workers.or(settings.dist.workers) {
                builder.set_num_workers(workers);
            }

            let count = if changed {
                let gitter = Gitter::open(registry.root())?;
                let anchor = gitter.latest_anchor(&env)?;
                builder.build_changed(&env, &anchor, &gitter)?
            } else {
                builder.build_all(&env)?
            };
            println!("✅ Wrote {} schema(s) to {}", count, builder.env_dir(&env).display());
        }

        Commands::TagDeployment { env } => {
            registry.config().env(&env)?;
            let tag = Gitter::open(registry.root())?.tag_deployment_success(&env)?;
            println!("🏷️  {}", tag);
        }

        Commands::List { scope } => {
            for key in registry.find_keys(&SearchScope::new(&scope)?)? {
                println!("{}", key);
            }
        }

        Commands::InitSettings { .. } => unreachable!("handled before opening the registry"),
    }

    Ok(true)
}

fn watch_keys(
    tester: &Tester<'_>,
    keys: &[Key],
    settings: &Settings,
    format: ReportFormat,
) -> anyhow::Result<bool> {
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = cancel_tx.try_send(());
    })
    .context("installing the interrupt handler")?;

    println!("👀 Watching {} schema(s)", keys.len());
    let exit = WatchLoop::new(tester)
        .debounce(settings.debounce())
        .run(keys, &cancel_rx, |key, result| match result {
            Ok(report) => {
                if let Err(e) = write_report(&report, format, &mut io::stdout()) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(e) => eprintln!("❌ {}: {}", key, e),
        })?;

    if exit == WatchExit::Cancelled {
        println!("👋 Stopped watching");
    }
    Ok(exit == WatchExit::Cancelled)
}

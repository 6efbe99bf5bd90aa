//! formflow: inspect forms, submissions, target schemas and registration options
//!
//! Offline commands (`paths`, `walk`, `keys`) work on local JSON files.
//! The rest talk to the API configured by `--config` and `FORMFLOW_*`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use formflow_client::{ClientConfig, EntityResource, ResourceClient};
use formflow_engine::discovery::Discovery;
use formflow_engine::mapping::{compatible_target_paths, resolve_target_paths};
use formflow_engine::models::Form;
use formflow_engine::progression::SubmissionSession;
use formflow_engine::walker::{find_by_key, walk};
use formflow_engine::KeyGenerator;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "formflow")]
#[command(about = "Inspect forms, submissions, target schemas and registration options")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "formflow.toml")]
    config: PathBuf,

    /// API base URL (overrides config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the addressable target paths of a JSON schema
    Paths {
        schema: PathBuf,
        /// Only paths compatible with this variable schema
        #[arg(long)]
        variable_schema: Option<PathBuf>,
    },
    /// Print every leaf of a JSON document with its path
    Walk {
        data: PathBuf,
        /// Only leaves whose final key matches
        #[arg(long)]
        key: Option<String>,
    },
    /// Generate random keys unique within one run
    Keys {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 7)]
        length: usize,
    },
    /// List the steps of a form
    Steps { form: String },
    /// Show progress of an existing submission
    Status { form: String, submission: Uuid },
    /// Query registration backend options
    #[command(subcommand)]
    Options(OptionsCommand),
}

#[derive(Subcommand)]
enum OptionsCommand {
    /// Catalogues of a ZGW API group
    Catalogues {
        #[arg(long)]
        group: String,
    },
    /// Object types of an Objects API group
    ObjectTypes {
        #[arg(long)]
        group: String,
    },
    /// Versions of an object type
    Versions {
        #[arg(long)]
        group: String,
        #[arg(long)]
        object_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let default_filter = format!("formflow={0},formflow_engine={0},formflow_client={0}", level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Paths { ref schema, ref variable_schema } => {
            let schema = read_json(schema)?;
            let descriptors = resolve_target_paths(&schema);
            let selected = match variable_schema {
                Some(path) => compatible_target_paths(&read_json(path)?, &descriptors),
                None => descriptors.iter().collect(),
            };
            for descriptor in selected {
                let marker = if descriptor.is_required { "*" } else { " " };
                println!("{} {}", marker, display_target(&descriptor.target_path));
            }
        }
        Command::Walk { ref data, ref key } => {
            let document = read_json(data)?;
            let entries = match key {
                Some(key) => find_by_key(&document, key),
                None => walk(&document),
            };
            for entry in entries {
                println!("{}\t{}", entry.path, entry.value);
            }
        }
        Command::Keys { count, length } => {
            let mut keys = KeyGenerator::new().with_length(length);
            for generated in 0..count {
                let key = keys
                    .generate("cli")
                    .with_context(|| format!("only {} distinct keys of length {}", generated, length))?;
                println!("{}", key);
            }
        }
        Command::Steps { ref form } => {
            let client = connect(&cli)?;
            let form: Form = EntityResource::new(&client, &[])?.read(form).await?;
            println!("{} ({})", form.name, form.slug);
            for step in form.ordered_steps() {
                let current = if form.current_step == Some(step.uuid) { ">" } else { " " };
                println!("{} {:>2} {} {}", current, step.index, step.uuid, step.slug);
            }
        }
        Command::Status { ref form, submission } => {
            let client = Arc::new(connect(&cli)?);
            let form: Form = EntityResource::new(&*client, &[])?.read(form).await?;
            let session = SubmissionSession::resume(Arc::clone(&client), form, submission).await?;
            let missing: Vec<&str> = session.missing_steps().iter().map(|s| s.slug.as_str()).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "submission": submission,
                    "state": format!("{:?}", session.state()),
                    "recorded": session.recorded_steps().count(),
                    "missing": missing,
                }))?
            );
        }
        Command::Options(ref options) => {
            let discovery = Discovery::new(Arc::new(connect(&cli)?));
            let records = match options {
                OptionsCommand::Catalogues { group } => discovery.catalogues(group).await?,
                OptionsCommand::ObjectTypes { group } => discovery.object_types(group).await?,
                OptionsCommand::Versions { group, object_type } => {
                    discovery.object_type_versions(group, object_type).await?
                }
            };
            for record in records {
                println!("{}\t{}", record.value, record.label);
            }
        }
    }

    Ok(())
}

fn connect(cli: &Cli) -> anyhow::Result<ResourceClient> {
    let mut config = if cli.config.exists() {
        ClientConfig::load(&cli.config)?
    } else {
        debug!(path = %cli.config.display(), "config file not found, using defaults");
        ClientConfig::default()
    }
    .with_env_overrides();

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    info!(base_url = %config.base_url, "connecting");
    Ok(ResourceClient::new(config)?)
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn display_target(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(" > ")
    }
}

//! SmartDB Architect CLI
//!
//! - `serve`: the HTTP API (describe, synthesize, execute, introspect)
//! - `synth`: render DDL from a schema description JSON file
//! - `exec`: run a SQL script in one transaction
//! - `schema`: introspect a SQLite database file
//! - `describe`: text or ER diagram to schema description, offline or via an LLM

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use smartdb_ddl::DdlSynthesizer;
use smartdb_describe::SchemaDescriber;
use smartdb_exec::{SchemaGraph, SqlExecutor};
use smartdb_schema::SchemaDescription;

mod config;
mod server;

use config::{AppConfig, LlmArgs, ServeArgs};

#[derive(Parser)]
#[command(name = "smartdb")]
#[command(
    author,
    version,
    about = "SmartDB Architect: natural language and ER diagrams to SQLite schemas"
)]
struct Cli {
    /// Log filter (e.g. `debug`, `smartdb_exec=trace`); defaults to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server.
    Serve(ServeArgs),

    /// Render CREATE TABLE / ALTER TABLE statements from a schema description.
    Synth {
        /// Schema description JSON (`{entities, relationships}`).
        input: PathBuf,

        /// Optional `-- <header>` comment line.
        #[arg(long)]
        header: Option<String>,

        /// Write the DDL here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Execute a SQL script inside one transaction.
    Exec {
        input: PathBuf,

        /// Persistent database file (a temporary one otherwise).
        #[arg(long)]
        database: Option<PathBuf>,

        /// Print the full execution result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the tables, columns and foreign keys of a database.
    Schema {
        #[arg(long)]
        database: PathBuf,

        /// Node/edge form instead of the table listing.
        #[arg(long)]
        graph: bool,
    },

    /// Produce a schema description from text or an ER-diagram image.
    Describe {
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,

        #[arg(long)]
        image: Option<PathBuf>,

        /// Print synthesized DDL instead of the description JSON.
        #[arg(long)]
        sql: bool,

        #[command(flatten)]
        llm: LlmArgs,
    },
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| anyhow!("invalid --log-level `{level}`: {e}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Serve(args) => {
            let config = AppConfig::from_args(&args)?;
            server::cmd_serve(config)
        }
        Commands::Synth { input, header, out } => {
            cmd_synth(&input, header.as_deref(), out.as_deref())
        }
        Commands::Exec {
            input,
            database,
            json,
        } => cmd_exec(&input, database.as_deref(), json),
        Commands::Schema { database, graph } => cmd_schema(&database, graph),
        Commands::Describe {
            text,
            image,
            sql,
            llm,
        } => cmd_describe(text.as_deref(), image.as_deref(), sql, &llm),
    }
}

fn read_schema_description(path: &Path) -> Result<SchemaDescription> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let schema: SchemaDescription = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a schema description", path.display()))?;
    if let Err(e) = schema.validate() {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "schema description does not validate; rendering it anyway"
        );
    }
    Ok(schema)
}

fn cmd_synth(input: &Path, header: Option<&str>, out: Option<&Path>) -> Result<()> {
    let schema = read_schema_description(input)?;
    let mut synth = DdlSynthesizer::new();
    if let Some(header) = header {
        synth = synth.with_header(header);
    }
    let ddl = synth.synthesize(&schema);

    match out {
        Some(out) => {
            fs::write(out, &ddl).with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
        }
        None => print!("{ddl}"),
    }
    Ok(())
}

fn cmd_exec(input: &Path, database: Option<&Path>, json: bool) -> Result<()> {
    let script =
        fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;

    let mut executor = SqlExecutor::default();
    executor
        .try_connect(database)
        .map_err(|e| anyhow!("failed to open database: {e}"))?;
    let outcome = executor.execute(&script);
    executor.disconnect();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for line in &outcome.log {
            if line.starts_with("Error") {
                println!("{}", line.red());
            } else {
                println!("{line}");
            }
        }
        for result in &outcome.results {
            println!();
            println!("{}", result.columns.join(" | ").bold());
            for row in &result.rows {
                let cells: Vec<String> = row.iter().map(render_cell).collect();
                println!("{}", cells.join(" | "));
            }
        }
    }

    if outcome.success {
        eprintln!("{} {}", "ok".green().bold(), outcome.message);
        Ok(())
    } else {
        let hint = outcome
            .error
            .as_ref()
            .map(|e| format!(" ({})", e.fix_suggestion))
            .unwrap_or_default();
        Err(anyhow!("{}{hint}", outcome.message))
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cmd_schema(database: &Path, graph: bool) -> Result<()> {
    if !database.exists() {
        return Err(anyhow!("database {} does not exist", database.display()));
    }
    let mut executor = SqlExecutor::default();
    executor
        .try_connect(Some(database))
        .map_err(|e| anyhow!("failed to open database: {e}"))?;
    let schema = executor.get_schema()?;

    let rendered = if graph {
        serde_json::to_string_pretty(&SchemaGraph::from_schema(&schema))?
    } else {
        serde_json::to_string_pretty(&schema)?
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_describe(text: Option<&str>, image: Option<&Path>, sql: bool, llm: &LlmArgs) -> Result<()> {
    let describer = SchemaDescriber::from_config(&llm.to_config()?)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let (schema, header) = match (text, image) {
        (Some(text), _) => (rt.block_on(describer.describe_text(text))?, None),
        (None, Some(path)) => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            (
                rt.block_on(describer.describe_image(&bytes))?,
                Some(smartdb_ddl::ER_DIAGRAM_HEADER),
            )
        }
        (None, None) => return Err(anyhow!("describe: pass --text or --image")),
    };

    if sql {
        let mut synth = DdlSynthesizer::new();
        if let Some(header) = header {
            synth = synth.with_header(header);
        }
        print!("{}", synth.synthesize(&schema));
    } else {
        println!("{}", serde_json::to_string_pretty(&schema)?);
    }
    Ok(())
}

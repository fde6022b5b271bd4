mod logging;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fabricate_core::{Error as CoreError, ModelCatalog, Value};
use fabricate_generate::{
    BuildOptions, BuildRequest, GenerationError, ModelBuilder, ProviderRegistry,
};
use logging::init_logging;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Parser, Debug)]
#[command(name = "fabricate", version, about = "Synthetic test-data builder")]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build instances of a catalog model and print them as JSON lines.
    Generate(GenerateArgs),
    /// List registered provider signatures and categories.
    Providers,
    /// Print the JSON Schema of the catalog format.
    Schema,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Catalog JSON file describing the models.
    #[arg(long)]
    catalog: PathBuf,
    /// Model to build.
    #[arg(long)]
    model: String,
    /// Number of instances.
    #[arg(long, default_value_t = 1)]
    count: usize,
    /// Seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
    /// TOML file with build options.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Field override as `path=json`; plain text is taken as a string.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    overrides: Vec<String>,
    /// Reuse the declared default for this dotted field path.
    #[arg(long = "use-default", value_name = "PATH")]
    use_defaults: Vec<String>,
    /// Keep going when an instance fails; failures go to the report.
    #[arg(long, default_value_t = false)]
    best_effort: bool,
    /// Write the build report as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Providers => run_providers(),
        Command::Schema => run_schema(),
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let catalog = ModelCatalog::from_json_str(&fs::read_to_string(&args.catalog)?)?;
    let options = match &args.config {
        Some(path) => BuildOptions::from_toml_file(path)?,
        None => BuildOptions::default(),
    };
    let builder = ModelBuilder::new()
        .with_catalog(catalog)?
        .with_options(options)?;

    let mut request = BuildRequest::new().best_effort(args.best_effort);
    if let Some(seed) = args.seed {
        request = request.seed(seed);
    }
    for entry in &args.overrides {
        let (path, value) = parse_override(entry)?;
        request = request.set(path, value);
    }
    for path in args.use_defaults {
        request = request.use_default_for(path);
    }

    let outcome = builder.build_batch_report(&args.model, args.count, &request)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for instance in &outcome.instances {
        serde_json::to_writer(&mut out, instance)?;
        writeln!(out)?;
    }
    out.flush()?;

    if let Some(path) = &args.report {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(&outcome.report)?)?;
        tracing::info!(event = "report_written", path = %path.display());
    }

    Ok(())
}

fn run_providers() -> Result<(), CliError> {
    let registry = ProviderRegistry::with_builtins();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (signature, id) in registry.signatures() {
        writeln!(out, "{signature:<24} {id}")?;
    }
    for (child, parent) in registry.categories() {
        writeln!(out, "{child:<24} -> {parent}")?;
    }
    Ok(())
}

fn run_schema() -> Result<(), CliError> {
    let schema = schemars::schema_for!(ModelCatalog);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Split `path=value`; the value is JSON when it parses as JSON, otherwise
/// the raw text.
fn parse_override(entry: &str) -> Result<(&str, Value), CliError> {
    let (path, raw) = entry.split_once('=').ok_or_else(|| {
        CliError::InvalidArgument(format!("override '{entry}' must look like path=value"))
    })?;
    let path = path.trim();
    if path.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "override '{entry}' has an empty path"
        )));
    }
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::from(raw),
    };
    Ok((path, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_parse_json_or_fall_back_to_text() {
        let (path, value) = parse_override("address.zip=12345").expect("int");
        assert_eq!(path, "address.zip");
        assert_eq!(value, Value::Int(12345));

        let (_, value) = parse_override("label=fixed").expect("text");
        assert_eq!(value, Value::from("fixed"));

        let (_, value) = parse_override("tags=[\"a\",\"b\"]").expect("list");
        assert_eq!(value, Value::List(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn overrides_need_a_path() {
        assert!(parse_override("no-equals").is_err());
        assert!(parse_override("=1").is_err());
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from([
            "fabricate",
            "generate",
            "--catalog",
            "models.json",
            "--model",
            "User",
            "--count",
            "3",
            "--set",
            "role=\"admin\"",
            "--log-json",
        ])
        .expect("parse");
        assert!(cli.log_json);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.count, 3);
        assert_eq!(args.overrides, vec!["role=\"admin\"".to_string()]);
    }
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::prelude::*;
use clap::{Parser as ClapParser, Subcommand};
use flatjson_core::Codec;
use tracing::*;

use crate::ast::SchemaFile;
use crate::config::Config;

mod ast;
mod config;
mod diagnostics;
mod edit_distance;
mod late_lints;
mod logging;
mod lower;
mod parser;
mod spanned;

#[derive(Debug, ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file to use instead of `flatjson.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a JSON document against a schema and print the decoded value.
    Check {
        /// The path to a schema file.
        schema: PathBuf,
        /// The path to the JSON document.
        input: PathBuf,
        /// Shape the document is decoded as.
        #[arg(long)]
        root: Option<String>,
        /// Print the value re-encoded in its flattened wire form instead.
        #[arg(long)]
        reencode: bool,
    },
    /// Check a schema file for problems without decoding anything.
    Lint {
        /// The path to a schema file.
        schema: PathBuf,
        /// Also warn about shapes this shape never uses.
        #[arg(long)]
        root: Option<String>,
    },
}

pub type DiagnosticReport<'a> = Report<'a, (&'a String, std::ops::Range<usize>)>;
pub type Diagnostics<'a> = Vec<DiagnosticReport<'a>>;

fn main() -> anyhow::Result<()> {
    logging::setup_logging();

    let cli = Args::parse();

    debug!(?cli);

    let config = Config::load(cli.config.as_deref())?;
    debug!(?config);

    match cli.command {
        Command::Check {
            schema,
            input,
            root,
            reencode,
        } => check(&config, &schema, &input, root, reencode),
        Command::Lint { schema, root } => lint(&config, &schema, root),
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(file) => Ok(file),
        Err(e) => {
            error!(?path, "failed to read input");
            Err(e).with_context(|| format!("failed to read file `{}`", path.display()))
        }
    }
}

/// Parses and lints a schema file, printing every diagnostic. Fails if anything worse than a
/// warning was found.
fn parse_and_lint(path: &String, src: &str, root: Option<&str>) -> anyhow::Result<SchemaFile> {
    let (file, errors) = parser::parser().parse(src).into_output_errors();

    for e in &errors {
        Report::build(ReportKind::Error, path, e.span().start)
            .with_message(e.to_string())
            .with_label(
                Label::new((path, e.span().into_range()))
                    .with_message(e.reason().to_string())
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((path, Source::from(src)))?;
    }

    let Some(file) = file else {
        bail!("failed to parse schema");
    };
    if !errors.is_empty() {
        bail!("failed to parse schema");
    }

    debug!(items = file.items.len(), "parsed schema");

    let mut diagnostics = Vec::new();
    late_lints::lint_undefined_shapes(&file, path, &mut diagnostics);
    late_lints::lint_duplicate_names(&file, path, &mut diagnostics);
    late_lints::lint_non_flattenable(&file, path, &mut diagnostics);
    late_lints::lint_flatten_cycles(&file, path, &mut diagnostics);
    late_lints::lint_multiple_flattened_maps(&file, path, &mut diagnostics);
    let error_count = diagnostics.len();

    if let Some(root) = root {
        if file.find(root).is_some() {
            late_lints::lint_unused_shapes(&file, root, path, &mut diagnostics);
        }
    }

    for diagnostic in diagnostics {
        diagnostic.eprint((path, Source::from(src)))?;
    }

    if error_count > 0 {
        bail!("schema `{path}` has {error_count} error(s)");
    }
    Ok(file)
}

fn build_codec(config: &Config, file: &SchemaFile) -> anyhow::Result<Codec> {
    let schema = lower::lower(file).context("failed to build schema")?;
    let codec = Codec::builder(schema)
        .config(config.codec_config())
        .build();
    codec
        .validate()
        .context("schema can not be used for decoding")?;
    Ok(codec)
}

fn check(
    config: &Config,
    schema: &Path,
    input: &Path,
    root: Option<String>,
    reencode: bool,
) -> anyhow::Result<()> {
    let Some(root) = root.or_else(|| config.root.clone()) else {
        bail!("no root shape given; pass `--root` or set `root` in the configuration");
    };

    let schema_path = schema.display().to_string();
    let schema_src = read(schema)?;
    let file = parse_and_lint(&schema_path, &schema_src, Some(&root))?;
    let codec = build_codec(config, &file)?;

    let Some(root_id) = codec.shape_id(&root) else {
        let names: Vec<&str> = file.names().map(|n| n.val.as_str()).collect();
        match edit_distance::find_best_match_for_name(&names, &root, None) {
            Some(suggestion) => bail!(
                "root shape `{root}` is not defined in `{schema_path}`; did you mean `{suggestion}`?"
            ),
            None => bail!("root shape `{root}` is not defined in `{schema_path}`"),
        }
    };

    let input_path = input.display().to_string();
    let input_src = read(input)?;

    let value = match codec.decode_value(root_id, &input_src) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "decoding failed");
            diagnostics::decode_error_report(&err, &codec, &input_path, input_src.len())
                .eprint((&input_path, Source::from(&input_src)))?;
            bail!("failed to decode `{input_path}` as `{root}`");
        }
    };

    trace!(?value);

    let output = if reencode {
        codec
            .encode_value(root_id, &value)
            .context("failed to re-encode the decoded value")?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{output}");

    Ok(())
}

fn lint(config: &Config, schema: &Path, root: Option<String>) -> anyhow::Result<()> {
    let root = root.or_else(|| config.root.clone());

    let schema_path = schema.display().to_string();
    let schema_src = read(schema)?;
    let file = parse_and_lint(&schema_path, &schema_src, root.as_deref())?;
    build_codec(config, &file)?;

    info!(path = %schema_path, shapes = file.items.len(), "no problems found");
    Ok(())
}

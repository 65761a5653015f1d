//! Command-line front end for inspecting and editing Device Tree Source files.

use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use ariadne::{sources, Label, Report, ReportKind};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use dts_tree::ast::{Document, Value};
use dts_tree::compare::{compare, report};
use dts_tree::editor::Editor;
use dts_tree::generator::{generate_node, generate_property, generate_with, GenerateOptions};
use dts_tree::include::IncludeResolver;
use dts_tree::parser::{parse_values, ParseOptions};
use dts_tree::validator::{Severity, Validator};

#[derive(Parser)]
#[command(name = "dtsed", version)]
#[command(about = "Parse, check, compare and edit Device Tree Source files")]
struct Args {
    /// Log more; repeat for more detail. Overrides RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Deepest node nesting accepted, root included
    #[arg(long, default_value_t = 256, global = true)]
    max_depth: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the parsed tree
    Parse {
        /// Source file; standard input when omitted
        file: Option<PathBuf>,
    },

    /// Regenerate the source in canonical layout
    Format {
        /// Source file; standard input when omitted
        file: Option<PathBuf>,

        /// Write here instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Inline includes before parsing
        #[arg(long)]
        resolve_includes: bool,

        /// Directory searched for includes; implies --resolve-includes
        #[arg(short = 'I', long = "include-dir")]
        include_dirs: Vec<PathBuf>,

        /// Indent with this many spaces instead of a tab
        #[arg(long)]
        indent_spaces: Option<usize>,

        /// No blank lines between nodes
        #[arg(long)]
        compact: bool,
    },

    /// Run the validator; exits non-zero when it reports errors
    Check {
        /// Source file; standard input when omitted
        file: Option<PathBuf>,
    },

    /// Report the differences between two files
    Diff { old: PathBuf, new: PathBuf },

    /// Print a node, or one of its properties
    Get {
        file: PathBuf,
        /// Absolute node path, e.g. /soc/serial@1000
        path: String,
        property: Option<String>,
    },

    /// Set a property, adding it when missing
    Set {
        file: PathBuf,
        path: String,
        property: String,
        /// Value list in source syntax, e.g. '<0x1000 0x100>' or '"okay"';
        /// omitted for an empty (flag) property
        value: Option<String>,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Remove a node, or one of its properties
    Rm {
        file: PathBuf,
        path: String,
        property: Option<String>,

        #[command(flatten)]
        write: WriteArgs,
    },
}

#[derive(clap::Args)]
struct WriteArgs {
    /// Write the result here instead of standard output
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the input file
    #[arg(short = 'i', long)]
    in_place: bool,
}

/// Source text and the name it is reported under.
struct Input {
    name: String,
    text: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let options = ParseOptions {
        max_depth: args.max_depth,
    };

    match args.command {
        Command::Parse { file } => {
            let doc = parse(&read_input(file.as_deref())?, &options)?;
            println!("{doc:#?}");
        }

        Command::Format {
            file,
            output,
            resolve_includes,
            include_dirs,
            indent_spaces,
            compact,
        } => {
            let input = if resolve_includes || !include_dirs.is_empty() {
                let Some(file) = file else {
                    bail!("include resolution needs a file, not standard input");
                };
                let resolver = include_dirs
                    .into_iter()
                    .fold(IncludeResolver::new(), |resolver, dir| resolver.with_search_path(dir));
                Input {
                    name: file.display().to_string(),
                    text: resolver.resolve(&file)?,
                }
            } else {
                read_input(file.as_deref())?
            };

            let generate = GenerateOptions {
                indent: indent_spaces.map_or_else(|| "\t".to_string(), |n| " ".repeat(n)),
                blank_line_between_nodes: !compact,
            };
            let doc = parse(&input, &options)?;
            emit(&generate_with(&doc, &generate), output.as_deref())?;
        }

        Command::Check { file } => {
            let doc = parse(&read_input(file.as_deref())?, &options)?;
            let diagnostics = Validator::standard().validate(&doc);

            for diagnostic in &diagnostics {
                println!("{diagnostic}");
            }
            let errors = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count();
            info!(errors, warnings, "validation finished");
            eprintln!("{errors} error(s), {warnings} warning(s)");

            if errors > 0 {
                return Ok(ExitCode::from(1));
            }
        }

        Command::Diff { old, new } => {
            let old = parse(&read_input(Some(&old))?, &options)?;
            let new = parse(&read_input(Some(&new))?, &options)?;
            print!("{}", report(&compare(&old, &new)));
        }

        Command::Get {
            file,
            path,
            property,
        } => {
            let doc = parse(&read_input(Some(&file))?, &options)?;
            let id = doc
                .find_by_path(&path)
                .ok_or_else(|| anyhow!("no node at {path}"))?;
            let generate = GenerateOptions::default();

            match property {
                Some(name) => {
                    let property = doc[id]
                        .property(&name)
                        .ok_or_else(|| anyhow!("{path} has no property {name}"))?;
                    println!("{}", generate_property(property, &generate));
                }
                None => print!("{}", generate_node(&doc, id, &generate)),
            }
        }

        Command::Set {
            file,
            path,
            property,
            value,
            write,
        } => {
            let mut doc = parse(&read_input(Some(&file))?, &options)?;
            let values = match value {
                Some(text) => parse_value_arg(&text)?,
                None => Vec::new(),
            };

            Editor::new(&mut doc).set_property(&path, &property, values)?;
            debug!(%path, %property, "property set");
            write_document(&doc, &file, &write)?;
        }

        Command::Rm {
            file,
            path,
            property,
            write,
        } => {
            let mut doc = parse(&read_input(Some(&file))?, &options)?;
            let mut editor = Editor::new(&mut doc);
            match &property {
                Some(name) => {
                    editor.remove_property(&path, name)?;
                }
                None => editor.remove_node(&path)?,
            }
            write_document(&doc, &file, &write)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_input(file: Option<&Path>) -> Result<Input> {
    let (reader, name): (Box<dyn Read>, _) = match file {
        Some(path) => (
            Box::new(fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?),
            path.display().to_string(),
        ),
        None => (Box::new(io::stdin()), "<stdin>".to_string()),
    };

    let mut text = String::new();
    BufReader::new(reader)
        .read_to_string(&mut text)
        .with_context(|| format!("cannot read {name}"))?;

    Ok(Input { name, text })
}

fn parse(input: &Input, options: &ParseOptions) -> Result<Document> {
    dts_tree::from_str_with(&input.text, options).map_err(|err| {
        print_report(&input.name, &input.text, err.offset(), &err.to_string());
        anyhow!("cannot parse {}", input.name)
    })
}

fn parse_value_arg(text: &str) -> Result<Vec<Value>> {
    parse_values(text).map_err(|err| {
        print_report("<value>", text, err.offset(), &err.to_string());
        anyhow!("cannot parse value {text:?}")
    })
}

/// Print a source-annotated error. `offset` is a byte offset into `text`.
fn print_report(name: &str, text: &str, offset: usize, message: &str) {
    let start = text.get(..offset).map_or(0, |prefix| prefix.chars().count());
    let end = (start + 1).min(text.chars().count()).max(start);
    let name = name.to_string();

    let printed = Report::build(ReportKind::Error, name.clone(), start)
        .with_message(message)
        .with_label(Label::new((name.clone(), start..end)).with_message("here"))
        .finish()
        .eprint(sources([(name, text.to_string())]));

    if printed.is_err() {
        eprintln!("{message}");
    }
}

fn write_document(doc: &Document, file: &Path, write: &WriteArgs) -> Result<()> {
    let text = generate_with(doc, &GenerateOptions::default());
    let destination = match (&write.output, write.in_place) {
        (Some(path), _) => Some(path.as_path()),
        (None, true) => Some(file),
        (None, false) => None,
    };
    emit(&text, destination)
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}

//! CLI: schema document → (sample | encode | render)
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use schema_derive::{Ast, Value, compile_encoder, compile_generator, compile_renderer, document};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// derive generators, encoders and renderers from a JSON schema document
#[derive(Parser, Debug)]
#[command(name = "schema-derive", version, about)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// generate random values conforming to the schema
    Sample(SampleOut),
    /// encode input values to their wire form
    Encode(EncodeOut),
    /// render input values as display text
    Render(RenderOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// schema document (.json)
    #[arg(long, short)]
    schema: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct SampleOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// number of values to draw
    #[arg(long, short = 'n', default_value_t = 10)]
    count: usize,

    /// runner seed; equal seeds draw equal values
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// print rendered text instead of encoded JSON
    #[arg(long, default_value_t = false)]
    render: bool,

    /// one JSON value per line instead of a JSON array
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct EncodeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RenderOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self) -> Result<Ast> {
        document::load(&self.schema).with_context(|| format!("failed to load schema {}", self.schema.display()))
    }
}

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(Value) -> Result<()>) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            debug!(path = %source_path_str, "reading input");
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            if self.ndjson {
                for (line_number, line) in source.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    let json_value = serde_json::from_str::<serde_json::Value>(line).with_context(|| {
                        format!("failed to parse JSON ({source_path_str}, line {})", line_number + 1)
                    })?;
                    apply(Value::from(json_value))?;
                }
            } else {
                let json_value = serde_json::from_str::<serde_json::Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                apply(Value::from(json_value))?;
            }
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Sample(target) => {
                let ast = target.schema_settings.load()?;
                let generator = compile_generator(&ast)?;
                let samples = generator.samples(target.seed, target.count)?;
                info!(count = samples.len(), seed = target.seed, "drew samples");
                let output = if target.render {
                    let renderer = compile_renderer(&ast)?;
                    let lines = samples.iter().map(|v| renderer.render(v)).collect::<Result<Vec<_>, _>>()?;
                    lines.join("\n")
                } else {
                    let encoder = compile_encoder(&ast)?;
                    let encoded = samples
                        .iter()
                        .map(|v| Ok(encoder.encode(v)?.to_json()?))
                        .collect::<Result<Vec<_>>>()?;
                    format_json(encoded, target.ndjson)?
                };
                write_output(target.out.as_ref(), &output)
            }
            Command::Encode(target) => {
                let encoder = compile_encoder(&target.schema_settings.load()?)?;
                let mut encoded = Vec::new();
                target.input_settings.load_process(|value| {
                    encoded.push(encoder.encode(&value)?.to_json()?);
                    Ok(())
                })?;
                let output = format_json(encoded, target.input_settings.ndjson)?;
                write_output(target.out.as_ref(), &output)
            }
            Command::Render(target) => {
                let renderer = compile_renderer(&target.schema_settings.load()?)?;
                let mut lines = Vec::new();
                target.input_settings.load_process(|value| {
                    lines.push(renderer.render(&value)?);
                    Ok(())
                })?;
                write_output(target.out.as_ref(), &lines.join("\n"))
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn format_json(values: Vec<serde_json::Value>, ndjson: bool) -> Result<String> {
    if ndjson {
        let lines = values.iter().map(serde_json::to_string).collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    } else {
        Ok(serde_json::to_string_pretty(&values)?)
    }
}

fn write_output(out: Option<&PathBuf>, contents: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{contents}")?;
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

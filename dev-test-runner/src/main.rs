//! Runs every fixture schema through all three compilers: samples must be
//! accepted by the schema and survive encoding to JSON, and each recorded
//! case must encode and render exactly as recorded.
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, ensure};
use colored::Colorize;
use serde::Deserialize;

use schema_derive::document::{SchemaDocument, from_str_with_path};
use schema_derive::{Acceptor, StructuralGuard, Value, compile_encoder, compile_generator, compile_renderer};

const SAMPLES_PER_FIXTURE: usize = 200;
const SEED: u64 = 7;

#[derive(Deserialize)]
struct Fixture {
    schema: SchemaDocument,
    #[serde(default)]
    cases: Vec<Case>,
}

#[derive(Deserialize)]
struct Case {
    input: serde_json::Value,
    encoded: serde_json::Value,
    rendered: String,
}

fn run_fixture(path: &Path) -> Result<usize> {
    let source = std::fs::read_to_string(path)?;
    let fixture = from_str_with_path::<Fixture>(&source)?;
    let ast = fixture.schema.into_ast()?;

    let generator = compile_generator(&ast)?;
    let encoder = compile_encoder(&ast)?;
    let renderer = compile_renderer(&ast)?;
    let guard = StructuralGuard::new();

    let samples = generator.samples(SEED, SAMPLES_PER_FIXTURE)?;
    for sample in &samples {
        ensure!(guard.accepts(&ast, sample), "sample not accepted: {sample:?}");
        encoder
            .encode(sample)?
            .to_json()
            .with_context(|| format!("encoded sample is not JSON: {sample:?}"))?;
        renderer.render(sample)?;
    }

    for (i, case) in fixture.cases.iter().enumerate() {
        let input = Value::from(case.input.clone());
        let encoded = encoder.encode(&input)?.to_json()?;
        ensure!(encoded == case.encoded, "case {i}: encoded {encoded}, expected {}", case.encoded);
        let rendered = renderer.render(&input)?;
        ensure!(rendered == case.rendered, "case {i}: rendered {rendered}, expected {}", case.rendered);
    }

    Ok(samples.len() + fixture.cases.len())
}

fn main() -> ExitCode {
    let pattern = std::env::args()
        .nth(1)
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/*.json").to_string());
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect::<Vec<_>>(),
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut failures = 0;
    for path in &paths {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        match run_fixture(path) {
            Ok(checks) => eprintln!("✅ {name} ({checks} checks)"),
            Err(error) => {
                failures += 1;
                eprintln!("❌ {name}: {}", format!("{error:#}").red());
            }
        }
    }

    eprintln!("{} fixture(s), {} failed", paths.len(), failures);
    if failures == 0 && !paths.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

//! synapse-proto-gen: Generate .proto files from entity schema documents
//!
//! This tool reads YAML or JSON schema documents and generates, per package:
//! - One message per annotated entity, with nested enums
//! - Enum wrapper messages
//! - `<Entity>Service` with Create/Get/Update/Delete/List methods
//! - List filter, request and response messages

use clap::Parser;
use std::path::PathBuf;
use synapse_entproto::{compile, CompilerOptions};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod generator;
mod loader;

#[derive(Parser, Debug)]
#[command(name = "synapse-proto-gen")]
#[command(about = "Generate .proto files with CRUD services from entity schema documents")]
struct Args {
    /// Schema documents (YAML, or JSON by extension)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Output directory for generated proto files
    #[arg(short, long, default_value = "proto")]
    output: PathBuf,

    /// Package for entities whose message annotation names none
    #[arg(long, default_value = synapse_entproto::annotations::DEFAULT_PACKAGE)]
    default_package: String,

    /// Write the files that compiled even when some schemas failed
    #[arg(long)]
    allow_partial: bool,

    /// Print generated files to stdout instead of writing them
    #[arg(long)]
    stdout: bool,

    /// Also write the binary FileDescriptorSet to this path
    #[arg(long)]
    descriptor_set_out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let graph = loader::load_schema(&args.input)?;
    let options = CompilerOptions::default().with_default_package(args.default_package);
    let compiled = compile(&graph, &options)?;

    let errors = compiled.errors();
    if !errors.is_empty() {
        for (entity, err) in &errors {
            error!(entity = %entity, error = %err, "schema failed to compile");
        }
        if !args.allow_partial {
            let summary = errors
                .iter()
                .map(|(entity, err)| format!("{}: {}", entity, err))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(generator::GenerateError::EntitiesFailed {
                count: errors.len(),
                summary,
            }
            .into());
        }
    }

    if compiled.units().is_empty() {
        warn!("no entities annotated for message generation");
        return Ok(());
    }

    if let Some(path) = &args.descriptor_set_out {
        std::fs::write(path, compiled.encode_descriptor_set()).map_err(|source| {
            generator::GenerateError::Io {
                path: path.clone(),
                source,
            }
        })?;
    }

    if args.stdout {
        let namespaces = generator::Namespaces::new(compiled.units().values());
        for unit in compiled.units().values() {
            println!("// {}", unit.path);
            print!("{}", generator::render(unit, &namespaces));
        }
        return Ok(());
    }

    let written = generator::write_units(compiled.units().values(), &args.output)?;

    eprintln!(
        "Generated {} proto file(s) in {} for {} entities",
        written.len(),
        args.output.display(),
        compiled.units().values().map(|u| u.entities.len()).sum::<usize>()
    );

    Ok(())
}

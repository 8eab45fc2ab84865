//! Command-line surface for the assembler (`spec.md` §6): parses one input
//! file, assembles it, and writes a raw binary image or an ELF64 object.
//!
//! Peripheral to the encoder the rest of this crate implements, but built
//! out so the crate is an actually runnable assembler rather than a
//! library with no entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use attasm::encoder::OutputFormat;
use attasm::{elf, layout, parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormatArg {
    Bin,
    Elf,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Bin => OutputFormat::Binary,
            OutputFormatArg::Elf => OutputFormat::Elf,
        }
    }
}

/// A two-pass assembler for a subset of x86-64, AT&T syntax.
#[derive(Debug, Parser)]
#[command(name = "attasm", version, about)]
struct Args {
    /// Assembly source file to assemble.
    input: PathBuf,

    /// Output file path.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Output format.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormatArg::Bin)]
    format: OutputFormatArg,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let format: OutputFormat = args.format.into();

    let src = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let program = parser::parse(&src).with_context(|| format!("parsing {}", args.input.display()))?;
    log::debug!("parsed {} node(s)", program.nodes.len());

    let (result, labels, relocs) = layout::assemble(&program, format)
        .with_context(|| format!("assembling {}", args.input.display()))?;

    for entry in labels.iter() {
        log::debug!("label {} = {:#x} ({:?})", entry.name, entry.address, entry.section);
    }
    for reloc in relocs.iter() {
        log::debug!(
            "reloc {} at {:#x} ({:?}, {:?})",
            reloc.target,
            reloc.offset,
            reloc.section,
            reloc.kind
        );
    }

    match format {
        OutputFormat::Binary => {
            elf::write_to(&args.output, &result.code)
                .with_context(|| format!("writing {}", args.output.display()))?;
        }
        OutputFormat::Elf => {
            let bytes = elf::build_elf64(&result, &labels, &relocs);
            elf::write_to(&args.output, &bytes)
                .with_context(|| format!("writing {}", args.output.display()))?;
        }
    }

    log::info!(
        "wrote {} ({} code byte(s), {} data byte(s))",
        args.output.display(),
        result.code.len(),
        result.data.len()
    );
    Ok(())
}

//! Kelpie CLI - indicator script to JavaScript transpiler

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use kelpie::resolver::{DirLibrarySource, LibrarySource};
use kelpie::transpile_with_diagnostics;

/// Kelpie - indicator script to JavaScript transpiler
#[derive(Parser, Debug)]
#[command(name = "klp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transpile indicator scripts to JavaScript", long_about = None)]
struct Cli {
    /// Input script file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output JavaScript file (default: <INPUT>.js)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Directory to resolve import specifiers against
    #[arg(long, value_name = "DIR")]
    lib_dir: Option<PathBuf>,

    /// Check only (don't generate output)
    #[arg(short, long)]
    check: bool,

    /// Print script metadata as JSON to stdout
    #[arg(long)]
    meta_json: bool,

    /// Emit JSON diagnostics to stderr (on failure only)
    #[arg(long)]
    diag_json: bool,

    /// Show debug information
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        println!("[DEBUG] Input: {:?}", cli.input);
        println!("[DEBUG] Output: {:?}", cli.output);
        println!("[DEBUG] Library dir: {:?}", cli.lib_dir);
    }

    let source = std::fs::read_to_string(&cli.input)?;

    if cli.debug {
        println!("[DEBUG] Source length: {} bytes", source.len());
    }

    let dir_source = cli.lib_dir.as_ref().map(DirLibrarySource::new);
    let libs = dir_source.as_ref().map(|s| s as &dyn LibrarySource);

    let result = match transpile_with_diagnostics(&source, Some(&cli.input), libs) {
        Ok(result) => result,
        Err(diags) => {
            print!("{}", diags.to_text());
            if cli.diag_json {
                eprintln!("{}", diags.to_json());
            }
            std::process::exit(1);
        }
    };

    // Warnings from a successful run still print
    print!("{}", result.diagnostics.to_text());

    if cli.meta_json {
        println!("{}", serde_json::to_string_pretty(&result.metadata)?);
    }

    if cli.debug {
        println!("[DEBUG] Generated JavaScript:");
        println!("{}", result.code);
    }

    if cli.check {
        println!("✅ Transpilation successful!");
        return Ok(());
    }

    let output_path = cli.output.unwrap_or_else(|| {
        // Default: current directory, input filename with .js
        let mut p = cli.input.clone();
        p.set_extension("js");
        if let Some(filename) = p.file_name() {
            PathBuf::from(filename)
        } else {
            p
        }
    });

    std::fs::write(&output_path, &result.code)?;
    println!("✅ Transpiled to: {output_path:?}");

    Ok(())
}

//! Command-line interface implementation

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::describe::{build_description, write_description};
use crate::output::{composite_page, save_png};
use crate::pack::pack_sprites;
use crate::parser::{ParseOptions, Parser as DefinitionParser};

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;

/// Pixpack - compile sprite sheet descriptions into packed texture atlases
#[derive(Parser)]
#[command(name = "pxp")]
#[command(about = "Pixpack - compile sprite sheet descriptions into packed texture atlases")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack the sheets of a description file into texture atlases
    Pack {
        /// Input description file
        input: PathBuf,

        /// Directory the atlas pages are written to.
        /// Defaults to the input file's directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a JSON description of every placement to this file
        #[arg(long)]
        describe: Option<PathBuf>,

        /// Write the deduced sprite/skip/offset/rect directives back
        /// into the input file
        #[arg(long)]
        autocomplete: bool,

        /// Strict mode: a failed sprite copy aborts the run instead of
        /// being skipped
        #[arg(long)]
        strict: bool,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pack {
            input,
            output,
            describe,
            autocomplete,
            strict,
        } => run_pack(
            &input,
            output.as_deref(),
            describe.as_deref(),
            autocomplete,
            strict,
        ),
    }
}

/// Execute the pack command
fn run_pack(
    input: &Path,
    output: Option<&Path>,
    describe: Option<&Path>,
    autocomplete: bool,
    strict: bool,
) -> ExitCode {
    let text = match fs::read_to_string(input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot read input file '{}': {e}", input.display());
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let base_dir = input.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut parser = DefinitionParser::new(ParseOptions {
        autocomplete,
        base_dir: base_dir.clone(),
    });
    if let Err(e) = parser.parse(&text) {
        eprintln!("Error: {e}");
        return ExitCode::from(EXIT_ERROR);
    }
    let autocomplete_text = parser.autocomplete_output().to_string();
    let mut document = parser.into_document();

    let pages = match pack_sprites(&mut document.sprites, &document.textures) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    // every page owns its buffer and the sheets are read-only by now,
    // so distinct pages composite in parallel
    let results: Vec<_> = pages
        .par_iter()
        .map(|page| {
            composite_page(
                page,
                &document.sprites,
                &document.textures[page.texture_index],
                strict,
            )
            .map(|image| (page, image))
        })
        .collect();

    let out_dir = output.unwrap_or(&base_dir);
    for result in results {
        match result {
            Ok((page, Some(image))) => {
                let path = out_dir.join(&page.filename);
                if let Err(e) = save_png(&image, &path) {
                    eprintln!("Error: writing '{}' failed: {e}", path.display());
                    return ExitCode::from(EXIT_ERROR);
                }
            }
            Ok((_, None)) => {}
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(EXIT_ERROR);
            }
        }
    }

    if let Some(path) = describe {
        let description = build_description(&pages, &document.sprites);
        if let Err(e) = write_description(&description, path) {
            eprintln!("Error: writing '{}' failed: {e}", path.display());
            return ExitCode::from(EXIT_ERROR);
        }
    }

    if autocomplete {
        if let Err(e) = update_textfile(input, &autocomplete_text) {
            eprintln!("Error: updating '{}' failed: {e}", input.display());
            return ExitCode::from(EXIT_ERROR);
        }
    }

    ExitCode::from(EXIT_SUCCESS)
}

/// Rewrite the file only when its content actually changed, keeping
/// modification times stable for build systems.
fn update_textfile(path: &Path, text: &str) -> std::io::Result<()> {
    if let Ok(current) = fs::read_to_string(path) {
        if current == text {
            return Ok(());
        }
    }
    fs::write(path, text)
}

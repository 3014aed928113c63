// Slate CLI - interactive grid menu and headless spreadsheet operations

mod exit_codes;
mod menu;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use slate_config::Settings;
use slate_engine::cell::format_number;
use slate_engine::formula::eval::evaluate;
use slate_engine::formula::parser::{self, FormulaOptions, Func};
use slate_engine::grid::Grid;
use slate_io::{json, s2v};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "slate")]
#[command(about = "Semicolon-separated-values spreadsheet with a formula engine")]
#[command(version)]
struct Cli {
    /// Grid file to open in the interactive menu
    file: Option<PathBuf>,

    /// Override the configured formula argument separator
    #[arg(long)]
    separator: Option<char>,

    /// Print recalculation reports as JSON after each edit
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula against a grid file and print the result
    #[command(after_help = "\
Examples:
  slate calc '=SUM(A1:B2)' -f data.s2v
  slate calc '=MAX(A1;B1;3)'")]
    Calc {
        /// Formula to evaluate (must start with =)
        formula: String,

        /// Grid file providing cell values (omit for an empty grid)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Export a grid file as JSON (array of rows of display strings)
    Export {
        /// Input .s2v file
        input: PathBuf,

        /// Output file
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::load();
    let options = formula_options(&settings, cli.separator);

    let code = match cli.command {
        Some(Commands::Calc { formula, file }) => cmd_calc(&formula, file.as_deref(), options),
        Some(Commands::Export { input, output }) => cmd_export(&input, &output, options),
        None => menu::run(cli.file.as_deref(), options, &settings, cli.json),
    };
    ExitCode::from(code)
}

/// Build the engine's parse options from settings plus the CLI override.
fn formula_options(settings: &Settings, separator_override: Option<char>) -> FormulaOptions {
    let mut options = FormulaOptions::default();
    options.arg_separator = separator_override.unwrap_or_else(|| settings.separator_char());
    for (name, canonical) in &settings.localized_names {
        match Func::from_name(canonical) {
            Some(func) => options.add_alias(name, func),
            None => eprintln!(
                "warning: settings map '{}' to unknown function '{}'; ignored",
                name, canonical
            ),
        }
    }
    options
}

fn cmd_calc(formula: &str, file: Option<&Path>, options: FormulaOptions) -> u8 {
    let trimmed = formula.trim();
    let Some(body) = trimmed.strip_prefix('=') else {
        eprintln!("error: formula must start with =");
        return EXIT_USAGE;
    };

    let grid = match file {
        Some(path) => match s2v::load(path, options.clone()) {
            Ok(loaded) => {
                report_warnings(&loaded.warnings);
                loaded.grid
            }
            Err(e) => {
                eprintln!("error: {}", e);
                return EXIT_ERROR;
            }
        },
        None => Grid::with_options(options.clone()),
    };

    let ast = match parser::parse(&body.to_ascii_uppercase(), &options) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_USAGE;
        }
    };

    match evaluate(&ast, &grid) {
        Ok(value) => {
            println!("{}", format_number(value));
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_ERROR
        }
    }
}

fn cmd_export(input: &Path, output: &Path, options: FormulaOptions) -> u8 {
    let loaded = match s2v::load(input, options) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_ERROR;
        }
    };
    report_warnings(&loaded.warnings);

    if let Err(e) = json::export(&loaded.grid, output) {
        eprintln!("error: {}", e);
        return EXIT_ERROR;
    }
    EXIT_SUCCESS
}

fn report_warnings(warnings: &[s2v::LoadWarning]) {
    for warning in warnings {
        eprintln!("warning: skipped {}: {}", warning.coord, warning.error);
    }
}

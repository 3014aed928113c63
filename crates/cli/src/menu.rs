// Interactive text menu over a grid: edit cells, display, save, load.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use slate_config::Settings;
use slate_engine::coord::Coord;
use slate_engine::formula::parser::FormulaOptions;
use slate_engine::grid::Grid;
use slate_io::s2v;

use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use crate::report_warnings;

const CELL_WIDTH: usize = 10;

pub fn run(file: Option<&Path>, options: FormulaOptions, settings: &Settings, json: bool) -> u8 {
    let mut grid = match file {
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

    let mut path: PathBuf = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&settings.default_path));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        println!();
        println!("=== Slate ===");
        println!("1. Add or modify cell");
        println!("2. Display grid");
        println!("3. Save ({})", path.display());
        println!("4. Load");
        println!("5. Exit");
        print!("Choose an option: ");
        let _ = io::stdout().flush();

        let Some(choice) = read_line(&mut lines) else {
            break;
        };
        match choice.trim() {
            "1" => edit_cell(&mut grid, &mut lines, json),
            "2" => print_grid(&grid),
            "3" => {
                match s2v::save(&grid, &path) {
                    Ok(()) => println!("Saved to {}", path.display()),
                    Err(e) => eprintln!("error: {}", e),
                };
            }
            "4" => {
                print!("File to load [{}]: ", path.display());
                let _ = io::stdout().flush();
                let Some(input) = read_line(&mut lines) else {
                    break;
                };
                let target = if input.trim().is_empty() {
                    path.clone()
                } else {
                    PathBuf::from(input.trim())
                };
                match s2v::load(&target, options.clone()) {
                    Ok(loaded) => {
                        report_warnings(&loaded.warnings);
                        grid = loaded.grid;
                        path = target;
                        println!("Loaded {}", path.display());
                    }
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            "5" | "q" | "quit" => break,
            "" => {}
            other => println!("Unknown option '{}'", other),
        }
    }

    EXIT_SUCCESS
}

fn edit_cell(
    grid: &mut Grid,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    json: bool,
) {
    print!("Cell coordinate (e.g. A1): ");
    let _ = io::stdout().flush();
    let Some(coord) = read_line(lines) else { return };

    print!("Content (text, number, or formula starting with '='): ");
    let _ = io::stdout().flush();
    let Some(content) = read_line(lines) else { return };

    match grid.set_cell(coord.trim(), &content) {
        Ok(report) => {
            for error in &report.errors {
                eprintln!("error: cell {}: {}", error.cell, error.error);
            }
            if json {
                match serde_json::to_string(&report) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("error: {}", e),
                }
            } else {
                println!("recalc: {}", report.summary());
            }
        }
        Err(e) => eprintln!("error: {}", e),
    }
}

/// Render the grid as a table: lettered column header, numbered rows.
fn print_grid(grid: &Grid) {
    let Some((max_row, max_col)) = grid.bounds() else {
        println!("(empty grid)");
        return;
    };

    print!("    ");
    for col in 0..=max_col {
        print!("{:<width$}", slate_engine::coord::col_to_letters(col), width = CELL_WIDTH);
    }
    println!();

    for row in 0..=max_row {
        print!("{:<4}", row + 1);
        for col in 0..=max_col {
            let mut value = grid.display(Coord::new(row, col));
            if value.chars().count() > CELL_WIDTH - 1 {
                value = value.chars().take(CELL_WIDTH - 1).collect();
            }
            print!("{:<width$}", value, width = CELL_WIDTH);
        }
        println!();
    }
}

fn read_line(lines: &mut impl Iterator<Item = io::Result<String>>) -> Option<String> {
    match lines.next() {
        Some(Ok(line)) => Some(line),
        _ => None,
    }
}

// S2V (semicolon-separated values) grid format
//
// Rows separated by newline, cells within a row by ';'. Trailing empty cells
// in a row are omitted; interior empties are empty fields. Formula cells are
// written as their source text and re-evaluate on load.
//
// Because ';' is both the field delimiter and the formula argument
// separator, the writer rewrites ';' inside cell content to ',' and the
// loader reverses it. The mapping is lossy: a literal ',' in saved content
// is indistinguishable from an escaped ';' and comes back as ';'.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use slate_engine::coord::Coord;
use slate_engine::formula::parser::FormulaOptions;
use slate_engine::grid::{EditError, Grid};

/// A cell skipped during load, with the reason it failed to apply.
#[derive(Debug)]
pub struct LoadWarning {
    pub coord: Coord,
    pub error: EditError,
}

/// A loaded grid plus any cells that failed to apply. One bad cell does not
/// abort the load.
#[derive(Debug)]
pub struct Loaded {
    pub grid: Grid,
    pub warnings: Vec<LoadWarning>,
}

/// Write the grid to `path` in S2V format.
pub fn save(grid: &Grid, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_writer(BufWriter::new(file));

    let Some((max_row, max_col)) = grid.bounds() else {
        return writer.flush().map_err(|e| e.to_string());
    };

    for row in 0..=max_row {
        let mut record: Vec<String> = Vec::new();
        let mut last_filled = 0;
        for col in 0..=max_col {
            let text = match grid.content(Coord::new(row, col)) {
                Some(content) => content.raw_display(),
                None => String::new(),
            };
            if !text.is_empty() {
                last_filled = record.len() + 1;
            }
            record.push(escape(&text));
        }
        record.truncate(last_filled);
        // A fully empty row still needs two fields: a lone empty field
        // would serialize as a blank line, which readers skip, shifting
        // every row below it.
        if record.is_empty() {
            record.push(String::new());
            record.push(String::new());
        }
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())
}

/// Load a grid from `path`. Cells apply top-left to bottom-right through the
/// normal edit pipeline, so formulas re-evaluate (forward references resolve
/// once the referenced cells load); cells that fail to apply are collected
/// as warnings.
pub fn load(path: &Path, options: FormulaOptions) -> Result<Loaded, String> {
    let content = read_file_as_utf8(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(content.as_bytes());

    let mut grid = Grid::with_options(options);
    let mut warnings = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| e.to_string())?;
        for (col, field) in record.iter().enumerate() {
            let text = unescape(field);
            if text.is_empty() {
                continue;
            }
            let coord = Coord::new(row, col);
            if let Err(error) = grid.set(coord, &text) {
                warnings.push(LoadWarning { coord, error });
            }
        }
    }

    Ok(Loaded { grid, warnings })
}

/// Read a file and convert to UTF-8 if needed (handles Windows-1252 exports).
fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn escape(content: &str) -> String {
    content.replace(';', ",")
}

fn unescape(field: &str) -> String {
    field.replace(',', ";")
}

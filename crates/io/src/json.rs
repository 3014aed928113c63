// JSON export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use slate_engine::coord::Coord;
use slate_engine::grid::Grid;

/// Export a grid as a JSON array of row arrays.
/// Each row is an array of cell display strings; trailing empties trimmed.
pub fn export(grid: &Grid, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let writer = BufWriter::new(file);

    let mut rows: Vec<Vec<String>> = Vec::new();

    if let Some((max_row, max_col)) = grid.bounds() {
        for row in 0..=max_row {
            let mut record: Vec<String> = Vec::new();
            let mut last_non_empty = 0;
            for col in 0..=max_col {
                let value = grid.display(Coord::new(row, col));
                if !value.is_empty() {
                    last_non_empty = col + 1;
                }
                record.push(value);
            }
            record.truncate(last_non_empty);
            rows.push(record);
        }
    }

    serde_json::to_writer_pretty(writer, &rows).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_json_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.json");

        let mut grid = Grid::new();
        grid.set_cell("A1", "Name").unwrap();
        grid.set_cell("B1", "Total").unwrap();
        grid.set_cell("A2", "Alice").unwrap();
        grid.set_cell("B2", "=21*2").unwrap();

        export(&grid, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Vec<Vec<String>> = serde_json::from_str(&content).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec!["Name", "Total"]);
        // Formulas export their computed value, not their source.
        assert_eq!(parsed[1], vec!["Alice", "42"]);
    }

    #[test]
    fn test_json_export_empty_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");

        export(&Grid::new(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Vec<Vec<String>> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }
}

// THEORY:
// The squares CSV is the engine's only persisted artifact and the viewer's only
// data source. Reading it is where the loosely typed file becomes a `SquareTable`,
// so every structural check happens here, once: all columns present, square
// numbers contiguous, rows and columns consistent with the grid, `Valid Tau`
// agreeing with `Tau`. A table that fails any check is rejected whole.
//
// Writing is plain serde through the `csv` crate. Header names and column order
// come from the `Square` record, so read -> write reproduces the same bytes.

use crate::core_modules::grid_partition::GridPartition;
use crate::core_modules::square::{SQUARE_COLUMNS, Square, SquareTable};
use crate::error::{PaintError, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub fn read_squares<R: Read>(reader: R) -> Result<SquareTable> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for column in SQUARE_COLUMNS {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(PaintError::MissingColumn(column.to_string()));
        }
    }

    let mut squares: Vec<Square> = Vec::new();
    for record in csv_reader.deserialize() {
        squares.push(record?);
    }
    squares.sort_by_key(|s| s.square_nr);

    let nr_of_squares_in_row = validate_grid(&squares)?;
    Ok(SquareTable {
        nr_of_squares_in_row,
        squares,
    })
}

/// Checks contiguity, grid consistency and that `valid_tau` agrees with `tau`;
/// returns N.
fn validate_grid(squares: &[Square]) -> Result<u32> {
    let n = (squares.len() as f64).sqrt().round() as u32;
    if n == 0 || (n as usize) * (n as usize) != squares.len() {
        return Err(PaintError::MalformedTable(format!(
            "{} squares do not form a square grid",
            squares.len()
        )));
    }
    let partition = GridPartition::new(n)?;
    for (expected, square) in squares.iter().enumerate() {
        if square.square_nr as usize != expected {
            return Err(PaintError::MalformedTable(format!(
                "square numbers are not contiguous: expected {expected}, found {}",
                square.square_nr
            )));
        }
        if square.valid_tau != square.tau.is_valid() {
            return Err(PaintError::MalformedTable(format!(
                "square {} has Valid Tau {} but Tau {}",
                square.square_nr,
                square.valid_tau,
                square.tau.value()
            )));
        }
        if (square.row_nr, square.col_nr) != partition.row_col(square.square_nr) {
            return Err(PaintError::MalformedTable(format!(
                "square {} has row/col ({}, {}) inconsistent with a {n}x{n} grid",
                square.square_nr, square.row_nr, square.col_nr
            )));
        }
    }
    Ok(n)
}

pub fn write_squares<W: Write>(writer: W, table: &SquareTable) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for square in &table.squares {
        csv_writer.serialize(square)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn load_squares(path: &Path) -> Result<SquareTable> {
    read_squares(File::open(path)?)
}

pub fn save_squares(path: &Path, table: &SquareTable) -> Result<()> {
    write_squares(File::create(path)?, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::square::Tau;

    fn sample_table() -> SquareTable {
        let mut table = SquareTable::empty(&GridPartition::new(2).unwrap());
        let taus = [Tau::Fitted(123.25), Tau::TooFewTracks, Tau::NotConverged, Tau::LowConfidence];
        for (i, (square, tau)) in table.squares.iter_mut().zip(taus).enumerate() {
            square.nr_tracks = (i as u32 + 1) * 7;
            square.tau = tau;
            square.valid_tau = tau.is_valid();
            square.r_squared = 0.25 * i as f64;
            square.density = 1.5;
            square.density_ratio = 2.3;
            square.variability = 0.7;
            square.cell_id = i as u8;
            square.visible = i % 2 == 0;
            square.label_nr = if square.visible { i as u32 / 2 + 1 } else { 0 };
        }
        table
    }

    fn to_csv(table: &SquareTable) -> String {
        let mut buffer = Vec::new();
        write_squares(&mut buffer, table).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn header_matches_the_column_list() {
        let text = to_csv(&sample_table());
        let header = text.lines().next().unwrap();
        assert_eq!(header, SQUARE_COLUMNS.join(","));
    }

    #[test]
    fn tau_sentinels_are_persisted_as_numbers() {
        let text = to_csv(&sample_table());
        let tau_column = SQUARE_COLUMNS.iter().position(|&c| c == "Tau").unwrap();
        let taus: Vec<String> = text
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(tau_column).unwrap().to_string())
            .collect();
        assert_eq!(taus, vec!["123.25", "-1.0", "-2.0", "-3.0"]);
    }

    #[test]
    fn reading_then_writing_reproduces_the_bytes() {
        let original = to_csv(&sample_table());
        let table = read_squares(original.as_bytes()).unwrap();
        assert_eq!(table, sample_table());
        assert_eq!(to_csv(&table), original);
    }

    #[test]
    fn rows_may_arrive_in_any_order() {
        let text = to_csv(&sample_table());
        let mut lines: Vec<&str> = text.lines().collect();
        lines[1..].reverse();
        let shuffled = lines.join("\n");
        let table = read_squares(shuffled.as_bytes()).unwrap();
        assert_eq!(table, sample_table());
    }

    #[test]
    fn missing_column_is_a_load_error() {
        let text = to_csv(&sample_table()).replace("Neighbour Visible", "Neighbor Visible");
        match read_squares(text.as_bytes()) {
            Err(PaintError::MissingColumn(column)) => assert_eq!(column, "Neighbour Visible"),
            other => panic!("expected a missing column error, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_grid_is_rejected() {
        let text = to_csv(&sample_table());
        let truncated: Vec<&str> = text.lines().take(4).collect();
        assert!(matches!(
            read_squares(truncated.join("\n").as_bytes()),
            Err(PaintError::MalformedTable(_))
        ));
    }

    #[test]
    fn valid_tau_contradicting_tau_is_rejected() {
        let mut table = sample_table();
        // Square 1 carries the too-few-tracks sentinel.
        table.squares[1].valid_tau = true;
        match read_squares(to_csv(&table).as_bytes()) {
            Err(PaintError::MalformedTable(reason)) => assert!(reason.contains("square 1")),
            other => panic!("expected a malformed table error, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_value_is_a_load_error() {
        let text = to_csv(&sample_table()).replacen("true", "maybe", 1);
        assert!(matches!(read_squares(text.as_bytes()), Err(PaintError::Csv(_))));
    }
}

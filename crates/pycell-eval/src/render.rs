//! Grid of cell values written into a result's spill region.

use chrono::NaiveDate;
use pycell_common::{CellValue, DataFrame, Footprint, ResultKind, Series, Value};

use crate::classify::Classified;

/// Spreadsheet serial of a date (days since 1899-12-30).
pub fn date_serial(d: &NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN);
    (*d - epoch).num_days() as f64
}

fn cell(v: &Value) -> CellValue {
    match v {
        Value::Date(d) => CellValue::Number(date_serial(d)),
        Value::Float(f) if f.is_nan() => CellValue::Empty,
        Value::Error(e) => CellValue::Error(format!("#PY! {e}")),
        other => CellValue::from_value(other),
    }
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn frame_grid(df: &DataFrame) -> Vec<Vec<CellValue>> {
    let mut grid = Vec::with_capacity(df.n_rows() + 1);
    if df.described {
        for r in 0..df.n_rows() {
            grid.push(df.data.iter().map(|col| cell(&col[r])).collect());
        }
        return grid;
    }
    if df.show_header {
        let mut header = Vec::with_capacity(df.n_cols() + 1);
        if df.show_index {
            header.push(CellValue::Empty);
        }
        header.extend(df.columns.iter().map(|c| text(c)));
        grid.push(header);
    }
    let labels = df.index_labels();
    for (r, label) in labels.iter().enumerate().take(df.n_rows()) {
        let mut row = Vec::with_capacity(df.n_cols() + 1);
        if df.show_index {
            row.push(cell(label));
        }
        row.extend(df.data.iter().map(|col| cell(&col[r])));
        grid.push(row);
    }
    grid
}

fn series_grid(s: &Series) -> Vec<Vec<CellValue>> {
    let mut grid = Vec::with_capacity(s.len() + 1);
    if let Some(name) = &s.name {
        grid.push(vec![CellValue::Empty, text(name)]);
    }
    for (label, v) in s.index_labels().iter().zip(&s.values) {
        grid.push(vec![cell(label), cell(v)]);
    }
    grid
}

fn table_grid(rows: &[Value]) -> Vec<Vec<CellValue>> {
    rows.iter()
        .map(|row| match row {
            Value::List(items) | Value::Tuple(items) => items.iter().map(cell).collect(),
            scalar => vec![cell(scalar)],
        })
        .collect()
}

/// Render `classified` into exactly `footprint` (clamped to one cell).
/// Missing cells are empty; overflow is cut off.
pub fn render(classified: &Classified, footprint: Footprint) -> Vec<Vec<CellValue>> {
    let natural = match (&classified.kind, &classified.value) {
        (ResultKind::DataFrame, Value::Frame(df)) => frame_grid(df),
        (ResultKind::Series, Value::Series(s)) => series_grid(s),
        (ResultKind::Table, Value::List(rows) | Value::Tuple(rows)) => table_grid(rows),
        (ResultKind::Empty | ResultKind::None, _) => vec![vec![CellValue::Empty]],
        (ResultKind::Plot, Value::Figure(fig)) => {
            vec![vec![text(fig.saved_to.as_deref().unwrap_or(&fig.to_string()))]]
        }
        (_, v) => vec![vec![cell(v)]],
    };
    let size = footprint.clamped();
    let (rows, cols) = (size.rows as usize, size.cols as usize);
    let mut grid: Vec<Vec<CellValue>> = natural.into_iter().take(rows).collect();
    grid.resize_with(rows, Vec::new);
    for row in &mut grid {
        row.truncate(cols);
        row.resize(cols, CellValue::Empty);
    }
    grid
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pycell_common::{ExecError, Figure};

    use super::*;
    use crate::sizer::footprint;

    fn render_natural(c: &Classified) -> Vec<Vec<CellValue>> {
        render(c, footprint(c, None))
    }

    #[test]
    fn frame_has_header_row_and_index_column() {
        let df = DataFrame::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Int(1), Value::Int(2)], vec![Value::str("x"), Value::str("y")]],
        )
        .unwrap();
        let grid = render_natural(&Classified::new(ResultKind::DataFrame, Value::Frame(Rc::new(df))));
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec![CellValue::Empty, text("a"), text("b")]);
        assert_eq!(grid[2], vec![CellValue::Number(1.0), CellValue::Number(2.0), text("y")]);
    }

    #[test]
    fn named_series_starts_with_name_row() {
        let mut s = Series::new(vec![Value::Float(0.5)]);
        s.name = Some("share".into());
        let grid = render_natural(&Classified::new(ResultKind::Series, Value::Series(Rc::new(s))));
        assert_eq!(grid, vec![
            vec![CellValue::Empty, text("share")],
            vec![CellValue::Number(0.0), CellValue::Number(0.5)],
        ]);
    }

    #[test]
    fn ragged_tables_are_padded_to_footprint() {
        let rows = Value::list(vec![
            Value::list(vec![Value::Int(1), Value::Int(2)]),
            Value::list(vec![Value::Int(3)]),
        ]);
        let grid = render_natural(&Classified::new(ResultKind::Table, rows));
        assert_eq!(grid[1], vec![CellValue::Number(3.0), CellValue::Empty]);
    }

    #[test]
    fn scalars_errors_and_plots_fill_one_cell() {
        let err = Value::error(ExecError::name_error("x"));
        let grid = render_natural(&Classified::new(ResultKind::Error, err));
        assert_eq!(grid, vec![vec![CellValue::Error("#PY! NameError: name 'x' is not defined".into())]]);

        let fig = Figure {
            kind: "line".into(),
            saved_to: Some("figures/pycell_1.png".into()),
            ..Figure::default()
        };
        let grid = render_natural(&Classified::new(ResultKind::Plot, Value::Figure(Rc::new(fig))));
        assert_eq!(grid, vec![vec![text("figures/pycell_1.png")]]);
    }

    #[test]
    fn dates_become_serials() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(date_serial(&d), 45292.0);
    }

    #[test]
    fn unrecognized_fills_existing_spill() {
        let c = Classified::new(ResultKind::Unrecognized, Value::str("<module 'math'>"));
        let grid = render(&c, Footprint::new(2, 2));
        assert_eq!(grid[0][0], text("<module 'math'>"));
        assert_eq!(grid[1], vec![CellValue::Empty, CellValue::Empty]);
    }
}

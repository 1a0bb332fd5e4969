//! Spreadsheet footprint of a classified value.

use pycell_common::{DataFrame, Footprint, ResultKind, Series, Value};

use crate::classify::Classified;

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub fn frame_footprint(df: &DataFrame) -> Footprint {
    if df.described {
        return Footprint::new(count(df.n_rows()), count(df.n_cols()));
    }
    Footprint::new(
        count(df.n_rows() + usize::from(df.show_header)),
        count(df.n_cols() + usize::from(df.show_index)),
    )
}

pub fn series_footprint(s: &Series) -> Footprint {
    Footprint::new(count(s.len() + usize::from(s.name.is_some())), 2)
}

/// Rows of a table value and the width of its first row. A flat list is a
/// single column.
pub fn table_footprint(rows: &[Value]) -> Footprint {
    let cols = match rows.first() {
        None => return Footprint::new(0, 0),
        Some(Value::List(first)) | Some(Value::Tuple(first)) => first.len(),
        Some(_) => 1,
    };
    Footprint::new(count(rows.len()), count(cols))
}

/// Region needed to display `classified`.
///
/// `current_spill` is the size of the array formula already anchored at the
/// cell, if any; unrecognized values keep it.
pub fn footprint(classified: &Classified, current_spill: Option<Footprint>) -> Footprint {
    match (&classified.kind, &classified.value) {
        (ResultKind::DataFrame, Value::Frame(df)) => frame_footprint(df),
        (ResultKind::Series, Value::Series(s)) => series_footprint(s),
        (ResultKind::Table, Value::List(rows) | Value::Tuple(rows)) => table_footprint(rows),
        (ResultKind::Unrecognized, _) => current_spill.unwrap_or(Footprint::SCALAR),
        _ => Footprint::SCALAR,
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn ints(n: i64) -> Vec<Value> {
        (0..n).map(Value::Int).collect()
    }

    #[test]
    fn frame_with_header_and_default_index() {
        let df = DataFrame::new(vec!["a".into(), "b".into()], vec![ints(3), ints(3)]).unwrap();
        let c = Classified::new(ResultKind::DataFrame, Value::Frame(Rc::new(df)));
        assert_eq!(footprint(&c, None), Footprint::new(4, 3));
    }

    #[test]
    fn frame_without_index_or_header() {
        let mut df = DataFrame::new(vec!["a".into(), "b".into()], vec![ints(3), ints(3)]).unwrap();
        df.show_index = false;
        assert_eq!(frame_footprint(&df), Footprint::new(4, 2));
        df.show_header = false;
        assert_eq!(frame_footprint(&df), Footprint::new(3, 2));
    }

    #[test]
    fn described_frame_is_not_incremented() {
        let mut df = DataFrame::new(vec!["".into(), "x".into()], vec![ints(9), ints(9)]).unwrap();
        df.described = true;
        assert_eq!(frame_footprint(&df), Footprint::new(9, 2));
    }

    #[test]
    fn named_series_adds_label_row() {
        let mut s = Series::new(ints(5));
        assert_eq!(series_footprint(&s), Footprint::new(5, 2));
        s.name = Some("n".into());
        let c = Classified::new(ResultKind::Series, Value::Series(Rc::new(s)));
        assert_eq!(footprint(&c, None), Footprint::new(6, 2));
    }

    #[test]
    fn tables_and_flat_lists() {
        let rows = vec![Value::list(ints(3)), Value::list(ints(3))];
        assert_eq!(table_footprint(&rows), Footprint::new(2, 3));
        assert_eq!(table_footprint(&ints(4)), Footprint::new(4, 1));
        assert_eq!(table_footprint(&[]), Footprint::new(0, 0));
    }

    #[test]
    fn unrecognized_keeps_current_spill() {
        let c = Classified::new(ResultKind::Unrecognized, Value::str("{}"));
        assert_eq!(footprint(&c, Some(Footprint::new(3, 4))), Footprint::new(3, 4));
        assert_eq!(footprint(&c, None), Footprint::SCALAR);
        let scalar = Classified::new(ResultKind::Scalar, Value::Int(1));
        assert_eq!(footprint(&scalar, Some(Footprint::new(3, 4))), Footprint::SCALAR);
    }
}

//! Reshapes walked rows into the three response shapes clients ask for
//! (§4.6): `cube` (dense multi-dimensional arrays, one per select),
//! `table` (a header plus one array per row), and `list` (one object
//! per row — also how a non-grouped aggregation's single scalar record
//! comes back, since it's a table/cube with zero edges).

use serde_json::{json, Map, Value};

use crate::decoders::Decoder;
use crate::query::{Format, SelectClause};
use crate::walker::Row;

pub struct Formatter;

impl Formatter {
    pub fn format(format: Format, decoders: &[Box<dyn Decoder>], selects: &[SelectClause], rows: &[Row]) -> Value {
        match format {
            Format::Cube => Self::cube(decoders, selects, rows),
            Format::Table => Self::table(decoders, selects, rows),
            Format::List => Self::list(decoders, selects, rows),
        }
    }

    fn edge_domain_names(decoder: &dyn Decoder) -> Vec<String> {
        use crate::query::DomainKind;
        match decoder.edge().domain.kind {
            DomainKind::Set { partitions } => partitions.into_iter().map(|p| p.name).collect(),
            _ => vec![],
        }
    }

    fn cube(decoders: &[Box<dyn Decoder>], selects: &[SelectClause], rows: &[Row]) -> Value {
        let shapes: Vec<Vec<String>> = decoders.iter().map(|d| Self::edge_domain_names(d.as_ref())).collect();
        let dims: Vec<usize> = shapes.iter().map(|s| s.len()).collect();
        let total: usize = dims.iter().product::<usize>().max(1);

        let mut data = Map::new();
        for select in selects {
            data.insert(select.name.clone(), Value::Array(vec![Value::Null; total]));
        }

        for row in rows {
            let flat = match flat_index(&row.coordinates, &dims) {
                Some(f) => f,
                None => continue,
            };
            for (name, value) in &row.values {
                if let Some(arr) = data.get_mut(name).and_then(|v| v.as_array_mut()) {
                    if flat < arr.len() {
                        arr[flat] = value.clone();
                    }
                }
            }
        }

        json!({
            "edges": decoders.iter().zip(shapes.iter()).map(|(d, names)| json!({"name": d.edge().name, "domain": names})).collect::<Vec<_>>(),
            "dims": dims,
            "data": data,
        })
    }

    fn table(decoders: &[Box<dyn Decoder>], selects: &[SelectClause], rows: &[Row]) -> Value {
        let header: Vec<String> = decoders.iter().map(|d| d.edge().name).chain(selects.iter().map(|s| s.name.clone())).collect();
        let shapes: Vec<Vec<String>> = decoders.iter().map(|d| Self::edge_domain_names(d.as_ref())).collect();

        let data: Vec<Value> = rows
            .iter()
            .map(|row| {
                let mut record = Vec::with_capacity(header.len());
                for (i, coord) in row.coordinates.iter().enumerate() {
                    let name = coord.and_then(|c| shapes[i].get(c)).cloned();
                    record.push(name.map(Value::String).unwrap_or(Value::Null));
                }
                for (_, value) in &row.values {
                    record.push(value.clone());
                }
                Value::Array(record)
            })
            .collect();

        json!({"header": header, "data": data})
    }

    fn list(decoders: &[Box<dyn Decoder>], selects: &[SelectClause], rows: &[Row]) -> Value {
        let shapes: Vec<Vec<String>> = decoders.iter().map(|d| Self::edge_domain_names(d.as_ref())).collect();
        let records: Vec<Value> = rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (i, decoder) in decoders.iter().enumerate() {
                    let coord = row.coordinates[i];
                    let name = coord.and_then(|c| shapes[i].get(c)).cloned();
                    obj.insert(decoder.edge().name, name.map(Value::String).unwrap_or(Value::Null));
                }
                for (name, value) in &row.values {
                    obj.insert(name.clone(), value.clone());
                }
                Value::Object(obj)
            })
            .collect();

        // A non-grouped aggregation has exactly one implicit row: return
        // it as a bare scalar record rather than a one-element list.
        if decoders.is_empty() && records.len() == 1 {
            records.into_iter().next().unwrap()
        } else {
            Value::Array(records)
        }
    }
}

fn flat_index(coords: &[Option<usize>], dims: &[usize]) -> Option<usize> {
    let mut index = 0usize;
    for (coord, dim) in coords.iter().zip(dims.iter()) {
        let c = (*coord)?;
        if c >= *dim {
            return None;
        }
        index = index * dim + c;
    }
    Some(index)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoders::DefaultDecoder;
    use crate::expr::Expr;
    use crate::query::{AggKind, Edge};

    fn decoder_with_domain(names: &[&str]) -> Box<dyn Decoder> {
        let mut d = DefaultDecoder::new(Edge::new("status", Expr::var("status")), "status".to_string());
        for n in names {
            d.count(&[json!({"key": n})]);
        }
        d.done_count();
        Box::new(d)
    }

    #[test]
    fn table_format_emits_header_and_rows() {
        let decoders = vec![decoder_with_domain(&["b", "c"])];
        let selects = vec![SelectClause { name: "count".to_string(), value: Expr::var("."), aggregate: AggKind::Count, percentile: None, limit: None }];
        let rows = vec![
            Row { coordinates: vec![Some(0)], values: vec![("count".to_string(), json!(2))] },
            Row { coordinates: vec![Some(1)], values: vec![("count".to_string(), json!(3))] },
        ];
        let out = Formatter::format(Format::Table, &decoders, &selects, &rows);
        assert_eq!(out["header"], json!(["status", "count"]));
        assert_eq!(out["data"][0], json!(["b", 2]));
        assert_eq!(out["data"][1], json!(["c", 3]));
    }

    #[test]
    fn list_format_collapses_single_scalar_row() {
        let selects = vec![SelectClause { name: "count".to_string(), value: Expr::var("."), aggregate: AggKind::Count, percentile: None, limit: None }];
        let rows = vec![Row { coordinates: vec![], values: vec![("count".to_string(), json!(5))] }];
        let out = Formatter::format(Format::List, &[], &selects, &rows);
        assert_eq!(out, json!({"count": 5}));
    }
}

//! Plain-text value lists
//!
//! Column weights and vertex areas are whitespace-separated floats. Surface
//! ROIs are one line per vertex with one column per map, optionally preceded
//! by a `#` line naming the maps.

use std::path::Path;

use crate::correlation::roi::SurfaceRoi;
use crate::error::{CiftiError, Result};

fn parse_value(token: &str, line: usize) -> Result<f32> {
    token
        .parse::<f32>()
        .map_err(|e| CiftiError::Format(format!("line {}: cannot parse '{}': {}", line, token, e)))
}

/// All whitespace-separated floats in `text`, in order.
pub fn parse_float_list(text: &str) -> Result<Vec<f32>> {
    let mut values = Vec::new();
    for (n, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            values.push(parse_value(token, n + 1)?);
        }
    }
    Ok(values)
}

pub fn read_float_list(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    parse_float_list(&std::fs::read_to_string(path)?)
}

/// One vertex per line, one map per column.
pub fn parse_surface_roi(text: &str) -> Result<SurfaceRoi> {
    let mut names: Option<Vec<String>> = None;
    let mut maps: Vec<Vec<f32>> = Vec::new();

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            if names.is_none() && maps.is_empty() {
                names = Some(header.split_whitespace().map(str::to_string).collect());
            }
            continue;
        }
        let values = line
            .split_whitespace()
            .map(|token| parse_value(token, n + 1))
            .collect::<Result<Vec<f32>>>()?;
        if maps.is_empty() {
            maps = vec![Vec::new(); values.len()];
        } else if values.len() != maps.len() {
            return Err(CiftiError::Format(format!(
                "line {}: expected {} columns, found {}",
                n + 1,
                maps.len(),
                values.len()
            )));
        }
        for (map, value) in maps.iter_mut().zip(values) {
            map.push(value);
        }
    }

    if maps.is_empty() {
        return Err(CiftiError::Format("surface roi contains no values".to_string()));
    }
    let names = match names {
        Some(names) if names.len() == maps.len() => names,
        Some(names) => {
            return Err(CiftiError::MapCountMismatch(format!(
                "{} map names for {} columns",
                names.len(),
                maps.len()
            )))
        }
        None => vec![String::new(); maps.len()],
    };
    SurfaceRoi::with_maps(maps, names)
}

pub fn read_surface_roi(path: impl AsRef<Path>) -> Result<SurfaceRoi> {
    parse_surface_roi(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_list() {
        let values = parse_float_list("1 2.5\n-3e-1\n\n  4 ").unwrap();
        assert_eq!(values, vec![1.0, 2.5, -0.3, 4.0]);
        assert!(matches!(parse_float_list("1 x"), Err(CiftiError::Format(_))));
    }

    #[test]
    fn test_single_column_roi() {
        let roi = parse_surface_roi("0\n1\n0.5\n").unwrap();
        assert_eq!(roi.num_nodes(), 3);
        assert_eq!(roi.num_maps(), 1);
        assert_eq!(roi.values(0), &[0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_named_multi_column_roi() {
        let roi = parse_surface_roi("# motor visual\n1 0\n0 1\n").unwrap();
        assert_eq!(roi.num_maps(), 2);
        assert_eq!(roi.map_names(), &["motor".to_string(), "visual".to_string()]);
        assert_eq!(roi.values(1), &[0.0, 1.0]);
    }

    #[test]
    fn test_ragged_roi_rejected() {
        assert!(parse_surface_roi("1 0\n1\n").is_err());
        assert!(parse_surface_roi("# a b c\n1 0\n").is_err());
        assert!(parse_surface_roi("\n\n").is_err());
    }
}

//! The `key = value` evaluation results file.

use super::metrics::{MetricMap, MetricValue};
use crate::error::{DdpError, Result};
use std::path::Path;

const PREFIX: &str = "eval_results_";
const SUFFIX: &str = ".txt";

/// `eval_results_<pass>.txt`
pub fn results_file_name(pass_id: &str) -> String {
    format!("{PREFIX}{pass_id}{SUFFIX}")
}

/// The pass identifier encoded in a results file name, if it is one.
pub fn pass_id_from_file_name(name: &str) -> Option<&str> {
    name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)
}

/// Renders one line per metric, keys ascending.
pub fn render_results(metrics: &MetricMap) -> String {
    metrics
        .iter()
        .map(|(key, value)| format!("{key} = {value}\n"))
        .collect()
}

pub fn write_results(path: &Path, metrics: &MetricMap) -> Result<()> {
    std::fs::write(path, render_results(metrics))
        .map_err(|e| DdpError::io(format!("writing eval results {}", path.display()), e))
}

/// Parses results text. Lines without `=` are skipped; values that parse as a
/// float become [`MetricValue::Float`], anything else stays text.
pub fn parse_results(text: &str) -> MetricMap {
    let mut metrics = MetricMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(" = ").or_else(|| line.split_once('=')) else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        let value = match value.parse::<f64>() {
            Ok(v) => MetricValue::Float(v),
            Err(_) => MetricValue::Text(value.to_string()),
        };
        metrics.insert(key.to_string(), value);
    }
    metrics
}

pub fn read_results(path: &Path) -> Result<MetricMap> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DdpError::io(format!("reading eval results {}", path.display()), e))?;
    Ok(parse_results(&text))
}

//! Evaluation metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a task's predictions are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Argmax over one score per class.
    Classification,
    /// A single real-valued prediction.
    Regression,
}

/// Which metrics a task reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSet {
    /// `acc`
    Accuracy,
    /// `acc`, `f1`, `acc_and_f1`
    AccuracyAndF1,
    /// `mcc`
    Matthews,
    /// `pearson`, `spearmanr`, `corr`
    PearsonSpearman,
}

/// One reported value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }
}

/// Floats use the shortest representation that parses back to the same bits.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Float(v) => write!(f, "{v:?}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

pub type MetricMap = BTreeMap<String, MetricValue>;

/// Computes `set` for predictions against labels of equal length.
pub fn compute_metrics(set: MetricSet, preds: &[f64], labels: &[f64]) -> MetricMap {
    let mut out = MetricMap::new();
    match set {
        MetricSet::Accuracy => {
            out.insert("acc".into(), accuracy(preds, labels).into());
        }
        MetricSet::AccuracyAndF1 => {
            let acc = accuracy(preds, labels);
            let f1 = f1_binary(preds, labels);
            out.insert("acc".into(), acc.into());
            out.insert("f1".into(), f1.into());
            out.insert("acc_and_f1".into(), ((acc + f1) / 2.0).into());
        }
        MetricSet::Matthews => {
            out.insert("mcc".into(), matthews_corrcoef(preds, labels).into());
        }
        MetricSet::PearsonSpearman => {
            let pearson = pearson(preds, labels);
            let spearman = spearman(preds, labels);
            out.insert("pearson".into(), pearson.into());
            out.insert("spearmanr".into(), spearman.into());
            out.insert("corr".into(), ((pearson + spearman) / 2.0).into());
        }
    }
    out
}

/// Fraction of exact matches; 0 for empty input.
pub fn accuracy(preds: &[f64], labels: &[f64]) -> f64 {
    if preds.is_empty() {
        return 0.0;
    }
    let hits = preds.iter().zip(labels).filter(|(p, l)| p == l).count();
    hits as f64 / preds.len() as f64
}

struct Confusion {
    tp: f64,
    tn: f64,
    fp: f64,
    fn_: f64,
}

fn confusion(preds: &[f64], labels: &[f64]) -> Confusion {
    let mut c = Confusion {
        tp: 0.0,
        tn: 0.0,
        fp: 0.0,
        fn_: 0.0,
    };
    for (&p, &l) in preds.iter().zip(labels) {
        match (p == 1.0, l == 1.0) {
            (true, true) => c.tp += 1.0,
            (false, false) => c.tn += 1.0,
            (true, false) => c.fp += 1.0,
            (false, true) => c.fn_ += 1.0,
        }
    }
    c
}

/// F1 of the positive class (label 1). 0 when it is never predicted nor present.
pub fn f1_binary(preds: &[f64], labels: &[f64]) -> f64 {
    let c = confusion(preds, labels);
    let denom = 2.0 * c.tp + c.fp + c.fn_;
    if denom == 0.0 { 0.0 } else { 2.0 * c.tp / denom }
}

/// Matthews correlation coefficient of a binary prediction; 0 when undefined.
pub fn matthews_corrcoef(preds: &[f64], labels: &[f64]) -> f64 {
    let c = confusion(preds, labels);
    let denom = ((c.tp + c.fp) * (c.tp + c.fn_) * (c.tn + c.fp) * (c.tn + c.fn_)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (c.tp * c.tn - c.fp * c.fn_) / denom
    }
}

/// Pearson correlation; NaN when either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    let mx = xs[..n].iter().sum::<f64>() / n as f64;
    let my = ys[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    sxy / (sxx * syy).sqrt()
}

/// Spearman rank correlation, ties receiving their average rank.
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    pearson(&ranks(xs), &ranks(ys))
}

fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group i..=j
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_and_f1() {
        let preds = [1.0, 0.0, 1.0, 1.0];
        let labels = [1.0, 0.0, 0.0, 1.0];
        let m = compute_metrics(MetricSet::AccuracyAndF1, &preds, &labels);
        assert_eq!(m["acc"], MetricValue::Float(0.75));
        // tp = 2, fp = 1, fn = 0
        assert_eq!(m["f1"], MetricValue::Float(0.8));
        let combined = m["acc_and_f1"].as_f64().unwrap();
        assert!((combined - 0.775).abs() < 1e-12);
    }

    #[test]
    fn test_matthews() {
        assert_eq!(matthews_corrcoef(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(matthews_corrcoef(&[1.0, 0.0], &[0.0, 1.0]), -1.0);
        assert_eq!(matthews_corrcoef(&[1.0, 1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_correlations() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-12);
        // monotone but non-linear
        let cubes = [1.0, 8.0, 27.0, 64.0];
        assert!((spearman(&xs, &cubes) - 1.0).abs() < 1e-12);
        assert!(pearson(&xs, &[1.0; 4]).is_nan());

        let m = compute_metrics(MetricSet::PearsonSpearman, &xs, &ys);
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["corr", "pearson", "spearmanr"]);
    }

    #[test]
    fn test_ranks_average_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_display_is_lossless() {
        let v = MetricValue::Float(0.1 + 0.2);
        let text = v.to_string();
        assert_eq!(text.parse::<f64>().unwrap(), 0.1 + 0.2);
        assert_eq!(MetricValue::Float(1.0).to_string(), "1.0");
        assert_eq!(MetricValue::from("mnli").to_string(), "mnli");
    }
}

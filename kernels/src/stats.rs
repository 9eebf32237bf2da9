//! Summary statistics over one metric column.

/// Mean, population standard deviation and spread of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divides by `count`, not `count - 1`).
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// `max - min`, i.e. the largest pairwise difference in the sample.
    pub fn max_diff(&self) -> f64 {
        self.max - self.min
    }
}

/// Summarizes `values`, returning `None` for an empty slice.
///
/// NaN inputs propagate into `mean`, `std` and the spread.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    let mut min = values[0];
    let mut max = values[0];
    for &v in &values[1..] {
        if v.is_nan() || min.is_nan() {
            min = f64::NAN;
            max = f64::NAN;
            continue;
        }
        min = min.min(v);
        max = max.max(v);
    }
    if values[0].is_nan() {
        min = f64::NAN;
        max = f64::NAN;
    }

    Some(Summary {
        count,
        mean,
        std: var.sqrt(),
        min,
        max,
    })
}

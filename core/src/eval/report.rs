use super::verifier::{Verdict, render_value};
use std::fmt;
use std::path::PathBuf;

/// All verdicts of one pass identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PassComparison {
    pub pass_id: String,
    /// Ranks that produced a results file for this pass.
    pub ranks: Vec<usize>,
    /// Discovered ranks without a results file for this pass.
    pub absent_ranks: Vec<usize>,
    /// Sorted by metric key.
    pub verdicts: Vec<Verdict>,
}

impl PassComparison {
    pub fn verdict(&self, key: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.key == key)
    }
}

/// What a verification run found. Rendered for humans via `Display`.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    NoRankDirectories {
        root: PathBuf,
    },
    NoResultFiles {
        root: PathBuf,
    },
    Compared {
        root: PathBuf,
        ranks: Vec<usize>,
        passes: Vec<PassComparison>,
    },
}

impl Report {
    pub fn passes(&self) -> &[PassComparison] {
        match self {
            Report::Compared { passes, .. } => passes,
            _ => &[],
        }
    }

    pub fn pass(&self, pass_id: &str) -> Option<&PassComparison> {
        self.passes().iter().find(|p| p.pass_id == pass_id)
    }

    /// Number of INCONSISTENT verdicts across all passes.
    pub fn inconsistent_count(&self) -> usize {
        self.passes()
            .iter()
            .flat_map(|p| &p.verdicts)
            .filter(|v| v.classification == super::Classification::Inconsistent)
            .count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::NoRankDirectories { root } => {
                writeln!(f, "No rank directories found in {}", root.display())
            }
            Report::NoResultFiles { root } => writeln!(
                f,
                "No evaluation result files found in rank directories under {}",
                root.display()
            ),
            Report::Compared { passes, .. } => {
                for pass in passes {
                    write!(f, "{pass}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PassComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "=== Comparing results for {} ===", self.pass_id)?;
        writeln!(f, "Ranks: {:?}", self.ranks)?;
        if !self.absent_ranks.is_empty() {
            writeln!(f, "Ranks without results: {:?}", self.absent_ranks)?;
        }
        for verdict in &self.verdicts {
            write!(f, "{verdict}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self
            .values
            .iter()
            .map(|(_, v)| render_value(v.as_ref()))
            .collect();
        writeln!(f, "Metric: {}", self.key)?;
        writeln!(f, "  Values across ranks: [{}]", values.join(", "))?;
        if let Some(s) = &self.summary {
            writeln!(
                f,
                "  Mean: {:.6}, Std: {:.6}, Max Diff: {:.6}",
                s.mean,
                s.std,
                s.max_diff()
            )?;
        }
        if self.has_missing {
            writeln!(f, "  Status: {} (missing data)", self.classification)
        } else {
            writeln!(f, "  Status: {}", self.classification)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{DEFAULT_TOLERANCE, MetricValue, compare_metric};

    #[test]
    fn test_render_verdict() {
        let v = compare_metric(
            "acc",
            vec![
                (0, Some(MetricValue::Float(0.5))),
                (1, Some(MetricValue::Float(0.75))),
                (2, None),
            ],
            DEFAULT_TOLERANCE,
        );
        assert_eq!(
            v.to_string(),
            "Metric: acc\n  Values across ranks: [0.5, 0.75, N/A]\n  Mean: 0.625000, Std: 0.125000, Max Diff: 0.250000\n  Status: INCONSISTENT (missing data)\n"
        );
    }

    #[test]
    fn test_render_empty_reports() {
        let r = Report::NoRankDirectories {
            root: PathBuf::from("/runs/x"),
        };
        assert_eq!(r.to_string(), "No rank directories found in /runs/x\n");
        assert!(r.passes().is_empty());
        assert_eq!(r.inconsistent_count(), 0);
    }
}

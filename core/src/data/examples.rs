//! Raw labeled examples stored as tab-separated files.
//!
//! Layout: a header line, then `label<TAB>text_a[<TAB>text_b]` per example.

use crate::error::{DdpError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
}

impl Split {
    /// Tag used in cache file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
        }
    }

    /// Path of the examples file for `task` under `data_dir`.
    ///
    /// MNLI keeps matched and mismatched dev sets in separate files.
    pub fn examples_file(&self, data_dir: &Path, task: &str) -> PathBuf {
        let name = match (self, task) {
            (Split::Dev, "mnli") => "dev_matched.tsv",
            (Split::Dev, "mnli-mm") => "dev_mismatched.tsv",
            (Split::Train, _) => "train.tsv",
            (Split::Dev, _) => "dev.tsv",
        };
        data_dir.join(name)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputExample {
    pub guid: String,
    pub text_a: String,
    pub text_b: Option<String>,
    pub label: String,
}

/// Reads every example of `path`; guids are `<split>-<line index>`.
pub fn load_examples(path: &Path, split: Split) -> Result<Vec<InputExample>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DdpError::io(format!("reading examples {}", path.display()), e))?;

    let mut examples = Vec::new();
    for (i, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split('\t');
        let (Some(label), Some(text_a)) = (cols.next(), cols.next()) else {
            return Err(DdpError::InvalidState(format!(
                "{}:{}: expected label<TAB>text_a[<TAB>text_b]",
                path.display(),
                i + 1
            )));
        };
        examples.push(InputExample {
            guid: format!("{split}-{i}"),
            text_a: text_a.to_string(),
            text_b: cols.next().map(str::to_string),
            label: label.to_string(),
        });
    }
    Ok(examples)
}

pub fn write_examples(path: &Path, examples: &[InputExample]) -> Result<()> {
    let mut out = String::from("label\ttext_a\ttext_b\n");
    for ex in examples {
        out.push_str(&ex.label);
        out.push('\t');
        out.push_str(&ex.text_a);
        if let Some(b) = &ex.text_b {
            out.push('\t');
            out.push_str(b);
        }
        out.push('\n');
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DdpError::io(format!("creating {}", parent.display()), e))?;
    }
    std::fs::write(path, out).map_err(|e| DdpError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_examples_file_names() {
        let dir = Path::new("/glue/MNLI");
        assert_eq!(Split::Dev.examples_file(dir, "mnli-mm"), dir.join("dev_mismatched.tsv"));
        assert_eq!(Split::Dev.examples_file(dir, "rte"), dir.join("dev.tsv"));
        assert_eq!(Split::Train.examples_file(dir, "mnli"), dir.join("train.tsv"));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("train.tsv");
        let examples = vec![
            InputExample {
                guid: "train-1".into(),
                text_a: "a cat sat".into(),
                text_b: Some("a cat".into()),
                label: "entailment".into(),
            },
            InputExample {
                guid: "train-2".into(),
                text_a: "dogs bark".into(),
                text_b: None,
                label: "not_entailment".into(),
            },
        ];
        write_examples(&path, &examples).unwrap();
        assert_eq!(load_examples(&path, Split::Train).unwrap(), examples);
    }

    #[test]
    fn test_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.tsv");
        std::fs::write(&path, "label\ttext_a\nonly-one-column\n").unwrap();
        assert!(load_examples(&path, Split::Dev).is_err());
    }
}

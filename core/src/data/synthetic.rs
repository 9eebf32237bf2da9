//! Seeded toy examples for smoke runs and tests.
//!
//! Each classification example carries a cue word for its label among random
//! filler, so a linear head over hashed features can learn the task. For
//! regression the target is the share of "good" filler words scaled to 0..5.

use super::examples::{InputExample, Split, write_examples};
use super::tasks::TaskSpec;
use crate::error::Result;
use crate::eval::OutputMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const FILLER: &[&str] = &[
    "the", "a", "river", "stone", "quiet", "market", "later", "under", "blue", "train", "paper",
    "window", "seven", "across", "warm", "field",
];
const GOOD: &[&str] = &["bright", "kind", "calm", "clear"];

const WORDS_PER_TEXT: usize = 8;

pub fn generate(task: &TaskSpec, count: usize, split: Split, seed: u64) -> Vec<InputExample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let (label, cue) = match task.output_mode {
                OutputMode::Classification => {
                    let class = rng.random_range(0..task.labels.len().max(1));
                    let label = task.labels.get(class).copied().unwrap_or("0");
                    (label.to_string(), Some(format!("cue{class}")))
                }
                OutputMode::Regression => (String::new(), None),
            };

            let mut good = 0usize;
            let mut words: Vec<String> = (0..WORDS_PER_TEXT)
                .map(|_| {
                    if task.output_mode == OutputMode::Regression && rng.random_bool(0.5) {
                        good += 1;
                        GOOD[rng.random_range(0..GOOD.len())].to_string()
                    } else {
                        FILLER[rng.random_range(0..FILLER.len())].to_string()
                    }
                })
                .collect();
            if let Some(cue) = cue {
                let at = rng.random_range(0..=words.len());
                words.insert(at, cue);
            }

            let label = if task.output_mode == OutputMode::Regression {
                format!("{:.3}", 5.0 * good as f64 / WORDS_PER_TEXT as f64)
            } else {
                label
            };

            let text_b: Vec<&str> = (0..WORDS_PER_TEXT / 2)
                .map(|_| FILLER[rng.random_range(0..FILLER.len())])
                .collect();

            InputExample {
                guid: format!("{split}-{i}"),
                text_a: words.join(" "),
                text_b: Some(text_b.join(" ")),
                label,
            }
        })
        .collect()
}

/// Writes a train file and the dev file(s) of `task` under `data_dir`.
pub fn write_task_files(
    data_dir: &Path,
    task: &TaskSpec,
    train_count: usize,
    dev_count: usize,
    seed: u64,
) -> Result<()> {
    let train = generate(task, train_count, Split::Train, seed);
    write_examples(&Split::Train.examples_file(data_dir, task.name), &train)?;

    let dev = generate(task, dev_count, Split::Dev, seed.wrapping_add(1));
    write_examples(&Split::Dev.examples_file(data_dir, task.name), &dev)?;
    if task.name == "mnli" {
        let mismatched = generate(task, dev_count, Split::Dev, seed.wrapping_add(2));
        write_examples(&Split::Dev.examples_file(data_dir, "mnli-mm"), &mismatched)?;
    }
    Ok(())
}

//! Label sets describing classifier outputs.

use std::fs;
use std::path::Path;

/// An ordered, immutable list of label names.
///
/// Entry `i` names the classifier's output `i`, so the order of a label set must exactly
/// match the label order the model was trained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Box<[String]>,
}

impl LabelSet {
    /// Loads a label set from a file.
    ///
    /// The labels are the comma-separated values of the file's first line; anything after
    /// that line is ignored. A missing or unreadable file is an error, an empty file
    /// yields an empty label set.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(contents.lines().next().unwrap_or("")))
    }

    /// Parses a single comma-separated line of label names.
    ///
    /// Empty values are skipped; surrounding whitespace is kept as part of the label.
    pub fn parse(line: &str) -> Self {
        let labels = line
            .split(',')
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        Self { labels }
    }

    /// Returns the number of labels in the set.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the label at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Iterates over the labels in model output order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.labels.iter().map(String::as_str)
    }
}

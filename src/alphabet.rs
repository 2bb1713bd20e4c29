use std::collections::HashMap;

use crate::error::{HmmError, Result};

/// Ordered set of distinct labels; position is the canonical index.
///
/// Used both for hidden states and for observable symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl Alphabet {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        if labels.is_empty() {
            return Err(HmmError::InvalidInput("alphabet must contain at least one label".into()));
        }

        let labels: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
        let mut index = HashMap::with_capacity(labels.len());

        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(HmmError::InvalidInput(format!("duplicate label {label:?}")));
            }
        }

        Ok(Self { labels, index })
    }

    /// Labels "S0", "S1", ... for tables built without names.
    pub fn numbered(prefix: &str, n: usize) -> Result<Self> {
        let labels: Vec<String> = (0..n).map(|i| format!("{prefix}{i}")).collect();
        Self::new(&labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| HmmError::UnknownSymbol(label.to_string()))
    }

    /// Maps a label sequence onto indices, failing on the first unknown label.
    pub fn encode<S: AsRef<str>>(&self, sequence: &[S]) -> Result<Vec<usize>> {
        sequence.iter().map(|s| self.index_of(s.as_ref())).collect()
    }
}

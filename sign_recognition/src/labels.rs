use crate::config::{LabelSetKind, LabelsConfig};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
const LETTERS: [&str; 26] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z",
];
const MULTI_LETTER_SIGNS: [&str; 3] = ["CH", "ENYE", "NG"];

/// Ordered class identifiers; index `i` names classifier output `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Digits followed by the 26 latin letters.
    pub fn standard() -> Self {
        let labels = DIGITS
            .iter()
            .chain(LETTERS.iter())
            .map(|s| s.to_string())
            .collect();
        Self { labels }
    }

    /// The standard set plus the multi-letter signs `CH`, `ENYE` and `NG`.
    pub fn extended() -> Self {
        let mut set = Self::standard();
        set.labels
            .extend(MULTI_LETTER_SIGNS.iter().map(|s| s.to_string()));
        set
    }

    pub fn from_config(config: &LabelsConfig) -> io::Result<Self> {
        match (config.set, &config.labels_file) {
            (LabelSetKind::Standard, _) => Ok(Self::standard()),
            (LabelSetKind::Extended, _) => Ok(Self::extended()),
            (LabelSetKind::File, Some(path)) => load_labels(path),
            (LabelSetKind::File, None) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "label file required for the `file` label set",
            )),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Reads one label per line; blank lines are skipped.
pub fn load_labels(filepath: &Path) -> io::Result<LabelSet> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if label.is_empty() {
            continue;
        }
        if label.contains(',') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid label line: {}", line),
            ));
        }
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No labels found in {}", filepath.display()),
        ));
    }

    Ok(LabelSet { labels })
}

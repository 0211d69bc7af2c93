//! Local filename disambiguation

use crate::utils::suffixed_filename;
use std::collections::{HashMap, HashSet};

/// Assigns each scheduled attachment a unique local filename
///
/// The first occurrence of a name keeps it; the Nth duplicate (N > 0) becomes
/// `stem (N).ext`. Names that would clash with an already assigned name keep
/// counting upward.
#[derive(Debug, Default)]
pub struct FilenameRegistry {
    occurrences: HashMap<String, u32>,
    assigned: HashSet<String>,
}

impl FilenameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a local name for `original`
    pub fn assign(&mut self, original: &str) -> String {
        let original = sanitize_filename(original);
        let count = self.occurrences.entry(original.clone()).or_insert(0);

        let mut candidate = if *count == 0 {
            original.clone()
        } else {
            suffixed_filename(&original, *count)
        };
        while self.assigned.contains(&candidate) {
            *count += 1;
            candidate = suffixed_filename(&original, *count);
        }
        *count += 1;

        self.assigned.insert(candidate.clone());
        candidate
    }
}

/// Strip path separators and control characters so the name stays inside the archive folder
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

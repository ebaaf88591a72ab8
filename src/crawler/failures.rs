use std::collections::BTreeSet;

/// Codes that failed during a sweep, kept unique and sorted.
///
/// Both search codes (whose search failed outright) and subject codes (one of
/// whose sections could not be saved) end up here; re-searching either one
/// retries the affected sections.
#[derive(Debug, Clone, Default)]
pub struct FailureRegistry {
    codes: BTreeSet<String>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the code was not already registered.
    pub fn record(&mut self, code: &str) -> bool {
        self.codes.insert(code.to_owned())
    }

    /// Snapshot the registered codes and clear the registry.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.codes).into_iter().collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

//! Flow state

/// The two strings the flow carries between steps.
///
/// `code` is overwritten on every generation and every review; no history is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeState {
    pub requirement: String,
    pub code: String,
}

impl CodeState {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            code: String::new(),
        }
    }

    pub fn has_code(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationData {
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    pub email: String,
    pub password: String,
}

/// Ordered list of human-readable problems found while checking a submission.
///
/// Serialized as a bare JSON array, e.g. `["email already exist"]`, which is
/// what the front-end renders under the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport(Vec<String>);

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` when `failed` holds.
    pub fn check(&mut self, message: &str, failed: bool) {
        if failed {
            self.0.push(message.to_string());
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

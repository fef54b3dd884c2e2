use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Identifier of a stored resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let trimmed = id.trim();

        if trimmed.is_empty() {
            return Err(DomainError::validation("Resource ID cannot be empty"));
        }

        if trimmed.len() > 64 {
            return Err(DomainError::validation(
                "Resource ID cannot exceed 64 characters",
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

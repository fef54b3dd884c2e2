//! Accumulated results of completed workflow steps

use serde::Serialize;

const EMPTY_CONTEXT_MARKER: &str = "None";

/// Append-only log of step results, in completion order.
///
/// Later steps read it as their input; nothing is ever removed or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepContext {
    entries: Vec<String>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, result: impl Into<String>) {
        self.entries.push(result.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prompt rendering of the context, or a literal marker when empty
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return EMPTY_CONTEXT_MARKER.to_string();
        }

        self.entries.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_renders_marker() {
        let context = StepContext::new();
        assert!(context.is_empty());
        assert_eq!(context.render(), "None");
    }

    #[test]
    fn test_append_preserves_order() {
        let mut context = StepContext::new();
        context.append("assets: house, car");
        context.append("beneficiaries: two children");

        assert_eq!(context.len(), 2);
        assert_eq!(context.entries()[0], "assets: house, car");
        assert_eq!(
            context.render(),
            "assets: house, car\n\nbeneficiaries: two children"
        );
    }
}

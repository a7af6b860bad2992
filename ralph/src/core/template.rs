//! Placeholder substitution for user-supplied prompt templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(task|prd|progress|requirements|workspace)\}\}")
        .expect("placeholder pattern should compile")
});

/// Values for the five template placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    pub task: String,
    pub prd: String,
    pub progress: String,
    pub requirements: String,
    pub workspace: String,
}

impl TemplateVariables {
    fn get(&self, name: &str) -> &str {
        match name {
            "task" => &self.task,
            "prd" => &self.prd,
            "progress" => &self.progress,
            "requirements" => &self.requirements,
            "workspace" => &self.workspace,
            _ => "",
        }
    }
}

/// Replace every `{{task}}`, `{{prd}}`, `{{progress}}`, `{{requirements}}`,
/// and `{{workspace}}` token in `template`.
///
/// Substitution is a single pass: inserted values are never rescanned, so a
/// value containing `$1` or `{{prd}}` lands in the output verbatim.
pub fn apply_custom_template(template: &str, variables: &TemplateVariables) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            variables.get(&caps[1]).to_string()
        })
        .into_owned()
}

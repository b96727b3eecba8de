//! Placeholder substitution for user prompt templates.
//!
//! Substitution is a single left-to-right pass over the template. Each
//! `{name}` whose name is a known [`Placeholder`] with a supplied value is
//! replaced by that value; anything else, including known placeholders
//! without a value, is copied verbatim. Values are never rescanned, so a
//! file that itself contains `{tree_structure}` is passed through literally.

use std::fmt;

/// Placeholder names recognised in user prompt templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// File text (stage 1) or concatenated per-file artifacts (stage 2).
    Content,
    /// The rendered project tree.
    TreeStructure,
    /// The project-relative path of the file (stage 1 only).
    RelativePath,
}

impl Placeholder {
    /// All placeholders, in documentation order.
    pub const ALL: [Self; 3] = [Self::Content, Self::TreeStructure, Self::RelativePath];

    /// Returns the name written between braces.
    pub fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::TreeStructure => "tree_structure",
            Self::RelativePath => "relative_path",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// A user prompt template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Wraps raw template text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the raw template text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitutes `values` into the template.
    pub fn render(&self, values: &[(Placeholder, &str)]) -> String {
        let lookup = |name: &str| {
            let placeholder = Placeholder::from_name(name)?;
            values
                .iter()
                .find(|(p, _)| *p == placeholder)
                .map(|(_, value)| *value)
        };

        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replacement = after
                .find('}')
                .and_then(|close| lookup(&after[..close]).map(|value| (close, value)));
            match replacement {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

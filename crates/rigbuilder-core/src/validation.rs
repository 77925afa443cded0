//! # Validation
//!
//! An optional, read-only report over a subtree. Structural edits never
//! reject bad names or duplicates; callers that care run [`validate`].

use crate::tree::ModuleTree;
use crate::types::{AttrRef, ModuleId, RigError};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

static WORD_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\w+$"));

/// One finding of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// Module name is empty or has non-word characters.
    InvalidModuleName { module: String, name: String },
    /// Attribute name is empty or has non-word characters.
    InvalidAttributeName { module: String, name: String },
    /// Two children of one module share a name; path lookup sees the first.
    DuplicateChild { module: String, name: String },
    /// Two attributes of one module share a name; lookup sees the first.
    DuplicateAttribute { module: String, name: String },
    /// A connection cannot be walked.
    BrokenConnection {
        module: String,
        attribute: String,
        reason: String,
    },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidModuleName { module, name } => {
                write!(f, "{}: invalid module name '{}'", module, name)
            }
            Self::InvalidAttributeName { module, name } => {
                write!(f, "{}: invalid attribute name '{}'", module, name)
            }
            Self::DuplicateChild { module, name } => {
                write!(f, "{}: duplicate child '{}'", module, name)
            }
            Self::DuplicateAttribute { module, name } => {
                write!(f, "{}: duplicate attribute '{}'", module, name)
            }
            Self::BrokenConnection {
                module,
                attribute,
                reason,
            } => write!(f, "{}: attribute '{}': {}", module, attribute, reason),
        }
    }
}

/// Whether `name` is made of word characters only.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    WORD_NAME
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Check `id` and its descendants.
pub fn validate(tree: &ModuleTree, id: ModuleId) -> Result<Vec<Issue>, RigError> {
    let mut issues = Vec::new();
    for m in tree.descendants(id)? {
        let module = tree.module(m)?;
        let path = tree.path(m)?;

        if !is_valid_name(module.name()) {
            issues.push(Issue::InvalidModuleName {
                module: path.clone(),
                name: module.name().to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for child in module.children() {
            let name = tree.module(*child)?.name();
            if !seen.insert(name) {
                issues.push(Issue::DuplicateChild {
                    module: path.clone(),
                    name: name.to_string(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for (index, attribute) in module.attributes().iter().enumerate() {
            if !is_valid_name(attribute.name()) {
                issues.push(Issue::InvalidAttributeName {
                    module: path.clone(),
                    name: attribute.name().to_string(),
                });
            }
            if !seen.insert(attribute.name()) {
                issues.push(Issue::DuplicateAttribute {
                    module: path.clone(),
                    name: attribute.name().to_string(),
                });
            }
            if let Err(e) = tree.find_connection_source(AttrRef::new(m, index)) {
                issues.push(Issue::BrokenConnection {
                    module: path.clone(),
                    attribute: attribute.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(issues)
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::envvar::starts_with_env_token;

/// One entry in the ordered search path list.
///
/// `path_var` is the configured form and may contain `${NAME}` / `$(NAME)`
/// references; `path_expanded` is its expanded, canonical form, or empty
/// when the directory does not currently exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPathEntry {
    /// Short name used in `:ALIAS:` references, or an `${NAME}` token for
    /// entries seeded from the environment.
    pub alias: String,

    /// Directory as configured, before expansion.
    pub path_var: String,

    /// Expanded absolute directory, empty when unavailable.
    pub path_expanded: String,

    /// Free-form description shown to the user.
    pub description: String,
}

impl SearchPathEntry {
    pub fn new(
        alias: impl Into<String>,
        path_var: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            path_var: path_var.into(),
            path_expanded: String::new(),
            description: description.into(),
        }
    }

    /// Entries whose alias is an environment variable token are managed by
    /// the resolver itself and are not persisted to the configuration file.
    pub fn is_env_backed(&self) -> bool {
        starts_with_env_token(&self.alias)
    }
}

/// Classification of a model file reference, decided from the original
/// input string before any expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Starts with an `${NAME}` / `$(NAME)` reference.
    EnvVar,

    /// Starts with a `:ALIAS:` prefix.
    Aliased,

    /// Absolute platform path.
    Absolute,

    /// Anything else; resolved against the search path list.
    Relative,
}

impl PathKind {
    pub fn of(name: &str) -> Self {
        if starts_with_env_token(name) {
            PathKind::EnvVar
        } else if name.starts_with(':') {
            PathKind::Aliased
        } else if Path::new(name).is_absolute() {
            PathKind::Absolute
        } else {
            PathKind::Relative
        }
    }
}

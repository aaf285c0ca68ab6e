use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::LEGACY_MODELS_VAR;

/// Matches `${NAME}` and `$(NAME)` references.
static ENV_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}|\$\(([^)]+)\)").expect("env token pattern"));

/// Variables that are known not to hold search path directories and are
/// skipped when seeding the path list.
const EXCLUDED_VARS: &[&str] = &["KIPRJMOD", "KICAD_TEMPLATE_DIR", "KICAD_USER_TEMPLATE_DIR"];

/// Source of locally known environment variables. Lookups must be safe to
/// call from multiple threads.
pub trait EnvProvider: Send + Sync {
    /// Thread-safe lookup of a single variable
    fn get(&self, name: &str) -> Option<String>;

    /// Enumerate the locally known variables, already filtered to the set
    /// that may hold search path directories. [`LEGACY_MODELS_VAR`] is
    /// always included, with an empty value when undefined.
    fn vars(&self) -> Vec<(String, String)>;
}

/// Replace every `${NAME}` / `$(NAME)` reference in `input` with the
/// provider's value for `NAME`. Undefined variables expand to nothing.
pub fn expand_env_tokens(input: &str, env: &dyn EnvProvider) -> String {
    ENV_TOKEN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get(name).unwrap_or_default()
        })
        .into_owned()
}

/// Check whether a string begins with an environment variable reference.
pub(crate) fn starts_with_env_token(s: &str) -> bool {
    s.starts_with("${") || s.starts_with("$(")
}

/// Extract the leading `${NAME}` / `$(NAME)` token of a string, returning
/// the full token text and the variable name.
pub(crate) fn leading_env_token(s: &str) -> Option<(&str, &str)> {
    let close = if s.starts_with("${") {
        '}'
    } else if s.starts_with("$(") {
        ')'
    } else {
        return None;
    };

    let end = s.find(close)?;
    if end <= 2 {
        return None;
    }

    Some((&s[..=end], &s[2..end]))
}

fn finalize_vars(mut vars: BTreeMap<String, String>) -> Vec<(String, String)> {
    vars.retain(|name, value| {
        !EXCLUDED_VARS.contains(&name.as_str()) && !value.contains("://")
    });
    vars.entry(LEGACY_MODELS_VAR.to_string()).or_default();
    vars.into_iter().collect()
}

/// Process-environment provider. The host application configures which
/// variable names are considered path candidates; values are always read
/// from the live process environment.
#[derive(Debug, Clone)]
pub struct SystemEnv {
    known: Vec<String>,
}

impl SystemEnv {
    /// Provider that knows only the legacy system model variable.
    pub fn new() -> Self {
        Self::with_known_vars([LEGACY_MODELS_VAR])
    }

    /// Provider with an explicit set of candidate variable names.
    pub fn with_known_vars<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SystemEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvProvider for SystemEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        let mut vars = BTreeMap::new();

        for name in &self.known {
            if let Ok(value) = std::env::var(name) {
                vars.insert(name.clone(), value);
            }
        }

        finalize_vars(vars)
    }
}

/// Fixed-map provider for tests and hosts that manage their own variable
/// table.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    map: BTreeMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }
}

impl EnvProvider for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.map.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        finalize_vars(self.map.clone())
    }
}

use std::{collections::BTreeMap, env, path::Path};

use thiserror::Error;

const DOTENV_FILE: &str = ".env";

/// Errors raised while loading the process environment.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to load {}: {source}", path.display())]
    Dotenv {
        path: std::path::PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// An immutable snapshot of the environment variables visible to the application.
///
/// The snapshot is taken once at bootstrap, after the optional `.env` file has
/// been applied, and is what the configuration loader and the error boundary read
/// from. Later changes to the process environment are not observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Loads `<root>/.env` into the process environment, then snapshots it.
    ///
    /// A missing `.env` file is not an error. Variables already present in the
    /// process environment win over the ones declared in the file.
    pub fn load(root: &Path) -> Result<Self, EnvironmentError> {
        let path = root.join(DOTENV_FILE);
        match dotenvy::from_path(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "loaded dotenv file"),
            Err(err) if err.not_found() => {
                tracing::debug!(path = %path.display(), "no dotenv file, using process environment")
            }
            Err(source) => return Err(EnvironmentError::Dotenv { path, source }),
        }
        Ok(Self::capture())
    }

    /// Snapshots the current process environment without touching `.env`.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn capture() -> Self {
        env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    let name = match &key {
                        Ok(name) => name.clone(),
                        Err(raw) => raw.to_string_lossy().into_owned(),
                    };
                    tracing::warn!(variable = %name, "skipping non UTF-8 environment variable");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value of `key`, or `default` when unset.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

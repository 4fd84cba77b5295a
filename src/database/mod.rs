//! Database binding.
//!
//! The container binds [`DbInterface`] to [`Db`]. Building a `Db` validates the
//! configured DSN but does not open a connection.

use std::{any::Any, collections::BTreeMap, fmt, str::FromStr};

use thiserror::Error;

use crate::core::configuration::{DatabaseOptions, DatabaseSettings};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("invalid DSN '{dsn}': {reason}")]
    InvalidDsn { dsn: String, reason: &'static str },
}

/// A parsed PDO-style data source name.
///
/// `mysql:host=localhost;port=3306;dbname=app` keeps its `key=value` pairs,
/// `sqlite:/var/db/app.sqlite` keeps the remainder under the `path` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    driver: String,
    params: BTreeMap<String, String>,
    raw: String,
}

impl Dsn {
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Dsn {
    type Err = DatabaseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| DatabaseError::InvalidDsn {
            dsn: raw.to_string(),
            reason,
        };
        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() {
            return Err(invalid("empty"));
        }
        let (driver, rest) = raw_trimmed
            .split_once(':')
            .ok_or_else(|| invalid("missing driver prefix"))?;
        if driver.is_empty() || !driver.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("invalid driver name"));
        }

        let mut params = BTreeMap::new();
        if rest.contains('=') {
            for pair in rest.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("expected key=value pairs"))?;
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
        } else if !rest.is_empty() {
            params.insert("path".to_string(), rest.to_string());
        }

        Ok(Self {
            driver: driver.to_ascii_lowercase(),
            params,
            raw: raw_trimmed.to_string(),
        })
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Database access as seen by the rest of the application.
pub trait DbInterface: Send + Sync + fmt::Debug {
    fn dsn(&self) -> &Dsn;

    fn user(&self) -> &str;

    fn options(&self) -> &DatabaseOptions;

    fn as_any(&self) -> &dyn Any;
}

/// Connection descriptor built from the `database` configuration section.
pub struct Db {
    dsn: Dsn,
    user: String,
    password: String,
    options: DatabaseOptions,
}

impl Db {
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, DatabaseError> {
        Ok(Self {
            dsn: settings.dsn.parse()?,
            user: settings.user.clone(),
            password: settings.password.clone(),
            options: settings.options,
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl DbInterface for Db {
    fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dsn", &self.dsn.as_str())
            .field("user", &self.user)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

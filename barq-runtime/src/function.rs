//! Function records and the runtime tag grammar
//!
//! A `Runtime` is the tag stored alongside a function's code and used to
//! pick which [`crate::runtimes`] adapter drives it. The tag grammar and the
//! image each maps to come from the container contract, not from the
//! language itself — two Python versions are different runtimes because
//! they are different images.

use barq_core::BarqError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse runtime family, used to select a [`crate::runtimes::RuntimeAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFamily {
    Python,
    Node,
    Go,
}

/// A supported runtime tag, e.g. `python3.11` or `nodejs20.x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Runtime {
    Python310,
    Python311,
    Python312,
    Nodejs18,
    Nodejs20,
    Nodejs22,
    Go1,
}

impl Runtime {
    /// Parse a runtime tag as it appears in a function's metadata.
    pub fn parse(s: &str) -> Result<Self, BarqError> {
        match s {
            "python3.10" => Ok(Self::Python310),
            "python3.11" => Ok(Self::Python311),
            "python3.12" => Ok(Self::Python312),
            "nodejs18.x" => Ok(Self::Nodejs18),
            "nodejs20.x" => Ok(Self::Nodejs20),
            "nodejs22.x" => Ok(Self::Nodejs22),
            "go1.x" => Ok(Self::Go1),
            other => Err(BarqError::RuntimeUnsupported(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python310 => "python3.10",
            Self::Python311 => "python3.11",
            Self::Python312 => "python3.12",
            Self::Nodejs18 => "nodejs18.x",
            Self::Nodejs20 => "nodejs20.x",
            Self::Nodejs22 => "nodejs22.x",
            Self::Go1 => "go1.x",
        }
    }

    pub fn family(&self) -> RuntimeFamily {
        match self {
            Self::Python310 | Self::Python311 | Self::Python312 => RuntimeFamily::Python,
            Self::Nodejs18 | Self::Nodejs20 | Self::Nodejs22 => RuntimeFamily::Node,
            Self::Go1 => RuntimeFamily::Go,
        }
    }

    /// Docker image used to run this runtime's container.
    pub fn docker_image(&self) -> &'static str {
        match self {
            Self::Python310 => "python:3.10-slim",
            Self::Python311 => "python:3.11-slim",
            Self::Python312 => "python:3.12-slim",
            Self::Nodejs18 => "node:18-slim",
            Self::Nodejs20 => "node:20-slim",
            Self::Nodejs22 => "node:22-slim",
            Self::Go1 => "golang:1.22",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::Python310,
            Self::Python311,
            Self::Python312,
            Self::Nodejs18,
            Self::Nodejs20,
            Self::Nodejs22,
            Self::Go1,
        ]
    }
}

impl TryFrom<String> for Runtime {
    type Error = BarqError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Runtime> for String {
    fn from(runtime: Runtime) -> Self {
        runtime.as_str().to_string()
    }
}

/// A parsed `module.function` entrypoint.
///
/// Per the handler grammar, the module defaults to `handler` when the
/// caller writes a bare function name with no dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub module: String,
    pub function: String,
}

impl Entrypoint {
    pub fn parse(raw: &str) -> Result<Self, BarqError> {
        if raw.trim().is_empty() {
            return Err(BarqError::InvalidHandler("empty entrypoint".to_string()));
        }
        let (module, function) = match raw.rsplit_once('.') {
            Some((m, f)) if !m.is_empty() && !f.is_empty() => (m.to_string(), f.to_string()),
            Some(_) => return Err(BarqError::InvalidHandler(raw.to_string())),
            None => ("handler".to_string(), raw.to_string()),
        };
        Ok(Self { module, function })
    }
}

/// A registered function: its code location, runtime and invocation handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub func_id: String,
    pub runtime: Runtime,
    pub entrypoint: String,
    pub code_dir: String,
    pub code_hash: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    #[serde(default)]
    pub environment: std::collections::HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        assert_eq!(Runtime::parse("python3.11").unwrap(), Runtime::Python311);
        assert_eq!(Runtime::parse("go1.x").unwrap(), Runtime::Go1);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(Runtime::parse("ruby3.2").is_err());
    }

    #[test]
    fn family_groups_tags_correctly() {
        assert_eq!(Runtime::Nodejs22.family(), RuntimeFamily::Node);
        assert_eq!(Runtime::Python310.family(), RuntimeFamily::Python);
    }

    #[test]
    fn entrypoint_defaults_module_to_handler() {
        let ep = Entrypoint::parse("main").unwrap();
        assert_eq!(ep.module, "handler");
        assert_eq!(ep.function, "main");
    }

    #[test]
    fn entrypoint_splits_on_last_dot() {
        let ep = Entrypoint::parse("pkg.mod.run").unwrap();
        assert_eq!(ep.module, "pkg.mod");
        assert_eq!(ep.function, "run");
    }

    #[test]
    fn entrypoint_rejects_trailing_dot() {
        assert!(Entrypoint::parse("pkg.").is_err());
        assert!(Entrypoint::parse("").is_err());
    }
}

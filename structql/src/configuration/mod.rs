//! Logic for loading configuration in to an object model


use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not parse configuration: {0}
    Parse(serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration for the engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Query execution
    #[serde(default)]
    pub execution: Execution,
}

impl Configuration {
    /// Parses a YAML document. An empty document yields the defaults.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Configuration::default());
        }
        let configuration: Configuration =
            serde_yaml::from_str(raw_yaml).map_err(ConfigurationError::Parse)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Generate a JSON schema for the configuration.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings.into_generator().into_root_schema_for::<Configuration>()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.execution.recursion_limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid execution.recursion_limit",
                error: "must be at least 1".to_string(),
            });
        }
        if self.execution.max_page_size == Some(0) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid execution.max_page_size",
                error: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration options pertaining to query execution.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Execution {
    /// Resolve sibling selections and list items concurrently.
    /// Results keep the order of the query.
    /// default: false
    #[serde(default)]
    pub parallel: bool,

    /// Maximum nesting of a compiled query
    /// default: 512
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// Largest `pageSize` a `paginate` instruction may ask for
    /// default: unlimited
    #[serde(default)]
    pub max_page_size: Option<usize>,
}

fn default_recursion_limit() -> usize {
    512
}

impl Default for Execution {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[buildstructor::buildstructor]
impl Execution {
    #[builder]
    pub fn new(
        parallel: Option<bool>,
        recursion_limit: Option<usize>,
        max_page_size: Option<usize>,
    ) -> Self {
        Self {
            parallel: parallel.unwrap_or_default(),
            recursion_limit: recursion_limit.unwrap_or_else(default_recursion_limit),
            max_page_size,
        }
    }
}

use serde::Deserialize;

/// Query audit log configuration.
///
/// Lives under the `query_logging` key of the root `Config`. Observed
/// queries are always written to the tracing log; this section only
/// controls the additional JSON Lines audit file.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryLoggingConfig {
    /// Master enable/disable switch for the audit file.
    #[serde(default)]
    pub enabled: bool,

    /// Whether to capture SQL query text in audit entries.
    /// When false, only metadata (command type, session, addresses) is recorded.
    #[serde(default = "default_true")]
    pub include_query_text: bool,

    /// Maximum query text length before truncation.
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// File the JSON Lines entries are appended to. Created if missing.
    #[serde(default)]
    pub output_path: Option<String>,
}

impl Default for QueryLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            include_query_text: true,
            max_query_length: default_max_query_length(),
            output_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_query_length() -> usize {
    10_000
}

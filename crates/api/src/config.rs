use std::path::PathBuf;

use renderbox_core::template::RoleOverrides;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via
/// environment variables in production.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `1260`, slightly above
    /// the default dispatch timeout so the dispatcher's deadline fires
    /// first and the caller sees the structured error).
    pub request_timeout_secs: u64,
    /// Path to the workflow template JSON document.
    pub template_path: PathBuf,
    /// Optional directory for best-effort audit copies of materialized
    /// jobs. Disabled when unset.
    pub audit_dir: Option<PathBuf>,
    /// Explicit template node role assignments (`PROMPT_NODE_ID`,
    /// `SAVE_NODE_ID`); discovery by class type when unset.
    pub roles: RoleOverrides,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `1260`                  |
    /// | `TEMPLATE_PATH`        | `workflow_api.json`     |
    /// | `AUDIT_DIR`            | unset (disabled)        |
    /// | `PROMPT_NODE_ID`       | unset (discovered)      |
    /// | `SAVE_NODE_ID`         | unset (discovered)      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1260".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let template_path = std::env::var("TEMPLATE_PATH")
            .unwrap_or_else(|_| "workflow_api.json".into())
            .into();

        let audit_dir = std::env::var("AUDIT_DIR").ok().map(PathBuf::from);

        let roles = RoleOverrides {
            prompt_node: std::env::var("PROMPT_NODE_ID").ok(),
            save_node: std::env::var("SAVE_NODE_ID").ok(),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            template_path,
            audit_dir,
            roles,
        }
    }
}

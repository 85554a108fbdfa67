//! Application configuration for projectmap.
//!
//! Config is looked up at `./projectmap.toml`, then
//! `~/.projectmap/projectmap.toml`. CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProjectMapError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "projectmap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".projectmap";

// ---------------------------------------------------------------------------
// Config structs (matching projectmap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Organization endpoint and credentials.
    #[serde(default)]
    pub organization: OrganizationConfig,

    /// Local working folders.
    #[serde(default)]
    pub paths: PathsConfig,

    /// External diagram compiler.
    #[serde(default)]
    pub render: RenderConfig,

    /// Inventory fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Wiki publication.
    #[serde(default)]
    pub wiki: WikiConfig,
}

/// `[organization]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    /// Organization base URL, e.g. `https://dev.azure.com/Contoso/`.
    #[serde(default)]
    pub url: String,

    /// Display name; derived from the URL when empty.
    #[serde(default)]
    pub name: String,

    /// Username for basic auth (may be empty for PAT-only auth).
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the personal access token (never store the token itself).
    #[serde(default = "default_pat_env")]
    pub pat_env: String,

    /// Skip TLS certificate verification (self-signed on-prem servers).
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: String::new(),
            username: String::new(),
            pat_env: default_pat_env(),
            accept_invalid_certs: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_pat_env() -> String {
    "AZURE_DEVOPS_PAT".into()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where `.wsd` sources and rendered images are written.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Where date-stamped log files are appended.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Diagram header fragment; must exist before a run starts.
    #[serde(default = "default_header_template")]
    pub header_template: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            logs_dir: default_logs_dir(),
            header_template: default_header_template(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_header_template() -> PathBuf {
    PathBuf::from("templates").join("wbsHeader.txt")
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Diagram compiler executable.
    #[serde(default = "default_render_command")]
    pub command: String,

    /// Extra arguments placed before the document path.
    #[serde(default)]
    pub args: Vec<String>,

    /// Upper bound on a single compiler invocation.
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: default_render_command(),
            args: Vec::new(),
            timeout_secs: default_render_timeout(),
        }
    }
}

fn default_render_command() -> String {
    "plantuml".into()
}
fn default_render_timeout() -> u64 {
    300
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum concurrent pipeline-detail requests.
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: u32,

    /// Ask the definition listing to include repository info inline.
    #[serde(default = "default_true")]
    pub expand_repository: bool,

    /// Deadline for the whole multi-project run.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            detail_concurrency: default_detail_concurrency(),
            expand_repository: true,
            run_timeout_secs: default_run_timeout(),
        }
    }
}

fn default_detail_concurrency() -> u32 {
    4
}
fn default_run_timeout() -> u64 {
    3600
}

/// `[wiki]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Page replaced on every run.
    #[serde(default = "default_page_path")]
    pub page_path: String,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            page_path: default_page_path(),
        }
    }
}

fn default_page_path() -> String {
    "Project-Structure".into()
}

// ---------------------------------------------------------------------------
// Platform config (runtime, merged from config + CLI flags + env)
// ---------------------------------------------------------------------------

/// Runtime connection settings for the platform client.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Organization base URL, always ending in `/`.
    pub base_url: Url,
    /// Organization display name.
    pub organization: String,
    pub username: String,
    /// Personal access token, resolved from the environment.
    pub pat: String,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url.as_str())
            .field("organization", &self.organization)
            .field("username", &self.username)
            .field("pat", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl PlatformConfig {
    /// Build from explicit values (used by tests and by [`TryFrom<&AppConfig>`]).
    pub fn new(base_url: &str, username: &str, pat: &str) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let organization = organization_name(&base_url);
        Ok(Self {
            base_url,
            organization,
            username: username.to_string(),
            pat: pat.to_string(),
            accept_invalid_certs: true,
            request_timeout: Duration::from_secs(default_request_timeout()),
        })
    }
}

impl TryFrom<&AppConfig> for PlatformConfig {
    type Error = ProjectMapError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let org = &config.organization;
        let pat = resolve_pat(config)?;
        let mut platform = Self::new(&org.url, &org.username, &pat)?;
        if !org.name.trim().is_empty() {
            platform.organization = org.name.trim().to_string();
        }
        platform.accept_invalid_certs = org.accept_invalid_certs;
        platform.request_timeout = Duration::from_secs(org.request_timeout_secs);
        Ok(platform)
    }
}

/// Parse the organization URL and normalise it to end in `/`.
fn parse_base_url(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(ProjectMapError::config(
            "organization.url is not set (config file, --org-url, or PROJECTMAP_ORG_URL)",
        ));
    }
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ProjectMapError::config(format!("invalid organization url '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Last non-empty path segment of the organization URL, falling back to the host.
fn organization_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the per-user config directory (`~/.projectmap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProjectMapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Path of the config file in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Load the application config. Returns defaults if no file exists.
pub fn load_config() -> Result<AppConfig> {
    let local = default_config_path();
    if local.exists() {
        return load_config_from(&local);
    }

    let user = config_dir()?.join(CONFIG_FILE_NAME);
    if user.exists() {
        return load_config_from(&user);
    }

    tracing::debug!("no config file found, using defaults");
    Ok(AppConfig::default())
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectMapError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ProjectMapError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file at `path` unless one already exists.
/// Returns `true` when a file was written.
pub fn init_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ProjectMapError::io(parent, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ProjectMapError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ProjectMapError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(true)
}

/// Read the personal access token from the env var named in the config.
pub fn resolve_pat(config: &AppConfig) -> Result<String> {
    let var_name = &config.organization.pat_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(ProjectMapError::config(format!(
            "personal access token not found. Set the {var_name} environment variable."
        ))),
    }
}

//! Layered dashboard configuration.
//!
//! Values are read from `.char3/dashboard.toml` (optional, falling back to
//! the per-user config directory), then overridden
//! by environment variables (a `.env` file is loaded first), then by CLI
//! flags.
//!
//! ```toml
//! [trello]
//! api_key = "..."
//! base_url = "https://api.trello.com/1"
//! token = "..."
//!
//! [boards]
//! account_management = "..."
//! design_ux = "..."
//! development = "..."
//!
//! [lists]
//! deliverables = "📦 Deliverables"
//! admin_tasks = "👥 Account Tasks"
//!
//! [cache]
//! ttl_secs = 300
//! poll_interval_secs = 30
//!
//! [calendar]
//! utc_offset_minutes = 0
//!
//! [server]
//! port = 3141
//! db_path = ".char3/dashboard.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::cache::BoardIds;
use crate::board::client::DEFAULT_BASE_URL;
use crate::board::dates::offset_from_minutes;
use crate::board::views::ListRoles;

pub const CONFIG_DIR: &str = ".char3";
pub const CONFIG_FILE: &str = "dashboard.toml";
pub const DEFAULT_PORT: u16 = 3141;

const REDACTED: &str = "********";

// ── File sections ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrelloSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Token used by the background poller before anyone logs in.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for TrelloSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardsSection {
    #[serde(default)]
    pub account_management: Option<String>,
    #[serde(default)]
    pub design_ux: Option<String>,
    #[serde(default)]
    pub development: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// 0 disables the background poller.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSection {
    /// Local offset used to turn due date-times into calendar dates.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("dashboard.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

/// Parsed `dashboard.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardToml {
    #[serde(default)]
    pub trello: TrelloSection,
    #[serde(default)]
    pub boards: BoardsSection,
    #[serde(default)]
    pub lists: ListRoles,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub calendar: CalendarSection,
    #[serde(default)]
    pub server: ServerSection,
}

impl DashboardToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dashboard.toml")
    }

    /// Defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("TRELLO_API_KEY") {
            self.trello.api_key = Some(v);
        }
        if let Some(v) = get("TRELLO_TOKEN") {
            self.trello.token = Some(v);
        }
        if let Some(v) = get("TRELLO_BASE_URL") {
            self.trello.base_url = v;
        }
        if let Some(v) = get("TRELLO_BOARD_ID") {
            self.boards.account_management = Some(v);
        }
        if let Some(v) = get("TRELLO_DESIGN_UX_BOARD_ID") {
            self.boards.design_ux = Some(v);
        }
        if let Some(v) = get("TRELLO_DEVELOPMENT_BOARD_ID") {
            self.boards.development = Some(v);
        }
        if let Some(v) = get("CHAR3_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v
                .parse()
                .with_context(|| format!("Invalid CHAR3_CACHE_TTL_SECS '{}'", v))?;
        }
        if let Some(v) = get("CHAR3_POLL_INTERVAL_SECS") {
            self.cache.poll_interval_secs = v
                .parse()
                .with_context(|| format!("Invalid CHAR3_POLL_INTERVAL_SECS '{}'", v))?;
        }
        if let Some(v) = get("CHAR3_UTC_OFFSET_MINUTES") {
            self.calendar.utc_offset_minutes = v
                .parse()
                .with_context(|| format!("Invalid CHAR3_UTC_OFFSET_MINUTES '{}'", v))?;
        }
        Ok(())
    }

    /// Warnings about settings the server cannot run without.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.trello.api_key.as_deref().is_none_or(str::is_empty) {
            warnings.push("trello.api_key is not set (TRELLO_API_KEY)".to_string());
        }
        if self.boards.account_management.as_deref().is_none_or(str::is_empty) {
            warnings.push("boards.account_management is not set (TRELLO_BOARD_ID)".to_string());
        }
        if self.cache.ttl_secs == 0 {
            warnings.push("cache.ttl_secs is 0; every read will refetch".to_string());
        }
        if !(-14 * 60..=14 * 60).contains(&self.calendar.utc_offset_minutes) {
            warnings.push(format!(
                "calendar.utc_offset_minutes {} is out of range; UTC will be used",
                self.calendar.utc_offset_minutes
            ));
        }
        warnings
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.to_string());
            }
        };
        mask(&mut copy.trello.token);
        mask(&mut copy.trello.api_key);
        copy
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize dashboard.toml")
    }
}

/// `.char3/dashboard.toml` under `cwd` if it exists, else
/// `char3/dashboard.toml` under the per-user config directory if that
/// exists, else the local path.
pub fn resolve_config_path(cwd: &Path, user_config_dir: Option<&Path>) -> PathBuf {
    let local = cwd.join(CONFIG_DIR).join(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    if let Some(dir) = user_config_dir {
        let user = dir.join("char3").join(CONFIG_FILE);
        if user.exists() {
            return user;
        }
    }
    local
}

// ── Resolved configuration ───────────────────────────────────────────

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub token: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub config_path: PathBuf,
    pub toml: DashboardToml,
}

impl DashboardConfig {
    /// Resolve file → environment → CLI. Without `config_path` the file is
    /// found with [`resolve_config_path`].
    pub fn load(config_path: Option<PathBuf>, cli: CliOverrides) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let config_path = config_path.unwrap_or_else(|| {
            resolve_config_path(Path::new(""), dirs::config_dir().as_deref())
        });
        debug!(path = %config_path.display(), "using config file");
        let mut toml = DashboardToml::load_or_default(&config_path)?;
        toml.apply_env(|name| std::env::var(name).ok())?;
        Ok(Self::from_parts(config_path, toml, cli))
    }

    pub fn from_parts(config_path: PathBuf, mut toml: DashboardToml, cli: CliOverrides) -> Self {
        if let Some(token) = cli.token.filter(|t| !t.trim().is_empty()) {
            toml.trello.token = Some(token.trim().to_string());
        }
        if let Some(port) = cli.port {
            toml.server.port = port;
        }
        if let Some(db_path) = cli.db_path {
            toml.server.db_path = db_path;
        }
        Self { config_path, toml }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.toml.trello.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.toml.trello.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.toml.trello.token.as_deref()
    }

    pub fn board_ids(&self) -> BoardIds {
        let boards = &self.toml.boards;
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        BoardIds {
            account_management: boards.account_management.clone().unwrap_or_default(),
            design_ux: non_empty(&boards.design_ux),
            development: non_empty(&boards.development),
        }
    }

    pub fn list_roles(&self) -> ListRoles {
        self.toml.lists.clone()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.toml.cache.ttl_secs)
    }

    /// `None` when polling is disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        match self.toml.cache.poll_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.toml.calendar.utc_offset_minutes)
    }

    pub fn port(&self) -> u16 {
        self.toml.server.port
    }

    pub fn db_path(&self) -> &Path {
        &self.toml.server.db_path
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_config_path_prefers_local() -> Result<()> {
        let cwd = tempfile::tempdir()?;
        let user = tempfile::tempdir()?;
        std::fs::create_dir_all(user.path().join("char3"))?;
        std::fs::write(user.path().join("char3").join(CONFIG_FILE), "")?;

        let found = resolve_config_path(cwd.path(), Some(user.path()));
        assert_eq!(found, user.path().join("char3").join(CONFIG_FILE));

        std::fs::create_dir_all(cwd.path().join(CONFIG_DIR))?;
        std::fs::write(cwd.path().join(CONFIG_DIR).join(CONFIG_FILE), "")?;
        let found = resolve_config_path(cwd.path(), Some(user.path()));
        assert_eq!(found, cwd.path().join(CONFIG_DIR).join(CONFIG_FILE));
        Ok(())
    }

    #[test]
    fn test_resolve_config_path_defaults_to_local() {
        let found = resolve_config_path(Path::new("proj"), None);
        assert_eq!(found, Path::new("proj/.char3/dashboard.toml"));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = DashboardToml::parse("").unwrap();
        assert_eq!(toml.trello.base_url, "https://api.trello.com/1");
        assert_eq!(toml.cache.ttl_secs, 300);
        assert_eq!(toml.cache.poll_interval_secs, 30);
        assert_eq!(toml.server.port, 3141);
        assert_eq!(toml.server.db_path, PathBuf::from(".char3/dashboard.db"));
        assert_eq!(toml.lists.deliverables, "📦 Deliverables");
        assert_eq!(toml.lists.admin_tasks, "👥 Account Tasks");
    }

    #[test]
    fn test_parse_sections() {
        let toml = DashboardToml::parse(
            r#"
[trello]
api_key = "key-1"

[boards]
account_management = "am"
development = "dev"

[lists]
deliverables = "Deliverables"

[cache]
ttl_secs = 60

[calendar]
utc_offset_minutes = -300
"#,
        )
        .unwrap();
        assert_eq!(toml.trello.api_key.as_deref(), Some("key-1"));
        assert_eq!(toml.boards.development.as_deref(), Some("dev"));
        assert_eq!(toml.boards.design_ux, None);
        assert_eq!(toml.lists.deliverables, "Deliverables");
        assert_eq!(toml.lists.admin_tasks, "👥 Account Tasks");
        assert_eq!(toml.cache.ttl_secs, 60);
        assert_eq!(toml.cache.poll_interval_secs, 30);
        assert_eq!(toml.calendar.utc_offset_minutes, -300);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(DashboardToml::parse("[cache\nttl_secs = ").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = DashboardToml::parse("[boards]\naccount_management = \"from-file\"").unwrap();
        toml.apply_env(env(&[
            ("TRELLO_BOARD_ID", "from-env"),
            ("TRELLO_TOKEN", "  tok  "),
            ("CHAR3_CACHE_TTL_SECS", "120"),
            ("CHAR3_UTC_OFFSET_MINUTES", "60"),
            ("TRELLO_DESIGN_UX_BOARD_ID", ""),
        ]))
        .unwrap();
        assert_eq!(toml.boards.account_management.as_deref(), Some("from-env"));
        assert_eq!(toml.trello.token.as_deref(), Some("tok"));
        assert_eq!(toml.cache.ttl_secs, 120);
        assert_eq!(toml.calendar.utc_offset_minutes, 60);
        assert_eq!(toml.boards.design_ux, None);
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut toml = DashboardToml::default();
        let err = toml
            .apply_env(env(&[("CHAR3_POLL_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHAR3_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut toml = DashboardToml::default();
        toml.trello.token = Some("file-token".into());
        let config = DashboardConfig::from_parts(
            PathBuf::from("x.toml"),
            toml,
            CliOverrides {
                token: Some(" cli-token ".into()),
                port: Some(8080),
                db_path: Some(PathBuf::from("/tmp/d.db")),
            },
        );
        assert_eq!(config.token(), Some("cli-token"));
        assert_eq!(config.port(), 8080);
        assert_eq!(config.db_path(), Path::new("/tmp/d.db"));
    }

    #[test]
    fn test_board_ids_drop_blank_optional_boards() {
        let mut toml = DashboardToml::default();
        toml.boards.account_management = Some("am".into());
        toml.boards.design_ux = Some("  ".into());
        toml.boards.development = Some("dev".into());
        let config = DashboardConfig::from_parts(PathBuf::new(), toml, CliOverrides::default());
        let ids = config.board_ids();
        assert_eq!(ids.account_management, "am");
        assert_eq!(ids.design_ux, None);
        assert_eq!(ids.development.as_deref(), Some("dev"));
    }

    #[test]
    fn test_poll_interval_zero_disables() {
        let mut toml = DashboardToml::default();
        toml.cache.poll_interval_secs = 0;
        let config = DashboardConfig::from_parts(PathBuf::new(), toml, CliOverrides::default());
        assert_eq!(config.poll_interval(), None);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut toml = DashboardToml::default();
        toml.trello.token = Some("secret-token".into());
        toml.trello.api_key = Some("secret-key".into());
        let shown = toml.redacted().to_toml_string().unwrap();
        assert!(!shown.contains("secret-token"));
        assert!(!shown.contains("secret-key"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn test_validate_reports_missing_settings() {
        let warnings = DashboardToml::default().validate();
        assert!(warnings.iter().any(|w| w.contains("TRELLO_API_KEY")));
        assert!(warnings.iter().any(|w| w.contains("TRELLO_BOARD_ID")));

        let mut toml = DashboardToml::default();
        toml.trello.api_key = Some("k".into());
        toml.boards.account_management = Some("am".into());
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_load_or_default_reads_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(DashboardToml::load_or_default(&path)?, DashboardToml::default());

        std::fs::write(&path, "[server]\nport = 9000\n")?;
        assert_eq!(DashboardToml::load_or_default(&path)?.server.port, 9000);
        Ok(())
    }
}

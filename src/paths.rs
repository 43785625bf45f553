//! Path resolution for server layers, configuration, and the legacy list.
//!
//! Uses env vars when set, otherwise XDG defaults.

use std::path::{Path, PathBuf};

/// Resolved file locations.
#[derive(Debug, Clone)]
pub struct Paths {
    pub user_servers: PathBuf,
    pub system_servers: PathBuf,
    pub config_file: PathBuf,
    pub legacy_servers: PathBuf,
}

impl Paths {
    /// Resolve paths from environment, falling back to XDG/defaults.
    pub fn resolve() -> Self {
        let user_servers = resolve_path(
            "ADDECAT_USER_SERVERS",
            dirs::config_dir().map(|p| p.join("addecat/servers.xml")),
            "~/.config/addecat/servers.xml",
        );
        let system_servers = resolve_path(
            "ADDECAT_SYSTEM_SERVERS",
            Some(PathBuf::from("/usr/share/addecat/servers.xml")),
            "/usr/share/addecat/servers.xml",
        );
        let config_file = resolve_path(
            "ADDECAT_CONFIG",
            dirs::config_dir().map(|p| p.join("addecat/config.toml")),
            "~/.config/addecat/config.toml",
        );
        let legacy_servers = resolve_path(
            "ADDECAT_LEGACY_SERVERS",
            dirs::config_dir().map(|p| p.join("addecat/legacy-servers.list")),
            "~/.config/addecat/legacy-servers.list",
        );

        Self {
            user_servers,
            system_servers,
            config_file,
            legacy_servers,
        }
    }

    /// Writable user servers document.
    pub fn user_servers_path(&self) -> &Path {
        &self.user_servers
    }

    /// Bundled defaults, read-only.
    pub fn system_servers_path(&self) -> &Path {
        &self.system_servers
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file
    }

    /// Flat `host/group` list left over from older releases.
    pub fn legacy_servers_path(&self) -> &Path {
        &self.legacy_servers
    }
}

fn resolve_path(env_var: &str, xdg_default: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Ok(val) = std::env::var(env_var) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    xdg_default.unwrap_or_else(|| expand_tilde(fallback))
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdg_default_used_when_env_unset() {
        let p = resolve_path(
            "ADDECAT_TEST_PATH_THAT_IS_NEVER_SET",
            Some(PathBuf::from("/x/y")),
            "/z",
        );
        assert_eq!(p, PathBuf::from("/x/y"));
    }

    #[test]
    fn fallback_used_without_xdg() {
        let p = resolve_path(
            "ADDECAT_TEST_PATH_THAT_IS_NEVER_SET",
            None,
            "/etc/addecat/servers.xml",
        );
        assert_eq!(p, PathBuf::from("/etc/addecat/servers.xml"));
    }

    #[test]
    fn tilde_is_expanded() {
        let p = expand_tilde("~/servers.xml");
        assert!(!p.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
    }
}

//! Data structures for server descriptors and account credentials.

use serde::{Deserialize, Serialize};

/// Default value for the account user.
pub const DEFAULT_USER: &str = "idv";

/// Default value for the account project number.
pub const DEFAULT_PROJ: &str = "0";

/// Type tags seeded into a fresh servers document. Data may carry others.
pub const DEFAULT_TYPES: [&str; 5] = ["image", "point", "grid", "text", "nav"];

/// One server/group pair for a data type, with its active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    data_type: String,
    server_name: String,
    group_name: String,
    is_active: bool,
}

impl ServerDescriptor {
    /// `active` is true only for the exact string `"true"`.
    pub fn new(data_type: &str, server_name: &str, group_name: &str, active: &str) -> Self {
        Self::with_active(data_type, server_name, group_name, parse_active(active))
    }

    pub fn with_active(
        data_type: &str,
        server_name: &str,
        group_name: &str,
        is_active: bool,
    ) -> Self {
        Self {
            data_type: data_type.to_string(),
            server_name: server_name.to_string(),
            group_name: group_name.to_string(),
            is_active,
        }
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_data_type(&self, data_type: &str) -> bool {
        self.data_type == data_type
    }

    pub fn set_data_type(&mut self, data_type: &str) {
        self.data_type = data_type.to_string();
    }

    pub fn set_server_name(&mut self, server_name: &str) {
        self.server_name = server_name.to_string();
    }

    pub fn set_group_name(&mut self, group_name: &str) {
        self.group_name = group_name.to_string();
    }

    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }

    /// True when both name the same server for the same type, whatever the group.
    pub fn is_duplicate_of(&self, other: &ServerDescriptor) -> bool {
        self.data_type == other.data_type && self.server_name == other.server_name
    }
}

impl std::fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server_name, self.group_name)
    }
}

impl From<&RawServerEntry> for ServerDescriptor {
    fn from(raw: &RawServerEntry) -> Self {
        Self::with_active(&raw.data_type, &raw.name, &raw.group, raw.active)
    }
}

/// A `<server>` element as read from a servers document, tagged with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServerEntry {
    pub data_type: String,
    pub name: String,
    pub group: String,
    pub active: bool,
}

/// Account defaults from `<userID user=".." proj=".."/>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub proj: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            proj: DEFAULT_PROJ.to_string(),
        }
    }
}

/// Exact-match parse of an `active` attribute. Anything but `"true"` is inactive.
pub fn parse_active(value: &str) -> bool {
    value == "true"
}

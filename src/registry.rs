//! Server registry: loads descriptors from layered servers documents,
//! answers filtered queries, and persists edits to the writable layer.

use serde::Serialize;
use tracing::{debug, warn};

use crate::coalesce::{coalesce, CoalescedServer, LayerInput};
use crate::config::MergePolicy;
use crate::document::{self, ServersDocument};
use crate::models::{
    Credentials, RawServerEntry, ServerDescriptor, DEFAULT_PROJ, DEFAULT_USER,
};
use crate::resources::{ResourceError, ResourceStore};

/// What happened to one layer during `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerReport {
    pub name: String,
    pub writable: bool,
    pub outcome: LayerOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LayerOutcome {
    /// Every descriptor the layer declares, whether or not it reached the catalog.
    Loaded {
        types: Vec<String>,
        descriptors: Vec<ServerDescriptor>,
        warnings: Vec<String>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub layers: Vec<LayerReport>,
}

impl LoadReport {
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.layers.iter().filter_map(|l| match l.outcome {
            LayerOutcome::Skipped { ref reason } => Some((l.name.as_str(), reason.as_str())),
            LayerOutcome::Loaded { .. } => None,
        })
    }
}

/// Servers of one type after filtering, with their groups in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerSelection {
    pub descriptors: Vec<ServerDescriptor>,
    pub groups: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to save servers: {0}")]
    Persist(#[from] ResourceError),
    #[error("Invalid {field} {value:?}: contains characters a servers document cannot hold")]
    InvalidValue { field: &'static str, value: String },
}

fn check_value(field: &'static str, value: &str) -> Result<(), RegistryError> {
    if document::is_xml_safe(value) {
        Ok(())
    } else {
        Err(RegistryError::InvalidValue {
            field,
            value: value.to_string(),
        })
    }
}

/// The server catalog for one session.
#[derive(Debug)]
pub struct ServerRegistry<S: ResourceStore> {
    store: S,
    policy: MergePolicy,
    types: Vec<String>,
    descriptors: Vec<ServerDescriptor>,
    credentials: Option<Credentials>,
    writable: Option<ServersDocument>,
    report: LoadReport,
}

impl<S: ResourceStore> ServerRegistry<S> {
    /// An empty registry; nothing is read until `initialize`.
    pub fn new(store: S, policy: MergePolicy) -> Self {
        Self {
            store,
            policy,
            types: Vec::new(),
            descriptors: Vec::new(),
            credentials: None,
            writable: None,
            report: LoadReport::default(),
        }
    }

    /// Create and load in one step.
    pub fn open(store: S, policy: MergePolicy) -> Self {
        let mut registry = Self::new(store, policy);
        registry.initialize();
        registry
    }

    /// Re-read every layer. Unreadable layers are skipped and reported.
    pub fn initialize(&mut self) -> &LoadReport {
        self.types.clear();
        self.descriptors.clear();
        self.credentials = None;
        self.writable = None;

        let mut report = LoadReport::default();
        for layer in self.store.layers() {
            let outcome = match layer.content.as_deref() {
                None => LayerOutcome::Skipped {
                    reason: "no content".to_string(),
                },
                Some(text) => match document::parse(text) {
                    Ok(doc) => self.absorb(&layer.name, doc),
                    Err(e) => LayerOutcome::Skipped { reason: e.to_string() },
                },
            };
            if let LayerOutcome::Skipped { ref reason } = outcome {
                if layer.content.is_some() {
                    warn!(layer = %layer.name, %reason, "Skipping servers layer");
                } else {
                    debug!(layer = %layer.name, "Servers layer is empty");
                }
            }
            report.layers.push(LayerReport {
                name: layer.name,
                writable: layer.writable,
                outcome,
            });
        }

        debug!(
            types = self.types.len(),
            servers = self.descriptors.len(),
            "Server registry initialized"
        );
        self.report = report;
        &self.report
    }

    fn absorb(&mut self, layer: &str, doc: ServersDocument) -> LayerOutcome {
        // The first parsed layer decides, even without a userID element.
        if self.credentials.is_none() {
            self.credentials = Some(doc.credentials.clone().unwrap_or_default());
        }
        for w in &doc.warnings {
            warn!(%layer, "{}", w);
        }

        let mut types = Vec::new();
        let mut descriptors = Vec::new();
        for section in &doc.types {
            let seen = self.types.contains(&section.name);
            let layer_descriptors: Vec<ServerDescriptor> =
                section.servers.iter().map(ServerDescriptor::from).collect();

            if !seen {
                self.types.push(section.name.clone());
                self.descriptors.extend(layer_descriptors.iter().cloned());
            } else if self.policy == MergePolicy::Additive {
                self.descriptors.extend(layer_descriptors.iter().cloned());
            } else if !layer_descriptors.is_empty() {
                debug!(
                    %layer,
                    data_type = %section.name,
                    ignored = layer_descriptors.len(),
                    "Type already declared by an earlier layer"
                );
            }

            types.push(section.name.clone());
            descriptors.extend(layer_descriptors);
        }

        LayerOutcome::Loaded {
            types,
            descriptors,
            warnings: doc.warnings,
        }
    }

    /// Known type tags in first-seen order, loading first if nothing is known yet.
    pub fn server_types(&mut self) -> &[String] {
        if self.types.is_empty() {
            self.initialize();
        }
        &self.types
    }

    /// Servers of `data_type`. Without `include_inactive`, inactive entries are
    /// dropped; without `include_duplicates`, only the first entry per server
    /// name is kept. Unknown types give an empty selection.
    pub fn servers(
        &self,
        data_type: &str,
        include_inactive: bool,
        include_duplicates: bool,
    ) -> ServerSelection {
        let mut selection = ServerSelection::default();
        for sd in self.descriptors.iter().filter(|sd| sd.is_data_type(data_type)) {
            if !include_inactive && !sd.is_active() {
                continue;
            }
            if !include_duplicates && selection.descriptors.iter().any(|s| s.is_duplicate_of(sd)) {
                continue;
            }
            selection.groups.push(sd.group_name().to_string());
            selection.descriptors.push(sd.clone());
        }
        selection
    }

    /// Server names of `data_type`, filtered as in `servers`.
    pub fn server_names(
        &self,
        data_type: &str,
        include_inactive: bool,
        include_duplicates: bool,
    ) -> Vec<String> {
        self.servers(data_type, include_inactive, include_duplicates)
            .descriptors
            .iter()
            .map(|sd| sd.server_name().to_string())
            .collect()
    }

    /// Groups of the active servers of `data_type`, duplicates included.
    pub fn groups(&self, data_type: &str) -> Vec<String> {
        self.servers(data_type, false, true).groups
    }

    /// The whole catalog in load order.
    pub fn descriptors(&self) -> &[ServerDescriptor] {
        &self.descriptors
    }

    pub fn user(&self) -> &str {
        self.credentials.as_ref().map_or(DEFAULT_USER, |c| c.user.as_str())
    }

    pub fn proj(&self) -> &str {
        self.credentials.as_ref().map_or(DEFAULT_PROJ, |c| c.proj.as_str())
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Every loaded layer merged into one list, lowest priority first so the
    /// higher layers win. Entries from the writable layer are marked local.
    pub fn coalesced(&self) -> Vec<CoalescedServer> {
        let inputs: Vec<LayerInput<'_>> = self
            .report
            .layers
            .iter()
            .rev()
            .filter_map(|l| match l.outcome {
                LayerOutcome::Loaded { ref descriptors, .. } => Some(LayerInput {
                    descriptors,
                    local: l.writable,
                }),
                LayerOutcome::Skipped { .. } => None,
            })
            .collect();
        coalesce(&inputs)
    }

    fn writable_doc(&mut self) -> &mut ServersDocument {
        let store = &self.store;
        self.writable.get_or_insert_with(|| {
            let content = store.writable_content(&ServersDocument::seeded().to_xml());
            ServersDocument::parse_or_seed(&content)
        })
    }

    /// Hand the writable document to the store, write it, and reload. The
    /// reload happens even when the write fails, so the catalog keeps the edit.
    fn persist(&mut self) -> Result<(), RegistryError> {
        let xml = self.writable_doc().to_xml();
        self.store.set_writable_content(xml);
        let written = self.store.write_writable();
        if let Err(ref e) = written {
            warn!(error = %e, "Servers were changed but not saved");
        }
        self.initialize();
        written.map_err(RegistryError::from)
    }

    /// Append `entries` under `data_type` in the writable layer and save.
    /// The type section is created when missing. Nothing changes when any
    /// value holds characters the document cannot store.
    pub fn add_servers(
        &mut self,
        data_type: &str,
        entries: &[ServerDescriptor],
    ) -> Result<(), RegistryError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_value("type", data_type)?;
        for sd in entries {
            check_value("server", sd.server_name())?;
            check_value("group", sd.group_name())?;
        }
        let section = self.writable_doc().ensure_type(data_type);
        for sd in entries {
            section.servers.push(RawServerEntry {
                data_type: data_type.to_string(),
                name: sd.server_name().to_string(),
                group: sd.group_name().to_string(),
                active: sd.is_active(),
            });
        }
        debug!(%data_type, added = entries.len(), "Adding servers");
        self.persist()
    }

    /// Remove every server from the writable layer and save. Types stay.
    pub fn clear(&mut self) -> Result<(), RegistryError> {
        self.writable_doc().clear_servers();
        self.persist()
    }

    /// Remove `name`/`group` under `data_type` from the writable layer.
    /// Returns `false`, without saving, when the writable layer has no such entry.
    pub fn remove_server(
        &mut self,
        data_type: &str,
        name: &str,
        group: &str,
    ) -> Result<bool, RegistryError> {
        let doc = self.writable_doc();
        let Some(section) = doc.types.iter_mut().find(|t| t.name == data_type) else {
            return Ok(false);
        };
        let before = section.servers.len();
        section.servers.retain(|s| !(s.name == name && s.group == group));
        if section.servers.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Set the active flag of `name`/`group` under `data_type`. An entry only
    /// known from a read-only layer is copied into the writable layer first.
    /// Returns `false` when no such server is known.
    pub fn set_active(
        &mut self,
        data_type: &str,
        name: &str,
        group: &str,
        active: bool,
    ) -> Result<bool, RegistryError> {
        check_value("type", data_type)?;
        check_value("server", name)?;
        check_value("group", group)?;
        let known = self.descriptors.iter().any(|sd| {
            sd.is_data_type(data_type) && sd.server_name() == name && sd.group_name() == group
        });

        let doc = self.writable_doc();
        let mut found = false;
        if let Some(section) = doc.types.iter_mut().find(|t| t.name == data_type) {
            let matching = section
                .servers
                .iter_mut()
                .filter(|s| s.name == name && s.group == group);
            for s in matching {
                s.active = active;
                found = true;
            }
        }
        if !found {
            if !known {
                return Ok(false);
            }
            doc.ensure_type(data_type).servers.push(RawServerEntry {
                data_type: data_type.to_string(),
                name: name.to_string(),
                group: group.to_string(),
                active,
            });
        }
        self.persist()?;
        Ok(true)
    }

    /// Store new account defaults in the writable layer and save.
    pub fn set_credentials(&mut self, user: &str, proj: &str) -> Result<(), RegistryError> {
        check_value("user", user)?;
        check_value("proj", proj)?;
        self.writable_doc().credentials = Some(Credentials {
            user: user.to_string(),
            proj: proj.to_string(),
        });
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryResources;

    const SCENARIO: &str = r#"<servers><type name="image">
        <server name="A" group="G1" active="true"/>
        <server name="A" group="G2" active="false"/>
    </type></servers>"#;

    fn names(sel: &ServerSelection) -> Vec<String> {
        sel.descriptors.iter().map(|sd| sd.to_string()).collect()
    }

    fn open(writable: Option<&str>) -> ServerRegistry<MemoryResources> {
        ServerRegistry::open(MemoryResources::with_writable(writable), MergePolicy::FirstSeen)
    }

    #[test]
    fn scenario_filters() {
        let reg = open(Some(SCENARIO));
        assert_eq!(names(&reg.servers("image", false, true)), vec!["A/G1"]);
        assert_eq!(names(&reg.servers("image", true, false)), vec!["A/G1"]);
        assert_eq!(names(&reg.servers("image", true, true)), vec!["A/G1", "A/G2"]);
    }

    #[test]
    fn unknown_type_is_empty() {
        let reg = open(Some(SCENARIO));
        assert_eq!(reg.servers("nav", true, true), ServerSelection::default());
        assert!(reg.groups("nav").is_empty());
        assert!(reg.server_names("nav", true, true).is_empty());
    }

    #[test]
    fn groups_parallel_active_servers() {
        let reg = open(Some(SCENARIO));
        assert_eq!(reg.groups("image"), vec!["G1"]);
        let sel = reg.servers("image", true, true);
        assert_eq!(sel.groups, vec!["G1", "G2"]);
    }

    #[test]
    fn wrong_case_active_is_inactive() {
        let reg = open(Some(
            r#"<servers><type name="grid">
                <server name="B" group="G" active="TRUE"/>
            </type></servers>"#,
        ));
        assert!(reg.servers("grid", false, true).descriptors.is_empty());
        assert_eq!(reg.servers("grid", true, true).descriptors.len(), 1);
    }

    #[test]
    fn credentials_come_from_first_parsed_layer() {
        let reg = open(Some(SCENARIO));
        assert_eq!((reg.user(), reg.proj()), ("idv", "0"));

        // A parsed layer without userID still decides: the defaults apply.
        let store = MemoryResources::with_writable(Some(SCENARIO))
            .push_layer("system", Some(r#"<servers><userID user="sys" proj="7"/></servers>"#));
        let reg = ServerRegistry::open(store, MergePolicy::FirstSeen);
        assert_eq!((reg.user(), reg.proj()), ("idv", "0"));

        // Skipped layers do not count.
        let store = MemoryResources::with_writable(None)
            .push_layer("broken", Some("<servers><userID"))
            .push_layer("site", Some(r#"<servers><userID user="site" proj="42"/></servers>"#))
            .push_layer("system", Some(r#"<servers><userID user="sys" proj="7"/></servers>"#));
        let reg = ServerRegistry::open(store, MergePolicy::FirstSeen);
        assert_eq!((reg.user(), reg.proj()), ("site", "42"));
    }

    #[test]
    fn repeated_type_section_in_one_layer() {
        let doc = r#"<servers>
            <type name="image"><server name="A" group="G1" active="true"/></type>
            <type name="image"><server name="B" group="G2" active="true"/></type>
        </servers>"#;

        let mut reg = open(Some(doc));
        assert_eq!(reg.server_types(), ["image".to_string()]);
        assert_eq!(names(&reg.servers("image", true, true)), vec!["A/G1"]);

        let store = MemoryResources::with_writable(Some(doc));
        let mut reg = ServerRegistry::open(store, MergePolicy::Additive);
        assert_eq!(reg.server_types(), ["image".to_string()]);
        assert_eq!(names(&reg.servers("image", true, true)), vec!["A/G1", "B/G2"]);
    }

    #[test]
    fn server_types_initializes_lazily() {
        let store = MemoryResources::with_writable(Some(SCENARIO));
        let mut reg = ServerRegistry::new(store, MergePolicy::FirstSeen);
        assert!(reg.descriptors().is_empty());
        assert_eq!(reg.server_types(), ["image".to_string()]);
        assert_eq!(reg.descriptors().len(), 2);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut reg = open(Some(SCENARIO));
        let first = reg.descriptors().to_vec();
        reg.initialize();
        assert_eq!(reg.descriptors(), first.as_slice());
        assert_eq!(reg.server_types(), ["image".to_string()]);
    }

    #[test]
    fn add_creates_type_and_persists() {
        let mut reg = open(Some(SCENARIO));
        let sd = ServerDescriptor::new("ignored", "B", "G3", "true");
        reg.add_servers("point", &[sd]).unwrap();

        assert_eq!(names(&reg.servers("point", false, true)), vec!["B/G3"]);
        let stored = reg.store().stored.clone().unwrap();
        assert!(stored.contains(r#"<type name="point">"#));
        assert!(stored.contains(r#"<server name="B" group="G3" active="true"/>"#));
    }

    #[test]
    fn failed_write_reports_but_keeps_edit() {
        let mut store = MemoryResources::with_writable(Some(SCENARIO));
        store.fail_writes = true;
        let mut reg = ServerRegistry::open(store, MergePolicy::FirstSeen);

        let err = reg
            .add_servers("image", &[ServerDescriptor::new("image", "C", "G", "true")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::Persist(_)));
        assert_eq!(names(&reg.servers("image", false, true)), vec!["A/G1", "C/G"]);
        assert_eq!(reg.store().stored.as_deref(), Some(SCENARIO));
    }

    #[test]
    fn clear_keeps_types() {
        let mut reg = open(Some(SCENARIO));
        reg.add_servers("grid", &[ServerDescriptor::new("grid", "D", "G", "true")])
            .unwrap();
        reg.clear().unwrap();
        assert_eq!(reg.server_types(), ["image".to_string(), "grid".to_string()]);
        assert!(reg.servers("image", true, true).descriptors.is_empty());
        assert!(reg.servers("grid", true, true).descriptors.is_empty());
    }

    #[test]
    fn missing_writable_is_seeded_on_first_edit() {
        let mut reg = open(None);
        assert!(reg.descriptors().is_empty());
        reg.add_servers("nav", &[ServerDescriptor::new("nav", "N", "G", "true")]).unwrap();
        let seeded = ["image", "point", "grid", "text", "nav"].map(String::from);
        assert_eq!(reg.server_types(), seeded);
        assert_eq!(reg.groups("nav"), vec!["G"]);
    }

    #[test]
    fn foreign_writable_root_is_reseeded() {
        let mut reg = open(Some("<tabs></tabs>"));
        assert!(matches!(
            reg.report().layers[0].outcome,
            LayerOutcome::Skipped { .. }
        ));
        reg.set_credentials("bob", "99").unwrap();
        assert_eq!((reg.user(), reg.proj()), ("bob", "99"));
        assert_eq!(reg.server_types().len(), 5);
    }

    #[test]
    fn unstorable_values_are_rejected_before_any_change() {
        let keep = r#"<servers><type name="image">
            <server name="keep" group="G" active="true"/>
        </type></servers>"#;
        let mut reg = open(Some(keep));

        let bad = ServerDescriptor::new("image", "bad\u{1}", "G", "true");
        let err = reg.add_servers("image", &[bad]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidValue { field: "server", .. }));
        assert!(reg.store().pending.is_none());
        assert_eq!(reg.store().stored.as_deref(), Some(keep));

        let err = reg.set_credentials("bob", "9\u{b}").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidValue { field: "proj", .. }));
        assert!(matches!(
            reg.set_active("image", "keep", "G\u{0}", false),
            Err(RegistryError::InvalidValue { field: "group", .. })
        ));

        // The next valid edit still sees the original entry.
        reg.add_servers("image", &[ServerDescriptor::new("image", "new", "G", "true")])
            .unwrap();
        let reg = ServerRegistry::open(reg.into_store(), MergePolicy::FirstSeen);
        assert_eq!(names(&reg.servers("image", true, true)), vec!["keep/G", "new/G"]);
    }

    #[test]
    fn remove_and_set_active() {
        let mut reg = open(Some(SCENARIO));
        assert!(reg.set_active("image", "A", "G2", true).unwrap());
        assert_eq!(names(&reg.servers("image", false, true)), vec!["A/G1", "A/G2"]);

        assert!(reg.remove_server("image", "A", "G1").unwrap());
        assert_eq!(names(&reg.servers("image", true, true)), vec!["A/G2"]);

        assert!(!reg.remove_server("image", "A", "G1").unwrap());
        assert!(!reg.set_active("image", "Z", "G", true).unwrap());
    }

    #[test]
    fn set_active_copies_read_only_entry() {
        let store = MemoryResources::with_writable(None).push_layer(
            "system",
            Some(r#"<servers><type name="text">
                <server name="T" group="G" active="true"/>
            </type></servers>"#),
        );
        let mut reg = ServerRegistry::open(store, MergePolicy::Additive);
        assert!(reg.set_active("text", "T", "G", false).unwrap());
        let stored = reg.store().stored.clone().unwrap();
        assert!(stored.contains(r#"<server name="T" group="G" active="false"/>"#));
        assert!(reg.coalesced().iter().all(|c| !c.descriptor.is_active()));
    }

    #[test]
    fn coalesced_marks_writable_entries_local() {
        let store = MemoryResources::with_writable(Some(SCENARIO)).push_layer(
            "system",
            Some(r#"<servers><type name="image">
                <server name="A" group="G1" active="false"/>
                <server name="S" group="G" active="true"/>
            </type></servers>"#),
        );
        let reg = ServerRegistry::open(store, MergePolicy::FirstSeen);
        let merged = reg.coalesced();
        let view: Vec<_> = merged
            .iter()
            .map(|c| (c.descriptor.to_string(), c.descriptor.is_active(), c.local))
            .collect();
        assert_eq!(
            view,
            vec![
                ("A/G1".to_string(), true, true),
                ("S/G".to_string(), true, false),
                ("A/G2".to_string(), false, true),
            ]
        );
    }
}

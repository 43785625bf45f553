//! Servers document: typed parse and XML serialization.
//!
//! The on-disk layout is
//!
//! ```xml
//! <servers>
//!   <userID user="idv" proj="0"/>
//!   <type name="image">
//!     <server name="HOST1" group="GROUPA" active="true"/>
//!   </type>
//! </servers>
//! ```

use crate::models::{
    parse_active, Credentials, RawServerEntry, DEFAULT_PROJ, DEFAULT_TYPES, DEFAULT_USER,
};

pub const TAG_SERVERS: &str = "servers";
pub const TAG_TYPE: &str = "type";
pub const TAG_SERVER: &str = "server";
pub const TAG_USERID: &str = "userID";

pub const ATTR_NAME: &str = "name";
pub const ATTR_GROUP: &str = "group";
pub const ATTR_ACTIVE: &str = "active";
pub const ATTR_USER: &str = "user";
pub const ATTR_PROJ: &str = "proj";

/// A parsed servers document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServersDocument {
    /// Present only when the document has a `userID` element.
    pub credentials: Option<Credentials>,
    pub types: Vec<TypeSection>,
    /// Elements dropped during parse, one message each.
    pub warnings: Vec<String>,
}

/// A `<type>` element and its servers, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSection {
    pub name: String,
    pub servers: Vec<RawServerEntry>,
}

impl TypeSection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            servers: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("Unexpected root element <{found}>, expected <servers>")]
    UnexpectedRoot { found: String },
}

/// Parse a servers document. Bad `type`/`server` elements are skipped and
/// noted in `warnings`; only unreadable XML or a foreign root fails.
pub fn parse(text: &str) -> Result<ServersDocument, DocumentError> {
    let xml = roxmltree::Document::parse(text)?;
    let root = xml.root_element();
    if root.tag_name().name() != TAG_SERVERS {
        return Err(DocumentError::UnexpectedRoot {
            found: root.tag_name().name().to_string(),
        });
    }

    let mut doc = ServersDocument::default();

    for node in root.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            TAG_USERID if doc.credentials.is_none() => {
                doc.credentials = Some(Credentials {
                    user: node.attribute(ATTR_USER).unwrap_or(DEFAULT_USER).to_string(),
                    proj: node.attribute(ATTR_PROJ).unwrap_or(DEFAULT_PROJ).to_string(),
                });
            }
            TAG_TYPE => {
                let Some(type_name) = node.attribute(ATTR_NAME) else {
                    doc.warnings
                        .push(format!("<type> at byte {} has no name", node.range().start));
                    continue;
                };
                let mut section = TypeSection::new(type_name);
                for server in node
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == TAG_SERVER)
                {
                    match (server.attribute(ATTR_NAME), server.attribute(ATTR_GROUP)) {
                        (Some(name), Some(group)) => section.servers.push(RawServerEntry {
                            data_type: type_name.to_string(),
                            name: name.to_string(),
                            group: group.to_string(),
                            active: server.attribute(ATTR_ACTIVE).is_some_and(parse_active),
                        }),
                        _ => doc.warnings.push(format!(
                            "<server> under type {} at byte {} is missing name or group",
                            type_name,
                            server.range().start
                        )),
                    }
                }
                doc.types.push(section);
            }
            _ => {}
        }
    }

    Ok(doc)
}

impl ServersDocument {
    /// Fresh root: default account plus one empty section per built-in type.
    pub fn seeded() -> Self {
        Self {
            credentials: Some(Credentials::default()),
            types: DEFAULT_TYPES.iter().map(|t| TypeSection::new(t)).collect(),
            warnings: Vec::new(),
        }
    }

    /// Parse writable content, falling back to `seeded()` when it is not a
    /// servers document.
    pub fn parse_or_seed(text: &str) -> Self {
        match parse(text) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(error = %e, "Seeding fresh servers document");
                Self::seeded()
            }
        }
    }

    /// Find the section for `name`, appending an empty one if absent.
    pub fn ensure_type(&mut self, name: &str) -> &mut TypeSection {
        let idx = match self.types.iter().position(|t| t.name == name) {
            Some(i) => i,
            None => {
                self.types.push(TypeSection::new(name));
                self.types.len() - 1
            }
        };
        &mut self.types[idx]
    }

    /// Drop every server under every type. Type sections stay.
    pub fn clear_servers(&mut self) {
        for section in &mut self.types {
            section.servers.clear();
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<servers>\n");
        if let Some(ref c) = self.credentials {
            out.push_str(&format!(
                "  <userID {}=\"{}\" {}=\"{}\"/>\n",
                ATTR_USER,
                escape(&c.user),
                ATTR_PROJ,
                escape(&c.proj)
            ));
        }
        for section in &self.types {
            if section.servers.is_empty() {
                out.push_str(&format!("  <type {}=\"{}\"/>\n", ATTR_NAME, escape(&section.name)));
                continue;
            }
            out.push_str(&format!("  <type {}=\"{}\">\n", ATTR_NAME, escape(&section.name)));
            for s in &section.servers {
                out.push_str(&format!(
                    "    <server {}=\"{}\" {}=\"{}\" {}=\"{}\"/>\n",
                    ATTR_NAME,
                    escape(&s.name),
                    ATTR_GROUP,
                    escape(&s.group),
                    ATTR_ACTIVE,
                    s.active
                ));
            }
            out.push_str("  </type>\n");
        }
        out.push_str("</servers>\n");
        out
    }
}

/// True when every character of `value` can be stored in an XML 1.0 attribute.
pub fn is_xml_safe(value: &str) -> bool {
    value.chars().all(|ch| match ch {
        '\t' | '\n' | '\r' => true,
        '\u{0}'..='\u{1f}' => false,
        '\u{fffe}' | '\u{ffff}' => false,
        _ => true,
    })
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<servers>
  <userID user="alice" proj="1234"/>
  <type name="image">
    <server name="A" group="G1" active="true"/>
    <server name="A" group="G2" active="false"/>
  </type>
  <type name="grid"/>
</servers>"#;

    #[test]
    fn parses_sample() {
        let doc = parse(SAMPLE).unwrap();
        assert_eq!(
            doc.credentials,
            Some(Credentials {
                user: "alice".into(),
                proj: "1234".into()
            })
        );
        assert_eq!(doc.types.len(), 2);
        assert_eq!(doc.types[0].name, "image");
        assert_eq!(doc.types[0].servers.len(), 2);
        assert!(doc.types[0].servers[0].active);
        assert!(!doc.types[0].servers[1].active);
        assert!(doc.types[1].servers.is_empty());
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn rejects_foreign_root() {
        let err = parse("<tabs></tabs>").unwrap_err();
        assert!(matches!(err, DocumentError::UnexpectedRoot { ref found } if found == "tabs"));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(matches!(parse("<servers>"), Err(DocumentError::Xml(_))));
        assert!(matches!(parse(""), Err(DocumentError::Xml(_))));
    }

    #[test]
    fn skips_incomplete_elements() {
        let doc = parse(
            r#"<servers>
                <type><server name="X" group="Y" active="true"/></type>
                <type name="point">
                    <server name="B" active="true"/>
                    <server name="C" group="G"/>
                </type>
            </servers>"#,
        )
        .unwrap();
        assert_eq!(doc.types.len(), 1);
        assert_eq!(doc.types[0].servers.len(), 1);
        assert_eq!(doc.types[0].servers[0].name, "C");
        assert!(!doc.types[0].servers[0].active);
        assert_eq!(doc.warnings.len(), 2);
        assert!(doc.credentials.is_none());
    }

    #[test]
    fn userid_without_attributes_uses_defaults() {
        let doc = parse(r#"<servers><userID/></servers>"#).unwrap();
        assert_eq!(doc.credentials, Some(Credentials::default()));
    }

    #[test]
    fn seeded_has_builtin_types() {
        let doc = ServersDocument::seeded();
        let names: Vec<_> = doc.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["image", "point", "grid", "text", "nav"]);
        assert_eq!(doc.credentials, Some(Credentials::default()));
    }

    #[test]
    fn parse_or_seed_falls_back() {
        assert_eq!(ServersDocument::parse_or_seed("<tabs></tabs>"), ServersDocument::seeded());
        assert_eq!(
            ServersDocument::parse_or_seed("<servers></servers>"),
            ServersDocument::default()
        );
    }

    #[test]
    fn written_xml_reparses_with_escaping() {
        let mut doc = parse(SAMPLE).unwrap();
        doc.ensure_type("text").servers.push(RawServerEntry {
            data_type: "text".into(),
            name: "a&b\"c\nd".into(),
            group: "<G>\t\r".into(),
            active: true,
        });
        let again = parse(&doc.to_xml()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn control_characters_are_not_xml_safe() {
        assert!(is_xml_safe("adde.ucar.edu"));
        assert!(is_xml_safe("tab\there\nand\rthere"));
        assert!(!is_xml_safe("bad\u{1}"));
        assert!(!is_xml_safe("\u{0}"));
        assert!(!is_xml_safe("x\u{ffff}"));
    }

    #[test]
    fn clear_keeps_sections() {
        let mut doc = parse(SAMPLE).unwrap();
        doc.clear_servers();
        assert_eq!(doc.types.len(), 2);
        assert!(doc.types.iter().all(|t| t.servers.is_empty()));
    }
}

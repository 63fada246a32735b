// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! KV backend configuration: which backend, and its connection parameters,
//! (de)serializable from a small XML-shaped document.
//!
//! `#[must_use]` builder methods over a `Default`-derived struct, one
//! constructor per backend kind, rather than a generic parser pulled in
//! from a full XML crate — the grammar here is a single attribute-only
//! root element plus one attribute-only child, not general-purpose markup.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Which concrete backend a [`DatabaseConf`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process on-disk B-tree
    TokyoCabinet,
    /// Remote cache server
    KyotoTycoon,
    /// Relational table
    MySql,
}

impl BackendKind {
    fn tag(self) -> &'static str {
        match self {
            Self::TokyoCabinet => "tokyo_cabinet",
            Self::KyotoTycoon => "kyoto_tycoon",
            Self::MySql => "mysql",
        }
    }

    fn parse_tag(tag: &str) -> Result<Self> {
        match tag {
            "tokyo_cabinet" => Ok(Self::TokyoCabinet),
            "kyoto_tycoon" => Ok(Self::KyotoTycoon),
            "mysql" => Ok(Self::MySql),
            other => Err(Error::ConfigInvalid(format!("unknown backend type {other:?}"))),
        }
    }
}

/// Connection parameters for one KV backend.
///
/// Every field is backend-specific; only the fields relevant to
/// [`DatabaseConf::kind`] are meaningful.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConf {
    kind: Option<BackendKind>,
    database_dir: Option<String>,
    database_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    timeout: Option<i64>,
    max_record_size: Option<i64>,
    max_bulk_set_size: Option<i64>,
    max_bulk_set_num_records: Option<i64>,
    user: Option<String>,
    password: Option<String>,
    table_name: Option<String>,
}

impl DatabaseConf {
    /// Builds a configuration for the embedded Tokyo-Cabinet-like backend.
    #[must_use]
    pub fn tokyo_cabinet(database_dir: impl Into<String>) -> Self {
        Self {
            kind: Some(BackendKind::TokyoCabinet),
            database_dir: Some(database_dir.into()),
            ..Default::default()
        }
    }

    /// Builds a configuration for the remote Kyoto-Tycoon-like backend.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn kyoto_tycoon(
        host: impl Into<String>,
        port: u16,
        timeout: i64,
        max_record_size: i64,
        max_bulk_set_size: i64,
        max_bulk_set_num_records: i64,
        database_dir: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(BackendKind::KyotoTycoon),
            host: Some(host.into()),
            port: Some(port),
            timeout: Some(timeout),
            max_record_size: Some(max_record_size),
            max_bulk_set_size: Some(max_bulk_set_size),
            max_bulk_set_num_records: Some(max_bulk_set_num_records),
            database_dir: Some(database_dir.into()),
            database_name: Some(database_name.into()),
            ..Default::default()
        }
    }

    /// Builds a configuration for the MySQL-backed relational backend.
    /// `password` may be empty for no password; `port` of `0` means the
    /// backend's default port.
    #[must_use]
    pub fn mysql(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(BackendKind::MySql),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
            database_name: Some(database_name.into()),
            table_name: Some(table_name.into()),
            ..Default::default()
        }
    }

    /// The backend kind this configuration targets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if no kind was set (only
    /// reachable by constructing a bare `DatabaseConf::default()`).
    pub fn kind(&self) -> Result<BackendKind> {
        self.kind.ok_or_else(|| Error::ConfigInvalid("no backend type set".to_string()))
    }

    /// `database_dir` attribute.
    pub fn database_dir(&self) -> Result<&str> {
        self.database_dir.as_deref().ok_or_else(missing("database_dir"))
    }

    /// `database_name` attribute.
    pub fn database_name(&self) -> Result<&str> {
        self.database_name.as_deref().ok_or_else(missing("database_name"))
    }

    /// `host` attribute.
    pub fn host(&self) -> Result<&str> {
        self.host.as_deref().ok_or_else(missing("host"))
    }

    /// `port` attribute.
    pub fn port(&self) -> Result<u16> {
        self.port.ok_or_else(missing("port"))
    }

    /// `timeout` attribute, in milliseconds.
    pub fn timeout(&self) -> Result<i64> {
        self.timeout.ok_or_else(missing("timeout"))
    }

    /// `max_record_size` attribute.
    pub fn max_record_size(&self) -> Result<i64> {
        self.max_record_size.ok_or_else(missing("max_record_size"))
    }

    /// `max_bulk_set_size` attribute.
    pub fn max_bulk_set_size(&self) -> Result<i64> {
        self.max_bulk_set_size.ok_or_else(missing("max_bulk_set_size"))
    }

    /// `max_bulk_set_num_records` attribute.
    pub fn max_bulk_set_num_records(&self) -> Result<i64> {
        self.max_bulk_set_num_records.ok_or_else(missing("max_bulk_set_num_records"))
    }

    /// `user` attribute.
    pub fn user(&self) -> Result<&str> {
        self.user.as_deref().ok_or_else(missing("user"))
    }

    /// `password` attribute (empty string if unset).
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// `table_name` attribute.
    pub fn table_name(&self) -> Result<&str> {
        self.table_name.as_deref().ok_or_else(missing("table_name"))
    }

    /// Parses a `<st_kv_database_conf type="...">` document: a root
    /// element with a `type` attribute and exactly one child element,
    /// named for that type, carrying connection parameters as
    /// attributes. Unknown attributes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the document is malformed, the
    /// `type` is unrecognized, or a required attribute for that type is
    /// missing.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = parse_element(xml, 0)?.0;
        if root.tag != "st_kv_database_conf" {
            return Err(Error::ConfigInvalid(format!(
                "expected <st_kv_database_conf>, found <{}>",
                root.tag
            )));
        }
        let type_attr = root
            .attrs
            .get("type")
            .ok_or_else(|| Error::ConfigInvalid("missing type attribute".to_string()))?;
        let kind = BackendKind::parse_tag(type_attr)?;
        let child = root
            .children
            .iter()
            .find(|c| c.tag == kind.tag())
            .ok_or_else(|| Error::ConfigInvalid(format!("missing <{}> child element", kind.tag())))?;

        let attr = |name: &str| child.attrs.get(name).cloned();
        let int_attr = |name: &str| -> Result<Option<i64>> {
            match attr(name) {
                Some(v) => v
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| Error::ConfigInvalid(format!("{name} must be an integer, got {v:?}"))),
                None => Ok(None),
            }
        };

        let conf = match kind {
            BackendKind::TokyoCabinet => Self {
                kind: Some(kind),
                database_dir: Some(
                    attr("database_dir").ok_or_else(|| Error::ConfigInvalid("missing database_dir".to_string()))?,
                ),
                ..Default::default()
            },
            BackendKind::KyotoTycoon => Self {
                kind: Some(kind),
                host: Some(attr("host").ok_or_else(|| Error::ConfigInvalid("missing host".to_string()))?),
                port: int_attr("port")?.map(|p| p as u16),
                timeout: int_attr("timeout")?,
                database_dir: Some(
                    attr("database_dir").ok_or_else(|| Error::ConfigInvalid("missing database_dir".to_string()))?,
                ),
                database_name: Some(
                    attr("database_name").ok_or_else(|| Error::ConfigInvalid("missing database_name".to_string()))?,
                ),
                max_record_size: int_attr("max_record_size")?,
                max_bulk_set_size: int_attr("max_bulk_set_size")?,
                max_bulk_set_num_records: int_attr("max_bulk_set_num_records")?,
                ..Default::default()
            },
            BackendKind::MySql => Self {
                kind: Some(kind),
                host: Some(attr("host").ok_or_else(|| Error::ConfigInvalid("missing host".to_string()))?),
                port: int_attr("port")?.map(|p| p as u16),
                user: Some(attr("user").ok_or_else(|| Error::ConfigInvalid("missing user".to_string()))?),
                password: Some(attr("password").unwrap_or_default()),
                database_name: Some(
                    attr("database_name").ok_or_else(|| Error::ConfigInvalid("missing database_name".to_string()))?,
                ),
                table_name: Some(
                    attr("table_name").ok_or_else(|| Error::ConfigInvalid("missing table_name".to_string()))?,
                ),
                ..Default::default()
            },
        };
        Ok(conf)
    }

    /// Serializes back to the `<st_kv_database_conf>` document shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if no backend kind was set.
    pub fn to_xml(&self) -> Result<String> {
        let kind = self.kind()?;
        let mut attrs = Vec::new();
        match kind {
            BackendKind::TokyoCabinet => {
                attrs.push(("database_dir", self.database_dir.clone().unwrap_or_default()));
            }
            BackendKind::KyotoTycoon => {
                attrs.push(("host", self.host.clone().unwrap_or_default()));
                if let Some(port) = self.port {
                    attrs.push(("port", port.to_string()));
                }
                if let Some(timeout) = self.timeout {
                    attrs.push(("timeout", timeout.to_string()));
                }
                attrs.push(("database_dir", self.database_dir.clone().unwrap_or_default()));
                attrs.push(("database_name", self.database_name.clone().unwrap_or_default()));
                if let Some(v) = self.max_record_size {
                    attrs.push(("max_record_size", v.to_string()));
                }
                if let Some(v) = self.max_bulk_set_size {
                    attrs.push(("max_bulk_set_size", v.to_string()));
                }
                if let Some(v) = self.max_bulk_set_num_records {
                    attrs.push(("max_bulk_set_num_records", v.to_string()));
                }
            }
            BackendKind::MySql => {
                attrs.push(("host", self.host.clone().unwrap_or_default()));
                if let Some(port) = self.port {
                    attrs.push(("port", port.to_string()));
                }
                attrs.push(("user", self.user.clone().unwrap_or_default()));
                attrs.push(("password", self.password.clone().unwrap_or_default()));
                attrs.push(("database_name", self.database_name.clone().unwrap_or_default()));
                attrs.push(("table_name", self.table_name.clone().unwrap_or_default()));
            }
        }
        let attr_str: String = attrs.iter().map(|(k, v)| format!(" {k}=\"{v}\"")).collect();
        Ok(format!(
            "<st_kv_database_conf type=\"{}\"><{}{}/></st_kv_database_conf>",
            kind.tag(),
            kind.tag(),
            attr_str
        ))
    }
}

fn missing(name: &'static str) -> impl FnOnce() -> Error {
    move || Error::ConfigInvalid(format!("missing {name}"))
}

struct Element {
    tag: String,
    attrs: HashMap<String, String>,
    children: Vec<Element>,
}

/// A tiny attribute-only XML subset reader: `<tag attr="val" ...>` with
/// either `/>` self-closing or nested children and a matching `</tag>`.
/// No text nodes, namespaces, comments, or entity decoding are needed for
/// this grammar.
fn parse_element(s: &str, mut pos: usize) -> Result<(Element, usize)> {
    let bytes = s.as_bytes();
    let skip_ws = |p: &mut usize| {
        while *p < bytes.len() && bytes[*p].is_ascii_whitespace() {
            *p += 1;
        }
    };
    skip_ws(&mut pos);
    if bytes.get(pos) != Some(&b'<') {
        return Err(Error::ConfigInvalid("expected '<'".to_string()));
    }
    pos += 1;
    let tag_start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' && bytes[pos] != b'/' {
        pos += 1;
    }
    let tag = s[tag_start..pos].to_string();
    let mut attrs = HashMap::new();
    loop {
        skip_ws(&mut pos);
        match bytes.get(pos) {
            Some(b'/') => {
                pos += 1;
                if bytes.get(pos) != Some(&b'>') {
                    return Err(Error::ConfigInvalid("expected '/>'".to_string()));
                }
                return Ok((
                    Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                    pos + 1,
                ));
            }
            Some(b'>') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let name_start = pos;
                while pos < bytes.len() && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                let name = s[name_start..pos].to_string();
                skip_ws(&mut pos);
                if bytes.get(pos) != Some(&b'=') {
                    return Err(Error::ConfigInvalid(format!("expected '=' after attribute {name}")));
                }
                pos += 1;
                skip_ws(&mut pos);
                let quote = *bytes.get(pos).ok_or_else(|| Error::ConfigInvalid("unexpected end of input".to_string()))?;
                if quote != b'"' && quote != b'\'' {
                    return Err(Error::ConfigInvalid("expected quoted attribute value".to_string()));
                }
                pos += 1;
                let val_start = pos;
                while pos < bytes.len() && bytes[pos] != quote {
                    pos += 1;
                }
                let value = s[val_start..pos].to_string();
                pos += 1;
                attrs.insert(name, value);
            }
            None => return Err(Error::ConfigInvalid("unexpected end of input".to_string())),
        }
    }

    let mut children = Vec::new();
    loop {
        skip_ws(&mut pos);
        if bytes.get(pos) == Some(&b'<') && bytes.get(pos + 1) == Some(&b'/') {
            pos += 2;
            let close_start = pos;
            while pos < bytes.len() && bytes[pos] != b'>' {
                pos += 1;
            }
            if s[close_start..pos] != tag {
                return Err(Error::ConfigInvalid(format!("mismatched closing tag for <{tag}>")));
            }
            pos += 1;
            break;
        }
        let (child, next) = parse_element(s, pos)?;
        children.push(child);
        pos = next;
    }

    Ok((Element { tag, attrs, children }, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokyo_cabinet_round_trip() {
        let conf = DatabaseConf::tokyo_cabinet("/tmp/db");
        let xml = conf.to_xml().unwrap();
        let parsed = DatabaseConf::from_xml(&xml).unwrap();
        assert_eq!(parsed.kind().unwrap(), BackendKind::TokyoCabinet);
        assert_eq!(parsed.database_dir().unwrap(), "/tmp/db");
    }

    #[test]
    fn kyoto_tycoon_round_trip() {
        let conf = DatabaseConf::kyoto_tycoon("cache.example.org", 1978, 5000, 1 << 20, 1 << 16, 128, "/tmp/kt", "phylo");
        let xml = conf.to_xml().unwrap();
        let parsed = DatabaseConf::from_xml(&xml).unwrap();
        assert_eq!(parsed.host().unwrap(), "cache.example.org");
        assert_eq!(parsed.port().unwrap(), 1978);
        assert_eq!(parsed.max_record_size().unwrap(), 1 << 20);
    }

    #[test]
    fn unknown_type_is_config_invalid() {
        let xml = r#"<st_kv_database_conf type="mongo"><mongo/></st_kv_database_conf>"#;
        assert!(matches!(DatabaseConf::from_xml(xml), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn missing_required_attribute_is_config_invalid() {
        let xml = r#"<st_kv_database_conf type="tokyo_cabinet"><tokyo_cabinet/></st_kv_database_conf>"#;
        assert!(matches!(DatabaseConf::from_xml(xml), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn mysql_password_defaults_to_empty() {
        let xml = r#"<st_kv_database_conf type="mysql"><mysql host="h" user="u" database_name="d" table_name="t"/></st_kv_database_conf>"#;
        let conf = DatabaseConf::from_xml(xml).unwrap();
        assert_eq!(conf.password(), "");
    }
}

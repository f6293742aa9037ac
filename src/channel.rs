use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TemplateResult;
use crate::value::Value;

pub const SUPPORTED_DATA_TYPES: [&str; 4] = ["float", "int", "boolean", "string"];
pub const SUPPORTED_POINT_FORMATS: [&str; 2] = ["json", "url"];
pub const MAX_TAGS: usize = 255;
pub const MAX_FIELDS: usize = 255;

/// A device channel: the tags sent in the upload URL and the typed fields
/// sent in the JSON body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: Fields,
}

/// Field name to type name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIssue {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ChannelIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Channel {
    pub fn from_json(source: &str) -> TemplateResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> TemplateResult<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    /// Template context: `.Name`, `.Description`, `.Format`, `.Tags`, `.Fields`.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("Name", Value::from(&self.name)),
            ("Description", Value::from(&self.description)),
            ("Format", Value::from(&self.format)),
            ("Tags", Value::list(&self.tags)),
            (
                "Fields",
                Value::map(
                    self.fields
                        .iter()
                        .map(|(name, kind)| (name, Value::from(kind))),
                ),
            ),
        ])
    }

    /// Every problem with the channel definition; empty when valid.
    pub fn validate(&self) -> Vec<ChannelIssue> {
        let mut issues = Vec::new();
        let mut report = |field: &'static str, message: String| {
            issues.push(ChannelIssue { field, message });
        };

        if self.name.is_empty() {
            report("name", "empty channel name".to_string());
        }
        if self.description.is_empty() {
            report("description", "empty channel description".to_string());
        }
        if self.format.is_empty() {
            report("format", "empty channel format".to_string());
        } else if !SUPPORTED_POINT_FORMATS.contains(&self.format.as_str()) {
            report(
                "format",
                format!(
                    "unsupported point format {}, supported formats are {}",
                    self.format,
                    SUPPORTED_POINT_FORMATS.join(",")
                ),
            );
        }

        if self.tags.len() > MAX_TAGS {
            report("tags", format!("too many tags, max {} supported", MAX_TAGS));
        }
        for tag in &self.tags {
            if self.fields.get(tag).is_some() {
                report(
                    "tags",
                    format!("conflicting tag name: {} defined in fields too", tag),
                );
            }
        }

        if self.fields.is_empty() || self.fields.len() > MAX_FIELDS {
            report(
                "fields",
                format!(
                    "the number of fields must be between 1 ~ {} instead of {}",
                    MAX_FIELDS,
                    self.fields.len()
                ),
            );
        }
        for (name, kind) in self.fields.iter() {
            if !SUPPORTED_DATA_TYPES.contains(&kind) {
                report(
                    "fields",
                    format!(
                        "unsupported datatype on {}: {}, supported datatypes are {}",
                        name,
                        kind,
                        SUPPORTED_DATA_TYPES.join(",")
                    ),
                );
            }
        }

        issues
    }
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the type of an existing field in place, otherwise appends.
    pub fn insert(&mut self, name: impl Into<String>, kind: impl Into<String>) {
        let name = name.into();
        let kind = kind.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = kind,
            None => self.0.push((name, kind)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, kind)| kind.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, kind)| (name.as_str(), kind.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (name, kind) in iter {
            fields.insert(name, kind);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, kind) in self.iter() {
            map.serialize_entry(name, kind)?;
        }
        map.end()
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field names to type names")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
        let mut fields = Fields::new();
        while let Some((name, kind)) = access.next_entry::<String, String>()? {
            fields.insert(name, kind);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

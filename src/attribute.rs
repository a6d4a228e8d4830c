//! Attribute metadata, the lookup collaborator and the per-compilation memo.

use crate::operator::InputType;
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Storage shape of an attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    /// Free text or numbers.
    #[default]
    Scalar,
    /// Single option, stored as an integer code.
    Coded,
    /// Several options, stored as a delimited string of codes.
    MultiValueSet,
    Date,
    /// Yes/no option, stored as an integer code.
    Boolean,
}

impl ValueType {
    /// Coded values are coerced to integers during normalization.
    pub const fn is_coded(self) -> bool {
        matches!(
            self,
            ValueType::Coded | ValueType::MultiValueSet | ValueType::Boolean
        )
    }

    pub const fn input_type(self) -> InputType {
        match self {
            ValueType::Scalar => InputType::String,
            ValueType::Coded => InputType::Select,
            ValueType::MultiValueSet => InputType::Multiselect,
            ValueType::Date => InputType::Date,
            ValueType::Boolean => InputType::Boolean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub value: Scalar,
    pub label: String,
}

impl AttributeOption {
    pub fn new(value: impl Into<Scalar>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

fn default_exists() -> bool {
    true
}

/// Delimiter of stored multi-value sets unless the attribute says otherwise.
pub const DEFAULT_STORAGE_DELIMITER: &str = ",";

fn default_delimiter() -> String {
    DEFAULT_STORAGE_DELIMITER.to_string()
}

/// What the metadata collaborator knows about one attribute code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMeta {
    #[serde(default = "default_exists")]
    pub exists: bool,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default = "default_delimiter")]
    pub storage_delimiter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<AttributeOption>,
}

impl AttributeMeta {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            exists: true,
            value_type,
            storage_delimiter: default_delimiter(),
            label: None,
            options: Vec::new(),
        }
    }

    /// Metadata for a code the collaborator does not know.
    pub fn missing() -> Self {
        Self {
            exists: false,
            ..Self::new(ValueType::Scalar)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_options(mut self, options: Vec<AttributeOption>) -> Self {
        self.options = options;
        self
    }

    /// Label of the option whose value matches, compared as text.
    pub fn option_label(&self, value: &Scalar) -> Option<&str> {
        let wanted = value.as_text();
        self.options
            .iter()
            .find(|option| option.value.as_text() == wanted)
            .map(|option| option.label.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("attribute metadata for `{code}` is unavailable: {reason}")]
    Unavailable { code: String, reason: String },
}

/// Attribute metadata collaborator.
///
/// Takes `&self` so one lookup can serve concurrent compilations; any
/// internal caching is the implementor's business.
pub trait AttributeLookup {
    fn resolve(&self, code: &str) -> Result<AttributeMeta, LookupError>;
}

impl<T: AttributeLookup + ?Sized> AttributeLookup for &T {
    fn resolve(&self, code: &str) -> Result<AttributeMeta, LookupError> {
        (**self).resolve(code)
    }
}

impl AttributeLookup for HashMap<String, AttributeMeta> {
    fn resolve(&self, code: &str) -> Result<AttributeMeta, LookupError> {
        Ok(self.get(code).cloned().unwrap_or_else(AttributeMeta::missing))
    }
}

/// Static attribute catalog, usually loaded from the JSON config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeCatalog {
    attributes: HashMap<String, AttributeMeta>,
}

impl AttributeCatalog {
    pub fn new(attributes: HashMap<String, AttributeMeta>) -> Self {
        Self { attributes }
    }

    pub fn insert(&mut self, code: impl Into<String>, meta: AttributeMeta) {
        self.attributes.insert(code.into(), meta);
    }

    pub fn get(&self, code: &str) -> Option<&AttributeMeta> {
        self.attributes.get(code)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute codes in sorted order, for the condition dropdown.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<_> = self.attributes.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

impl AttributeLookup for AttributeCatalog {
    fn resolve(&self, code: &str) -> Result<AttributeMeta, LookupError> {
        self.attributes.resolve(code)
    }
}

/// Memo of resolved metadata, scoped to a single compilation.
///
/// Each distinct code hits the collaborator at most once; failures and
/// unknown codes are remembered as `None`.
pub struct MetadataCache<'a, L: ?Sized> {
    lookup: &'a L,
    resolved: HashMap<String, Option<AttributeMeta>>,
}

impl<'a, L: AttributeLookup + ?Sized> MetadataCache<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self {
            lookup,
            resolved: HashMap::new(),
        }
    }

    pub fn get(&mut self, code: &str) -> Option<&AttributeMeta> {
        if !self.resolved.contains_key(code) {
            let meta = match self.lookup.resolve(code) {
                Ok(meta) if meta.exists => Some(meta),
                Ok(_) => {
                    debug!(target: "condition_compiler::attribute", code, "unknown attribute");
                    None
                }
                Err(err) => {
                    debug!(target: "condition_compiler::attribute", code, error = %err, "attribute lookup failed");
                    None
                }
            };
            self.resolved.insert(code.to_string(), meta);
        }
        self.resolved.get(code).and_then(Option::as_ref)
    }

    /// Number of distinct codes looked up so far.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingLookup {
        calls: Cell<usize>,
    }

    impl AttributeLookup for CountingLookup {
        fn resolve(&self, code: &str) -> Result<AttributeMeta, LookupError> {
            self.calls.set(self.calls.get() + 1);
            match code {
                "color" => Ok(AttributeMeta::new(ValueType::MultiValueSet)),
                "broken" => Err(LookupError::Unavailable {
                    code: code.to_string(),
                    reason: "timeout".to_string(),
                }),
                _ => Ok(AttributeMeta::missing()),
            }
        }
    }

    #[test]
    fn test_cache_memoizes_each_code_once() {
        let lookup = CountingLookup { calls: Cell::new(0) };
        let mut cache = MetadataCache::new(&lookup);

        assert!(cache.get("color").is_some());
        assert!(cache.get("color").is_some());
        assert!(cache.get("ghost").is_none());
        assert!(cache.get("ghost").is_none());
        assert!(cache.get("broken").is_none());
        assert!(cache.get("broken").is_none());

        assert_eq!(lookup.calls.get(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_catalog_unknown_code_is_missing() {
        let mut catalog = AttributeCatalog::default();
        catalog.insert("status", AttributeMeta::new(ValueType::Coded));

        assert!(catalog.resolve("status").unwrap().exists);
        assert!(!catalog.resolve("nope").unwrap().exists);
        assert_eq!(catalog.codes(), vec!["status"]);
    }

    #[test]
    fn test_meta_deserialize_defaults() {
        let meta: AttributeMeta =
            serde_json::from_str(r#"{"valueType": "multiValueSet"}"#).unwrap();
        assert!(meta.exists);
        assert_eq!(meta.value_type, ValueType::MultiValueSet);
        assert_eq!(meta.storage_delimiter, ",");
        assert!(meta.options.is_empty());
    }

    #[test]
    fn test_option_label_compares_as_text() {
        let meta = AttributeMeta::new(ValueType::Coded).with_options(vec![
            AttributeOption::new(12, "Red"),
            AttributeOption::new(13, "Blue"),
        ]);
        assert_eq!(meta.option_label(&Scalar::from("13")), Some("Blue"));
        assert_eq!(meta.option_label(&Scalar::Int(99)), None);
    }
}

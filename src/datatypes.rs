use std::collections::BTreeSet;

/// Structural node with no value of its own.
pub const DATATYPE_SEMANTIC: &str = "semantic";
pub const DATATYPE_STRING: &str = "string";
pub const DATATYPE_NUMBER: &str = "number";
pub const DATATYPE_DATE: &str = "date";
pub const DATATYPE_BOOLEAN: &str = "boolean";
pub const DATATYPE_GEOJSON: &str = "geojson-feature-collection";
pub const DATATYPE_CONCEPT: &str = "concept";
pub const DATATYPE_CONCEPT_LIST: &str = "concept-list";
pub const DATATYPE_DOMAIN_VALUE: &str = "domain-value";
pub const DATATYPE_DOMAIN_VALUE_LIST: &str = "domain-value-list";
pub const DATATYPE_FILE_LIST: &str = "file-list";
/// Reference to another resource instance.
pub const DATATYPE_RESOURCE_INSTANCE: &str = "resource-instance";

pub const BUILTIN_DATATYPES: &[&str] = &[
    DATATYPE_SEMANTIC,
    DATATYPE_STRING,
    DATATYPE_NUMBER,
    DATATYPE_DATE,
    DATATYPE_BOOLEAN,
    DATATYPE_GEOJSON,
    DATATYPE_CONCEPT,
    DATATYPE_CONCEPT_LIST,
    DATATYPE_DOMAIN_VALUE,
    DATATYPE_DOMAIN_VALUE_LIST,
    DATATYPE_FILE_LIST,
    DATATYPE_RESOURCE_INSTANCE,
];

/// Known node datatype tags. Tags are opaque to the engine; the registry
/// only lets callers enumerate them and flag unfamiliar ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatatypeRegistry {
    tags: BTreeSet<String>,
}

impl Default for DatatypeRegistry {
    fn default() -> Self {
        Self::new(BUILTIN_DATATYPES.iter().copied())
    }
}

impl DatatypeRegistry {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(Into::into)
                .map(|tag: String| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }

    pub fn register(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into().trim().to_string();
        !tag.is_empty() && self.tags.insert(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag.trim())
    }

    /// Tags in lexical order.
    pub fn tags(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_builtin_tags() {
        let registry = DatatypeRegistry::default();
        for tag in BUILTIN_DATATYPES {
            assert!(registry.contains(tag), "missing {tag}");
        }
        assert!(!registry.contains("edtf"));
        assert_eq!(registry.tags().len(), BUILTIN_DATATYPES.len());
    }

    #[test]
    fn register_trims_and_rejects_blank_or_duplicate_tags() {
        let mut registry = DatatypeRegistry::new(Vec::<String>::new());
        assert!(registry.register(" edtf "));
        assert!(!registry.register("edtf"));
        assert!(!registry.register("   "));
        assert_eq!(registry.tags(), vec!["edtf".to_string()]);
    }
}

//! Projected-property check: which declared structural properties an entry body carries.

use super::{EntityType, MetadataDocument};
use serde_json::{Map, Value};

/// Declared properties of an entity type as observed in one entry body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedProperties {
    /// Declared structural properties present in the body, in body order.
    pub present: Vec<String>,
    /// Declared structural properties absent from the body.
    pub missing: Vec<String>,
    /// Body members that are neither annotations nor declared properties.
    pub undeclared: Vec<String>,
}

impl ProjectedProperties {
    pub fn declared_count(&self) -> usize {
        self.present.len() + self.missing.len()
    }

    /// The body carries a strict subset of the declared properties.
    pub fn is_projected(&self) -> bool {
        !self.missing.is_empty() && !self.present.is_empty()
    }

    /// A single-property body checked against a type declaring more than one property.
    pub fn is_single_property_projection(&self) -> bool {
        self.present.len() == 1 && self.declared_count() > 1
    }
}

/// True for JSON annotation members (`@odata.*`, `odata.*`, `prop@annotation`, `__metadata`).
pub fn is_annotation_member(name: &str) -> bool {
    name.starts_with('@') || name.starts_with("odata.") || name.contains('@') || name == "__metadata"
}

pub fn projected_properties(
    body: &Map<String, Value>,
    entity_type: &EntityType,
    metadata: &MetadataDocument,
) -> ProjectedProperties {
    let declared = metadata.all_properties(entity_type);
    let navigation = metadata.all_navigation_properties(entity_type);

    let mut present = Vec::new();
    let mut undeclared = Vec::new();
    for key in body.keys().filter(|k| !is_annotation_member(k)) {
        match declared.iter().find(|p| p.name.eq_ignore_ascii_case(key)) {
            Some(p) => present.push(p.name.clone()),
            None if navigation.iter().any(|n| n.name.eq_ignore_ascii_case(key)) => {}
            None => undeclared.push(key.clone()),
        }
    }

    let missing = declared
        .iter()
        .filter(|p| !present.iter().any(|name| name == &p.name))
        .map(|p| p.name.clone())
        .collect();

    ProjectedProperties {
        present,
        missing,
        undeclared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::V4_METADATA;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_full_entry_is_not_projected() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        let et = md.entity_type_of("Products").unwrap();
        let b = body(json!({
            "@odata.etag": "W/\"1\"",
            "ID": 1, "Name": "Widget", "Tags": [], "Address": null,
            "Category@odata.navigationLink": "Products(1)/Category"
        }));
        let p = projected_properties(&b, et, &md);
        assert!(!p.is_projected());
        assert_eq!(p.declared_count(), 4);
        assert!(p.undeclared.is_empty());
    }

    #[test]
    fn test_single_property_projection() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        let et = md.entity_type_of("Products").unwrap();
        let p = projected_properties(&body(json!({"name": "Widget", "Extra": 1})), et, &md);
        assert!(p.is_projected());
        assert!(p.is_single_property_projection());
        assert_eq!(p.present, vec!["Name".to_string()]);
        assert_eq!(p.undeclared, vec!["Extra".to_string()]);
    }
}

//! 元数据访问层：解析 CSDL 元数据文档并提供实体集、属性和复杂类型查询。
//!
//! # Metadata Document Accessor
//!
//! Parses a CSDL (`$metadata`) document once into an owned model and answers the lookups the
//! classifier and the rules need:
//!
//! - entity-set / singleton name → declared entity type
//! - entity type → structural properties (including inherited ones) and navigation properties
//! - complex-type definitions
//!
//! All name lookups are case-insensitive. Versions 1.0 through 4.0 of CSDL are accepted: the
//! parser reads elements by local name and ignores namespaces.

pub mod projection;

pub use projection::{projected_properties, ProjectedProperties};

use crate::{Error, Result};
use roxmltree::{Document, Node};

/// A structural property declared on an entity or complex type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

impl Property {
    /// The type with any `Collection(...)` wrapper removed.
    pub fn element_type(&self) -> &str {
        unwrap_collection(&self.type_name)
    }

    pub fn is_collection(&self) -> bool {
        self.type_name.starts_with("Collection(")
    }

    /// True for `Edm.*` types and collections of them.
    pub fn is_primitive(&self) -> bool {
        self.element_type().starts_with("Edm.")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationProperty {
    pub name: String,
    /// Declared target type (CSDL 4.0). V3 documents express the target through an
    /// association instead, so this is `None` there.
    pub type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EntityType {
    pub namespace: String,
    pub name: String,
    pub base_type: Option<String>,
    pub key: Vec<String>,
    pub properties: Vec<Property>,
    pub navigation_properties: Vec<NavigationProperty>,
    pub has_stream: bool,
    pub open_type: bool,
}

impl EntityType {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub namespace: String,
    pub name: String,
    pub base_type: Option<String>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Singleton {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityContainer {
    pub namespace: String,
    pub name: String,
    pub entity_sets: Vec<EntitySet>,
    pub singletons: Vec<Singleton>,
    pub function_imports: Vec<String>,
}

#[derive(Debug, Clone)]
struct SchemaAlias {
    namespace: String,
    alias: String,
}

/// Parsed metadata document.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    raw: String,
    edmx_version: Option<String>,
    aliases: Vec<SchemaAlias>,
    entity_types: Vec<EntityType>,
    complex_types: Vec<ComplexType>,
    enum_types: Vec<String>,
    containers: Vec<EntityContainer>,
}

/// Maximum base-type chain followed when flattening inherited members.
const MAX_INHERITANCE_DEPTH: usize = 32;

impl MetadataDocument {
    /// Parse a CSDL document. The root element must be `Edmx`.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml).map_err(|e| Error::Metadata(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "Edmx" {
            return Err(Error::Metadata(format!(
                "expected an Edmx root element, found '{}'",
                root.tag_name().name()
            )));
        }

        let mut out = MetadataDocument {
            raw: xml.to_string(),
            edmx_version: root.attribute("Version").map(str::to_string),
            aliases: Vec::new(),
            entity_types: Vec::new(),
            complex_types: Vec::new(),
            enum_types: Vec::new(),
            containers: Vec::new(),
        };

        for schema in root.descendants().filter(|n| is_element(n, "Schema")) {
            let namespace = schema.attribute("Namespace").unwrap_or_default().to_string();
            if let Some(alias) = schema.attribute("Alias") {
                out.aliases.push(SchemaAlias {
                    namespace: namespace.clone(),
                    alias: alias.to_string(),
                });
            }

            for child in schema.children().filter(Node::is_element) {
                match child.tag_name().name() {
                    "EntityType" => out.entity_types.push(parse_entity_type(&child, &namespace)),
                    "ComplexType" => out.complex_types.push(ComplexType {
                        namespace: namespace.clone(),
                        name: attr(&child, "Name"),
                        base_type: child.attribute("BaseType").map(str::to_string),
                        properties: parse_properties(&child),
                    }),
                    "EnumType" => out
                        .enum_types
                        .push(format!("{}.{}", namespace, attr(&child, "Name"))),
                    "EntityContainer" => {
                        out.containers.push(parse_container(&child, &namespace))
                    }
                    _ => {}
                }
            }
        }

        Ok(out)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `Version` attribute of the `Edmx` root ("1.0" for V1-V3 documents, "4.0" for V4).
    pub fn edmx_version(&self) -> Option<&str> {
        self.edmx_version.as_deref()
    }

    pub fn entity_types(&self) -> &[EntityType] {
        &self.entity_types
    }

    pub fn complex_types(&self) -> &[ComplexType] {
        &self.complex_types
    }

    pub fn containers(&self) -> &[EntityContainer] {
        &self.containers
    }

    /// Find a container by simple or namespace-qualified name.
    pub fn container(&self, name: &str) -> Option<&EntityContainer> {
        self.containers.iter().find(|c| {
            c.name.eq_ignore_ascii_case(name)
                || format!("{}.{}", c.namespace, c.name).eq_ignore_ascii_case(name)
        })
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.containers
            .iter()
            .flat_map(|c| c.entity_sets.iter())
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn singleton(&self, name: &str) -> Option<&Singleton> {
        self.containers
            .iter()
            .flat_map(|c| c.singletons.iter())
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// True when `name` is an entity set or a singleton.
    pub fn is_entity_set_or_singleton(&self, name: &str) -> bool {
        self.entity_set(name).is_some() || self.singleton(name).is_some()
    }

    /// Declared entity type behind an entity-set or singleton short name.
    pub fn entity_type_of(&self, set_or_singleton: &str) -> Option<&EntityType> {
        let type_name = self
            .entity_set(set_or_singleton)
            .map(|s| s.entity_type.as_str())
            .or_else(|| self.singleton(set_or_singleton).map(|s| s.entity_type.as_str()))?;
        self.entity_type(type_name)
    }

    /// Resolve an entity type by qualified name (namespace or alias prefix).
    pub fn entity_type(&self, qualified: &str) -> Option<&EntityType> {
        let (prefix, name) = split_qualified(qualified)?;
        self.entity_types.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name) && self.prefix_matches(&t.namespace, prefix)
        })
    }

    pub fn complex_type(&self, qualified: &str) -> Option<&ComplexType> {
        let (prefix, name) = split_qualified(unwrap_collection(qualified))?;
        self.complex_types.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name) && self.prefix_matches(&t.namespace, prefix)
        })
    }

    pub fn is_enum_type(&self, qualified: &str) -> bool {
        let Some((prefix, name)) = split_qualified(unwrap_collection(qualified)) else {
            return false;
        };
        self.enum_types.iter().any(|e| match split_qualified(e) {
            Some((ns, n)) => n.eq_ignore_ascii_case(name) && self.prefix_matches(ns, prefix),
            None => false,
        })
    }

    /// Structural properties of an entity type, base-type properties first.
    pub fn all_properties<'a>(&'a self, entity_type: &'a EntityType) -> Vec<&'a Property> {
        let mut chain = self.inheritance_chain(entity_type);
        chain.reverse();
        chain.into_iter().flat_map(|t| t.properties.iter()).collect()
    }

    /// Navigation properties of an entity type, base-type properties first.
    pub fn all_navigation_properties<'a>(
        &'a self,
        entity_type: &'a EntityType,
    ) -> Vec<&'a NavigationProperty> {
        let mut chain = self.inheritance_chain(entity_type);
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|t| t.navigation_properties.iter())
            .collect()
    }

    pub fn property<'a>(&'a self, entity_type: &'a EntityType, name: &str) -> Option<&'a Property> {
        self.all_properties(entity_type)
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// A "normal" property is a declared structural (non-navigation) property.
    pub fn is_normal_property(&self, entity_type: &EntityType, name: &str) -> bool {
        self.property(entity_type, name).is_some()
    }

    pub fn is_navigation_property(&self, entity_type: &EntityType, name: &str) -> bool {
        self.all_navigation_properties(entity_type)
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Whether any type in the chain declares `HasStream="true"`.
    pub fn has_stream(&self, entity_type: &EntityType) -> bool {
        self.inheritance_chain(entity_type).iter().any(|t| t.has_stream)
    }

    /// Whether a qualified type name denotes a primitive, complex or enum type (or a
    /// collection of one) rather than an entity type.
    pub fn is_primitive_or_complex_type(&self, qualified: &str) -> bool {
        let element = unwrap_collection(qualified);
        if element.starts_with("Edm.") {
            return true;
        }
        if self.complex_type(element).is_some() || self.is_enum_type(element) {
            return true;
        }
        self.entity_type(element).is_none()
    }

    fn inheritance_chain<'a>(&'a self, entity_type: &'a EntityType) -> Vec<&'a EntityType> {
        let mut chain = vec![entity_type];
        let mut current = entity_type;
        while let Some(base) = current.base_type.as_deref() {
            if chain.len() >= MAX_INHERITANCE_DEPTH {
                break;
            }
            match self.entity_type(base) {
                Some(next) if !chain.iter().any(|t| std::ptr::eq(*t, next)) => {
                    chain.push(next);
                    current = next;
                }
                _ => break,
            }
        }
        chain
    }

    fn prefix_matches(&self, namespace: &str, prefix: &str) -> bool {
        namespace.eq_ignore_ascii_case(prefix)
            || self.aliases.iter().any(|a| {
                a.alias.eq_ignore_ascii_case(prefix) && a.namespace.eq_ignore_ascii_case(namespace)
            })
    }
}

/// Strip a `Collection(...)` wrapper if present.
pub fn unwrap_collection(type_name: &str) -> &str {
    type_name
        .strip_prefix("Collection(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(type_name)
}

fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    qualified.rsplit_once('.')
}

fn is_element(node: &Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local
}

fn attr(node: &Node, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

fn parse_properties(node: &Node) -> Vec<Property> {
    node.children()
        .filter(|n| is_element(n, "Property"))
        .map(|p| Property {
            name: attr(&p, "Name"),
            type_name: attr(&p, "Type"),
            nullable: p.attribute("Nullable") != Some("false"),
        })
        .collect()
}

fn parse_entity_type(node: &Node, namespace: &str) -> EntityType {
    let key = node
        .children()
        .filter(|n| is_element(n, "Key"))
        .flat_map(|k| k.children().filter(|n| is_element(n, "PropertyRef")))
        .map(|r| attr(&r, "Name"))
        .collect();

    let navigation_properties = node
        .children()
        .filter(|n| is_element(n, "NavigationProperty"))
        .map(|n| NavigationProperty {
            name: attr(&n, "Name"),
            type_name: n.attribute("Type").map(str::to_string),
        })
        .collect();

    EntityType {
        namespace: namespace.to_string(),
        name: attr(node, "Name"),
        base_type: node.attribute("BaseType").map(str::to_string),
        key,
        properties: parse_properties(node),
        navigation_properties,
        has_stream: node.attribute("HasStream") == Some("true"),
        open_type: node.attribute("OpenType") == Some("true"),
    }
}

fn parse_container(node: &Node, namespace: &str) -> EntityContainer {
    let mut container = EntityContainer {
        namespace: namespace.to_string(),
        name: attr(node, "Name"),
        ..Default::default()
    };
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "EntitySet" => container.entity_sets.push(EntitySet {
                name: attr(&child, "Name"),
                entity_type: attr(&child, "EntityType"),
            }),
            "Singleton" => container.singletons.push(Singleton {
                name: attr(&child, "Name"),
                entity_type: attr(&child, "Type"),
            }),
            "FunctionImport" | "ActionImport" => {
                container.function_imports.push(attr(&child, "Name"))
            }
            _ => {}
        }
    }
    container
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const V4_METADATA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="ODataDemo" Alias="Self" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="Product" HasStream="false">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="Name" Type="Edm.String"/>
        <Property Name="Tags" Type="Collection(Edm.String)"/>
        <Property Name="Address" Type="Self.Address"/>
        <NavigationProperty Name="Category" Type="ODataDemo.Category"/>
      </EntityType>
      <EntityType Name="FeaturedProduct" BaseType="ODataDemo.Product">
        <Property Name="Rank" Type="Edm.Int32"/>
      </EntityType>
      <EntityType Name="Category">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
      </EntityType>
      <EntityType Name="Photo" HasStream="true">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
      </EntityType>
      <ComplexType Name="Address">
        <Property Name="Street" Type="Edm.String"/>
      </ComplexType>
      <EnumType Name="Color"><Member Name="Red"/></EnumType>
      <EntityContainer Name="DemoService">
        <EntitySet Name="Products" EntityType="ODataDemo.Product"/>
        <EntitySet Name="Categories" EntityType="ODataDemo.Category"/>
        <EntitySet Name="Photos" EntityType="ODataDemo.Photo"/>
        <Singleton Name="Me" Type="ODataDemo.FeaturedProduct"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn test_entity_set_lookup_is_case_insensitive() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        let et = md.entity_type_of("products").unwrap();
        assert_eq!(et.qualified_name(), "ODataDemo.Product");
        assert_eq!(et.key, vec!["ID".to_string()]);
        assert!(md.entity_type_of("Nope").is_none());
    }

    #[test]
    fn test_alias_qualified_complex_type() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        let et = md.entity_type_of("Products").unwrap();
        let address = md.property(et, "address").unwrap();
        assert!(!address.is_primitive());
        assert!(md.complex_type(&address.type_name).is_some());
    }

    #[test]
    fn test_singleton_inherits_base_properties() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        let et = md.entity_type_of("Me").unwrap();
        let names: Vec<_> = md.all_properties(et).iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["ID", "Name", "Tags", "Address", "Rank"]);
        assert!(md.is_navigation_property(et, "Category"));
        assert!(!md.is_normal_property(et, "Category"));
    }

    #[test]
    fn test_primitive_or_complex() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        assert!(md.is_primitive_or_complex_type("Edm.String"));
        assert!(md.is_primitive_or_complex_type("Collection(ODataDemo.Address)"));
        assert!(md.is_primitive_or_complex_type("ODataDemo.Color"));
        assert!(!md.is_primitive_or_complex_type("ODataDemo.Product"));
        assert!(!md.is_primitive_or_complex_type("Collection(ODataDemo.Product)"));
    }

    #[test]
    fn test_has_stream() {
        let md = MetadataDocument::parse(V4_METADATA).unwrap();
        assert!(md.has_stream(md.entity_type_of("Photos").unwrap()));
        assert!(!md.has_stream(md.entity_type_of("Products").unwrap()));
    }

    #[test]
    fn test_rejects_non_edmx() {
        assert!(MetadataDocument::parse("<service/>").is_err());
        assert!(MetadataDocument::parse("not xml").is_err());
    }
}

//! Nodes of the in-memory relationship network

use super::property::{PropertyMap, PropertyValue};
use super::records::Organization;
use super::types::{NodeId, NodeKey, NodeKind};
use crate::identity::Person;
use serde::{Deserialize, Serialize};

/// A node in the network view
///
/// Nodes carry:
/// - A dense id, valid only within the view that produced it
/// - The stable domain key (organization or person)
/// - A display label
/// - Export attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub key: NodeKey,
    pub label: String,
    pub properties: PropertyMap,
}

impl Node {
    pub fn organization(id: NodeId, org: &Organization) -> Self {
        let mut node = Node {
            id,
            key: NodeKey::Organization(org.id.clone()),
            label: org.name.clone(),
            properties: PropertyMap::new(),
        };
        if let Some(code) = &org.category_code {
            node.set_property("category_code", code.as_str());
        }
        if let Some(geo) = &org.geography {
            node.set_property("geography", geo.as_str());
        }
        if let Some(budget) = org.annual_budget {
            node.set_property("annual_budget", budget);
        }
        node
    }

    pub fn person(id: NodeId, person: &Person) -> Self {
        let mut node = Node {
            id,
            key: NodeKey::Person(person.id),
            label: person.name.display.clone(),
            properties: PropertyMap::new(),
        };
        node.set_property("confidence", person.confidence);
        node.set_property("source_count", person.source_count);
        if person.provisional {
            node.set_property("provisional", true);
        }
        node
    }

    pub fn kind(&self) -> NodeKind {
        self.key.kind()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

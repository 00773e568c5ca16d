//! Core type definitions for the relationship network

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dense identifier of a node in the in-memory network view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Dense identifier of an edge in the in-memory network view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        EdgeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl From<u64> for EdgeId {
    fn from(id: u64) -> Self {
        EdgeId(id)
    }
}

/// Stable external organization identifier (e.g. an EIN)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        OrgId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrgId {
    fn from(s: &str) -> Self {
        OrgId(s.to_string())
    }
}

impl From<String> for OrgId {
    fn from(s: String) -> Self {
        OrgId(s)
    }
}

/// Canonical person identifier assigned by the person registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct PersonId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Identifier of a stored Role row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RoleId(pub u64);

/// Unordered organization pair stored under canonical (lexicographic) ordering.
///
/// `OrgPair::new(a, b) == OrgPair::new(b, a)` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct OrgPair {
    low: OrgId,
    high: OrgId,
}

impl OrgPair {
    /// Returns `None` for a self pair.
    pub fn new(a: OrgId, b: OrgId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(OrgPair { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(OrgPair { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &OrgId {
        &self.low
    }

    pub fn high(&self) -> &OrgId {
        &self.high
    }

    pub fn contains(&self, org: &OrgId) -> bool {
        &self.low == org || &self.high == org
    }

    /// The member of the pair that is not `org`.
    pub fn other(&self, org: &OrgId) -> Option<&OrgId> {
        if &self.low == org {
            Some(&self.high)
        } else if &self.high == org {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for OrgPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.low, self.high)
    }
}

/// Domain key of a network node, independent of view-local dense ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeKey {
    Organization(OrgId),
    Person(PersonId),
}

impl NodeKey {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeKey::Organization(_) => NodeKind::Organization,
            NodeKey::Person(_) => NodeKind::Person,
        }
    }

    pub fn as_org(&self) -> Option<&OrgId> {
        match self {
            NodeKey::Organization(id) => Some(id),
            NodeKey::Person(_) => None,
        }
    }

    pub fn as_person(&self) -> Option<PersonId> {
        match self {
            NodeKey::Person(id) => Some(*id),
            NodeKey::Organization(_) => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Organization(id) => write!(f, "org:{}", id),
            NodeKey::Person(id) => write!(f, "person:{}", id.0),
        }
    }
}

impl FromStr for NodeKey {
    type Err = String;

    /// Parses `org:<id>` or `person:<n>`; a bare id is an organization
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("org", id)) if !id.is_empty() => Ok(NodeKey::Organization(OrgId::new(id))),
            Some(("person", n)) => n
                .parse()
                .map(|n| NodeKey::Person(PersonId(n)))
                .map_err(|_| format!("invalid person id {:?}", n)),
            Some((prefix, _)) if prefix == "org" || prefix == "person" => Err(format!("empty node id in {:?}", s)),
            _ if s.trim().is_empty() => Err("empty node key".to_string()),
            _ => Ok(NodeKey::Organization(OrgId::new(s.trim()))),
        }
    }
}

impl From<OrgId> for NodeKey {
    fn from(id: OrgId) -> Self {
        NodeKey::Organization(id)
    }
}

impl From<PersonId> for NodeKey {
    fn from(id: PersonId) -> Self {
        NodeKey::Person(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Organization,
    Person,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Organization => "organization",
            NodeKind::Person => "person",
        }
    }
}

/// Closed set of edge types in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Person -> Organization position
    Role,
    /// Funder -> Recipient grant relationship
    Grant,
    /// Derived Organization ~ Organization link through shared people
    Connection,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [EdgeKind::Role, EdgeKind::Grant, EdgeKind::Connection];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Role => "role",
            EdgeKind::Grant => "grant",
            EdgeKind::Connection => "connection",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position category of a Role, classified from the title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    BoardChair,
    Board,
    Executive,
    Staff,
    Advisory,
}

impl RoleKind {
    /// Classify a free-text title word by word. Chair titles win over everything,
    /// executive titles over generic board titles.
    pub fn classify(title: &str) -> Self {
        let lower = title.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |word: &str| words.contains(&word);
        let starts = |prefix: &str| words.iter().any(|w| w.starts_with(prefix));

        if starts("chair") || (has("president") && has("board")) {
            RoleKind::BoardChair
        } else if starts("advis") {
            RoleKind::Advisory
        } else if ["ceo", "cfo", "coo", "chief", "president", "treasurer", "secretary", "executive"]
            .iter()
            .any(|w| has(*w))
        {
            RoleKind::Executive
        } else if ["director", "trustee", "board", "governor"].iter().any(|w| has(*w)) {
            RoleKind::Board
        } else {
            RoleKind::Staff
        }
    }

    pub fn is_board(&self) -> bool {
        matches!(self, RoleKind::Board | RoleKind::BoardChair)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::BoardChair => "board chair",
            RoleKind::Board => "board member",
            RoleKind::Executive => "executive",
            RoleKind::Staff => "staff",
            RoleKind::Advisory => "advisor",
        }
    }
}

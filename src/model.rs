use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Declaration kind of a symbol. Only a handful of kinds drive the
/// resolution heuristics; everything else lands in `Other` with its tag kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Field,
    Property,
    Variable,
    Other(String),
}

impl SymbolKind {
    pub fn as_str(&self) -> &str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Field => "field",
            SymbolKind::Property => "property",
            SymbolKind::Variable => "variable",
            SymbolKind::Other(tag) => tag,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    pub fn is_member_storage(&self) -> bool {
        matches!(self, SymbolKind::Field | SymbolKind::Property)
    }
}

impl From<&str> for SymbolKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "function" | "fn" | "func" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "class" => SymbolKind::Class,
            "interface" | "trait" => SymbolKind::Interface,
            "struct" => SymbolKind::Struct,
            "enum" => SymbolKind::Enum,
            "field" => SymbolKind::Field,
            "property" => SymbolKind::Property,
            "variable" | "var" => SymbolKind::Variable,
            _ => SymbolKind::Other(s.to_string()),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SymbolKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SymbolKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SymbolKind::from(raw.as_str()))
    }
}

/// Usage kind of an identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Call,
    MemberAccess,
    Other(String),
}

impl IdentifierKind {
    pub fn as_str(&self) -> &str {
        match self {
            IdentifierKind::Call => "call",
            IdentifierKind::MemberAccess => "member_access",
            IdentifierKind::Other(tag) => tag,
        }
    }
}

impl From<&str> for IdentifierKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "call" => IdentifierKind::Call,
            "member_access" | "memberaccess" => IdentifierKind::MemberAccess,
            _ => IdentifierKind::Other(s.to_string()),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IdentifierKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IdentifierKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(IdentifierKind::from(raw.as_str()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
}

impl Symbol {
    /// Number of lines the declaration covers beyond its first line.
    pub fn line_span(&self) -> i64 {
        self.end_line.saturating_sub(self.start_line)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Identifier {
    pub id: i64,
    pub name: String,
    pub kind: IdentifierKind,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default)]
    pub containing_symbol_id: Option<i64>,
    #[serde(default)]
    pub target_symbol_id: Option<i64>,
}

/// An identifier paired with the symbol that contains it and the symbol it
/// most likely refers to.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub identifier: Identifier,
    pub containing_symbol: Option<Symbol>,
    pub target_symbol: Option<Symbol>,
}

impl ResolvedReference {
    pub fn is_resolved(&self) -> bool {
        self.target_symbol.is_some()
    }
}

impl Serialize for ResolvedReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ResolvedReference", 4)?;
        state.serialize_field("identifier", &self.identifier)?;
        state.serialize_field("containing_symbol", &self.containing_symbol)?;
        state.serialize_field("target_symbol", &self.target_symbol)?;
        state.serialize_field("is_resolved", &self.is_resolved())?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    /// Toward callers
    Upward,
    /// Toward callees
    Downward,
}

#[derive(Debug, Serialize, Clone)]
pub struct CallPathNode {
    pub identifier: Identifier,
    pub containing_symbol: Option<Symbol>,
    pub target_symbol: Option<Symbol>,
    pub depth: usize,
    pub direction: CallDirection,
    pub children: Vec<CallPathNode>,
    /// Heuristic matches are not weighted; always 1.0.
    pub confidence: f64,
    /// No type-aware matching is performed; always false.
    pub is_semantic_match: bool,
}

impl CallPathNode {
    pub fn new(
        identifier: Identifier,
        containing_symbol: Option<Symbol>,
        target_symbol: Option<Symbol>,
        depth: usize,
        direction: CallDirection,
    ) -> Self {
        Self {
            identifier,
            containing_symbol,
            target_symbol,
            depth,
            direction,
            children: Vec::new(),
            confidence: 1.0,
            is_semantic_match: false,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct BidirectionalCallPath {
    pub target_symbol: Symbol,
    pub callers: Vec<CallPathNode>,
    pub callees: Vec<CallPathNode>,
}

/// Payload accepted by `Db::import_workspace`.
#[derive(Debug, Deserialize, Default)]
pub struct IndexDocument {
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub workspace: String,
    pub symbols: i64,
    pub identifiers: i64,
    pub call_identifiers: i64,
    pub resolved_identifiers: i64,
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub total_nodes: usize,
    pub deepest: usize,
    pub unresolved: usize,
}

impl TraceSummary {
    pub fn from_nodes(nodes: &[CallPathNode]) -> Self {
        let mut summary = TraceSummary::default();
        summary.add(nodes);
        summary
    }

    pub fn add(&mut self, nodes: &[CallPathNode]) {
        for node in nodes {
            self.total_nodes += 1;
            self.deepest = self.deepest.max(node.depth);
            if node.target_symbol.is_none() && node.direction == CallDirection::Downward {
                self.unresolved += 1;
            }
            self.add(&node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(SymbolKind::from("Method"), SymbolKind::Method);
        assert_eq!(SymbolKind::from("PROPERTY"), SymbolKind::Property);
        assert_eq!(IdentifierKind::from("Call"), IdentifierKind::Call);
        assert_eq!(
            IdentifierKind::from("member_access"),
            IdentifierKind::MemberAccess
        );
    }

    #[test]
    fn unknown_kinds_keep_their_tag() {
        let kind = SymbolKind::from("namespace");
        assert_eq!(kind, SymbolKind::Other("namespace".to_string()));
        assert_eq!(kind.as_str(), "namespace");
        assert!(!kind.is_callable());

        let json = serde_json::to_string(&IdentifierKind::from("import")).unwrap();
        assert_eq!(json, "\"import\"");
    }

    #[test]
    fn resolved_reference_serializes_flag() {
        let reference = ResolvedReference {
            identifier: Identifier {
                id: 1,
                name: "Run".to_string(),
                kind: IdentifierKind::Call,
                file_path: "a.cs".to_string(),
                line: Some(4),
                containing_symbol_id: None,
                target_symbol_id: None,
            },
            containing_symbol: None,
            target_symbol: None,
        };
        let value = serde_json::to_value(&reference).unwrap();
        assert_eq!(value["is_resolved"], serde_json::json!(false));
        assert_eq!(value["identifier"]["kind"], serde_json::json!("call"));
    }

    #[test]
    fn summary_counts_nested_nodes() {
        let ident = Identifier {
            id: 1,
            name: "f".to_string(),
            kind: IdentifierKind::Call,
            file_path: "a.rs".to_string(),
            line: None,
            containing_symbol_id: None,
            target_symbol_id: None,
        };
        let mut root = CallPathNode::new(ident.clone(), None, None, 0, CallDirection::Downward);
        root.children
            .push(CallPathNode::new(ident, None, None, 1, CallDirection::Downward));
        let summary = TraceSummary::from_nodes(&[root]);
        assert_eq!(summary.total_nodes, 2);
        assert_eq!(summary.deepest, 1);
        assert_eq!(summary.unresolved, 2);
    }
}

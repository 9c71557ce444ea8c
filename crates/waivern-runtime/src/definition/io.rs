//! Input declarations for child runbooks.

use serde::{Deserialize, Serialize};
use waivern_core::SchemaId;

/// Declaration of an external input a child runbook expects.
///
/// The authoritative field name for the expected schema is `input_schema`;
/// the historical `schema` spelling is rejected by `deny_unknown_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct InputDeclaration {
    /// Schema the piped-in artifact must produce, when constrained.
    pub input_schema: Option<SchemaId>,
    /// Whether the parent may omit this input.
    pub optional: bool,
    /// Marks the payload as sensitive so downstream result formatting can
    /// redact it.
    pub sensitive: bool,
    /// What this input is for.
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_declaration() {
        let decl: InputDeclaration = serde_yaml::from_str("{}").expect("parse");
        assert!(decl.input_schema.is_none());
        assert!(!decl.optional);
        assert!(!decl.sensitive);
    }

    #[test]
    fn test_full_declaration() {
        let decl: InputDeclaration = serde_yaml::from_str(
            "input_schema: raw/1.0.0\noptional: true\nsensitive: true\ndescription: db rows",
        )
        .expect("parse");
        assert_eq!(
            decl.input_schema,
            Some("raw/1.0.0".parse().expect("schema"))
        );
        assert!(decl.optional);
        assert!(decl.sensitive);
    }

    #[test]
    fn test_legacy_schema_spelling_rejected() {
        assert!(serde_yaml::from_str::<InputDeclaration>("schema: raw/1.0.0").is_err());
    }
}

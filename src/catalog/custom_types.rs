use serde::Serialize;
use std::collections::HashMap;

use crate::utils::error::TypeError;

/// How the entries of a custom type are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CustomTypeKind {
    /// `Value  Name` tables: the register holds one code.
    Enumeration,
    /// `Bit  Name` tables: each code is a bit position in the register.
    BitNames,
}

/// A vendor-declared table mapping integer codes to labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomType {
    id: String,
    kind: CustomTypeKind,
    entries: Vec<(u32, String)>,
    #[serde(skip)]
    index: HashMap<u32, usize>,
}

impl CustomType {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CustomTypeKind {
        self.kind
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[(u32, String)] {
        &self.entries
    }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.index.get(&code).map(|&i| self.entries[i].1.as_str())
    }

    /// Labels of the bits set in `raw`, lowest bit first.
    ///
    /// Bits without a declared name are skipped.
    pub fn active_bits(&self, raw: u32) -> Vec<&str> {
        (0..32u32)
            .filter(|bit| raw & (1 << bit) != 0)
            .filter_map(|bit| self.label(bit))
            .collect()
    }
}

/// All custom types declared by one export, keyed by their declared id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomTypeTable {
    types: Vec<CustomType>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
}

impl CustomTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define an enumeration type.
    pub fn define(
        &mut self,
        type_id: impl Into<String>,
        entries: Vec<(u32, String)>,
    ) -> Result<&CustomType, TypeError> {
        self.insert(type_id.into(), CustomTypeKind::Enumeration, entries)
    }

    /// Define a bit-name table used by bitfield registers.
    pub fn define_bits(
        &mut self,
        type_id: impl Into<String>,
        entries: Vec<(u32, String)>,
    ) -> Result<&CustomType, TypeError> {
        self.insert(type_id.into(), CustomTypeKind::BitNames, entries)
    }

    fn insert(
        &mut self,
        id: String,
        kind: CustomTypeKind,
        entries: Vec<(u32, String)>,
    ) -> Result<&CustomType, TypeError> {
        if self.by_id.contains_key(&id) {
            return Err(TypeError::DuplicateType(id));
        }
        if entries.is_empty() {
            return Err(TypeError::EmptyMapping(id));
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, (code, _)) in entries.iter().enumerate() {
            if index.insert(*code, i).is_some() {
                return Err(TypeError::DuplicateCode {
                    type_id: id,
                    code: *code,
                });
            }
        }

        let slot = self.types.len();
        self.by_id.insert(id.clone(), slot);
        self.types.push(CustomType {
            id,
            kind,
            entries,
            index,
        });
        Ok(&self.types[slot])
    }

    pub fn get(&self, type_id: &str) -> Option<&CustomType> {
        self.by_id.get(type_id).map(|&i| &self.types[i])
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.by_id.contains_key(type_id)
    }

    /// Label for `code` in `type_id`. Unknown codes are an error, never a
    /// fallback label.
    pub fn resolve(&self, type_id: &str, code: u32) -> Result<&str, TypeError> {
        let custom = self
            .get(type_id)
            .ok_or_else(|| TypeError::UnknownType(type_id.to_string()))?;
        custom.label(code).ok_or_else(|| TypeError::UnknownCode {
            type_id: type_id.to_string(),
            code,
        })
    }

    /// Types in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CustomType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(u32, &str)]) -> Vec<(u32, String)> {
        pairs.iter().map(|(c, l)| (*c, l.to_string())).collect()
    }

    #[test]
    fn test_define_and_resolve() {
        let mut table = CustomTypeTable::new();
        table
            .define("List#1", entries(&[(0, "Stop"), (1, "Run"), (2, "Fault")]))
            .unwrap();

        assert_eq!(table.resolve("List#1", 2).unwrap(), "Fault");
        assert_eq!(
            table.resolve("List#1", 9),
            Err(TypeError::UnknownCode {
                type_id: "List#1".to_string(),
                code: 9
            })
        );
        assert_eq!(
            table.resolve("List#2", 0),
            Err(TypeError::UnknownType("List#2".to_string()))
        );
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let mut table = CustomTypeTable::new();
        table.define("List#1", entries(&[(0, "Off")])).unwrap();
        let err = table.define("List#1", entries(&[(0, "On")])).unwrap_err();
        assert_eq!(err, TypeError::DuplicateType("List#1".to_string()));
        assert_eq!(table.resolve("List#1", 0).unwrap(), "Off");
    }

    #[test]
    fn test_empty_mapping_is_rejected() {
        let mut table = CustomTypeTable::new();
        let err = table.define("List#4", Vec::new()).unwrap_err();
        assert_eq!(err, TypeError::EmptyMapping("List#4".to_string()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_code_is_rejected_without_defining() {
        let mut table = CustomTypeTable::new();
        let err = table
            .define("List#5", entries(&[(1, "A"), (1, "B")]))
            .unwrap_err();
        assert_eq!(
            err,
            TypeError::DuplicateCode {
                type_id: "List#5".to_string(),
                code: 1
            }
        );
        assert!(!table.contains("List#5"));
    }

    #[test]
    fn test_active_bits() {
        let mut table = CustomTypeTable::new();
        let bits = table
            .define_bits("Binary#1", entries(&[(0, "BI1"), (1, "BI2"), (3, "BI4")]))
            .unwrap();
        assert_eq!(bits.kind(), CustomTypeKind::BitNames);
        assert_eq!(bits.active_bits(0b1011), vec!["BI1", "BI2", "BI4"]);
        assert_eq!(bits.active_bits(0b0100), Vec::<&str>::new());
    }

    #[test]
    fn test_iteration_keeps_declaration_order() {
        let mut table = CustomTypeTable::new();
        table.define("List#9", entries(&[(0, "a")])).unwrap();
        table.define_bits("Binary#2", entries(&[(0, "b")])).unwrap();
        table.define("List#1", entries(&[(0, "c")])).unwrap();
        let ids: Vec<&str> = table.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["List#9", "Binary#2", "List#1"]);
    }
}

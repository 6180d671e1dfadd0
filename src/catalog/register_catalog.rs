use serde::Serialize;
use std::collections::HashMap;

use super::custom_types::CustomTypeTable;
use super::definition::RegisterDefinition;
use super::parser::RegisterCatalogParser;
use crate::utils::error::{ParseError, QueryError};

/// Registers of one logical group, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterGroup {
    name: String,
    registers: Vec<RegisterDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RegisterGroup {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            registers: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Append a register, handing it back if the name is taken.
    pub(crate) fn push(
        &mut self,
        definition: RegisterDefinition,
    ) -> Result<(), RegisterDefinition> {
        if self.index.contains_key(&definition.name) {
            return Err(definition);
        }
        self.index
            .insert(definition.name.clone(), self.registers.len());
        self.registers.push(definition);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&RegisterDefinition> {
        self.index.get(name).map(|&i| &self.registers[i])
    }

    pub fn registers(&self) -> &[RegisterDefinition] {
        &self.registers
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Validated, read-only view of an exported register map.
///
/// Built once by [`RegisterCatalogParser`] and never mutated afterwards, so a
/// single instance can be shared (`Arc<RegisterCatalog>`) by every query and
/// worker without locking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterCatalog {
    groups: Vec<RegisterGroup>,
    #[serde(skip)]
    group_index: HashMap<String, usize>,
    custom_types: CustomTypeTable,
}

impl RegisterCatalog {
    /// Parse an export with the default register base.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        RegisterCatalogParser::new().parse(text)
    }

    pub(crate) fn from_parts(groups: Vec<RegisterGroup>, custom_types: CustomTypeTable) -> Self {
        let group_index = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.clone(), i))
            .collect();
        Self {
            groups,
            group_index,
            custom_types,
        }
    }

    pub fn group(&self, name: &str) -> Option<&RegisterGroup> {
        self.group_index.get(name).map(|&i| &self.groups[i])
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> &[RegisterGroup] {
        &self.groups
    }

    pub fn get(&self, group: &str, name: &str) -> Option<&RegisterDefinition> {
        self.group(group).and_then(|g| g.get(name))
    }

    /// Resolve `(group, name)`, telling a wrong group apart from a wrong name.
    pub fn lookup(&self, group: &str, name: &str) -> Result<&RegisterDefinition, QueryError> {
        let registers = self
            .group(group)
            .ok_or_else(|| QueryError::UnknownGroup(group.to_string()))?;
        registers.get(name).ok_or_else(|| QueryError::UnknownRegister {
            group: group.to_string(),
            name: name.to_string(),
        })
    }

    /// Every register, group by group, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterDefinition> {
        self.groups.iter().flat_map(|g| g.registers.iter())
    }

    pub fn custom_types(&self) -> &CustomTypeTable {
        &self.custom_types
    }

    /// Total number of registers.
    pub fn len(&self) -> usize {
        self.groups.iter().map(RegisterGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

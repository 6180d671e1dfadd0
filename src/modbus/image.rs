use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::transport::RegisterTransport;
use crate::utils::error::TransportError;

/// A contiguous run of words in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub start: u16,
    pub words: Vec<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default, rename = "block")]
    blocks: Vec<SnapshotBlock>,
}

/// In-memory register space answering reads from captured words.
///
/// Useful for replaying a controller dump offline and as a stand-in
/// transport in tests. Reading an address that holds no word fails like a
/// device exception would.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterImage {
    words: BTreeMap<u16, u16>,
}

impl RegisterImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image holding `words` from `start` onwards.
    pub fn from_words(start: u16, words: &[u16]) -> Self {
        let mut image = Self::new();
        image.insert_block(start, words);
        image
    }

    pub fn insert(&mut self, address: u16, word: u16) {
        self.words.insert(address, word);
    }

    /// Store consecutive words; words past address 65535 are dropped.
    pub fn insert_block(&mut self, start: u16, words: &[u16]) {
        for (offset, word) in words.iter().enumerate() {
            match u16::try_from(start as usize + offset) {
                Ok(address) => self.insert(address, *word),
                Err(_) => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Parse a TOML snapshot made of `[[block]]` tables with `start` and
    /// `words`. Later blocks overwrite earlier ones where they overlap.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let snapshot: Snapshot = toml::from_str(content)?;
        let mut image = Self::new();
        for block in &snapshot.blocks {
            debug!(
                "Snapshot block at {}: {} word(s)",
                block.start,
                block.words.len()
            );
            image.insert_block(block.start, &block.words);
        }
        Ok(image)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading register snapshot {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing register snapshot {}", path.display()))
    }

    /// Serialize as one block per contiguous run of addresses.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        let mut blocks: Vec<SnapshotBlock> = Vec::new();
        for (&address, &word) in &self.words {
            match blocks.last_mut() {
                Some(block) if block.start as usize + block.words.len() == address as usize => {
                    block.words.push(word)
                }
                _ => blocks.push(SnapshotBlock {
                    start: address,
                    words: vec![word],
                }),
            }
        }
        toml::to_string_pretty(&Snapshot { blocks })
    }
}

impl RegisterTransport for RegisterImage {
    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        (0..count)
            .map(|offset| {
                let at = address as u32 + offset as u32;
                u16::try_from(at)
                    .ok()
                    .and_then(|a| self.words.get(&a).copied())
                    .ok_or_else(|| TransportError::message(format!("no data at address {}", at)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_consecutive_words() {
        let image = RegisterImage::from_words(10, &[1, 2, 3]);
        assert_eq!(image.read_registers(11, 2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_missing_word_fails() {
        let image = RegisterImage::from_words(10, &[1, 2]);
        let err = image.read_registers(11, 2).unwrap_err();
        assert!(err.to_string().contains("no data at address 12"));
    }

    #[test]
    fn test_words_past_address_space_are_dropped() {
        let image = RegisterImage::from_words(u16::MAX, &[7, 8]);
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn test_toml_snapshot() {
        let image = RegisterImage::from_toml_str(
            r#"
            [[block]]
            start = 0
            words = [0x04D2, 7]

            [[block]]
            start = 100
            words = [0x41CC, 0x0000]
            "#,
        )
        .unwrap();
        assert_eq!(image.read_registers(0, 2).unwrap(), vec![1234, 7]);
        assert_eq!(image.read_registers(100, 2).unwrap(), vec![0x41CC, 0]);

        let again = RegisterImage::from_toml_str(&image.to_toml_string().unwrap()).unwrap();
        assert_eq!(again, image);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[block]]\nstart = 5\nwords = [42]").unwrap();
        let image = RegisterImage::load(file.path()).unwrap();
        assert_eq!(image.read_registers(5, 1).unwrap(), vec![42]);
    }

    #[test]
    fn test_load_reports_path() {
        let err = RegisterImage::load("/nonexistent/snapshot.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/snapshot.toml"));
    }
}

use serde::Serialize;
use std::fmt;

use crate::catalog::{CustomType, CustomTypeTable, Encoding, RegisterDefinition};
use crate::utils::error::DecodeError;

/// A register value after type dispatch and scaling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// Scaled integer or float reading.
    Number(f64),
    /// Unscaled bitfield with the names of the set bits, when declared.
    Bits { raw: u32, active: Vec<String> },
    /// Label of an enumeration code.
    Label(String),
    Text(String),
}

impl DecodedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            DecodedValue::Label(l) => Some(l),
            _ => None,
        }
    }

    /// Render with a fixed number of decimals for numbers.
    pub fn render(&self, precision: usize) -> String {
        match self {
            DecodedValue::Number(v) => format!("{:.*}", precision, v),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Number(v) => write!(f, "{}", v),
            DecodedValue::Bits { raw, active } if active.is_empty() => write!(f, "0x{:04X}", raw),
            DecodedValue::Bits { raw, active } => {
                write!(f, "0x{:04X} [{}]", raw, active.join(", "))
            }
            DecodedValue::Label(l) | DecodedValue::Text(l) => f.write_str(l),
        }
    }
}

/// Decoded value paired with the unit it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: DecodedValue,
    /// Empty for enumerations, bitfields and text.
    pub unit: String,
}

/// Turns raw register words into typed values for one catalog.
#[derive(Debug, Clone, Copy)]
pub struct ValueDecoder<'a> {
    types: &'a CustomTypeTable,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(types: &'a CustomTypeTable) -> Self {
        Self { types }
    }

    fn custom_type(
        &self,
        definition: &RegisterDefinition,
        type_id: &str,
    ) -> Result<&'a CustomType, DecodeError> {
        self.types
            .get(type_id)
            .ok_or_else(|| DecodeError::UnknownType {
                group: definition.group.clone(),
                name: definition.name.clone(),
                type_id: type_id.to_string(),
            })
    }

    pub fn decode(
        &self,
        definition: &RegisterDefinition,
        words: &[u16],
    ) -> Result<Measurement, DecodeError> {
        if words.len() != definition.register_count as usize {
            return Err(DecodeError::LengthMismatch {
                group: definition.group.clone(),
                name: definition.name.clone(),
                expected: definition.register_count as usize,
                actual: words.len(),
            });
        }

        let value = match &definition.encoding {
            Encoding::Unsigned => DecodedValue::Number(definition.scale.apply(combine(words) as f64)),
            Encoding::Signed => {
                let raw = match words {
                    [word] => *word as i16 as f64,
                    _ => combine(words) as i32 as f64,
                };
                DecodedValue::Number(definition.scale.apply(raw))
            }
            Encoding::Float => {
                let raw = f32::from_bits(combine(words)) as f64;
                DecodedValue::Number(definition.scale.apply(raw))
            }
            Encoding::Bitfield { names } => {
                let raw = combine(words);
                let active = match names {
                    Some(type_id) => self
                        .custom_type(definition, type_id)?
                        .active_bits(raw)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    None => Vec::new(),
                };
                DecodedValue::Bits { raw, active }
            }
            Encoding::Enumeration { type_id } => {
                let code = combine(words);
                let label = self
                    .custom_type(definition, type_id)?
                    .label(code)
                    .ok_or_else(|| DecodeError::UnknownCode {
                        group: definition.group.clone(),
                        name: definition.name.clone(),
                        type_id: type_id.clone(),
                        code,
                    })?;
                DecodedValue::Label(label.to_string())
            }
            Encoding::Text => DecodedValue::Text(decode_text(words)),
            Encoding::Bcd => DecodedValue::Text(words.iter().map(|w| format!("{:04x}", w)).collect()),
        };

        let unit = if definition.encoding.is_numeric() {
            definition.unit.clone()
        } else {
            String::new()
        };
        Ok(Measurement { value, unit })
    }
}

/// Join up to two words, most significant first.
fn combine(words: &[u16]) -> u32 {
    words
        .iter()
        .fold(0u32, |acc, w| (acc << 16) | *w as u32)
}

fn decode_text(words: &[u16]) -> String {
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).trim().to_string()
}

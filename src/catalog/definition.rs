use serde::Serialize;
use std::fmt;

/// Raw data encoding of a register, carrying only what decoding needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    Unsigned,
    Signed,
    Float,
    Bitfield { names: Option<String> },
    Enumeration { type_id: String },
    Text,
    /// Time and date registers, binary-coded decimal.
    Bcd,
}

impl Encoding {
    /// Whether `count` registers is a legal width for this encoding.
    pub fn accepts_count(&self, count: u16) -> bool {
        match self {
            Encoding::Unsigned | Encoding::Signed => matches!(count, 1 | 2),
            Encoding::Float => count == 2,
            Encoding::Bitfield { .. } | Encoding::Enumeration { .. } => matches!(count, 1 | 2),
            Encoding::Text | Encoding::Bcd => count >= 1,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Encoding::Unsigned | Encoding::Signed | Encoding::Float)
    }

    /// Custom type this encoding refers to, if any.
    pub fn custom_type(&self) -> Option<&str> {
        match self {
            Encoding::Enumeration { type_id } => Some(type_id),
            Encoding::Bitfield { names } => names.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Unsigned => write!(f, "unsigned"),
            Encoding::Signed => write!(f, "signed"),
            Encoding::Float => write!(f, "float"),
            Encoding::Bitfield { names: None } => write!(f, "bitfield"),
            Encoding::Bitfield { names: Some(id) } => write!(f, "bitfield({})", id),
            Encoding::Enumeration { type_id } => write!(f, "enum({})", type_id),
            Encoding::Text => write!(f, "text"),
            Encoding::Bcd => write!(f, "bcd"),
        }
    }
}

/// Multiplicative factor from raw register value to engineering value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Unit,
    /// `10^-n`, as given by the export's `Dec` column.
    Decimals(i8),
    Factor(f64),
}

impl Scale {
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Scale::Unit => raw,
            // Dividing by an exact power of ten keeps 1234 -> 123.4 exact.
            Scale::Decimals(d) if d >= 0 => raw / 10f64.powi(d as i32),
            Scale::Decimals(d) => raw * 10f64.powi(-(d as i32)),
            Scale::Factor(k) => raw * k,
        }
    }

    pub fn factor(&self) -> f64 {
        self.apply(1.0)
    }

    /// Digits worth printing after the decimal point.
    pub fn precision(&self) -> usize {
        match *self {
            Scale::Decimals(d) if d > 0 => d as usize,
            _ => 0,
        }
    }
}

/// One register as declared by the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDefinition {
    pub group: String,
    pub name: String,
    /// Holding-register reference as written in the export, e.g. `40013`.
    pub reference: u32,
    /// Zero-based protocol address sent on the wire.
    pub address: u16,
    pub register_count: u16,
    pub encoding: Encoding,
    pub scale: Scale,
    pub unit: String,
    pub comm_obj: Option<u32>,
    /// Raw (unscaled) limits.
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Line of the export the register was declared on.
    pub line: usize,
}

impl RegisterDefinition {
    /// Scaled limits, only meaningful for numeric encodings.
    pub fn limits(&self) -> (Option<f64>, Option<f64>) {
        if !self.encoding.is_numeric() {
            return (None, None);
        }
        let scale = |v: i64| self.scale.apply(v as f64);
        (self.min.map(scale), self.max.map(scale))
    }

    /// `None` when the register has no limits or is not numeric.
    pub fn check_limits(&self, value: f64) -> Option<bool> {
        match self.limits() {
            (None, None) => None,
            (min, max) => Some(
                min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m),
            ),
        }
    }

    /// Last protocol address covered by this register.
    pub fn end_address(&self) -> u16 {
        self.address + self.register_count.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(encoding: Encoding, scale: Scale) -> RegisterDefinition {
        RegisterDefinition {
            group: "Analog CU".to_string(),
            name: "Oil press".to_string(),
            reference: 40021,
            address: 20,
            register_count: 1,
            encoding,
            scale,
            unit: "Bar".to_string(),
            comm_obj: Some(8227),
            min: Some(0),
            max: Some(100),
            line: 7,
        }
    }

    #[test]
    fn test_scale_application() {
        assert_eq!(Scale::Unit.apply(42.0), 42.0);
        assert_eq!(Scale::Decimals(1).apply(1234.0), 123.4);
        assert_eq!(Scale::Decimals(-2).apply(12.0), 1200.0);
        assert_eq!(Scale::Factor(0.5).apply(7.0), 3.5);
        assert_eq!(Scale::Decimals(2).precision(), 2);
    }

    #[test]
    fn test_count_rules() {
        assert!(Encoding::Float.accepts_count(2));
        assert!(!Encoding::Float.accepts_count(1));
        assert!(Encoding::Signed.accepts_count(2));
        assert!(!Encoding::Unsigned.accepts_count(3));
        assert!(Encoding::Text.accepts_count(8));
        assert!(!Encoding::Text.accepts_count(0));
        let list = Encoding::Enumeration {
            type_id: "List#1".to_string(),
        };
        assert!(list.accepts_count(1));
        assert!(!list.accepts_count(4));
    }

    #[test]
    fn test_limits_are_scaled() {
        let def = definition(Encoding::Unsigned, Scale::Decimals(1));
        assert_eq!(def.limits(), (Some(0.0), Some(10.0)));
        assert_eq!(def.check_limits(9.9), Some(true));
        assert_eq!(def.check_limits(10.1), Some(false));
    }

    #[test]
    fn test_limits_ignored_for_enumerations() {
        let def = definition(
            Encoding::Enumeration {
                type_id: "List#1".to_string(),
            },
            Scale::Unit,
        );
        assert_eq!(def.check_limits(500.0), None);
    }
}

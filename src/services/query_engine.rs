use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::catalog::{RegisterCatalog, RegisterDefinition};
use crate::modbus::{DecodedValue, RegisterTransport, ValueDecoder};
use crate::utils::error::QueryError;

/// Outcome of reading one register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub group: String,
    pub name: String,
    pub value: DecodedValue,
    pub unit: String,
    /// Words exactly as the transport returned them.
    pub raw: Vec<u16>,
    pub timestamp: DateTime<Utc>,
    /// `None` when the register has no limits or is not numeric.
    pub within_limits: Option<bool>,
    #[serde(skip)]
    precision: usize,
}

impl QueryResult {
    /// Value formatted with the decimals implied by the register's scale.
    pub fn display_value(&self) -> String {
        self.value.render(self.precision)
    }

    pub fn raw_hex(&self) -> String {
        let bytes: Vec<u8> = self.raw.iter().flat_map(|w| w.to_be_bytes()).collect();
        hex::encode(bytes)
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.display_value())
        } else {
            write!(f, "{} {}", self.display_value(), self.unit)
        }
    }
}

/// Result of one register within a group read.
#[derive(Debug)]
pub struct RegisterReading {
    pub name: String,
    pub result: Result<QueryResult, QueryError>,
}

/// Resolve `(group, name)` in `catalog`, read it through `transport` and
/// decode it. One transport call, no retries.
pub fn query<T: RegisterTransport + ?Sized>(
    catalog: &RegisterCatalog,
    transport: &T,
    group: &str,
    name: &str,
) -> Result<QueryResult, QueryError> {
    let definition = catalog.lookup(group, name)?;
    read_definition(catalog, transport, definition)
}

fn read_definition<T: RegisterTransport + ?Sized>(
    catalog: &RegisterCatalog,
    transport: &T,
    definition: &RegisterDefinition,
) -> Result<QueryResult, QueryError> {
    debug!(
        "📊 Reading {}/{}: {} register(s) at address {}",
        definition.group, definition.name, definition.register_count, definition.address
    );
    let words = transport
        .read_registers(definition.address, definition.register_count)
        .map_err(|source| QueryError::Transport {
            group: definition.group.clone(),
            name: definition.name.clone(),
            address: definition.address,
            count: definition.register_count,
            source,
        })?;
    assemble(catalog, definition, words)
}

fn assemble(
    catalog: &RegisterCatalog,
    definition: &RegisterDefinition,
    words: Vec<u16>,
) -> Result<QueryResult, QueryError> {
    let measurement = ValueDecoder::new(catalog.custom_types()).decode(definition, &words)?;

    let within_limits = measurement
        .value
        .as_f64()
        .and_then(|v| definition.check_limits(v));
    if within_limits == Some(false) {
        let (min, max) = definition.limits();
        warn!(
            "⚠️  {}/{} = {} outside limits [{:?}, {:?}]",
            definition.group, definition.name, measurement.value, min, max
        );
    }

    Ok(QueryResult {
        group: definition.group.clone(),
        name: definition.name.clone(),
        value: measurement.value,
        unit: measurement.unit,
        raw: words,
        timestamp: Utc::now(),
        within_limits,
        precision: definition.scale.precision(),
    })
}

/// Query façade bound to one parsed catalog.
///
/// Cloning is cheap; clones share the same catalog.
#[derive(Debug, Clone)]
pub struct RegisterQueryEngine {
    catalog: Arc<RegisterCatalog>,
}

impl RegisterQueryEngine {
    pub fn new(catalog: Arc<RegisterCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RegisterCatalog {
        &self.catalog
    }

    pub fn shared_catalog(&self) -> Arc<RegisterCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn query<T: RegisterTransport + ?Sized>(
        &self,
        transport: &T,
        group: &str,
        name: &str,
    ) -> Result<QueryResult, QueryError> {
        query(&self.catalog, transport, group, name)
    }

    /// Read every register of `group` in declaration order. A failing
    /// register is reported in its slot and does not stop the others.
    pub fn query_group<T: RegisterTransport + ?Sized>(
        &self,
        transport: &T,
        group: &str,
    ) -> Result<Vec<RegisterReading>, QueryError> {
        let registers = self
            .catalog
            .group(group)
            .ok_or_else(|| QueryError::UnknownGroup(group.to_string()))?;

        let readings: Vec<RegisterReading> = registers
            .registers()
            .iter()
            .map(|definition| RegisterReading {
                name: definition.name.clone(),
                result: read_definition(&self.catalog, transport, definition),
            })
            .collect();

        let failed = readings.iter().filter(|r| r.result.is_err()).count();
        info!(
            "Read group '{}': {} ok, {} failed",
            group,
            readings.len() - failed,
            failed
        );
        Ok(readings)
    }

    /// Decode words obtained elsewhere (a log, a capture) as if they had been
    /// read for `(group, name)`.
    pub fn decode_words(
        &self,
        group: &str,
        name: &str,
        words: &[u16],
    ) -> Result<QueryResult, QueryError> {
        let definition = self.catalog.lookup(group, name)?;
        assemble(&self.catalog, definition, words.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegisterCatalogParser;
    use crate::modbus::RegisterImage;
    use crate::utils::error::{DecodeError, TransportError};
    use std::sync::Mutex;

    const EXPORT: &str = "\
Register(s)      Com.Obj. Name           Dim  Type       Len Dec    Min    Max Group
40001            8001     SW version          Unsigned     2   2      -      - Info
40002-40003 ( 2) 8002     Gen kWh        kWh  Integer      4   0      -      - Info
40004-40005 ( 2) 8003     Oil temp       °C   Float        4   -      0    120 Engine
40006            8004     Engine state        List#1       2   -      -      - Engine

----------------------------------------------------------
List#1

Value  Name
----------------------------------------------------------
0     Stop
1     Run
2     Fault
";

    /// Canned transport that records every request.
    struct StubTransport {
        words: Vec<u16>,
        calls: Mutex<Vec<(u16, u16)>>,
    }

    impl StubTransport {
        fn returning(words: &[u16]) -> Self {
            Self {
                words: words.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl RegisterTransport for StubTransport {
        fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
            self.calls.lock().unwrap().push((address, count));
            Ok(self.words.clone())
        }
    }

    struct FailingTransport;

    impl RegisterTransport for FailingTransport {
        fn read_registers(&self, _: u16, _: u16) -> Result<Vec<u16>, TransportError> {
            Err(TransportError::message("connection reset"))
        }
    }

    fn engine() -> RegisterQueryEngine {
        let catalog = RegisterCatalogParser::new().parse(EXPORT).unwrap();
        RegisterQueryEngine::new(Arc::new(catalog))
    }

    #[test]
    fn test_query_matches_decoder_output() {
        let engine = engine();
        let transport = StubTransport::returning(&[1234]);
        let result = engine.query(&transport, "Info", "SW version").unwrap();

        let definition = engine.catalog().get("Info", "SW version").unwrap();
        let expected = ValueDecoder::new(engine.catalog().custom_types())
            .decode(definition, &[1234])
            .unwrap();
        assert_eq!(result.value, expected.value);
        assert_eq!(result.unit, expected.unit);
        assert_eq!(result.raw, vec![1234]);
        assert_eq!(result.display_value(), "12.34");
        assert_eq!(*transport.calls.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn test_unknown_group_and_register() {
        let engine = engine();
        let transport = StubTransport::returning(&[0]);
        assert!(matches!(
            engine.query(&transport, "Nope", "SW version"),
            Err(QueryError::UnknownGroup(_))
        ));
        assert!(matches!(
            engine.query(&transport, "Info", "Nope"),
            Err(QueryError::UnknownRegister { .. })
        ));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_transport_failure_is_not_decoded() {
        let engine = engine();
        let err = engine.query(&FailingTransport, "Engine", "Oil temp").unwrap_err();
        match err {
            QueryError::Transport {
                address, count, ..
            } => assert_eq!((address, count), (3, 2)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_read_is_length_mismatch() {
        let engine = engine();
        let transport = StubTransport::returning(&[0x41CC]);
        let err = engine.query(&transport, "Engine", "Oil temp").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Decode(DecodeError::LengthMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_limits_are_reported() {
        let engine = engine();
        let hot = 130.0f32.to_bits();
        let result = engine
            .decode_words("Engine", "Oil temp", &[(hot >> 16) as u16, hot as u16])
            .unwrap();
        assert_eq!(result.within_limits, Some(false));
        assert_eq!(result.unit, "C");
        assert_eq!(result.to_string(), "130 C");
        assert_eq!(result.raw_hex(), "43020000");
    }

    #[test]
    fn test_query_group_continues_after_failure() {
        let engine = engine();
        let mut image = RegisterImage::from_words(3, &[0x41CC, 0x0000]);
        image.insert(5, 7);
        let readings = engine.query_group(&image, "Engine").unwrap();

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].name, "Oil temp");
        assert_eq!(
            readings[0].result.as_ref().unwrap().value,
            DecodedValue::Number(25.5)
        );
        assert!(matches!(
            readings[1].result,
            Err(QueryError::Decode(DecodeError::UnknownCode { code: 7, .. }))
        ));
    }

    #[test]
    fn test_free_function_and_shared_catalog() {
        let engine = engine();
        let image = RegisterImage::from_words(1, &[0xFFFF, 0xFFFE]);
        let catalog = engine.shared_catalog();
        let result = query(&catalog, &image, "Info", "Gen kWh").unwrap();
        assert_eq!(result.value, DecodedValue::Number(-2.0));
        assert_eq!(result.unit, "kWh");
    }
}

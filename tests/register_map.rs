use std::path::PathBuf;
use std::sync::Arc;

use modbus_regmap::catalog::{CustomTypeKind, Encoding, RegisterCatalogParser, Scale};
use modbus_regmap::modbus::{DecodedValue, RegisterImage};
use modbus_regmap::services::RegisterQueryEngine;
use modbus_regmap::utils::error::{ParseError, QueryError};

const EXPORT: &str = include_str!("fixtures/ig_ntc_bb.txt");

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn engine() -> RegisterQueryEngine {
    let catalog = RegisterCatalogParser::new().parse(EXPORT).unwrap();
    RegisterQueryEngine::new(Arc::new(catalog))
}

fn snapshot() -> RegisterImage {
    RegisterImage::load(fixture("snapshot.toml")).unwrap()
}

#[test]
fn test_fixture_groups_in_declaration_order() {
    let engine = engine();
    let catalog = engine.catalog();
    let groups: Vec<&str> = catalog.groups().iter().map(|g| g.name()).collect();
    assert_eq!(
        groups,
        vec!["Gen values", "Statistics", "Info", "Bin inputs CU", "Analog CU", "Setpoints"]
    );
    assert_eq!(catalog.len(), 15);
    assert_eq!(catalog.custom_types().len(), 2);
}

#[test]
fn test_fixture_register_layout() {
    let engine = engine();
    let catalog = engine.catalog();

    let hours = catalog.get("Statistics", "Run hours").unwrap();
    assert_eq!((hours.reference, hours.address, hours.register_count), (40010, 9, 2));
    assert_eq!(hours.encoding, Encoding::Signed);
    assert_eq!(hours.scale, Scale::Decimals(1));
    assert_eq!(hours.unit, "h");

    let name = catalog.get("Info", "Controller name").unwrap();
    assert_eq!(name.encoding, Encoding::Text);
    assert_eq!(name.register_count, 8);

    let date = catalog.get("Info", "Date").unwrap();
    assert_eq!(date.encoding, Encoding::Bcd);
    assert_eq!(date.comm_obj, Some(24554));

    let water = catalog.get("Analog CU", "Water temp").unwrap();
    assert_eq!(water.unit, "C");
    assert_eq!((water.min, water.max), (Some(-40), Some(150)));

    let shutdown = catalog.get("Setpoints", "Sd water temp").unwrap();
    assert_eq!((shutdown.min, shutdown.max), (Some(0), Some(150)));

    let state_type = catalog.custom_types().get("List#1").unwrap();
    assert_eq!(state_type.entries().len(), 18);
    assert_eq!(
        catalog.custom_types().get("Binary#1").unwrap().kind(),
        CustomTypeKind::BitNames
    );
}

#[test]
fn test_read_group_from_snapshot() {
    let engine = engine();
    let readings = engine.query_group(&snapshot(), "Gen values").unwrap();
    let values: Vec<f64> = readings
        .iter()
        .map(|r| r.result.as_ref().unwrap().value.as_f64().unwrap())
        .collect();
    assert_eq!(values, vec![250.0, -10.0, 50.0, 231.0, 229.0]);
    assert_eq!(readings[2].name, "Gen freq");
    assert_eq!(readings[2].result.as_ref().unwrap().to_string(), "50.0 Hz");
}

#[test]
fn test_decoded_types_from_snapshot() {
    let engine = engine();
    let image = snapshot();

    let state = engine.query(&image, "Info", "Engine state").unwrap();
    assert_eq!(state.value.as_label(), Some("Running"));
    assert_eq!(state.unit, "");

    let inputs = engine.query(&image, "Bin inputs CU", "BIN").unwrap();
    assert_eq!(
        inputs.value,
        DecodedValue::Bits {
            raw: 5,
            active: vec!["Emergency stop".to_string(), "Remote OFF".to_string()],
        }
    );

    let name = engine.query(&image, "Info", "Controller name").unwrap();
    assert_eq!(name.value, DecodedValue::Text("IG-NTC-BB".to_string()));

    let date = engine.query(&image, "Info", "Date").unwrap();
    assert_eq!(date.value, DecodedValue::Text("15032024".to_string()));

    let hours = engine.query(&image, "Statistics", "Run hours").unwrap();
    assert_eq!(hours.value, DecodedValue::Number(1234.5));
    assert_eq!(hours.raw, vec![0x0000, 0x3039]);
}

#[test]
fn test_limits_from_snapshot() {
    let engine = engine();
    let image = snapshot();

    let oil = engine.query(&image, "Analog CU", "Oil press").unwrap();
    assert_eq!(oil.value, DecodedValue::Number(4.5));
    assert_eq!(oil.within_limits, Some(true));

    let water = engine.query(&image, "Analog CU", "Water temp").unwrap();
    assert_eq!(water.within_limits, Some(false));

    let starts = engine.query(&image, "Statistics", "Num starts").unwrap();
    assert_eq!(starts.within_limits, None);
}

#[test]
fn test_missing_snapshot_words_are_transport_errors() {
    let engine = engine();
    let image = RegisterImage::from_words(0, &[1]);
    let err = engine.query(&image, "Gen values", "Gen freq").unwrap_err();
    assert!(matches!(err, QueryError::Transport { address: 2, count: 1, .. }));
}

#[test]
fn test_latin1_export() {
    let bytes: Vec<u8> = EXPORT
        .chars()
        .map(|c| if c == '°' { 0xB0 } else { c as u8 })
        .collect();
    let catalog = RegisterCatalogParser::new().parse_bytes(&bytes).unwrap();
    assert_eq!(catalog.get("Setpoints", "Wrn water temp").unwrap().unit, "C");
    assert_eq!(catalog.len(), 15);
}

#[test]
fn test_duplicate_row_rejects_whole_export() {
    let duplicated = EXPORT.replace("Gen V2-N", "Gen V1-N");
    let err = RegisterCatalogParser::new().parse(&duplicated).unwrap_err();
    assert_eq!(
        err,
        ParseError::DuplicateRegister {
            line: 9,
            group: "Gen values".to_string(),
            name: "Gen V1-N".to_string(),
            first_line: 8,
        }
    );
}

#[test]
fn test_truncated_export_is_rejected() {
    let header_and_rows: String = EXPORT.lines().take(10).collect::<Vec<_>>().join("\n");
    let err = RegisterCatalogParser::new().parse(&header_and_rows).unwrap_err();
    assert_eq!(err.line(), 4);
}

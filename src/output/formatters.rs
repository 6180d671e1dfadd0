use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::catalog::{CustomTypeKind, CustomTypeTable, RegisterCatalog, RegisterGroup};
use crate::services::{QueryResult, RegisterReading};

/// Output formats selectable from the command line or the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn formatter(self, include_raw: bool) -> Box<dyn ResultFormatter> {
        match self {
            OutputFormat::Console => Box::new(ConsoleFormatter { include_raw }),
            OutputFormat::Json => Box::new(JsonFormatter { include_raw }),
            OutputFormat::Csv => Box::new(CsvFormatter { include_raw }),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Console => "console",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        })
    }
}

pub trait ResultFormatter: Send + Sync {
    fn format_result(&self, result: &QueryResult) -> String;
    fn format_readings(&self, group: &str, readings: &[RegisterReading]) -> String;
    /// Register definitions of one group, in declaration order.
    fn format_group(&self, group: &RegisterGroup) -> String;
    fn format_groups(&self, catalog: &RegisterCatalog) -> String;
    fn format_types(&self, types: &CustomTypeTable) -> String;
    fn format_header(&self) -> String;
}

fn kind_name(kind: CustomTypeKind) -> &'static str {
    match kind {
        CustomTypeKind::Enumeration => "enumeration",
        CustomTypeKind::BitNames => "bit names",
    }
}

pub struct ConsoleFormatter {
    pub include_raw: bool,
}

impl ResultFormatter for ConsoleFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        let mut output = format!("🔹 {}/{}: {}", result.group, result.name, result);
        if result.within_limits == Some(false) {
            output.push_str("  ⚠️ out of limits");
        }
        if self.include_raw {
            output.push_str(&format!("  (raw 0x{})", result.raw_hex()));
        }
        output.push('\n');
        output
    }

    fn format_readings(&self, group: &str, readings: &[RegisterReading]) -> String {
        let mut output = format!("📊 Group {}:\n", group);
        output.push_str(&"═".repeat(60));
        output.push('\n');
        for reading in readings {
            match &reading.result {
                Ok(result) => {
                    output.push_str(&format!("  {:<28} {}", reading.name, result));
                    if self.include_raw {
                        output.push_str(&format!("  (raw 0x{})", result.raw_hex()));
                    }
                    output.push('\n');
                }
                Err(e) => output.push_str(&format!("  {:<28} ❌ {}\n", reading.name, e)),
            }
        }
        output
    }

    fn format_group(&self, group: &RegisterGroup) -> String {
        let mut output = format!("📋 {} ({} registers)\n", group.name(), group.len());
        for def in group.registers() {
            output.push_str(&format!(
                "  {:<6} {:>5} x{:<3} {:<28} {:<20} {}\n",
                def.reference,
                def.address,
                def.register_count,
                def.name,
                def.encoding.to_string(),
                def.unit
            ));
        }
        output
    }

    fn format_groups(&self, catalog: &RegisterCatalog) -> String {
        let mut output = String::from("📋 Register groups:\n");
        for group in catalog.groups() {
            output.push_str(&format!("  {:<32} {:>4}\n", group.name(), group.len()));
        }
        output
    }

    fn format_types(&self, types: &CustomTypeTable) -> String {
        let mut output = String::new();
        for custom in types.iter() {
            output.push_str(&format!("🔸 {} ({})\n", custom.id(), kind_name(custom.kind())));
            for (code, label) in custom.entries() {
                output.push_str(&format!("  {:>5}  {}\n", code, label));
            }
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Register map query - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter {
    pub include_raw: bool,
}

impl JsonFormatter {
    fn result_value(&self, result: &QueryResult) -> Value {
        let mut value = serde_json::to_value(result).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            if self.include_raw {
                map.insert("raw_hex".to_string(), Value::String(result.raw_hex()));
            } else {
                map.remove("raw");
            }
        }
        value
    }
}

impl ResultFormatter for JsonFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        serde_json::to_string_pretty(&self.result_value(result)).unwrap_or_default()
    }

    fn format_readings(&self, group: &str, readings: &[RegisterReading]) -> String {
        let registers: Vec<Value> = readings
            .iter()
            .map(|reading| match &reading.result {
                Ok(result) => self.result_value(result),
                Err(e) => json!({
                    "group": group,
                    "name": reading.name,
                    "error": e.to_string(),
                }),
            })
            .collect();

        let result = json!({
            "group": group,
            "timestamp": Utc::now().to_rfc3339(),
            "registers": registers,
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_group(&self, group: &RegisterGroup) -> String {
        serde_json::to_string_pretty(group).unwrap_or_default()
    }

    fn format_groups(&self, catalog: &RegisterCatalog) -> String {
        let groups: Vec<Value> = catalog
            .groups()
            .iter()
            .map(|g| json!({ "name": g.name(), "registers": g.len() }))
            .collect();
        serde_json::to_string_pretty(&groups).unwrap_or_default()
    }

    fn format_types(&self, types: &CustomTypeTable) -> String {
        let types: Vec<Value> = types
            .iter()
            .map(|custom| {
                let entries: Vec<Value> = custom
                    .entries()
                    .iter()
                    .map(|(code, label)| json!({ "code": code, "label": label }))
                    .collect();
                json!({
                    "id": custom.id(),
                    "kind": kind_name(custom.kind()),
                    "entries": entries,
                })
            })
            .collect();
        serde_json::to_string_pretty(&types).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new()
    }
}

pub struct CsvFormatter {
    pub include_raw: bool,
}

/// Quote a field when it would otherwise break the row.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl CsvFormatter {
    fn row(&self, group: &str, name: &str, value: &str, unit: &str, raw: &str, timestamp: &str) -> String {
        let mut fields = vec![csv_field(group), csv_field(name), csv_field(value), csv_field(unit)];
        if self.include_raw {
            fields.push(raw.to_string());
        }
        fields.push(timestamp.to_string());
        format!("{}\n", fields.join(","))
    }
}

impl ResultFormatter for CsvFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        self.row(
            &result.group,
            &result.name,
            &result.display_value(),
            &result.unit,
            &result.raw_hex(),
            &result.timestamp.to_rfc3339(),
        )
    }

    fn format_readings(&self, group: &str, readings: &[RegisterReading]) -> String {
        let timestamp = Utc::now().to_rfc3339();
        readings
            .iter()
            .map(|reading| match &reading.result {
                Ok(result) => self.format_result(result),
                Err(e) => self.row(group, &reading.name, &format!("ERROR: {}", e), "", "", &timestamp),
            })
            .collect()
    }

    fn format_group(&self, group: &RegisterGroup) -> String {
        let mut csv = String::from("Group,Name,Reference,Address,Count,Encoding,Unit,Min,Max\n");
        for def in group.registers() {
            let limit = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                csv_field(&def.group),
                csv_field(&def.name),
                def.reference,
                def.address,
                def.register_count,
                csv_field(&def.encoding.to_string()),
                csv_field(&def.unit),
                limit(def.min),
                limit(def.max)
            ));
        }
        csv
    }

    fn format_groups(&self, catalog: &RegisterCatalog) -> String {
        let mut csv = String::from("Group,Registers\n");
        for group in catalog.groups() {
            csv.push_str(&format!("{},{}\n", csv_field(group.name()), group.len()));
        }
        csv
    }

    fn format_types(&self, types: &CustomTypeTable) -> String {
        let mut csv = String::from("Type,Kind,Code,Label\n");
        for custom in types.iter() {
            for (code, label) in custom.entries() {
                csv.push_str(&format!(
                    "{},{},{},{}\n",
                    csv_field(custom.id()),
                    kind_name(custom.kind()),
                    code,
                    csv_field(label)
                ));
            }
        }
        csv
    }

    fn format_header(&self) -> String {
        if self.include_raw {
            "Group,Name,Value,Unit,Raw,Timestamp\n".to_string()
        } else {
            "Group,Name,Value,Unit,Timestamp\n".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegisterCatalogParser;
    use crate::modbus::RegisterImage;
    use crate::services::RegisterQueryEngine;
    use std::sync::Arc;

    const EXPORT: &str = "\
Register(s)  Name          Dim  Type      Len Dec Group
40001        Speed         RPM  Unsigned    2   0 Engine
40002        Mode               List#1      2   - Engine

----------
List#1

Value  Name
----------
0     Off
1     Auto, remote
";

    fn engine() -> RegisterQueryEngine {
        let catalog = RegisterCatalogParser::new().parse(EXPORT).unwrap();
        RegisterQueryEngine::new(Arc::new(catalog))
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("console".parse::<OutputFormat>(), Ok(OutputFormat::Console));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_console_result() {
        let engine = engine();
        let image = RegisterImage::from_words(0, &[1500, 1]);
        let result = engine.query(&image, "Engine", "Speed").unwrap();
        let text = ConsoleFormatter { include_raw: true }.format_result(&result);
        assert!(text.contains("Engine/Speed: 1500 RPM"), "{text}");
        assert!(text.contains("raw 0x05dc"), "{text}");
    }

    #[test]
    fn test_json_readings_report_errors_in_place() {
        let engine = engine();
        let image = RegisterImage::from_words(0, &[1500]);
        let readings = engine.query_group(&image, "Engine").unwrap();
        let text = JsonFormatter { include_raw: false }.format_readings("Engine", &readings);
        let value: Value = serde_json::from_str(&text).unwrap();

        let registers = value["registers"].as_array().unwrap();
        assert_eq!(registers[0]["value"], json!(1500.0));
        assert!(registers[0].get("raw").is_none());
        assert!(registers[1]["error"].as_str().unwrap().contains("no data"));
    }

    #[test]
    fn test_csv_quotes_labels() {
        let engine = engine();
        let text = CsvFormatter { include_raw: false }.format_types(engine.catalog().custom_types());
        assert!(text.contains("List#1,enumeration,1,\"Auto, remote\"\n"), "{text}");

        let image = RegisterImage::from_words(0, &[0, 1]);
        let result = engine.query(&image, "Engine", "Mode").unwrap();
        let row = CsvFormatter { include_raw: false }.format_result(&result);
        assert!(row.starts_with("Engine,Mode,\"Auto, remote\",,"), "{row}");
    }

    #[test]
    fn test_groups_listing_keeps_order() {
        let engine = engine();
        let text = CsvFormatter { include_raw: false }.format_group(&engine.catalog().groups()[0]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Engine,Speed,40001,0,1,unsigned,RPM"));
        assert!(lines[2].starts_with("Engine,Mode,40002,1,1,enum(List#1)"));
    }
}

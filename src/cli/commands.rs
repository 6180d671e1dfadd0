use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use log::info;
use std::sync::Arc;

use crate::catalog::RegisterCatalog;
use crate::config::Config;
use crate::modbus::RegisterImage;
use crate::output::ResultFormatter;
use crate::services::RegisterQueryEngine;

pub fn load_catalog(config: &Config) -> Result<RegisterCatalog> {
    let path = &config.export_file;
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading register map export {}", path.display()))?;
    let catalog = config
        .parser()
        .parse_bytes(&bytes)
        .with_context(|| format!("parsing register map export {}", path.display()))?;
    Ok(catalog)
}

fn load_snapshot(config: &Config) -> Result<RegisterImage> {
    match &config.snapshot_file {
        Some(path) => RegisterImage::load(path),
        None => bail!("no register snapshot configured; pass --snapshot or set snapshot_file"),
    }
}

/// `1234` or `0x04D2`.
fn parse_word(text: &str) -> Result<u16> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("'{}' is not a 16-bit register word", text))
}

fn arg<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", id))
}

fn print_header(formatter: &dyn ResultFormatter) {
    let header = formatter.format_header();
    if !header.is_empty() {
        print!("{}", header);
    }
}

/// Run the subcommand in `matches`, printing with `formatter`. Returns
/// `false` when no subcommand was given.
pub fn handle_subcommands(
    matches: &ArgMatches,
    config: &Config,
    formatter: &dyn ResultFormatter,
) -> Result<bool> {
    let Some((name, sub)) = matches.subcommand() else {
        return Ok(false);
    };

    let engine = RegisterQueryEngine::new(Arc::new(load_catalog(config)?));

    match name {
        "groups" => {
            info!("🔍 Listing register groups...");
            print!("{}", formatter.format_groups(engine.catalog()));
        }
        "registers" => {
            let group_name = arg(sub, "group")?;
            let group = engine
                .catalog()
                .group(group_name)
                .ok_or_else(|| anyhow!("unknown register group '{}'", group_name))?;
            print!("{}", formatter.format_group(group));
        }
        "types" => {
            print!("{}", formatter.format_types(engine.catalog().custom_types()));
        }
        "query" => {
            let (group, register) = (arg(sub, "group")?, arg(sub, "name")?);
            info!("📈 Querying {}/{}...", group, register);
            let image = load_snapshot(config)?;
            let result = engine.query(&image, group, register)?;
            print_header(formatter);
            println!("{}", formatter.format_result(&result).trim_end());
        }
        "read-group" => {
            let group = arg(sub, "group")?;
            info!("📊 Reading group {}...", group);
            let image = load_snapshot(config)?;
            let readings = engine.query_group(&image, group)?;
            print_header(formatter);
            println!("{}", formatter.format_readings(group, &readings).trim_end());
        }
        "decode" => {
            let (group, register) = (arg(sub, "group")?, arg(sub, "name")?);
            let words = sub
                .get_many::<String>("words")
                .into_iter()
                .flatten()
                .map(|w| parse_word(w))
                .collect::<Result<Vec<u16>>>()?;
            let result = engine.decode_words(group, register, &words)?;
            print_header(formatter);
            println!("{}", formatter.format_result(&result).trim_end());
        }
        other => bail!("unsupported subcommand '{}'", other),
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("1234").unwrap(), 1234);
        assert_eq!(parse_word("0x41CC").unwrap(), 0x41CC);
        assert_eq!(parse_word("0XFFFF").unwrap(), 0xFFFF);
        assert!(parse_word("70000").is_err());
        assert!(parse_word("0xZZ").is_err());
    }

    #[test]
    fn test_missing_export_names_path() {
        let mut config = Config::default();
        config.export_file = "/nonexistent/regmap.txt".into();
        let err = load_catalog(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/regmap.txt"));
    }

    #[test]
    fn test_query_without_snapshot_is_an_error() {
        assert!(load_snapshot(&Config::default()).is_err());
    }
}

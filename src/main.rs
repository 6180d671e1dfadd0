use anyhow::Result;
use env_logger::Env;
use log::debug;

use modbus_regmap::cli::{build_cli, handle_subcommands};
use modbus_regmap::config::Config;

fn main() {
    if let Err(e) = run() {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();
    debug!("🚀 regmap {}", modbus_regmap::VERSION);

    let config = Config::from_matches(&matches)?;
    let formatter = config.output_format()?.formatter(config.output.include_raw);

    if !handle_subcommands(&matches, &config, formatter.as_ref())? {
        build_cli().print_help()?;
        println!();
    }
    Ok(())
}

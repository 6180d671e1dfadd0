pub mod commands;

use clap::{Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("regmap")
        .version(crate::VERSION)
        .about("Query Modbus registers described by a GenConfig register map export")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("export")
                .short('e')
                .long("export")
                .value_name("FILE")
                .help("GenConfig register map export")
                .global(true),
        )
        .arg(
            Arg::new("snapshot")
                .short('s')
                .long("snapshot")
                .value_name("FILE")
                .help("TOML register snapshot used to answer reads")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "json", "csv"])
                .help("Output format")
                .global(true),
        )
        .arg(
            Arg::new("register-base")
                .long("register-base")
                .value_name("REF")
                .help("Register reference mapped to protocol address 0 (default 40001)")
                .global(true),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .action(ArgAction::SetTrue)
                .help("Show raw register words next to decoded values")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)")
                .global(true),
        )
        .subcommand(Command::new("groups").about("List register groups in declaration order"))
        .subcommand(
            Command::new("registers")
                .about("List the registers of one group")
                .arg(Arg::new("group").required(true)),
        )
        .subcommand(Command::new("types").about("List custom enumeration and bit-name types"))
        .subcommand(
            Command::new("query")
                .about("Read and decode one register")
                .arg(Arg::new("group").required(true))
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("read-group")
                .about("Read and decode every register of a group")
                .arg(Arg::new("group").required(true)),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode register words given on the command line")
                .arg(Arg::new("group").required(true))
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("words")
                        .required(true)
                        .num_args(1..)
                        .help("Words, decimal or 0x-prefixed hex, most significant first"),
                ),
        )
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{command, Arg, ArgAction};
use merlin_link::{report, Error, ErrorKind, Linker, LinkerConfig};

mod exit_codes;

fn main() -> ExitCode {
    let matches = command!()
        .max_term_width(100)
        .args(&[
            Arg::new("input")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Append)
                .help("REL units to link directly, or the one link script with -S"),
            Arg::new("output")
                .short('o')
                .value_name("path")
                .value_parser(clap::value_parser!(PathBuf))
                .help("The output file (default gs.out)"),
            Arg::new("define")
                .short('D')
                .value_name("key[=value]")
                .value_parser(clap::value_parser!(String))
                .action(ArgAction::Append)
                .help("Define a symbol before linking starts; a bare key defines 1"),
            Arg::new("no-express")
                .short('X')
                .action(ArgAction::SetTrue)
                .help("Suppress the express-load helper segment"),
            Arg::new("no-compress")
                .short('C')
                .action(ArgAction::SetTrue)
                .help("Suppress SUPER compression of the output"),
            Arg::new("script")
                .short('S')
                .action(ArgAction::SetTrue)
                .help("Treat the single input argument as a link script"),
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Enable verbose logging"),
        ])
        .get_matches();

    if matches.get_flag("verbose") {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("merlin_link", log::LevelFilter::Debug)
            .filter_module("merlin_link_cli", log::LevelFilter::Debug)
            .init();
    }

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Usage(message)) => {
            eprintln!("merlin-link: {}", message);
            ExitCode::from(exit_codes::EX_USAGE as u8)
        }
        Err(Failure::Link(e)) => {
            eprintln!("merlin-link: {}", e);
            let code = match e.kind() {
                ErrorKind::Io | ErrorKind::Write => exit_codes::EX_OSERR,
                ErrorKind::Decode | ErrorKind::Resolve | ErrorKind::Script => {
                    exit_codes::EX_DATAERR
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

enum Failure {
    Usage(String),
    Link(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Link(e)
    }
}

fn run(matches: &clap::ArgMatches) -> Result<(), Failure> {
    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("input")
        .unwrap_or_default()
        .cloned()
        .collect();
    let script_flag = matches.get_flag("script");

    if script_flag && inputs.len() != 1 {
        return Err(Failure::Usage(
            "-S requires exactly one argument, the link script".to_string(),
        ));
    }
    if !script_flag && inputs.is_empty() {
        return Err(Failure::Usage(
            "no input files given; pass one or more REL units, or a script with -S".to_string(),
        ));
    }

    let mut config = LinkerConfig::default();
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.output = output.clone();
    }
    config.verbose = matches.get_flag("verbose");
    config.express = !matches.get_flag("no-express");
    config.compress = !matches.get_flag("no-compress");
    for spec in matches.get_many::<String>("define").unwrap_or_default() {
        let define = merlin_link::numeric::parse_define(spec)?;
        config.defines.push(define);
    }

    let mut linker = Linker::new(config);

    let is_script = script_flag
        || (inputs.len() == 1
            && inputs[0]
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("S"))
                .unwrap_or(false));

    if is_script {
        linker.run_script(&inputs[0])?;
    } else {
        linker.link_direct(&inputs)?;
    }

    if linker.config.verbose {
        print_symbols(&linker);
    }
    Ok(())
}

/// Mirror `original_source/link.cpp`'s `print_symbols`: alphabetical pass,
/// then a pass sorted by value. Skipped entirely with an empty symbol table.
fn print_symbols(linker: &Linker) {
    if linker.symbols.is_empty() {
        return;
    }
    println!("Alphabetical symbol table:");
    for row in report::alphabetical(&linker.symbols) {
        println!("{}", report::format_row(&row));
    }
    println!("Numeric symbol table:");
    for row in report::numeric(&linker.symbols) {
        println!("{}", report::format_row(&row));
    }
}

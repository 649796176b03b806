//! The `yaparse` stage binary: a token stream in, the serialized AST out
//! (spec §4.2, §4.3, §6 "Serialized AST").
//!
//! Aggregates diagnostics rather than failing fast (spec §7): a malformed
//! declaration does not stop the parser from reporting errors in the rest
//! of the translation unit. `yapl::parser::parse` already implements that
//! policy internally, so this binary just prints whatever it returns.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

fn cli() -> Command {
    Command::new("yaparse")
        .about("Parse a YAPL token stream into the wire serialized-AST format")
        .arg(
            Arg::new("input")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Token-stream file to parse; reads standard input if omitted"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the serialized AST here instead of standard output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose stage logging"),
        )
}

fn init_logging(verbose: bool) {
    if verbose {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("yapl", log::LevelFilter::Debug)
            .init();
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<yapl::Error>() {
        Some(e) if e.kind() == yapl::ErrorKind::Io => 2,
        Some(_) => 1,
        None => 2,
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let tokens = match matches.get_one::<PathBuf>("input") {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read token stream '{}'", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read token stream from standard input")?;
            text
        }
    };

    log::debug!("parsing {} bytes of token stream", tokens.len());
    let output = yapl::parser::parse(&tokens)?;
    let text = yapl::ast_io::write_program(&output.program, &output.symbols, &output.structs);

    match matches.get_one::<PathBuf>("output") {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write serialized AST to '{}'", path.display()))?,
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("failed to write serialized AST to standard output")?,
    }

    Ok(())
}

fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(err) = run(&matches) {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

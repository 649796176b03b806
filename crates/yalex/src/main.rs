//! The `yalex` stage binary: source text in, a token stream out (spec
//! §4.1, §6 "Token stream format").
//!
//! A pure stream transformer, per the pipeline's process-per-stage contract:
//! reads its entire input, writes its entire output, exits. Diagnostics
//! (`#pragma message` text) go to stderr; the lexer itself fails fast on the
//! first fatal condition rather than aggregating.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

const STDIN_NAME: &str = "<stdin>";

fn cli() -> Command {
    Command::new("yalex")
        .about("Scan YAPL source into the wire token-stream format")
        .arg(
            Arg::new("input")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Source file to scan; reads standard input if omitted"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the token stream here instead of standard output"),
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
    let (source, file) = match matches.get_one::<PathBuf>("input") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read source file '{}'", path.display()))?;
            (text, path.display().to_string())
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read source from standard input")?;
            (text, STDIN_NAME.to_string())
        }
    };

    log::debug!("scanning {} ({} bytes)", file, source.len());
    let result = yapl::lexer::run(&source, &file)?;

    for message in &result.diagnostics {
        eprintln!("{}", message);
    }

    match matches.get_one::<PathBuf>("output") {
        Some(path) => fs::write(path, result.text)
            .with_context(|| format!("failed to write token stream to '{}'", path.display()))?,
        None => io::stdout()
            .write_all(result.text.as_bytes())
            .context("failed to write token stream to standard output")?,
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

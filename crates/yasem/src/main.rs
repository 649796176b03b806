//! The `yasem` stage binary: the serialized AST in, IR text out (spec §4.4,
//! §6 "IR format").
//!
//! This is the last stage owned by this crate; everything past it (code
//! generation, assembly, linking into a relocatable object) is out of
//! scope here and handled by the driver shelling out to an external
//! assembler. Aggregates diagnostics (spec §7): a type error in one
//! function does not stop the analyzer from reporting errors in the rest
//! of the translation unit.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

const STDIN_NAME: &str = "<stdin>";

/// Diagnostics for this failure were already printed by [`run`]; `main`
/// must not print it again, only use it to pick an exit code.
#[derive(Debug)]
struct AlreadyReported(i32);

impl std::fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "")
    }
}

impl std::error::Error for AlreadyReported {}

fn cli() -> Command {
    Command::new("yasem")
        .about("Lower a YAPL serialized AST into the wire IR text format")
        .arg(
            Arg::new("input")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Serialized-AST file to analyze; reads standard input if omitted"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the IR here instead of standard output"),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .value_name("name")
                .help("Logical source file name to stamp onto diagnostics and the IR program, \
                       since the serialized AST format does not carry it (defaults to the input path)"),
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
    if let Some(reported) = err.downcast_ref::<AlreadyReported>() {
        return reported.0;
    }
    match err.downcast_ref::<yapl::Error>() {
        Some(e) if e.kind() == yapl::ErrorKind::Io => 2,
        Some(_) => 1,
        None => 2,
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<PathBuf>("input");
    let ast_text = match input_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read serialized AST '{}'", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read serialized AST from standard input")?;
            text
        }
    };

    let file = matches
        .get_one::<String>("file")
        .cloned()
        .or_else(|| input_path.map(|p| p.display().to_string()))
        .unwrap_or_else(|| STDIN_NAME.to_string());

    log::debug!("analyzing {} bytes of serialized AST as {}", ast_text.len(), file);
    let bundle = yapl::ast_io::read_program(&ast_text, &file)?;
    let (program, errors) = yapl::semant::analyze_all(&bundle, &file);

    for error in &errors {
        eprintln!("{}", error);
    }

    let Some(program) = program else {
        return Err(AlreadyReported(1).into());
    };

    let text = yapl::ir::text::write_program(&program);

    match matches.get_one::<PathBuf>("output") {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write IR to '{}'", path.display()))?
        }
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("failed to write IR to standard output")?,
    }

    Ok(())
}

fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(err) = run(&matches) {
        if err.downcast_ref::<AlreadyReported>().is_none() {
            eprintln!("{:#}", err);
        }
        std::process::exit(exit_code(&err));
    }
}

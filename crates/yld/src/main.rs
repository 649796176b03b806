//! The `yld` linker: WOF relocatable objects in, an EXE executable out
//! (spec §4.5, §6 "CLI surface").
//!
//! Fails fast, like the lexer (spec §7): the first unresolved symbol,
//! duplicate global, or malformed object aborts the link with no partial
//! `.exe` written.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

const DEFAULT_OUTPUT: &str = "a.exe";

fn cli() -> Command {
    Command::new("yld")
        .about("Link WOF relocatable objects into a WUT-4 executable")
        .arg(
            Arg::new("objects")
                .required(true)
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .help("WOF object files to link, in link order"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Executable file to write (default: a.exe)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose linker logging"),
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
    let paths: Vec<&PathBuf> = matches.get_many::<PathBuf>("objects").unwrap().collect();
    let mut objects = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read object file '{}'", path.display()))?;
        log::debug!("loaded {} ({} bytes)", path.display(), bytes.len());
        objects.push(yapl::wof::Object::parse(&bytes)?);
    }

    let exe = yapl::link::link(&objects)?;

    let default_output = PathBuf::from(DEFAULT_OUTPUT);
    let output = matches.get_one::<PathBuf>("output").unwrap_or(&default_output);
    fs::write(output, exe.write())
        .with_context(|| format!("failed to write executable '{}'", output.display()))?;

    println!("Link successful: {}", output.display());
    println!("  code: {} bytes", exe.code.len());
    println!("  data: {} bytes", exe.data.len());

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

//! The `ya` driver: discovers the pipeline's stage binaries and pipes
//! source text through them (spec §4.6, §5 "process-per-stage").
//!
//! Each owned stage (`yalex`, `yaparse`, `yasem`) and the external,
//! out-of-scope assembler are run as child processes wired together by
//! stdin/stdout, exactly like a shell pipeline; only the final hop into
//! `yld` touches a real file, per spec §4.6 ("only the final
//! assembler/linker invocation uses temp files"). The driver never links
//! against the other stages' logic directly — it only knows how to find
//! and run them, which is the point of the process-per-stage contract
//! (spec §9 "Stage I/O").

use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command as ClapCommand};

/// File extension that marks an input as a WOF object rather than source
/// (spec §4.6 "link mode, detected when every argument has the object
/// extension"). Not spelled out verbatim in spec.md; chosen to match the
/// format's own name (§6 "Relocatable object (WOF)").
const OBJECT_EXT: &str = "wof";
const DEFAULT_LINK_OUTPUT: &str = "a.exe";

/// Propagates a child stage's own exit code. The child has already
/// written its diagnostics to its (inherited) stderr, so `main` must not
/// print anything more for this case.
#[derive(Debug)]
struct StageFailed(i32);

impl std::fmt::Display for StageFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "")
    }
}

impl std::error::Error for StageFailed {}

fn cli() -> ClapCommand {
    ClapCommand::new("ya")
        .about("Drive the YAPL pipeline: lex, parse, analyze, assemble, link")
        .arg(
            Arg::new("inputs")
                .required(true)
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .help("One source file, or one or more .wof object files to link"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Output file"),
        )
        .arg(
            Arg::new("stop-after-assembly")
                .short('S')
                .action(ArgAction::SetTrue)
                .help("Stop after semantic analysis/assembly; emit the assembly text"),
        )
        .arg(
            Arg::new("object-only")
                .short('c')
                .action(ArgAction::SetTrue)
                .help("Produce a relocatable object instead of linking an executable"),
        )
        .arg(
            Arg::new("keep")
                .short('k')
                .action(ArgAction::SetTrue)
                .help("Keep intermediate .lexout/.parseout/.ir/.asm files"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Verbose stage tracing"),
        )
}

fn init_logging(verbose: bool) {
    if verbose {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("ya", log::LevelFilter::Debug)
            .init();
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StageFailed>() {
        Some(s) => s.0,
        None => 2,
    }
}

/// Build the `Command` for a named stage, honoring `$YAPL/<stage>/<stage>`
/// when set and otherwise relying on `Command`'s own PATH search (spec
/// §4.6 "or via the platform's executable search path").
fn stage_command(name: &str) -> Command {
    match env::var_os("YAPL") {
        Some(root) => Command::new(Path::new(&root).join(name).join(name)),
        None => Command::new(name),
    }
}

/// Run a stage with `input` piped to its stdin, its stdout captured in
/// memory, and its stderr forwarded to ours unchanged (spec §5 "sub-process
/// standard-error forwarding").
fn run_piped(name: &str, extra_args: &[&str], input: &[u8], verbose: bool) -> Result<Vec<u8>> {
    let started = Instant::now();
    let mut cmd = stage_command(name);
    cmd.args(extra_args);
    if verbose {
        cmd.arg("-v");
    }
    cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to launch stage `{}` (is it on PATH or under $YAPL?)", name))?;

    let mut stdin = child.stdin.take().expect("piped stdin");
    let to_write = input.to_vec();
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(&to_write);
    });

    let mut output = Vec::new();
    child
        .stdout
        .take()
        .expect("piped stdout")
        .read_to_end(&mut output)
        .with_context(|| format!("failed to read output of stage `{}`", name))?;
    writer.join().expect("stdin writer thread panicked");

    let status = child.wait().with_context(|| format!("failed to wait on stage `{}`", name))?;
    trace_stage(name, extra_args, &status, started);
    if !status.success() {
        return Err(StageFailed(status.code().unwrap_or(1)).into());
    }
    Ok(output)
}

/// Run a stage with `input` piped to its stdin and its stdout redirected
/// straight to `out_path` (used only for the assembler hop into a `.wof`
/// file, per spec §4.6's temp-file carve-out).
fn run_piped_to_file(name: &str, extra_args: &[&str], input: &[u8], out_path: &Path, verbose: bool) -> Result<()> {
    let started = Instant::now();
    let out_file =
        fs::File::create(out_path).with_context(|| format!("failed to create '{}'", out_path.display()))?;
    let mut cmd = stage_command(name);
    cmd.args(extra_args);
    if verbose {
        cmd.arg("-v");
    }
    cmd.stdin(Stdio::piped()).stdout(Stdio::from(out_file)).stderr(Stdio::inherit());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to launch stage `{}` (is it on PATH or under $YAPL?)", name))?;
    let mut stdin = child.stdin.take().expect("piped stdin");
    let to_write = input.to_vec();
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(&to_write);
    });
    writer.join().expect("stdin writer thread panicked");

    let status = child.wait().with_context(|| format!("failed to wait on stage `{}`", name))?;
    trace_stage(name, extra_args, &status, started);
    if !status.success() {
        return Err(StageFailed(status.code().unwrap_or(1)).into());
    }
    Ok(())
}

/// Run a stage with inherited stdio throughout — used for `yld`, since it
/// operates on named files rather than stdin/stdout and its own
/// `Link successful: ...` banner should reach the user directly.
fn run_inherited(name: &str, args: &[&std::ffi::OsStr]) -> Result<()> {
    let started = Instant::now();
    let status = stage_command(name)
        .args(args)
        .status()
        .with_context(|| format!("failed to launch stage `{}` (is it on PATH or under $YAPL?)", name))?;
    trace_stage(name, args, &status, started);
    if !status.success() {
        return Err(StageFailed(status.code().unwrap_or(1)).into());
    }
    Ok(())
}

/// One-line per-invocation trace (argv, exit status, elapsed time) to the
/// driver's own stderr, gated behind `-v` (spec §4.6, SPEC_FULL §B "-v
/// verbose stage tracing").
fn trace_stage(name: &str, args: impl std::fmt::Debug, status: &ExitStatus, started: Instant) {
    log::debug!(
        "stage `{}` {:?} exited {} in {:.3}s",
        name,
        args,
        status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
        started.elapsed().as_secs_f64()
    );
}

fn is_object(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(OBJECT_EXT)
}

fn link_mode(inputs: &[PathBuf], output: Option<&PathBuf>, verbose: bool) -> Result<()> {
    let default_output = PathBuf::from(DEFAULT_LINK_OUTPUT);
    let output = output.unwrap_or(&default_output);
    let mut args: Vec<&std::ffi::OsStr> = vec![std::ffi::OsStr::new("-o"), output.as_os_str()];
    if verbose {
        args.push(std::ffi::OsStr::new("-v"));
    }
    args.extend(inputs.iter().map(|p| p.as_os_str()));
    run_inherited("yld", &args)
}

fn compile_mode(
    source: &Path,
    output: Option<&PathBuf>,
    stop_after_assembly: bool,
    object_only: bool,
    keep: bool,
    verbose: bool,
) -> Result<()> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "a".to_string());

    let source_bytes =
        fs::read(source).with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let lex_text = run_piped("yalex", &[], &source_bytes, verbose)?;
    if keep {
        fs::write(format!("{}.lexout", stem), &lex_text).context("failed to write .lexout")?;
    }

    let ast_text = run_piped("yaparse", &[], &lex_text, verbose)?;
    if keep {
        fs::write(format!("{}.parseout", stem), &ast_text).context("failed to write .parseout")?;
    }

    let file_arg = source.display().to_string();
    let ir_text = run_piped("yasem", &["--file", file_arg.as_str()], &ast_text, verbose)?;
    if keep {
        fs::write(format!("{}.ir", stem), &ir_text).context("failed to write .ir")?;
        fs::write(format!("{}.asm", stem), &ir_text).context("failed to write .asm")?;
    }

    if stop_after_assembly {
        let default_output = PathBuf::from(format!("{}.asm", stem));
        let out = output.unwrap_or(&default_output);
        fs::write(out, &ir_text).with_context(|| format!("failed to write '{}'", out.display()))?;
        return Ok(());
    }

    if object_only {
        let default_output = PathBuf::from(format!("{}.wof", stem));
        let out = output.unwrap_or(&default_output);
        run_piped_to_file("assembler", &[], &ir_text, out, verbose)?;
        return Ok(());
    }

    let temp_object = env::temp_dir().join(format!("yapl-ya-{}.wof", std::process::id()));
    run_piped_to_file("assembler", &[], &ir_text, &temp_object, verbose)?;

    let default_output = PathBuf::from(format!("{}.exe", stem));
    let out = output.unwrap_or(&default_output);
    let mut args = vec![std::ffi::OsStr::new("-o"), out.as_os_str()];
    if verbose {
        args.push(std::ffi::OsStr::new("-v"));
    }
    args.push(temp_object.as_os_str());
    let result = run_inherited("yld", &args);
    let _ = fs::remove_file(&temp_object);
    result
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let inputs: Vec<PathBuf> = matches.get_many::<PathBuf>("inputs").unwrap().cloned().collect();
    let output = matches.get_one::<PathBuf>("output");
    let verbose = matches.get_flag("verbose");

    if inputs.iter().all(|p| is_object(p)) {
        link_mode(&inputs, output, verbose)
    } else if inputs.len() == 1 && !is_object(&inputs[0]) {
        compile_mode(
            &inputs[0],
            output,
            matches.get_flag("stop-after-assembly"),
            matches.get_flag("object-only"),
            matches.get_flag("keep"),
            verbose,
        )
    } else {
        anyhow::bail!("expected either a single source file or a list of .wof object files")
    }
}

fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(err) = run(&matches) {
        if err.downcast_ref::<StageFailed>().is_none() {
            eprintln!("{:#}", err);
        }
        std::process::exit(exit_code(&err));
    }
}

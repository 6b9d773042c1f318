//! Command-line entry point: compiles a control table, loads the MeSH
//! tables and switch file, then streams input records through the
//! interpreter to produce the output file.
//!
//! Grounded in `original_source/marcconv.c`'s `main`.

use anyhow::{bail, Context, Result};
use marcconv_rs::argparser::{ArgError, CliOptions};
use marcconv_rs::codec::{read_codec, write_codec};
use marcconv_rs::control::{load_switches, ControlCompiler, NamedBufferStore};
use marcconv_rs::diagnostics::{Diagnostics, Location, Severity};
use marcconv_rs::interpreter::RecordOutcome;
use marcconv_rs::mesh::exception::ExceptionTable;
use marcconv_rs::mesh::language::LanguageTable;
use marcconv_rs::mesh::MeshTables;
use marcconv_rs::{Interpreter, RuleProgram};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};

const DEFAULT_EXCEPTION_FILE: &str = "meshexcp.tbl";
const DEFAULT_LANGUAGE_FILE: &str = "language.tbl";

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let prog = args.first().cloned().unwrap_or_else(|| "marcconv".to_string());

    let opts = match CliOptions::parse(args) {
        Ok(opts) => opts,
        Err(ArgError::UsageRequested) => {
            println!("{}", CliOptions::usage(&prog));
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", CliOptions::usage(&prog));
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&opts) {
        eprintln!("{prog}: fatal: {e:#}");
        std::process::exit(1);
    }
}

fn run(opts: &CliOptions) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&opts.log_path)
        .with_context(|| format!("opening log file {:?}", opts.log_path))?;
    let mut diag = Diagnostics::new(log_file, opts.max_errors as usize)
        .with_context(|| format!("writing run header to {:?}", opts.log_path))?;

    let program = compile_program(opts, &mut diag)?;
    let buffers = load_buffers(opts)?;
    let mesh_tables = load_mesh_tables()?;

    let infile = File::open(&opts.infile).with_context(|| format!("opening input file {:?}", opts.infile))?;
    let mut reader = BufReader::new(infile);

    let outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .append(opts.append)
        .truncate(!opts.append)
        .open(&opts.outfile)
        .with_context(|| format!("opening output file {:?}", opts.outfile))?;
    let mut writer = BufWriter::new(outfile);

    let mut interp = Interpreter::new(&program, &mesh_tables, buffers);

    if interp.run_session_pre(&mut diag) {
        bail!("session-pre chain raised a fatal diagnostic");
    }

    let mut input_records = 0usize;
    let mut output_records = 0usize;
    let mut rec_no = 0usize;

    loop {
        let Some(record) = read_codec(&mut reader)? else { break };
        rec_no += 1;
        if (rec_no as u64) <= opts.skip_records {
            continue;
        }
        if let Some(max) = opts.max_records {
            if input_records as u64 >= max {
                break;
            }
        }
        input_records += 1;

        match interp.convert_record(&record, rec_no, &mut diag) {
            RecordOutcome::Written(out) => {
                write_codec(&mut writer, &out)?;
                output_records += 1;
            }
            RecordOutcome::Suppressed => {}
            RecordOutcome::Fatal => {
                bail!("record {rec_no} raised a fatal diagnostic");
            }
        }
    }

    if interp.run_session_post(&mut diag) {
        bail!("session-post chain raised a fatal diagnostic");
    }

    writer.flush().context("flushing output file")?;

    let summary = diag.finish(input_records, output_records).context("writing run summary")?;
    log::info!(
        "run complete: {} in, {} out, {} warnings, {} errors",
        summary.input_records,
        summary.output_records,
        summary.warnings,
        summary.errors
    );
    Ok(())
}

fn compile_program(opts: &CliOptions, diag: &mut Diagnostics<File>) -> Result<RuleProgram> {
    let Some(ctlfile) = &opts.ctlfile else {
        log::info!("no control file given; running the identity program");
        return Ok(RuleProgram::empty());
    };
    let path = resolve_control_path(ctlfile, opts.ctl_search_path.as_deref());
    let file = File::open(&path).with_context(|| format!("opening control file {path:?}"))?;
    let mut compiler = ControlCompiler::new(opts.max_errors as usize);
    compiler
        .compile_file(ctlfile, BufReader::new(file))
        .with_context(|| format!("compiling control file {ctlfile:?}"))?;
    let (program, errors) = compiler.finish();
    for e in &errors {
        diag.report(&Location::Compile { file: ctlfile.clone(), line: 0 }, Severity::Error, &e.to_string());
    }
    if !errors.is_empty() {
        bail!("{} error(s) compiling {ctlfile:?}", errors.len());
    }
    Ok(program)
}

fn resolve_control_path(ctlfile: &str, search_path: Option<&str>) -> std::path::PathBuf {
    let here = std::path::Path::new(ctlfile);
    if here.exists() {
        return here.to_path_buf();
    }
    if let Some(dir) = search_path {
        let alt = std::path::Path::new(dir).join(ctlfile);
        if alt.exists() {
            return alt;
        }
    }
    here.to_path_buf()
}

fn load_buffers(opts: &CliOptions) -> Result<NamedBufferStore> {
    let Some(switchfile) = &opts.switchfile else {
        return Ok(NamedBufferStore::new());
    };
    let file = File::open(switchfile).with_context(|| format!("opening switch file {switchfile:?}"))?;
    load_switches(BufReader::new(file)).with_context(|| format!("parsing switch file {switchfile:?}"))
}

fn load_mesh_tables() -> Result<MeshTables> {
    let exceptions = match File::open(DEFAULT_EXCEPTION_FILE) {
        Ok(f) => ExceptionTable::load(BufReader::new(f)).context("loading MeSH exception table")?,
        Err(_) => {
            log::warn!("no {DEFAULT_EXCEPTION_FILE} found; MeSH exception lookups will never match");
            ExceptionTable::default()
        }
    };
    let languages = match File::open(DEFAULT_LANGUAGE_FILE) {
        Ok(f) => LanguageTable::load(BufReader::new(f)).context("loading MeSH language table")?,
        Err(_) => {
            log::warn!("no {DEFAULT_LANGUAGE_FILE} found; MeSH language expansion will never match");
            LanguageTable::default()
        }
    };
    let tables = MeshTables { exceptions, languages, ..MeshTables::default() };
    if std::env::var_os("MESHTEST").is_some() {
        println!("{tables:#?}");
    }
    if let Some(path) = std::env::var_os("MESHQUALFILE") {
        log::info!("MESHQUALFILE={path:?} set but qualifier expansion is a no-op extension point");
    }
    Ok(tables)
}

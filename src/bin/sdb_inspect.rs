//! sdb-inspect - print the system tables of a database log
//!
//! Replays the log and prints the requested system tables.
//!
//! Usage:
//!   sdb-inspect <log-file> [--log] [--tables] [--columns] [--indexes]
//!
//! With no table flags, `--log` and `--tables` are printed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context as _, Result};
use tracing::info;

use sdb::catalog::SystemTable;
use sdb::config::EngineConfig;
use sdb::database_manager::SharedDatabase;
use sdb::query::{Context, Query};
use sdb::rowset;
use sdb::Transaction;

const USAGE: &str = "Usage: sdb-inspect <log-file> [--log] [--tables] [--columns] [--indexes]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("sdb-inspect {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("sdb-inspect {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("{}", USAGE);
        return;
    }

    if let Err(err) = run(&args[1..]) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let mut path = None;
    let mut tables = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--log" => tables.push(SystemTable::Log),
            "--tables" => tables.push(SystemTable::Tables),
            "--columns" => tables.push(SystemTable::Columns),
            "--indexes" => tables.push(SystemTable::Indexes),
            flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
            file if path.is_none() => path = Some(PathBuf::from(file)),
            extra => bail!("unexpected argument {}\n{}", extra, USAGE),
        }
    }
    let Some(path) = path else {
        bail!("{}", USAGE);
    };
    if tables.is_empty() {
        tables = vec![SystemTable::Log, SystemTable::Tables];
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("inspect")
        .to_string();
    let started = Instant::now();
    let db = SharedDatabase::open(&name, &path, EngineConfig::default(), None)
        .with_context(|| format!("opening {}", path.display()))?;
    let db = Arc::new(db);
    info!(
        database = %name,
        bytes = db.log_len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "replayed"
    );

    let tr = db.begin(false);
    for sys in tables {
        print_table(&tr, sys)?;
    }
    tr.rollback();
    Ok(())
}

fn print_table(tr: &Transaction, sys: SystemTable) -> Result<()> {
    let rs = rowset::build(tr.clone(), &Query::table(sys.uid()), &Context::new())
        .with_context(|| format!("reading {}", sys.name()))?;
    println!("== {} ==", sys.name());
    let header: Vec<&str> = rs.columns().iter().map(|c| &*c.name).collect();
    println!("{}", header.join("\t"));
    let mut count = 0usize;
    rowset::for_each(&rs, |b| {
        let cells: Vec<String> = b.row().values().iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
        count += 1;
        Ok(())
    })?;
    println!("({} rows)", count);
    println!();
    Ok(())
}

mod db;
mod import;
mod ipc;
mod logging;
mod store;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};

use crate::import::config::parse_delimiter;
use crate::import::{ImportReport, Importer};
use crate::store::SqliteStore;

#[derive(Parser)]
#[command(name = "acadtrackd", version, about = "Academic records import daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer newline-delimited JSON requests on stdin (default).
    Serve,
    /// Import one spreadsheet export into a workspace and write a report.
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Workspace directory holding the database.
    #[arg(long)]
    workspace: PathBuf,
    /// Delimited source file.
    #[arg(long)]
    file: PathBuf,
    /// `,` `;` `|` `tab`; defaults to the workspace setting.
    #[arg(long)]
    delimiter: Option<String>,
    /// Report output path [default: <workspace>/import-report.json]
    #[arg(long)]
    report: Option<PathBuf>,
    /// Warn on student emails outside this domain.
    #[arg(long)]
    institutional_domain: Option<String>,
    /// Validate only; nothing is written to the database.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve();
            ExitCode::SUCCESS
        }
        Commands::Import(args) => run_import(&args),
    }
}

fn serve() {
    let mut state = ipc::AppState::default();
    info!(version = env!("CARGO_PKG_VERSION"), "sidecar ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = ipc::bad_json(&e.to_string());
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

fn run_import(args: &ImportArgs) -> ExitCode {
    match import_once(args) {
        Ok(report) => {
            print_summary(&report);
            if report.has_errors() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "import aborted");
            eprintln!("import failed: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn import_once(args: &ImportArgs) -> anyhow::Result<ImportReport> {
    let conn = db::open_db(&args.workspace)?;
    let mut cfg = ipc::load_import_config(&conn)?;
    if let Some(raw) = args.delimiter.as_deref() {
        let d = parse_delimiter(raw).ok_or_else(|| anyhow!("unsupported delimiter: {}", raw))?;
        cfg.delimiter = Some(d);
    }
    if let Some(domain) = args.institutional_domain.as_deref() {
        cfg.institutional_domain = Some(domain.to_string());
    }

    let importer = Importer::new(&cfg);
    let started_at = Utc::now().to_rfc3339();
    let report = if args.dry_run {
        importer.preview(&args.file)?
    } else {
        importer.apply(&args.file, &mut SqliteStore::new(&conn))?
    };

    // Applied data is already committed; record the run before touching the
    // report file so the two can never disagree.
    if !args.dry_run {
        let run_id = db::record_report(&conn, &report, &started_at)?;
        info!(run_id = %run_id, "run recorded");
    }

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.workspace.join("import-report.json"));
    if let Err(e) = write_report(&report_path, &report) {
        error!(error = %format!("{:#}", e), "report not written");
        eprintln!("report not written: {:#}", e);
    }
    Ok(report)
}

fn write_report(path: &Path, report: &ImportReport) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write report {}", path.to_string_lossy()))
}

fn print_summary(report: &ImportReport) {
    let c = &report.counts;
    println!(
        "{}: {} rows read, {} ok, {} errors{}",
        report.source_path,
        report.rows_read,
        report.rows_ok,
        report.rows_error,
        if report.dry_run { " (dry run)" } else { "" }
    );
    println!(
        "identities {}/{} subjects {}/{} staff {}/{} enrollments {}/{} assessments {}/{} (upserted/created)",
        c.identities_upserted,
        c.identities_created,
        c.subjects_upserted,
        c.subjects_created,
        c.staff_assignments_upserted,
        c.staff_assignments_created,
        c.enrollments_upserted,
        c.enrollments_created,
        c.assessments_upserted,
        c.assessments_created,
    );
    if report.warnings_total > 0 {
        println!("{} warnings", report.warnings_total);
    }
    for s in &report.error_samples {
        println!("  row {}: {}", s.row, s.message);
    }
}

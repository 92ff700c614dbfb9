use crate::catalog::{Catalog, Category, PatternRecord};
use crate::config::types::{ExecutionResult, Isolation, SandboxConfig, WORKER_ROLE};
use crate::core::sandbox::Sandbox;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Design pattern catalog with a sandboxed snippet runner", long_about = None)]
struct Cli {
    /// Internal role selector (hidden; used when the sandbox re-executes this binary)
    #[arg(long, hide = true)]
    internal_role: Option<String>,
    /// Sandbox configuration file (JSON); defaults to ./patternbox.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog entries
    List {
        /// Only this category (creational, structural, behavioral)
        #[arg(long)]
        category: Option<Category>,
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one pattern
    Show {
        /// Pattern id, e.g. "observer"
        id: String,
        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a snippet in the sandbox (reads stdin when no source is given)
    Run {
        /// Source text
        #[arg(long, conflicts_with_all = ["file", "pattern"])]
        code: Option<String>,
        /// Read source from a file
        #[arg(long, conflicts_with = "pattern")]
        file: Option<PathBuf>,
        /// Run the example of a catalog pattern
        #[arg(long)]
        pattern: Option<String>,
        /// Wall-clock timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Evaluate on a thread in this process instead of a worker process
        #[arg(long)]
        in_process: bool,
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check catalog integrity
    Check {
        /// Also run every pattern example through the sandbox
        #[arg(long)]
        run_examples: bool,
    },
}

extern "C" fn signal_handler(sig: i32) {
    // Only async-signal-safe calls here. Workers die with us via their
    // parent death signal.
    let msg = b"patternbox: signal received, exiting\n";
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(128 + sig);
    }
}

fn setup_signal_handlers() {
    unsafe {
        let handler = signal_handler as extern "C" fn(i32) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    if let Some(role) = cli.internal_role.as_deref() {
        if role == WORKER_ROLE {
            return crate::core::worker::run_worker().map_err(Into::into);
        }
        return Err(anyhow::anyhow!("unsupported internal role: {}", role));
    }

    setup_signal_handlers();

    let command = cli.command.ok_or_else(|| anyhow::anyhow!("missing command"))?;
    let catalog = Catalog::builtin().context("built-in pattern catalog is invalid")?;

    match command {
        Commands::List { category, json } => {
            let records: Vec<&PatternRecord> = match category {
                Some(category) => catalog.get_by_category(category),
                None => catalog.all().iter().collect(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    println!(
                        "{:<26} {:<11} {}",
                        record.id, record.category, record.intent
                    );
                }
            }
        }
        Commands::Show { id, json } => {
            let Some(record) = catalog.get_by_id(&id) else {
                eprintln!("Unknown pattern '{}'. Try `patternbox list`.", id);
                std::process::exit(1);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                print_record(record, catalog);
            }
        }
        Commands::Run {
            code,
            file,
            pattern,
            timeout_ms,
            in_process,
            json,
        } => {
            let source = match (code, file, pattern) {
                (Some(code), _, _) => code,
                (_, Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (_, _, Some(id)) => match catalog.get_by_id(&id) {
                    Some(record) => record.example_code.clone(),
                    None => {
                        eprintln!("Unknown pattern '{}'. Try `patternbox list`.", id);
                        std::process::exit(1);
                    }
                },
                _ => {
                    let mut source = String::new();
                    std::io::stdin()
                        .read_to_string(&mut source)
                        .context("failed to read source from stdin")?;
                    source
                }
            };

            let mut config = load_config(cli.config.as_ref())?;
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            if in_process {
                config.isolation = Isolation::InProcess;
            }

            let sandbox = Sandbox::new(config)?;
            let result = sandbox.execute(&source);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Check { run_examples } => {
            catalog.verify_integrity()?;
            println!(
                "catalog ok: {} patterns ({} creational, {} structural, {} behavioral)",
                catalog.len(),
                catalog.get_by_category(Category::Creational).len(),
                catalog.get_by_category(Category::Structural).len(),
                catalog.get_by_category(Category::Behavioral).len()
            );
            println!("fingerprint: {}", catalog.fingerprint());

            if run_examples {
                let mut config = load_config(cli.config.as_ref())?;
                // Examples run back to back; the interval would reject all but the first.
                config.min_interval_ms = 0;
                let sandbox = Sandbox::new(config)?;

                let mut failures = 0;
                for record in catalog.all() {
                    let result = sandbox.execute(&record.example_code);
                    if result.is_success() {
                        println!("  ok    {:<26} {} lines", record.id, result.output.len());
                    } else {
                        failures += 1;
                        println!(
                            "  FAIL  {:<26} {}: {}",
                            record.id,
                            result.status,
                            result.error.as_deref().unwrap_or("")
                        );
                    }
                }

                log::debug!("{}", sandbox.metrics().to_prometheus());
                if failures > 0 {
                    eprintln!("{} of {} examples failed", failures, catalog.len());
                    std::process::exit(1);
                }
                println!("all {} examples ran cleanly", catalog.len());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SandboxConfig> {
    let config = match path {
        Some(path) => SandboxConfig::load_from_file(path)?,
        None => SandboxConfig::load_default()?,
    };
    Ok(config)
}

fn print_record(record: &PatternRecord, catalog: &Catalog) {
    println!("{} ({})", record.name, record.category);
    println!();
    println!("Intent: {}", record.intent);
    println!();
    println!("{}", record.description);
    println!();
    println!("Problem: {}", record.problem);
    println!("Solution: {}", record.solution);

    print_list("Applicability", &record.applicability);
    if !record.participants.is_empty() {
        println!();
        println!("Participants:");
        for participant in &record.participants {
            println!("  - {}: {}", participant.name, participant.role);
        }
    }
    print_list("Pros", &record.pros);
    print_list("Cons", &record.cons);

    let related: Vec<&str> = catalog
        .related(&record.id)
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    if !related.is_empty() {
        println!();
        println!("Related: {}", related.join(", "));
    }

    println!();
    println!("Example (patternbox run --pattern {}):", record.id);
    for line in record.example_code.lines() {
        println!("    {}", line);
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!();
    println!("{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

fn print_result(result: &ExecutionResult) {
    for line in &result.output {
        println!("{}", line);
    }
    if result.truncated {
        eprintln!("[output truncated]");
    }
    if let Some(error) = &result.error {
        eprintln!("Error: {}", error);
    }
}

// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::{ColoredString, Colorize};
use stackssl::{
    clean, describe_tree, diagnose, expiry_report, generate, get_trust_store, install_ca,
    verify_tree, ChainCheck, CheckStatus, Config, ContainerCheck, DiagnosticReport, DockerCli,
    Error, ExpiryBand, ExpiryStatus, GenerationReport, Paths, ProbeOutcome, Result, TrustOutcome,
};
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helper functions
// ============================================================================

/// Display a confirmation prompt and return true if user confirms with 'y' or 'yes'.
/// End of input counts as no.
fn confirm_prompt(message: &str) -> bool {
    print!("{} [y/N] ", message);
    io::stdout().flush().ok();
    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => {
            println!();
            false
        }
        Ok(_) => {
            let input = input.trim().to_lowercase();
            input == "y" || input == "yes"
        }
    }
}

/// Ask before a destructive step unless `--yes` was given.
fn confirm_or_abort(yes: bool, message: &str) -> Result<()> {
    if yes || confirm_prompt(message) {
        Ok(())
    } else {
        Err(Error::Aborted)
    }
}

#[derive(Parser)]
#[command(name = "stackssl")]
#[command(about = "TLS certificates for the OpenCTI docker-compose stack")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    stackssl generate              # Create the CA and all service certificates
    stackssl verify                # Check every certificate against the CA
    stackssl check-exp             # Show days until expiry
    stackssl renew --yes           # Regenerate everything, then restart the stack
    sudo stackssl install-ca       # Trust the CA system-wide
    stackssl diagnose              # Files, chains, containers and live TLS

ENVIRONMENT:
    STACKSSL_DIR       Certificate directory (default: ./ssl)
    STACKSSL_CONFIG    Config file (default: ./stackssl.toml)
    RUST_LOG           Log filter, e.g. stackssl=debug")]
struct Cli {
    /// Certificate directory
    #[arg(long, global = true, value_name = "DIR")]
    ssl_dir: Option<PathBuf>,

    /// Config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the CA and a certificate for every service
    Generate {
        /// Replace an existing certificate directory without prompting
        #[arg(long, short)]
        yes: bool,
    },

    /// Verify the CA and every service certificate
    Verify,

    /// Show subject, issuer, validity and SANs of each certificate
    Info,

    /// Show days until each certificate expires
    CheckExp,

    /// Regenerate the CA and all service certificates
    Renew {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Delete the certificate directory
    Clean {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Install the CA into the system trust store (requires root)
    InstallCa,

    /// Check files, chains, containers and live TLS connections
    Diagnose,

    /// Print the effective configuration
    Config {
        /// Write it to the config file instead
        #[arg(long)]
        write: bool,

        /// Overwrite an existing config file without prompting
        #[arg(long, short, requires = "write")]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output helper that respects --quiet and --verbose flags.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn new(quiet: bool, verbose: bool) -> Self {
        // colored already honours NO_COLOR and CLICOLOR
        if !io::stdout().is_terminal() {
            colored::control::set_override(false);
        }
        Self { quiet, verbose }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: impl fmt::Display) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    fn verbose(&self, msg: impl fmt::Display) {
        if self.verbose {
            println!("{}", msg);
        }
    }
}

fn band_color(band: ExpiryBand, text: &str) -> ColoredString {
    match band {
        ExpiryBand::Critical => text.red(),
        ExpiryBand::Warning => text.yellow(),
        ExpiryBand::Ok => text.green(),
    }
}

fn pass() -> ColoredString {
    check_mark().green()
}

fn fail() -> ColoredString {
    cross_mark().red()
}

fn caution() -> ColoredString {
    warn_mark().yellow()
}

fn check_mark() -> &'static str {
    "\u{2713}" // Unicode checkmark
}

fn cross_mark() -> &'static str {
    "\u{2717}" // Unicode cross mark
}

fn warn_mark() -> &'static str {
    "\u{26a0}" // Unicode warning sign
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,stackssl=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    // This prevents "broken pipe" panics when output is piped to tools like grep/head
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let out = Output::new(cli.quiet, cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        return cmd_completions(shell);
    }

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    let paths = Paths::resolve(cli.ssl_dir.as_deref(), &config);
    tracing::debug!(
        config = %config_path.display(),
        ssl_dir = %paths.base.display(),
        "resolved paths"
    );

    match cli.command {
        Commands::Generate { yes } => cmd_generate(&paths, &config, yes, out),
        Commands::Verify => cmd_verify(&paths, &config, out),
        Commands::Info => cmd_info(&paths, &config, out),
        Commands::CheckExp => cmd_check_exp(&paths, &config, out),
        Commands::Renew { yes } => cmd_renew(&paths, &config, yes, out),
        Commands::Clean { yes } => cmd_clean(&paths, yes, out),
        Commands::InstallCa => cmd_install_ca(&paths, out),
        Commands::Diagnose => cmd_diagnose(&paths, &config, out),
        Commands::Config { write, yes } => cmd_config(&config, &config_path, write, yes, out),
        Commands::Completions { .. } => Ok(()),
    }
}

fn cmd_generate(paths: &Paths, config: &Config, yes: bool, out: Output) -> Result<()> {
    let overwrite = paths.tree_exists();
    if overwrite {
        confirm_or_abort(
            yes,
            &format!(
                "{} already exists. Replace the CA and all certificates?",
                paths.base.display()
            ),
        )?;
    }

    let banner = format!("Generating certificates in {}...", paths.base.display());
    out.print(banner.blue());
    let report = generate(paths, config, overwrite)?;
    print_generation_report(&report, out)
}

fn print_generation_report(report: &GenerationReport, out: Output) -> Result<()> {
    out.print(&format!("{} CA created", pass()));
    for service in &report.services {
        match &service.failure {
            None => {
                out.print(&format!("{} {} certificate created", pass(), service.name));
                out.verbose(&format!("    SANs: {}", service.subject_alt_names.join(", ")));
            }
            Some(reason) => println!(
                "{} {} certificate failed verification: {}",
                fail(),
                service.name,
                reason
            ),
        }
    }
    if let Some((uid, gid)) = report.owner {
        out.verbose(&format!("Ownership set to {}:{}", uid, gid));
    }

    let failed = report.failed();
    if failed > 0 {
        return Err(Error::ChecksFailed { failed });
    }

    out.print("");
    let done = format!("Certificates written to {}", report.base.display());
    out.print(done.green());
    if report.replaced {
        out.print("The previous CA and certificates were replaced.");
    }
    Ok(())
}

fn describe_missing(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn cmd_verify(paths: &Paths, config: &Config, out: Output) -> Result<()> {
    let banner = format!("Verifying certificates in {}...", paths.base.display());
    out.print(banner.blue());

    let report = verify_tree(paths, config);
    for entry in &report.entries {
        match &entry.status {
            CheckStatus::Verified => println!("  {} {}", pass(), entry.name),
            CheckStatus::Missing(files) => println!(
                "  {} {}: missing {}",
                fail(),
                entry.name,
                describe_missing(files)
            ),
            CheckStatus::Failed(reason) => {
                println!("  {} {}: {}", fail(), entry.name, reason)
            }
        }
    }

    println!();
    println!(
        "Summary: {} verified, {} failed",
        report.verified(),
        report.failed()
    );

    if report.all_verified() {
        Ok(())
    } else {
        Err(Error::ChecksFailed {
            failed: report.failed(),
        })
    }
}

fn cmd_info(paths: &Paths, config: &Config, out: Output) -> Result<()> {
    let summaries = describe_tree(paths, config);
    if summaries.is_empty() {
        out.print(&format!("No certificates found in {}", paths.base.display()));
        return Ok(());
    }

    for (i, summary) in summaries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", summary.name.blue());
        println!("  Path:       {}", summary.path.display());
        match &summary.info {
            Ok(info) => {
                println!("  Subject:    {}", info.subject);
                println!("  Issuer:     {}", info.issuer);
                println!("  Not before: {}", info.not_before_string());
                println!("  Not after:  {}", info.not_after_string());
                if info.subject_alt_names.is_empty() {
                    println!("  SANs:       (none)");
                } else {
                    println!("  SANs:       {}", info.subject_alt_names.join(", "));
                }
                out.verbose(&format!("  Serial:     {}", info.serial));
            }
            Err(reason) => println!("  {} unreadable: {}", fail(), reason),
        }
    }

    Ok(())
}

fn cmd_check_exp(paths: &Paths, config: &Config, out: Output) -> Result<()> {
    let banner = format!(
        "Certificate expiry (critical < {} days, warning < {} days)",
        config.expiry.critical_days, config.expiry.warning_days
    );
    out.print(banner.blue());

    for entry in expiry_report(paths, config) {
        match entry.status {
            ExpiryStatus::Remaining {
                days,
                expires,
                band,
            } => println!(
                "  {:16} {}  {}",
                entry.name,
                expires,
                band_color(band, &stackssl::expiry::describe_days(days))
            ),
            ExpiryStatus::Missing => println!("  {:16} {}", entry.name, "missing".yellow()),
            ExpiryStatus::Unreadable(reason) => {
                println!("  {:16} {}", entry.name, format!("unreadable: {}", reason).red())
            }
        }
    }

    Ok(())
}

fn cmd_renew(paths: &Paths, config: &Config, yes: bool, out: Output) -> Result<()> {
    confirm_or_abort(
        yes,
        &format!(
            "Regenerate the CA and all certificates in {}?",
            paths.base.display()
        ),
    )?;

    out.print("Renewing certificates...".blue());
    let report = generate(paths, config, true)?;
    print_generation_report(&report, out)?;

    println!();
    println!(
        "{}",
        "Restart the stack to load the new certificates: docker compose restart".yellow()
    );
    Ok(())
}

fn cmd_clean(paths: &Paths, yes: bool, out: Output) -> Result<()> {
    if !paths.tree_exists() {
        out.print(&format!("Nothing to clean: {} does not exist", paths.base.display()));
        return Ok(());
    }

    confirm_or_abort(
        yes,
        &format!(
            "Delete {} including the CA private key?",
            paths.base.display()
        ),
    )?;

    clean(paths)?;
    out.print(&format!("{} Removed {}", pass(), paths.base.display()));
    Ok(())
}

fn cmd_install_ca(paths: &Paths, out: Output) -> Result<()> {
    let store = get_trust_store();
    out.verbose(&format!("Trust store: {}", store.name()));

    match install_ca(paths, store.as_ref())? {
        TrustOutcome::Installed { location } => {
            out.print(&format!(
                "{} CA installed into {} ({})",
                pass(),
                store.name(),
                location.display()
            ));
        }
        TrustOutcome::AlreadyTrusted { store } => {
            out.print(&format!("{} CA is already trusted by {}", pass(), store));
        }
        TrustOutcome::Manual { instructions } => {
            println!("{}", instructions.yellow());
        }
    }
    Ok(())
}

fn cmd_diagnose(paths: &Paths, config: &Config, out: Output) -> Result<()> {
    let runtime = DockerCli::default();
    let report = match diagnose(paths, config, &runtime) {
        Ok(report) => report,
        Err(e @ Error::TreeMissing(_)) => {
            println!(
                "{}",
                format!("SSL directory '{}' not found.", paths.base.display()).red()
            );
            println!("{}", "Run 'stackssl generate' first to create certificates.".yellow());
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    print_file_checks(&report, out);
    print_chain_checks(&report, out);
    print_container_checks(&report, config, out);
    print_connection_checks(&report, config, out);
    print_diagnostic_summary(&report, out);

    if report.has_issues() {
        println!();
        println!("{}", "Some issues found - check the report above.".yellow());
        Err(Error::ChecksFailed {
            failed: report.issue_count(),
        })
    } else {
        println!();
        println!("{}", "All certificates are valid!".green());
        Ok(())
    }
}

fn print_file_checks(report: &DiagnosticReport, out: Output) {
    println!("{}", "Validating certificate files...".blue());
    match &report.ca_files {
        CheckStatus::Verified => println!("  {} CA certificate and key found", pass()),
        CheckStatus::Missing(files) => println!(
            "  {} CA certificate or key missing: {}",
            fail(),
            describe_missing(files)
        ),
        CheckStatus::Failed(reason) => println!("  {} CA: {}", fail(), reason),
    }
    for service in &report.services {
        match &service.files {
            CheckStatus::Verified => {
                println!("  {} {} certificates found", pass(), service.name)
            }
            CheckStatus::Missing(files) => println!(
                "  {} {} certificates missing: {}",
                fail(),
                service.name,
                describe_missing(files)
            ),
            CheckStatus::Failed(reason) => {
                println!("  {} {}: {}", fail(), service.name, reason)
            }
        }
    }
}

fn print_chain_checks(report: &DiagnosticReport, out: Output) {
    println!();
    println!("{}", "Checking certificate validity...".blue());
    for service in &report.services {
        match &service.chain {
            ChainCheck::Valid {
                subject,
                subject_alt_names,
                ..
            } => {
                println!("  {} {} certificate is valid", pass(), service.name);
                out.print(&format!("      Subject: {}", subject));
                out.print(&format!("      SANs: {}", subject_alt_names.join(", ")));
            }
            ChainCheck::Invalid(reason) => println!(
                "  {} {} certificate verification failed: {}",
                fail(),
                service.name,
                reason
            ),
            ChainCheck::Skipped => println!(
                "  {} {} skipped (certificate or CA copy missing)",
                caution(),
                service.name
            ),
        }
    }
}

fn print_container_checks(report: &DiagnosticReport, config: &Config, out: Output) {
    println!();
    println!("{}", "Inspecting containers...".blue());

    let mut runtime_reported = false;
    for service in &report.services {
        match &service.container {
            ContainerCheck::NotConfigured => {
                out.verbose(&format!("  - {}: no container configured", service.name))
            }
            ContainerCheck::RuntimeUnavailable(reason) => {
                if !runtime_reported {
                    println!("  {} docker unavailable: {}", caution(), reason);
                    runtime_reported = true;
                }
            }
            ContainerCheck::NotRunning => println!(
                "  {} {}: container not running",
                caution(),
                service.name
            ),
            ContainerCheck::Listing(listing) => {
                println!(
                    "  {} {}: {}",
                    pass(),
                    service.name,
                    config.diagnostics.container_cert_dir
                );
                for line in listing.lines() {
                    out.print(&format!("      {}", line));
                }
            }
            ContainerCheck::ListFailed(reason) => println!(
                "  {} {}: cannot list {}: {}",
                fail(),
                service.name,
                config.diagnostics.container_cert_dir,
                reason
            ),
        }
    }
}

fn print_connection_checks(report: &DiagnosticReport, config: &Config, out: Output) {
    println!();
    let banner = format!(
        "Testing SSL connectivity to {}...",
        config.diagnostics.probe_host
    );
    println!("{}", banner.blue());
    for service in &report.services {
        match &service.connection {
            None => out.verbose(&format!("  - {}: no port configured", service.name)),
            Some(ProbeOutcome::Handshake {
                peer_subject,
                protocol,
            }) => {
                println!(
                    "  {} {} SSL connection successful ({})",
                    pass(),
                    service.name,
                    protocol
                );
                if let Some(subject) = peer_subject {
                    out.verbose(&format!("      Peer: {}", subject));
                }
            }
            Some(ProbeOutcome::TimedOut) => println!(
                "  {} {} connection timeout (service may be down)",
                caution(),
                service.name
            ),
            Some(ProbeOutcome::Refused) => println!(
                "  {} {} connection refused (service not running)",
                caution(),
                service.name
            ),
            Some(ProbeOutcome::Failed(reason)) => println!(
                "  {} {} SSL connection failed: {}",
                fail(),
                service.name,
                reason
            ),
        }
    }
}

fn print_diagnostic_summary(report: &DiagnosticReport, out: Output) {
    let total = report.services.len();

    println!();
    println!("{}", "Certificate Validation Report".blue());
    println!("{}", "============================".blue());
    println!();
    println!("Summary:");
    println!(
        "  Certificate files:  {}/{}",
        report.files_found(),
        report.file_total()
    );
    println!("  Valid certificates: {}/{}", report.chains_valid(), total);
    println!("  SSL connections:    {}/{}", report.handshakes_ok(), total);

    if !out.quiet {
        println!();
        println!("Detailed Results:");
        for service in &report.services {
            println!();
            println!("{}:", service.name.to_uppercase());
            let files = if service.files == CheckStatus::Verified {
                pass()
            } else {
                fail()
            };
            println!("  Files: {}", files);
            let validity = match &service.chain {
                ChainCheck::Valid {
                    days_remaining,
                    band,
                    ..
                } => band_color(
                    *band,
                    &format!(
                        "{} ({})",
                        check_mark(),
                        stackssl::expiry::describe_days(*days_remaining)
                    ),
                ),
                _ => fail(),
            };
            println!("  Validity: {}", validity);
            let connection = match &service.connection {
                Some(outcome) if outcome.is_success() => pass(),
                Some(_) => fail(),
                None => "-".normal(),
            };
            println!("  Connection: {}", connection);
        }
    }

    let recommendations = report.recommendations();
    if !recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".blue());
        for rec in recommendations {
            println!("{}", format!("  \u{2022} {}", rec).yellow());
        }
    }
}

fn cmd_config(config: &Config, path: &Path, write: bool, yes: bool, out: Output) -> Result<()> {
    if !write {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if path.exists() {
        confirm_or_abort(yes, &format!("Overwrite {}?", path.display()))?;
    }
    config.save(path)?;
    out.print(&format!("{} Wrote {}", pass(), path.display()));
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "stackssl", &mut io::stdout());
    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pipewright_builder::PipelineGraph;
use pipewright_catalog::{builtin, CatalogFile, DescriptorProvider, InMemoryCatalog, SlotKind};
use pipewright_core::{BuilderConfig, BuilderError, InputRef, ScopeId, Severity, StageKind, ValidationReport};

mod definition;

use definition::PipelineDefinition;

/// pipewright - build and validate data-quality pipelines
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: pipewright.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline definition and write a report
    Check {
        /// Pipeline definition (TOML or JSON)
        pipeline: PathBuf,

        /// Catalog file (overrides the one named in the definition)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output file for the validation report
        #[arg(short, long, default_value = "validation.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// Compile a pipeline definition into a job
    Compile {
        /// Pipeline definition (TOML or JSON)
        pipeline: PathBuf,

        /// Catalog file (overrides the one named in the definition)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output file for the job; printed to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show every scope with its stages in execution order
    Plan {
        /// Pipeline definition (TOML or JSON)
        pipeline: PathBuf,

        /// Catalog file (overrides the one named in the definition)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// List the built-in stages
    Stages {
        /// Only stages of this kind (filter, transformer, analyzer)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        BuilderConfig::from_file(config_path)?
    } else if Path::new("pipewright.toml").exists() {
        BuilderConfig::from_file(Path::new("pipewright.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        BuilderConfig::default()
    };

    match cli.command {
        Commands::Check {
            pipeline,
            catalog,
            output,
            markdown,
        } => check_command(&config, &pipeline, catalog.as_deref(), &output, markdown.as_deref(), cli.verbose),
        Commands::Compile {
            pipeline,
            catalog,
            output,
        } => compile_command(&config, &pipeline, catalog.as_deref(), output.as_deref(), cli.verbose),
        Commands::Plan { pipeline, catalog } => plan_command(&config, &pipeline, catalog.as_deref(), cli.verbose),
        Commands::Stages { kind } => stages_command(kind.as_deref()),
    }
}

/// Log to stderr; `PIPEWRIGHT_LOG` takes precedence over `--verbose`
fn init_tracing(verbose: bool) {
    let default = if verbose { "pipewright=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_env("PIPEWRIGHT_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the definition and its catalog, then replay it on a fresh graph
fn load_pipeline(
    config: &BuilderConfig,
    pipeline: &Path,
    catalog: Option<&Path>,
    verbose: bool,
) -> Result<PipelineGraph> {
    if verbose {
        eprintln!("{} {}", "Loading pipeline from:".cyan(), pipeline.display());
    }
    let definition = PipelineDefinition::from_file(pipeline)?;

    let catalog_path = match (catalog, &definition.catalog) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => pipeline.parent().unwrap_or(Path::new(".")).join(path),
        (None, None) => PathBuf::from("catalog.json"),
    };
    if verbose {
        eprintln!("{} {}", "Loading catalog from:".cyan(), catalog_path.display());
    }
    let catalog = load_catalog(&catalog_path)?;

    let mut graph = PipelineGraph::with_config(Arc::new(catalog), config.clone())?
        .with_descriptors(Arc::new(builtin::registry()));
    definition
        .apply(&mut graph)
        .with_context(|| format!("Failed to import {}", pipeline.display()))?;

    Ok(graph)
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Catalog not found at {}", path.display()))?;

    let catalog = if path.extension().is_some_and(|ext| ext == "toml") {
        let file: CatalogFile = toml::from_str(&contents)?;
        InMemoryCatalog::from_file_contents(file)
    } else {
        InMemoryCatalog::from_json(&contents)?
    };
    tracing::debug!(tables = catalog.table_count(), "loaded catalog");
    Ok(catalog)
}

/// Check command - validate the pipeline and write the report
fn check_command(
    config: &BuilderConfig,
    pipeline: &Path,
    catalog: Option<&Path>,
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let graph = load_pipeline(config, pipeline, catalog, verbose)?;

    if verbose {
        eprintln!("{}", "Validating pipeline...".cyan());
    }
    let report = graph.validate();

    report.save_to_file(output)?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Compile command - write the job snapshot
fn compile_command(
    config: &BuilderConfig,
    pipeline: &Path,
    catalog: Option<&Path>,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let graph = load_pipeline(config, pipeline, catalog, verbose)?;

    let job = match graph.to_job() {
        Ok(job) => job,
        Err(err @ BuilderError::NotConfigured { .. }) => {
            print_report_summary(&ValidationReport::from_diagnostics(err.into_diagnostics()));
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let json = job.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("{} {}", "Job saved to:".green(), path.display());
        }
        None => println!("{}", json),
    }

    eprintln!(
        "{} {} stages, fingerprint {}",
        "Compiled".green().bold(),
        job.stage_count(),
        job.fingerprint()?.dimmed()
    );

    Ok(())
}

/// Plan command - print scopes and execution order
fn plan_command(config: &BuilderConfig, pipeline: &Path, catalog: Option<&Path>, verbose: bool) -> Result<()> {
    let graph = load_pipeline(config, pipeline, catalog, verbose)?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Pipeline Plan".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());

    print_scope(&graph, graph.root())?;

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

fn print_scope(graph: &PipelineGraph, scope: ScopeId) -> Result<()> {
    let builder = graph.scope(scope)?;
    let sources: Vec<&str> = builder
        .source_columns()
        .iter()
        .filter_map(|id| graph.column_name(*id))
        .collect();

    println!();
    println!("{} {}", "Scope:".bold(), graph.scope_path(scope).green());
    if let Some(table) = builder.table() {
        println!("  {} {}", "Table:".bold(), table);
    }
    println!("  {} {}", "Sources:".bold(), sources.join(", "));

    let order = graph.execution_order(scope)?;
    for (i, id) in order.iter().enumerate() {
        let component = graph.component(*id)?;
        let inputs: Vec<String> = component.input_columns().iter().map(|i| input_label(graph, i)).collect();
        let outputs: Vec<&str> = component
            .output_columns()
            .iter()
            .filter_map(|c| graph.column_name(*c))
            .collect();

        let status = if component.is_configured() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {}. {} {} ({})",
            i + 1,
            status,
            component.label().yellow(),
            component.kind()
        );
        println!("       [{}] -> [{}]", inputs.join(", "), outputs.join(", "));
        if let Some(requirement) = graph.effective_requirement(*id)? {
            let outcomes: Vec<String> = requirement
                .outcomes()
                .iter()
                .map(|o| format!("{}={}", graph.component(o.filter).map(|f| f.label()).unwrap_or_default(), o.category))
                .collect();
            println!("       {} {}", "requires".dimmed(), outcomes.join(" AND "));
        }
    }

    for id in &order {
        for (_, child) in graph.component(*id)?.output_streams() {
            print_scope(graph, *child)?;
        }
    }

    Ok(())
}

fn input_label(graph: &PipelineGraph, input: &InputRef) -> String {
    match input {
        InputRef::Column { id } => graph.column_name(*id).unwrap_or("?").to_string(),
        InputRef::Constant(c) => format!("\"{}\"", c.value),
        InputRef::Expression(e) => format!("#{{{}}}", e.expression),
    }
}

/// Stages command - list the built-in stage library
fn stages_command(kind: Option<&str>) -> Result<()> {
    let kinds = match kind.map(str::to_lowercase).as_deref() {
        None => vec![StageKind::Filter, StageKind::Transformer, StageKind::Analyzer],
        Some("filter") => vec![StageKind::Filter],
        Some("transformer") => vec![StageKind::Transformer],
        Some("analyzer") => vec![StageKind::Analyzer],
        Some(other) => {
            return Err(anyhow::anyhow!(
                "Unknown stage kind '{}'. Expected filter, transformer or analyzer",
                other
            ))
        }
    };

    let registry = builtin::registry();
    for kind in kinds {
        println!("\n{}", format!("{}s", kind).bold().bright_blue());

        for descriptor in registry.descriptors_of(kind) {
            println!("  {}", descriptor.name().green());
            for slot in descriptor.slots() {
                let shape = match (&slot.kind, slot.array) {
                    (SlotKind::Column { accepts }, true) => format!("{} columns", accepts),
                    (SlotKind::Column { accepts }, false) => format!("{} column", accepts),
                    (SlotKind::Value, true) => "values".to_string(),
                    (SlotKind::Value, false) => "value".to_string(),
                };
                let required = if slot.required { " (required)".yellow() } else { "".normal() };
                println!("    - {}: {}{}", slot.name, shape, required);
            }
            if !descriptor.outcomes().is_empty() {
                println!("    outcomes: {}", descriptor.outcomes().join(", "));
            }
            let streams: Vec<&str> = descriptor.output_streams().iter().map(|s| s.name.as_str()).collect();
            if !streams.is_empty() {
                println!("    streams: {}", streams.join(", "));
            }
        }
    }

    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &ValidationReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Pipeline Validation Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Stages checked: {}", report.summary.stages_checked);
    println!("  Scopes checked: {}", report.summary.scopes_checked);
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
        if let Some(fingerprint) = &report.fingerprint {
            println!("  Job fingerprint: {}", fingerprint.dimmed());
        }
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", location_label(loc));
            }

            if let Some(exp) = &diag.expected {
                println!("    Expected: {}", exp);
            }
            if let Some(act) = &diag.actual {
                println!("    Actual:   {}", act);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn location_label(location: &pipewright_core::Location) -> String {
    let mut label = location.scope.clone();
    if let Some(stage) = &location.stage {
        label.push_str(&format!(" > {}", stage));
    }
    if let Some(property) = &location.property {
        label.push_str(&format!(" > {}", property));
    }
    if let Some(column) = &location.column {
        label.push_str(&format!(" ({})", column));
    }
    label
}

/// Generate markdown report
fn generate_markdown_report(report: &ValidationReport) -> String {
    let mut md = String::new();

    md.push_str("# Pipeline Validation Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Stages checked: {}\n", report.summary.stages_checked));
    md.push_str(&format!("- Total diagnostics: {}\n", report.summary.total));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Info: {}\n", report.summary.info));
    md.push('\n');

    if report.diagnostics.is_empty() {
        md.push_str("✅ **No issues found!**\n");
        if let Some(fingerprint) = &report.fingerprint {
            md.push_str(&format!("\n**Job fingerprint:** `{}`\n", fingerprint));
        }
    } else {
        md.push_str("## Diagnostics\n\n");

        for diag in &report.diagnostics {
            let severity_emoji = match diag.severity {
                Severity::Error => "❌",
                Severity::Warn => "⚠️",
                Severity::Info => "ℹ️",
            };

            md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
            md.push_str(&format!("{}\n\n", diag.message));

            if let Some(loc) = &diag.location {
                md.push_str(&format!("**Location:** {}\n\n", location_label(loc)));
            }
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::{Diagnostic, DiagnosticCode, Location};

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn markdown_report_lists_locations() {
        let report = ValidationReport::from_diagnostics(vec![Diagnostic::error(
            DiagnosticCode::UnconfiguredProperty,
            "Property 'column' of 'Number range' is required but not set",
        )
        .with_location(Location::new("root").with_stage("Number range").with_property("column"))]);

        let md = generate_markdown_report(&report);
        assert!(md.contains("UNCONFIGURED_PROPERTY"));
        assert!(md.contains("**Location:** root > Number range > column"));
    }
}

//! blockgate CLI
//!
//! CLI tool for compiling filter lists, inspecting rule files and checking
//! requests against a blocker configuration.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bg_compiler::{optimize_rules, parse_filter_list, rule_set_builder};
use bg_core::ruleset::{RuleSet, SectionId};
use bg_core::{BlockDecision, BlockerConfig, ContentBlocker, ContentType};

#[derive(Parser)]
#[command(name = "bg-cli")]
#[command(about = "blockgate rule compiler and request checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into a rule file
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output rule file
        #[arg(short, long, default_value = "rules.dat")]
        output: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Dump rule file info
    Info {
        /// Rule file to inspect
        #[arg(short, long)]
        input: String,
    },

    /// Decide a single request against a JSON blocker configuration
    Check {
        /// Configuration file with "rules" and "whitelist"
        #[arg(short, long)]
        config: String,

        /// URL of the page issuing the request
        #[arg(short, long)]
        site: Option<String>,

        /// Requested URL
        #[arg(short, long)]
        url: String,

        /// Content type (script, image, stylesheet, document, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        content_type: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            verbose,
        } => cmd_compile(&input, &output, verbose),
        Commands::Info { input } => cmd_info(&input),
        Commands::Check {
            config,
            site,
            url,
            content_type,
        } => cmd_check(&config, site.as_deref(), &url, &content_type),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(inputs: &[String], output: &str, verbose: bool) -> Result<(), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut all_rules = Vec::new();
    let mut total_lines = 0usize;

    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;

        let line_count = content.lines().count();
        total_lines += line_count;

        let mut rules = parse_filter_list(&content);
        for rule in &mut rules {
            rule.list_id = list_id as u16;
        }

        if verbose {
            println!(
                "  [{}] {} - {} lines, {} rules",
                list_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                line_count,
                rules.len()
            );
        }

        all_rules.extend(rules);
    }

    let stats = optimize_rules(&mut all_rules);
    let build_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32);
    let builder = rule_set_builder(&all_rules).with_build_id(build_id);
    if verbose {
        println!("  Writing {} rules (build id {})", builder.rule_count(), build_id);
    }
    let bytes = builder.build();

    RuleSet::load(bytes.clone()).map_err(|e| format!("Generated rule file failed validation: {}", e))?;

    let mut file = fs::File::create(output).map_err(|e| format!("Failed to create '{}': {}", output, e))?;
    file.write_all(&bytes)
        .map_err(|e| format!("Failed to write '{}': {}", output, e))?;

    println!("Compiled {} filter lists to '{}'", inputs.len(), output);
    println!("  Lines:    {}", total_lines);
    println!("  Rules:    {} -> {} (dedupe removed {})", stats.before, stats.after, stats.deduped);
    println!("  Size:     {} bytes ({:.1} KB)", bytes.len(), bytes.len() as f64 / 1024.0);
    println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_info(input: &str) -> Result<(), String> {
    let rule_set = RuleSet::open(input).map_err(|e| format!("Invalid rule file: {}", e))?;

    println!("Rule file: {}", input);
    println!("  Magic:       CRS1");
    println!("  Version:     {}", rule_set.version);
    println!("  Build id:    {}", rule_set.build_id);
    println!("  Sections:    {}", rule_set.section_count());
    println!("  Total size:  {} bytes ({:.1} KB)", rule_set.size(), rule_set.size() as f64 / 1024.0);
    println!();
    println!("Sections:");
    for id in [SectionId::StrPool, SectionId::HostRules, SectionId::PatternRules] {
        if let Some(info) = rule_set.get_section_info(id) {
            println!(
                "  {:<14} offset={:<8} length={:<8} flags={:#06x}",
                format!("{:?}", info.id),
                info.offset,
                info.length,
                info.flags
            );
        }
    }
    println!();
    println!("Rules:");
    println!("  Host rules:    {}", rule_set.host_rule_count());
    println!("  Pattern rules: {}", rule_set.pattern_rule_count());

    Ok(())
}

fn cmd_check(config_path: &str, site: Option<&str>, url: &str, content_type: &str) -> Result<(), String> {
    let config = BlockerConfig::from_path(config_path).map_err(|e| e.to_string())?;

    let blocker = ContentBlocker::new();
    let tasks = blocker
        .setup(&config.rules, Some(config.whitelist))
        .map_err(|e| e.to_string())?;

    for task in tasks {
        let feature = task.engine().name().to_string();
        if let Err(e) = task.wait() {
            eprintln!("Warning: feature '{}' is disabled: {}", feature, e);
        }
    }

    let content_type = ContentType::parse(content_type);
    let decision = blocker.should_block(site, url, content_type);
    let label = match decision {
        BlockDecision::Block => "BLOCK",
        BlockDecision::Allow => "ALLOW",
        BlockDecision::EngineNotReady => "NOT READY",
    };

    println!("{}  {}", label, url);
    println!("  Type:       {}", content_type.raw_name());
    println!("  Whitelist:  {} sites", blocker.whitelist().len());
    println!("  Engines ({}):", blocker.engine_count());
    for status in blocker.engine_statuses() {
        let state = if status.ready { "ready" } else { "loading" };
        println!("    {:<20} {:<6} {}", status.feature, status.kind, state);
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::TryStreamExt;
use redline_core::{init_tracing, Redline, RedlineConfig};
use redline_store::{NegotiationId, Provenance};
use serde::Serialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "redline.toml";

fn cli() -> Command {
    let negotiation = Arg::new("negotiation")
        .required(true)
        .help("Negotiation id");

    Command::new("redline")
        .version(redline_core::VERSION)
        .about("Track negotiated document versions and analyze changes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ./redline.toml when present)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .subcommand(
            Command::new("create")
                .about("Create a negotiation")
                .arg(Arg::new("id").required(true).help("Negotiation id (letters, digits, '-', '_')"))
                .arg(Arg::new("title").long("title").short('t').help("Title (defaults to the id)")),
        )
        .subcommand(
            Command::new("add")
                .about("Add a version from a text file")
                .arg(negotiation.clone())
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Document text file"),
                )
                .arg(
                    Arg::new("by")
                        .long("by")
                        .default_value("internal")
                        .help("Provenance: internal or counterparty"),
                )
                .arg(Arg::new("note").long("note").short('n').help("Free-text note")),
        )
        .subcommand(Command::new("list").about("List negotiations, newest first"))
        .subcommand(
            Command::new("timeline")
                .about("Show a negotiation's versions in order")
                .arg(negotiation.clone()),
        )
        .subcommand(
            Command::new("diff")
                .about("Compare two versions")
                .arg(negotiation.clone())
                .arg(
                    Arg::new("old")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Base version number"),
                )
                .arg(
                    Arg::new("new")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Compared version number"),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about("Run the configured stages over a version")
                .arg(negotiation)
                .arg(
                    Arg::new("version")
                        .value_parser(value_parser!(u32))
                        .help("Version number (default: every unanalyzed version)"),
                ),
        )
}

fn load_config(path: Option<&PathBuf>) -> Result<RedlineConfig> {
    match path {
        Some(path) => RedlineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            RedlineConfig::load(DEFAULT_CONFIG).context("loading ./redline.toml")
        }
        None => Ok(RedlineConfig::default()),
    }
}

fn required<'a, T>(args: &'a ArgMatches, name: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(name)
        .with_context(|| format!("missing argument '{name}'"))
}

fn negotiation_arg(args: &ArgMatches) -> Result<NegotiationId> {
    Ok(NegotiationId::parse(required::<String>(args, "negotiation")?.as_str())?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(matches.get_one::<PathBuf>("config"))?;
    init_tracing(&config.logging).context("installing tracing subscriber")?;

    let json = matches.get_flag("json");
    let redline = Redline::from_config(config).await?;

    match matches.subcommand() {
        Some(("create", args)) => {
            let id = required::<String>(args, "id")?;
            let title = args.get_one::<String>("title").unwrap_or(id);
            let negotiation = redline.create_negotiation(id, title).await?;

            if json {
                print_json(&negotiation)?;
            } else {
                println!("Created negotiation '{}' ({})", negotiation.id(), negotiation.title());
            }
        }
        Some(("add", args)) => {
            let negotiation = negotiation_arg(args)?;
            let file = required::<PathBuf>(args, "file")?;
            let provenance: Provenance = required::<String>(args, "by")?.parse()?;
            let note = args.get_one::<String>("note").cloned();
            let text = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;

            let version = redline
                .add_version(&negotiation, text, provenance, note)
                .await?;

            if json {
                print_json(&version.descriptor())?;
            } else {
                println!(
                    "Added {} ({}, {})",
                    version.id(),
                    version.provenance(),
                    version.fingerprint().short()
                );
            }
        }
        Some(("list", _)) => {
            let negotiations = redline.store().list_negotiations().await?;

            if json {
                print_json(&negotiations)?;
            } else if negotiations.is_empty() {
                println!("No negotiations");
            } else {
                for n in &negotiations {
                    println!(
                        "{:<24} {:<8} {:>3} versions  {}  {}",
                        n.id.as_str(),
                        format!("{:?}", n.status).to_lowercase(),
                        n.version_count,
                        n.created_at.format("%Y-%m-%d"),
                        n.title
                    );
                }
            }
        }
        Some(("timeline", args)) => {
            let negotiation = negotiation_arg(args)?;
            let timeline = redline.store().timeline(&negotiation).await?;

            if json {
                let entries = timeline.collect().await?;
                print_json(&entries)?;
            } else {
                let mut entries = timeline.stream();
                while let Some(entry) = entries.try_next().await? {
                    let analysis = entry.analysis.as_ref().map_or_else(
                        || "not analyzed".to_string(),
                        |a| format!("critical {}, high {}, items {}", a.critical, a.high, a.total_items()),
                    );
                    println!(
                        "v{:<3} {:<12} {}  {}  {}  {}",
                        entry.number,
                        entry.provenance.as_str(),
                        entry.uploaded_at.format("%Y-%m-%d %H:%M"),
                        entry.fingerprint,
                        analysis,
                        entry.note.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Some(("diff", args)) => {
            let negotiation = negotiation_arg(args)?;
            let old = *required::<u32>(args, "old")?;
            let new = *required::<u32>(args, "new")?;
            let comparison = redline.store().compare(&negotiation, old, new).await?;

            if json {
                print_json(&comparison)?;
            } else {
                print!("{}", comparison.unified);
                println!(
                    "{} additions, {} deletions",
                    comparison.summary.additions, comparison.summary.deletions
                );
            }
        }
        Some(("analyze", args)) => {
            let negotiation = negotiation_arg(args)?;
            let contexts = match args.get_one::<u32>("version") {
                Some(number) => vec![redline.analyze(&negotiation, *number).await?],
                None => redline.analyze_pending(&negotiation).await?,
            };

            if json {
                print_json(&contexts)?;
            } else if contexts.is_empty() {
                println!("Nothing to analyze");
            } else {
                for ctx in &contexts {
                    let summary = ctx.summary();
                    println!(
                        "{}: {} stages ok, {} failed, {} items ({} critical, {} high); {:?}",
                        ctx.version_id(),
                        summary.stages_succeeded,
                        summary.stages_failed,
                        summary.total_items(),
                        summary.critical,
                        summary.high,
                        ctx.persistence()
                    );
                    for error in ctx.errors() {
                        println!("  {} {}: {}", error.stage, error.kind, error.message);
                    }
                }
            }
        }
        _ => anyhow::bail!("unknown command"),
    }

    Ok(())
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use vstage_digest::Algorithm;
use vstage_index::{
    walk_digests, AddTreeOptions, MergeOutcome, PathChange, Stage, StageFile, StateDiff,
    WalkOptions,
};
use vstage_store::ObjectSnapshot;
use vstage_types::ObjectId;

use crate::cli::*;
use crate::config::{parse_algorithms, Config};

pub fn run_command(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let record = StageFile::new(
        cli.stage_file
            .clone()
            .unwrap_or_else(|| config.stage_file.clone()),
    );
    match cli.command {
        Command::New(args) => cmd_new(&config, &record, args),
        Command::Add(args) => cmd_add(&config, &record, args),
        Command::Rm(args) => cmd_rm(&record, args),
        Command::Ls(args) => cmd_ls(&record, args),
        Command::Status(args) => cmd_status(&record, args),
        Command::Diff(args) => cmd_diff(&config, &record, args),
        Command::Check(_) => cmd_check(&record),
    }
}

fn cmd_new(config: &Config, record: &StageFile, args: NewArgs) -> Result<()> {
    let id = ObjectId::new(args.id).context("invalid object id")?;
    let algorithm = match &args.alg {
        Some(alg) => Algorithm::from_id(alg)?,
        None => config.algorithm()?,
    };
    let fixity = if args.fixity.is_empty() {
        config.fixity_algorithms()?
    } else {
        parse_algorithms(&args.fixity)?
    };
    let baseline = args.baseline.as_deref().map(read_snapshot).transpose()?;

    let stage = Stage::new(id, baseline.as_ref(), algorithm, &fixity)?;
    record.create(&stage)?;
    println!(
        "{} New stage for {} {} ({})",
        "✓".green().bold(),
        stage.id().as_str().bold(),
        stage.next_version().to_string().yellow(),
        stage.algorithm()
    );
    if baseline.is_some() {
        println!("  Baseline: {} file(s)", stage.len());
    }
    Ok(())
}

fn cmd_add(config: &Config, record: &StageFile, args: AddArgs) -> Result<()> {
    let mut stage = record.read()?;
    let meta = fs::metadata(&args.path)
        .with_context(|| format!("cannot stage {}", args.path.display()))?;

    if meta.is_dir() {
        let prefix = args.logical.as_deref().unwrap_or(".");
        let options = AddTreeOptions {
            include_hidden: args.all || config.include_hidden,
            sync_remove: args.remove,
            concurrency: args.jobs.unwrap_or(config.jobs),
            cancel: None,
        };
        let summary = stage.add_tree(&args.path, prefix, &options)?;
        record.write(&stage)?;
        println!(
            "{} {} file(s): {} added, {} updated, {} unchanged, {} removed",
            "✓".green().bold(),
            summary.files,
            summary.added.to_string().green(),
            summary.updated.to_string().yellow(),
            summary.unchanged,
            summary.removed.to_string().red()
        );
    } else {
        let outcome = stage.add_file(&args.path, args.logical.as_deref())?;
        record.write(&stage)?;
        let label = match outcome {
            MergeOutcome::Added => "added:".green(),
            MergeOutcome::Updated => "updated:".yellow(),
            MergeOutcome::Unchanged => "unchanged:".dimmed(),
        };
        println!("  {} {}", label, args.path.display());
    }
    Ok(())
}

fn cmd_rm(record: &StageFile, args: RmArgs) -> Result<()> {
    let mut stage = record.read()?;
    let removed = stage.remove(&args.path, args.recursive)?;
    record.write(&stage)?;
    if removed == 0 {
        println!("Nothing staged at {}", args.path.bold());
    } else {
        println!("{} Removed {} path(s)", "✓".green().bold(), removed);
    }
    Ok(())
}

fn cmd_ls(record: &StageFile, args: LsArgs) -> Result<()> {
    let stage = record.read()?;
    for (path, digest) in stage.list() {
        if args.digests {
            println!("{}  {}", digest.dimmed(), path);
        } else {
            println!("{path}");
        }
    }
    Ok(())
}

fn cmd_status(record: &StageFile, args: StatusArgs) -> Result<()> {
    let stage = record.read()?;
    println!("Object: {}", stage.id().as_str().bold());
    println!("Next version: {}", stage.next_version().to_string().yellow());
    let fixity: Vec<&str> = stage.fixity_algorithms().iter().map(|a| a.id()).collect();
    if fixity.is_empty() {
        println!("Algorithm: {}", stage.algorithm());
    } else {
        println!("Algorithm: {} (fixity: {})", stage.algorithm(), fixity.join(", "));
    }
    println!(
        "Files: {} ({} to upload)",
        stage.len(),
        stage.local_content().len()
    );

    if let Some(path) = &args.baseline {
        let snapshot = read_snapshot(path)?;
        let diff = stage.diff_against(&snapshot.state);
        println!("\nChanges since {}:", snapshot.head.to_string().yellow());
        print_diff(&diff);
    }

    let report = stage.validate();
    if report.is_valid() {
        println!("\n{} Ready to commit", "✓".green().bold());
    } else {
        println!("\n{} {} problem(s):", "✗".red().bold(), report.len());
        for finding in &report.findings {
            println!("  {}", finding.to_string().red());
        }
    }
    Ok(())
}

fn cmd_diff(config: &Config, record: &StageFile, args: DiffArgs) -> Result<()> {
    let stage = record.read()?;
    let algorithm = stage.algorithm();
    let options = WalkOptions {
        include_hidden: args.all || config.include_hidden,
        concurrency: config.jobs,
        cancel: None,
    };
    let mut local = BTreeMap::new();
    for file in walk_digests(&args.dir, &[algorithm], &options)? {
        let file = file?;
        let (digest, _) = file.digests.split(algorithm)?;
        local.insert(file.path, digest);
    }
    print_diff(&stage.diff_against(&local));
    Ok(())
}

fn cmd_check(record: &StageFile) -> Result<()> {
    let stage = record.read()?;
    let report = stage.validate();
    if report.is_valid() {
        println!("{} Stage is valid", "✓".green().bold());
        return Ok(());
    }
    for finding in &report.findings {
        println!("  {}", finding.to_string().red());
    }
    bail!("stage has {} problem(s)", report.len())
}

fn print_diff(diff: &StateDiff) {
    if diff.is_empty() {
        println!("  No differences.");
        return;
    }
    for change in diff.iter() {
        let line = change.to_string();
        let line = match change {
            PathChange::Added { .. } => line.green(),
            PathChange::Modified { .. } => line.yellow(),
            PathChange::Removed { .. } => line.red(),
            PathChange::Renamed { .. } => line.cyan(),
        };
        println!("  {line}");
    }
}

fn read_snapshot(path: &Path) -> Result<ObjectSnapshot> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid snapshot {}", path.display()))
}

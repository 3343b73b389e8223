//! CLI interface for Steward
//!
//! Defines the command-line surface and the handlers behind it. The `run`
//! command drives one instruction through a freshly initialized
//! orchestrator, optionally preloading a real directory into the virtual
//! scanner and answering approval prompts on stdin.

use crate::config::{AutonomyLevel, Config, OperationMode};
use crate::orchestrator::AgentOrchestrator;
use crate::scanner::FileSystemScanner;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

/// Cap on files preloaded from a real directory
const MAX_PRELOAD_FILES: usize = 500;

/// Cap on the size of a single preloaded file
const MAX_PRELOAD_BYTES: u64 = 262_144;

/// Directories never preloaded
const SKIP_DIRS: [&str; 5] = [".git", "node_modules", "target", "dist", "build"];

#[derive(Parser)]
#[command(name = "steward", version, about = "Autonomous agent orchestration engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one instruction and print the task report
    Run {
        /// The instruction to execute
        instruction: String,

        /// Autonomy level override (full, semi, interactive)
        #[arg(long)]
        autonomy: Option<String>,

        /// Operation mode override (web, api, background)
        #[arg(long)]
        mode: Option<String>,

        /// Preload a real directory into the virtual scanner
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Print the resolved configuration
    Config,
}

/// Handle `steward run`.
pub async fn handle_run(
    instruction: String,
    autonomy: Option<String>,
    mode: Option<String>,
    workspace: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load_or_create().context("failed to load configuration")?;

    if let Some(autonomy) = autonomy {
        config.agent.autonomy = parse_autonomy(&autonomy)?;
    }
    // The CLI answers approval prompts itself, so it runs in web mode
    // unless explicitly overridden
    config.agent.mode = match mode {
        Some(mode) => parse_mode(&mode)?,
        None => OperationMode::Web,
    };
    if let Some(dir) = &workspace {
        config.core.workspace = Some(dir.display().to_string());
    }

    let mut orchestrator = AgentOrchestrator::new(config);
    orchestrator.initialize().await?;

    if let Some(dir) = &workspace {
        if let Some(scanner) = orchestrator.filesystem() {
            let loaded = preload_workspace(dir, &scanner).await?;
            println!("Loaded {} files from {}", loaded, dir.display());
        }
    }

    // Answer approval requests interactively while the task runs
    if let (Some(gate), Some(mut events)) = (
        orchestrator.approval_gate(),
        orchestrator.take_approval_events(),
    ) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(request) = events.recv().await {
                println!(
                    "Approval required for task {} ({} steps, risk {}): {}",
                    request.task_id,
                    request.plan.steps.len(),
                    request.risk.level.as_str(),
                    request.plan.description
                );
                print!("Approve? [y/N] ");
                use std::io::Write;
                let _ = std::io::stdout().flush();

                let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
                if answer.trim().eq_ignore_ascii_case("y") {
                    gate.approve(&request.task_id, "cli");
                } else {
                    gate.reject(&request.task_id, "Rejected at the terminal");
                }
            }
        });
    }

    let report = orchestrator.process_request(&instruction, None, "cli").await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    orchestrator.shutdown().await;

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Handle `steward config`.
pub fn handle_config() -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load_or_create()?;

    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn parse_autonomy(value: &str) -> Result<AutonomyLevel> {
    match value {
        "full" => Ok(AutonomyLevel::Full),
        "semi" => Ok(AutonomyLevel::Semi),
        "interactive" => Ok(AutonomyLevel::Interactive),
        other => bail!("unknown autonomy level: {} (expected full, semi, interactive)", other),
    }
}

fn parse_mode(value: &str) -> Result<OperationMode> {
    match value {
        "web" => Ok(OperationMode::Web),
        "api" => Ok(OperationMode::Api),
        "background" => Ok(OperationMode::Background),
        other => bail!("unknown mode: {} (expected web, api, background)", other),
    }
}

/// Walk a real directory and add its readable files to the virtual
/// scanner, bounded by count and per-file size.
async fn preload_workspace(
    dir: &Path,
    scanner: &Arc<AsyncMutex<FileSystemScanner>>,
) -> Result<usize> {
    let mut entries = Vec::new();
    collect_files(dir, dir, &mut entries)?;

    let mut scanner = scanner.lock().await;
    let mut loaded = 0;
    for (relative, content) in entries {
        scanner.add_file(&relative, &content);
        loaded += 1;
    }

    Ok(loaded)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> Result<()> {
    if out.len() >= MAX_PRELOAD_FILES {
        return Ok(());
    }

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?;

    for entry in entries {
        if out.len() >= MAX_PRELOAD_FILES {
            break;
        }

        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if !SKIP_DIRS.contains(&name.as_str()) && !name.starts_with('.') {
                collect_files(root, &path, out)?;
            }
            continue;
        }

        let metadata = entry.metadata()?;
        if metadata.len() > MAX_PRELOAD_BYTES {
            continue;
        }

        // Binary or non-UTF8 files are skipped
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push((relative, content));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_autonomy() {
        assert_eq!(parse_autonomy("full").unwrap(), AutonomyLevel::Full);
        assert_eq!(
            parse_autonomy("interactive").unwrap(),
            AutonomyLevel::Interactive
        );
        assert!(parse_autonomy("yolo").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("background").unwrap(), OperationMode::Background);
        assert!(parse_mode("desktop").is_err());
    }

    #[tokio::test]
    async fn test_preload_workspace_respects_skips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("src/app.js"), "const x = 1;").unwrap();
        std::fs::write(dir.path().join("node_modules/dep.js"), "ignored").unwrap();

        let scanner = Arc::new(AsyncMutex::new(FileSystemScanner::new("/").unwrap()));
        let loaded = preload_workspace(dir.path(), &scanner).await.unwrap();

        assert_eq!(loaded, 1);
        let scanner = scanner.lock().await;
        assert!(scanner.read_file("src/app.js").is_ok());
        assert!(scanner.read_file("node_modules/dep.js").is_err());
    }
}

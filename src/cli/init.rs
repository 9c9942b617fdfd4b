//! Init command implementation
//!
//! Scaffolds a research project: configuration file, environment template,
//! and a replay fixture so `ares-research run` works offline right away.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file written by `init`
pub const CONFIG_FILE: &str = "ares-research.toml";

/// Fixture path relative to the project directory
pub const FIXTURE_FILE: &str = "fixtures/research.json";

/// Result of the init operation
#[derive(Debug)]
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// Project already exists (ares-research.toml found)
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing research project");

    let base_path = &config.path;

    let config_path = base_path.join(CONFIG_FILE);
    if config_path.exists() && !config.force {
        output.warning(&format!("{} already exists!", CONFIG_FILE));
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    for dir in ["fixtures", "logs"] {
        let dir_path = base_path.join(dir);
        if dir_path.exists() {
            output.skipped(dir, "already exists");
            continue;
        }
        if let Err(e) = fs::create_dir_all(&dir_path) {
            output.error(&format!("Failed to create {}: {}", dir, e));
            return InitResult::Error(e.to_string());
        }
        output.created_dir(dir);
    }

    let files = [
        ("config", CONFIG_FILE, generate_config_toml()),
        ("env", ".env.example", generate_env_example()),
        ("fixture", FIXTURE_FILE, generate_fixture()),
    ];
    for (kind, name, content) in files {
        match write_file(&base_path.join(name), &content, config.force) {
            Ok(true) => output.created(kind, name),
            Ok(false) => output.skipped(name, "already exists"),
            Err(e) => {
                output.error(&format!("Failed to create {}: {}", name, e));
                return InitResult::Error(e.to_string());
            }
        }
    }

    let gitignore_path = base_path.join(".gitignore");
    if !gitignore_path.exists() {
        match write_file(&gitignore_path, &generate_gitignore(), false) {
            Ok(_) => output.created("file", ".gitignore"),
            Err(e) => output.warning(&format!("Failed to create .gitignore: {}", e)),
        }
    }

    output.complete("Research project initialized successfully!");

    output.header("Next Steps");
    output.info("1. Try the bundled fixture:");
    output.command("ares-research run \"Grid-scale energy storage\"");
    output.info("2. Run the same query with a role crew:");
    output.command("ares-research run \"Grid-scale energy storage\" --mode multi-agent");
    output.hint("Event logs are written to ./logs when [progress].event_log_dir is set");

    InitResult::Success
}

/// Returns whether the file was written.
fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(true)
}

fn generate_config_toml() -> String {
    format!(
        r#"# A.R.E.S Research configuration
# Every key is optional; the values below are the defaults.

[logging]
# Overridden by RUST_LOG when set
level = "info"
# "pretty" or "json"
format = "pretty"

[research]
max_depth = 2
max_breadth = 3
max_concurrency = 4
# multi-agent mode
max_sections = 5
max_review_rounds = 3
# hard ceilings applied to per-run overrides
depth_cap = 5
breadth_cap = 10

[retry]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 8000
call_timeout_secs = 60

[sources]
max_sources_per_task = 8
min_content_length = 100
excluded_domains = []

[progress]
channel_capacity = 256
event_log_dir = "logs"

[gateway]
kind = "replay"
# Relative paths resolve against this file's directory
fixture = "{fixture}"

# Multi-agent roster. Without any [[agents]] entries the standard crew
# (researcher, analyst, writer, reviewer, editor) is used.
# [[agents]]
# role = "reviewer"
# instructions = "Reply APPROVED or list concrete fixes."
"#,
        fixture = FIXTURE_FILE
    )
}

fn generate_env_example() -> String {
    r#"# A.R.E.S Research environment
# Copy to .env; it is loaded on startup.

# Log filter (takes precedence over [logging].level)
RUST_LOG=info,ares_research=debug

# Replay fixture override (same as --fixture)
# ARES_RESEARCH_FIXTURE=fixtures/research.json
"#
    .to_string()
}

fn generate_fixture() -> String {
    let body = "Long-duration storage smooths renewable output. Pumped hydro and \
                lithium-ion dominate deployments today (https://example.org/storage-overview).";
    serde_json::json!({
        "sources": {
            "Grid-scale energy storage": [
                {
                    "origin": "https://example.org/storage-overview",
                    "title": "Storage overview",
                    "text": "Grid-scale storage covers pumped hydro, batteries, compressed air and thermal systems. Deployments have grown quickly as renewable share rises.",
                    "trust": 0.9
                },
                {
                    "origin": "https://example.net/battery-costs",
                    "title": "Battery cost trends",
                    "text": "Lithium-ion pack prices fell by roughly ninety percent over the last decade, making four-hour batteries competitive for peak shaving.",
                    "trust": 0.7
                }
            ]
        },
        "responses": {
            "Grid-scale energy storage": {
                "text": body,
                "proposed_subtopics": ["Battery chemistry", "Market design"]
            },
            "plan:Grid-scale energy storage": {
                "text": "1. Battery chemistry\n2. Market design"
            }
        },
        "fallback": "No recorded material for this topic yet (https://example.org/storage-overview)."
    })
    .to_string()
}

fn generate_gitignore() -> String {
    r#"# Environment
.env

# Event logs
logs/

# Reports
*.report.md
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::replay::ReplayFixture;
    use crate::utils::toml_config::ResearchConfig;
    use tempfile::TempDir;

    fn init_in(temp_dir: &TempDir, force: bool) -> InitResult {
        let config = InitConfig {
            path: temp_dir.path().to_path_buf(),
            force,
        };
        run(config, &Output::no_color())
    }

    #[test]
    fn test_generated_config_parses_and_validates() {
        let config = ResearchConfig::from_toml(&generate_config_toml()).unwrap();
        assert_eq!(config.research.max_depth, 2);
        assert_eq!(config.gateway.fixture, Some(PathBuf::from(FIXTURE_FILE)));
        assert_eq!(config.progress.event_log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_generated_fixture_parses() {
        let fixture: ReplayFixture = serde_json::from_str(&generate_fixture()).unwrap();
        assert_eq!(fixture.sources.len(), 1);
        assert!(fixture.responses.contains_key("plan:Grid-scale energy storage"));
        assert!(fixture.fallback.is_some());
    }

    #[test]
    fn test_write_file_skips_existing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested/file.txt");

        assert!(write_file(&path, "first", false).unwrap());
        assert!(!write_file(&path, "second", false).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        assert!(write_file(&path, "third", true).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "third");
    }

    #[test]
    fn test_run_creates_project_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        assert!(matches!(init_in(&temp_dir, false), InitResult::Success));

        assert!(temp_dir.path().join(CONFIG_FILE).exists());
        assert!(temp_dir.path().join(".env.example").exists());
        assert!(temp_dir.path().join(FIXTURE_FILE).exists());
        assert!(temp_dir.path().join(".gitignore").exists());
        assert!(temp_dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_run_already_exists_without_force() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join(CONFIG_FILE), "existing").expect("Failed to write");

        assert!(matches!(init_in(&temp_dir, false), InitResult::AlreadyExists));
        let content = fs::read_to_string(temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(content, "existing");
    }

    #[test]
    fn test_run_force_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join(CONFIG_FILE), "existing").expect("Failed to write");

        assert!(matches!(init_in(&temp_dir, true), InitResult::Success));
        let content = fs::read_to_string(temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert!(content.contains("[research]"));
        assert!(!content.contains("existing"));
    }

    #[test]
    fn test_existing_gitignore_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join(".gitignore"), "target/\n").expect("Failed to write");

        assert!(matches!(init_in(&temp_dir, false), InitResult::Success));
        let content = fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target/\n");
    }
}

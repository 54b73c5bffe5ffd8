use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::parsers::VariableRule;

pub const CONFIG_FILE_NAME: &str = ".logtallyrc";

/// Configuration file handler for logtally
///
/// ```ini
/// defaults = --chunk-size 500 --stats
///
/// [track]
/// latency = latency=(\d+)ms
/// ```
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFile {
    pub defaults: Option<String>,
    /// `category = regex` tracking rules, in file order
    pub track: IndexMap<String, String>,
}

impl ConfigFile {
    /// Find project-level .logtallyrc by walking up directory tree
    pub fn find_project_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !current.pop() {
                break;
            }
        }
        None
    }

    /// User config file locations in order of preference
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("logtally").join("config.ini"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Load configuration with precedence: project > user
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::get_user_config_paths().into_iter().find(|p| p.exists()) {
            config = Self::merge_configs(config, Self::load_from_path(&path)?);
        }

        if let Some(project_path) = Self::find_project_config() {
            config = Self::merge_configs(config, Self::load_from_path(&project_path)?);
        }

        Ok(config)
    }

    /// Load configuration with optional custom config file path
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Ok(Self::parse_ini_content(&content))
    }

    fn parse_ini_content(content: &str) -> Self {
        let mut config = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match current_section.as_str() {
                "" if key == "defaults" => config.defaults = Some(value.to_string()),
                "track" => {
                    config.track.insert(key.to_string(), value.to_string());
                }
                // Unknown keys and sections are ignored
                _ => {}
            }
        }

        config
    }

    /// Merge two configuration objects, with the second taking precedence
    fn merge_configs(base: Self, overlay: Self) -> Self {
        let mut track = base.track;
        track.extend(overlay.track);
        Self {
            defaults: overlay.defaults.or(base.defaults),
            track,
        }
    }

    /// Compile the `[track]` section.
    pub fn tracking_rules(&self) -> Result<Vec<VariableRule>> {
        self.track
            .iter()
            .map(|(category, pattern)| {
                VariableRule::new(category, pattern)
                    .with_context(|| format!("Invalid [track] entry '{}'", category))
            })
            .collect()
    }

    /// Insert the configured default arguments right after the program name,
    /// so anything given on the command line overrides them.
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>> {
        let Some(defaults) = &self.defaults else {
            return Ok(args);
        };

        let default_args = shell_words::split(defaults)
            .context("Invalid defaults: failed to parse arguments")?;

        let mut iter = args.into_iter();
        let mut result: Vec<String> = iter.next().into_iter().collect();
        result.extend(default_args);
        result.extend(iter);
        Ok(result)
    }

    /// Show configuration information with precedence details
    pub fn show_config(custom_path: Option<&Path>) {
        println!("Configuration precedence: CLI > project {CONFIG_FILE_NAME} > user config > defaults\n");

        if let Some(path) = custom_path {
            println!("Using configuration file: {}", path.display());
        } else {
            println!("Configuration search locations (in precedence order):");
            match Self::find_project_config() {
                Some(path) => println!("  1. Project: {} (found)", path.display()),
                None => println!(
                    "  1. Project: {CONFIG_FILE_NAME} (searched up directory tree, not found)"
                ),
            }
            for (i, path) in Self::get_user_config_paths().iter().enumerate() {
                let status = if path.exists() { "(found)" } else { "(not found)" };
                println!("  {}. User: {} {}", i + 2, path.display(), status);
            }
        }

        match Self::load_with_custom_path(custom_path) {
            Ok(config) if config.defaults.is_none() && config.track.is_empty() => {
                println!("\nNo active settings. Example {CONFIG_FILE_NAME}:\n");
                println!("# Default arguments applied to every run");
                println!("defaults = --chunk-size 500 --flush-interval 5s");
                println!();
                println!("[track]");
                println!(r"latency = latency=(\d+)ms");
            }
            Ok(config) => {
                if let Some(defaults) = &config.defaults {
                    println!("\nActive defaults:\n  defaults = {}", defaults);
                }
                if !config.track.is_empty() {
                    println!("\nTracked categories:");
                    for (category, pattern) in &config.track {
                        println!("  {} = {}", category, pattern);
                    }
                }
            }
            Err(e) => eprintln!("Error loading configuration: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# logtally settings").unwrap();
        writeln!(file, "defaults = --chunk-size 500 --stats").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "[track]").unwrap();
        writeln!(file, r"latency = latency=(\d+)ms").unwrap();
        writeln!(file, r"size = size=(\d+)").unwrap();
        writeln!(file, "[unknown]").unwrap();
        writeln!(file, "ignored = yes").unwrap();
        file.flush().unwrap();

        let config = ConfigFile::load_from_path(file.path()).unwrap();
        assert_eq!(config.defaults.as_deref(), Some("--chunk-size 500 --stats"));
        let track: Vec<(&str, &str)> = config
            .track
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            track,
            vec![("latency", r"latency=(\d+)ms"), ("size", r"size=(\d+)")]
        );

        let rules = config.tracking_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].category, "latency");
    }

    #[test]
    fn test_invalid_track_rule_is_reported() {
        let config = ConfigFile::parse_ini_content("[track]\nlatency = latency=\\d+\n");
        let err = config.tracking_rules().unwrap_err();
        assert!(format!("{:#}", err).contains("latency"));
    }

    #[test]
    fn test_process_args_inserts_defaults_after_program_name() {
        let config = ConfigFile {
            defaults: Some("--chunk-size 500 --keyword 'ERROR,FATAL'".to_string()),
            ..Default::default()
        };
        let args = vec!["logtally".to_string(), "app.log".to_string()];
        assert_eq!(
            config.process_args(args).unwrap(),
            vec!["logtally", "--chunk-size", "500", "--keyword", "ERROR,FATAL", "app.log"]
        );
    }

    #[test]
    fn test_process_args_without_defaults_is_identity() {
        let args = vec!["logtally".to_string(), "app.log".to_string()];
        assert_eq!(
            ConfigFile::default().process_args(args.clone()).unwrap(),
            args
        );
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = ConfigFile::parse_ini_content("defaults = --once\n[track]\na = a=(\\d+)\n");
        let overlay = ConfigFile::parse_ini_content("defaults = --stats\n[track]\na = A(\\d+)\nb = b=(\\d+)\n");
        let merged = ConfigFile::merge_configs(base, overlay);
        assert_eq!(merged.defaults.as_deref(), Some("--stats"));
        assert_eq!(merged.track["a"], "A(\\d+)");
        assert_eq!(merged.track.len(), 2);
    }
}

//! Configuration resolution for agentdbg tracing.
//!
//! Settings resolve with the following precedence (highest first):
//!
//! 1. `AGENTDBG_*` environment variables
//! 2. `.agentdbg/config.toml` in the project root
//! 3. `~/.agentdbg/config.toml`
//! 4. Built-in defaults
//!
//! Tracing is best-effort: malformed files are ignored with a warning and
//! out-of-range numeric values are clamped to documented minimums rather
//! than rejected, so a bad config can degrade trace data but never stop the
//! instrumented program.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use agentdbg_core::{SanitizePolicy, DEFAULT_MAX_FIELD_BYTES, DEFAULT_REDACT_KEYS};

/// Enforced minimum for `max_field_bytes`.
pub const MIN_MAX_FIELD_BYTES: usize = 100;
/// Enforced minimum for `loop_window`.
pub const MIN_LOOP_WINDOW: usize = 4;
/// Enforced minimum for `loop_repetitions`.
pub const MIN_LOOP_REPETITIONS: usize = 2;

const DEFAULT_LOOP_WINDOW: usize = 12;
const DEFAULT_LOOP_REPETITIONS: usize = 3;
const CONFIG_DIR: &str = ".agentdbg";
const CONFIG_FILE: &str = "config.toml";

/// Resolved runtime configuration for tracing, redaction, and loop detection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for run data.
    pub data_dir: PathBuf,
    /// Whether key-based redaction is enabled.
    pub redact: bool,
    /// Key-substring patterns that trigger redaction.
    pub redact_keys: Vec<String>,
    /// Maximum UTF-8 byte length for a string field.
    pub max_field_bytes: usize,
    /// Loop detector window length.
    pub loop_window: usize,
    /// Consecutive repetitions that trigger a loop warning.
    pub loop_repetitions: usize,
    /// Whether recording calls may lazily create a run.
    pub implicit_run: bool,
    /// Overrides the run name when set.
    pub run_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: home_dir().join(CONFIG_DIR),
            redact: true,
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|k| k.to_string()).collect(),
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            loop_window: DEFAULT_LOOP_WINDOW,
            loop_repetitions: DEFAULT_LOOP_REPETITIONS,
            implicit_run: false,
            run_name: None,
        }
    }
}

/// Partial settings as they appear in a config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    redact: Option<bool>,
    redact_keys: Option<Vec<String>>,
    max_field_bytes: Option<i64>,
    loop_window: Option<i64>,
    loop_repetitions: Option<i64>,
    implicit_run: Option<bool>,
    run_name: Option<String>,
}

impl Config {
    /// Resolves configuration for the current working directory.
    pub fn load() -> Self {
        let root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_from(&root)
    }

    /// Resolves configuration treating `project_root` as the project root.
    pub fn load_from(project_root: &Path) -> Self {
        let mut config = Config::default();
        config.apply_file(&home_dir().join(CONFIG_DIR).join(CONFIG_FILE));
        config.apply_file(&project_root.join(CONFIG_DIR).join(CONFIG_FILE));
        config.apply_env();
        config.clamp();
        config
    }

    /// The sanitization rules implied by this configuration.
    pub fn sanitize_policy(&self) -> SanitizePolicy {
        SanitizePolicy::new(self.redact, &self.redact_keys, self.max_field_bytes)
    }

    fn apply_file(&mut self, path: &Path) {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return;
        };
        let file: FileConfig = match toml::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("ignoring malformed config file {}: {}", path.display(), e);
                return;
            }
        };

        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(redact) = file.redact {
            self.redact = redact;
        }
        if let Some(keys) = file.redact_keys {
            self.redact_keys = keys;
        }
        if let Some(v) = file.max_field_bytes {
            self.max_field_bytes = v.max(0) as usize;
        }
        if let Some(v) = file.loop_window {
            self.loop_window = v.max(0) as usize;
        }
        if let Some(v) = file.loop_repetitions {
            self.loop_repetitions = v.max(0) as usize;
        }
        if let Some(implicit) = file.implicit_run {
            self.implicit_run = implicit;
        }
        if let Some(name) = file.run_name {
            self.run_name = Some(name);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(raw) = env::var("AGENTDBG_DATA_DIR") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.data_dir = expand_tilde(trimmed);
            }
        }
        if let Ok(raw) = env::var("AGENTDBG_REDACT") {
            self.redact = env_flag(&raw);
        }
        if let Ok(raw) = env::var("AGENTDBG_REDACT_KEYS") {
            self.redact_keys =
                raw.split(',').map(str::trim).filter(|k| !k.is_empty()).map(String::from).collect();
        }
        if let Some(v) = env_usize("AGENTDBG_MAX_FIELD_BYTES") {
            self.max_field_bytes = v;
        }
        if let Some(v) = env_usize("AGENTDBG_LOOP_WINDOW") {
            self.loop_window = v;
        }
        if let Some(v) = env_usize("AGENTDBG_LOOP_REPETITIONS") {
            self.loop_repetitions = v;
        }
        if let Ok(raw) = env::var("AGENTDBG_IMPLICIT_RUN") {
            self.implicit_run = env_flag(&raw);
        }
        if let Ok(raw) = env::var("AGENTDBG_RUN_NAME") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.run_name = Some(trimmed.to_string());
            }
        }
    }

    fn clamp(&mut self) {
        self.max_field_bytes = self.max_field_bytes.max(MIN_MAX_FIELD_BYTES);
        self.loop_window = self.loop_window.max(MIN_LOOP_WINDOW);
        self.loop_repetitions = self.loop_repetitions.max(MIN_LOOP_REPETITIONS);
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    PathBuf::from(path)
}

fn env_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(v) => Some(v.max(0) as usize),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    // Env vars are process-global; tests touching them take this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_agentdbg_env() {
        for (key, _) in env::vars() {
            if key.starts_with("AGENTDBG_") {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.redact);
        assert_eq!(config.max_field_bytes, 20_000);
        assert_eq!(config.loop_window, 12);
        assert_eq!(config.loop_repetitions, 3);
        assert!(!config.implicit_run);
        assert!(config.redact_keys.contains(&"token".to_string()));
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_agentdbg_env();

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE),
            "loop_window = 20\nredact_keys = [\"bearer\"]\nimplicit_run = true\n",
        )
        .unwrap();

        let config = Config::load_from(root.path());
        assert_eq!(config.loop_window, 20);
        assert_eq!(config.redact_keys, vec!["bearer".to_string()]);
        assert!(config.implicit_run);
    }

    #[test]
    fn test_env_overrides_project_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_agentdbg_env();

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), "loop_window = 20\n").unwrap();

        env::set_var("AGENTDBG_LOOP_WINDOW", "6");
        env::set_var("AGENTDBG_REDACT_KEYS", "token, bearer");
        let config = Config::load_from(root.path());
        clear_agentdbg_env();

        assert_eq!(config.loop_window, 6);
        assert_eq!(config.redact_keys, vec!["token".to_string(), "bearer".to_string()]);
    }

    #[test]
    fn test_out_of_range_values_clamped_to_minimums() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_agentdbg_env();

        env::set_var("AGENTDBG_MAX_FIELD_BYTES", "1");
        env::set_var("AGENTDBG_LOOP_WINDOW", "0");
        env::set_var("AGENTDBG_LOOP_REPETITIONS", "-3");
        let config = Config::load_from(Path::new("/nonexistent"));
        clear_agentdbg_env();

        assert_eq!(config.max_field_bytes, MIN_MAX_FIELD_BYTES);
        assert_eq!(config.loop_window, MIN_LOOP_WINDOW);
        assert_eq!(config.loop_repetitions, MIN_LOOP_REPETITIONS);
    }

    #[test]
    fn test_unparseable_env_number_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_agentdbg_env();

        env::set_var("AGENTDBG_LOOP_WINDOW", "not-a-number");
        let config = Config::load_from(Path::new("/nonexistent"));
        clear_agentdbg_env();

        assert_eq!(config.loop_window, DEFAULT_LOOP_WINDOW);
    }

    #[test]
    fn test_malformed_config_file_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_agentdbg_env();

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), "loop_window = [[[").unwrap();

        let config = Config::load_from(root.path());
        assert_eq!(config.loop_window, DEFAULT_LOOP_WINDOW);
    }
}

//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Structurally valid TOML that references things that do not exist
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Suffix appended before the extension when the output lands next to a kept original.
pub const DEFAULT_COMPLETED_SUFFIX: &str = "_processed";

/// Extensions picked up when a directory is given instead of a file.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".m2ts"];

/// External encoder family a profile is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    #[default]
    Ffmpeg,
    Hbcli,
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorKind::Ffmpeg => write!(f, "ffmpeg"),
            ProcessorKind::Hbcli => write!(f, "hbcli"),
        }
    }
}

/// Global run settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_hbcli")]
    pub hbcli: PathBuf,
    /// Shared scratch directory for encoder output (beside the source if None)
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,
    /// Destination tree for committed output (in place if None)
    #[serde(default)]
    pub dest_dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_original: bool,
    #[serde(default = "default_completed_suffix")]
    pub completed_suffix: String,
    /// Pending-queue file used when no files are given
    #[serde(default)]
    pub default_queue_file: Option<PathBuf>,
    #[serde(default)]
    pub recursive: bool,
    /// Global switch for per-profile stream mapping
    #[serde(default = "default_true")]
    pub automap: bool,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Dispatcher liveness poll interval in milliseconds
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_hbcli() -> PathBuf {
    PathBuf::from("HandBrakeCLI")
}

fn default_completed_suffix() -> String {
    DEFAULT_COMPLETED_SUFFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_status_poll_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            hbcli: default_hbcli(),
            tmp_dir: None,
            dest_dir: None,
            keep_original: false,
            completed_suffix: default_completed_suffix(),
            default_queue_file: None,
            recursive: false,
            automap: true,
            extensions: default_extensions(),
            status_poll_ms: default_status_poll_ms(),
        }
    }
}

/// Named encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// Filled in from the table key when loaded
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub processor: ProcessorKind,
    /// Output extension including the leading dot, e.g. ".mkv"
    pub extension: String,
    /// Minimum percent size reduction required to keep the result (0 disables)
    #[serde(default)]
    pub threshold: u32,
    /// Progress percent at which the threshold is first enforced (100 disables)
    #[serde(default = "default_threshold_check")]
    pub threshold_check: u32,
    #[serde(default = "default_true")]
    pub automap: bool,
    /// Queue name; None routes to the default queue
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub input_options: Vec<String>,
    #[serde(default)]
    pub output_options: Vec<String>,
    #[serde(default)]
    pub audio_languages: Vec<String>,
    #[serde(default)]
    pub subtitle_languages: Vec<String>,
}

fn default_threshold_check() -> u32 {
    100
}

impl Profile {
    /// Minimal profile, mostly useful for tests and forced-profile runs.
    pub fn new(name: &str, processor: ProcessorKind, extension: &str) -> Self {
        Self {
            name: name.to_string(),
            processor,
            extension: extension.to_string(),
            threshold: 0,
            threshold_check: default_threshold_check(),
            automap: true,
            queue: None,
            input_options: Vec::new(),
            output_options: Vec::new(),
            audio_languages: Vec::new(),
            subtitle_languages: Vec::new(),
        }
    }

    pub fn is_ffmpeg(&self) -> bool {
        self.processor == ProcessorKind::Ffmpeg
    }
}

/// Media characteristics a rule matches on. Every present field must match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleCriteria {
    /// Codec name, a leading `!` negates
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub min_filesize_mb: Option<u64>,
    #[serde(default)]
    pub min_runtime_secs: Option<u64>,
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
    #[serde(default)]
    pub min_width: Option<u32>,
    #[serde(default)]
    pub path_contains: Option<String>,
}

/// Maps media characteristics to a profile, or marks the file as skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub criteria: RuleCriteria,
}

impl Rule {
    pub fn is_skip(&self) -> bool {
        self.skip
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Queue name to maximum concurrency
    #[serde(default)]
    pub queues: BTreeMap<String, u32>,
    /// Named option sets appended to a profile's output options
    #[serde(default)]
    pub mixins: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        for (name, profile) in config.profiles.iter_mut() {
            profile.name = name.clone();
        }
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - TRANSCODE_TMP_DIR -> settings.tmp_dir
    /// - TRANSCODE_DEST_DIR -> settings.dest_dir
    /// - TRANSCODE_KEEP_ORIGINAL -> settings.keep_original
    /// - TRANSCODE_QUEUE_FILE -> settings.default_queue_file
    /// - TRANSCODE_FFMPEG -> settings.ffmpeg
    /// - TRANSCODE_HBCLI -> settings.hbcli
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TRANSCODE_TMP_DIR") {
            if !val.is_empty() {
                self.settings.tmp_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("TRANSCODE_DEST_DIR") {
            if !val.is_empty() {
                self.settings.dest_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("TRANSCODE_KEEP_ORIGINAL") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.settings.keep_original = true,
                "false" | "0" | "no" => self.settings.keep_original = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("TRANSCODE_QUEUE_FILE") {
            if !val.is_empty() {
                self.settings.default_queue_file = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("TRANSCODE_FFMPEG") {
            if !val.is_empty() {
                self.settings.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("TRANSCODE_HBCLI") {
            if !val.is_empty() {
                self.settings.hbcli = PathBuf::from(val);
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Check that every non-skip rule names a profile that exists.
    ///
    /// Undeclared queues are not checked here; they only become fatal once a
    /// file is actually routed to one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.rules {
            if rule.is_skip() {
                continue;
            }
            match &rule.profile {
                Some(name) if self.profiles.contains_key(name) => {}
                Some(name) => {
                    return Err(ConfigError::Invalid(format!(
                        "rule \"{}\" references unknown profile \"{}\"",
                        rule.name, name
                    )))
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "rule \"{}\" has neither a profile nor skip = true",
                        rule.name
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("TRANSCODE_TMP_DIR");
        env::remove_var("TRANSCODE_DEST_DIR");
        env::remove_var("TRANSCODE_KEEP_ORIGINAL");
        env::remove_var("TRANSCODE_QUEUE_FILE");
        env::remove_var("TRANSCODE_FFMPEG");
        env::remove_var("TRANSCODE_HBCLI");
    }

    const SAMPLE: &str = r#"
[settings]
tmp_dir = "/scratch"
keep_original = true
completed_suffix = "_x265"

[queues]
gpu = 2
cpu = 4

[mixins]
fast = ["-preset", "fast"]

[profiles.hevc]
extension = ".mkv"
threshold = 15
threshold_check = 60
queue = "gpu"
output_options = ["-c:v", "hevc_nvenc"]

[profiles.hb]
processor = "hbcli"
extension = ".mp4"

[[rules]]
name = "already-hevc"
skip = true
[rules.criteria]
vcodec = "hevc"

[[rules]]
name = "everything-else"
profile = "hevc"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse_toml(SAMPLE).expect("sample should parse");

        assert_eq!(config.settings.tmp_dir, Some(PathBuf::from("/scratch")));
        assert!(config.settings.keep_original);
        assert_eq!(config.settings.completed_suffix, "_x265");
        assert_eq!(config.queues.get("gpu"), Some(&2));
        assert_eq!(config.mixins["fast"], vec!["-preset", "fast"]);

        let hevc = &config.profiles["hevc"];
        assert_eq!(hevc.name, "hevc");
        assert_eq!(hevc.processor, ProcessorKind::Ffmpeg);
        assert_eq!(hevc.threshold, 15);
        assert_eq!(hevc.threshold_check, 60);
        assert_eq!(hevc.queue.as_deref(), Some("gpu"));

        let hb = &config.profiles["hb"];
        assert_eq!(hb.processor, ProcessorKind::Hbcli);
        assert_eq!(hb.threshold_check, 100);
        assert!(hb.queue.is_none());

        assert_eq!(config.rules.len(), 2);
        assert!(config.rules[0].is_skip());
        assert_eq!(config.rules[0].criteria.vcodec.as_deref(), Some("hevc"));
        assert_eq!(config.rules[1].profile.as_deref(), Some("hevc"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.settings.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.settings.completed_suffix, DEFAULT_COMPLETED_SUFFIX);
        assert!(config.settings.tmp_dir.is_none());
        assert!(config.settings.dest_dir.is_none());
        assert!(!config.settings.keep_original);
        assert!(config.settings.automap);
        assert_eq!(config.settings.status_poll_ms, 2000);
        assert_eq!(config.settings.extensions.len(), DEFAULT_EXTENSIONS.len());
        assert!(config.queues.is_empty());
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_profile() {
        let toml_str = r#"
[[rules]]
name = "broken"
profile = "missing"
"#;
        let config = Config::parse_toml(toml_str).expect("should parse");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validate_rejects_rule_without_target() {
        let toml_str = r#"
[[rules]]
name = "dangling"
"#;
        let config = Config::parse_toml(toml_str).expect("should parse");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_profile_missing_extension_is_parse_error() {
        let toml_str = r#"
[profiles.bad]
threshold = 10
"#;
        assert!(matches!(Config::parse_toml(toml_str), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides_paths() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::parse_toml("").expect("Valid TOML");
        env::set_var("TRANSCODE_TMP_DIR", "/fast/ssd");
        env::set_var("TRANSCODE_DEST_DIR", "/library/out");
        env::set_var("TRANSCODE_QUEUE_FILE", "/var/lib/queue.txt");
        env::set_var("TRANSCODE_FFMPEG", "/opt/ffmpeg/bin/ffmpeg");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.settings.tmp_dir, Some(PathBuf::from("/fast/ssd")));
        assert_eq!(config.settings.dest_dir, Some(PathBuf::from("/library/out")));
        assert_eq!(
            config.settings.default_queue_file,
            Some(PathBuf::from("/var/lib/queue.txt"))
        );
        assert_eq!(config.settings.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_env_override_invalid_bool_keeps_value() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::parse_toml("[settings]\nkeep_original = true\n").unwrap();
        env::set_var("TRANSCODE_KEEP_ORIGINAL", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert!(config.settings.keep_original);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_queue_limits_parse(
            limits in prop::collection::btree_map("[a-z]{1,8}", 1u32..64, 0..6),
        ) {
            let mut toml_str = String::from("[queues]\n");
            for (name, max) in &limits {
                toml_str.push_str(&format!("{} = {}\n", name, max));
            }

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");
            prop_assert_eq!(config.queues, limits);
        }

        #[test]
        fn prop_env_overrides_keep_original(
            initial in proptest::bool::ANY,
            override_keep in proptest::bool::ANY,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[settings]\nkeep_original = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("TRANSCODE_KEEP_ORIGINAL", override_keep.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.settings.keep_original, override_keep);
        }
    }
}

//! Profile, rule and queue lookups over the loaded configuration.

use crate::media::MediaInfo;
use thiserror::Error;
use transcode_queue_config::{Config, Profile, Rule, RuleCriteria};

/// Error type for catalog lookups
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Mixin \"{0}\" is not defined")]
    UnknownMixin(String),
}

/// Read-only view of profiles, rules and queue limits.
pub trait ProfileCatalog: Send + Sync {
    /// First rule, in declaration order, whose criteria all match.
    fn match_rule(&self, info: &MediaInfo) -> Option<&Rule>;
    fn get_profile(&self, name: &str) -> Option<&Profile>;
    fn has_profile(&self, name: &str) -> bool {
        self.get_profile(name).is_some()
    }
    fn has_queue(&self, name: &str) -> bool;
    /// Configured maximum concurrency for a declared queue.
    fn queue_limit(&self, name: &str) -> Option<u32>;
    /// The profile's output options followed by each mixin's options.
    fn output_options(&self, profile: &Profile, mixins: &[String]) -> Result<Vec<String>, CatalogError>;
    fn profile_names(&self) -> Vec<&str>;
}

/// Bytes per megabyte in rule criteria
const MB: u64 = 1_000_000;

fn criteria_match(criteria: &RuleCriteria, info: &MediaInfo) -> bool {
    if let Some(wanted) = &criteria.vcodec {
        let matched = match wanted.strip_prefix('!') {
            Some(excluded) => !info.vcodec.eq_ignore_ascii_case(excluded),
            None => info.vcodec.eq_ignore_ascii_case(wanted),
        };
        if !matched {
            return false;
        }
    }
    if let Some(min_mb) = criteria.min_filesize_mb {
        if info.filesize_bytes < min_mb.saturating_mul(MB) {
            return false;
        }
    }
    if let Some(min) = criteria.min_runtime_secs {
        if info.runtime_secs < min {
            return false;
        }
    }
    if let Some(max) = criteria.max_runtime_secs {
        if info.runtime_secs > max {
            return false;
        }
    }
    if let Some(min_width) = criteria.min_width {
        if info.width < min_width {
            return false;
        }
    }
    if let Some(fragment) = &criteria.path_contains {
        if !info.path.to_string_lossy().contains(fragment.as_str()) {
            return false;
        }
    }
    true
}

impl ProfileCatalog for Config {
    fn match_rule(&self, info: &MediaInfo) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| criteria_match(&rule.criteria, info))
    }

    fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    fn has_queue(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    fn queue_limit(&self, name: &str) -> Option<u32> {
        self.queues.get(name).copied()
    }

    fn output_options(&self, profile: &Profile, mixins: &[String]) -> Result<Vec<String>, CatalogError> {
        let mut options = profile.output_options.clone();
        for name in mixins {
            let extra = self
                .mixins
                .get(name)
                .ok_or_else(|| CatalogError::UnknownMixin(name.clone()))?;
            options.extend(extra.iter().cloned());
        }
        Ok(options)
    }

    fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_PREFIX_LOOKUP_URL: &str = "https://prefix.cc/{prefix}.file.ttl";
pub const DEFAULT_NAMESPACE_LOOKUP_URL: &str = "https://prefix.cc/reverse?uri={namespace}&format=ttl";

const CACHE_DIR_NAME: &str = "rdf-graph-cache";
const SHARED_CACHE_DIR: &str = "/usr/local/share/rdf-graph-cache/";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Vocabulary cache directory; found by convention when unset
    pub cache_dir: Option<String>,
    /// Never touch the network
    pub offline: bool,
    pub prefix_lookup_url: String,
    pub namespace_lookup_url: String,
    pub fetch_timeout_secs: u64,
    /// Namespaces whose vocabulary is published somewhere else than the namespace IRI
    #[serde(default = "default_vocab_sources")]
    pub vocab_sources: HashMap<String, String>,
    pub hover: bool,
    pub unresolved_diagnostics: bool,
    pub term_diagnostics: bool,
    pub max_completions: usize,
}

/// Command line values that win over every settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub cache_dir: Option<PathBuf>,
    pub offline: bool,
}

fn default_vocab_sources() -> HashMap<String, String> {
    HashMap::from([
        (
            "https://schema.org/".to_string(),
            "https://schema.org/version/latest/schemaorg-current-https.ttl".to_string(),
        ),
        (
            "http://schema.org/".to_string(),
            "https://schema.org/version/latest/schemaorg-current-http.ttl".to_string(),
        ),
    ])
}

impl Settings {
    pub fn new(root_dir: &Path, overrides: &Overrides) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/ldls/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.ldls",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .add_source(Environment::with_prefix("LDLS"))
            .set_default("offline", false)?
            .set_default("prefix_lookup_url", DEFAULT_PREFIX_LOOKUP_URL)?
            .set_default("namespace_lookup_url", DEFAULT_NAMESPACE_LOOKUP_URL)?
            .set_default("fetch_timeout_secs", 10)?
            .set_default("hover", true)?
            .set_default("unresolved_diagnostics", true)?
            .set_default("term_diagnostics", true)?
            .set_default("max_completions", 200)?
            .set_override_option(
                "cache_dir",
                overrides
                    .cache_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().to_string()),
            )?
            .set_override_option("offline", overrides.offline.then_some(true))?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// The vocabulary cache directory, created if needed.
    ///
    /// An explicit `cache_dir` wins. Otherwise the first existing one of
    /// `$RDF_GRAPH_CACHE` (or `~/.rdf-graph-cache`), the user cache
    /// directory and the shared system directory; failing that the user
    /// cache directory is created.
    pub fn resolve_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => {
                let personal = std::env::var("RDF_GRAPH_CACHE")
                    .map(PathBuf::from)
                    .ok()
                    .or_else(|| dirs::home_dir().map(|home| home.join(".rdf-graph-cache")));
                let user = dirs::cache_dir().map(|dir| dir.join(CACHE_DIR_NAME));
                let candidates = [personal, user.clone(), Some(PathBuf::from(SHARED_CACHE_DIR))];
                first_existing(&candidates)
                    .or(user)
                    .ok_or(anyhow!("No cache directory could be determined"))?
            }
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn first_existing(candidates: &[Option<PathBuf>]) -> Option<PathBuf> {
    candidates.iter().flatten().find(|dir| dir.is_dir()).cloned()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache_dir: None,
            offline: false,
            prefix_lookup_url: DEFAULT_PREFIX_LOOKUP_URL.to_string(),
            namespace_lookup_url: DEFAULT_NAMESPACE_LOOKUP_URL.to_string(),
            fetch_timeout_secs: 10,
            vocab_sources: default_vocab_sources(),
            hover: true,
            unresolved_diagnostics: true,
            term_diagnostics: true,
            max_completions: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Test: a workspace `.ldls.toml` overrides the defaults
    #[test]
    fn workspace_file_overrides_defaults() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join(".ldls.toml"),
            "max_completions = 5\nterm_diagnostics = false\n",
        )
        .unwrap();

        let settings = Settings::new(root.path(), &Overrides::default()).unwrap();
        assert_eq!(settings.max_completions, 5);
        assert!(!settings.term_diagnostics);
        assert!(settings.hover);
        assert_eq!(settings.prefix_lookup_url, DEFAULT_PREFIX_LOOKUP_URL);
        assert!(settings.vocab_sources.contains_key("https://schema.org/"));
    }

    #[test]
    fn command_line_wins() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join(".ldls.toml"), "offline = false\n").unwrap();
        let overrides = Overrides {
            cache_dir: Some(root.path().join("cache")),
            offline: true,
        };

        let settings = Settings::new(root.path(), &overrides).unwrap();
        assert!(settings.offline);
        let dir = settings.resolve_cache_dir().unwrap();
        assert_eq!(dir, root.path().join("cache"));
        assert!(dir.is_dir());
    }

    #[test]
    fn first_existing_candidate_wins() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("missing");
        let present = root.path().join("present");
        std::fs::create_dir(&present).unwrap();

        let candidates = [None, Some(missing), Some(present.clone())];
        assert_eq!(first_existing(&candidates), Some(present));
        assert_eq!(first_existing(&[None]), None);
    }
}

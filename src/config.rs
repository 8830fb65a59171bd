use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DEFAULT_BOOK: &str = "main";
const CONFIG_FILE: &str = "config.json";
const BOOK_FILE: &str = "cuentas.sqlite3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Book (one SQLite file) that commands operate on.
    #[serde(default)]
    pub current_book: String,

    /// Organization used when a command doesn't name one.
    #[serde(default)]
    pub default_organization: Option<Uuid>,

    /// `tracing` filter directives, overridden by `CUENTAS_LOG`.
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            current_book: DEFAULT_BOOK.to_string(),
            default_organization: None,
            log_filter: None,
        }
    }
}

impl AppConfig {
    /// Reads the config file, creating it on first run. A file that needed
    /// tidying is written back.
    pub fn load_or_init(paths: &AppPaths) -> Result<(Self, PathBuf)> {
        fs::create_dir_all(&paths.config_dir)
            .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

        let path = paths.config_file();
        if !path.exists() {
            let cfg = Self::default();
            cfg.save(&path)?;
            return Ok((cfg, path));
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if cfg.tidy() {
            tracing::debug!(path = %path.display(), "config rewritten");
            cfg.save(&path)?;
        }
        Ok((cfg, path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Fills a missing book and drops a blank log filter. Returns whether
    /// anything changed.
    fn tidy(&mut self) -> bool {
        let mut changed = false;
        if self.current_book.trim().is_empty() {
            self.current_book = DEFAULT_BOOK.to_string();
            changed = true;
        }
        if self.log_filter.as_deref().is_some_and(|f| f.trim().is_empty()) {
            self.log_filter = None;
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// `home` puts config and data side by side under one directory;
    /// otherwise the platform locations are used.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self> {
        if let Some(home) = home {
            return Ok(Self {
                config_dir: home.join("config"),
                data_dir: home.join("data"),
            });
        }

        let proj = ProjectDirs::from("com", "cuentas", "cuentas")
            .context("Failed to resolve platform directories")?;
        Ok(Self {
            config_dir: proj.config_dir().to_path_buf(),
            data_dir: proj.data_dir().to_path_buf(),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// `data/books/<slug>/cuentas.sqlite3`
    pub fn book_file(&self, book: &str) -> PathBuf {
        self.data_dir.join("books").join(book_slug(book)).join(BOOK_FILE)
    }
}

/// Directory-safe form of a book name: lowercase alphanumerics, with each run
/// of anything else collapsed to one `-`.
pub fn book_slug(name: &str) -> String {
    let slug = name
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        DEFAULT_BOOK.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_slug_normalizes_names() {
        assert_eq!(book_slug("Acme Corp"), "acme-corp");
        assert_eq!(book_slug("a//b"), "a-b");
        assert_eq!(book_slug(" 2024: Q1 "), "2024-q1");
        assert_eq!(book_slug("!!!"), "main");
    }

    #[test]
    fn book_file_lives_under_its_slug() {
        let paths = AppPaths::resolve(Some(PathBuf::from("/tmp/home"))).unwrap();
        assert_eq!(
            paths.book_file("Acme Corp"),
            PathBuf::from("/tmp/home/data/books/acme-corp/cuentas.sqlite3")
        );
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/home/config/config.json"));
    }

    #[test]
    fn tidy_fills_book_and_drops_blank_filter() {
        let mut cfg: AppConfig = serde_json::from_str(r#"{"log_filter": "  "}"#).unwrap();
        assert!(cfg.default_organization.is_none());
        assert!(cfg.tidy());
        assert_eq!(cfg.current_book, "main");
        assert_eq!(cfg.log_filter, None);
        assert!(!cfg.tidy());
    }

    #[test]
    fn load_or_init_writes_back_tidied_config() {
        let home = tempfile::tempdir().unwrap();
        let paths = AppPaths::resolve(Some(home.path().to_path_buf())).unwrap();

        let (cfg, path) = AppConfig::load_or_init(&paths).unwrap();
        assert_eq!(cfg.current_book, "main");
        assert!(path.exists());

        fs::write(&path, "{}").unwrap();
        let (cfg, _) = AppConfig::load_or_init(&paths).unwrap();
        assert_eq!(cfg.current_book, "main");
        let saved: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.current_book, "main");
    }
}

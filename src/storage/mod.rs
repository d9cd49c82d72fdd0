//! Persistence layer.
//!
//! Saves and loads the paper portfolio. The JSON file store writes to a
//! sibling temp file and renames it over the target, so a crash mid-write
//! never leaves a truncated portfolio behind.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::types::{BotError, Portfolio};

/// Default portfolio file path.
pub const DEFAULT_PORTFOLIO_FILE: &str = "paper_trades.json";

/// Key-value blob store for the portfolio.
pub trait PortfolioStore: Send + Sync {
    /// Load the saved portfolio. `Ok(None)` means nothing was saved yet.
    fn load(&self) -> Result<Option<Portfolio>, BotError>;

    fn save(&self, portfolio: &Portfolio) -> Result<(), BotError>;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Save a portfolio as pretty JSON, creating parent directories as needed.
pub fn save_portfolio(portfolio: &Portfolio, path: Option<&str>) -> Result<(), BotError> {
    let path = Path::new(path.unwrap_or(DEFAULT_PORTFOLIO_FILE));
    let json = serde_json::to_string_pretty(portfolio)
        .map_err(|e| BotError::Storage(format!("failed to serialise portfolio: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            BotError::Storage(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp = temp_sibling(path);
    std::fs::write(&tmp, &json)
        .map_err(|e| BotError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        BotError::Storage(format!("failed to move portfolio into {}: {e}", path.display()))
    })?;

    debug!(
        path = %path.display(),
        balance = format!("${:.2}", portfolio.current_balance),
        trades = portfolio.trades.len(),
        "Portfolio saved"
    );
    Ok(())
}

/// Load a portfolio from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_portfolio(path: Option<&str>) -> Result<Option<Portfolio>, BotError> {
    let path = path.unwrap_or(DEFAULT_PORTFOLIO_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved portfolio found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .map_err(|e| BotError::Storage(format!("failed to read {path}: {e}")))?;
    let portfolio: Portfolio = serde_json::from_str(&json)
        .map_err(|e| BotError::Storage(format!("failed to parse {path}: {e}")))?;

    info!(
        path,
        balance = format!("${:.2}", portfolio.current_balance),
        trades = portfolio.trades.len(),
        "Portfolio loaded from disk"
    );
    Ok(Some(portfolio))
}

/// Delete the portfolio file (for testing or reset).
pub fn delete_portfolio(path: Option<&str>) -> Result<(), BotError> {
    let path = path.unwrap_or(DEFAULT_PORTFOLIO_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .map_err(|e| BotError::Storage(format!("failed to delete {path}: {e}")))?;
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Portfolio persisted as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PortfolioStore for JsonFileStore {
    fn load(&self) -> Result<Option<Portfolio>, BotError> {
        load_portfolio(Some(&self.path))
    }

    fn save(&self, portfolio: &Portfolio) -> Result<(), BotError> {
        save_portfolio(portfolio, Some(&self.path))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Portfolio held in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<Portfolio>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_portfolio(portfolio: Portfolio) -> Self {
        let store = Self::default();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = Some(portfolio);
        }
        store
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl PortfolioStore for MemoryStore {
    fn load(&self) -> Result<Option<Portfolio>, BotError> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|_| BotError::Storage("memory store lock poisoned".into()))
    }

    fn save(&self, portfolio: &Portfolio) -> Result<(), BotError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| BotError::Storage("memory store lock poisoned".into()))?;
        *slot = Some(portfolio.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

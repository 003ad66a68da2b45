//! Symbol Directory
//!
//! Static mapping from upstream feed identifiers to canonical display
//! symbols, plus the ordered list of symbols subscribed upstream.
//!
//! The directory is built once at startup (either from the built-in NSE
//! universe or from a JSON file) and is immutable afterwards, so it is
//! shared between tasks behind a plain `Arc` with no locking.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Canonical market symbol (e.g. `RELIANCE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from any string-like value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the symbol is the empty string.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque upstream instrument identifier (e.g. `100000737`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamId(String);

impl UpstreamId {
    /// Create an upstream identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for UpstreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building a directory.
#[derive(Debug, thiserror::Error)]
pub enum SymbolDirectoryError {
    /// The directory contains no entries.
    #[error("symbol directory is empty")]
    Empty,

    /// An entry has an empty id or symbol.
    #[error("entry {index} has an empty id or symbol")]
    EmptyField {
        /// Position of the offending entry.
        index: usize,
    },

    /// The same upstream id appears twice.
    #[error("duplicate upstream id: {0}")]
    DuplicateId(String),

    /// The same canonical symbol appears twice.
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    /// Directory file could not be read.
    #[error("failed to read symbol directory: {0}")]
    Io(#[from] std::io::Error),

    /// Directory file is not valid JSON.
    #[error("invalid symbol directory JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// File Format
// =============================================================================

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    symbols: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    id: String,
    symbol: String,
}

// =============================================================================
// Symbol Directory
// =============================================================================

/// Immutable id → symbol mapping and upstream subscribe list.
///
/// # Example
///
/// ```rust
/// use price_stream_relay::domain::symbols::SymbolDirectory;
///
/// let directory = SymbolDirectory::nse_default();
/// assert_eq!(directory.resolve("100000737").map(|s| s.as_str()), Some("ITC"));
/// assert!(directory.resolve("999").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SymbolDirectory {
    by_id: HashMap<UpstreamId, Symbol>,
    known: HashSet<Symbol>,
    subscribe_list: Vec<Symbol>,
}

impl SymbolDirectory {
    /// Build a directory from `(upstream_id, symbol)` pairs.
    ///
    /// Entry order defines the subscribe order.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, an entry is blank, or an id or
    /// symbol is duplicated.
    pub fn from_entries<I, A, B>(entries: I) -> Result<Self, SymbolDirectoryError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut by_id = HashMap::new();
        let mut known = HashSet::new();
        let mut subscribe_list = Vec::new();

        for (index, (id, symbol)) in entries.into_iter().enumerate() {
            let id: String = id.into();
            let symbol: String = symbol.into();
            let (id, symbol) = (id.trim(), symbol.trim());

            if id.is_empty() || symbol.is_empty() {
                return Err(SymbolDirectoryError::EmptyField { index });
            }

            let symbol = Symbol::new(symbol);
            if !known.insert(symbol.clone()) {
                return Err(SymbolDirectoryError::DuplicateSymbol(symbol.to_string()));
            }
            if by_id
                .insert(UpstreamId::new(id), symbol.clone())
                .is_some()
            {
                return Err(SymbolDirectoryError::DuplicateId(id.to_string()));
            }
            subscribe_list.push(symbol);
        }

        if subscribe_list.is_empty() {
            return Err(SymbolDirectoryError::Empty);
        }

        Ok(Self {
            by_id,
            known,
            subscribe_list,
        })
    }

    /// Parse a directory from JSON text.
    ///
    /// Format: `{"symbols":[{"id":"100000737","symbol":"ITC"}, ...]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the entries are invalid.
    pub fn from_json_str(text: &str) -> Result<Self, SymbolDirectoryError> {
        let file: DirectoryFile = serde_json::from_str(text)?;
        Self::from_entries(file.symbols.into_iter().map(|e| (e.id, e.symbol)))
    }

    /// Load a directory from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SymbolDirectoryError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Built-in NSE large-cap universe.
    #[must_use]
    pub fn nse_default() -> Self {
        let mut by_id = HashMap::with_capacity(NSE_UNIVERSE.len());
        let mut known = HashSet::with_capacity(NSE_UNIVERSE.len());
        let mut subscribe_list = Vec::with_capacity(NSE_UNIVERSE.len());

        for (id, symbol) in NSE_UNIVERSE {
            let symbol = Symbol::from(*symbol);
            by_id.insert(UpstreamId::new(*id), symbol.clone());
            known.insert(symbol.clone());
            subscribe_list.push(symbol);
        }

        Self {
            by_id,
            known,
            subscribe_list,
        }
    }

    /// Resolve an upstream id to its canonical symbol.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&Symbol> {
        self.by_id.get(id)
    }

    /// Whether a canonical symbol is part of this directory.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.known.contains(symbol)
    }

    /// Symbols to subscribe upstream, in directory order.
    #[must_use]
    pub fn subscribe_list(&self) -> &[Symbol] {
        &self.subscribe_list
    }

    /// Number of symbols in the directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribe_list.len()
    }

    /// Whether the directory has no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe_list.is_empty()
    }

    /// Iterate over `(upstream_id, symbol)` pairs in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&UpstreamId, &Symbol)> {
        self.by_id.iter()
    }
}

impl Default for SymbolDirectory {
    fn default() -> Self {
        Self::nse_default()
    }
}

/// NSE equities tracked by default, in subscribe order.
const NSE_UNIVERSE: &[(&str, &str)] = &[
    ("100001262", "RELIANCE"),
    ("100001528", "TCS"),
    ("100000589", "HDFCBANK"),
    ("100000717", "INFY"),
    ("100000619", "HINDUNILVR"),
    ("100000647", "ICICIBANK"),
    ("100000854", "KOTAKBANK"),
    ("100000737", "ITC"),
    ("100000213", "BHARTIARTL"),
    ("100000129", "ASIANPAINT"),
    ("100001337", "SBIN"),
    ("100000166", "BAJFINANCE"),
    ("100000961", "MARUTI"),
    ("100000908", "LT"),
    ("100000154", "AXISBANK"),
    ("100001061", "NESTLEIND"),
    ("100001562", "TITAN"),
    ("100001600", "ULTRACEMCO"),
    ("100000917", "M&M"),
    ("100000163", "BAJAJFINSV"),
    ("100000392", "DRREDDY"),
    ("100001474", "SUNPHARMA"),
    ("100001194", "POWERGRID"),
    ("100001099", "NTPC"),
    ("100000546", "GRASIM"),
    ("100000028", "ADANIPORTS"),
    ("100001692", "WIPRO"),
    ("100001531", "TECHM"),
    ("100000710", "INDUSINDBK"),
    ("100011226", "ITCHOTELS"),
    ("100004843", "DELHIVERY"),
    ("100000025", "ADANIENT"),
    ("100000027", "ADANIGREEN"),
];

// =============================================================================
// Tests
// =============================================================================

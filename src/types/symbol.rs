use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol type representing a trading pair (e.g., "BTCUSDT")
/// Uses NewType pattern for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol from a string
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_creation() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(symbol.as_str(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_display() {
        let symbol = Symbol::new("ETHUSDT");
        assert_eq!(format!("{}", symbol), "ETHUSDT");
    }

    #[test]
    fn test_symbol_borrow_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<Symbol, u32> = HashMap::new();
        map.insert(Symbol::new("BTCUSDT"), 1);
        // Borrow<str> lets lookups use plain string slices
        assert_eq!(map.get("BTCUSDT"), Some(&1));
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("BTCUSDT");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BTCUSDT\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, symbol);
    }
}

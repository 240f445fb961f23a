//! Ticker universe from a stock-metadata CSV
//!
//! The market-data side of the house maintains a `ticker,name,sector,industry`
//! file; this module loads it and narrows it to the user's preferred sectors.
//! The core pipeline only ever sees the resulting list of symbols.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Sector value used for tickers whose classification is unknown; never
/// matched by a sector filter.
const UNKNOWN_SECTOR: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetadata {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
}

pub struct StockUniverse {
    entries: Vec<StockMetadata>,
}

impl StockUniverse {
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let entries = read_entries(&mut reader)?;
        info!(tickers = entries.len(), path = %path.as_ref().display(), "Loaded stock metadata");
        Ok(Self { entries })
    }

    pub fn from_reader<R: Read>(input: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(input);
        let entries = read_entries(&mut reader)?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every known symbol, in file order.
    pub fn tickers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.ticker.clone()).collect()
    }

    pub fn metadata(&self, ticker: &str) -> Option<&StockMetadata> {
        self.entries.iter().find(|e| e.ticker == ticker)
    }

    /// Symbols whose sector matches any of `sectors`, case-insensitively.
    /// Unclassified tickers are always excluded.
    pub fn filter_by_sectors(&self, sectors: &[String]) -> Vec<String> {
        let wanted: Vec<String> = sectors.iter().map(|s| s.to_lowercase()).collect();

        self.entries
            .iter()
            .filter(|e| e.sector != UNKNOWN_SECTOR)
            .filter(|e| wanted.iter().any(|w| e.sector.to_lowercase() == *w))
            .map(|e| e.ticker.clone())
            .collect()
    }
}

fn read_entries<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<StockMetadata>> {
    let mut entries = Vec::new();
    for record in reader.deserialize() {
        entries.push(record?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA_CSV: &str = "\
ticker,name,sector,industry
AAPL,Apple Inc.,Technology,Consumer Electronics
JNJ,Johnson & Johnson,Healthcare,Pharmaceuticals
XOM,Exxon Mobil,Energy,Oil & Gas
ZZZZ,Placeholder Corp,Unknown,Unknown
";

    fn universe() -> StockUniverse {
        StockUniverse::from_reader(METADATA_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_loads_all_rows() {
        let universe = universe();
        assert_eq!(universe.len(), 4);
        assert_eq!(universe.metadata("JNJ").unwrap().sector, "Healthcare");
    }

    #[test]
    fn test_sector_filter_is_case_insensitive() {
        let universe = universe();
        let tickers =
            universe.filter_by_sectors(&["technology".to_string(), "HEALTHCARE".to_string()]);
        assert_eq!(tickers, vec!["AAPL".to_string(), "JNJ".to_string()]);
    }

    #[test]
    fn test_unknown_sector_never_matches() {
        let universe = universe();
        let tickers = universe.filter_by_sectors(&["unknown".to_string()]);
        assert!(tickers.is_empty());
    }
}

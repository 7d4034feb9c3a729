//! DBC message names
//!
//! Loads Vector DBC files and keeps only what the monitor shows: the message
//! name for each `(id, extended)` pair. Later files override earlier ones.

use crate::types::{MonitorError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Bit 31 of a DBC message id marks an extended frame
const DBC_EXTENDED_FLAG: u32 = 0x8000_0000;

/// Message names keyed by identifier and frame kind
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: HashMap<(u32, bool), String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a DBC file and add its message names
    pub fn add_dbc(&mut self, path: &Path) -> Result<usize> {
        log::info!("Loading DBC file: {:?}", path);

        let bytes = std::fs::read(path)?;

        // Fall back to Latin-1 for files saved by Windows tools
        let content = String::from_utf8(bytes.clone()).unwrap_or_else(|_| {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            bytes.iter().map(|&b| b as char).collect()
        });

        let added = self.add_dbc_str(&content).map_err(|e| match e {
            MonitorError::DbcParse(msg) => MonitorError::DbcParse(format!("{:?}: {}", path, msg)),
            other => other,
        })?;

        log::info!("Loaded {} message names from {:?}", added, path);
        Ok(added)
    }

    /// Parse DBC text and add its message names
    pub fn add_dbc_str(&mut self, content: &str) -> Result<usize> {
        let dbc = can_dbc::DBC::from_slice(content.as_bytes())
            .map_err(|e| MonitorError::DbcParse(format!("{:?}", e)))?;

        let mut added = 0;
        for message in dbc.messages() {
            let raw_id = message.message_id().0;
            let extended = raw_id & DBC_EXTENDED_FLAG != 0;
            let id = raw_id & !DBC_EXTENDED_FLAG;
            self.names
                .insert((id, extended), message.message_name().to_string());
            added += 1;
        }
        Ok(added)
    }

    /// Insert a single name
    pub fn insert(&mut self, id: u32, extended: bool, name: impl Into<String>) {
        self.names.insert((id, extended), name.into());
    }

    pub fn name_of(&self, id: u32, extended: bool) -> Option<&str> {
        self.names.get(&(id, extended)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_DBC: &str = r#"VERSION ""

NS_ :

BS_:

BU_: ECU1 ECU2

BO_ 256 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (0.25,0) [0|16383.75] "rpm" ECU2

BO_ 2566848254 ExtendedStatus: 8 ECU2
 SG_ Status : 0|8@1+ (1,0) [0|255] "" ECU1

"#;

    #[test]
    fn test_parse_names() {
        let mut symbols = SymbolTable::new();
        let added = symbols.add_dbc_str(SAMPLE_DBC).unwrap();
        assert_eq!(added, 2);
        assert_eq!(symbols.name_of(0x100, false), Some("EngineData"));
        assert_eq!(symbols.name_of(0x18FE_FEFE, true), Some("ExtendedStatus"));
        assert_eq!(symbols.name_of(0x100, true), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_DBC.as_bytes()).unwrap();

        let mut symbols = SymbolTable::new();
        assert_eq!(symbols.add_dbc(file.path()).unwrap(), 2);
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let mut symbols = SymbolTable::new();
        let result = symbols.add_dbc(Path::new("does-not-exist.dbc"));
        assert!(matches!(result, Err(MonitorError::Io(_))));
    }
}

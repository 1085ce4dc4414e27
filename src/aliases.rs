/// Chromosome alias lookup (`1` vs `chr1`, `MT` vs `chrM`)
///
/// Alias files have one tab-separated row per chromosome; the first column is
/// the canonical name. Blank lines and `#` comments are ignored.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{LoadError, Result};

#[derive(Debug, Clone, Default)]
pub struct ChromosomeAliases {
    canonical: HashMap<String, String>,
    ucsc_style: bool,
}

impl ChromosomeAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat `N`/`chrN` and `MT`/`chrM` as the same chromosome
    pub fn with_default_ucsc(mut self) -> Self {
        self.ucsc_style = true;
        self
    }

    /// First name in `names` becomes canonical for all of them
    pub fn add_alias_set<S: AsRef<str>>(&mut self, names: &[S]) {
        let Some(canonical) = names.first().map(|n| n.as_ref().to_string()) else {
            return;
        };
        for name in names {
            self.canonical.insert(name.as_ref().to_string(), canonical.clone());
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut aliases = ChromosomeAliases::new();
        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.map_err(|e| LoadError::AliasFile {
                line: idx + 1,
                message: e.to_string(),
            })?;
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let names: Vec<&str> = line.split('\t').map(str::trim).filter(|s| !s.is_empty()).collect();
            if names.len() < 2 {
                return Err(LoadError::AliasFile {
                    line: idx + 1,
                    message: format!("expected at least two names, got '{line}'"),
                });
            }
            aliases.add_alias_set(&names);
        }
        Ok(aliases)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| LoadError::AliasFile {
            line: 0,
            message: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_reader(file)
    }

    pub fn canonical_name(&self, raw: &str) -> String {
        if let Some(name) = self.canonical.get(raw) {
            return name.clone();
        }
        if self.ucsc_style {
            return ucsc_name(raw);
        }
        raw.to_string()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

fn ucsc_name(raw: &str) -> String {
    if raw.starts_with("chr") {
        return raw.to_string();
    }
    match raw {
        "MT" | "M" => "chrM".to_string(),
        s if s.chars().all(|c| c.is_ascii_digit()) || matches!(s, "X" | "Y") => format!("chr{s}"),
        s => s.to_string(),
    }
}

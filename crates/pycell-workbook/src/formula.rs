//! The single formula shape this crate reads and writes:
//! `=PY(SHEET();CELL("ADDRESS"))`, optionally followed by extra arguments.
//! Either `,` or `;` separates arguments.

use regex::Regex;

use crate::config::SyncConfig;

/// Recognizes and builds the engine's cell formula for one function name.
#[derive(Debug, Clone)]
pub struct FormulaMatcher {
    function_name: String,
    separator: char,
    pattern: Regex,
}

impl FormulaMatcher {
    pub fn new(function_name: &str, separator: char) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r#"(?i)^\s*=\s*{}\s*\(\s*SHEET\s*\(\s*\)\s*[;,]\s*CELL\s*\(\s*"ADDRESS"\s*\)\s*(?:[;,](?P<extra>.*))?\)\s*$"#,
            regex::escape(function_name)
        ))?;
        Ok(Self {
            function_name: function_name.to_string(),
            separator,
            pattern,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, regex::Error> {
        Self::new(&config.function_name, config.separator)
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn is_recognized(&self, formula: &str) -> bool {
        self.pattern.is_match(formula)
    }

    /// Extra arguments after the address, untouched.
    pub fn extra_args<'f>(&self, formula: &'f str) -> Option<&'f str> {
        self.pattern
            .captures(formula)?
            .name("extra")
            .map(|m| m.as_str().trim())
    }

    /// Canonical formula text written into cells.
    pub fn build(&self) -> String {
        format!(
            "={}(SHEET(){sep}CELL(\"ADDRESS\"))",
            self.function_name,
            sep = self.separator
        )
    }
}

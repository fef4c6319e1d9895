//! Line-oriented, tag-delimited configuration documents.
//!
//! The simulation reads its parameters from a text document of the form
//!
//! ```text
//! <hemocell>
//! <domain>
//!     <nx> 64 </nx>
//! </domain>
//! </hemocell>
//! ```
//!
//! This store deliberately avoids a full XML parser: mutation is
//! "set-or-insert" on raw lines, every untouched line is preserved verbatim,
//! and writing the same value twice leaves the document byte-identical.

use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::Path;

/// An in-memory configuration document, one entry per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<String>,
}

impl ConfigDocument {
    /// Parse a document from raw text.
    pub fn from_str(text: &str) -> Self {
        Self {
            lines: text.lines().map(String::from).collect(),
        }
    }

    /// Load a document from a UTF-8 text file.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::from_str(&fs::read_to_string(path)?))
    }

    /// Write the document back, truncating the target file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_string())
    }

    /// Replace the first line containing `<field>` with a freshly formatted
    /// `\t<field> value </field>` line.
    ///
    /// If the field is absent, the line is inserted directly after the first
    /// line containing `<root>`. If the root tag is also absent, a new
    /// `<root>...</root>` block (followed by a blank line) is appended before
    /// the document's final line.
    pub fn set_or_insert(&mut self, root: &str, field: &str, value: impl Display) {
        let field_open = format!("<{field}>");
        let new_line = format!("\t<{field}> {value} </{field}>");

        if let Some(i) = self.lines.iter().position(|l| l.contains(&field_open)) {
            self.lines[i] = new_line;
            return;
        }

        let root_open = format!("<{root}>");
        if let Some(i) = self.lines.iter().position(|l| l.contains(&root_open)) {
            self.lines.insert(i + 1, new_line);
            return;
        }

        let at = self.lines.len().saturating_sub(1);
        self.lines.insert(at, root_open);
        self.lines.insert(at + 1, new_line);
        self.lines.insert(at + 2, format!("</{root}>"));
        self.lines.insert(at + 3, String::new());
    }

    /// Raw document lines, without terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

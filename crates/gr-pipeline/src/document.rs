//! Document sink
//!
//! Template manipulation lives behind [`DocumentSink`]. The bundled
//! [`MarkdownDocument`] treats blank-line separated paragraphs as the unit
//! of insertion and matches anchors on exact trimmed paragraph text.

/// Receives content blocks at anchor paragraphs
///
/// One sink belongs to exactly one run.
pub trait DocumentSink: Send {
    /// True when a paragraph with exactly this text exists
    fn has_anchor(&self, anchor: &str) -> bool;

    /// Insert a paragraph after the anchor; false when the anchor is missing
    fn insert_paragraph(&mut self, anchor: &str, text: &str) -> bool;

    /// Insert a table after the anchor; false when the anchor is missing
    fn insert_table(&mut self, anchor: &str, header: &[String], rows: &[Vec<String>]) -> bool;

    /// Put a banner before all content
    fn prepend_banner(&mut self, text: &str);

    /// Add a titled section at the end
    fn append_section(&mut self, title: &str, body: &str);

    /// Serialized document
    fn render(&self) -> String;
}

/// Markdown document built from a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownDocument {
    paragraphs: Vec<String>,
    // Last position written after each anchor, so repeated inserts keep order.
    cursors: Vec<(String, usize)>,
}

impl MarkdownDocument {
    /// Parse a template into paragraphs
    #[must_use]
    pub fn from_template(template: &str) -> Self {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in template.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join("\n"));
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join("\n"));
        }
        Self {
            paragraphs,
            cursors: Vec::new(),
        }
    }

    /// Paragraphs in document order
    #[must_use]
    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    fn anchor_position(&self, anchor: &str) -> Option<usize> {
        let anchor = anchor.trim();
        self.paragraphs.iter().position(|p| p.trim() == anchor)
    }

    fn insert_after(&mut self, anchor: &str, text: String) -> bool {
        let Some(found) = self.anchor_position(anchor) else {
            tracing::warn!("Anchor not found: '{}'", anchor);
            return false;
        };
        let after = self
            .cursors
            .iter()
            .find(|(a, _)| a == anchor)
            .map_or(found, |(_, pos)| *pos);
        let at = after + 1;
        self.paragraphs.insert(at, text);
        for (_, pos) in &mut self.cursors {
            if *pos >= at {
                *pos += 1;
            }
        }
        match self.cursors.iter_mut().find(|(a, _)| a == anchor) {
            Some((_, pos)) => *pos = at,
            None => self.cursors.push((anchor.to_string(), at)),
        }
        true
    }
}

fn table_row(cells: &[String]) -> String {
    let cells: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
    format!("| {} |", cells.join(" | "))
}

/// Render a Markdown table
#[must_use]
pub fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut lines = vec![
        table_row(header),
        format!("|{}|", vec!["---"; header.len()].join("|")),
    ];
    lines.extend(rows.iter().map(|r| table_row(r)));
    lines.join("\n")
}

impl DocumentSink for MarkdownDocument {
    fn has_anchor(&self, anchor: &str) -> bool {
        self.anchor_position(anchor).is_some()
    }

    fn insert_paragraph(&mut self, anchor: &str, text: &str) -> bool {
        self.insert_after(anchor, text.trim().to_string())
    }

    fn insert_table(&mut self, anchor: &str, header: &[String], rows: &[Vec<String>]) -> bool {
        self.insert_after(anchor, render_table(header, rows))
    }

    fn prepend_banner(&mut self, text: &str) {
        self.paragraphs.insert(0, format!("> **{}**", text.trim()));
        for (_, pos) in &mut self.cursors {
            *pos += 1;
        }
    }

    fn append_section(&mut self, title: &str, body: &str) {
        self.paragraphs.push(format!("## {}", title.trim()));
        if !body.trim().is_empty() {
            self.paragraphs.push(body.trim().to_string());
        }
    }

    fn render(&self) -> String {
        let mut out = self.paragraphs.join("\n\n");
        out.push('\n');
        out
    }
}

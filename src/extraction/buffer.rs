/// Append-only capture of a detector's output, one entry per line.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        let mut line = line.into();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines at and after `offset`; empty when the offset is past the end.
    pub fn lines_from(&self, offset: usize) -> &[String] {
        self.lines.get(offset..).unwrap_or(&[])
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

/// Output boundaries for captured console lines
///
/// Captured lines arrive one at a time from the execution context. The buffer
/// keeps at most `max_lines`, cuts each line to `max_line_bytes`, and records
/// whether anything was dropped so callers can tell partial output apart.
use crate::config::types::OutputLimits;

/// Bounded line buffer
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    limits: OutputLimits,
    lines: Vec<String>,
    truncated: bool,
    dropped: usize,
}

impl OutputBuffer {
    pub fn new(limits: OutputLimits) -> Self {
        Self {
            limits,
            lines: Vec::new(),
            truncated: false,
            dropped: 0,
        }
    }

    /// Append one line, applying both limits.
    pub fn push(&mut self, line: String) {
        if self.lines.len() >= self.limits.max_lines {
            self.truncated = true;
            self.dropped += 1;
            return;
        }

        let (line, cut) = truncate_on_char_boundary(line, self.limits.max_line_bytes);
        if cut {
            self.truncated = true;
        }
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Lines dropped after `max_lines` was reached
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_parts(self) -> (Vec<String>, bool) {
        (self.lines, self.truncated)
    }
}

/// Cut `line` to at most `max_bytes` without splitting a UTF-8 sequence.
fn truncate_on_char_boundary(mut line: String, max_bytes: usize) -> (String, bool) {
    if line.len() <= max_bytes {
        return (line, false);
    }

    let mut cut = max_bytes;
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    line.truncate(cut);
    (line, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_lines: usize, max_line_bytes: usize) -> OutputLimits {
        OutputLimits {
            max_lines,
            max_line_bytes,
        }
    }

    #[test]
    fn keeps_lines_in_order() {
        let mut buffer = OutputBuffer::new(OutputLimits::default());
        buffer.push("first".to_string());
        buffer.push("second".to_string());
        let (lines, truncated) = buffer.into_parts();
        assert_eq!(lines, vec!["first", "second"]);
        assert!(!truncated);
    }

    #[test]
    fn drops_lines_past_limit() {
        let mut buffer = OutputBuffer::new(limits(2, 64));
        for i in 0..5 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 3);
        assert!(buffer.truncated());
    }

    #[test]
    fn cuts_long_lines() {
        let mut buffer = OutputBuffer::new(limits(10, 4));
        buffer.push("abcdefgh".to_string());
        let (lines, truncated) = buffer.into_parts();
        assert_eq!(lines, vec!["abcd"]);
        assert!(truncated);
    }

    #[test]
    fn cut_respects_char_boundaries() {
        // "é" is two bytes; a 3-byte cut must not split the second one
        let (line, cut) = truncate_on_char_boundary("éé".to_string(), 3);
        assert_eq!(line, "é");
        assert!(cut);
    }
}

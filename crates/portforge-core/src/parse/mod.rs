pub mod config;
pub mod experiments;
pub mod mappings;

use crate::error::{PfResult, PortForgeError};
use std::io::BufRead;

/// Line-oriented token reader shared by all three input formats.
///
/// `#` starts a comment only when it sits at column 0 or right after
/// whitespace; blank and comment-only lines are skipped entirely.
pub struct LineParser<R: BufRead> {
    input: R,
    line: String,
    tokens: Vec<String>,
    line_no: usize,
    exhausted: bool,
}

impl<R: BufRead> LineParser<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            tokens: Vec::new(),
            line_no: 0,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance to the next line carrying tokens; `Ok(false)` at the end of
    /// the input.
    pub fn next_line(&mut self) -> PfResult<bool> {
        loop {
            self.tokens.clear();
            self.line.clear();
            if self.input.read_line(&mut self.line)? == 0 {
                self.exhausted = true;
                return Ok(false);
            }
            self.line_no += 1;
            while self.line.ends_with('\n') || self.line.ends_with('\r') {
                self.line.pop();
            }
            let content = strip_comment(&self.line);
            self.tokens = content.split_whitespace().map(str::to_string).collect();
            if !self.tokens.is_empty() {
                return Ok(true);
            }
        }
    }

    pub fn next_line_or_fail(&mut self) -> PfResult<()> {
        if self.next_line()? {
            Ok(())
        } else {
            Err(self.error("File ended unexpectedly!"))
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_line(&self, expected: &str) -> bool {
        self.tokens.len() == 1 && self.tokens[0] == expected
    }

    pub fn expect_line(&self, expected: &str) -> PfResult<()> {
        self.expect(self.is_line(expected), "Unexpected line!")
    }

    pub fn expect(&self, cond: bool, msg: &str) -> PfResult<()> {
        if cond {
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    pub fn error(&self, msg: impl Into<String>) -> PortForgeError {
        PortForgeError::Parse {
            line: self.line_no,
            msg: msg.into(),
            content: self.line.clone(),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (idx, &byte) in bytes.iter().enumerate() {
        if byte == b'#' && (idx == 0 || bytes[idx - 1].is_ascii_whitespace()) {
            return &line[..idx];
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_needs_whitespace_before_hash() {
        assert_eq!(strip_comment("# all comment"), "");
        assert_eq!(strip_comment("abc # tail"), "abc ");
        assert_eq!(strip_comment("abc#not-a-comment"), "abc#not-a-comment");
        assert_eq!(strip_comment("a#b # real"), "a#b ");
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let input = "\n# comment\n  \nfoo bar\n";
        let mut parser = LineParser::new(input.as_bytes());
        assert!(parser.next_line().unwrap());
        assert_eq!(parser.tokens(), &["foo".to_string(), "bar".to_string()]);
        assert!(!parser.next_line().unwrap());
        assert!(parser.is_exhausted());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let input = "one\ntwo broken\n";
        let mut parser = LineParser::new(input.as_bytes());
        parser.next_line().unwrap();
        parser.next_line().unwrap();
        let err = parser.error("boom");
        let text = err.to_string();
        assert!(text.contains("line 2"));
        assert!(text.contains("two broken"));
    }
}

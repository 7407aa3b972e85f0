//! Incremental extraction of complete JSON objects from a byte stream.

/// Incremental scanner that pulls complete top-level JSON objects out of an
/// accumulating byte buffer.
///
/// Tracks just enough JSON structure to be safe at arbitrary chunk
/// boundaries: brace depth, string literals, and backslash escapes. Bytes
/// between objects (array brackets, commas, whitespace) are treated as
/// framing and discarded. A partial object at the buffer tail is retained
/// until later pushes complete it.
#[derive(Debug, Default)]
pub struct JsonScanner {
    buffer: Vec<u8>,
    /// Resume position for the incremental scan.
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Offset where the current top-level object opened.
    start: Option<usize>,
}

impl JsonScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held, including any partial tail.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append upstream bytes to the scan buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete object, draining it from the buffer.
    ///
    /// Returns `None` once only partial data remains; scan state carries
    /// over so the next `push` resumes mid-object or mid-string.
    pub fn next_object(&mut self) -> Option<Vec<u8>> {
        while self.pos < self.buffer.len() {
            let byte = self.buffer[self.pos];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
            } else {
                match byte {
                    b'"' => self.in_string = true,
                    b'{' => {
                        if self.depth == 0 {
                            self.start = Some(self.pos);
                        }
                        self.depth += 1;
                    }
                    b'}' if self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0
                            && let Some(start) = self.start.take()
                        {
                            let object = self.buffer[start..=self.pos].to_vec();
                            self.buffer.drain(..=self.pos);
                            self.pos = 0;
                            return Some(object);
                        }
                    }
                    _ => {}
                }
            }
            self.pos += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_str(scanner: &mut JsonScanner) -> Option<String> {
        scanner
            .next_object()
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn extracts_objects_from_array_framing() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"[{\"a\":1},\n{\"b\":2}]");
        assert_eq!(next_str(&mut scanner).as_deref(), Some("{\"a\":1}"));
        assert_eq!(next_str(&mut scanner).as_deref(), Some("{\"b\":2}"));
        assert_eq!(scanner.next_object(), None);
    }

    #[test]
    fn partial_tail_is_retained_across_pushes() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"[{\"text\":\"he");
        assert_eq!(scanner.next_object(), None);
        assert!(scanner.buffered_bytes() > 0);

        scanner.push(b"llo\"}");
        assert_eq!(
            next_str(&mut scanner).as_deref(),
            Some("{\"text\":\"hello\"}")
        );
    }

    #[test]
    fn braces_inside_strings_do_not_close_objects() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"{\"t\":\"}{\"}");
        assert_eq!(next_str(&mut scanner).as_deref(), Some("{\"t\":\"}{\"}"));
    }

    #[test]
    fn split_inside_string_with_escaped_quote() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"{\"t\":\"said \\\"");
        assert_eq!(scanner.next_object(), None);
        scanner.push(b"}\\\" ok\"}");
        assert_eq!(
            next_str(&mut scanner).as_deref(),
            Some("{\"t\":\"said \\\"}\\\" ok\"}")
        );
    }

    #[test]
    fn trailing_escaped_backslash_does_not_eat_the_closing_quote() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"{\"t\":\"x\\\\\"}");
        assert_eq!(next_str(&mut scanner).as_deref(), Some("{\"t\":\"x\\\\\"}"));
    }

    #[test]
    fn nested_objects_come_out_whole() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"{\"a\":{\"b\":{\"c\":1}}},");
        assert_eq!(
            next_str(&mut scanner).as_deref(),
            Some("{\"a\":{\"b\":{\"c\":1}}}")
        );
        assert_eq!(scanner.next_object(), None);
    }

    #[test]
    fn non_object_framing_is_skipped() {
        let mut scanner = JsonScanner::new();
        scanner.push(b"null, \"note\", {\"a\":1}");
        assert_eq!(next_str(&mut scanner).as_deref(), Some("{\"a\":1}"));
    }
}

//! Minimal indented XML writer used by the metadata serializers

const INDENT: &str = "    ";

/// Accumulates an indented XML document
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration line
    pub fn declaration(&mut self) {
        self.out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }

    /// Write each comment on its own line at the current depth
    pub fn comments(&mut self, comments: &[String]) {
        for comment in comments {
            self.indent();
            self.out.push_str("<!-- ");
            // `--` is not allowed inside a comment
            self.out.push_str(&comment.replace("--", "- -"));
            self.out.push_str(" -->\n");
        }
    }

    /// Open an element and descend one level
    pub fn open(&mut self, tag: &str, attrs: &[(&str, Option<&str>)]) {
        self.start_tag(tag, attrs);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    /// Close an element opened with [`XmlWriter::open`]
    pub fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    /// Write a self-closing element
    pub fn empty(&mut self, tag: &str, attrs: &[(&str, Option<&str>)]) {
        self.start_tag(tag, attrs);
        self.out.push_str("/>\n");
    }

    /// Write an element whose content is text
    ///
    /// Multi-line text is placed one level deeper than the element, one line
    /// per row, so re-parsing yields the same normalized lines.
    pub fn text_element(&mut self, tag: &str, attrs: &[(&str, Option<&str>)], text: &str) {
        if text.is_empty() {
            self.empty(tag, attrs);
            return;
        }

        self.start_tag(tag, attrs);
        self.out.push('>');
        if text.contains('\n') {
            self.out.push('\n');
            self.depth += 1;
            for line in text.lines() {
                self.indent();
                self.out.push_str(&escape(line));
                self.out.push('\n');
            }
            self.depth -= 1;
            self.indent();
        } else {
            self.out.push_str(&escape(text));
        }
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    /// Write pre-serialized XML verbatim on its own line
    pub fn raw(&mut self, xml: &str) {
        self.indent();
        self.out.push_str(xml);
        self.out.push('\n');
    }

    /// Consume the writer and return the document
    pub fn finish(self) -> String {
        self.out
    }

    fn start_tag(&mut self, tag: &str, attrs: &[(&str, Option<&str>)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            if let Some(value) = value {
                self.out.push(' ');
                self.out.push_str(name);
                self.out.push_str("=\"");
                self.out.push_str(&escape(value));
                self.out.push('"');
            }
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }
}

/// Escape the five XML special characters
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_elements_are_indented() {
        let mut w = XmlWriter::new();
        w.open("service", &[("name", Some("A")), ("code", Some("pkg.A"))]);
        w.text_element("attribute", &[("name", Some("Url")), ("type", None)], "a<b");
        w.close("service");

        assert_eq!(
            w.finish(),
            "<service name=\"A\" code=\"pkg.A\">\n    <attribute name=\"Url\">a&lt;b</attribute>\n</service>\n"
        );
    }

    #[test]
    fn test_multiline_text_is_reindented() {
        let mut w = XmlWriter::new();
        w.text_element("attribute", &[("name", Some("Props"))], "a=1\nb=2");
        assert_eq!(
            w.finish(),
            "<attribute name=\"Props\">\n    a=1\n    b=2\n</attribute>\n"
        );
    }
}

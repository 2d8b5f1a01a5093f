//! Reader for the source text format.
//!
//! Line oriented and strict about indentation: every nesting level is
//! exactly four spaces, tabs are rejected. Blank lines between members are
//! ignored. CRLF line endings are accepted.

use super::INDENT;
use crate::error::{Result, SourceError};
use crate::ir::{ControlNode, FunctionDef, Property, SourceSpan, TypeRef};

struct Line<'a> {
    number: usize,
    /// Line without its trailing `\r`.
    raw: &'a str,
    indent: usize,
    body: &'a str,
}

impl<'a> Line<'a> {
    fn new(number: usize, raw: &'a str) -> Self {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let body = raw.trim_start_matches(' ');
        Self {
            number,
            raw,
            indent: raw.len() - body.len(),
            body,
        }
    }

    fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

struct Parser<'a> {
    file: &'a str,
    lines: Vec<Line<'a>>,
    pos: usize,
}

/// Parse one source file into its root control.
pub fn parse(file: &str, text: &str) -> Result<ControlNode> {
    let mut lines: Vec<Line<'_>> = text
        .split('\n')
        .enumerate()
        .map(|(i, raw)| Line::new(i + 1, raw))
        .collect();
    if text.ends_with('\n') {
        lines.pop();
    }

    let mut p = Parser {
        file,
        lines,
        pos: 0,
    };
    p.skip_blank();
    if p.pos >= p.lines.len() {
        return Err(SourceError::parse(file, None, "file has no control"));
    }
    let root = p.control(0)?;
    p.skip_blank();
    if let Some(line) = p.lines.get(p.pos) {
        return Err(p.error(line.number, "content after the root control"));
    }
    root.validate(file)?;
    Ok(root)
}

impl<'a> Parser<'a> {
    fn error(&self, line: usize, message: impl Into<String>) -> SourceError {
        SourceError::parse(self.file, Some(line), message)
    }

    fn skip_blank(&mut self) {
        while self.lines.get(self.pos).is_some_and(Line::is_blank) {
            self.pos += 1;
        }
    }

    fn control(&mut self, indent: usize) -> Result<ControlNode> {
        let line = &self.lines[self.pos];
        let number = line.number;
        if line.indent != indent {
            return Err(self.error(number, "control header is not indented correctly"));
        }
        if line.body.starts_with('\t') {
            return Err(self.error(number, "tabs are not allowed for indentation"));
        }
        let (name, type_ref) = self.header(number, line.body)?;
        let mut node = ControlNode::new(name, type_ref);
        self.pos += 1;

        let member_indent = indent + INDENT;
        loop {
            self.skip_blank();
            let Some(line) = self.lines.get(self.pos) else {
                break;
            };
            if line.indent <= indent && !line.body.starts_with('\t') {
                break;
            }
            let number = line.number;
            if line.indent != member_indent || line.body.starts_with('\t') {
                return Err(self.error(number, "unexpected indentation"));
            }

            let body = line.body;
            let (member, rest) = take_name(body).ok_or_else(|| self.error(number, "expected a name"))?;

            if rest.starts_with(" As ") {
                let child = self.control(member_indent)?;
                node.children.push(child);
            } else if let Some(value) = rest.strip_prefix("(): ") {
                let body = self.expression(number, value, member_indent)?;
                node.functions.push(FunctionDef { name: member, body });
            } else if let Some(value) = rest.strip_prefix(": ") {
                let prop = self.property(number, value, member_indent)?;
                if node.properties.insert(member.clone(), prop).is_some() {
                    return Err(self.error(number, format!("property '{member}' set twice")));
                }
            } else {
                return Err(self.error(number, "expected ': ', '(): ' or ' As '"));
            }
        }

        let last = &self.lines[self.pos.saturating_sub(1)];
        node.span = Some(SourceSpan {
            file: self.file.to_string(),
            start_line: number,
            start_column: indent + 1,
            end_line: last.number,
            end_column: last.raw.chars().count() + 1,
        });
        Ok(node)
    }

    fn header(&self, number: usize, body: &str) -> Result<(String, TypeRef)> {
        let (name, rest) = take_name(body).ok_or_else(|| self.error(number, "expected a control name"))?;
        let rest = rest
            .strip_prefix(" As ")
            .ok_or_else(|| self.error(number, "expected ' As ' after the control name"))?;
        let (template, rest) = take_name(rest).ok_or_else(|| self.error(number, "expected a template name"))?;
        let mut type_ref = TypeRef::new(template);

        let rest = match rest.strip_prefix('.') {
            Some(after) => {
                let (variant, after) =
                    take_name(after).ok_or_else(|| self.error(number, "expected a variant name"))?;
                type_ref.variant = Some(variant);
                after
            }
            None => rest,
        };
        if rest != ":" {
            return Err(self.error(number, "control header must end with ':'"));
        }
        Ok((name, type_ref))
    }

    fn property(&mut self, number: usize, value: &str, indent: usize) -> Result<Property> {
        if value.starts_with('"') {
            let text: String = serde_json::from_str(value)
                .map_err(|e| self.error(number, format!("bad string literal: {e}")))?;
            self.pos += 1;
            return Ok(Property::literal(text));
        }
        self.expression(number, value, indent).map(Property::formula)
    }

    /// `=expr` or a `|` block; leaves `pos` on the line after the value.
    fn expression(&mut self, number: usize, value: &str, indent: usize) -> Result<String> {
        if let Some(expr) = value.strip_prefix('=') {
            self.pos += 1;
            return Ok(expr.to_string());
        }
        if value != "|" {
            return Err(self.error(number, "expected '=' or '|'"));
        }

        self.pos += 1;
        let block = indent + INDENT;
        let mut parts = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent >= block {
                parts.push(&line.raw[block..]);
            } else if line.is_blank() && self.block_continues(block) {
                parts.push("");
            } else {
                break;
            }
            self.pos += 1;
        }

        let Some(first) = parts.first_mut() else {
            return Err(self.error(number, "empty expression block"));
        };
        *first = first
            .strip_prefix('=')
            .ok_or_else(|| self.error(number + 1, "expression block must start with '='"))?;
        Ok(parts.join("\n"))
    }

    /// Whether a block line follows the blank run starting at `pos`.
    fn block_continues(&self, block: usize) -> bool {
        self.lines[self.pos..]
            .iter()
            .find(|l| !(l.is_blank() && l.indent < block))
            .is_some_and(|l| l.indent >= block)
    }
}

/// Split a bare or single-quoted name off the front of `s`.
fn take_name(s: &str) -> Option<(String, &str)> {
    if let Some(quoted) = s.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                name.push(c);
                continue;
            }
            if quoted[i + 1..].starts_with('\'') {
                name.push('\'');
                chars.next();
                continue;
            }
            return Some((name, &quoted[i + 1..]));
        }
        return None;
    }

    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].to_string(), &s[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::emit;

    const SCREEN: &str = "\
Screen1 As screen:
    Fill: =RGBA(0, 0, 0, 1)
    OnVisible: |
        =Set(x, 1);

        Navigate(Screen2)
    Title: \"literal, not a formula\"
    Reset(): =Set(x, 0)
    Button1 As button.primary:
        Text: =\"Go\"
    'Odd ''Name''' As label:
";

    #[test]
    fn reads_every_member_kind() {
        let node = parse("Screen1.fx.yaml", SCREEN).unwrap();
        assert_eq!(node.template(), "screen");
        assert_eq!(
            node.properties["OnVisible"],
            Property::formula("Set(x, 1);\n\nNavigate(Screen2)")
        );
        assert_eq!(node.properties["Title"], Property::literal("literal, not a formula"));
        assert_eq!(node.functions[0].name, "Reset");
        assert_eq!(node.functions[0].body, "Set(x, 0)");
        assert_eq!(node.child_names(), vec!["Button1", "Odd 'Name'"]);
        assert_eq!(node.children[0].type_ref.variant.as_deref(), Some("primary"));

        let span = node.children[0].span.clone().unwrap();
        assert_eq!((span.start_line, span.start_column, span.end_line), (9, 5, 10));
    }

    #[test]
    fn emitted_text_parses_back_to_the_same_tree() {
        let node = parse("Screen1.fx.yaml", SCREEN).unwrap();
        let again = parse("Screen1.fx.yaml", &emit(&node)).unwrap();
        assert_eq!(node, again);
    }

    #[test]
    fn crlf_is_accepted() {
        let text = SCREEN.replace('\n', "\r\n");
        assert_eq!(
            parse("a", &text).unwrap(),
            parse("a", SCREEN).unwrap()
        );
    }

    #[test]
    fn bad_indentation_reports_the_line() {
        let err = parse("a", "S As screen:\n   Fill: =1\n").unwrap_err();
        assert!(matches!(err, SourceError::Parse { line: Some(2), .. }));

        let err = parse("a", "S As screen:\n\tFill: =1\n").unwrap_err();
        assert!(matches!(err, SourceError::Parse { line: Some(2), .. }));
    }

    #[test]
    fn duplicate_names_are_structural_errors() {
        let text = "S As screen:\n    A As label:\n    A As label:\n";
        let err = parse("a", text).unwrap_err();
        assert!(matches!(err, SourceError::StructuralValidation { .. }));
    }

    #[test]
    fn malformed_headers_and_values() {
        for text in [
            "S screen:\n",
            "S As screen\n",
            "S As screen:\n    Fill: Blue\n",
            "S As screen:\n    Fill: |\n",
            "S As screen:\n    Fill: |\n        Blue\n",
            "S As screen:\nT As screen:\n",
            "",
        ] {
            assert!(parse("a", text).is_err(), "accepted {text:?}");
        }
    }
}

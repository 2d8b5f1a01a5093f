use std::fmt::{self, Write};

use super::{INDENT, quote_name};
use crate::ir::{ControlNode, Property, TypeRef};

/// Render one control tree as source text.
pub fn emit(node: &ControlNode) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_control(&mut out, node, 0);
    out
}

pub fn write_control<W: Write>(out: &mut W, node: &ControlNode, depth: usize) -> fmt::Result {
    let pad = depth * INDENT;
    writeln!(
        out,
        "{:pad$}{} As {}:",
        "",
        quote_name(&node.name),
        type_text(&node.type_ref)
    )?;

    let inner = pad + INDENT;
    for (name, prop) in &node.properties {
        write!(out, "{:inner$}{}: ", "", quote_name(name))?;
        write_property(out, prop, inner)?;
    }
    for func in &node.functions {
        write!(out, "{:inner$}{}(): ", "", quote_name(&func.name))?;
        write_expression(out, &func.body, inner)?;
    }
    for child in &node.children {
        write_control(out, child, depth + 1)?;
    }
    Ok(())
}

fn type_text(t: &TypeRef) -> String {
    match &t.variant {
        Some(v) => format!("{}.{}", quote_name(&t.template), quote_name(v)),
        None => quote_name(&t.template).into_owned(),
    }
}

fn write_property<W: Write>(out: &mut W, prop: &Property, pad: usize) -> fmt::Result {
    if prop.is_formula {
        return write_expression(out, &prop.expression, pad);
    }
    let quoted = serde_json::to_string(&prop.expression).map_err(|_| fmt::Error)?;
    writeln!(out, "{quoted}")
}

/// `=expr` on the same line, or a `|` block one level deeper.
fn write_expression<W: Write>(out: &mut W, expr: &str, pad: usize) -> fmt::Result {
    if !expr.contains('\n') {
        return writeln!(out, "={expr}");
    }
    out.write_str("|\n")?;
    let block = pad + INDENT;
    for (i, line) in expr.split('\n').enumerate() {
        let marker = if i == 0 { "=" } else { "" };
        writeln!(out, "{:block$}{marker}{line}", "")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_control_layout() {
        let mut screen = ControlNode::new("Screen1", TypeRef::new("screen"))
            .with_formula("OnVisible", "Set(x, 1);\nNavigate(Screen2)")
            .with_formula("Fill", "RGBA(0, 0, 0, 1)")
            .with_function("Reset", "Set(x, 0)")
            .with_child(
                ControlNode::new("Button1", TypeRef::new("button").with_variant("primary"))
                    .with_formula("Text", "\"Go\""),
            );
        screen
            .properties
            .insert("Title".into(), Property::literal("literal, not a formula"));

        insta::assert_snapshot!(emit(&screen).trim_end(), @r#"
        Screen1 As screen:
            Fill: =RGBA(0, 0, 0, 1)
            OnVisible: |
                =Set(x, 1);
                Navigate(Screen2)
            Title: "literal, not a formula"
            Reset(): =Set(x, 0)
            Button1 As button.primary:
                Text: ="Go"
        "#);
    }

    #[test]
    fn empty_block_lines_keep_their_indent() {
        let node = ControlNode::new("L", TypeRef::new("label")).with_formula("Text", "a\n\nb");
        assert_eq!(
            emit(&node),
            "L As label:\n    Text: |\n        =a\n        \n        b\n"
        );
    }

    #[test]
    fn odd_names_are_quoted() {
        let node = ControlNode::new("My Label", TypeRef::new("label"))
            .with_formula("Don't", "1");
        assert_eq!(emit(&node), "'My Label' As label:\n    'Don''t': =1\n");
    }
}

//! Side-by-side HTML diff tables.
//!
//! Used to show which edit flipped the WIP tests from passing to failing (or
//! back). Only changed hunks are rendered, each with `context_lines` of
//! unchanged lines around it.

use similar::{DiffOp, DiffTag, TextDiff};

const NO_DIFFERENCES: &str = "No Differences Found";

/// Renders the difference between `old` and `new` as a `<table class="diff">`.
///
/// Rows are classed `diff_add` (only in `new`), `diff_sub` (only in `old`) or
/// `diff_chg` (replaced); unchanged context rows carry no class. Every text
/// cell is HTML-escaped.
///
/// ```
/// use wipwatch_monitor::diff::html_table;
///
/// let table = html_table("a = 1\n", "a = 2\n", 3);
/// assert!(table.contains("diff_chg"));
/// assert!(table.contains("a = 2"));
/// ```
#[must_use]
pub fn html_table(old: &str, new: &str, context_lines: usize) -> String {
    let diff = TextDiff::from_lines(old, new);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();

    let mut html = String::from(
        "<table class=\"diff\">\n<thead><tr><th colspan=\"2\">previous</th><th colspan=\"2\">current</th></tr></thead>\n",
    );

    let groups = diff.grouped_ops(context_lines);
    if groups.is_empty() {
        html.push_str("<tbody>");
        html.push_str(&format!("<tr><td colspan=\"4\">{NO_DIFFERENCES}</td></tr>"));
        html.push_str("</tbody>\n</table>");
        return html;
    }

    for group in &groups {
        html.push_str("<tbody>\n");
        for op in group {
            render_op(&mut html, op, old_lines, new_lines);
        }
        html.push_str("</tbody>\n");
    }

    html.push_str("</table>");
    html
}

fn render_op(html: &mut String, op: &DiffOp, old_lines: &[&str], new_lines: &[&str]) {
    let (tag, old_range, new_range) = op.as_tag_tuple();
    let class = match tag {
        DiffTag::Equal => "",
        DiffTag::Delete => "diff_sub",
        DiffTag::Insert => "diff_add",
        DiffTag::Replace => "diff_chg",
    };

    let rows = old_range.len().max(new_range.len());
    for offset in 0..rows {
        let left = old_range
            .clone()
            .nth(offset)
            .map(|idx| (idx + 1, old_lines[idx]));
        let right = new_range
            .clone()
            .nth(offset)
            .map(|idx| (idx + 1, new_lines[idx]));
        push_row(html, class, left, right);
    }
}

fn push_row(html: &mut String, class: &str, left: Option<(usize, &str)>, right: Option<(usize, &str)>) {
    html.push_str("<tr>");
    push_side(html, class, left);
    push_side(html, class, right);
    html.push_str("</tr>\n");
}

fn push_side(html: &mut String, class: &str, side: Option<(usize, &str)>) {
    let Some((number, line)) = side else {
        html.push_str("<td class=\"diff_header\"></td><td></td>");
        return;
    };

    let text = escape(line.trim_end_matches(['\n', '\r']));
    if class.is_empty() {
        html.push_str(&format!("<td class=\"diff_header\">{number}</td><td>{text}</td>"));
    } else {
        html.push_str(&format!(
            "<td class=\"diff_header\">{number}</td><td class=\"{class}\">{text}</td>"
        ));
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

//! # HTML Fragments
//!
//! Builds the HTML snippets the page swaps in after each request. All text that
//! comes from the user or a tokenizer goes through `html_escape`.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::batch::{BatchReport, RowDetail};
use crate::color::token_color;
use crate::error::VisualizerError;
use crate::metrics::TextMetrics;
use crate::shape::Shape;
use crate::tokenizer::{TokenGroup, TokenizationResult};

const NEWLINE_MARKER: &str = "\u{21b5}";

pub fn error_block(message: &str) -> String {
    format!("<div class=\"error-message\">{}</div>", encode_text(message))
}

pub fn warning_block(message: &str) -> String {
    format!("<div class=\"warning-message\">{}</div>", encode_text(message))
}

pub fn success_block(message: &str) -> String {
    format!("<div class=\"success-message\">{}</div>", encode_text(message))
}

/// Renders tokens as colored chips; split groups become expandable chips.
pub fn token_chips(result: &TokenizationResult) -> String {
    let mut html = String::from("<div class=\"token-container\">");
    for group in result.groups() {
        if group.is_split() {
            html.push_str(&split_group_chip(&group));
        } else {
            let token = &group.tokens[0];
            let display = encode_text(&token.text).replace('\n', NEWLINE_MARKER);
            let title = format!("ID: {}&#10;Token: {}", token.id, encode_double_quoted_attribute(&format!("{:?}", token.text)));
            html.push_str(&format!(
                "<span class=\"token-chip\" style=\"background-color: {};\" title=\"{}\">{}</span>",
                token_color(&token.text),
                title,
                display
            ));
        }
    }
    html.push_str("</div>");
    html
}

fn split_group_chip(group: &TokenGroup<'_>) -> String {
    let parts: String = group
        .tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            format!(
                "<div class=\"sub-token\">Part {}: ID {} <code>{}</code></div>",
                i + 1,
                token.id,
                encode_text(&format!("{:?}", token.text))
            )
        })
        .collect();
    let count = group.tokens.len();
    format!(
        "<div class=\"group-wrapper\"><details class=\"token-group\">\
         <summary class=\"token-summary\" style=\"background-color: {};\" title=\"{} tokens\">{} \
         <span class=\"part-count\">({})</span></summary>\
         <div class=\"token-group-content\">{}</div></details></div>",
        token_color(group.text()),
        count,
        encode_text(group.text()),
        count,
        parts
    )
}

fn metric(label: &str, value: &str, title: Option<&str>) -> String {
    let title = title
        .map(|t| format!(" title=\"{}\"", encode_double_quoted_attribute(t)))
        .unwrap_or_default();
    format!(
        "<div class=\"metric\"{}><span class=\"metric-label\">{}</span><span class=\"metric-value\">{}</span></div>",
        title,
        encode_text(label),
        encode_text(value)
    )
}

pub fn metrics(m: &TextMetrics) -> String {
    let mut html = String::from("<div class=\"metrics\">");
    html.push_str(&metric("Token Count", &m.token_count.to_string(), None));
    html.push_str(&metric(m.unit.count_label(), &m.unit_count.to_string(), None));
    let average = if m.token_count > 0 { format!("{:.2}", m.average_per_token()) } else { "0".to_string() };
    html.push_str(&metric(m.unit.average_label(), &average, None));
    if let (Some(usage), Some(size)) = (m.context_usage_percent(), m.context_size) {
        html.push_str(&metric("Context Usage", &format!("{:.1}%", usage), Some(&format!("Max Tokens: {}", size))));
    }
    html.push_str("</div>");
    html
}

/// One tokenizer's block: optional header, metrics and chips, or its error.
pub fn tokenizer_result(
    label: &str,
    show_header: bool,
    outcome: &Result<(TokenizationResult, TextMetrics), VisualizerError>,
) -> String {
    let mut html = String::from("<div class=\"tokenizer-result\">");
    if show_header {
        html.push_str(&format!("<h3>{}</h3>", encode_text(label)));
    }
    match outcome {
        Ok((result, m)) => {
            html.push_str(&metrics(m));
            html.push_str(&token_chips(result));
        }
        Err(e) => html.push_str(&error_block(&format!("Error processing with {}: {}", label, e))),
    }
    html.push_str("</div>");
    html
}

/// Lays out several tokenizer blocks: two side by side, otherwise stacked.
pub fn comparison(blocks: &[String]) -> String {
    let class = if blocks.len() == 2 { "comparison columns" } else { "comparison stacked" };
    let mut html = format!("<div class=\"{}\">", class);
    if blocks.len() > 1 {
        html.insert_str(0, "<h2>Comparison</h2>");
    }
    for block in blocks {
        html.push_str(block);
    }
    html.push_str("</div>");
    html
}

pub fn chat_message(position: usize, role: &str, body: &str) -> String {
    format!(
        "<section class=\"chat-message\"><h4>Message {} &middot; {}</h4>{}</section>",
        position,
        encode_text(role),
        body
    )
}

fn shape_banner(shape: &Shape) -> String {
    match shape {
        Shape::Unknown { candidates } => {
            let items: String = candidates
                .iter()
                .map(|c| format!("<li><code>{}</code></li>", encode_text(c)))
                .collect();
            format!(
                "{}<p>Pick one of these columns to tokenize:</p><ul class=\"candidates\">{}</ul>",
                warning_block("Unknown format. Choose a column to tokenize."),
                items
            )
        }
        known => format!("<p class=\"shape-banner\">Detected format: <strong>{}</strong></p>", known.label()),
    }
}

pub fn batch_page(
    total_rows: usize,
    shape: &Shape,
    tokenizer_label: &str,
    report: &BatchReport,
    detail: Option<&RowDetail>,
) -> String {
    let mut html = String::new();
    html.push_str(&success_block(&format!("Loaded {} rows.", total_rows)));
    html.push_str(&shape_banner(shape));
    html.push_str(&format!(
        "<p class=\"info\">Processed {} rows with {}.</p>",
        report.rows.len(),
        encode_text(tokenizer_label)
    ));

    html.push_str("<h2>Analysis Results</h2><div class=\"metrics\">");
    let totals = report.totals();
    html.push_str(&metric("Total Token Count", &report.total_tokens.to_string(), None));
    html.push_str(&metric(&format!("Total {}", report.unit.count_label()), &report.total_units.to_string(), None));
    let average = if totals.token_count > 0 { format!("{:.2}", totals.average_per_token()) } else { "0".to_string() };
    html.push_str(&metric(report.unit.average_label(), &average, None));
    html.push_str("</div>");

    html.push_str(&format!(
        "<table class=\"results\"><thead><tr><th>Index</th><th>Format</th><th>Text Preview</th>\
         <th>Token Count</th><th>{}</th></tr></thead><tbody>",
        report.unit.count_label()
    ));
    for row in &report.rows {
        html.push_str(&format!(
            "<tr data-row=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.index,
            row.index,
            row.shape,
            encode_text(&row.preview),
            row.token_count,
            row.unit_count
        ));
    }
    html.push_str("</tbody></table>");

    if let Some(detail) = detail {
        html.push_str(&row_detail(detail));
    }
    html
}

pub fn row_detail(detail: &RowDetail) -> String {
    let mut html = format!("<h2>Detailed Visualization: row {}</h2>", detail.index);
    let pretty = serde_json::to_string_pretty(&detail.record).unwrap_or_default();
    html.push_str(&format!("<details class=\"record-json\"><summary>Record</summary><pre>{}</pre></details>", encode_text(&pretty)));

    if detail.segments.is_empty() {
        html.push_str(&warning_block("Unknown format. Could not visualize tokens."));
        return html;
    }

    html.push_str(&format!("<h3>{} Format Detected</h3>", detail.shape.label()));
    for seg in &detail.segments {
        html.push_str(&format!("<div class=\"segment\"><h4>{}</h4>", encode_text(&seg.segment.label)));
        html.push_str(&metrics(&seg.metrics));
        html.push_str(&token_chips(&seg.result));
        html.push_str("</div>");
    }
    html
}

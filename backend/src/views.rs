use base64::{Engine as _, engine::general_purpose};
use shared::ClassLabel;
use std::fmt::Write;
use strum::IntoEnumIterator;

use crate::batch::FileOutcome;
use crate::inference::preprocess::mime_type;
use crate::upload::Upload;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const RESULTS_SLOT: &str = "{{results}}";
const LABELS_SLOT: &str = "{{labels}}";

/// Renders the upload form. With `results`, each upload is listed next to its
/// outcome; empty file inputs submitted by the browser are not shown.
pub fn render_index(results: Option<(&[Upload], &[FileOutcome])>) -> String {
    let results_html = match results {
        Some((uploads, outcomes)) => render_results(uploads, outcomes),
        None => String::new(),
    };
    fill_template(&results_html)
}

/// Renders the form with an error notice where the results would go.
pub fn render_error(message: &str) -> String {
    fill_template(&format!("    <p class=\"notice\">{}</p>", escape(message)))
}

/// Fills every slot in a single left-to-right pass; inserted text is never
/// scanned again.
fn fill_template(results_html: &str) -> String {
    let labels = render_labels();
    let mut out = String::with_capacity(INDEX_TEMPLATE.len() + results_html.len() + labels.len());
    let mut rest = INDEX_TEMPLATE;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (text, consumed) = if tail.starts_with(RESULTS_SLOT) {
            (results_html, RESULTS_SLOT.len())
        } else if tail.starts_with(LABELS_SLOT) {
            (labels.as_str(), LABELS_SLOT.len())
        } else {
            ("{{", 2)
        };
        out.push_str(text);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

fn render_results(uploads: &[Upload], outcomes: &[FileOutcome]) -> String {
    let mut html = String::from("    <section class=\"predictions\">\n");
    for (upload, outcome) in uploads.iter().zip(outcomes) {
        let name = escape(upload.display_name());
        match outcome {
            FileOutcome::Classified(prediction) => {
                let data = general_purpose::STANDARD.encode(&upload.bytes);
                let _ = write!(
                    html,
                    "      <figure class=\"prediction\">\n        \
                     <img src=\"data:{};base64,{}\" alt=\"{}\">\n        \
                     <figcaption><span class=\"label\">{}</span> {:.2}%</figcaption>\n      \
                     </figure>\n",
                    mime_type(&upload.bytes),
                    data,
                    name,
                    prediction.label,
                    prediction.probability
                );
            }
            FileOutcome::Rejected if upload.display_name().is_empty() => {}
            FileOutcome::Rejected => {
                let _ = writeln!(
                    html,
                    "      <p class=\"skipped\">{}: skipped, only PNG and JPEG files are accepted</p>",
                    name
                );
            }
            FileOutcome::Failed(e) => {
                let reason = if e.is_client_error() {
                    "not a readable image"
                } else {
                    "classification failed"
                };
                let _ = writeln!(html, "      <p class=\"skipped\">{}: {}</p>", name, reason);
            }
        }
    }
    html.push_str("    </section>");
    html
}

fn render_labels() -> String {
    ClassLabel::iter()
        .map(|label| format!("        <li>{}: {}</li>", label.index(), label))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

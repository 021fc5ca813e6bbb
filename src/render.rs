//! Render tree for a request result and its HTML form page.

use std::fmt::Write as _;

use serde::Serialize;

use crate::config::{DEFAULT_CLUSTERS, DEFAULT_SUBJECT, MAX_CLUSTERS, MIN_CLUSTERS};
use crate::error::Error;
use crate::mail::Message;

/// What the page shows below the form.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    /// Any failure, as one line.
    Error { message: String },
    /// The search matched nothing.
    NoResults { message: String },
    /// Too few emails to cluster: a warning and every email as-is.
    Flat {
        warning: String,
        messages: Vec<Message>,
    },
    Clusters { clusters: Vec<ClusterView> },
}

/// One cluster section.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub title: String,
    pub keywords: Vec<String>,
    pub messages: Vec<Message>,
}

impl View {
    /// Map an error to what the user sees.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::NoResults => View::NoResults {
                message: err.to_string(),
            },
            _ => View::Error {
                message: format!("❌ Error: {err}"),
            },
        }
    }
}

/// Values echoed back into the form. The password never is.
#[derive(Debug, Clone)]
pub struct FormValues {
    pub email: String,
    pub subject: String,
    pub clusters: usize,
}

impl Default for FormValues {
    fn default() -> Self {
        Self {
            email: String::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            clusters: DEFAULT_CLUSTERS,
        }
    }
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
form { display: grid; gap: .75rem; margin-bottom: 2rem; }
label { display: grid; gap: .25rem; }
.error { background: #fde8e8; color: #8a1c1c; padding: .75rem; border-radius: .25rem; }
.warning { background: #fff6db; color: #7a5b00; padding: .75rem; border-radius: .25rem; }
.spinner { display: none; }
form.busy + .spinner { display: block; }
.message { border-bottom: 1px solid #ddd; padding: .5rem 0; }
"#;

/// Full HTML page: the form, a progress line, and the result if any.
pub fn page(form: &FormValues, view: Option<&View>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Email Clustering Tool</title>");
    let _ = write!(html, "<style>{STYLE}</style></head><body>");
    html.push_str("<h1>📬 Email Clustering Tool</h1>");
    html.push_str("<p>Securely fetch and cluster Gmail messages based on subject!</p>");

    html.push_str(r#"<form method="post" action="/" onsubmit="this.classList.add('busy')">"#);
    let _ = write!(
        html,
        r#"<label>📧 Gmail address <input type="text" name="email" value="{}"></label>"#,
        escape(&form.email)
    );
    html.push_str(r#"<label>🔑 App Password <input type="password" name="password"></label>"#);
    let _ = write!(
        html,
        r#"<label>🔎 Subject filter <input type="text" name="subject" value="{}"></label>"#,
        escape(&form.subject)
    );
    let clusters = form.clusters.clamp(MIN_CLUSTERS, MAX_CLUSTERS);
    let _ = write!(
        html,
        r#"<label>📊 Number of clusters: <output id="k">{clusters}</output> <input type="range" name="clusters" min="{MIN_CLUSTERS}" max="{MAX_CLUSTERS}" value="{clusters}" oninput="document.getElementById('k').value=this.value"></label>"#
    );
    html.push_str(r#"<button type="submit">🚀 Fetch and Cluster Emails</button></form>"#);
    html.push_str(
        r#"<p class="spinner">⏳ Connecting to mail server and fetching emails...</p>"#,
    );

    if let Some(view) = view {
        render_view(&mut html, view);
    }

    html.push_str("</body></html>\n");
    html
}

fn render_view(html: &mut String, view: &View) {
    match view {
        View::Error { message } | View::NoResults { message } => {
            let _ = write!(html, r#"<p class="error">{}</p>"#, escape(message));
        }
        View::Flat { warning, messages } => {
            let _ = write!(html, r#"<p class="warning">{}</p><ul>"#, escape(warning));
            for m in messages {
                let _ = write!(
                    html,
                    "<li><strong>From:</strong> {}<br>📩 {}</li>",
                    escape(&m.sender),
                    escape(&m.body)
                );
            }
            html.push_str("</ul>");
        }
        View::Clusters { clusters } => {
            for cluster in clusters {
                let _ = write!(html, "<section><h2>📦 {}</h2>", escape(&cluster.title));
                let _ = write!(
                    html,
                    "<p><strong>🔑 Top keywords:</strong> {}</p>",
                    escape(&cluster.keywords.join(", "))
                );
                for m in &cluster.messages {
                    let _ = write!(
                        html,
                        r#"<div class="message"><strong>From:</strong> {}<p>📩 {}</p></div>"#,
                        escape(&m.sender),
                        escape(&m.body)
                    );
                }
                html.push_str("</section>");
            }
        }
    }
}

/// Escape text for HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

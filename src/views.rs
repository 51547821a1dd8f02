//! HTML views rendered with minijinja.
//!
//! Templates are embedded at compile time. Their `.html` names turn on
//! minijinja's auto-escaping, so untrusted filenames and descriptions are
//! escaped on output.

use crate::{models::document::Document, services::file_store::MAX_UPLOAD_BYTES};
use minijinja::{Environment, context};
use serde::Serialize;
use std::sync::OnceLock;

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn environment() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();
        for (name, source) in [
            ("index.html", include_str!("../templates/index.html")),
            ("error.html", include_str!("../templates/error.html")),
        ] {
            if let Err(err) = env.add_template(name, source) {
                tracing::error!("Failed to load template {}: {}", name, err);
            }
        }
        env
    })
}

/// What a listing card needs from a [`Document`].
#[derive(Serialize)]
struct DocumentCard<'a> {
    id: i64,
    original_name: &'a str,
    description: &'a str,
    /// Percent-encoded stored name, safe as a single path segment.
    file_segment: String,
}

impl<'a> From<&'a Document> for DocumentCard<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            id: doc.id,
            original_name: &doc.original_name,
            description: &doc.description,
            file_segment: urlencoding::encode(&doc.stored_name).into_owned(),
        }
    }
}

/// Upload form plus one card per document, in the order given.
pub fn render_index(documents: &[Document]) -> Result<String, minijinja::Error> {
    let cards: Vec<DocumentCard<'_>> = documents.iter().map(DocumentCard::from).collect();
    environment().get_template("index.html")?.render(context! {
        documents => cards,
        max_upload_mb => MAX_UPLOAD_BYTES / (1024 * 1024),
    })
}

/// Minimal error page carrying `message`.
pub fn render_error(status: u16, message: &str) -> Result<String, minijinja::Error> {
    environment()
        .get_template("error.html")?
        .render(context! { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document(id: i64, original_name: &str, stored_name: &str, description: &str) -> Document {
        Document {
            id,
            original_name: original_name.into(),
            stored_name: stored_name.into(),
            description: description.into(),
            size_bytes: 4,
            checksum: "00".into(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn empty_listing_shows_empty_state() {
        let html = render_index(&[]).unwrap();
        assert!(html.contains("no documents found"));
        assert!(html.contains(r#"action="/upload""#));
        assert!(html.contains(r#"enctype="multipart/form-data""#));
    }

    #[test]
    fn cards_link_download_and_delete() {
        let html = render_index(&[document(7, "edital.pdf", "edital-1-ab.pdf", "Concurso 2024")])
            .unwrap();

        assert!(!html.contains("no documents found"));
        assert!(html.contains("<h3>edital.pdf</h3>"));
        assert!(html.contains("Concurso 2024"));
        assert!(html.contains(r#"href="/uploads/edital-1-ab.pdf""#));
        assert!(html.contains(r#"action="/delete/7""#));
        assert!(html.contains("return confirm("));
    }

    #[test]
    fn untrusted_text_is_escaped() {
        let html = render_index(&[document(
            1,
            "<script>alert(1)</script>.pdf",
            "x-1-ab.pdf",
            "a & \"b\"",
        )])
        .unwrap();

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)"));
        assert!(html.contains("a &amp; &quot;b&quot;"));
    }

    #[test]
    fn stored_names_are_percent_encoded() {
        let html = render_index(&[document(1, "a b.pdf", "Saúde_1-1-ab.pdf", "d")]).unwrap();
        assert!(html.contains(r#"href="/uploads/Sa%C3%BAde_1-1-ab.pdf""#));
    }

    #[test]
    fn error_page_escapes_message() {
        let html = render_error(400, "only PDF files are allowed (received `<x>`)").unwrap();
        assert!(html.contains("Error 400"));
        assert!(html.contains("&lt;x&gt;"));
    }
}

use askama::Template;
use comrak::{Arena, format_html, options::Options, parse_document};

use super::{ExportError, markdown::render_markdown};
use crate::domain::summary::SpecSummary;

#[derive(Template)]
#[template(path = "export.html")]
struct ExportDocumentTemplate<'a> {
    title: &'a str,
    version: &'a str,
    generated_at: String,
    body: &'a str,
}

pub(super) fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    options.render.github_pre_lang = true;
    options
}

pub fn render_html(summary: &SpecSummary) -> Result<String, ExportError> {
    let markdown = render_markdown(summary);
    let options = markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, &markdown, &options);

    let mut html = String::new();
    format_html(root, &options, &mut html).map_err(|err| ExportError::Markdown {
        message: err.to_string(),
    })?;
    let body = ammonia::clean(&html);

    let generated_at = summary
        .generated_at
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();

    let template = ExportDocumentTemplate {
        title: &summary.spec_info.title,
        version: &summary.spec_info.version,
        generated_at,
        body: &body,
    };
    Ok(template.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::export::fixtures;

    #[test]
    fn renders_standalone_sanitized_document() {
        let html = render_html(&fixtures::summary()).expect("html");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Petstore 1.0.0 - API summary</title>"));
        assert!(html.contains("<h2>Overview</h2>"));
        assert!(html.contains("<strong>pets</strong>"));
        assert!(html.contains("<h3>GET /pets</h3>"));
        assert!(html.contains("2024-05-01T12:00:00Z"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn title_is_escaped() {
        let mut summary = fixtures::summary();
        summary.spec_info.title = "<b>Pets</b>".into();
        let html = render_html(&summary).expect("html");
        assert!(!html.contains("<title><b>"));
        assert!(html.contains("Pets"));
    }
}

use std::fmt::Write;

use crate::domain::summary::SpecSummary;

pub fn render_markdown(summary: &SpecSummary) -> String {
    let info = &summary.spec_info;
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", info.title);
    let _ = writeln!(out, "**Version:** {}\n", info.version);
    if let Some(description) = info.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            let _ = writeln!(out, "{description}\n");
        }
    }

    let _ = writeln!(out, "## Overview\n");
    let _ = writeln!(out, "{}\n", summary.overview.trim());

    let _ = writeln!(out, "## Endpoints\n");
    if summary.endpoints.is_empty() {
        let _ = writeln!(out, "_No endpoints documented._\n");
    }
    for endpoint in &summary.endpoints {
        let _ = writeln!(out, "### {} {}\n", endpoint.method, endpoint.path);
        if let Some(text) = endpoint.summary.as_deref() {
            let _ = writeln!(out, "_{}_\n", text.trim());
        }
        let _ = writeln!(out, "{}\n", endpoint.analysis.trim());
    }

    let _ = write!(
        out,
        "---\n\nGenerated with `{}`.\n",
        summary.model
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::export::fixtures;

    #[test]
    fn document_has_overview_and_endpoint_sections() {
        let md = render_markdown(&fixtures::summary());

        assert!(md.starts_with("# Petstore\n\n**Version:** 1.0.0\n\nManage pets.\n"));
        let overview = md.find("## Overview").expect("overview heading");
        let endpoints = md.find("## Endpoints").expect("endpoints heading");
        let get = md.find("### GET /pets").expect("endpoint heading");
        assert!(overview < endpoints && endpoints < get);
        assert!(md.contains("_List pets_"));
        assert!(md.ends_with("Generated with `gpt-4o-mini`.\n"));
    }

    #[test]
    fn empty_endpoint_list_is_noted() {
        let mut summary = fixtures::summary();
        summary.endpoints.clear();
        assert!(render_markdown(&summary).contains("_No endpoints documented._"));
    }
}

//! Prompt construction for the completion service.

use std::fmt::Write;

use crate::domain::openapi::{ParsedEndpoint, ParsedSpec};

pub const SYSTEM_PROMPT: &str = "You are an expert in API documentation and technical writing. \
Provide clear, concise, and technically accurate responses.";

const CLOSING_INSTRUCTION: &str = "Keep the description technical and focused on usage.";

pub fn create_overview_prompt(spec: &ParsedSpec) -> String {
    let endpoints = spec
        .endpoints
        .iter()
        .map(format_endpoint)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze this API specification and provide a comprehensive overview.\n\n\
         API: {title} (v{version})\n\
         Description: {description}\n\n\
         Endpoints:\n{endpoints}\n\n\
         Provide:\n\
         1. A high-level overview of the API's purpose and functionality\n\
         2. Key features and capabilities\n\
         3. Common use cases\n\
         4. Notable patterns or conventions\n\
         5. Potential integration considerations\n\n\
         {CLOSING_INSTRUCTION}",
        title = spec.title,
        version = spec.version,
        description = spec
            .description
            .as_deref()
            .unwrap_or("No description provided"),
    )
}

pub fn create_endpoint_prompt(endpoint: &ParsedEndpoint) -> String {
    format!(
        "Analyze this API endpoint and provide detailed documentation.\n\n\
         {endpoint}\n\n\
         Provide:\n\
         1. Purpose and functionality\n\
         2. Request/response patterns\n\
         3. Error handling\n\
         4. Security considerations\n\
         5. Integration examples\n\n\
         {CLOSING_INSTRUCTION}",
        endpoint = format_endpoint(endpoint),
    )
}

pub fn format_endpoint(endpoint: &ParsedEndpoint) -> String {
    let mut out = String::new();
    let _ = write!(out, "\n{} {}", endpoint.method, endpoint.path);
    let _ = write!(
        out,
        "\nSummary: {}",
        endpoint.summary.as_deref().unwrap_or("No summary provided")
    );

    if let Some(description) = endpoint.description.as_deref() {
        let _ = write!(out, "\nDescription: {description}");
    }

    if !endpoint.parameters.is_empty() {
        out.push_str("\n\nParameters:");
        for param in &endpoint.parameters {
            let required = if param.required { " (required)" } else { "" };
            let _ = write!(out, "\n- {} ({}){required}", param.name, param.location);
            if let Some(description) = param.description.as_deref() {
                let _ = write!(out, "\n  {description}");
            }
        }
    }

    if let Some(body) = endpoint.request_body.as_ref() {
        out.push_str("\n\nRequest Body:");
        let _ = write!(out, "\nContent Type: {}", body.content_type);
        if let Some(description) = body.description.as_deref() {
            let _ = write!(out, "\nDescription: {description}");
        }
    }

    if !endpoint.responses.is_empty() {
        out.push_str("\n\nResponses:");
        for response in &endpoint.responses {
            let _ = write!(
                out,
                "\n- {}: {}",
                response.status_code,
                response.description.as_deref().unwrap_or("No description")
            );
            if let Some(content_type) = response.content_type.as_deref() {
                let _ = write!(out, "\n  Content Type: {content_type}");
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::openapi::{ParsedParameter, ParsedRequestBody, ParsedResponse};

    fn endpoint() -> ParsedEndpoint {
        ParsedEndpoint {
            method: "POST".into(),
            path: "/pets".into(),
            operation_id: Some("createPet".into()),
            summary: None,
            description: Some("Creates a pet".into()),
            tags: vec![],
            deprecated: false,
            parameters: vec![ParsedParameter {
                name: "dry_run".into(),
                location: "query".into(),
                required: true,
                description: Some("Validate only".into()),
                schema: None,
            }],
            request_body: Some(ParsedRequestBody {
                required: true,
                content_type: "application/json".into(),
                description: None,
                schema: None,
            }),
            responses: vec![ParsedResponse {
                status_code: "201".into(),
                description: None,
                content_type: Some("application/json".into()),
                schema: None,
            }],
        }
    }

    #[test]
    fn endpoint_formatting_lists_every_section() {
        let formatted = format_endpoint(&endpoint());
        let expected = "\nPOST /pets\n\
                        Summary: No summary provided\n\
                        Description: Creates a pet\n\n\
                        Parameters:\n\
                        - dry_run (query) (required)\n  Validate only\n\n\
                        Request Body:\n\
                        Content Type: application/json\n\n\
                        Responses:\n\
                        - 201: No description\n  Content Type: application/json";
        assert_eq!(formatted, expected);
    }

    #[test]
    fn overview_prompt_names_the_api_and_aspects() {
        let spec = ParsedSpec {
            title: "Petstore".into(),
            version: "1.0.0".into(),
            description: None,
            servers: vec![],
            endpoints: vec![endpoint()],
            component_names: vec![],
        };

        let prompt = create_overview_prompt(&spec);
        assert!(prompt.contains("API: Petstore (v1.0.0)"));
        assert!(prompt.contains("Description: No description provided"));
        assert!(prompt.contains("POST /pets"));
        assert!(prompt.contains("5. Potential integration considerations"));
        assert!(prompt.ends_with(CLOSING_INSTRUCTION));
    }

    #[test]
    fn endpoint_prompt_requests_documentation_aspects() {
        let prompt = create_endpoint_prompt(&endpoint());
        assert!(prompt.starts_with("Analyze this API endpoint"));
        assert!(prompt.contains("4. Security considerations"));
    }
}

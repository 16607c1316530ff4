//! OpenAPI 3.x components and transitions.

use super::{method_transits, Component, ComponentAttrs, NamingRule, DEF_NAME};
use crate::error::NormalizeResult;
use crate::util::machine::{StateId, StateMachineBuilder};

const MODEL: usize = 0;
const PATH: usize = 1;
const SCHEMA: usize = 2;
const SCHEMA_DEF: usize = 3;
const RESPONSE: usize = 4;
const RESPONSE_DEF: usize = 5;
const PARAMETER: usize = 6;
const PARAMETER_DEF: usize = 7;
const EXAMPLE: usize = 8;
const EXAMPLE_DEF: usize = 9;
const REQUEST_BODY: usize = 10;
const REQUEST_BODY_DEF: usize = 11;
const HEADER: usize = 12;
const HEADER_DEF: usize = 13;
const SECURITY_SCHEME: usize = 14;
const SECURITY_SCHEME_DEF: usize = 15;
const LINK: usize = 16;
const LINK_DEF: usize = 17;
const CALLBACK: usize = 18;
const CALLBACK_DEF: usize = 19;
const OPERATION: usize = 20;
const MEDIA_TYPE: usize = 21;
const ENCODING: usize = 22;
const CALLBACK_PATH: usize = 23;

pub(super) const COMPONENTS: &[ComponentAttrs] = &[
    ComponentAttrs::plain("MODEL"),
    ComponentAttrs {
        name: "PATH",
        conforming: true,
        merge: true,
        defines: Some("PATH"),
        container: Some("/paths"),
        naming: NamingRule::PathKey,
    },
    ComponentAttrs::site(
        "SCHEMA",
        "/components/schemas",
        &["/components/schemas", "/definitions"],
    ),
    ComponentAttrs::definition("SCHEMA_DEF", "SCHEMA"),
    ComponentAttrs::site(
        "RESPONSE",
        "/components/responses",
        &["/components/responses", "/responses"],
    ),
    ComponentAttrs::definition("RESPONSE_DEF", "RESPONSE"),
    ComponentAttrs::site(
        "PARAMETER",
        "/components/parameters",
        &["/components/parameters", "/parameters"],
    ),
    ComponentAttrs::definition("PARAMETER_DEF", "PARAMETER"),
    ComponentAttrs::site("EXAMPLE", "/components/examples", &["/components/examples"]),
    ComponentAttrs::definition("EXAMPLE_DEF", "EXAMPLE"),
    ComponentAttrs::site(
        "REQUEST_BODY",
        "/components/requestBodies",
        &["/components/requestBodies"],
    ),
    ComponentAttrs::definition("REQUEST_BODY_DEF", "REQUEST_BODY"),
    ComponentAttrs::site("HEADER", "/components/headers", &["/components/headers"]),
    ComponentAttrs::definition("HEADER_DEF", "HEADER"),
    ComponentAttrs::site(
        "SECURITY_SCHEME",
        "/components/securitySchemes",
        &["/components/securitySchemes"],
    ),
    ComponentAttrs::definition("SECURITY_SCHEME_DEF", "SECURITY_SCHEME"),
    ComponentAttrs::site("LINK", "/components/links", &["/components/links"]),
    ComponentAttrs::definition("LINK_DEF", "LINK"),
    ComponentAttrs::site("CALLBACK", "/components/callbacks", &["/components/callbacks"]),
    ComponentAttrs::definition("CALLBACK_DEF", "CALLBACK"),
    ComponentAttrs::plain("OPERATION"),
    ComponentAttrs::plain("MEDIA_TYPE"),
    ComponentAttrs::plain("ENCODING"),
    // path items inside callbacks are inlined; they have no container of their own
    ComponentAttrs::plain("CALLBACK_PATH"),
];

/// Component containers under `/components` and their definition states.
const DEFINITIONS: &[(&str, usize)] = &[
    ("schemas", SCHEMA_DEF),
    ("responses", RESPONSE_DEF),
    ("parameters", PARAMETER_DEF),
    ("examples", EXAMPLE_DEF),
    ("requestBodies", REQUEST_BODY_DEF),
    ("headers", HEADER_DEF),
    ("securitySchemes", SECURITY_SCHEME_DEF),
    ("links", LINK_DEF),
    ("callbacks", CALLBACK_DEF),
];

pub(super) fn install(b: &mut StateMachineBuilder<Component>, s: &[StateId]) -> NormalizeResult<()> {
    b.transit(s[MODEL], &["paths", "re: /.*"], s[PATH])?;
    for (container, def) in DEFINITIONS {
        b.transit(s[MODEL], &["components", *container, DEF_NAME], s[*def])?;
    }

    // path items and operations
    method_transits(b, s[PATH], s[OPERATION])?;
    b.transit(s[PATH], &["trace"], s[OPERATION])?;
    b.transit(s[PATH], &["parameters", "#"], s[PARAMETER])?;
    b.transit(s[OPERATION], &["parameters", "#"], s[PARAMETER])?;
    b.transit(s[OPERATION], &["requestBody"], s[REQUEST_BODY])?;
    b.transit(s[OPERATION], &["responses", "*"], s[RESPONSE])?;
    b.transit(s[OPERATION], &["callbacks", "*"], s[CALLBACK])?;

    // schemas
    b.transit(s[SCHEMA], &["items"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["not"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["additionalProperties"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["properties", "*"], s[SCHEMA])?;
    for combinator in ["allOf", "oneOf", "anyOf"] {
        b.transit(s[SCHEMA], &[combinator, "#"], s[SCHEMA])?;
    }

    // parameters, headers and bodies
    for holder in [PARAMETER, HEADER] {
        b.transit(s[holder], &["schema"], s[SCHEMA])?;
        b.transit(s[holder], &["content", "*"], s[MEDIA_TYPE])?;
        b.transit(s[holder], &["examples", "*"], s[EXAMPLE])?;
    }
    b.transit(s[REQUEST_BODY], &["content", "*"], s[MEDIA_TYPE])?;
    b.transit(s[RESPONSE], &["content", "*"], s[MEDIA_TYPE])?;
    b.transit(s[RESPONSE], &["headers", "*"], s[HEADER])?;
    b.transit(s[RESPONSE], &["links", "*"], s[LINK])?;
    b.transit(s[MEDIA_TYPE], &["schema"], s[SCHEMA])?;
    b.transit(s[MEDIA_TYPE], &["examples", "*"], s[EXAMPLE])?;
    b.transit(s[MEDIA_TYPE], &["encoding", "*"], s[ENCODING])?;
    b.transit(s[ENCODING], &["headers", "*"], s[HEADER])?;

    // callbacks hold path items keyed by runtime expressions
    b.transit(s[CALLBACK], &["*"], s[CALLBACK_PATH])?;
    b.copy_out_edges(s[PATH], s[CALLBACK_PATH])?;

    for (site, def) in [
        (SCHEMA, SCHEMA_DEF),
        (RESPONSE, RESPONSE_DEF),
        (PARAMETER, PARAMETER_DEF),
        (EXAMPLE, EXAMPLE_DEF),
        (REQUEST_BODY, REQUEST_BODY_DEF),
        (HEADER, HEADER_DEF),
        (SECURITY_SCHEME, SECURITY_SCHEME_DEF),
        (LINK, LINK_DEF),
        (CALLBACK, CALLBACK_DEF),
    ] {
        b.copy_out_edges(s[site], s[def])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::util::machine::Site;

    fn site_after(path: &[&str]) -> Option<&'static str> {
        let dm = Dialect::OpenApi3.machine().unwrap();
        let mut t = dm.machine().tracker(dm.model());
        for seg in path {
            // `#n` stands for array index n
            match seg.strip_prefix('#').and_then(|idx| idx.parse().ok()) {
                Some(idx) => t.move_index(idx),
                None => t.move_key(seg),
            };
        }
        match t.site() {
            Site::Named(c) => Some(c.name()),
            _ => None,
        }
    }

    #[test]
    fn test_component_definitions() {
        assert_eq!(site_after(&["components", "schemas", "Pet"]), Some("SCHEMA_DEF"));
        assert_eq!(
            site_after(&["components", "requestBodies", "NewPet"]),
            Some("REQUEST_BODY_DEF")
        );
        assert_eq!(site_after(&["components", "schemas", "x-ext"]), None);
    }

    #[test]
    fn test_media_type_schema_chain() {
        assert_eq!(
            site_after(&[
                "paths", "/pets", "post", "requestBody", "content", "application/json", "schema",
                "properties", "tags", "items"
            ]),
            Some("SCHEMA")
        );
        assert_eq!(
            site_after(&["paths", "/pets", "get", "responses", "200", "headers", "X-Rate"]),
            Some("HEADER")
        );
    }

    #[test]
    fn test_definition_sites_share_outgoing_edges() {
        assert_eq!(
            site_after(&["components", "schemas", "Pet", "allOf", "#0"]),
            Some("SCHEMA")
        );
        assert_eq!(
            site_after(&["components", "responses", "NotFound", "content", "text/plain"]),
            Some("MEDIA_TYPE")
        );
    }

    #[test]
    fn test_callback_path_items() {
        assert_eq!(
            site_after(&["paths", "/hooks", "post", "callbacks", "onEvent", "{$request.body#/url}"]),
            Some("CALLBACK_PATH")
        );
        assert_eq!(
            site_after(&[
                "paths", "/hooks", "post", "callbacks", "onEvent", "{$request.body#/url}", "post"
            ]),
            Some("OPERATION")
        );
        let component = Dialect::OpenApi3.component("CALLBACK_PATH").unwrap();
        assert!(!component.is_conforming_site());
    }
}

//! Swagger 2.0 components and transitions.

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
const OPERATION: usize = 8;

const SCHEMA_NAMES: &[&str] = &["/definitions", "/components/schemas"];
const RESPONSE_NAMES: &[&str] = &["/responses", "/components/responses"];
const PARAMETER_NAMES: &[&str] = &["/parameters", "/components/parameters"];

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
    ComponentAttrs::site("SCHEMA", "/definitions", SCHEMA_NAMES),
    ComponentAttrs::definition("SCHEMA_DEF", "SCHEMA"),
    ComponentAttrs::site("RESPONSE", "/responses", RESPONSE_NAMES),
    ComponentAttrs::definition("RESPONSE_DEF", "RESPONSE"),
    ComponentAttrs::site("PARAMETER", "/parameters", PARAMETER_NAMES),
    ComponentAttrs::definition("PARAMETER_DEF", "PARAMETER"),
    ComponentAttrs::plain("OPERATION"),
];

pub(super) fn install(b: &mut StateMachineBuilder<Component>, s: &[StateId]) -> NormalizeResult<()> {
    b.transit(s[MODEL], &["paths", "re: /.*"], s[PATH])?;
    b.transit(s[MODEL], &["definitions", DEF_NAME], s[SCHEMA_DEF])?;
    b.transit(s[MODEL], &["responses", DEF_NAME], s[RESPONSE_DEF])?;
    b.transit(s[MODEL], &["parameters", DEF_NAME], s[PARAMETER_DEF])?;

    // only meaningful for `in: body`, harmless otherwise
    b.transit(s[PARAMETER], &["schema"], s[SCHEMA])?;
    b.transit(s[RESPONSE], &["schema"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["items"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["allOf", "#"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["properties", "*"], s[SCHEMA])?;
    b.transit(s[SCHEMA], &["additionalProperties"], s[SCHEMA])?;

    method_transits(b, s[PATH], s[OPERATION])?;
    b.transit(s[OPERATION], &["responses", "*"], s[RESPONSE])?;
    b.transit(s[PATH], &["parameters", "#"], s[PARAMETER])?;
    b.transit(s[OPERATION], &["parameters", "#"], s[PARAMETER])?;

    b.copy_out_edges(s[SCHEMA], s[SCHEMA_DEF])?;
    b.copy_out_edges(s[RESPONSE], s[RESPONSE_DEF])?;
    b.copy_out_edges(s[PARAMETER], s[PARAMETER_DEF])?;
    Ok(())
}

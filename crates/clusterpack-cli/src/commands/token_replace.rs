//! Token replace command - literal substitutions in opted-in resources

use std::path::Path;

use clusterpack_core::replace_tokens;

use crate::config::TokenReplaceConfig;
use crate::error::Result;
use crate::{io, logging};

pub fn run(input: Option<&Path>) -> Result<()> {
    logging::init(logging::DEFAULT_LEVEL)?;

    let mut list = io::read_resource_list(input)?;
    let config = TokenReplaceConfig::from_function_config(list.function_config.as_ref())?;

    let mut replaced = 0;
    for resource in &mut list.items {
        if replace_tokens(resource, &config.replacements) {
            replaced += 1;
        }
    }
    tracing::debug!(
        resources = replaced,
        replacements = config.replacements.len(),
        "replaced tokens"
    );

    io::write_resource_list(&list)
}

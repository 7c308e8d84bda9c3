//! Render template command - render annotated resources with Kptfile setters

use std::path::Path;

use clusterpack_core::Kptfile;
use clusterpack_engine::{Renderer, TemplateContext};

use crate::config::RenderTemplateConfig;
use crate::error::{CliError, Result};
use crate::{io, logging};

pub fn run(input: Option<&Path>) -> Result<()> {
    logging::init(logging::DEFAULT_LEVEL)?;

    let mut list = io::read_resource_list(input)?;
    let config = RenderTemplateConfig::from_function_config(list.function_config.as_ref())?;

    // Later Kptfiles override setters of the same name
    let mut context = TemplateContext::new();
    for path in &config.kptfiles {
        let kptfile = Kptfile::from_file(path).map_err(CliError::package)?;
        context.extend(TemplateContext::from_kptfile(&kptfile).map_err(CliError::template)?);
    }
    tracing::debug!(setters = context.len(), "loaded template context");

    Renderer::new(context)
        .render_all(&mut list.items)
        .map_err(CliError::template)?;

    io::write_resource_list(&list)
}

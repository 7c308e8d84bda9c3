//! ResourceList input and output

use std::io::{Read, Write};
use std::path::Path;

use clusterpack_core::ResourceList;

use crate::error::{CliError, Result};

/// Read a ResourceList from `path`, or from stdin when absent
pub fn read_resource_list(path: Option<&Path>) -> Result<ResourceList> {
    let input = match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("{}: {}", path.display(), e),
        })?,
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
    };

    ResourceList::parse(&input).map_err(|e| {
        CliError::input_with_help(
            e.to_string(),
            "functions read a config.kubernetes.io/v1alpha1 ResourceList from stdin or a file",
        )
    })
}

/// Write a ResourceList to stdout
pub fn write_resource_list(list: &ResourceList) -> Result<()> {
    let output = list
        .to_yaml_string()
        .map_err(|e| CliError::internal(format!("could not serialize output: {}", e)))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

//! Hash dependency command - stamp digests of referenced resources

use std::path::Path;

use clusterpack_core::propagate_hashes;

use crate::error::{CliError, Result};
use crate::{io, logging};

pub fn run(input: Option<&Path>) -> Result<()> {
    logging::init(logging::DEFAULT_LEVEL)?;

    let mut list = io::read_resource_list(input)?;
    propagate_hashes(&mut list.items).map_err(CliError::dependency)?;

    io::write_resource_list(&list)
}

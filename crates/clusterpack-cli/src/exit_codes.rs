//! Exit codes for failed function runs
//!
//! Usage errors are reported by clap with its own code (2).

/// General error
pub const ERROR: u8 = 1;

/// Invalid ResourceList, function config or descriptor
pub const INPUT_ERROR: u8 = 3;

/// Template rendering failed
pub const TEMPLATE_ERROR: u8 = 4;

/// Package manifest, setter override or relabeling failed
pub const PACKAGE_ERROR: u8 = 5;

/// File or stream could not be read or written
pub const IO_ERROR: u8 = 6;

/// Package source could not be fetched or authenticated
pub const SOURCE_ERROR: u8 = 7;

/// Hash dependency could not be resolved
pub const DEPENDENCY_ERROR: u8 = 8;

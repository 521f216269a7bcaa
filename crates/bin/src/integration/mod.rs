//! Glue between the command line and the library: where the source and
//! panel databases live, and how they are opened.

pub(crate) mod store_paths;

//! Reading and writing annotated-matrix files.

mod container;

pub use container::{
    read_container, read_manifest, write_container, Manifest, CONTAINER_EXTENSION,
    CONTAINER_MIMETYPE, FORMAT_VERSION,
};

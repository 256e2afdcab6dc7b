//! Single-file annotated-matrix container.
//!
//! A container is a ZIP archive with these entries:
//!
//! ```text
//! mimetype        (stored, first entry)
//! manifest.json   (deflate) format version, dimensions, obs column schema
//! obs.tsv         (deflate) observation table, first column cell_id
//! features.tsv    (deflate) one feature ID per line
//! matrix.mtx      (deflate) MatrixMarket coordinates, cells × features
//! ```

use crate::data::{AnnotatedMatrix, ColumnSchema, ExpressionMatrix, ObsTable};
use crate::error::{PerturbError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// MIME type stored in the `mimetype` entry.
pub const CONTAINER_MIMETYPE: &str = "application/vnd.perturb-filter.amz";

/// Conventional file extension for containers.
pub const CONTAINER_EXTENSION: &str = "amz";

/// Current container format version.
pub const FORMAT_VERSION: &str = "1.0";

const MIMETYPE_ENTRY: &str = "mimetype";
const MANIFEST_ENTRY: &str = "manifest.json";
const OBS_ENTRY: &str = "obs.tsv";
const FEATURES_ENTRY: &str = "features.tsv";
const MATRIX_ENTRY: &str = "matrix.mtx";

/// Container manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: String,
    pub n_cells: usize,
    pub n_features: usize,
    /// Name and stored type of each obs column, in order.
    pub obs_columns: Vec<ColumnSchema>,
    pub created: DateTime<Utc>,
}

impl Manifest {
    fn describe(adata: &AnnotatedMatrix) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            n_cells: adata.n_cells(),
            n_features: adata.n_features(),
            obs_columns: adata.obs().schema(),
            created: Utc::now(),
        }
    }
}

/// Read an annotated matrix from a container file.
///
/// Fails with [`PerturbError::InputNotFound`] before touching anything else
/// when the path does not exist.
pub fn read_container<P: AsRef<Path>>(path: P) -> Result<AnnotatedMatrix> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PerturbError::InputNotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let mimetype = read_entry(&mut archive, MIMETYPE_ENTRY)?;
    if mimetype != CONTAINER_MIMETYPE.as_bytes() {
        return Err(PerturbError::InvalidFormat(format!(
            "unexpected mimetype '{}'",
            String::from_utf8_lossy(&mimetype)
        )));
    }

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)?;
    debug!(
        "Container format {} with {} cells x {} features",
        manifest.format_version, manifest.n_cells, manifest.n_features
    );

    let obs = ObsTable::from_reader_with_schema(
        Cursor::new(read_entry(&mut archive, OBS_ENTRY)?),
        &manifest.obs_columns,
    )?;
    check_dimension(manifest.n_cells, obs.n_cells())?;

    let features_raw = String::from_utf8(read_entry(&mut archive, FEATURES_ENTRY)?)
        .map_err(|e| PerturbError::InvalidFormat(format!("{} is not UTF-8: {}", FEATURES_ENTRY, e)))?;
    let feature_ids: Vec<String> = features_raw.lines().map(String::from).collect();
    check_dimension(manifest.n_features, feature_ids.len())?;

    let matrix = ExpressionMatrix::read_matrix_market(
        Cursor::new(read_entry(&mut archive, MATRIX_ENTRY)?),
        obs.cell_ids().to_vec(),
        feature_ids,
    )?;

    AnnotatedMatrix::new(obs, matrix)
}

/// Write an annotated matrix to a container file, replacing any existing file.
///
/// All entries except `mimetype` are deflate-compressed.
pub fn write_container<P: AsRef<Path>>(adata: &AnnotatedMatrix, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut zip_writer = ZipWriter::new(BufWriter::new(file));

    // mimetype goes first and uncompressed so it can be sniffed
    zip_writer.start_file(MIMETYPE_ENTRY, entry_options(CompressionMethod::Stored))?;
    zip_writer.write_all(CONTAINER_MIMETYPE.as_bytes())?;

    zip_writer.start_file(MANIFEST_ENTRY, entry_options(CompressionMethod::Deflated))?;
    let manifest = Manifest::describe(adata);
    zip_writer.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    zip_writer.start_file(OBS_ENTRY, entry_options(CompressionMethod::Deflated))?;
    adata.obs().to_writer(&mut zip_writer)?;

    zip_writer.start_file(FEATURES_ENTRY, entry_options(CompressionMethod::Deflated))?;
    for feature_id in adata.matrix().feature_ids() {
        writeln!(zip_writer, "{}", feature_id)?;
    }

    zip_writer.start_file(MATRIX_ENTRY, entry_options(CompressionMethod::Deflated))?;
    adata.matrix().write_matrix_market(&mut zip_writer)?;

    let inner = zip_writer.finish()?;
    inner.into_inner().map_err(|e| {
        PerturbError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to flush container: {}", e.error()),
        ))
    })?;

    debug!("Wrote container {:?}", path);
    Ok(())
}

/// Read the manifest of a container without loading its data.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PerturbError::InputNotFound(path.to_path_buf()));
    }
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    Ok(serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)?)
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PerturbError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .unix_permissions(0o644)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| PerturbError::InvalidFormat(format!("container missing {}", name)))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

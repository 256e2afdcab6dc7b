//! Data structures for annotated single-cell matrices.

mod annotated;
mod expression_matrix;
mod obs_table;

pub use annotated::AnnotatedMatrix;
pub use expression_matrix::ExpressionMatrix;
pub use obs_table::{ColumnSchema, ColumnType, ObsTable, ObsValue};

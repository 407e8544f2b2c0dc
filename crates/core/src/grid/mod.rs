//! Grid data: scalar fields, snapshots and obstacle markers

mod field;
mod obstacle;
mod snapshot;

// Re-export main types
pub use field::ScalarField;
pub use obstacle::{BorderType, BoundaryType, ObstacleCell, ObstacleGrid};
pub use snapshot::{FieldKind, FieldRange, GridSnapshot};

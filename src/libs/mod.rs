pub mod align;
pub mod clust;
pub mod config;
pub mod error;
pub mod family;
pub mod io;
pub mod item;
pub mod matrix;
pub mod pvalue;

pub use error::{FamilyError, Result};
pub use item::Item;
pub use matrix::{DistanceMatrix, IndexRemap};

//! Data model: measurements, error sources, correlation declarations and
//! group assignment.
//!
//! Everything here is built once from parsed input and is immutable
//! afterwards. Correlation codes are validated and turned into
//! [`Correlation`] values at build time.

mod data;
mod declaration;
mod group;
mod input;
mod source;

pub use data::{DataModel, DataModelBuilder, Globals, Measurement, DEFAULT_GROUP};
pub use declaration::{BaseCode, CellCorrelation, ConstraintForm, Correlation, CorrelationCode, Units};
pub use group::GroupMatrix;
pub use input::{RawInput, RawSource};
pub use source::{ErrorSource, SourceKey};

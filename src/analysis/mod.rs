//! Analysis of a finished combination.
//!
//! 1. **Error decomposition** ([`ErrorBreakdown`]): each source's contribution to the
//!    combined uncertainty, the systematic sum and inter-group correlations
//! 2. **Information analysis** ([`InformationAnalysis`]): pairwise information
//!    contributions and precision shares, for single averages

mod errors;
mod information;

pub use errors::ErrorBreakdown;
pub use information::{InformationAnalysis, PrecisionShares};

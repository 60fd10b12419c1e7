//! JSON serialization for combination results.

use crate::result::Summary;

/// Serialize a Summary to a compact JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails (should not happen for Summary).
pub fn to_json(summary: &Summary) -> Result<String, serde_json::Error> {
    serde_json::to_string(summary)
}

/// Serialize a Summary to a pretty-printed JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails (should not happen for Summary).
pub fn to_json_pretty(summary: &Summary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

/// Parse a Summary back from JSON.
pub fn from_json(json: &str) -> Result<Summary, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_summary() -> Summary {
        Summary {
            measurements: vec!["A".to_string(), "B".to_string()],
            groups: vec!["Average".to_string()],
            averages: vec![10.6],
            total_errors: vec![0.5],
            syst_errors: vec![0.25],
            source_errors: BTreeMap::from([("00stat".to_string(), vec![0.4])]),
            correlations: vec![vec![1.0]],
            weights: vec![vec![0.8, 0.2]],
            chisq: 1.8,
            ndof: 1,
            chisq_probability: Some(0.18),
            pulls: vec![-0.6, 1.2],
            information: None,
            precision_shares: vec![vec![0.8, 0.2]],
            precision_remainder: vec![0.0],
            log_transform: false,
        }
    }

    #[test]
    fn test_to_json() {
        let json = to_json(&make_summary()).unwrap();
        assert!(json.contains("\"averages\":[10.6]"));
        assert!(json.contains("\"ndof\":1"));
        assert!(json.contains("\"information\":null"));
    }

    #[test]
    fn test_to_json_pretty() {
        let json = to_json_pretty(&make_summary()).unwrap();
        assert!(json.contains('\n')); // Pretty print has newlines
        assert!(json.contains("chisq_probability"));
        assert_eq!(from_json(&json).unwrap(), make_summary());
    }
}

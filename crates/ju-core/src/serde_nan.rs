//! Serialize `Vec<f64>` with non-finite values as JSON `null`.
//!
//! Invalid-bin markers (NaN) must survive a round trip through a store file,
//! and JSON has no NaN literal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    let opt: Vec<Option<f64>> =
        values.iter().map(|&v| if v.is_finite() { Some(v) } else { None }).collect();
    opt.serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    let opt: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(opt.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

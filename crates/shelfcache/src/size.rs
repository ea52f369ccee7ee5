//! Value size estimation
//!
//! Sizes are estimates used for memory bookkeeping, not exact heap usage.
//! Estimation never fails: anything that cannot be measured is charged
//! [`FALLBACK_SIZE_BYTES`].

use serde::Serialize;
use serde_json::Value;

/// Size charged for values that cannot be serialized
pub const FALLBACK_SIZE_BYTES: usize = 1024;

/// Types whose in-cache footprint can be estimated
pub trait EstimateSize {
    /// Estimated size in bytes
    fn estimate_size(&self) -> usize;
}

impl EstimateSize for str {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for String {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for [u8] {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for Vec<u8> {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for Value {
    fn estimate_size(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            // Arrays and objects are charged their canonical JSON text,
            // scalars their serialized form.
            other => estimate_serialized(other),
        }
    }
}

macro_rules! estimate_by_serializing {
    ($($ty:ty),* $(,)?) => {
        $(
            impl EstimateSize for $ty {
                fn estimate_size(&self) -> usize {
                    estimate_serialized(self)
                }
            }
        )*
    };
}

estimate_by_serializing!(bool, i32, i64, u32, u64, f32, f64);

/// Estimate the size of any serializable value by its JSON encoding
///
/// Falls back to [`FALLBACK_SIZE_BYTES`] when serialization fails.
pub fn estimate_serialized<T: Serialize + ?Sized>(value: &T) -> usize {
    match serde_json::to_vec(value) {
        Ok(encoded) => encoded.len(),
        Err(err) => {
            tracing::debug!(error = %err, "size estimation failed, using fallback size");
            FALLBACK_SIZE_BYTES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_strings_and_bytes_use_length() {
        assert_eq!("hello".estimate_size(), 5);
        assert_eq!(String::from("héllo").estimate_size(), 6);
        assert_eq!(vec![0u8; 42].estimate_size(), 42);
        assert_eq!(json!("abc").estimate_size(), 3);
    }

    #[test]
    fn test_collections_use_textual_form() {
        let value = json!([1, 2, 3]);
        assert_eq!(value.estimate_size(), "[1,2,3]".len());

        let value = json!({"a": 1});
        assert_eq!(value.estimate_size(), r#"{"a":1}"#.len());
    }

    #[test]
    fn test_scalars_use_serialized_form() {
        assert_eq!(42u64.estimate_size(), 2);
        assert_eq!(json!(42).estimate_size(), 2);
        assert_eq!(true.estimate_size(), 4);
    }

    #[test]
    fn test_unserializable_falls_back() {
        // JSON object keys must be strings
        let mut map = HashMap::new();
        map.insert((1u32, 2u32), 3u32);
        assert_eq!(estimate_serialized(&map), FALLBACK_SIZE_BYTES);
    }
}

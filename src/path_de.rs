use serde::de::DeserializeOwned;

/// Deserialize with JSON-path context in error messages.
///
/// Returns `(json_path, message)` on failure so callers can build a
/// [`crate::error::ConvertError::Parse`] with the file path attached.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, (String, String)> {
    let de = &mut serde_json::Deserializer::from_str(src);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => {
            let path = err.path().to_string();
            Err((path, err.into_inner().to_string()))
        }
    }
}

use serde::Deserialize;

/// One row of `loadData?method=getFallbackClass`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackClassRow {
    #[serde(default)]
    pub section_id: Option<serde_json::Value>,
}

impl FallbackClassRow {
    /// The section id as a string, or `None` when it is missing, null or empty.
    pub fn id(&self) -> Option<String> {
        match self.section_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Body of an `xkOper` call on HTTP 200.
#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

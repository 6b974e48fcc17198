//! Classification service port

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::Classification;

/// Suggests a category, budget rule and icon for transaction descriptions
///
/// Implementations must accept an empty slice (returning an empty map) and
/// may omit descriptions they could not classify.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifier name for logs (e.g., "http", "static")
    fn name(&self) -> &str;

    async fn classify(&self, descriptions: &[String]) -> Result<HashMap<String, Classification>>;
}

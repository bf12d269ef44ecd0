use crate::core::articles::Article;
use crate::core::cleanup::MirrorSync;
use async_trait::async_trait;

/// For deployments without mirrored copies.
pub struct NoopMirrorSync;

#[async_trait]
impl MirrorSync for NoopMirrorSync {
    async fn remove_mirrors(
        &self,
        article: &Article,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(article_id = article.id, "No mirrors configured");
        Ok(0)
    }
}

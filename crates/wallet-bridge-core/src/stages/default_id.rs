use async_trait::async_trait;

use crate::context::RequestContext;
use crate::domain::{JsonRpcRequest, DEFAULT_REQUEST_ID};
use crate::pipeline::{Next, Stage, StageResult};

/// Gives requests that arrived without an id the default one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultIdStage;

#[async_trait]
impl Stage for DefaultIdStage {
    async fn handle(
        &self,
        mut request: JsonRpcRequest,
        _ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        if request.id.is_null() {
            request.id = DEFAULT_REQUEST_ID.into();
        }
        next.run(request).await
    }
}

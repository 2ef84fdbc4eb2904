//! Chain-of-responsibility over JSON-RPC requests.
//!
//! A [`Stage`] either answers a request (returning from `handle` is `end`)
//! or hands it, possibly rewritten, to the rest of the chain with
//! [`Next::run`]. The chain always ends in a [`TerminalStage`], which has
//! no `next` and therefore must answer.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::{RequestContext, SdkContext};
use crate::domain::{JsonRpcRequest, JsonRpcResponse};
use crate::error::RpcError;

pub type StageResult = Result<Value, RpcError>;

/// Stable identifiers of the built-in stage positions, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageSlot {
    Fixture,
    Cache,
    Subscriptions,
    Filters,
    Nonce,
    DefaultId,
    Wallet,
}

impl StageSlot {
    pub const ORDER: [StageSlot; 7] = [
        Self::Fixture,
        Self::Cache,
        Self::Subscriptions,
        Self::Filters,
        Self::Nonce,
        Self::DefaultId,
        Self::Wallet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Fixture => "fixture",
            Self::Cache => "cache",
            Self::Subscriptions => "subscriptions",
            Self::Filters => "filters",
            Self::Nonce => "nonce",
            Self::DefaultId => "default_id",
            Self::Wallet => "wallet",
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult;
}

#[async_trait]
pub trait TerminalStage: Send + Sync {
    async fn handle(&self, request: JsonRpcRequest, ctx: &RequestContext) -> StageResult;
}

type StageEntry = (StageSlot, Arc<dyn Stage>);

/// The remainder of the chain after the current stage.
///
/// `Next` is `Copy`: a stage may run more than one request through the rest
/// of the chain. Requests a stage issues on the caller's behalf, such as
/// the lookups around a transaction send, go through [`Next::run_from_head`]
/// so that the earlier stages see them too.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [StageEntry],
    chain: &'a [StageEntry],
    terminal: &'a dyn TerminalStage,
    ctx: &'a RequestContext,
    routed_id: &'a Mutex<Value>,
}

impl<'a> Next<'a> {
    pub fn run(self, request: JsonRpcRequest) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            if let Ok(mut routed) = self.routed_id.lock() {
                *routed = request.id.clone();
            }
            match self.stages.split_first() {
                Some(((slot, stage), rest)) => {
                    let next = Next {
                        stages: rest,
                        ..self
                    };
                    stage.handle(request, self.ctx, next).await.map_err(|err| {
                        tracing::debug!(stage = slot.name(), error = %err, "stage failed");
                        err
                    })
                }
                None => {
                    tracing::debug!(method = %request.method, "reached relay");
                    self.terminal.handle(request, self.ctx).await
                }
            }
        })
    }

    /// Runs `request` through the whole chain, starting again at the first
    /// stage.
    pub fn run_from_head(self, request: JsonRpcRequest) -> BoxFuture<'a, StageResult> {
        Next {
            stages: self.chain,
            ..self
        }
        .run(request)
    }
}

pub struct Pipeline {
    context: Arc<SdkContext>,
    stages: RwLock<Vec<StageEntry>>,
    terminal: Arc<dyn TerminalStage>,
}

impl Pipeline {
    pub fn builder(context: Arc<SdkContext>) -> PipelineBuilder {
        PipelineBuilder {
            context,
            stages: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<SdkContext> {
        &self.context
    }

    /// Runs `request` through every stage. The response carries the id the
    /// request had when it was answered.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let ctx = self.context.request_context();
        let stages = self.stage_snapshot();
        let routed_id = Mutex::new(request.id.clone());
        let jsonrpc = request.jsonrpc.clone();
        let method = request.method.clone();

        let next = Next {
            stages: &stages,
            chain: &stages,
            terminal: self.terminal.as_ref(),
            ctx: &ctx,
            routed_id: &routed_id,
        };
        let outcome = next.run(request).await;
        if let Err(err) = &outcome {
            tracing::debug!(method = %method, error = %err, "request failed");
        }

        let id = match routed_id.into_inner() {
            Ok(id) => id,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut response =
            JsonRpcResponse::from_outcome(&JsonRpcRequest::new(id, method, Vec::new()), outcome);
        response.jsonrpc = jsonrpc;
        response
    }

    /// Swaps the stage registered under `slot`. Returns `false` if the slot
    /// is not part of this pipeline.
    pub fn replace(&self, slot: StageSlot, stage: Arc<dyn Stage>) -> bool {
        let mut stages = match self.stages.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match stages.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => {
                entry.1 = stage;
                true
            }
            None => false,
        }
    }

    pub fn slots(&self) -> Vec<StageSlot> {
        self.stage_snapshot().into_iter().map(|(slot, _)| slot).collect()
    }

    fn stage_snapshot(&self) -> Vec<StageEntry> {
        match self.stages.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub struct PipelineBuilder {
    context: Arc<SdkContext>,
    stages: Vec<StageEntry>,
}

impl PipelineBuilder {
    /// Registers `stage` under `slot`, replacing an earlier registration.
    pub fn stage(mut self, slot: StageSlot, stage: Arc<dyn Stage>) -> Self {
        self.stages.retain(|(s, _)| *s != slot);
        self.stages.push((slot, stage));
        self
    }

    /// Stages run in [`StageSlot::ORDER`], whatever order they were added in.
    pub fn terminal(mut self, terminal: Arc<dyn TerminalStage>) -> Pipeline {
        self.stages.sort_by_key(|(slot, _)| {
            StageSlot::ORDER
                .iter()
                .position(|s| s == slot)
                .unwrap_or(usize::MAX)
        });
        Pipeline {
            context: self.context,
            stages: RwLock::new(self.stages),
            terminal,
        }
    }
}

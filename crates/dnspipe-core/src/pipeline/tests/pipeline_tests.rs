use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::handler::{
    Executable, HandlerError, PipeContext, PipedExecutable, Plugin, QueryContext,
    SharedPluginRegistry,
};
use crate::pipeline;

struct ExecutionTracker {
    executed: Mutex<Vec<String>>,
}

impl ExecutionTracker {
    fn new() -> Arc<Self> {
        Arc::new(Self { executed: Mutex::new(Vec::new()) })
    }

    async fn record(&self, entry: &str) {
        self.executed.lock().await.push(entry.to_string());
    }

    async fn order(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }
}

struct PlainExec {
    tag: String,
    tracker: Arc<ExecutionTracker>,
    fail: bool,
}

impl PlainExec {
    fn new(tag: &str, tracker: Arc<ExecutionTracker>) -> Arc<Self> {
        Arc::new(Self { tag: tag.to_string(), tracker, fail: false })
    }

    fn failing(tag: &str, tracker: Arc<ExecutionTracker>) -> Arc<Self> {
        Arc::new(Self { tag: tag.to_string(), tracker, fail: true })
    }
}

impl Plugin for PlainExec {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Executable for PlainExec {
    async fn execute(
        &self,
        _token: &CancellationToken,
        _qctx: &mut QueryContext,
    ) -> Result<(), HandlerError> {
        self.tracker.record(&self.tag).await;
        if self.fail {
            return Err(HandlerError::Other("synthetic failure".to_string()));
        }
        Ok(())
    }
}

/// Middleware-style mock: records around the rest of the pipe.
struct WrapExec {
    tag: String,
    tracker: Arc<ExecutionTracker>,
}

impl WrapExec {
    fn new(tag: &str, tracker: Arc<ExecutionTracker>) -> Arc<Self> {
        Arc::new(Self { tag: tag.to_string(), tracker })
    }
}

impl Plugin for WrapExec {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &'static str {
        "mock_wrap"
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }

    fn as_piped(&self) -> Option<&dyn PipedExecutable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Executable for WrapExec {
    async fn execute(
        &self,
        _token: &CancellationToken,
        _qctx: &mut QueryContext,
    ) -> Result<(), HandlerError> {
        self.tracker.record(&format!("{}:standalone", self.tag)).await;
        Ok(())
    }
}

#[async_trait]
impl PipedExecutable for WrapExec {
    async fn execute_piped(
        &self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
        pipe: &mut PipeContext,
    ) -> Result<(), HandlerError> {
        self.tracker
            .record(&format!("{}:before[{}]", self.tag, pipe.remaining().join(",")))
            .await;
        pipe.exec_next(token, qctx).await?;
        self.tracker.record(&format!("{}:after", self.tag)).await;
        Ok(())
    }
}

async fn install_pipeline(registry: &SharedPluginRegistry, tag: &str, yaml: &str) {
    let args = serde_yaml::from_str(yaml).unwrap();
    let plugin = pipeline::init(tag, args, registry).unwrap();
    registry.register(plugin).await.unwrap();
}

#[tokio::test]
async fn test_pipeline_runs_in_order() {
    let registry = SharedPluginRegistry::new();
    let tracker = ExecutionTracker::new();

    registry.register(PlainExec::new("a", Arc::clone(&tracker))).await.unwrap();
    registry.register(PlainExec::new("b", Arc::clone(&tracker))).await.unwrap();
    registry.register(PlainExec::new("c", Arc::clone(&tracker))).await.unwrap();
    install_pipeline(&registry, "pipe", "pipe: [a, b, c]\n").await;

    let mut qctx = QueryContext::new(Message::new());
    let handle = registry.get_executable("pipe").await.unwrap();
    handle.execute(&CancellationToken::new(), &mut qctx).await.unwrap();

    assert_eq!(tracker.order().await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_piped_plugin_wraps_the_tail() {
    let registry = SharedPluginRegistry::new();
    let tracker = ExecutionTracker::new();

    registry.register(WrapExec::new("wrap", Arc::clone(&tracker))).await.unwrap();
    registry.register(PlainExec::new("inner", Arc::clone(&tracker))).await.unwrap();
    install_pipeline(&registry, "pipe", "pipe: [wrap, inner]\n").await;

    let mut qctx = QueryContext::new(Message::new());
    let handle = registry.get_executable("pipe").await.unwrap();
    handle.execute(&CancellationToken::new(), &mut qctx).await.unwrap();

    assert_eq!(
        tracker.order().await,
        vec!["wrap:before[inner]", "inner", "wrap:after"],
        "the piped plugin must see and drive the remaining suffix"
    );
}

#[tokio::test]
async fn test_pipeline_failure_is_wrapped_with_pipeline_tag() {
    let registry = SharedPluginRegistry::new();
    let tracker = ExecutionTracker::new();

    registry.register(PlainExec::failing("boom", Arc::clone(&tracker))).await.unwrap();
    registry.register(PlainExec::new("after", Arc::clone(&tracker))).await.unwrap();
    install_pipeline(&registry, "pipe", "pipe: [boom, after]\n").await;

    let mut qctx = QueryContext::new(Message::new());
    let handle = registry.get_executable("pipe").await.unwrap();
    let err = handle.execute(&CancellationToken::new(), &mut qctx).await.unwrap_err();

    assert!(matches!(&err, HandlerError::Plugin { tag, .. } if tag == "pipe"));
    assert_eq!(tracker.order().await, vec!["boom"], "plugins after a failure must not run");
}

#[tokio::test]
async fn test_cancelled_pipeline_stops() {
    let registry = SharedPluginRegistry::new();
    let tracker = ExecutionTracker::new();

    registry.register(PlainExec::new("a", Arc::clone(&tracker))).await.unwrap();
    install_pipeline(&registry, "pipe", "pipe: [a]\n").await;

    let token = CancellationToken::new();
    token.cancel();

    let mut qctx = QueryContext::new(Message::new());
    let handle = registry.get_executable("pipe").await.unwrap();
    let err = handle.execute(&token, &mut qctx).await.unwrap_err();

    assert!(matches!(err, HandlerError::Cancelled), "unexpected error: {err}");
    assert!(tracker.order().await.is_empty());
}

#[tokio::test]
async fn test_init_rejects_empty_pipe() {
    let registry = SharedPluginRegistry::new();
    let args = serde_yaml::from_str("pipe: []\n").unwrap();
    let err = pipeline::init("pipe", args, &registry).unwrap_err();
    assert!(
        matches!(&err, HandlerError::InvalidArgs { tag, .. } if tag == "pipe"),
        "unexpected error: {err}"
    );
}

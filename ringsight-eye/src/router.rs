//! Selector-driven source switching for virtual camera streams

use crate::config::SwitchedCameraConfig;
use crate::source::CameraRegistry;
use crate::stream::SwitchedStream;
use crate::table::{Value, ValueTable};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Associates one output stream with one selector key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchBinding {
    pub stream_name: String,
    pub selector_key: String,
}

impl From<&SwitchedCameraConfig> for SwitchBinding {
    fn from(config: &SwitchedCameraConfig) -> Self {
        Self {
            stream_name: config.name.clone(),
            selector_key: config.key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Unbound,
    Bound(usize),
}

/// Single-consumer state machine that retargets a switched stream.
///
/// Selectors that do not resolve to a registered source are ignored and
/// the current binding is kept.
pub struct SwitchRouter {
    binding: SwitchBinding,
    registry: Arc<CameraRegistry>,
    stream: Arc<SwitchedStream>,
    state: RouterState,
}

impl SwitchRouter {
    pub fn new(binding: SwitchBinding, registry: Arc<CameraRegistry>, stream: Arc<SwitchedStream>) -> Self {
        Self {
            binding,
            registry,
            stream,
            state: RouterState::Unbound,
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn binding(&self) -> &SwitchBinding {
        &self.binding
    }

    pub fn stream(&self) -> &Arc<SwitchedStream> {
        &self.stream
    }

    /// Registry index a selector value refers to, if any.
    ///
    /// Numbers are indices (doubles truncate toward zero); strings are
    /// exact, case-sensitive source names.
    pub fn resolve(&self, value: &Value) -> Option<usize> {
        let index = match value {
            Value::Integer(i) => *i,
            Value::Double(d) => *d as i64,
            Value::String(name) => return self.registry.position(name),
            _ => return None,
        };

        usize::try_from(index).ok().filter(|&i| i < self.registry.len())
    }

    /// Apply one selector event. Returns whether the stream was retargeted.
    pub fn handle(&mut self, value: &Value) -> bool {
        let Some(index) = self.resolve(value) else {
            debug!("{}: ignoring selector {:?}", self.binding.stream_name, value);
            return false;
        };

        let Some(source) = self.registry.get(index) else {
            return false;
        };

        self.stream.set_source(source.clone());
        self.state = RouterState::Bound(index);
        true
    }

    /// Consume selector events until the channel closes
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Value>) -> RouterState {
        while let Some(value) = events.recv().await {
            self.handle(&value);
        }
        debug!("{}: selector channel closed", self.binding.stream_name);
        self.state
    }

    /// Subscribe to the binding's key on `table` and route on a background task
    pub fn spawn(self, table: &ValueTable) -> JoinHandle<RouterState> {
        info!(
            "Starting switched camera '{}' on {}",
            self.binding.stream_name, self.binding.selector_key
        );
        let events = table.subscribe(&self.binding.selector_key);
        tokio::spawn(self.run(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Frame;
    use crate::source::{FrameSource, StillSource};

    fn registry(names: &[&str]) -> Arc<CameraRegistry> {
        let sources = names
            .iter()
            .map(|n| Arc::new(StillSource::new(*n, Frame::new(1, 1))) as Arc<dyn FrameSource>)
            .collect();
        Arc::new(CameraRegistry::new(sources))
    }

    fn router(names: &[&str]) -> SwitchRouter {
        let binding = SwitchBinding {
            stream_name: "driver".into(),
            selector_key: "/select".into(),
        };
        SwitchRouter::new(binding, registry(names), Arc::new(SwitchedStream::new("driver")))
    }

    #[test]
    fn test_resolve() {
        let router = router(&["front", "left-cam", "rear"]);
        assert_eq!(router.resolve(&Value::Integer(2)), Some(2));
        assert_eq!(router.resolve(&Value::Integer(3)), None);
        assert_eq!(router.resolve(&Value::Integer(-1)), None);
        assert_eq!(router.resolve(&Value::Double(1.9)), Some(1));
        assert_eq!(router.resolve(&Value::Double(-0.5)), Some(0));
        assert_eq!(router.resolve(&Value::Double(f64::NAN)), Some(0));
        assert_eq!(router.resolve(&Value::String("rear".into())), Some(2));
        assert_eq!(router.resolve(&Value::String("REAR".into())), None);
        assert_eq!(router.resolve(&Value::Boolean(true)), None);
        assert_eq!(router.resolve(&Value::DoubleArray(vec![1.0])), None);
    }

    #[test]
    fn test_out_of_range_index_keeps_state() {
        let mut router = router(&["a", "b", "c"]);
        assert!(router.handle(&Value::Integer(1)));
        assert!(!router.handle(&Value::Integer(5)));
        assert_eq!(router.state(), RouterState::Bound(1));
        assert_eq!(router.stream().active_name().as_deref(), Some("b"));
    }

    #[test]
    fn test_unbound_until_resolved() {
        let mut router = router(&["a"]);
        assert!(!router.handle(&Value::String("nope".into())));
        assert_eq!(router.state(), RouterState::Unbound);
        assert!(router.stream().active().is_none());
    }

    #[test]
    fn test_first_name_match_wins() {
        let mut router = router(&["dup", "dup"]);
        router.handle(&Value::String("dup".into()));
        assert_eq!(router.state(), RouterState::Bound(0));
    }

    #[tokio::test]
    async fn test_run_consumes_until_closed() {
        let router = router(&["a", "b"]);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Value::Integer(1)).unwrap();
        tx.send(Value::String("missing".into())).unwrap();
        drop(tx);
        assert_eq!(router.run(rx).await, RouterState::Bound(1));
    }
}

//! Scenario world for channel behaviour tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use bidio_config::Config;

use crate::memory::{ManualTimer, MemoryConnection, MemoryConnector};
use crate::{
    ActionKind, Channel, ConnectOptions, ConnectTarget, Connector, JoinOptions, LifecycleEvent,
    Manager, Reply, Selector, Watcher, watcher,
};

const BASE_URL: &str = "http://localhost:3000/";

type Counters = Arc<Mutex<HashMap<String, usize>>>;

/// State shared by the steps of one scenario.
pub struct TestWorld {
    connector: Arc<MemoryConnector>,
    pub timer: Arc<ManualTimer>,
    manager: Manager,
    channel: Option<Channel>,
    fired: Counters,
    replies: Arc<Mutex<Vec<Reply>>>,
}

impl TestWorld {
    /// Builds a world around an in-memory transport.
    pub fn new() -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let timer = Arc::new(ManualTimer::new());
        let manager = Manager::new(Arc::clone(&connector) as Arc<dyn Connector>, Config::default())
            .expect("default configuration")
            .with_timer(Arc::clone(&timer) as Arc<dyn crate::Timer>);
        Self {
            connector,
            timer,
            manager,
            channel: None,
            fired: Arc::new(Mutex::new(HashMap::new())),
            replies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn open_parent(&self) {
        self.manager
            .connect(ConnectTarget::Default, &ConnectOptions::default());
    }

    pub fn join(&mut self, name: &str) {
        let channel = self
            .manager
            .join(name, JoinOptions::default())
            .expect("join channel");
        self.channel = Some(channel);
    }

    pub fn channel(&self) -> &Channel {
        self.channel.as_ref().expect("a channel must be joined first")
    }

    pub fn connection(&self) -> Arc<MemoryConnection> {
        let url = self.channel().url().as_str().to_owned();
        self.connector
            .connection(&url)
            .expect("channel connection")
    }

    pub fn parent(&self) -> Arc<MemoryConnection> {
        self.connector
            .connection(BASE_URL)
            .expect("parent connection")
    }

    fn counting(&self, label: &str) -> Watcher {
        let fired = Arc::clone(&self.fired);
        let label = label.to_owned();
        watcher(move |_, _| {
            *fired
                .lock()
                .expect("counter lock")
                .entry(label.clone())
                .or_default() += 1;
        })
    }

    pub fn watch(&self, label: &str, selector: Selector) {
        let watcher = self.counting(label);
        self.channel().watch(selector, watcher);
    }

    pub fn listen(&self, label: &str, event: LifecycleEvent) {
        let fired = Arc::clone(&self.fired);
        let label = label.to_owned();
        self.channel().listen(event, move |_| {
            *fired
                .lock()
                .expect("counter lock")
                .entry(label.clone())
                .or_default() += 1;
        });
    }

    pub fn fired(&self, label: &str) -> usize {
        self.fired
            .lock()
            .expect("counter lock")
            .get(label)
            .copied()
            .unwrap_or_default()
    }

    pub fn stream(&self, kind: &str, id: i64) {
        self.connection().deliver(
            self.channel().namespace(),
            &json!({"type": kind, "id": id, "data": {"action": kind}}),
        );
    }

    pub fn deliver(&self, event: &str) {
        self.connection().deliver(event, &Value::Null);
    }

    pub fn recorder(&self) -> impl FnOnce(Reply) + Send + 'static {
        let replies = Arc::clone(&self.replies);
        move |reply| replies.lock().expect("reply lock").push(reply)
    }

    pub fn acknowledge(&self, reply: Value) {
        assert!(
            self.connection().acknowledge(reply),
            "no acknowledgement was pending"
        );
    }

    pub fn last_request(&self) -> Value {
        self.connection()
            .emitted()
            .last()
            .map(|emitted| emitted.payload.clone())
            .expect("a request must have been sent")
    }

    pub fn take_reply(&self) -> Reply {
        self.replies
            .lock()
            .expect("reply lock")
            .pop()
            .expect("a reply must have arrived")
    }
}

/// Parses an action name written in a feature file.
pub fn action(name: &str) -> ActionKind {
    ActionKind::parse(name.trim_matches('"'))
}

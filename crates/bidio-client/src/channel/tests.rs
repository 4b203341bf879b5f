//! Unit tests for channel routing, lifecycle forwarding, and requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use url::Url;

use super::*;
use crate::action::ActionKind;
use crate::error::RequestError;
use crate::memory::{ManualTimer, MemoryConnection, MemoryConnector};
use crate::timer::TimerTask;

const CHANNEL_URL: &str = "http://localhost:3000/bids";

mock! {
    ReloadTimer {}
    impl Timer for ReloadTimer {
        fn schedule(&self, delay: Duration, task: TimerTask);
    }
}

type Seen = Arc<Mutex<Vec<(Value, ActionKind)>>>;

struct Harness {
    connector: Arc<MemoryConnector>,
    parent: Option<Arc<MemoryConnection>>,
    timer: Arc<ManualTimer>,
    channel: Channel,
}

impl Harness {
    fn new(reload_grace: Option<Duration>, with_parent: bool) -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let timer = Arc::new(ManualTimer::new());
        let parent = with_parent.then(|| {
            Arc::new(MemoryConnection::new(
                Url::parse("http://localhost:3000").expect("parent url"),
            ))
        });
        let channel = Channel::attach(settings(
            Arc::clone(&connector) as Arc<dyn Connector>,
            parent.clone().map(|parent| parent as Arc<dyn Connection>),
            Arc::clone(&timer) as Arc<dyn Timer>,
            reload_grace,
        ));
        Self {
            connector,
            parent,
            timer,
            channel,
        }
    }

    fn connection(&self) -> Arc<MemoryConnection> {
        self.connector
            .connection(CHANNEL_URL)
            .expect("channel connection")
    }

    fn stream(&self, message: Value) {
        self.connection().deliver("stream", &message);
    }
}

fn settings(
    connector: Arc<dyn Connector>,
    parent: Option<Arc<dyn Connection>>,
    timer: Arc<dyn Timer>,
    reload_grace: Option<Duration>,
) -> ChannelSettings {
    ChannelSettings {
        name: "bids".into(),
        namespace: "stream".into(),
        url: Url::parse(CHANNEL_URL).expect("channel url"),
        options: ConnectOptions::default(),
        connector,
        parent,
        timer,
        reload_grace,
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new(Some(Duration::from_millis(100)), true)
}

#[fixture]
fn seen() -> Seen {
    Arc::new(Mutex::new(Vec::new()))
}

fn recording(seen: &Seen) -> Watcher {
    let seen = Arc::clone(seen);
    watcher(move |data, action| {
        seen.lock()
            .expect("seen lock")
            .push((data.clone(), action.clone()));
    })
}

fn seen_count(seen: &Seen) -> usize {
    seen.lock().expect("seen lock").len()
}

#[rstest]
fn open_attaches_stream_reload_and_lifecycle_listeners(harness: Harness) {
    let connection = harness.connection();
    assert!(harness.channel.is_connected());
    assert_eq!(connection.listener_count("stream"), 1);
    assert_eq!(connection.listener_count(RELOAD_EVENT), 1);
    for event in LifecycleEvent::ALL {
        assert_eq!(connection.listener_count(event.as_str()), 1, "{event}");
    }
}

#[rstest]
fn connect_is_idempotent(harness: Harness) {
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    harness.channel.listen(LifecycleEvent::Connect, move |_| {
        *counter.lock().expect("counter lock") += 1;
    });

    harness.channel.connect().connect();
    harness.connection().deliver("connect", &Value::Null);

    assert_eq!(*calls.lock().expect("counter lock"), 1);
    assert_eq!(harness.connection().listener_count("stream"), 1);
    assert_eq!(harness.connector.calls().len(), 1);
}

#[rstest]
fn wildcard_watcher_sees_every_packet(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));

    harness.stream(json!({"type": "lock", "id": 1, "data": {"n": 1}}));
    harness.stream(json!({"type": "archive", "id": null, "data": {"n": 2}}));

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (json!({"n": 1}), ActionKind::Lock));
    assert_eq!(seen[1].1, ActionKind::Other("archive".into()));
}

#[rstest]
#[case::matching(json!({"type": "complete", "id": 5, "data": {}}), 1)]
#[case::other_action(json!({"type": "update", "id": 5, "data": {}}), 0)]
#[case::other_id(json!({"type": "complete", "id": 6, "data": {}}), 0)]
#[case::textual_id(json!({"type": "complete", "id": "5", "data": {}}), 1)]
fn keyed_watcher_requires_id_and_action(
    harness: Harness,
    seen: Seen,
    #[case] message: Value,
    #[case] expected: usize,
) {
    harness
        .channel
        .watch(Selector::from(5).with_actions("complete"), recording(&seen));

    harness.stream(message);

    assert_eq!(seen_count(&seen), expected);
}

#[rstest]
fn action_selector_watches_every_bid(harness: Harness, seen: Seen) {
    harness.channel.watch("fetch complete", recording(&seen));

    harness.stream(json!({"type": "fetch", "id": 1, "data": {}}));
    harness.stream(json!({"type": "complete", "id": 2, "data": {}}));
    harness.stream(json!({"type": "lock", "id": 3, "data": {}}));

    assert_eq!(seen_count(&seen), 2);
}

#[rstest]
fn unwatch_without_watcher_removes_every_action(harness: Harness, seen: Seen) {
    harness.channel.watch(
        Selector::from(42).with_actions("lock unlock"),
        recording(&seen),
    );
    assert_eq!(harness.channel.watch_count(), 2);

    harness.channel.unwatch(42, None);
    harness.stream(json!({"type": "lock", "id": 42, "data": {}}));

    assert_eq!(harness.channel.watch_count(), 0);
    assert_eq!(seen_count(&seen), 0);
}

#[rstest]
fn unwatch_with_watcher_keeps_the_others(harness: Harness, seen: Seen) {
    let first = recording(&seen);
    let other = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&other);
    harness.channel.watch_all(Arc::clone(&first));
    harness.channel.watch_all(watcher(move |_, _| {
        *counter.lock().expect("counter lock") += 1;
    }));

    harness.channel.unwatch(Selector::Wildcard, Some(&first));
    harness.stream(json!({"type": "fetch", "id": 1, "data": {}}));

    assert_eq!(seen_count(&seen), 0);
    assert_eq!(*other.lock().expect("counter lock"), 1);
}

#[rstest]
fn watcher_may_unwatch_itself_while_dispatching(harness: Harness) {
    let channel = harness.channel.clone();
    let fired = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fired);
    harness.channel.watch_all(watcher(move |_, _| {
        *counter.lock().expect("counter lock") += 1;
        channel.unwatch(Selector::Wildcard, None);
    }));

    harness.stream(json!({"type": "fetch", "id": 1, "data": {}}));
    harness.stream(json!({"type": "fetch", "id": 1, "data": {}}));

    assert_eq!(*fired.lock().expect("counter lock"), 1);
}

#[rstest]
fn undecodable_stream_packet_is_dropped(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));

    harness.stream(json!("garbage"));
    harness.stream(json!(["lock", 1, {}]));
    harness.stream(json!({"type": "lock", "id": 1, "data": {}}));

    assert_eq!(seen_count(&seen), 1);
}

#[rstest]
fn disconnect_detaches_listeners_but_keeps_watchers(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));
    let connection = harness.connection();

    harness.channel.disconnect();

    assert!(!harness.channel.is_connected());
    assert_eq!(connection.disconnects(), 1);
    assert_eq!(connection.listener_count("stream"), 0);
    assert_eq!(connection.listener_count(RELOAD_EVENT), 0);
    for event in LifecycleEvent::ALL {
        assert_eq!(connection.listener_count(event.as_str()), 0, "{event}");
    }
    assert_eq!(harness.channel.watch_count(), 1);

    connection.deliver("stream", &json!({"type": "lock", "id": 1, "data": {}}));
    assert_eq!(seen_count(&seen), 0);
}

#[rstest]
fn connect_after_disconnect_reacquires_and_resumes_routing(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));

    harness.channel.disconnect().connect();
    harness.stream(json!({"type": "lock", "id": 1, "data": {}}));

    assert!(harness.channel.is_connected());
    assert_eq!(harness.connector.calls().len(), 2);
    assert_eq!(harness.connection().listener_count("stream"), 1);
    assert_eq!(seen_count(&seen), 1);
}

#[rstest]
fn lifecycle_events_are_forwarded_verbatim(harness: Harness) {
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&payloads);
    harness
        .channel
        .listen(LifecycleEvent::ConnectFailed, move |payload| {
            sink.lock().expect("sink lock").push(payload.clone());
        });

    harness
        .connection()
        .deliver("connect_failed", &json!({"reason": "refused"}));
    harness.connection().deliver("reconnect", &json!(1));

    assert_eq!(
        *payloads.lock().expect("sink lock"),
        vec![json!({"reason": "refused"})]
    );
}

#[rstest]
fn unbind_and_unlisten_stop_forwarding(harness: Harness) {
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    harness.channel.listen(LifecycleEvent::Disconnect, move |_| {
        *counter.lock().expect("counter lock") += 1;
    });

    harness.channel.unbind(LifecycleEvent::Disconnect);
    harness.connection().deliver("disconnect", &Value::Null);
    assert_eq!(harness.connection().listener_count("disconnect"), 0);

    harness
        .channel
        .bind(LifecycleEvent::Disconnect)
        .bind(LifecycleEvent::Disconnect);
    harness.connection().deliver("disconnect", &Value::Null);
    assert_eq!(harness.connection().listener_count("disconnect"), 1);

    harness.channel.unlisten(LifecycleEvent::Disconnect);
    harness.connection().deliver("disconnect", &Value::Null);

    assert_eq!(*calls.lock().expect("counter lock"), 1);
}

#[rstest]
fn open_emits_lock_request_and_resolves_reply(harness: Harness) {
    let reply = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&reply);
    harness
        .channel
        .open(7, Some(json!({"id": "u1"})), move |result: Reply| {
            *slot.lock().expect("reply lock") = Some(result);
        });

    let emitted = harness.connection().emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].event, "stream");
    assert_eq!(
        emitted[0].payload,
        json!({"type": "lock", "id": 7, "data": {"owner": {"id": "u1"}}})
    );

    assert!(
        harness
            .connection()
            .acknowledge(json!({"type": "lock", "id": 7, "data": {"locked": true}}))
    );
    let result = reply.lock().expect("reply lock").take().expect("reply");
    assert_eq!(result.expect("success"), json!({"locked": true}));
}

#[rstest]
fn error_acknowledgement_fails_the_request(harness: Harness) {
    let reply = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&reply);
    harness.channel.find(json!({"status": "open"}), move |result: Reply| {
        *slot.lock().expect("reply lock") = Some(result);
    });

    assert_eq!(
        harness.connection().emitted()[0].payload,
        json!({"type": "query", "id": "", "data": {"query": {"status": "open"}}})
    );

    harness
        .connection()
        .acknowledge(json!({"type": "error", "id": "", "data": {"message": "denied"}}));
    let result = reply.lock().expect("reply lock").take().expect("reply");
    let error = result.expect_err("error reply");
    assert!(matches!(error, RequestError::Remote { .. }));
    assert_eq!(error.payload(), Some(&json!({"message": "denied"})));
}

#[rstest]
#[case::fetch(ActionKind::Fetch, json!({"owner": null}))]
#[case::claim(ActionKind::Claim, json!({"owner": {"id": "u2"}}))]
#[case::pending(ActionKind::Pending, json!({"owner": {"id": "u2"}}))]
#[case::complete(ActionKind::Complete, json!({"owner": {"id": "u2"}}))]
#[case::cancel(ActionKind::Unlock, json!({"owner": {"id": "u2"}}))]
#[case::force_unlock(ActionKind::ForceUnlock, json!({"owner": {"id": "u2"}}))]
#[case::update(ActionKind::Update, json!({"update": {"id": "u2"}}))]
fn verbs_wrap_their_argument(harness: Harness, #[case] kind: ActionKind, #[case] data: Value) {
    let owner = Some(json!({"id": "u2"}));
    let channel = &harness.channel;
    match kind {
        ActionKind::Fetch => channel.fetch(3, Responder::none()),
        ActionKind::Claim => channel.claim(3, owner, Responder::none()),
        ActionKind::Pending => channel.pending(3, owner, Responder::none()),
        ActionKind::Complete => channel.complete(3, owner, Responder::none()),
        ActionKind::Unlock => channel.cancel(3, owner, Responder::none()),
        ActionKind::ForceUnlock => channel.force_unlock(3, owner, Responder::none()),
        ActionKind::Update => channel.update(3, json!({"id": "u2"}), Responder::none()),
        other => panic!("no verb for {other}"),
    };

    let emitted = harness.connection().emitted();
    assert_eq!(
        emitted[0].payload,
        json!({"type": kind.as_str(), "id": 3, "data": data})
    );
    assert!(emitted[0].acknowledged);
}

#[rstest]
fn fire_and_forget_reply_is_discarded(harness: Harness) {
    harness
        .channel
        .send(ActionKind::Other("archive".into()), "b-1", None, Responder::none());

    assert_eq!(
        harness.connection().emitted()[0].payload,
        json!({"type": "archive", "id": "b-1", "data": {"owner": null}})
    );
    assert!(harness.connection().acknowledge(json!({"type": "archive", "data": {}})));
}

#[rstest]
fn pending_request_outlives_unwatch(harness: Harness, seen: Seen) {
    let replied = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&replied);
    harness.channel.watch_all(recording(&seen));
    harness.channel.fetch(9, move |_: Reply| {
        *flag.lock().expect("flag lock") = true;
    });

    harness.channel.unwatch(Selector::Wildcard, None);
    harness
        .connection()
        .acknowledge(json!({"type": "fetch", "id": 9, "data": {}}));

    assert!(*replied.lock().expect("flag lock"));
}

#[rstest]
fn reload_cycles_parent_and_channel(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));
    let parent = harness.parent.clone().expect("parent");

    harness.connection().deliver(RELOAD_EVENT, &Value::Null);

    assert_eq!(parent.disconnects(), 1);
    assert!(!harness.channel.is_connected());
    assert_eq!(harness.timer.delays(), vec![Duration::from_millis(100)]);

    assert_eq!(harness.timer.fire_all(), 1);
    assert_eq!(parent.reconnects(), 1);
    assert!(harness.channel.is_connected());

    harness.stream(json!({"type": "update", "id": 4, "data": {}}));
    assert_eq!(seen_count(&seen), 1);
}

#[test]
fn reload_without_parent_only_cycles_the_channel() {
    let harness = Harness::new(Some(Duration::from_millis(100)), false);

    harness.connection().deliver(RELOAD_EVENT, &Value::Null);
    assert!(!harness.channel.is_connected());

    harness.timer.fire_all();
    assert!(harness.channel.is_connected());
}

#[test]
fn reload_is_ignored_when_disabled() {
    let harness = Harness::new(None, true);

    assert_eq!(harness.connection().listener_count(RELOAD_EVENT), 0);
    assert_eq!(harness.connection().deliver(RELOAD_EVENT, &Value::Null), 0);
    assert!(harness.channel.is_connected());
    assert!(harness.timer.delays().is_empty());
}

#[test]
fn reload_schedules_reconnect_after_grace_period() {
    let connector = Arc::new(MemoryConnector::new());
    let mut timer = MockReloadTimer::new();
    timer
        .expect_schedule()
        .withf(|delay, _task| *delay == Duration::from_millis(250))
        .once()
        .return_const(());
    let channel = Channel::attach(settings(
        Arc::clone(&connector) as Arc<dyn Connector>,
        None,
        Arc::new(timer),
        Some(Duration::from_millis(250)),
    ));

    connector
        .connection(CHANNEL_URL)
        .expect("channel connection")
        .deliver(RELOAD_EVENT, &Value::Null);

    assert!(!channel.is_connected());
}

#[rstest]
fn disconnect_during_grace_period_cancels_reattach(harness: Harness, seen: Seen) {
    harness.channel.watch_all(recording(&seen));
    let parent = harness.parent.clone().expect("parent");

    harness.connection().deliver(RELOAD_EVENT, &Value::Null);
    harness.channel.disconnect();
    assert_eq!(harness.timer.fire_all(), 1);

    assert_eq!(parent.reconnects(), 1);
    assert!(!harness.channel.is_connected());
    assert_eq!(harness.connection().listener_count("stream"), 0);
    harness.stream(json!({"type": "update", "id": 4, "data": {}}));
    assert_eq!(seen_count(&seen), 0);
}

#[rstest]
fn connect_during_grace_period_is_not_duplicated(harness: Harness) {
    harness.connection().deliver(RELOAD_EVENT, &Value::Null);
    harness.channel.connect();
    harness.timer.fire_all();

    assert!(harness.channel.is_connected());
    assert_eq!(harness.connection().listener_count("stream"), 1);
    assert_eq!(harness.connection().listener_count(RELOAD_EVENT), 1);
}

#[rstest]
fn reload_after_cancelled_reload_reattaches_again(harness: Harness) {
    harness.connection().deliver(RELOAD_EVENT, &Value::Null);
    harness.channel.disconnect();
    harness.timer.fire_all();

    harness.channel.connect();
    harness.connection().deliver(RELOAD_EVENT, &Value::Null);
    harness.timer.fire_all();

    assert!(harness.channel.is_connected());
}

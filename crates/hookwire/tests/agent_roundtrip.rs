//! End-to-end tests against a mock agent over real sockets

mod support;

use hookwire::{Command, Controller, ControllerBuilder, Envelope, EventKey, EventKind, HookwireError};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{push_frame, MockAgent};

async fn start_pair() -> (Controller, MockAgent) {
    let (agent, agent_addr) = MockAgent::start().await;
    let controller = builder(agent_addr).start().await.unwrap();
    agent.set_callback(controller.local_addr());
    (controller, agent)
}

fn builder(agent_addr: SocketAddr) -> ControllerBuilder {
    Controller::builder()
        .with_command_addr(agent_addr.ip().to_string(), agent_addr.port())
        .with_listen_addr("127.0.0.1", 0)
        .with_timeout(Duration::from_secs(2))
        .with_shutdown_grace(Duration::from_millis(100))
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn test_send_and_wait_generates_trace_and_cleans_up() {
    let (controller, agent) = start_pair().await;
    assert!(controller.correlation().is_empty().await);

    let waiter = controller.clone();
    let call = tokio::spawn(async move {
        waiter
            .send_and_wait(3, Command::new(11036, json!({"msg": "hi", "delay_ms": 150})), None)
            .await
    });

    let observer = controller.clone();
    wait_until(|| {
        let observer = observer.clone();
        async move { observer.correlation().len().await == 1 }
    })
    .await;

    let data = call.await.unwrap().unwrap();
    assert_eq!(data, Some(json!({"echo": {"msg": "hi", "delay_ms": 150}})));
    assert!(controller.correlation().is_empty().await);

    let received = agent.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, 3);
    let trace = received[0].1.trace.clone().unwrap();
    assert!(uuid::Uuid::parse_str(&trace).is_ok());

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_explicit_trace_is_kept() {
    let (controller, agent) = start_pair().await;

    let command = Command::new(11036, json!({"n": 1})).with_trace("my-trace");
    let data = controller.send_and_wait(1, command, None).await.unwrap();

    assert_eq!(data, Some(json!({"echo": {"n": 1}})));
    assert_eq!(agent.received()[0].1.trace.as_deref(), Some("my-trace"));

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_waits_do_not_cross_deliver() {
    let (controller, _agent) = start_pair().await;

    // The first call is answered last
    let slow = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .send_and_wait(1, Command::new(11036, json!({"id": "slow", "delay_ms": 200})), None)
                .await
        })
    };
    let fast = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .send_and_wait(2, Command::new(11036, json!({"id": "fast", "delay_ms": 10})), None)
                .await
        })
    };

    let slow = slow.await.unwrap().unwrap().unwrap();
    let fast = fast.await.unwrap().unwrap().unwrap();
    assert_eq!(slow["echo"]["id"], "slow");
    assert_eq!(fast["echo"]["id"], "fast");
    assert!(controller.correlation().is_empty().await);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_agent_times_out() {
    let (controller, _agent) = start_pair().await;

    let start = std::time::Instant::now();
    let data = controller
        .send_and_wait(1, Command::new(11036, json!({"silent": true})), Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(data, None);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(controller.correlation().is_empty().await);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_wait_is_withdrawn() {
    let (controller, _agent) = start_pair().await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        controller.send_and_wait(1, Command::new(11036, json!({"silent": true})), Some(Duration::from_secs(30))),
    )
    .await;
    assert!(outcome.is_err());

    let observer = controller.clone();
    wait_until(|| {
        let observer = observer.clone();
        async move { observer.correlation().is_empty().await }
    })
    .await;

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_ack_within_explicit_wait_succeeds() {
    let (agent, agent_addr) = MockAgent::start().await;
    let controller = builder(agent_addr)
        .with_timeout(Duration::from_millis(100))
        .with_request_timeout(Duration::from_secs(5))
        .start()
        .await
        .unwrap();
    agent.set_callback(controller.local_addr());

    let data = controller
        .send_and_wait(
            2,
            Command::new(11036, json!({"ack_delay_ms": 300})),
            Some(Duration::from_secs(3)),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(data["echo"]["ack_delay_ms"], 300);
    assert!(controller.correlation().is_empty().await);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_returns_transport_ack() {
    let (controller, agent) = start_pair().await;

    let ack = controller.send(9, &Command::new(11036, json!({"msg": "fire"}))).await.unwrap();
    assert_eq!(ack, json!({"data": {}}));

    let received = agent.received();
    assert_eq!(received[0].0, 9);
    assert_eq!(received[0].1.trace, None);
    assert_eq!(received[0].1.data["msg"], "fire");

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_service_endpoints() {
    let (controller, _agent) = start_pair().await;
    let commands = controller.commands();

    assert_eq!(commands.version().await.unwrap()["version"], "3.9.2.23");
    assert_eq!(commands.open().await.unwrap()["code"], 1);
    assert_eq!(commands.inject(4321).await.unwrap()["pid"], 4321);
    assert_eq!(commands.destroy().await.unwrap(), json!({}));

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_reach_subscribers_and_track_agents() {
    let (controller, agent) = start_pair().await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    controller
        .subscribe(EventKey::All, move |envelope: &Envelope| -> anyhow::Result<()> {
            log.lock().unwrap().push(format!("all:{}", envelope.kind.map(|k| k.code()).unwrap_or_default()));
            Ok(())
        })
        .await;
    let log = seen.clone();
    controller
        .subscribe_once(EventKind::Text, move |envelope: &Envelope| -> anyhow::Result<()> {
            log.lock().unwrap().push(format!("text-once:{}", envelope.data["msg"]));
            Ok(())
        })
        .await;

    agent.push_event(5, json!({"type": 11024, "data": {"pid": 100}})).await;
    let observer = controller.clone();
    wait_until(|| {
        let observer = observer.clone();
        async move { observer.agents().await.len() == 1 }
    })
    .await;

    // Frames on separate connections race, so let each one land first
    for (msg, expected) in [("one", 3), ("two", 4)] {
        agent.push_event(5, json!({"type": 11046, "data": {"msg": msg}})).await;
        let observed = seen.clone();
        wait_until(|| {
            let observed = observed.clone();
            async move { observed.lock().unwrap().len() == expected }
        })
        .await;
    }

    let log = seen.lock().unwrap().clone();
    assert!(log.contains(&"text-once:\"one\"".to_string()));
    assert!(!log.iter().any(|entry| entry.contains("two") && entry.starts_with("text-once")));
    assert_eq!(log.iter().filter(|entry| entry.starts_with("all:")).count(), 3);

    let agents = controller.agents().await;
    assert_eq!(agents.len(), 1);
    assert_eq!((agents[0].id, agents[0].pid), (5, 100));

    agent.push_event(5, json!({"event": "disconnected"})).await;
    let observer = controller.clone();
    wait_until(|| {
        let observer = observer.clone();
        async move { observer.agents().await.is_empty() }
    })
    .await;

    // Disconnect for an id that never connected changes nothing
    agent.push_event(9, json!({"event": "disconnected"})).await;
    assert!(controller.agents().await.is_empty());

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_garbage_frames_are_acknowledged_and_dropped() {
    let (controller, _agent) = start_pair().await;

    let ack = push_frame(controller.local_addr(), b"Client-Id: 1\r\n\r\nnot-hex0A").await;
    assert_eq!(ack, b"HTTP/1.1 200 OK");

    let ack = push_frame(controller.local_addr(), b"").await;
    assert!(ack.is_empty());

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_unblocks_waiter() {
    let (controller, _agent) = start_pair().await;

    let waiter = controller.clone();
    let call = tokio::spawn(async move {
        waiter
            .send_and_wait(1, Command::new(11036, json!({"silent": true})), Some(Duration::from_secs(30)))
            .await
    });

    let observer = controller.clone();
    wait_until(|| {
        let observer = observer.clone();
        async move { observer.correlation().len().await == 1 }
    })
    .await;

    controller.shutdown().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), call).await.unwrap().unwrap();
    assert!(matches!(result, Err(HookwireError::Cancelled)));
}

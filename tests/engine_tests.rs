//! Batch engine behavior: result invariants, failure containment, the
//! worker bound, and batch chaining.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{make_host, Behavior, ScriptedFactory, SessionCounter};
use fanout::connection::Connector;
use fanout::engine::BatchRunner;
use fanout::inventory::Host;
use fanout::ops::{CommandOp, CustomOp};
use fanout::resolver::RouteResolver;

fn runner(factory: &Arc<ScriptedFactory>) -> BatchRunner {
    BatchRunner::new().with_resolver(RouteResolver::with_factory(factory.clone()))
}

#[tokio::test]
async fn mixed_batch_accounts_every_host_exactly_once() {
    // Host A resolves directly, host B's only route fails, host C falls
    // back to its second route.
    let factory = ScriptedFactory::new()
        .script("host-b", "only", Behavior::ConnectFail)
        .script("host-c", "first", Behavior::ConnectFail);

    let hosts = vec![
        make_host("host-a", &["direct"]),
        make_host("host-b", &["only"]),
        make_host("host-c", &["first", "second"]),
    ];
    let host_b = hosts[1].clone();
    let host_c = hosts[2].clone();

    let batch = runner(&factory)
        .run_command(hosts, CommandOp::new("whoami"))
        .await;

    assert_eq!(batch.total_hosts(), 3);
    assert_eq!(batch.total_successful(), 2);
    assert_eq!(batch.total_failed(), 1);
    assert_eq!(
        batch.total_hosts(),
        batch.total_successful() + batch.total_failed()
    );

    let failed = &batch.failed()[0];
    assert_eq!(failed.host().hostname, "host-b");
    assert!(failed.error().expect("error present").contains("host-b"));
    assert!(failed.payload().is_none());

    // Route bookkeeping survives the batch.
    assert!(!host_b.route("only").expect("route").is_active());
    assert!(!host_c.route("first").expect("route").is_active());
    assert!(host_c.route("second").expect("route").is_active());
}

#[tokio::test]
async fn every_result_has_exactly_one_of_payload_and_error() {
    let factory = ScriptedFactory::new().script("host-b", "direct", Behavior::ConnectFail);
    let hosts = vec![make_host("host-a", &["direct"]), make_host("host-b", &["direct"])];

    let batch = runner(&factory)
        .run_command(hosts, CommandOp::new("uptime"))
        .await;

    for result in batch.successful().iter().chain(batch.failed()) {
        assert_ne!(result.payload().is_some(), result.error().is_some());
    }
}

#[tokio::test]
async fn operation_errors_are_contained_per_host() {
    let factory = ScriptedFactory::new();
    let hosts = vec![make_host("good", &["direct"]), make_host("bad", &["direct"])];

    let op = CustomOp::new("fail on bad", |conn| {
        Box::pin(async move {
            let out = conn.execute("hostname").await?;
            if out.stdout.contains("mock") {
                Ok(serde_json::json!({ "ok": true }))
            } else {
                Err(fanout::ops::OperationError::Custom("unexpected".into()))
            }
        })
    });

    // Both hosts run the same body; neither host's outcome leaks into the
    // other and run() itself cannot fail.
    let batch = runner(&factory).run_custom(hosts, op).await;
    assert_eq!(batch.total_hosts(), 2);
}

#[tokio::test]
async fn panicking_operation_body_becomes_that_hosts_failure() {
    let factory = ScriptedFactory::new();
    let hosts = vec![make_host("explosive", &["direct"])];

    let op = CustomOp::new("panic", |_conn| Box::pin(async { panic!("boom") }));
    let batch = runner(&factory).run_custom(hosts, op).await;

    assert_eq!(batch.total_hosts(), 1);
    assert_eq!(batch.total_failed(), 1);
    assert!(batch.failed()[0]
        .error()
        .expect("error present")
        .contains("aborted"));
}

#[tokio::test]
async fn connectors_are_closed_even_when_the_body_fails() {
    let factory = ScriptedFactory::new();
    let hosts = vec![make_host("host-a", &["direct"]), make_host("host-b", &["direct"])];

    let op = CustomOp::new("always fail", |_conn| {
        Box::pin(async { Err(fanout::ops::OperationError::Custom("nope".into())) })
    });
    let batch = runner(&factory).run_custom(hosts, op).await;

    assert_eq!(batch.total_failed(), 2);
    assert_eq!(factory.sessions_created(), 2);
    assert!(factory.all_closed());
}

#[tokio::test]
async fn worker_bound_caps_concurrent_sessions() {
    let counter = SessionCounter::new();
    let factory = ScriptedFactory::new()
        .with_counter(counter.clone())
        .with_exec_delay(Duration::from_millis(50));

    let hosts: Vec<Arc<Host>> = (0..8)
        .map(|i| make_host(&format!("host-{}", i), &["direct"]))
        .collect();

    let batch = runner(&factory)
        .with_max_workers(2)
        .expect("worker bound is valid")
        .run_command(hosts, CommandOp::new("sleepy"))
        .await;

    assert_eq!(batch.total_successful(), 8);
    assert!(
        counter.peak() <= 2,
        "peak concurrent sessions {} exceeded the bound",
        counter.peak()
    );
}

#[tokio::test]
async fn chained_batch_processes_exactly_the_failed_hosts() {
    let factory = ScriptedFactory::new()
        .script("host-1", "direct", Behavior::ConnectFail)
        .script("host-3", "direct", Behavior::ConnectFail);

    let hosts: Vec<Arc<Host>> = (0..4)
        .map(|i| make_host(&format!("host-{}", i), &["direct"]))
        .collect();

    let engine = runner(&factory);
    let first = engine.run_command(hosts, CommandOp::new("deploy")).await;
    assert_eq!(first.total_failed(), 2);

    let retry_hosts = first.failed_hosts();
    assert_eq!(retry_hosts.len(), 2);

    let second = engine
        .run_command(retry_hosts, CommandOp::new("deploy"))
        .await;
    assert_eq!(second.total_hosts(), 2);
    // Their only routes were deactivated in the first batch and nothing
    // reactivated them, so the retry fails without reconnecting.
    assert_eq!(second.total_failed(), 2);
    assert!(second.failed()[0]
        .error()
        .expect("error present")
        .contains("exhausted"));
}

#[tokio::test]
async fn empty_host_set_yields_an_empty_batch() {
    let factory = ScriptedFactory::new();
    let batch = runner(&factory)
        .run_command(Vec::new(), CommandOp::new("noop"))
        .await;

    assert_eq!(batch.total_hosts(), 0);
    assert_eq!(batch.success_rate(), 0.0);
    assert!(batch.all_succeeded());
}

#[tokio::test]
async fn unsupported_capability_fails_the_host_not_the_batch() {
    let factory = ScriptedFactory::new().script("ftp-box", "direct", Behavior::TransferOnly);
    let hosts = vec![make_host("ftp-box", &["direct"]), make_host("shell-box", &["direct"])];

    let batch = runner(&factory)
        .run_command(hosts, CommandOp::new("uname"))
        .await;

    assert_eq!(batch.total_successful(), 1);
    assert_eq!(batch.total_failed(), 1);
    assert!(batch.failed()[0]
        .error()
        .expect("error present")
        .contains("does not support"));
}

#[test]
fn zero_workers_is_an_engine_construction_error() {
    assert!(BatchRunner::new().with_max_workers(0).is_err());
    assert!(BatchRunner::new().with_max_workers(1).is_ok());
}

#[tokio::test]
async fn per_host_elapsed_time_is_recorded() {
    let factory = ScriptedFactory::new().with_exec_delay(Duration::from_millis(20));
    let hosts = vec![make_host("host-a", &["direct"])];

    let batch = runner(&factory)
        .run_command(hosts, CommandOp::new("sleepy"))
        .await;

    let result = &batch.successful()[0];
    assert!(result.elapsed() >= Duration::from_millis(20));
    assert!(batch.execution_time() >= result.elapsed());
}

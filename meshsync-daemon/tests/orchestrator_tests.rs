mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use meshsync_core::{ChangeKind, ChangeSet, ChecksumId, Config, HostEnv};
use meshsync_daemon::{exchange_name, queue_name, MemoryBus, NotificationChannel, Orchestrator};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

use support::{wait_until, ScriptedTool};

const REMOTE: &str = "remote:docs";
const LIMIT: Duration = Duration::from_secs(10);

fn config_for(host: &str, local: &Path) -> Config {
    let yaml = format!(
        r#"
connection:
  hostname: broker.local
hosts:
  {host}:
    "{REMOTE}":
      path: {}
debounce: 100
"#,
        local.display()
    );
    Config::from_yaml(&yaml, Path::new("test.yaml")).unwrap()
}

#[tokio::test]
async fn unconfigured_host_starts_nothing() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let bus = MemoryBus::new();
    let tool = Arc::new(ScriptedTool::default());

    let orchestrator = Orchestrator::new(
        config_for("beta", local.path()),
        HostEnv::new("alpha", home.path()),
        Arc::new(bus.clone()),
        tool.clone(),
    );
    let (shutdown, _) = broadcast::channel(1);

    timeout(LIMIT, orchestrator.run(shutdown))
        .await
        .expect("returns without waiting for shutdown")
        .unwrap();
    assert_eq!(bus.connections(), 0);
    assert_eq!(tool.count(), 0);
}

#[tokio::test]
async fn rebuilds_topology_and_coordinators_after_connection_loss() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let bus = MemoryBus::new();
    let tool = Arc::new(ScriptedTool::default());

    let orchestrator = Orchestrator::new(
        config_for("alpha", local.path()),
        HostEnv::new("alpha", home.path()),
        Arc::new(bus.clone()),
        tool.clone(),
    )
    .with_reconnect_wait(Duration::from_millis(100));
    let (shutdown, _) = broadcast::channel(1);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(shutdown).await })
    };

    let checksum = ChecksumId::from_remote(REMOTE);
    wait_until(LIMIT, "bootstrap sync", || tool.finished() >= 1).await;
    assert!(home.path().join(".sync").is_dir());
    assert!(home
        .path()
        .join(".sync")
        .join(format!("alpha.{checksum}.filters.txt"))
        .is_file());
    assert_eq!(
        bus.bindings(&exchange_name(&checksum)),
        vec![queue_name("alpha", &checksum)]
    );

    bus.sever();
    wait_until(LIMIT, "reconnect", || bus.connections() >= 2).await;
    wait_until(LIMIT, "second bootstrap sync", || tool.finished() >= 2).await;
    assert!(bus.has_exchange(&exchange_name(&checksum)));
    assert_eq!(tool.overlaps(), 0);

    shutdown.send(()).unwrap();
    timeout(LIMIT, handle)
        .await
        .expect("stops on shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn refused_connections_are_retried_until_the_broker_is_back() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let bus = MemoryBus::new();
    bus.refuse_connections(true);
    let tool = Arc::new(ScriptedTool::default());

    let orchestrator = Orchestrator::new(
        config_for("alpha", local.path()),
        HostEnv::new("alpha", home.path()),
        Arc::new(bus.clone()),
        tool.clone(),
    )
    .with_reconnect_wait(Duration::from_millis(50));
    let (shutdown, _) = broadcast::channel(1);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(bus.connections(), 0);
    assert_eq!(tool.count(), 0, "no folder starts without a connection");

    bus.refuse_connections(false);
    wait_until(LIMIT, "connection", || bus.connections() == 1).await;
    wait_until(LIMIT, "bootstrap sync", || tool.finished() >= 1).await;

    shutdown.send(()).unwrap();
    timeout(LIMIT, handle)
        .await
        .expect("stops on shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn folder_that_cannot_be_watched_is_restarted_after_the_wait() {
    let home = TempDir::new().unwrap();
    let parent = TempDir::new().unwrap();
    let local = parent.path().join("mounted-later");
    let bus = MemoryBus::new();
    let tool = Arc::new(ScriptedTool::default());

    let orchestrator = Orchestrator::new(
        config_for("alpha", &local),
        HostEnv::new("alpha", home.path()),
        Arc::new(bus.clone()),
        tool.clone(),
    )
    .with_reconnect_wait(Duration::from_millis(100));
    let (shutdown, _) = broadcast::channel(1);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(shutdown).await })
    };

    // Each attempt runs its startup sync, then fails to watch the root.
    wait_until(LIMIT, "restarted folder", || tool.finished() >= 2).await;

    std::fs::create_dir(&local).unwrap();
    let settled = timeout(LIMIT, async {
        loop {
            let before = tool.count();
            tokio::time::sleep(Duration::from_millis(400)).await;
            if tool.count() == before {
                break before;
            }
        }
    })
    .await
    .expect("folder stops restarting once its root exists");

    let mut changes = ChangeSet::new();
    changes.insert(ChangeKind::Create, "x.txt");
    let connection = bus.connection();
    let checksum = ChecksumId::from_remote(REMOTE);
    NotificationChannel::open(&*connection, "beta", &checksum)
        .await
        .unwrap()
        .publish(&changes)
        .await
        .unwrap();
    wait_until(LIMIT, "sync for peer change", || tool.finished() > settled).await;

    shutdown.send(()).unwrap();
    timeout(LIMIT, handle)
        .await
        .expect("stops on shutdown")
        .unwrap()
        .unwrap();
}

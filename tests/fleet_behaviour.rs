//! End-to-end fleet runs against the scripted gateway.

use std::net::Ipv4Addr;
use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use cloud_shepard::fleet::{FleetError, FleetOrchestrator, FleetSettings, InventoryOutcome};
use cloud_shepard::inventory::MappingPolicy;
use cloud_shepard::poller::PollSettings;
use cloud_shepard::progress::SilentProgress;
use cloud_shepard::test_support::{
    RecordingProgress, ScriptedGateway, active_fleet, active_instance, pending_instance,
};
use cloud_shepard::writer::FileInventoryWriter;
use cloud_shepard::FleetFile;
use rstest::*;
use tempfile::TempDir;

const FLEET: &str = r#"{
    "droplets": {
        "name": "lab",
        "hosts": [
            {"name": "web", "count": 2, "roles": ["app", "all"]},
            {"name": "db", "count": 1, "roles": ["db", "all"], "size": "2gb"}
        ]
    }
}"#;

#[fixture]
fn fleet() -> FleetFile {
    FleetFile::from_json(FLEET).expect("fleet parses")
}

fn settings() -> FleetSettings {
    FleetSettings {
        poll: PollSettings::new(Duration::from_millis(1500))
            .with_timeout(Some(Duration::from_secs(600))),
        ..FleetSettings::default()
    }
}

fn temp_root() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");
    (tmp, root)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn create_writes_inventory_file(fleet: FleetFile) {
    let (_tmp, root) = temp_root();
    let target = root.join("hosts.ini");
    let gateway = ScriptedGateway::new();
    gateway.push_listing(Vec::new());
    gateway.push_listing(vec![pending_instance("new-1")]);
    gateway.push_listing(vec![
        active_instance("new-1", Ipv4Addr::new(10, 0, 0, 1)),
        active_instance("new-2", Ipv4Addr::new(10, 0, 0, 2)),
        pending_instance("new-3"),
    ]);
    gateway.push_listing(active_fleet(3));
    let progress = RecordingProgress::new();
    let orchestrator =
        FleetOrchestrator::new(gateway.clone(), progress.clone(), FileInventoryWriter, settings());
    let plan = fleet.plan().expect("plan");
    let keys = vec![String::from("3b:16")];

    let outcome = orchestrator
        .create(
            &plan,
            fleet.selector(),
            |group| fleet.droplets.spec_for(group, &keys),
            Some(target.as_path()),
        )
        .await
        .expect("fleet converges");

    let written = Dir::open_ambient_dir(&root, ambient_authority())
        .and_then(|dir| dir.read_to_string("hosts.ini"))
        .expect("inventory written");
    assert_eq!(written, outcome.rendered);
    assert_eq!(
        written,
        "[app]\n10.0.0.1 user=root\n10.0.0.2 user=root\n\n\
         [all]\n10.0.0.1 user=root\n10.0.0.2 user=root\n10.0.0.3 user=root\n\n\
         [db]\n10.0.0.3 user=root"
    );
    let sizes = gateway
        .created()
        .into_iter()
        .map(|(_, spec)| spec.size)
        .collect::<Vec<_>>();
    assert_eq!(sizes, ["512mb", "512mb", "2gb"]);
    assert_eq!(
        progress.lines().last().map(String::as_str),
        Some("Creating 3 droplets  [ ▣▣▣ ]")
    );
    assert_eq!(gateway.list_filters().first().map(String::as_str), Some("lab"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn inventory_round_robin_wraps_short_fleet(fleet: FleetFile) {
    let gateway = ScriptedGateway::new();
    gateway.push_listing(active_fleet(2));
    let orchestrator = FleetOrchestrator::new(
        gateway,
        SilentProgress,
        FileInventoryWriter,
        FleetSettings {
            mapping_policy: MappingPolicy::RoundRobin,
            ..settings()
        },
    );
    let plan = fleet.plan().expect("plan");

    let outcome = orchestrator
        .inventory(&plan, fleet.selector(), None)
        .await
        .expect("inventory succeeds");

    let InventoryOutcome::Mapped { mapping, .. } = outcome else {
        panic!("expected mapped inventory");
    };
    assert_eq!(
        mapping.addresses("db"),
        Some([Ipv4Addr::new(10, 0, 0, 1)].as_slice())
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn second_create_is_refused_until_destroyed(fleet: FleetFile) {
    let gateway = ScriptedGateway::new();
    gateway.push_listing(active_fleet(3));
    gateway.push_listing(active_fleet(3));
    gateway.push_listing(Vec::new());
    gateway.push_listing(Vec::new());
    let orchestrator =
        FleetOrchestrator::new(gateway.clone(), SilentProgress, FileInventoryWriter, settings());
    let plan = fleet.plan().expect("plan");
    let keys: Vec<String> = Vec::new();

    let refused = orchestrator
        .create(
            &plan,
            fleet.selector(),
            |group| fleet.droplets.spec_for(group, &keys),
            None,
        )
        .await
        .expect_err("fleet already running");
    assert!(matches!(refused, FleetError::ExistingInstances { count: 3, .. }));

    let destroyed = orchestrator
        .destroy(fleet.selector())
        .await
        .expect("destroy converges");
    assert_eq!(destroyed.count(), 3);

    let outcome = orchestrator
        .inventory(&plan, fleet.selector(), None)
        .await
        .expect("inventory succeeds");
    assert_eq!(outcome, InventoryOutcome::NoInstances);
    assert_eq!(gateway.create_calls(), 0);
}

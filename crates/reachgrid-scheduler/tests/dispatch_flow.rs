//! Registration → reachability → dispatch → audit, across a small cluster.

use reach_core::{InstanceKey, RegistrationKey, RequestChannel, ServiceInstance};
use reachgrid_scheduler::{
    InstanceChangedEvent, InstanceRegistry, LogParser, Process, ProcessLog, Transition,
};

const MEMBER_1: i64 = 1;
const MEMBER_2: i64 = 2;

fn key(service: &str, ip: &str, port: u16) -> RegistrationKey {
    RegistrationKey::new(
        "public",
        "DEFAULT_GROUP",
        service,
        InstanceKey {
            cluster: String::new(),
            ip: ip.to_string(),
            port,
        },
    )
}

fn grpc_worker(ip: &str, at: i64, connection: &str) -> InstanceChangedEvent {
    InstanceChangedEvent::registered(
        key("reports", ip, 7001),
        ServiceInstance::new(ip, 7001),
        at,
        MEMBER_1,
        RequestChannel::Grpc,
    )
    .with_connection_id(connection)
}

fn http_worker(ip: &str, at: i64, udp_port: i32) -> InstanceChangedEvent {
    InstanceChangedEvent::registered(
        key("reports", ip, 8080),
        ServiceInstance::new(ip, 8080).with_udp_port(udp_port),
        at,
        MEMBER_2,
        RequestChannel::Http,
    )
}

fn ips(packings: &[std::sync::Arc<reachgrid_scheduler::InstancePacking>]) -> Vec<String> {
    packings.iter().map(|p| p.instance().ip.clone()).collect()
}

fn seeded() -> InstanceRegistry<reachgrid_scheduler::registry::MemoryRegistryStorage> {
    let registry = InstanceRegistry::in_memory();
    for event in [
        grpc_worker("10.0.0.1", 1_000, "1_17"),
        grpc_worker("10.0.0.2", 2_000, "2_4"),
        http_worker("10.0.0.3", 3_000, 9_000),
        http_worker("10.0.0.4", 4_000, 0),
        // Stream instance nobody owns yet.
        InstanceChangedEvent::registered(
            key("reports", "10.0.0.5", 7001),
            ServiceInstance::new("10.0.0.5", 7001),
            5_000,
            MEMBER_1,
            RequestChannel::Grpc,
        ),
    ] {
        registry.apply(&event).unwrap();
    }
    registry
}

#[test]
fn reachability_depends_on_member_and_channel() {
    let registry = seeded();
    assert_eq!(registry.len().unwrap(), 5);

    assert_eq!(
        ips(&registry.reachable_from(MEMBER_1).unwrap()),
        vec!["10.0.0.1", "10.0.0.3"]
    );
    assert_eq!(
        ips(&registry.reachable_from(MEMBER_2).unwrap()),
        vec!["10.0.0.2", "10.0.0.3"]
    );
    // A member with no connections still reaches UDP-capable instances.
    assert_eq!(ips(&registry.reachable_from(9).unwrap()), vec!["10.0.0.3"]);

    assert_eq!(ips(&registry.owned_by(MEMBER_2).unwrap()), vec!["10.0.0.2"]);
    assert_eq!(
        ips(&registry.owned_by(reach_core::UNKNOWN_MEMBER).unwrap()),
        vec!["10.0.0.3", "10.0.0.4", "10.0.0.5"]
    );
}

#[test]
fn dispatch_skips_instances_in_cooldown() {
    let registry = seeded();

    let first = registry
        .select_for_dispatch(MEMBER_1, "reports")
        .unwrap()
        .unwrap();
    assert_eq!(first.instance().ip, "10.0.0.1");
    let dispatching = ProcessLog::from(Transition::dispatching(Some(&first)));
    assert_eq!(dispatching.process(), Process::Dispatching);

    assert!(registry
        .report_connect_failure(first.registration_key())
        .unwrap());
    let unreachable = ProcessLog::from(Transition::unreachable(Some(&first)));
    assert!(unreachable.message().contains("10.0.0.1:7001"));

    let fallback = registry
        .select_for_dispatch(MEMBER_1, "reports")
        .unwrap()
        .unwrap();
    assert_eq!(fallback.instance().ip, "10.0.0.3");

    fallback.connect_failed();
    assert!(registry
        .select_for_dispatch(MEMBER_1, "reports")
        .unwrap()
        .is_none());
    assert!(registry
        .select_for_dispatch(MEMBER_1, "billing")
        .unwrap()
        .is_none());
}

#[test]
fn reconnect_to_another_member_moves_ownership() {
    let registry = seeded();
    let before = registry.get(&key("reports", "10.0.0.1", 7001)).unwrap().unwrap();

    registry
        .apply(&grpc_worker("10.0.0.1", 6_000, "2_31"))
        .unwrap()
        .unwrap();
    assert!(before.is_removed());
    assert!(!before.is_reachable(MEMBER_2));

    let after = registry.get(&key("reports", "10.0.0.1", 7001)).unwrap().unwrap();
    assert_eq!(after.connected_server_id(), MEMBER_2);
    assert_eq!(
        ips(&registry.reachable_from(MEMBER_1).unwrap()),
        vec!["10.0.0.3"]
    );
    // Re-registered record now sorts last.
    assert_eq!(
        ips(&registry.reachable_from(MEMBER_2).unwrap()),
        vec!["10.0.0.2", "10.0.0.3", "10.0.0.1"]
    );
}

#[test]
fn cancellation_is_audited_with_the_instance() {
    let registry = seeded();
    let target = registry.get(&key("reports", "10.0.0.2", 7001)).unwrap();

    let log = ProcessLog::cancelling(target.as_deref());
    assert_eq!(log.process(), Process::Cancelling);
    assert_eq!(
        log.message(),
        "The execution plan is being cancelled, and it has been accepted by the instance 10.0.0.2:7001."
    );

    // The instance leaves before anyone reads the log.
    let event = grpc_worker("10.0.0.2", 2_000, "2_4").deregistered();
    registry.apply(&event).unwrap();
    assert!(registry.get(&key("reports", "10.0.0.2", 7001)).unwrap().is_none());
    assert!(log.message().ends_with("instance 10.0.0.2:7001."));

    let gone = registry.get(&key("reports", "10.0.0.2", 7001)).unwrap();
    assert_eq!(
        ProcessLog::cancelling(gone.as_deref()).message(),
        "The execution plan is being cancelled, and it has been accepted by the instance unknown."
    );
}

#[test]
fn deregistration_then_purge_empties_registry() {
    let registry = seeded();
    for packing in registry.live().unwrap() {
        registry.retire(&packing).unwrap();
    }
    assert!(registry.live().unwrap().is_empty());
    assert!(registry.is_empty().unwrap());
    assert_eq!(registry.purge_removed().unwrap(), 0);
}

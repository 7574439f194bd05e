use std::net::Ipv4Addr;

use rstest::{fixture, rstest};

use super::*;
use crate::planner::HostGroup;
use crate::poller::ConvergenceSnapshot;
use crate::test_support::{active_fleet, pending_instance};

fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn group(name: &str, count: usize, roles: &[&str]) -> HostGroup {
    HostGroup::new(name, count, roles.iter().copied()).expect("valid group")
}

#[fixture]
fn web_and_db() -> ProvisioningPlan {
    ProvisioningPlan::from_groups(vec![group("web", 2, &["app"]), group("db", 1, &["db"])])
}

#[rstest]
fn slices_addresses_in_group_order(web_and_db: ProvisioningPlan) {
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(3));

    let mapping = map(&web_and_db, &snapshot, MappingPolicy::OrderedSlice);

    assert_eq!(mapping.addresses("app"), Some([ip(1), ip(2)].as_slice()));
    assert_eq!(mapping.addresses("db"), Some([ip(3)].as_slice()));
    assert_eq!(mapping.len(), 2);
}

#[rstest]
fn shared_roles_union_without_duplicates() {
    let plan = ProvisioningPlan::from_groups(vec![
        group("web", 2, &["app", "all"]),
        group("db", 1, &["db", "all"]),
    ]);
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(3));

    let mapping = map(&plan, &snapshot, MappingPolicy::OrderedSlice);

    assert_eq!(
        mapping.addresses("all"),
        Some([ip(1), ip(2), ip(3)].as_slice())
    );
    let roles = mapping.iter().map(|(role, _)| role).collect::<Vec<_>>();
    assert_eq!(roles, ["app", "all", "db"]);
}

#[rstest]
fn round_robin_cannot_repeat_an_address_within_a_role() {
    let plan = ProvisioningPlan::from_groups(vec![group("web", 4, &["app"])]);
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(2));

    let mapping = map(&plan, &snapshot, MappingPolicy::RoundRobin);

    assert_eq!(mapping.addresses("app"), Some([ip(1), ip(2)].as_slice()));
}

#[rstest]
#[case(MappingPolicy::OrderedSlice)]
#[case(MappingPolicy::RoundRobin)]
fn empty_snapshot_yields_empty_mapping(
    web_and_db: ProvisioningPlan,
    #[case] policy: MappingPolicy,
) {
    let mapping = map(&web_and_db, &ConvergenceSnapshot::default(), policy);

    assert!(mapping.is_empty());
    assert_eq!(mapping.render("root"), "");
}

#[rstest]
fn short_snapshot_leaves_tail_groups_short(web_and_db: ProvisioningPlan) {
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(1));

    let mapping = map(&web_and_db, &snapshot, MappingPolicy::OrderedSlice);

    assert_eq!(mapping.addresses("app"), Some([ip(1)].as_slice()));
    assert_eq!(mapping.addresses("db"), Some([].as_slice()));
}

#[rstest]
fn round_robin_wraps_for_tail_groups(web_and_db: ProvisioningPlan) {
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(2));

    let mapping = map(&web_and_db, &snapshot, MappingPolicy::RoundRobin);

    assert_eq!(mapping.addresses("app"), Some([ip(1), ip(2)].as_slice()));
    assert_eq!(mapping.addresses("db"), Some([ip(1)].as_slice()));
}

#[rstest]
fn instances_without_addresses_are_skipped(web_and_db: ProvisioningPlan) {
    let mut instances = active_fleet(3);
    instances.insert(1, pending_instance("p-1"));
    let snapshot = ConvergenceSnapshot::from_listing(instances);

    let mapping = map(&web_and_db, &snapshot, MappingPolicy::OrderedSlice);

    assert_eq!(mapping.addresses("app"), Some([ip(1), ip(2)].as_slice()));
    assert_eq!(mapping.addresses("db"), Some([ip(3)].as_slice()));
}

#[rstest]
fn renders_role_blocks(web_and_db: ProvisioningPlan) {
    let snapshot = ConvergenceSnapshot::from_listing(active_fleet(3));
    let mapping = map(&web_and_db, &snapshot, MappingPolicy::OrderedSlice);

    assert_eq!(
        mapping.render("root"),
        "[app]\n10.0.0.1 user=root\n10.0.0.2 user=root\n\n[db]\n10.0.0.3 user=root"
    );
}

#[rstest]
#[case("ordered-slice", MappingPolicy::OrderedSlice)]
#[case("ordered_slice", MappingPolicy::OrderedSlice)]
#[case(" Slice ", MappingPolicy::OrderedSlice)]
#[case("round-robin", MappingPolicy::RoundRobin)]
#[case("ROUND_ROBIN", MappingPolicy::RoundRobin)]
#[case("cyclic", MappingPolicy::RoundRobin)]
fn parses_policy_names(#[case] raw: &str, #[case] expected: MappingPolicy) {
    assert_eq!(raw.parse::<MappingPolicy>(), Ok(expected));
}

#[rstest]
fn unknown_policy_names_are_rejected() {
    let err = "random".parse::<MappingPolicy>().expect_err("unknown policy");
    assert_eq!(err, UnknownPolicy(String::from("random")));
    assert!(err.to_string().contains("ordered-slice"));
}

#[rstest]
fn policy_display_round_trips() {
    for policy in [MappingPolicy::OrderedSlice, MappingPolicy::RoundRobin] {
        assert_eq!(policy.to_string().parse::<MappingPolicy>(), Ok(policy));
    }
}

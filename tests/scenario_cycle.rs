use iadsc2::messages::AssignmentStatus;
use iadsc2::models::{IdRecord, WeaponRef};
use iadsc2::scenario::ScenarioConfig;
use iadsc2::simulation::SimulationEngine;

const TWO_BATTERIES: &str = r#"
meta:
  version: "1.0"
  name: "two batteries"
sim:
  dt_s: 1.0
  t_max_s: 20
  cycle_period_s: 1.0
  status_period_s: 2.0
battle_manager:
  id: { id: 1 }
  allocation: greedy
  shot_doctrine: Shoot-1
weapon_table:
  - target_type: BOMBER
    accept_any_subtype: true
    sam:
      - type: SA-10
        priority: 1
assets:
  - id: { id: 20 }
    name: BTRY-A
    lat_deg: 35.0
    lon_deg: 139.0
    max_assignments: 1
    weapons:
      - id: { id: 20, sub_id: 1 }
        category: SAM
        type: SA-10
        munitions: 4
        fire_channels: 2
        max_range_m: 150000
        intercept_speed_mps: 1200
        pk: 0.7
  - id: { id: 30 }
    name: BTRY-B
    lat_deg: 35.0
    lon_deg: 139.5
    max_assignments: 1
    weapons:
      - id: { id: 30, sub_id: 1 }
        category: SAM
        type: SA-10
        munitions: 4
        fire_channels: 2
        max_range_m: 150000
        intercept_speed_mps: 1200
        pk: 0.7
tracks:
  - id: { id: 900, sub_id: 1 }
    lat_deg: 35.4
    lon_deg: 139.2
    alt_m: 9000
    velocity_ned_mps: [-180, 0, 0]
    iff: hostile
    type: BOMBER
    priority: 1
  - id: { id: 900, sub_id: 2 }
    lat_deg: 35.4
    lon_deg: 139.3
    alt_m: 9000
    velocity_ned_mps: [-180, 0, 0]
    iff: hostile
    type: BOMBER
    priority: 2
  - id: { id: 900, sub_id: 3 }
    lat_deg: 35.5
    lon_deg: 139.25
    alt_m: 9000
    velocity_ned_mps: [-180, 0, 0]
    iff: unknown
    type: BOMBER
    priority: 3
  - id: { id: 800, sub_id: 1 }
    lat_deg: 35.2
    lon_deg: 139.25
    alt_m: 6000
    velocity_ned_mps: [0, 150, 0]
    iff: friendly
    type: BOMBER
    priority: 0
responses:
  - time_s: 3
    track: { id: 900, sub_id: 1 }
    status: Firing
  - time_s: 5
    track: { id: 900, sub_id: 1 }
    status: Kill
"#;

fn run(yaml: &str) -> SimulationEngine {
    let config = ScenarioConfig::from_yaml_str(yaml).unwrap();
    let mut engine = SimulationEngine::new(config, 0);
    engine.run().unwrap();
    engine
}

#[test]
fn test_two_batteries_engage_three_hostiles() {
    let engine = run(TWO_BATTERIES);
    let bm = engine.battle_manager();

    assert_eq!(engine.stats().kills, 1);
    assert_eq!(engine.stats().assignments, 3);
    assert!(engine.tracks().get(&IdRecord::new(900, 1)).is_none());

    let completed = bm.completed_assignments();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].track(), IdRecord::new(900, 1));
    assert_eq!(completed[0].status(), AssignmentStatus::HavcoSuccess);

    // 残る2目標はそれぞれ別の射撃ユニットが担当
    let active: Vec<_> = bm.active_assignments().collect();
    assert_eq!(active.len(), 2);
    assert_ne!(active[0].weapon().asset, active[1].weapon().asset);
    for record in &active {
        assert_eq!(record.status(), AssignmentStatus::Wilco);
    }
}

#[test]
fn test_friendly_track_is_never_assigned() {
    let engine = run(TWO_BATTERIES);
    let bm = engine.battle_manager();
    let friendly = IdRecord::new(800, 1);

    assert!(bm.assignment(&friendly).is_none());
    assert!(bm.completed_assignments().iter().all(|r| r.track() != friendly));
    assert!(engine.tracks().get(&friendly).is_some());
}

#[test]
fn test_perception_matches_unit_resources() {
    let engine = run(TWO_BATTERIES);
    for weapon in [
        WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) },
        WeaponRef { asset: IdRecord::new(30, 0), weapon: IdRecord::new(30, 1) },
    ] {
        let unit = engine.unit_assets().weapon(weapon).unwrap();
        let perceived = engine.perceived_assets().weapon(weapon).unwrap();
        assert_eq!(unit.estimated_allocated_fire_channels(), 1);
        assert_eq!(perceived.estimated_allocated_fire_channels(), unit.estimated_allocated_fire_channels());
        assert_eq!(perceived.estimated_munitions_prepped(), unit.estimated_munitions_prepped());
    }
}

#[test]
fn test_optimal_allocation_covers_every_hostile() {
    let yaml = TWO_BATTERIES
        .replace("allocation: greedy", "allocation: optimal")
        .replace("max_assignments: 1", "max_assignments: 3");
    let config = ScenarioConfig::from_yaml_str(&yaml).unwrap();
    let mut engine = SimulationEngine::new(config, 0);

    engine.step().unwrap();
    assert_eq!(engine.stats().assignments, 3);
    let bm = engine.battle_manager();
    for sub_id in 1..=3 {
        assert!(bm.assignment(&IdRecord::new(900, sub_id)).is_some());
    }

    engine.run().unwrap();
    assert_eq!(engine.stats().assignments, 3);
    assert_eq!(engine.stats().kills, 1);
}

#[test]
fn test_max_firing_time_cancels_and_reassigns() {
    let yaml = TWO_BATTERIES
        .replace("  shot_doctrine: Shoot-1\n", "  shot_doctrine: Shoot-1\n  max_firing_time_s: 3\n")
        .replace("t_max_s: 20", "t_max_s: 10");
    let yaml = match yaml.find("responses:") {
        Some(at) => yaml[..at].to_string(),
        None => yaml,
    };
    let engine = run(&yaml);
    let stats = engine.stats();

    assert!(stats.cancellations >= 2);
    assert_eq!(stats.kills, 0);
    assert!(
        engine
            .battle_manager()
            .completed_assignments()
            .iter()
            .all(|r| r.status() == AssignmentStatus::Cancelled)
    );
    assert_eq!(engine.battle_manager().active_assignments().count(), 2);
}

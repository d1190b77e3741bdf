//! Tests for the TourPlanner module

use super::*;
use crate::domain::types::ChargingPort;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Range model with a flat miles-per-charge figure, ignoring conditions
struct FixedRangeEstimator {
    miles_per_charge: f64,
    buffer: f64,
}

impl RangeEstimator for FixedRangeEstimator {
    fn estimate_range(
        &self,
        _vehicle: &Vehicle,
        battery_percent: f64,
        _conditions: &DrivingConditions,
    ) -> Result<f64, RangeError> {
        if !(0.0..=1.0).contains(&battery_percent) {
            return Err(RangeError::InvalidInput("battery".into()));
        }
        Ok(self.miles_per_charge * battery_percent)
    }

    fn energy_fraction_for(
        &self,
        _vehicle: &Vehicle,
        distance_miles: f64,
        _conditions: &DrivingConditions,
    ) -> Result<f64, RangeError> {
        if distance_miles < 0.0 {
            return Err(RangeError::InvalidInput("distance".into()));
        }
        Ok(distance_miles / self.miles_per_charge)
    }

    fn safety_buffer(&self) -> f64 {
        self.buffer
    }
}

/// Lookup over a fixed charger list that records every radius it was asked for
struct ScriptedLookup {
    chargers: Vec<Poi>,
    radii: Mutex<Vec<f64>>,
}

impl ScriptedLookup {
    fn new(chargers: Vec<Poi>) -> Self {
        Self { chargers, radii: Mutex::new(Vec::new()) }
    }

    fn radii(&self) -> Vec<f64> {
        self.radii.lock().clone()
    }
}

#[async_trait]
impl PoiLookup for ScriptedLookup {
    async fn search(
        &self,
        center: Coordinate,
        radius_miles: f64,
        category: Option<PoiCategory>,
    ) -> anyhow::Result<Vec<Poi>> {
        self.radii.lock().push(radius_miles);
        Ok(self
            .chargers
            .iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .filter(|p| geo::distance_miles(center, p.location) <= radius_miles)
            .cloned()
            .collect())
    }
}

struct OfflineLookup;

#[async_trait]
impl PoiLookup for OfflineLookup {
    async fn search(
        &self,
        _center: Coordinate,
        _radius_miles: f64,
        _category: Option<PoiCategory>,
    ) -> anyhow::Result<Vec<Poi>> {
        anyhow::bail!("poi service offline")
    }
}

fn coord(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).unwrap()
}

fn vehicle() -> Vehicle {
    Vehicle::new("m3", "Model 3", 75.0, 272.0, 0.276, [ChargingPort::Nacs]).unwrap()
}

fn sight(id: &str, lat: f64) -> Poi {
    Poi::new(id, id, PoiCategory::Landmark, coord(lat, 0.0))
}

fn charger(id: &str, lat: f64, ports: &[ChargingPort]) -> Poi {
    Poi::charger(id, id, coord(lat, 0.0), ports.iter().copied(), Some(150.0))
}

/// 100 miles per charge, no buffer; one degree of latitude is ~69 miles
fn planner() -> TourPlanner {
    TourPlanner::new(
        PlannerConfig::default(),
        Arc::new(FixedRangeEstimator { miles_per_charge: 100.0, buffer: 0.0 }),
    )
}

fn standard() -> DrivingConditions {
    DrivingConditions::standard()
}

fn sequences(tour: &Tour) -> Vec<usize> {
    tour.waypoints().iter().map(|w| w.sequence).collect()
}

#[tokio::test]
async fn test_empty_pois_is_no_route() {
    let lookup = ScriptedLookup::new(vec![]);
    let result = planner()
        .create_tour(coord(0.0, 0.0), &[], &vehicle(), 1.0, &standard(), &lookup)
        .await;
    assert!(matches!(result, Err(PlannerError::NoRouteFound)));
}

#[tokio::test]
async fn test_invalid_battery_rejected() {
    let lookup = ScriptedLookup::new(vec![]);
    let pois = vec![sight("a", 0.5)];
    for battery in [-0.1, 1.01, f64::NAN] {
        let result = planner()
            .create_tour(coord(0.0, 0.0), &pois, &vehicle(), battery, &standard(), &lookup)
            .await;
        assert!(matches!(result, Err(PlannerError::InvalidInput(_))), "battery {battery}");
    }
}

#[tokio::test]
async fn test_short_trip_needs_no_chargers() {
    let lookup = ScriptedLookup::new(vec![charger("c", 0.2, &[])]);
    let pois = vec![sight("b", 0.5), sight("a", 0.25)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Planned(plan) = outcome else {
        panic!("expected a planned tour");
    };
    assert!(plan.was_safe_without_chargers);
    assert_eq!(plan.chargers_added, 0);
    assert_eq!(sequences(&plan.tour), vec![0, 1, 2]);
    assert_eq!(plan.tour.waypoints()[0].name, "Start");
    assert_eq!(plan.tour.status(), crate::domain::tour::TourStatus::Planned);
    assert_eq!(plan.tour.waypoints()[1].poi_id, Some(PoiId::from("a")));
    assert!(lookup.radii().is_empty());
}

#[tokio::test]
async fn test_inserts_charger_between_stops() {
    let lookup = ScriptedLookup::new(vec![charger("sc", 1.1, &[ChargingPort::Nacs])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let p = planner();
    let outcome = p
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Planned(plan) = outcome else {
        panic!("expected a planned tour");
    };
    assert!(!plan.was_safe_without_chargers);
    assert_eq!(plan.chargers_added, 1);
    assert_eq!(sequences(&plan.tour), vec![0, 1, 2, 3]);
    let names: Vec<&str> = plan.tour.waypoints().iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Start", "first", "sc", "second"]);
    assert!(plan.tour.waypoints()[2].is_charging_stop);
    assert!(p.validate_tour_safety(&plan.tour, &vehicle(), 1.0, &standard()).unwrap());
}

#[tokio::test]
async fn test_charging_dwell_estimate() {
    let lookup = ScriptedLookup::new(vec![charger("sc", 1.1, &[])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let stop = &outcome.tour().waypoints()[2];
    // Arrives with ~24% after ~76 miles; 57 kWh at 150 kW plus 5 min overhead
    let dwell = stop.dwell().unwrap().as_secs_f64();
    assert!((dwell - 1668.0).abs() < 30.0, "dwell {dwell}");
    assert!(outcome.tour().waypoints()[1].dwell().is_none());
}

#[tokio::test]
async fn test_no_charger_reports_unsafe_with_segment() {
    let lookup = ScriptedLookup::new(vec![]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let p = planner();
    let outcome = p
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Unsafe(trip) = outcome else {
        panic!("expected an unsafe trip");
    };
    assert_eq!(trip.from_sequence, 1);
    assert_eq!(trip.to_sequence, 2);
    assert_eq!(trip.chargers_added, 0);
    assert!(trip.required_battery > trip.battery_at_origin);
    assert!(trip.tour.has_contiguous_sequence());
    assert_eq!(trip.tour.status(), crate::domain::tour::TourStatus::Draft);
    assert!(!p.validate_tour_safety(&trip.tour, &vehicle(), 1.0, &standard()).unwrap());
}

#[tokio::test]
async fn test_search_radius_expands_to_cap() {
    let lookup = ScriptedLookup::new(vec![]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let _ = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();
    assert_eq!(lookup.radii(), vec![10.0, 20.0, 40.0, 80.0]);
}

#[tokio::test]
async fn test_finds_charger_on_wider_radius() {
    // ~27.6 miles past the first stop: only visible from the 40 mile ring
    let lookup = ScriptedLookup::new(vec![charger("far", 1.4, &[])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();
    assert!(outcome.is_safe());
    assert_eq!(lookup.radii(), vec![10.0, 20.0, 40.0]);
}

#[tokio::test]
async fn test_incompatible_charger_skipped() {
    let lookup = ScriptedLookup::new(vec![
        charger("ccs-only", 1.05, &[ChargingPort::Ccs1]),
        charger("nacs", 1.1, &[ChargingPort::Nacs]),
    ]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();
    assert!(outcome.is_safe());
    let ids: Vec<Option<&str>> =
        outcome.tour().waypoints().iter().map(|w| w.poi_id.as_ref().map(|p| p.0.as_str())).collect();
    assert!(ids.contains(&Some("nacs")));
    assert!(!ids.contains(&Some("ccs-only")));
}

#[tokio::test]
async fn test_closest_charger_wins_with_id_tiebreak() {
    // Two chargers at the same spot: the lower id is chosen
    let lookup = ScriptedLookup::new(vec![charger("zz", 1.1, &[]), charger("aa", 1.1, &[])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();
    assert_eq!(outcome.tour().waypoints()[2].poi_id, Some(PoiId::from("aa")));
}

#[tokio::test]
async fn test_unreachable_charger_not_used() {
    // Battery at "first" is ~31%; a charger 35 miles on is out of reach
    let lookup = ScriptedLookup::new(vec![charger("beyond", 1.5, &[])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();
    assert!(!outcome.is_safe());
}

#[tokio::test]
async fn test_low_start_battery_uses_charger_behind() {
    let lookup = ScriptedLookup::new(vec![charger("behind", -0.1, &[])]);
    let pois = vec![sight("first", 1.0)];
    let outcome = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 0.2, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Planned(plan) = outcome else {
        panic!("expected a planned tour");
    };
    assert_eq!(plan.chargers_added, 1);
    let names: Vec<&str> = plan.tour.waypoints().iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Start", "behind", "first"]);
}

#[tokio::test]
async fn test_chain_of_chargers_on_long_leg() {
    // 3 degrees (~207 miles) between stops needs several chargers
    let chargers = (1..=9).map(|i| charger(&format!("c{i}"), 1.0 + i as f64 * 0.3, &[])).collect();
    let lookup = ScriptedLookup::new(chargers);
    let pois = vec![sight("first", 1.0), sight("second", 4.0)];
    let p = planner();
    let outcome = p
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Planned(plan) = outcome else {
        panic!("expected a planned tour");
    };
    assert!(plan.chargers_added >= 2);
    assert!(plan.tour.has_contiguous_sequence());
    assert_eq!(plan.tour.waypoints().last().unwrap().name, "second");
    assert!(p.validate_tour_safety(&plan.tour, &vehicle(), 1.0, &standard()).unwrap());
}

#[tokio::test]
async fn test_insertion_limit() {
    let config = PlannerConfig { max_charger_insertions: 1, ..PlannerConfig::default() };
    let p = TourPlanner::new(config, Arc::new(FixedRangeEstimator { miles_per_charge: 100.0, buffer: 0.0 }));
    let chargers = (1..=9).map(|i| charger(&format!("c{i}"), 1.0 + i as f64 * 0.3, &[])).collect();
    let lookup = ScriptedLookup::new(chargers);
    let pois = vec![sight("first", 1.0), sight("second", 4.0)];
    let outcome = p
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let PlanOutcome::Unsafe(trip) = outcome else {
        panic!("expected an unsafe trip");
    };
    assert_eq!(trip.chargers_added, 1);
    assert!(trip.tour.has_contiguous_sequence());
}

#[tokio::test]
async fn test_lookup_failure_propagates() {
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    let result = planner()
        .create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &OfflineLookup)
        .await;
    assert!(matches!(result, Err(PlannerError::Lookup(_))));
}

#[tokio::test]
async fn test_metrics_recorded() {
    let metrics = Arc::new(Metrics::new());
    let p = planner().with_metrics(metrics.clone());
    let lookup = ScriptedLookup::new(vec![charger("sc", 1.1, &[])]);
    let pois = vec![sight("first", 1.0), sight("second", 2.0)];
    p.create_tour(coord(0.0, 0.0), &pois, &vehicle(), 1.0, &standard(), &lookup)
        .await
        .unwrap();

    let summary = metrics.report();
    assert_eq!(summary.tours_planned, 1);
    assert_eq!(summary.chargers_inserted, 1);
    assert_eq!(summary.poi_lookups, 1);
}

#[test]
fn test_validate_trivial_tours() {
    let p = planner();
    let empty = Tour::new("m3", standard());
    assert!(p.validate_tour_safety(&empty, &vehicle(), 0.0, &standard()).unwrap());

    let mut single = Tour::new("m3", standard());
    single.push_waypoint(Waypoint::at(coord(0.0, 0.0), "Start"));
    assert!(p.validate_tour_safety(&single, &vehicle(), 0.5, &standard()).unwrap());
    assert!(p.validate_tour_safety(&single, &vehicle(), 2.0, &standard()).is_err());
}

#[test]
fn test_validate_after_manual_edit() {
    let p = planner();
    let mut tour = Tour::new("m3", standard());
    tour.push_waypoint(Waypoint::at(coord(0.0, 0.0), "Start"));
    tour.push_waypoint(Waypoint::for_poi(&sight("first", 1.0)));
    tour.push_waypoint(Waypoint::for_poi(&sight("second", 2.0)));
    assert!(!p.validate_tour_safety(&tour, &vehicle(), 1.0, &standard()).unwrap());

    tour.insert_waypoint(2, Waypoint::for_poi(&charger("manual", 1.2, &[])));
    assert!(tour.has_contiguous_sequence());
    assert!(p.validate_tour_safety(&tour, &vehicle(), 1.0, &standard()).unwrap());
}

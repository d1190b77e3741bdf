//! Integration tests for the narration queue under concurrent use

use async_trait::async_trait;
use ev_tour_core::domain::narration::{Narration, NarrationStatus};
use ev_tour_core::domain::tour::{Tour, Waypoint};
use ev_tour_core::domain::types::{Coordinate, DrivingConditions, Poi, PoiCategory, PoiId};
use ev_tour_core::infra::{Metrics, NarrationConfig};
use ev_tour_core::io::{ContentError, ContentGenerator};
use ev_tour_core::services::{DirectorAction, NarrationDirector, NarrationQueue, QueueError};
use std::collections::HashSet;
use std::sync::Arc;

fn narration(i: usize) -> Narration {
    let name = format!("poi-{i}");
    Narration::new(PoiId(name.clone()), &name, &name, "content", 30.0)
}

/// Generator that fails for every POI in `broken`
struct FlakyGenerator {
    broken: HashSet<String>,
}

#[async_trait]
impl ContentGenerator for FlakyGenerator {
    async fn generate(
        &self,
        poi: &Poi,
        target_duration_seconds: f64,
        _interests: &[String],
    ) -> Result<Narration, ContentError> {
        if self.broken.contains(&poi.id.0) {
            return Err(ContentError::failed(poi, "upstream timeout"));
        }
        Ok(Narration::new(poi.id.clone(), &poi.name, &poi.name, "content", target_duration_seconds / 2.0))
    }
}

#[tokio::test]
async fn test_drain_returns_each_entry_once_in_order() {
    let (queue, _) = NarrationQueue::spawn(16, None);
    let batch: Vec<Narration> = (0..10).map(narration).collect();
    let expected: Vec<_> = batch.iter().map(|n| n.id).collect();
    assert_eq!(queue.enqueue(batch).await.unwrap(), 10);

    let mut drained = Vec::new();
    while let Some(n) = queue.next().await.unwrap() {
        drained.push(n.id);
        queue.update_status(n.id, NarrationStatus::Completed).await.unwrap();
    }

    assert_eq!(drained, expected);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert!(queue
        .snapshot()
        .await
        .unwrap()
        .iter()
        .all(|n| n.status == NarrationStatus::Completed && n.completed_at.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_next_hands_out_each_entry_once() {
    let (queue, _) = NarrationQueue::spawn(64, None);
    let batch: Vec<Narration> = (0..5).map(narration).collect();
    let ids: HashSet<_> = batch.iter().map(|n| n.id).collect();
    queue.enqueue(batch).await.unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let q = queue.clone();
            tokio::spawn(async move { q.next().await })
        })
        .collect();

    let mut started = Vec::new();
    let mut empty = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(Some(n)) => started.push(n.id),
            Ok(None) => empty += 1,
            Err(e) => panic!("unexpected {e}"),
        }
    }
    assert_eq!(started.len(), 5);
    assert_eq!(empty, 27);
    assert_eq!(started.iter().copied().collect::<HashSet<_>>(), ids);
    assert!(queue.current().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_guarded_start_starts_exactly_one() {
    let (queue, _) = NarrationQueue::spawn(64, None);
    queue.enqueue((0..5).map(narration).collect()).await.unwrap();
    let head = queue.peek_next().await.unwrap().unwrap().id;

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let q = queue.clone();
            tokio::spawn(async move { q.start_if_next(head).await })
        })
        .collect();

    let mut started = 0;
    let mut busy = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => started += 1,
            Err(QueueError::Busy(_)) => busy += 1,
            other => panic!("unexpected result {other:?}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(busy, 31);

    let playing = queue
        .snapshot()
        .await
        .unwrap()
        .iter()
        .filter(|n| n.status == NarrationStatus::Playing)
        .count();
    assert_eq!(playing, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_skip_and_advance_never_double_play() {
    let (queue, _) = NarrationQueue::spawn(64, None);
    let batch: Vec<Narration> = (0..20).map(narration).collect();
    let ids: Vec<_> = batch.iter().map(|n| n.id).collect();
    queue.enqueue(batch).await.unwrap();

    // One task plays through the queue while another skips every other entry
    let player = {
        let q = queue.clone();
        tokio::spawn(async move {
            let mut played = Vec::new();
            loop {
                match q.next().await {
                    Ok(Some(n)) => {
                        played.push(n.id);
                        // The skipper may have stopped it already
                        let _ = q.update_status(n.id, NarrationStatus::Completed).await;
                    }
                    Ok(None) => break,
                    Err(e) => panic!("unexpected {e}"),
                }
            }
            played
        })
    };
    let skipper = {
        let q = queue.clone();
        let targets: Vec<_> = ids.iter().copied().step_by(2).collect();
        tokio::spawn(async move {
            for id in targets {
                // Losing the race to the player is fine
                let _ = q.update_status(id, NarrationStatus::Skipped).await;
                let current = q.snapshot().await.unwrap();
                assert!(current.iter().filter(|n| n.status == NarrationStatus::Playing).count() <= 1);
            }
        })
    };

    skipper.await.unwrap();
    let played = player.await.unwrap();

    let snapshot = queue.snapshot().await.unwrap();
    assert!(snapshot.iter().all(|n| n.status.is_terminal()));
    let completed = snapshot.iter().filter(|n| n.status == NarrationStatus::Completed).count();
    let skipped = snapshot.iter().filter(|n| n.status == NarrationStatus::Skipped).count();
    assert_eq!(completed + skipped, 20);
    assert!(played.len() >= completed);

    // Played entries keep queue order
    let positions: Vec<usize> =
        played.iter().map(|id| ids.iter().position(|x| x == id).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_director_moves_past_generation_failures() {
    let metrics = Arc::new(Metrics::new());
    let (queue, _) = NarrationQueue::spawn(16, Some(metrics.clone()));
    let director = NarrationDirector::new(queue.clone(), &NarrationConfig::default());

    let coord = |lat: f64| Coordinate::new(lat, 0.0).unwrap();
    let pois: Vec<Poi> = [("a", 0.2), ("b", 0.4), ("c", 0.6)]
        .iter()
        .map(|(id, lat)| Poi::new(*id, *id, PoiCategory::Historic, coord(*lat)))
        .collect();
    let mut tour = Tour::new("m3", DrivingConditions::standard());
    tour.push_waypoint(Waypoint::at(coord(0.0), "Start"));
    for poi in &pois {
        tour.push_waypoint(Waypoint::for_poi(poi));
    }

    let generator = FlakyGenerator { broken: HashSet::from(["b".to_string()]) };
    let report = director.prepare(&tour, &pois, &generator, &[]).await.unwrap();
    assert_eq!(report.enqueued, 3);
    assert_eq!(report.pending, 2);

    // 60 s narrations at 45 mph; drive north in small steps and finish each one
    let mut started = Vec::new();
    let mut lat = 0.0;
    while lat < 0.7 {
        if let DirectorAction::Started { narration, .. } = director.on_position(coord(lat), 45.0).await.unwrap() {
            started.push(narration.poi_name.clone());
            queue.update_status(narration.id, NarrationStatus::Completed).await.unwrap();
        }
        lat += 0.01;
    }

    assert_eq!(started, vec!["a", "c"]);
    let summary = metrics.report();
    assert_eq!(summary.narrations_failed, 1);
    assert_eq!(summary.narrations_completed, 2);
}

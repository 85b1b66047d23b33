//! The driving loop: one background task per truck, stepping it toward a
//! waypoint at a fixed speed while `moving` is set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dispatch_common::Subscriber;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::truck::{Truck, TruckCollection};
use crate::waypoint::{Waypoint, WaypointCollection};

const SPEED: f64 = 5.0;
const TICK: Duration = Duration::from_millis(500);
const EMPTY_CACHE_BACKOFF: Duration = Duration::from_secs(10);

/// Per-truck `moving` flag plus a `Notify` so the driving task wakes up the
/// instant it is told to move, instead of waiting out a full tick.
struct DrivingState {
    moving: Mutex<bool>,
    notify: Notify,
}

impl DrivingState {
    fn new(initial: bool) -> Self {
        Self {
            moving: Mutex::new(initial),
            notify: Notify::new(),
        }
    }

    fn told_to_move(&self, moving: bool) {
        *self.moving.lock() = moving;
        self.notify.notify_waiters();
    }

    async fn wait_until_moving(&self) {
        loop {
            let notified = self.notify.notified();
            if *self.moving.lock() {
                return;
            }
            notified.await;
        }
    }
}

fn nearest_index(waypoints: &[Waypoint], x: f64, y: f64) -> usize {
    waypoints
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = (a.x - x).powi(2) + (a.y - y).powi(2);
            let db = (b.x - x).powi(2) + (b.y - y).powi(2);
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

async fn drive(
    tid: String,
    mut truck: Truck,
    waypoints: Arc<RwLock<Vec<Waypoint>>>,
    state: Arc<DrivingState>,
    trucks: Arc<TruckCollection>,
) {
    let mut target_wpi: Option<usize> = None;

    loop {
        state.wait_until_moving().await;

        let wps = waypoints.read().clone();
        if wps.is_empty() {
            dispatch_log::log_debug!("no waypoints yet for tid={tid}, truck seq={}", truck.seq);
            tokio::time::sleep(EMPTY_CACHE_BACKOFF).await;
            continue;
        }

        if target_wpi.map(|i| i >= wps.len()).unwrap_or(true) {
            target_wpi = Some(nearest_index(&wps, truck.x, truck.y));
        }
        let target = &wps[target_wpi.unwrap()];

        let dx = target.x - truck.x;
        let dy = target.y - truck.y;
        let distance = (dx * dx + dy * dy).sqrt();

        let (new_x, new_y) = if distance <= SPEED {
            target_wpi = Some((target_wpi.unwrap() + 1) % wps.len());
            (target.x, target.y)
        } else {
            let step = SPEED / distance;
            (truck.x + dx * step, truck.y + dy * step)
        };

        match trucks
            .move_truck(&tid, truck.seq, truck.id, new_x, new_y)
            .await
        {
            Ok(updated) => truck = updated,
            Err(err) => {
                dispatch_log::log_error!(
                    "driving loop for tid={tid} truck seq={} stopped: {err}",
                    truck.seq
                );
                return;
            }
        }

        tokio::time::sleep(TICK).await;
    }
}

/// Keeps `cache` in sync with the waypoint collection's events.
struct WaypointCacheSubscriber {
    cache: Arc<RwLock<Vec<Waypoint>>>,
}

impl Subscriber<Waypoint> for WaypointCacheSubscriber {
    fn epoch(&mut self, _ccn: i64) -> bool {
        false
    }
    fn member_created(&mut self, _ccn: i64, member: &Waypoint) -> bool {
        self.cache.write().push(member.clone());
        false
    }
    fn member_updated(&mut self, _ccn: i64, member: &Waypoint) -> bool {
        let mut cache = self.cache.write();
        if let Some(existing) = cache.iter_mut().find(|w| w.id == member.id) {
            *existing = member.clone();
        }
        false
    }
    fn member_deleted(&mut self, _ccn: i64, id: &Uuid) -> bool {
        self.cache.write().retain(|w| &w.id != id);
        false
    }
}

/// Spawns driving tasks for existing trucks and as new ones are created;
/// retargets a truck's `DrivingState` whenever it is updated.
struct TruckSupervisor {
    tid: String,
    waypoints: Arc<RwLock<Vec<Waypoint>>>,
    trucks: Arc<TruckCollection>,
    states: Arc<Mutex<HashMap<Uuid, Arc<DrivingState>>>>,
}

impl Subscriber<Truck> for TruckSupervisor {
    fn epoch(&mut self, _ccn: i64) -> bool {
        false
    }
    fn member_created(&mut self, _ccn: i64, member: &Truck) -> bool {
        let state = Arc::new(DrivingState::new(member.moving));
        self.states.lock().insert(member.id, state.clone());
        tokio::spawn(drive(
            self.tid.clone(),
            member.clone(),
            self.waypoints.clone(),
            state,
            self.trucks.clone(),
        ));
        false
    }
    fn member_updated(&mut self, _ccn: i64, member: &Truck) -> bool {
        if let Some(state) = self.states.lock().get(&member.id) {
            state.told_to_move(member.moving);
        }
        false
    }
    fn member_deleted(&mut self, _ccn: i64, id: &Uuid) -> bool {
        self.states.lock().remove(id);
        false
    }
}

/// Start the driving loop for every truck `tid` already has, and keep it
/// running for trucks created afterward. Both `waypoints` and `trucks` must
/// already be loaded for `tid`.
pub(crate) fn kickoff(tid: String, waypoints: Arc<WaypointCollection>, trucks: Arc<TruckCollection>) {
    let cache = Arc::new(RwLock::new(
        waypoints.fetch_all().map(|(_, wps)| wps).unwrap_or_default(),
    ));
    waypoints.subscribe(WaypointCacheSubscriber {
        cache: cache.clone(),
    });

    let states: Arc<Mutex<HashMap<Uuid, Arc<DrivingState>>>> = Arc::new(Mutex::new(HashMap::new()));

    if let Ok((_, existing)) = trucks.fetch_all() {
        for truck in existing {
            let state = Arc::new(DrivingState::new(truck.moving));
            states.lock().insert(truck.id, state.clone());
            tokio::spawn(drive(tid.clone(), truck, cache.clone(), state, trucks.clone()));
        }
    }

    trucks.subscribe(TruckSupervisor {
        tid,
        waypoints: cache,
        trucks: trucks.clone(),
        states,
    });
}

#[cfg(test)]
mod tests {
    use dispatch_common::InMemoryStore;

    use super::*;
    use crate::truck::TruckRow;
    use crate::waypoint::WaypointRow;

    #[tokio::test]
    async fn truck_reaches_single_waypoint_and_moves_on() {
        let waypoints = WaypointCollection::new(Arc::new(InMemoryStore::<WaypointRow>::new()));
        let trucks = TruckCollection::new(Arc::new(InMemoryStore::<TruckRow>::new()));

        waypoints.ensure_loaded_for("t1").await.unwrap();
        trucks.ensure_loaded_for("t1").await.unwrap();

        waypoints.add_waypoint("t1", 3.0, 4.0).await.unwrap();
        let truck = trucks.add_truck("t1", 0.0, 0.0).await.unwrap();
        trucks
            .stop_truck("t1", truck.seq, truck.id, true)
            .await
            .unwrap();

        kickoff("t1".to_string(), waypoints, trucks.clone());

        let reached = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let (_, all) = trucks.fetch_all().unwrap();
                let t = all.iter().find(|t| t.id == truck.id).unwrap();
                if (t.x - 3.0).abs() < 1e-6 && (t.y - 4.0).abs() < 1e-6 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        assert!(reached.is_ok(), "truck did not reach its waypoint in time");
    }

    #[tokio::test]
    async fn stationary_truck_never_moves() {
        let waypoints = WaypointCollection::new(Arc::new(InMemoryStore::<WaypointRow>::new()));
        let trucks = TruckCollection::new(Arc::new(InMemoryStore::<TruckRow>::new()));

        waypoints.ensure_loaded_for("t1").await.unwrap();
        trucks.ensure_loaded_for("t1").await.unwrap();

        waypoints.add_waypoint("t1", 3.0, 4.0).await.unwrap();
        trucks.add_truck("t1", 0.0, 0.0).await.unwrap();

        kickoff("t1".to_string(), waypoints, trucks.clone());

        tokio::time::sleep(Duration::from_millis(700)).await;
        let (_, all) = trucks.fetch_all().unwrap();
        assert_eq!(all[0].x, 0.0);
        assert_eq!(all[0].y, 0.0);
    }
}

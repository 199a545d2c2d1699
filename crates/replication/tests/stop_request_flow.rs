//! Stop request lifecycle between a rear display and its main display,
//! with every message passed through the wire codec.

use std::time::{Duration, Instant};

use convoy_replication::{
    DeviceSession, ReplicationConfig, SessionEffect, StopOutcome,
};
use convoy_schemas::{ConvoyMessage, DeviceRole, Payload, Place, WaypointAdded};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn over_the_wire(from: DeviceRole, payload: Payload) -> Result<ConvoyMessage, Box<dyn std::error::Error>> {
    let text = ConvoyMessage::from_device(from, payload).encode()?;
    Ok(ConvoyMessage::decode(&text)?)
}

fn sent(effects: &[SessionEffect]) -> Option<Payload> {
    effects.iter().find_map(|effect| match effect {
        SessionEffect::Send(payload) => Some(payload.clone()),
        _ => None,
    })
}

#[test]
fn unanswered_request_is_auto_accepted_after_eight_seconds() -> TestResult {
    let start = Instant::now();
    let mut rear = DeviceSession::new(DeviceRole::LEAD_REAR, ReplicationConfig::default());
    let mut main = DeviceSession::new(DeviceRole::LEAD_MAIN, ReplicationConfig::default());

    let request = sent(&rear.request_stop(Place::new("X", 52.51, 13.39), start))
        .ok_or("rear did not send a request")?;
    let Payload::RequestAddWaypoint(stop) = &request else {
        return Err("wrong payload".into());
    };
    let request_id = stop.request_id.clone();

    let opened = main.handle(&over_the_wire(DeviceRole::LEAD_REAR, request)?, start);
    assert!(matches!(opened.as_slice(), [SessionEffect::PromptOpened(_)]));

    // The driver does nothing.
    assert!(main.expire_prompts(start + Duration::from_millis(7_900)).is_empty());
    let accepted = main.expire_prompts(start + Duration::from_secs(8));
    let add = accepted
        .iter()
        .find_map(|effect| match effect {
            SessionEffect::AddStop { place, request_id } => Some((place.clone(), request_id.clone())),
            _ => None,
        })
        .ok_or("main did not add the stop")?;
    assert_eq!(add.0.name, "X");
    assert_eq!(add.1.as_deref(), Some(request_id.as_str()));

    // The runtime reroutes and announces the new waypoint with the request id.
    let announced = over_the_wire(
        DeviceRole::LEAD_MAIN,
        Payload::WaypointAdded(WaypointAdded {
            request_id: add.1,
            place: add.0,
        }),
    )?;
    let settled = rear.handle(&announced, start + Duration::from_secs(8));
    assert!(settled.contains(&SessionEffect::StopSettled {
        request_id,
        place: Place::new("X", 52.51, 13.39),
        outcome: StopOutcome::Accepted,
    }));
    assert!(rear.stops().is_empty());
    assert_eq!(rear.mirror().convoy.waypoints.len(), 1);
    Ok(())
}

#[test]
fn other_vehicle_ignores_the_request() -> TestResult {
    let now = Instant::now();
    let mut rear = DeviceSession::new(DeviceRole::LEAD_REAR, ReplicationConfig::default());
    let mut trailing = DeviceSession::new(DeviceRole::TRAILING_MAIN, ReplicationConfig::default());

    let request = sent(&rear.request_stop(Place::new("X", 52.51, 13.39), now))
        .ok_or("rear did not send a request")?;
    assert!(trailing.handle(&over_the_wire(DeviceRole::LEAD_REAR, request)?, now).is_empty());
    assert!(trailing.expire_prompts(now + Duration::from_secs(30)).is_empty());
    Ok(())
}

//! OSRM provider against a local stand-in server.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::routing::get;
use axum::Json;
use convoy_nav_engine::{
    AvoidanceFlags, OsrmRouteProvider, RouteError, RouteProvider, RouteRequest, fetch_route,
};
use convoy_schemas::{LatLng, ManeuverType};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Default)]
struct Seen {
    coordinates: Option<String>,
    query: Option<String>,
}

async fn route_handler(
    State(seen): State<Arc<Mutex<Seen>>>,
    Path(coordinates): Path<String>,
    RawQuery(query): RawQuery,
) -> Json<Value> {
    let mut seen = seen.lock().await;
    seen.coordinates = Some(coordinates.clone());
    seen.query = query;

    if coordinates.starts_with("0,0") {
        return Json(json!({"code": "NoRoute", "message": "Impossible route", "routes": []}));
    }

    Json(json!({
        "code": "Ok",
        "routes": [{
            "geometry": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
            "distance": 900.0,
            "duration": 90.0,
            "legs": [
                {"distance": 400.0, "duration": 40.0, "steps": [
                    {"distance": 400.0, "duration": 40.0, "name": "First", "maneuver": {"type": "depart", "location": [-120.2, 38.5]}}
                ]},
                {"distance": 500.0, "duration": 50.0, "steps": [
                    {"distance": 500.0, "duration": 50.0, "name": "Second", "maneuver": {"type": "end of road", "modifier": "left", "location": [-120.95, 40.7]}},
                    {"distance": 0.0, "duration": 0.0, "name": "", "maneuver": {"type": "arrive", "location": [-126.453, 43.252]}}
                ]}
            ]
        }]
    }))
}

async fn spawn_osrm() -> Result<(String, Arc<Mutex<Seen>>), std::io::Error> {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route("/route/v1/driving/{coordinates}", get(route_handler))
        .with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), seen))
}

#[tokio::test]
async fn fetches_and_maps_a_two_leg_route() -> TestResult {
    let (base, seen) = spawn_osrm().await?;
    let provider = OsrmRouteProvider::new(base, std::time::Duration::from_secs(5))?;

    let request = RouteRequest::new(LatLng::new(38.5, -120.2), LatLng::new(43.252, -126.453))
        .with_waypoints(vec![LatLng::new(40.7, -120.95)])
        .with_avoidance(AvoidanceFlags {
            tolls: true,
            ..AvoidanceFlags::default()
        });
    let route = provider.get_route(&request).await?;

    assert_eq!(route.coordinates.len(), 3);
    assert_eq!(route.legs.len(), 2);
    assert_eq!(route.legs[1].steps[0].maneuver_type, ManeuverType::EndOfRoad);
    assert!((route.legs[1].steps[0].location.latitude - 40.7).abs() < 1e-9);

    let seen = seen.lock().await;
    assert_eq!(
        seen.coordinates.as_deref(),
        Some("-120.2,38.5;-120.95,40.7;-126.453,43.252")
    );
    let query = seen.query.as_deref().unwrap_or_default();
    assert!(query.contains("steps=true"));
    assert!(query.ends_with("exclude=toll"));
    Ok(())
}

#[tokio::test]
async fn service_errors_surface_as_absent_route() -> TestResult {
    let (base, _seen) = spawn_osrm().await?;
    let provider = OsrmRouteProvider::new(base, std::time::Duration::from_secs(5))?;
    let request = RouteRequest::new(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0));

    assert!(matches!(
        provider.get_route(&request).await,
        Err(RouteError::Service { .. })
    ));
    assert!(fetch_route(&provider, &request).await.is_none());
    Ok(())
}

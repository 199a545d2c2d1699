//! Route providers.
//!
//! The routing service is a black box behind [`RouteProvider`]. The OSRM
//! implementation talks to any server speaking the OSRM route API.

use std::time::Duration;

use async_trait::async_trait;
use convoy_schemas::{LatLng, Leg, ManeuverType, Modifier, Route, Step};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RouteError, RouteResult};
use crate::polyline;

/// Road classes the route should avoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceFlags {
    /// Avoid toll roads.
    pub tolls: bool,
    /// Avoid ferries.
    pub ferries: bool,
    /// Avoid highways.
    pub highways: bool,
}

impl AvoidanceFlags {
    /// Avoid every road class the dashboards exclude by default.
    pub fn all() -> Self {
        Self {
            tolls: true,
            ferries: true,
            highways: true,
        }
    }
}

/// Parameters for one route request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Start of the route.
    pub origin: LatLng,
    /// End of the route.
    pub destination: LatLng,
    /// Intermediate stops in visiting order.
    pub waypoints: Vec<LatLng>,
    /// Road classes to avoid.
    pub avoid: AvoidanceFlags,
}

impl RouteRequest {
    /// Create a direct request without waypoints or avoidance.
    pub fn new(origin: LatLng, destination: LatLng) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
            avoid: AvoidanceFlags::default(),
        }
    }

    /// Route through these stops in order.
    pub fn with_waypoints(mut self, waypoints: Vec<LatLng>) -> Self {
        self.waypoints = waypoints;
        self
    }

    /// Avoid the flagged road classes.
    pub fn with_avoidance(mut self, avoid: AvoidanceFlags) -> Self {
        self.avoid = avoid;
        self
    }

    /// Origin, waypoints and destination in visiting order.
    pub fn stops(&self) -> impl Iterator<Item = LatLng> + '_ {
        std::iter::once(self.origin)
            .chain(self.waypoints.iter().copied())
            .chain(std::iter::once(self.destination))
    }
}

/// Source of routes between stops.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn get_route(&self, request: &RouteRequest) -> RouteResult<Route>;
}

/// Fetch a route, logging and swallowing failures.
pub async fn fetch_route<P: RouteProvider + ?Sized>(
    provider: &P,
    request: &RouteRequest,
) -> Option<Route> {
    match provider.get_route(request).await {
        Ok(route) => {
            debug!(
                distance = route.distance,
                legs = route.legs.len(),
                "Route fetched"
            );
            Some(route)
        }
        Err(e) => {
            warn!(error = %e, "Route provider failed");
            None
        }
    }
}

/// Client for the OSRM `route` service.
#[derive(Debug, Clone)]
pub struct OsrmRouteProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmRouteProvider {
    /// Public OSRM demo server.
    pub const PUBLIC_BASE_URL: &'static str = "https://router.project-osrm.org";

    /// Create a provider with its own HTTP client.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RouteResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a provider sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Route service URL for a request.
    pub fn route_url(&self, request: &RouteRequest) -> String {
        let coordinates: Vec<String> = request
            .stops()
            .map(|p| format!("{},{}", p.longitude, p.latitude))
            .collect();
        let mut url = format!(
            "{}/route/v1/driving/{}?overview=full&geometries=polyline&steps=true",
            self.base_url,
            coordinates.join(";")
        );

        let excluded: Vec<&str> = [
            (request.avoid.tolls, "toll"),
            (request.avoid.ferries, "ferry"),
            (request.avoid.highways, "motorway"),
        ]
        .into_iter()
        .filter_map(|(flag, class)| flag.then_some(class))
        .collect();
        if !excluded.is_empty() {
            url.push_str("&exclude=");
            url.push_str(&excluded.join(","));
        }
        url
    }
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn get_route(&self, request: &RouteRequest) -> RouteResult<Route> {
        let url = self.route_url(request);
        debug!(%url, "Requesting route");
        let response: OsrmResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_route()
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: Option<String>,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: ManeuverType,
    #[serde(default)]
    modifier: Option<Modifier>,
    #[serde(default)]
    exit: Option<u32>,
    /// `[longitude, latitude]`.
    location: [f64; 2],
}

impl OsrmResponse {
    fn into_route(self) -> RouteResult<Route> {
        if self.code != "Ok" {
            return Err(RouteError::Service {
                status: self.code,
                message: self.message.unwrap_or_default(),
            });
        }
        let route = self.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
        let coordinates = polyline::decode(&route.geometry)?;

        let legs = route
            .legs
            .into_iter()
            .map(|leg| Leg {
                distance: leg.distance,
                duration: leg.duration,
                steps: leg.steps.into_iter().map(OsrmStep::into_step).collect(),
            })
            .collect();

        let route = Route {
            coordinates,
            distance: route.distance,
            duration: route.duration,
            legs,
        };
        route.validate()?;
        Ok(route)
    }
}

impl OsrmStep {
    fn into_step(self) -> Step {
        let [longitude, latitude] = self.maneuver.location;
        Step {
            maneuver_type: self.maneuver.kind,
            modifier: self.maneuver.modifier,
            exit_number: self.maneuver.exit,
            location: LatLng::new(latitude, longitude),
            distance: self.distance,
            duration: self.duration,
            name: self.name.filter(|n| !n.is_empty()),
        }
    }
}

/// Serves one fixed route, or fails every request when empty.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteProvider {
    route: Option<Route>,
}

impl StaticRouteProvider {
    /// Provider that always answers with `route`.
    pub fn new(route: Route) -> Self {
        Self { route: Some(route) }
    }

    /// Provider that always fails.
    pub fn unavailable() -> Self {
        Self { route: None }
    }
}

#[async_trait]
impl RouteProvider for StaticRouteProvider {
    async fn get_route(&self, _request: &RouteRequest) -> RouteResult<Route> {
        self.route.clone().ok_or(RouteError::NoRoute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn provider() -> OsrmRouteProvider {
        OsrmRouteProvider::with_client(reqwest::Client::new(), "http://osrm.local/")
    }

    #[test]
    fn test_route_url_orders_stops_lng_first() {
        let request = RouteRequest::new(LatLng::new(48.1, 11.5), LatLng::new(48.3, 11.7))
            .with_waypoints(vec![LatLng::new(48.2, 11.6)]);
        assert_eq!(
            provider().route_url(&request),
            "http://osrm.local/route/v1/driving/11.5,48.1;11.6,48.2;11.7,48.3?overview=full&geometries=polyline&steps=true"
        );
    }

    #[test]
    fn test_route_url_exclusions() {
        let request = RouteRequest::new(LatLng::new(1.0, 2.0), LatLng::new(3.0, 4.0))
            .with_avoidance(AvoidanceFlags::all());
        assert!(provider()
            .route_url(&request)
            .ends_with("&exclude=toll,ferry,motorway"));

        let request = request.with_avoidance(AvoidanceFlags {
            ferries: true,
            ..AvoidanceFlags::default()
        });
        assert!(provider().route_url(&request).ends_with("&exclude=ferry"));
    }

    #[test]
    fn test_response_maps_steps() -> TestResult {
        let response: OsrmResponse = serde_json::from_str(
            r#"{"code":"Ok","routes":[{"geometry":"_p~iF~ps|U_ulLnnqC","distance":100.0,"duration":10.0,
                "legs":[{"distance":100.0,"duration":10.0,"steps":[
                    {"distance":100.0,"duration":10.0,"name":"","maneuver":{"type":"depart","location":[-120.2,38.5]}},
                    {"distance":0.0,"duration":0.0,"name":"Main St","maneuver":{"type":"roundabout","modifier":"right","exit":2,"location":[-120.95,40.7]}}
                ]}]}]}"#,
        )?;
        let route = response.into_route()?;
        assert_eq!(route.coordinates.len(), 2);
        let steps = &route.legs[0].steps;
        assert_eq!(steps[0].name, None);
        assert!((steps[0].location.latitude - 38.5).abs() < 1e-9);
        assert_eq!(steps[1].maneuver_type, ManeuverType::Roundabout);
        assert_eq!(steps[1].exit_number, Some(2));
        assert_eq!(steps[1].name.as_deref(), Some("Main St"));
        Ok(())
    }

    #[test]
    fn test_error_code_is_reported() -> TestResult {
        let response: OsrmResponse =
            serde_json::from_str(r#"{"code":"NoRoute","message":"Impossible route"}"#)?;
        assert!(matches!(
            response.into_route(),
            Err(RouteError::Service { status, .. }) if status == "NoRoute"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_route_swallows_failure() {
        let request = RouteRequest::new(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0));
        assert!(fetch_route(&StaticRouteProvider::unavailable(), &request).await.is_none());
    }
}

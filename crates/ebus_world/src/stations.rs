use ebus_core::collaborators::{rank_stations, StationProvider};
use ebus_core::geo::haversine_miles;
use ebus_core::{ChargingStation, Constants, LatLon, LocationType, Route, StationId};

/// Offers the school charger (when the school has one), the depot, and the
/// public chargers published with the route. Detour estimates are
/// great-circle distance times the routing circuity factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteStationProvider;

impl StationProvider for RouteStationProvider {
    fn stations_for(
        &self,
        route: &Route,
        position: LatLon,
        constants: &Constants,
    ) -> Vec<ChargingStation> {
        let circuity = constants.routing_circuity_factor.max(1.0);
        let detour = |coords: LatLon| haversine_miles(position, coords) * circuity;
        let mut stations = Vec::with_capacity(route.public_chargers.len() + 2);

        if constants.school_has_charger {
            if let Some(school) = route.school_index().map(|i| route.stops[i].coords) {
                stations.push(ChargingStation {
                    id: StationId("station_school".to_string()),
                    name: "School Charger".to_string(),
                    location_type: LocationType::School,
                    coords: school,
                    rate_per_kwh: constants.school_charger_rate_per_kwh,
                    kwh_per_hour: constants.school_charger_kwh_per_hour,
                    deadhead_miles: 0.0,
                });
            }
        }

        if let Some(depot) = route.depot() {
            stations.push(ChargingStation {
                id: StationId("station_depot".to_string()),
                name: "Bus Depot".to_string(),
                location_type: LocationType::Depot,
                coords: depot,
                rate_per_kwh: constants.depot_charger_rate_per_kwh,
                kwh_per_hour: constants.depot_charger_kwh_per_hour,
                deadhead_miles: detour(depot),
            });
        }

        stations.extend(route.public_chargers.iter().map(|site| ChargingStation {
            id: site.id.clone(),
            name: site.name.clone(),
            location_type: LocationType::Public,
            coords: site.coords,
            rate_per_kwh: site.rate_per_kwh,
            kwh_per_hour: site.kwh_per_hour,
            deadhead_miles: detour(site.coords),
        }));

        rank_stations(&mut stations);
        stations
    }
}

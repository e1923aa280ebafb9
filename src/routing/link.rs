use crate::geo::Coord;

const MAPS_DIRECTIONS_URL: &str = "https://www.google.com/maps/dir/?api=1";

/// Deep link that opens walking directions in an external map viewer.
///
/// Coordinates are written as plain `lat,lng` so viewers that match the
/// literal parameter format accept them.
pub fn walking_directions_link(origin: Option<Coord>, destination: Coord) -> String {
    let mut link = String::from(MAPS_DIRECTIONS_URL);
    if let Some(origin) = origin {
        link.push_str(&format!("&origin={},{}", origin.lat, origin.lng));
    }
    link.push_str(&format!(
        "&destination={},{}&travelmode=walking",
        destination.lat, destination.lng
    ));
    link
}

//! Check-in location verification: GPS distance to the office or a
//! request IP on the office WiFi allowlist.

use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckInMethod {
    Gps,
    Wifi,
}

/// Stored method for rows written by approvals rather than a client check-in.
pub const MANUAL_METHOD: &str = "manual";

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPolicy {
    pub office_latitude: Option<f64>,
    pub office_longitude: Option<f64>,
    pub radius_meters: f64,
    pub wifi_allowlist: Vec<String>,
}

/// What the client presented at check-in.
#[derive(Debug, Clone, Copy)]
pub struct LocationClaim {
    pub method: CheckInMethod,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip: Option<IpAddr>,
}

/// Great-circle distance in metres.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

fn ipv4_in_cidr(ip: Ipv4Addr, network: Ipv4Addr, prefix: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix);
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

/// Entries are exact addresses (v4 or v6) or IPv4 CIDR blocks.
fn allowlist_entry_matches(entry: &str, ip: IpAddr) -> bool {
    let entry = entry.trim();

    if let Some((network, prefix)) = entry.split_once('/') {
        let (Ok(network), Ok(prefix), IpAddr::V4(ip)) =
            (network.parse::<Ipv4Addr>(), prefix.parse::<u32>(), ip)
        else {
            return false;
        };
        return prefix <= 32 && ipv4_in_cidr(ip, network, prefix);
    }

    entry.parse::<IpAddr>().map(|allowed| allowed == ip).unwrap_or(false)
}

impl LocationPolicy {
    pub fn ip_allowed(&self, ip: IpAddr) -> bool {
        self.wifi_allowlist
            .iter()
            .any(|entry| allowlist_entry_matches(entry, ip))
    }

    pub fn verify(&self, claim: &LocationClaim) -> AppResult<()> {
        match claim.method {
            CheckInMethod::Gps => {
                let (Some(lat), Some(lon)) = (claim.latitude, claim.longitude) else {
                    return Err(AppError::validation(
                        "latitude and longitude are required for GPS check-in",
                    ));
                };
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(AppError::validation("Coordinates out of range"));
                }

                let (Some(office_lat), Some(office_lon)) =
                    (self.office_latitude, self.office_longitude)
                else {
                    return Err(AppError::LocationRejected(
                        "office location is not configured".into(),
                    ));
                };

                let distance = haversine_meters(lat, lon, office_lat, office_lon);
                if distance > self.radius_meters {
                    return Err(AppError::LocationRejected(format!(
                        "{:.0}m from the office, allowed radius is {:.0}m",
                        distance, self.radius_meters
                    )));
                }
                Ok(())
            }
            CheckInMethod::Wifi => {
                let Some(ip) = claim.ip else {
                    return Err(AppError::LocationRejected(
                        "request address unavailable".into(),
                    ));
                };
                if self.ip_allowed(ip) {
                    Ok(())
                } else {
                    Err(AppError::LocationRejected(format!(
                        "{ip} is not on the office network"
                    )))
                }
            }
        }
    }
}

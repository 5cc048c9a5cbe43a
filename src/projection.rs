/*!
 * Reprojection between geographic WGS84 and Washington State Plane North.
 *
 * The transforms are the closed form Lambert conformal conic equations from NOAA Manual NOS NGS 5,
 * "State Plane Coordinate System of 1983" (James E. Stem, March 1990), pages 44-45 and appendix C,
 * with the defining and computed constants for zone 4601 (Washington North) baked in.
 *
 * These are only valid in approximately the Seattle City Light service territory, roughly
 * 47.4N to 47.8N and 122.2W to 122.5W. The polynomial coefficients were fitted for that small
 * region and the longitude sign handling assumes western longitudes. Don't use them anywhere else.
 */
use crate::error::UnsupportedProjection;
use geo::{coord, Point, Rect};
use std::fmt::{self, Display};

/// A coordinate reference system, identified by its well known id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// GCS_WGS_1984, longitude/latitude in degrees (wkid 4326).
    Wgs84,
    /// NAD_1983_HARN_StatePlane_Washington_North_FIPS_4601_Feet (wkid 2926).
    WashingtonNorth,
    /// Anything else. Only the identity transform is available for these.
    Other(u32),
}

impl Crs {
    pub const WGS84_WKID: u32 = 4326;
    pub const WSP83_WKID: u32 = 2926;

    /// Look up a coordinate system by well known id.
    pub fn from_wkid(wkid: u32) -> Self {
        use Crs::*;

        match wkid {
            Self::WGS84_WKID => Wgs84,
            Self::WSP83_WKID => WashingtonNorth,
            other => Other(other),
        }
    }

    /// Get the well known id.
    pub fn wkid(&self) -> u32 {
        use Crs::*;

        match self {
            Wgs84 => Self::WGS84_WKID,
            WashingtonNorth => Self::WSP83_WKID,
            Other(wkid) => *wkid,
        }
    }

    /// Is this a geographic (degree based) system?
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Crs::Wgs84 => write!(f, "WGS84 (4326)"),
            Crs::WashingtonNorth => write!(f, "WA State Plane North (2926)"),
            Crs::Other(wkid) => write!(f, "wkid {}", wkid),
        }
    }
}

/// Reproject a point.
///
/// Returns the input unchanged when `from == to`.
pub fn project(point: Point<f64>, from: Crs, to: Crs) -> Result<Point<f64>, UnsupportedProjection> {
    use Crs::*;

    if from == to {
        return Ok(point);
    }

    match (from, to) {
        (WashingtonNorth, Wgs84) => Ok(state_plane_to_wgs84(point)),
        (Wgs84, WashingtonNorth) => Ok(wgs84_to_state_plane(point)),
        _ => Err(UnsupportedProjection { from, to }),
    }
}

/// Reproject an envelope by transforming its two corners.
pub fn project_envelope(envelope: Rect<f64>, from: Crs, to: Crs) -> Result<Rect<f64>, UnsupportedProjection> {
    if from == to {
        return Ok(envelope);
    }

    let min = project(Point::from(envelope.min()), from, to)?;
    let max = project(Point::from(envelope.max()), from, to)?;

    Ok(Rect::new(
        coord! { x: min.x(), y: min.y() },
        coord! { x: max.x(), y: max.y() },
    ))
}

// Zone 4601 constants shared by both directions.
const N_VAL_AT_BO: f64 = 124292.3869; // No
const E_VAL_AT_LO: f64 = 500000.0; // Eo
const RADIUS_AT_BO: f64 = 5729486.217; // Ro
const LON_ORIGIN: f64 = 120.8333333333; // Lo
const LAT_ORIGIN: f64 = 48.1179151437; // Bo
const SIN_LAT_ORG: f64 = 0.7445203266; // sin(Bo)
const METER2FEET: f64 = 3.2808400000;

/// State plane feet (easting, northing) to WGS84 degrees (lon, lat).
fn state_plane_to_wgs84(point: Point<f64>) -> Point<f64> {
    const G1_COEFFICIENT: f64 = 8.993922319E-06;
    const G2_COEFFICIENT: f64 = -7.072700000E-15;
    const G3_COEFFICIENT: f64 = -3.673840000E-20;
    const G4_COEFFICIENT: f64 = -1.470500000E-27;

    let northing = point.y();
    let easting = point.x();

    let northing_prime = (northing / METER2FEET) - N_VAL_AT_BO;
    let easting_prime = (easting / METER2FEET) - E_VAL_AT_LO;
    let radius_prime = RADIUS_AT_BO - northing_prime;
    let gamma = (easting_prime / radius_prime).atan().to_degrees();
    let lambda = LON_ORIGIN - gamma / LAT_ORIGIN.to_radians().sin();

    let upsilon = northing_prime - easting_prime * (gamma / 2.0).to_radians().tan();
    let delta_phi = upsilon
        * (G1_COEFFICIENT
            + upsilon * (G2_COEFFICIENT + upsilon * (G3_COEFFICIENT + upsilon * G4_COEFFICIENT)));

    let phi = LAT_ORIGIN + delta_phi;

    // Longitude comes out as a magnitude, the zone is in the western hemisphere.
    Point::new(-lambda, phi)
}

/// WGS84 degrees (lon, lat) to state plane feet (easting, northing).
fn wgs84_to_state_plane(point: Point<f64>) -> Point<f64> {
    const L1_COEFFICIENT: f64 = 111186.19440;
    const L2_COEFFICIENT: f64 = 9.72145;
    const L3_COEFFICIENT: f64 = 5.61785;
    const L4_COEFFICIENT: f64 = 0.02763;

    let delta_phi = point.y() - LAT_ORIGIN;
    let upsilon = delta_phi
        * (L1_COEFFICIENT
            + delta_phi * (L2_COEFFICIENT + delta_phi * (L3_COEFFICIENT + delta_phi * L4_COEFFICIENT)));

    let radius = RADIUS_AT_BO - upsilon;

    // The sign of the longitude is dropped, it is assumed to be west.
    let gamma = (LON_ORIGIN - point.x().abs()) * SIN_LAT_ORG;

    let easting_prime = radius * gamma.to_radians().sin();
    let northing_prime = upsilon + easting_prime * (gamma / 2.0).to_radians().tan();

    let easting = (easting_prime + E_VAL_AT_LO) * METER2FEET;
    let northing = (northing_prime + N_VAL_AT_BO) * METER2FEET;

    Point::new(easting, northing)
}

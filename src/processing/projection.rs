//! Geographic (WGS84) to projected coordinate conversion selected by EPSG code

#![allow(non_snake_case, non_upper_case_globals)]

use thiserror::Error;

/// Errors raised while selecting or applying a projection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("unsupported EPSG code {0}")]
    UnsupportedEpsg(u32),
    #[error("position ({lat}, {lon}) is outside the domain of EPSG:{epsg_code}")]
    OutOfDomain { epsg_code: u32, lat: f64, lon: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    /// EPSG:4326, easting = longitude and northing = latitude
    Geographic,
    /// EPSG:3857
    WebMercator,
    /// EPSG:326zz / 327zz
    Utm { zone: u32, north: bool },
}

const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

// Krueger series for WGS84, see https://en.wikipedia.org/wiki/Universal_Transverse_Mercator_coordinate_system
const α1: f64 = 8.377318188192541E-4;
const α2: f64 = 7.608496958699166E-7;
const α3: f64 = 1.2034877875966646E-9;
const C: f64 = 0.08181919084262149; // 2*sqrt(n) / (1+n)
const D: f64 = 6_364_902.166165087; // k0 * A in meters
const E0: f64 = 500_000.0;
const N0_SOUTH: f64 = 10_000_000.0;

/// A target coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    epsg_code: u32,
    kind: Kind,
}

impl Projection {
    pub fn from_epsg(epsg_code: u32) -> Result<Self, ProjectionError> {
        let kind = match epsg_code {
            4326 => Kind::Geographic,
            3857 => Kind::WebMercator,
            32601..=32660 => Kind::Utm { zone: epsg_code - 32600, north: true },
            32701..=32760 => Kind::Utm { zone: epsg_code - 32700, north: false },
            other => return Err(ProjectionError::UnsupportedEpsg(other)),
        };
        Ok(Self { epsg_code, kind })
    }

    pub fn epsg_code(&self) -> u32 {
        self.epsg_code
    }

    /// Project a WGS84 latitude/longitude pair to (easting, northing)
    pub fn project(&self, lat: f64, lon: f64) -> Result<(f64, f64), ProjectionError> {
        let out_of_domain = || ProjectionError::OutOfDomain { epsg_code: self.epsg_code, lat, lon };

        let projected = match self.kind {
            Kind::Geographic => (lon, lat),
            Kind::WebMercator => {
                if lat.abs() > WEB_MERCATOR_MAX_LAT {
                    return Err(out_of_domain());
                }
                let x = WEB_MERCATOR_RADIUS_M * lon.to_radians();
                let y = WEB_MERCATOR_RADIUS_M
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Kind::Utm { zone, north } => {
                if !(-80.0..=84.0).contains(&lat) {
                    return Err(out_of_domain());
                }
                transverse_mercator(lat, lon, zone, north)
            }
        };

        if projected.0.is_finite() && projected.1.is_finite() {
            Ok(projected)
        } else {
            Err(out_of_domain())
        }
    }
}

fn transverse_mercator(lat_deg: f64, lon_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let φ = lat_deg.to_radians();
    let λ0 = (f64::from(zone) * 6.0 - 183.0).to_radians();
    let dλ = lon_deg.to_radians() - λ0;
    let N0 = if north { 0.0 } else { N0_SOUTH };

    let sin_φ = φ.sin();
    let t = (sin_φ.atanh() - C * (C * sin_φ).atanh()).sinh();
    let ξ = (t / dλ.cos()).atan();
    let η = (dλ.sin() / (1.0 + t * t).sqrt()).atanh();

    let easting = E0
        + D * (η
            + α1 * (2.0 * ξ).cos() * (2.0 * η).sinh()
            + α2 * (4.0 * ξ).cos() * (4.0 * η).sinh()
            + α3 * (6.0 * ξ).cos() * (6.0 * η).sinh());
    let northing = N0
        + D * (ξ
            + α1 * (2.0 * ξ).sin() * (2.0 * η).cosh()
            + α2 * (4.0 * ξ).sin() * (4.0 * η).cosh()
            + α3 * (6.0 * ξ).sin() * (6.0 * η).cosh());
    (easting, northing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_north() {
        let projection = Projection::from_epsg(32611).unwrap();
        let (e, n) = projection.project(32.7157, -117.1611).unwrap();
        assert!((e - 484_902.6).abs() < 1.0, "easting {}", e);
        assert!((n - 3_619_781.6).abs() < 1.0, "northing {}", n);

        let (e, n) = projection.project(0.0, -117.0).unwrap();
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!(n.abs() < 1e-6);
    }

    #[test]
    fn test_utm_south() {
        let projection = Projection::from_epsg(32756).unwrap();
        let (e, n) = projection.project(-33.8688, 151.2093).unwrap();
        assert!((e - 334_368.6).abs() < 1.0, "easting {}", e);
        assert!((n - 6_250_948.3).abs() < 1.0, "northing {}", n);
    }

    #[test]
    fn test_geographic_and_web_mercator() {
        let geographic = Projection::from_epsg(4326).unwrap();
        assert_eq!(geographic.project(48.1, 11.5).unwrap(), (11.5, 48.1));

        let mercator = Projection::from_epsg(3857).unwrap();
        let (x, y) = mercator.project(0.0, 180.0).unwrap();
        assert!((x - 20_037_508.34).abs() < 0.01);
        assert!(y.abs() < 1e-6);
        assert!(mercator.project(89.0, 0.0).is_err());
    }

    #[test]
    fn test_unsupported_epsg() {
        assert_eq!(Projection::from_epsg(2193), Err(ProjectionError::UnsupportedEpsg(2193)));
        assert!(Projection::from_epsg(32600).is_err());
        assert!(Projection::from_epsg(32761).is_err());
    }

    #[test]
    fn test_utm_domain() {
        let projection = Projection::from_epsg(32633).unwrap();
        assert!(matches!(
            projection.project(85.0, 15.0),
            Err(ProjectionError::OutOfDomain { epsg_code: 32633, .. })
        ));
    }
}

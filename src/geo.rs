//! Geospatial scoring: (longitude, latitude) pairs are interleaved into a
//! 52-bit cell id stored as a sorted-set score. Distances use the
//! Haversine formula on a spherical earth.

/// Bits per coordinate.
const STEP: u32 = 26;

/// The sphere radius used for distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;
pub const LAT_MIN: f64 = -85.051_128_78;
pub const LAT_MAX: f64 = 85.051_128_78;

/// Spread the low 26 bits of `x` into the even bit positions.
fn spread(x: u32) -> u64 {
    let mut x = u64::from(x) & 0x3ff_ffff;
    x = (x | (x << 16)) & 0x0000_ffff_0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

/// Collect the even bit positions of `x` back into the low 26 bits.
fn squash(x: u64) -> u32 {
    let mut x = x & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff_0000_ffff;
    x = (x | (x >> 16)) & 0xffff_ffff;
    u32::try_from(x).expect("squashed to 32 bits")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(value: f64, min: f64, max: f64) -> u32 {
    let unit = (value - min) / (max - min);
    let cell = unit * f64::from(1u32 << STEP);
    (cell as u32).min((1 << STEP) - 1)
}

/// Encode a coordinate pair into its 52-bit cell id. `None` when out of
/// the indexable range.
pub fn encode(longitude: f64, latitude: f64) -> Option<u64> {
    if !(LON_MIN..=LON_MAX).contains(&longitude) || !(LAT_MIN..=LAT_MAX).contains(&latitude) {
        return None;
    }
    let lat = spread(scale(latitude, LAT_MIN, LAT_MAX));
    let lon = spread(scale(longitude, LON_MIN, LON_MAX));
    Some(lat | (lon << 1))
}

/// Decode a cell id back to the center of its cell.
pub fn decode(bits: u64) -> (f64, f64) {
    let lat_cell = f64::from(squash(bits));
    let lon_cell = f64::from(squash(bits >> 1));
    let span = f64::from(1u32 << STEP);
    let longitude = LON_MIN + (lon_cell + 0.5) / span * (LON_MAX - LON_MIN);
    let latitude = LAT_MIN + (lat_cell + 0.5) / span * (LAT_MAX - LAT_MIN);
    (longitude, latitude)
}

/// Great-circle distance between two coordinate pairs, in meters.
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlat = ((lat2 - lat1) / 2.0).sin();
    let dlon = ((lon2 - lon1).to_radians() / 2.0).sin();
    let h = dlat * dlat + lat1.cos() * lat2.cos() * dlon * dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// The standard 11 character geohash string for a coordinate pair. Unlike
/// the score encoding this uses the full ±90 latitude range.
pub fn geohash(longitude: f64, latitude: f64) -> String {
    let mut lon = (LON_MIN, LON_MAX);
    let mut lat = (-90.0f64, 90.0f64);
    let mut hash = String::with_capacity(11);
    let mut bits = 0u8;
    let mut value = 0u8;
    let mut even = true;

    while hash.len() < 11 {
        let range = if even { &mut lon } else { &mut lat };
        let target = if even { longitude } else { latitude };
        let mid = (range.0 + range.1) / 2.0;
        value <<= 1;
        if target >= mid {
            value |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            hash.push(char::from(BASE32[usize::from(value)]));
            bits = 0;
            value = 0;
        }
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    const PALERMO: (f64, f64) = (13.361_389, 38.115_556);
    const CATANIA: (f64, f64) = (15.087_269, 37.502_669);

    #[test]
    fn roundtrip_is_within_cell_error() {
        let bits = encode(PALERMO.0, PALERMO.1).unwrap();
        let (lon, lat) = decode(bits);
        assert!((lon - PALERMO.0).abs() < 0.001);
        assert!((lat - PALERMO.1).abs() < 0.001);
    }

    #[test]
    fn encode_orders_by_cell() {
        // Nearby points land in nearby cells more often than not; at
        // minimum the encoding is deterministic.
        assert_eq!(
            encode(PALERMO.0, PALERMO.1),
            encode(PALERMO.0, PALERMO.1)
        );
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(encode(181.0, 0.0).is_none());
        assert!(encode(0.0, 86.0).is_none());
        assert!(encode(-181.0, 0.0).is_none());
    }

    #[test]
    fn palermo_to_catania() {
        let meters = distance(PALERMO.0, PALERMO.1, CATANIA.0, CATANIA.1);
        assert!((meters - 166_274.151_6).abs() < 1.0, "distance {meters}");
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(distance(1.0, 2.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn known_geohashes() {
        assert_eq!(geohash(PALERMO.0, PALERMO.1), "sqc8b49rny0");
        assert_eq!(geohash(CATANIA.0, CATANIA.1), "sqdtr74hyu0");
    }
}

//! UTM zone definitions synthesised from EPSG codes.

/// Build the proj string for a WGS84 UTM code.
///
/// `326zz` is zone `zz` north and `327zz` is zone `zz` south. Returns `None`
/// for any other code, including zones outside 1..=60.
pub fn utm_proj_string(code: u32) -> Option<String> {
    let (hemisphere, zone) = (code / 100, code % 100);
    let south = match hemisphere {
        326 => false,
        327 => true,
        _ => return None,
    };
    if !(1..=60).contains(&zone) {
        return None;
    }

    let south = if south { "+south " } else { "" };
    Some(format!(
        "+proj=utm +zone={} {}+ellps=WGS84 +datum=WGS84 +units=m +no_defs",
        zone, south
    ))
}

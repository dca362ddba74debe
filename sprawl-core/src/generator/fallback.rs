//! Offline descriptions used when the backend cannot produce one.

use crate::coord::Coordinate;

/// Pre-written locations, indexed by coordinate.
pub const FALLBACK_CATALOG: [&str; 10] = [
    "A dimly lit cyberpunk alleyway with flickering neon signs casting eerie shadows on the wet pavement.",
    "An abandoned tech facility with exposed wiring and broken holographic displays scattered across the floor.",
    "A corporate plaza dominated by towering megacorp buildings, their windows reflecting the neon glow of the city below.",
    "An underground data hub with rows of humming servers and the constant buzz of electronic equipment.",
    "A rooftop garden oasis in the urban sprawl, where nature fights to reclaim space from the concrete jungle.",
    "A bustling street market where vendors sell black-market tech and illegal neural implants.",
    "A derelict subway station with flickering lights and the distant sound of trains echoing through the tunnels.",
    "A high-security corporate lobby with armed guards and biometric scanners at every entrance.",
    "A hacker's den filled with multiple monitors, energy drinks, and the glow of code scrolling across screens.",
    "A polluted canal where toxic waste mixes with rainwater, creating an otherworldly luminescent effect.",
];

/// Deterministic description for `coordinate` drawn from `catalog`.
///
/// The entry is `(x * 10000 + y * 100 + z) mod len`; a district clause from
/// x and an elevation clause from y are appended. An empty catalog yields
/// only the clauses.
pub fn fallback_description<S: AsRef<str>>(coordinate: Coordinate, catalog: &[S]) -> String {
    let district = district(coordinate.x);
    let elevation = elevation(coordinate.y);

    if catalog.is_empty() {
        return format!("This location is {district} {elevation}.");
    }

    let seed = i64::from(coordinate.x) * 10_000
        + i64::from(coordinate.y) * 100
        + i64::from(coordinate.z);
    let index = seed.rem_euclid(catalog.len() as i64) as usize;
    format!(
        "{} This location is {district} {elevation}.",
        catalog[index].as_ref()
    )
}

fn district(x: i32) -> &'static str {
    match x {
        i32::MIN..=24 => "in the industrial district",
        25..=74 => "in the central business district",
        _ => "in the residential sector",
    }
}

fn elevation(y: i32) -> &'static str {
    match y {
        i32::MIN..=24 => "at street level",
        25..=74 => "on the mid-level walkways",
        _ => "on the upper levels",
    }
}

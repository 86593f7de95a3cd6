//! Device, browser and operating-system classification
//!
//! Classification is purely lexical: viewport width thresholds for the
//! device type and ordered substring matches against the user-agent string.
//! The first match wins, so the order of the tables below matters (an Edge
//! user agent also contains "Chrome" and is reported as Chrome).

pub const UNKNOWN: &str = "Unknown";

const MOBILE_MAX_WIDTH: u32 = 768;
const TABLET_MAX_WIDTH: u32 = 1024;

const BROWSERS: &[(&str, &str)] = &[
    ("Chrome", "Chrome"),
    ("Firefox", "Firefox"),
    ("Safari", "Safari"),
    ("Edge", "Edge"),
    ("Opera", "Opera"),
];

const OPERATING_SYSTEMS: &[(&str, &str)] = &[
    ("Windows", "Windows"),
    ("Mac", "macOS"),
    ("Linux", "Linux"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("iOS", "iOS"),
];

pub fn device_type(viewport_width: u32) -> &'static str {
    if viewport_width <= MOBILE_MAX_WIDTH {
        "Mobile"
    } else if viewport_width <= TABLET_MAX_WIDTH {
        "Tablet"
    } else {
        "Desktop"
    }
}

pub fn browser(user_agent: &str) -> &'static str {
    first_match(BROWSERS, user_agent)
}

pub fn operating_system(user_agent: &str) -> &'static str {
    first_match(OPERATING_SYSTEMS, user_agent)
}

fn first_match(table: &[(&str, &'static str)], user_agent: &str) -> &'static str {
    table
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN)
}

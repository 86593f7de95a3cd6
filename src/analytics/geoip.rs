//! Visitor geolocation from a MaxMind GeoLite2/GeoIP2 City database

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

/// Memory-mapped City database; cheap to clone
#[derive(Clone)]
pub struct GeoIpService {
    reader: Arc<Reader<Mmap>>,
}

impl GeoIpService {
    pub fn open(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Lookup failures and private ranges yield an empty location.
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut location = GeoLocation::default();

        let Ok(result) = self.reader.lookup(ip) else {
            return location;
        };

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            location.country_code = city.country.iso_code.map(|s| s.to_string());
            location.country_name = city.country.names.english.map(|s| s.to_string());
            location.city = city.city.names.english.map(|s| s.to_string());
        } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
            // Country-only databases share the City layout for these fields
            location.country_code = country.country.iso_code.map(|s| s.to_string());
            location.country_name = country.country.names.english.map(|s| s.to_string());
        }

        location
    }
}

impl GeoLocation {
    /// Country label stored on page views: the English name, else the ISO code
    pub fn country_label(&self) -> Option<String> {
        self.country_name
            .clone()
            .or_else(|| self.country_code.clone())
    }
}

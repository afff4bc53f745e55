//! Display strings shown by the location header, picker rows and listing
//! cards.

use crate::model::{non_empty, GeocodedAddress};
use crate::ADDRESS_NOT_AVAILABLE;

/// Canonical one-line address: street, city (or subregion, or district),
/// region and postal code, comma separated. Country is never included;
/// it only lives in the stored structure.
#[must_use]
pub fn format_address(address: &GeocodedAddress) -> String {
    let parts: Vec<&str> = [
        non_empty(address.street.as_deref()),
        address.locality(),
        non_empty(address.region.as_deref()),
        non_empty(address.postal_code.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        ADDRESS_NOT_AVAILABLE.to_string()
    } else {
        parts.join(", ")
    }
}

/// `km` is expected to be already rounded by [`crate::calculate_distance`].
#[must_use]
pub fn format_distance(km: f64) -> String {
    if !km.is_finite() || km < 0.0 {
        return "Unknown".to_string();
    }

    if km < 1.0 {
        format!("{:.0} m", (km * 1000.0).round())
    } else {
        format!("{km} km")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(street: &str, city: &str, region: &str, postal: &str) -> GeocodedAddress {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        GeocodedAddress {
            street: opt(street),
            city: opt(city),
            region: opt(region),
            postal_code: opt(postal),
            ..GeocodedAddress::default()
        }
    }

    #[test]
    fn test_format_full_address() {
        assert_eq!(
            format_address(&address("MG Road", "Delhi", "DL", "110001")),
            "MG Road, Delhi, DL, 110001"
        );
    }

    #[test]
    fn test_format_skips_missing_fields() {
        assert_eq!(format_address(&address("", "Pune", "MH", "")), "Pune, MH");
    }

    #[test]
    fn test_format_falls_back_to_subregion_then_district() {
        let mut raw = address("Ring Road", "", "DL", "");
        raw.district = Some("Lajpat Nagar".into());
        assert_eq!(format_address(&raw), "Ring Road, Lajpat Nagar, DL");

        raw.subregion = Some("South Delhi".into());
        assert_eq!(format_address(&raw), "Ring Road, South Delhi, DL");
    }

    #[test]
    fn test_format_excludes_country() {
        let mut raw = address("", "Mumbai", "", "");
        raw.country = Some("India".into());
        assert_eq!(format_address(&raw), "Mumbai");
    }

    #[test]
    fn test_format_empty_address() {
        assert_eq!(format_address(&GeocodedAddress::default()), ADDRESS_NOT_AVAILABLE);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.45), "450 m");
        assert_eq!(format_distance(0.0), "0 m");
        assert_eq!(format_distance(2.3), "2.3 km");
        assert_eq!(format_distance(1.0), "1 km");
        assert_eq!(format_distance(1155.4), "1155.4 km");
        assert_eq!(format_distance(f64::NAN), "Unknown");
    }
}

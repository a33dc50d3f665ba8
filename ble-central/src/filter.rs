use crate::macaddress::MacAddress;
use crate::model::ScanResult;
use std::collections::HashSet;
use uuid::Uuid;

/// The options recognized by this core, set at `Central` construction
/// (§6). Only `NoNullNames` is recognized; everything else is an
/// application-level concern.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScanOptions {
    pub no_null_names: bool,
}

/// The active scan-mode filter predicate (§4.5). Setting any mode resets
/// the others; `scan_any` carries no predicate at all.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ScanFilter {
    #[default]
    Any,
    ServiceUuids(HashSet<Uuid>),
    Names(Vec<String>),
    Addresses(Vec<MacAddress>),
}

impl ScanFilter {
    pub fn admits(&self, result: &ScanResult) -> bool {
        match self {
            ScanFilter::Any => true,
            ScanFilter::ServiceUuids(uuids) => {
                result.service_uuids.iter().any(|uuid| uuids.contains(uuid))
            }
            ScanFilter::Names(names) => match &result.name {
                Some(name) => names.iter().any(|pattern| name.contains(pattern.as_str())),
                None => false,
            },
            ScanFilter::Addresses(addresses) => addresses.contains(&result.address),
        }
    }
}

/// Q5: a scan result is delivered to the application iff the active filter
/// admits it and (when set) `NoNullNames` does not reject an absent name.
pub fn admits_for_application(
    filter: &ScanFilter,
    options: ScanOptions,
    result: &ScanResult,
) -> bool {
    if options.no_null_names && result.name.is_none() {
        return false;
    }
    filter.admits(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn result_with(name: Option<&str>, uuids: Vec<Uuid>, address: &str) -> ScanResult {
        ScanResult::new(
            MacAddress::from_str(address).unwrap(),
            name.map(str::to_string),
            uuids,
        )
    }

    #[test]
    fn any_admits_everything() {
        let result = result_with(None, vec![], "00:43:A8:23:10:F0");
        assert!(ScanFilter::Any.admits(&result));
    }

    #[test]
    fn service_uuid_filter_rejects_mismatch() {
        let wanted: Uuid = "00001810-0000-1000-8000-00805f9b34fb".parse().unwrap();
        let advertised: Uuid = "00001809-0000-1000-8000-00805f9b34fb".parse().unwrap();
        let filter = ScanFilter::ServiceUuids([wanted].into_iter().collect());
        let result = result_with(None, vec![advertised], "44:33:22:11:99:77");
        assert!(!filter.admits(&result));
    }

    #[test]
    fn service_uuid_filter_accepts_match() {
        let wanted: Uuid = "00001810-0000-1000-8000-00805f9b34fb".parse().unwrap();
        let filter = ScanFilter::ServiceUuids([wanted].into_iter().collect());
        let result = result_with(None, vec![wanted], "12:34:56:65:43:21");
        assert!(filter.admits(&result));
    }

    #[test]
    fn name_filter_matches_substring_case_sensitively() {
        let filter = ScanFilter::Names(vec!["Beurer".to_string()]);
        let matching = result_with(Some("Beurer BM57"), vec![], "12:34:56:65:43:21");
        let non_matching = result_with(Some("beurer bm57"), vec![], "12:34:56:65:43:21");
        assert!(filter.admits(&matching));
        assert!(!filter.admits(&non_matching));
    }

    #[test]
    fn no_null_names_rejects_absent_name() {
        let result = result_with(None, vec![], "12:34:56:65:43:21");
        assert!(!admits_for_application(
            &ScanFilter::Any,
            ScanOptions { no_null_names: true },
            &result
        ));
    }
}

//! MAC vendor resolution via OUI prefix lookup.
//!
//! Ships a built-in `manuf`-format table covering the vendors this
//! fleet actually contains (network gear, cameras, broadcast equipment,
//! common workstation NICs). The table is loaded lazily on first use.

use eui48::MacAddress;
use once_cell::sync::Lazy;
use oui::OuiDatabase;

/// Built-in OUI table, Wireshark `manuf` format.
const BUILTIN_MANUF: &str = "\
00:00:0C\tCisco\tCisco Systems, Inc
00:40:8C\tAxis\tAxis Communications AB
00:1B:63\tApple\tApple, Inc.
A4:5E:60\tApple\tApple, Inc.
18:66:DA\tDell\tDell Inc.
3C:D9:2B\tHP\tHewlett Packard
00:15:5D\tMicrosoft\tMicrosoft Corporation
B8:27:EB\tRaspberry\tRaspberry Pi Foundation
DC:A6:32\tRaspberry\tRaspberry Pi Trading Ltd
00:1C:C0\tIntel\tIntel Corporate
F4:8E:38\tSamsung\tSamsung Electronics Co., Ltd
44:D9:E7\tUbiquiti\tUbiquiti Networks Inc.
24:A4:3C\tUbiquiti\tUbiquiti Networks Inc.
A0:40:A0\tNetgear\tNetgear Inc.
50:C7:BF\tTP-Link\tTP-Link Technologies Co., Ltd
44:19:B6\tHikvision\tHangzhou Hikvision Digital Technology Co., Ltd
BC:32:5F\tDahua\tZhejiang Dahua Technology Co., Ltd
00:1F:A4\tSony\tSony Corporation
08:00:23\tPanasonic\tPanasonic Communications Co., Ltd
00:80:45\tPanasonic\tPanasonic Corporation
7C:2E:0D\tBlackmagic\tBlackmagic Design
00:0B:17\tAJA\tAJA Video Systems Inc.
00:02:C7\tEvertz\tEvertz Microsystems Ltd.
00:23:B2\tGrassValley\tGrass Valley, A Belden Brand
D4:96:DF\tNewTek\tNewTek Inc.
00:0A:E7\tRoss\tRoss Video Limited
00:1B:21\tIntel\tIntel Corporate
EC:B1:D7\tBosch\tBosch Security Systems Inc.
";

static VENDOR_DB: Lazy<OuiDatabase> = Lazy::new(|| {
    OuiDatabase::new_from_str(BUILTIN_MANUF).expect("built-in OUI table is valid")
});

/// Normalize a MAC into uppercase colon-separated form. Accepts colon,
/// dash, and dot separators; returns None for anything that is not 12
/// hex digits.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let upper = digits.to_ascii_uppercase();
    Some(
        upper
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// Resolve a vendor name from a MAC address prefix.
pub fn lookup_vendor(mac: &str) -> Option<String> {
    let normalized = normalize_mac(mac)?;
    let parsed = MacAddress::parse_str(&normalized).ok()?;
    let entry = VENDOR_DB.query_by_mac(&parsed).ok()??;
    match entry.name_long {
        Some(long) if !long.is_empty() => Some(long),
        _ => Some(entry.name_short),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac_accepts_common_separators() {
        assert_eq!(
            normalize_mac("b8-27-eb-01-02-03").as_deref(),
            Some("B8:27:EB:01:02:03")
        );
        assert_eq!(
            normalize_mac("b827.eb01.0203").as_deref(),
            Some("B8:27:EB:01:02:03")
        );
        assert_eq!(
            normalize_mac("B8:27:EB:01:02:03").as_deref(),
            Some("B8:27:EB:01:02:03")
        );
    }

    #[test]
    fn test_normalize_mac_rejects_garbage() {
        assert!(normalize_mac("not-a-mac").is_none());
        assert!(normalize_mac("B8:27:EB:01:02").is_none());
        assert!(normalize_mac("").is_none());
    }

    #[test]
    fn test_lookup_known_prefix() {
        let vendor = lookup_vendor("B8:27:EB:AA:BB:CC").unwrap();
        assert!(vendor.contains("Raspberry"));
        let vendor = lookup_vendor("00:40:8c:11:22:33").unwrap();
        assert!(vendor.contains("Axis"));
    }

    #[test]
    fn test_lookup_unknown_prefix() {
        assert!(lookup_vendor("FE:ED:FA:CE:00:01").is_none());
    }
}

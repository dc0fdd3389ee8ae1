//! Parsing of the supplicant scan results.

use serde::Serialize;

use crate::net_data::Encryption;

/// A Wi-Fi network in range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedNetwork {
    pub bssid: String,
    pub frequency: u32,
    pub signal: i32,
    pub ssid: String,
    pub security: Encryption,
}

/// Classifies the `[FLAGS]` column of a scan result.
pub fn security_from_flags(flags: &str) -> Encryption {
    if flags.contains("WPA") || flags.contains("RSN") {
        Encryption::WpaWpa2
    } else if flags.contains("WEP") {
        Encryption::Wep
    } else {
        Encryption::Open
    }
}

/// Parses the tab separated `SCAN_RESULTS` table, hidden networks are
/// skipped and every SSID is reported once with its strongest signal.
pub fn parse_scan_results(raw: &str) -> Vec<ScannedNetwork> {
    let mut networks: Vec<ScannedNetwork> = Vec::new();

    for line in raw.lines().skip_while(|line| line.starts_with("bssid")) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 5 || cols[4].is_empty() {
            continue;
        }
        let (Ok(frequency), Ok(signal)) =
            (cols[1].parse::<u32>(), cols[2].parse::<i32>())
        else {
            continue;
        };

        let network = ScannedNetwork {
            bssid: cols[0].to_string(),
            frequency,
            signal,
            ssid: cols[4].to_string(),
            security: security_from_flags(cols[3]),
        };

        match networks.iter_mut().find(|n| n.ssid == network.ssid) {
            Some(known) if known.signal < network.signal => *known = network,
            Some(_) => {}
            None => networks.push(network),
        }
    }

    networks.sort_by(|a, b| b.signal.cmp(&a.signal));
    networks
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = "bssid / frequency / signal level / flags / ssid\n\
        aa:aa:aa:aa:aa:01\t2412\t-60\t[WPA2-PSK-CCMP][ESS]\tHome\n\
        aa:aa:aa:aa:aa:02\t5180\t-40\t[WPA2-PSK-CCMP][ESS]\tHome\n\
        aa:aa:aa:aa:aa:03\t2437\t-70\t[ESS]\tCafe\n\
        aa:aa:aa:aa:aa:04\t2462\t-80\t[WEP][ESS]\tOld\n\
        aa:aa:aa:aa:aa:05\t2462\t-50\t[ESS]\t\n";

    #[test]
    fn test_parse_scan_results() {
        let networks = parse_scan_results(RESULTS);

        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].ssid, "Home");
        assert_eq!(networks[0].signal, -40);
        assert_eq!(networks[0].frequency, 5180);
        assert_eq!(networks[0].security, Encryption::WpaWpa2);
        assert_eq!(networks[1].security, Encryption::Open);
        assert_eq!(networks[2].security, Encryption::Wep);
    }

    #[test]
    fn test_empty_results() {
        assert!(parse_scan_results("").is_empty());
        assert!(parse_scan_results(
            "bssid / frequency / signal level / flags / ssid\n"
        )
        .is_empty());
    }
}

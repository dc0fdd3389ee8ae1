//! Rendering of the wpa_supplicant configuration.
//!
//! The file is always regenerated from scratch: a fixed header followed by
//! one `network` block per stored Wi-Fi profile, in store order. The only
//! value carried over from the previous file is the regulatory country.

use std::fmt::Write;

use crate::net_data::{Encryption, WifiProfile};

/// Renders the complete supplicant file.
pub fn render(
    ctrl_interface: &str, country: &str, profiles: &[WifiProfile],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ctrl_interface={}", ctrl_interface);
    let _ = writeln!(out, "update_config=1");
    let _ = writeln!(out, "country={}", country);

    for profile in profiles {
        out.push('\n');
        out.push_str(&render_network(profile));
    }
    out
}

/// Renders a single `network={...}` block.
pub fn render_network(profile: &WifiProfile) -> String {
    let options = profile.effective_options();

    let mut block = String::new();
    let _ = writeln!(block, "network={{");
    let _ = writeln!(block, "\tssid=\"{}\"", profile.ssid);
    let _ = writeln!(block, "\tscan_ssid=1");
    let _ = writeln!(block, "\tpriority={}", profile.priority);

    match profile.encryption {
        Encryption::WpaWpa2 => {
            let _ = writeln!(block, "\tpsk=\"{}\"", profile.password);
        }
        Encryption::Wep => {
            let _ = writeln!(block, "\twep_key0=\"{}\"", profile.password);
            let _ = writeln!(block, "\twep_tx_keyidx=0");
        }
        Encryption::Open => {}
    }

    let _ = writeln!(block, "\tauth_alg={}", options.auth_alg);
    let _ = writeln!(block, "\tkey_mgmt={}", options.key_mgmt);
    if profile.encryption == Encryption::WpaWpa2 {
        if let Some(pairwise) = &options.pairwise {
            let _ = writeln!(block, "\tpairwise={}", pairwise);
        }
        if let Some(proto) = &options.proto {
            let _ = writeln!(block, "\tproto={}", proto);
        }
    }
    let _ = writeln!(block, "}}");
    block
}

/// Extracts the country code of an existing supplicant file.
pub fn country_from(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("country="))
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Returns `content` with its country line set to `code`, the line is
/// added at the end of the header when missing.
pub fn with_country(content: &str, code: &str) -> String {
    let country_line = format!("country={}", code);
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let mut replaced = false;
    for line in lines.iter_mut() {
        if line.trim_start().starts_with("country=") {
            *line = country_line.clone();
            replaced = true;
        }
    }

    if !replaced {
        let header_end = lines
            .iter()
            .position(|line| {
                line.trim().is_empty() || line.trim_start().starts_with("network=")
            })
            .unwrap_or(lines.len());
        lines.insert(header_end, country_line);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

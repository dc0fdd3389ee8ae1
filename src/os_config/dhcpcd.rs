//! Structured editing of the dhcpcd configuration.
//!
//! The file is parsed into a sequence of entries: a stanza is a header line
//! (`interface <name>` or `ssid <name>`) followed by its contiguous directive
//! lines, everything else is kept as raw lines. Serializing an unmodified
//! document reproduces the input byte for byte.

use anyhow::anyhow;

use crate::{error::Result, net_data::StaticIp};

/// Identifies the stanza of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StanzaMarker {
    /// Ethernet stanzas are keyed by interface name.
    Interface(String),
    /// Wi-Fi stanzas are keyed by SSID.
    Ssid(String),
}

impl StanzaMarker {
    fn header(&self) -> String {
        match self {
            StanzaMarker::Interface(name) => format!("interface {}", name),
            StanzaMarker::Ssid(ssid) => format!("ssid {}", ssid),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("interface ") {
            return Some(StanzaMarker::Interface(name.trim().to_string()));
        }
        line.strip_prefix("ssid ")
            .map(|ssid| StanzaMarker::Ssid(ssid.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Raw(String),
    Stanza { marker: StanzaMarker, lines: Vec<String> },
}

/// An in-memory dhcpcd.conf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpcdConf {
    entries: Vec<Entry>,
    trailing_newline: bool,
}

/// Converts a dotted-quad subnet mask into a prefix length by counting the
/// set bits of every octet.
pub fn mask_to_cidr(mask: &str) -> Result<u32> {
    let octets = mask
        .trim()
        .split('.')
        .map(|octet| octet.parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid subnet mask {}: {}", mask, e))?;

    if octets.len() != 4 {
        return Err(anyhow!("invalid subnet mask {}", mask));
    }
    Ok(octets.iter().map(|octet| octet.count_ones()).sum())
}

/// Renders the lines of a static stanza.
pub fn render_stanza(
    marker: &StanzaMarker, static_ip: &StaticIp,
) -> Result<Vec<String>> {
    let cidr = mask_to_cidr(&static_ip.subnet_mask)?;
    let mut lines = vec![
        marker.header(),
        format!("static ip_address={}/{}", static_ip.ip_address, cidr),
        format!("static routers={}", static_ip.default_gateway),
    ];

    let dns: Vec<&str> = [&static_ip.preferred_dns, &static_ip.alternative_dns]
        .into_iter()
        .map(|dns| dns.trim())
        .filter(|dns| !dns.is_empty())
        .collect();
    if !dns.is_empty() {
        lines.push(format!("static domain_name_servers={}", dns.join(" ")));
    }
    Ok(lines)
}

fn is_directive(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('#')
        && StanzaMarker::parse(trimmed).is_none()
}

impl DhcpcdConf {
    pub fn parse(content: &str) -> Self {
        if content.is_empty() {
            return Self { entries: vec![], trailing_newline: true };
        }

        let (body, trailing_newline) = match content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (content, false),
        };

        let mut entries = Vec::new();
        let mut lines = body.split('\n').peekable();
        while let Some(line) = lines.next() {
            let marker = match StanzaMarker::parse(line) {
                Some(marker) => marker,
                None => {
                    entries.push(Entry::Raw(line.to_string()));
                    continue;
                }
            };

            let mut stanza_lines = vec![line.to_string()];
            while let Some(next) = lines.peek() {
                if !is_directive(next) {
                    break;
                }
                stanza_lines.push(next.to_string());
                lines.next();
            }
            entries.push(Entry::Stanza { marker, lines: stanza_lines });
        }

        Self { entries, trailing_newline }
    }

    #[cfg(test)]
    pub fn contains(&self, marker: &StanzaMarker) -> bool {
        self.entries.iter().any(
            |entry| matches!(entry, Entry::Stanza { marker: m, .. } if m == marker),
        )
    }

    /// Appends a static stanza, after a blank separator line unless the
    /// file is empty.
    pub fn append(
        &mut self, marker: &StanzaMarker, static_ip: &StaticIp,
    ) -> Result<()> {
        let lines = render_stanza(marker, static_ip)?;
        if !self.entries.is_empty() {
            self.entries.push(Entry::Raw(String::new()));
        }
        self.entries.push(Entry::Stanza { marker: marker.clone(), lines });
        Ok(())
    }

    /// Removes every stanza with the given marker, together with the blank
    /// separator line preceding it. Returns the number of stanzas removed.
    pub fn remove(&mut self, marker: &StanzaMarker) -> usize {
        let mut removed = 0;
        let mut idx = 0;
        while idx < self.entries.len() {
            let matched = matches!(
                &self.entries[idx],
                Entry::Stanza { marker: m, .. } if m == marker
            );
            if !matched {
                idx += 1;
                continue;
            }

            self.entries.remove(idx);
            removed += 1;
            if idx > 0 && self.entries[idx - 1] == Entry::Raw(String::new()) {
                self.entries.remove(idx - 1);
                idx -= 1;
            }
        }
        removed
    }

    pub fn serialize(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let mut lines: Vec<&str> = Vec::new();
        for entry in &self.entries {
            match entry {
                Entry::Raw(line) => lines.push(line),
                Entry::Stanza { lines: stanza, .. } => {
                    lines.extend(stanza.iter().map(String::as_str))
                }
            }
        }

        let mut out = lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "# dhcpcd.conf\n\
        hostname\n\
        clientid\n\
        persistent\n\
        #interface eth0\n\
        #static ip_address=192.168.0.10/24\n\
        \n\
        interface wlan1\n\
        nohook wpa_supplicant\n";

    fn static_ip(mask: &str) -> StaticIp {
        StaticIp {
            ip_address: "192.168.1.50".to_string(),
            subnet_mask: mask.to_string(),
            default_gateway: "192.168.1.1".to_string(),
            preferred_dns: "8.8.8.8".to_string(),
            alternative_dns: "".to_string(),
        }
    }

    #[test]
    fn test_mask_to_cidr() {
        assert_eq!(mask_to_cidr("255.255.255.0").unwrap(), 24);
        assert_eq!(mask_to_cidr("255.255.0.0").unwrap(), 16);
        assert_eq!(mask_to_cidr("255.255.255.128").unwrap(), 25);
        assert!(mask_to_cidr("255.255.0").is_err());
        assert!(mask_to_cidr("255.300.0.0").is_err());
    }

    #[test]
    fn test_parse_serialize_preserves_bytes() {
        assert_eq!(DhcpcdConf::parse(BASE).serialize(), BASE);
        assert_eq!(DhcpcdConf::parse("").serialize(), "");
        assert_eq!(DhcpcdConf::parse("a\nb").serialize(), "a\nb");
    }

    #[test]
    fn test_commented_header_is_not_a_stanza() {
        let conf = DhcpcdConf::parse(BASE);
        assert!(!conf.contains(&StanzaMarker::Interface("eth0".to_string())));
        assert!(conf.contains(&StanzaMarker::Interface("wlan1".to_string())));
    }

    #[test]
    fn test_rendered_stanza() {
        let marker = StanzaMarker::Ssid("Home".to_string());
        let lines = render_stanza(&marker, &static_ip("255.255.255.0")).unwrap();
        assert_eq!(
            lines,
            vec![
                "ssid Home",
                "static ip_address=192.168.1.50/24",
                "static routers=192.168.1.1",
                "static domain_name_servers=8.8.8.8",
            ]
        );
    }

    #[test]
    fn test_stanza_without_dns() {
        let mut ip = static_ip("255.255.0.0");
        ip.preferred_dns.clear();
        let marker = StanzaMarker::Interface("eth0".to_string());
        let lines = render_stanza(&marker, &ip).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "static ip_address=192.168.1.50/16");
    }

    #[test]
    fn test_append_then_remove_is_identity() {
        let marker = StanzaMarker::Interface("eth0".to_string());
        let mut conf = DhcpcdConf::parse(BASE);

        conf.append(&marker, &static_ip("255.255.255.0")).unwrap();
        let appended = conf.serialize();
        assert!(appended.starts_with(BASE));
        assert!(appended.ends_with("static domain_name_servers=8.8.8.8\n"));

        let reparsed = DhcpcdConf::parse(&appended);
        assert!(reparsed.contains(&marker));

        let mut reparsed = reparsed;
        assert_eq!(reparsed.remove(&marker), 1);
        assert_eq!(reparsed.serialize(), BASE);
    }

    #[test]
    fn test_remove_leaves_other_stanzas() {
        let eth = StanzaMarker::Interface("eth0".to_string());
        let home = StanzaMarker::Ssid("Home".to_string());
        let mut conf = DhcpcdConf::parse(BASE);
        conf.append(&home, &static_ip("255.255.255.0")).unwrap();
        let with_home = conf.serialize();
        conf.append(&eth, &static_ip("255.255.255.0")).unwrap();

        assert_eq!(conf.remove(&eth), 1);
        assert_eq!(conf.serialize(), with_home);
        assert_eq!(conf.remove(&eth), 0);
    }

    #[test]
    fn test_append_to_empty_file() {
        let marker = StanzaMarker::Interface("eth0".to_string());
        let mut conf = DhcpcdConf::parse("");
        conf.append(&marker, &static_ip("255.255.255.0")).unwrap();

        let content = conf.serialize();
        assert!(content.starts_with("interface eth0\n"));
        assert!(content.ends_with("8.8.8.8\n"));

        let mut conf = DhcpcdConf::parse(&content);
        conf.remove(&marker);
        assert_eq!(conf.serialize(), "");
    }
}

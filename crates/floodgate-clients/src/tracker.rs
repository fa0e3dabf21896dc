//! Tracker URL normalization shared by the adapters.

use url::Url;

/// Reduce a set of tracker URLs to deduplicated registrable domains.
///
/// Subdomains are trimmed to the second-level label; when that label is two
/// characters or shorter (country-code registrars such as `co.uk`), the
/// domain widens to three labels so distinct registrants stay distinct.
/// Unparseable URLs and bare IP hosts pass through as-is.
#[must_use]
pub fn extract_tracker_domains<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for raw in urls {
        let Some(domain) = normalize_tracker_url(raw) else {
            continue;
        };
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

fn normalize_tracker_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Some(host.to_owned());
    }

    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    if labels.len() <= 2 {
        return Some(labels.join("."));
    }

    let second_level = labels[labels.len() - 2];
    let keep = if second_level.len() <= 2 { 3 } else { 2 };
    let start = labels.len().saturating_sub(keep);
    Some(labels[start..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomains_are_trimmed_and_deduplicated() {
        let domains = extract_tracker_domains([
            "http://tracker.example.com/announce",
            "https://tracker2.example.com/announce",
        ]);
        assert_eq!(domains, vec!["example.com"]);
    }

    #[test]
    fn short_second_level_labels_widen_to_three() {
        let domains = extract_tracker_domains([
            "http://tracker.example.co.uk/ann",
            "http://tracker2.example.co.uk/ann",
        ]);
        assert_eq!(domains, vec!["example.co.uk"]);
    }

    #[test]
    fn udp_trackers_and_ips_are_supported() {
        let domains = extract_tracker_domains([
            "udp://open.tracker.example.org:6969/announce",
            "udp://192.0.2.7:6969/announce",
        ]);
        assert_eq!(domains, vec!["example.org", "192.0.2.7"]);
    }

    #[test]
    fn bare_two_label_hosts_pass_through() {
        let domains = extract_tracker_domains(["http://example.net/announce"]);
        assert_eq!(domains, vec!["example.net"]);
    }

    #[test]
    fn garbage_urls_are_skipped() {
        let domains = extract_tracker_domains(["not a url", "http://tracker.example.com/a"]);
        assert_eq!(domains, vec!["example.com"]);
    }
}

use crate::models::attempt::ClientMetadata;
use chrono::{DateTime, Utc};
use http::HeaderMap;

const UNKNOWN: &str = "unknown";

pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

pub fn user_agent(headers: &HeaderMap) -> String {
    header_str(headers, "user-agent").unwrap_or(UNKNOWN).to_string()
}

pub fn client_metadata(headers: &HeaderMap, now: DateTime<Utc>) -> ClientMetadata {
    ClientMetadata {
        ip: client_ip(headers),
        user_agent: user_agent(headers),
        timestamp: now,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

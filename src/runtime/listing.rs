//! Normalization of container listings
//!
//! `ps --format '{{json .}}'` prints one CLI-flavored object per line with
//! everything stringly typed, while API-flavored listings come back as an
//! array with typed fields. Both end up as [`ContainerSummary`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::LABEL_ASSIGNED_PORT;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub image: String,
    pub created_at: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
}

impl ContainerSummary {
    /// Published host port, falling back to the `assignedPort` label.
    pub fn host_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .find_map(|p| p.public_port)
            .or_else(|| {
                self.labels
                    .get(LABEL_ASSIGNED_PORT)
                    .and_then(|p| p.parse().ok())
            })
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSummary {
    Api(ApiSummary),
    Cli(CliSummary),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Created {
    Epoch(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ApiSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "Image", default)]
    image: Option<String>,
    #[serde(rename = "Created", default)]
    created: Option<Created>,
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
    #[serde(rename = "Ports", default)]
    ports: Option<Vec<ApiPort>>,
}

#[derive(Debug, Deserialize)]
struct ApiPort {
    #[serde(rename = "PrivatePort", alias = "container_port")]
    private_port: u16,
    #[serde(rename = "PublicPort", alias = "host_port", default)]
    public_port: Option<u16>,
    #[serde(rename = "Type", alias = "protocol", default)]
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CliSummary {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: Option<Created>,
    #[serde(rename = "Labels", default)]
    labels: String,
    #[serde(rename = "Ports", default)]
    ports: String,
}

impl From<RawSummary> for ContainerSummary {
    fn from(raw: RawSummary) -> Self {
        match raw {
            RawSummary::Api(api) => ContainerSummary {
                id: api.id,
                name: api
                    .names
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                state: api.state.unwrap_or_default(),
                image: api.image.unwrap_or_default(),
                created_at: api.created.and_then(parse_created),
                labels: api.labels.unwrap_or_default(),
                ports: dedup_ports(
                    api.ports
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| PortMapping {
                            private_port: p.private_port,
                            public_port: p.public_port,
                            protocol: p.protocol.unwrap_or_else(|| "tcp".to_string()),
                        })
                        .collect(),
                ),
            },
            RawSummary::Cli(cli) => ContainerSummary {
                id: cli.id,
                name: cli
                    .names
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .trim_start_matches('/')
                    .to_string(),
                state: cli.state,
                image: cli.image,
                created_at: cli.created_at.and_then(parse_created),
                labels: parse_label_string(&cli.labels),
                ports: parse_port_string(&cli.ports),
            },
        }
    }
}

/// Parse listing output: a JSON array, or one JSON object per line.
pub fn parse_listing(raw: &str) -> Result<Vec<ContainerSummary>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let items: Vec<RawSummary> = serde_json::from_str(trimmed)?;
        return Ok(items.into_iter().map(ContainerSummary::from).collect());
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<RawSummary>(line)
                .map(ContainerSummary::from)
                .map_err(Into::into)
        })
        .collect()
}

fn parse_created(created: Created) -> Option<DateTime<Utc>> {
    match created {
        Created::Epoch(secs) => Utc.timestamp_opt(secs, 0).single(),
        Created::Text(text) => parse_created_text(&text),
    }
}

fn parse_created_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(secs) = text.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    // "2024-05-01 12:00:00 +0000 UTC": drop the trailing zone name
    let head: Vec<&str> = text.split_whitespace().take(3).collect();
    if head.len() == 3 {
        if let Ok(dt) = DateTime::parse_from_str(&head.join(" "), "%Y-%m-%d %H:%M:%S %z") {
            return Some(dt.with_timezone(&Utc));
        }
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_label_string(labels: &str) -> HashMap<String, String> {
    labels
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn port_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:(?:[^\s,]*):(?P<public>\d+)->)?(?P<private>\d+)/(?P<proto>[a-z]+)")
            .expect("port pattern is valid")
    })
}

/// Parse `0.0.0.0:3001->3000/tcp, :::3001->3000/tcp` style strings.
fn parse_port_string(ports: &str) -> Vec<PortMapping> {
    let mappings = ports
        .split(',')
        .filter_map(|part| {
            let caps = port_pattern().captures(part.trim())?;
            Some(PortMapping {
                private_port: caps.name("private")?.as_str().parse().ok()?,
                public_port: caps.name("public").and_then(|p| p.as_str().parse().ok()),
                protocol: caps["proto"].to_string(),
            })
        })
        .collect();
    dedup_ports(mappings)
}

/// IPv4 and IPv6 bindings of the same port show up twice.
fn dedup_ports(ports: Vec<PortMapping>) -> Vec<PortMapping> {
    let mut unique: Vec<PortMapping> = Vec::with_capacity(ports.len());
    for port in ports {
        if !unique.contains(&port) {
            unique.push(port);
        }
    }
    unique
}

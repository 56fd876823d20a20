//! Channel expansion for time-series requests
//!
//! Wildcard stream selectors cannot be sent to dataselect backends as-is
//! without risking oversized responses. A first session asks each station
//! backend for matching channels (`level=channel&format=text`); the resolved
//! channels are then requested from the same backend's dataselect service,
//! one leg per channel per time segment.

use crate::federation::splitter::split_window;
use crate::federation::{LegPayload, SessionEvent, SessionHandle, SessionSummary};
use eidafed_common::{BackendRequest, TimeWindow};
use std::collections::HashSet;
use url::Url;

/// Location code sent for channels without one
pub const EMPTY_LOCATION: &str = "--";

const DATASELECT_PATH: &str = "/fdsnws/dataselect/1/query";

/// Concrete channel identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

/// Parse the channel lines of an FDSN station text document.
///
/// Comment and blank lines are skipped, as are lines with fewer than four
/// fields.
pub fn parse_channel_lines(document: &str) -> Vec<ChannelId> {
    document
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() < 4 {
                return None;
            }
            Some(ChannelId {
                network: fields[0].to_string(),
                station: fields[1].to_string(),
                location: if fields[2].is_empty() {
                    EMPTY_LOCATION.to_string()
                } else {
                    fields[2].to_string()
                },
                channel: fields[3].to_string(),
            })
        })
        .collect()
}

/// Dataselect endpoint of the backend that served a station request
pub fn dataselect_url(station: &Url) -> Url {
    let mut url = station.clone();
    let path = station.path();
    if path.contains("/station/") {
        url.set_path(&path.replacen("/station/", "/dataselect/", 1));
    } else {
        url.set_path(DATASELECT_PATH);
    }
    url.set_query(None);
    url.set_fragment(None);
    url
}

struct BackendChannels {
    base: String,
    targets: Vec<(ChannelId, TimeWindow)>,
}

/// Accumulates resolved channels per backend, de-duplicated
#[derive(Default)]
pub struct ChannelCollector {
    backends: Vec<BackendChannels>,
    seen: HashSet<(String, ChannelId, TimeWindow)>,
}

impl ChannelCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the channels of one station response
    pub fn add(&mut self, payload: &LegPayload) {
        let Some(window) = payload.request.window().copied() else {
            tracing::warn!(
                host = payload.request.host(),
                "Channel listing without a time window, skipped"
            );
            return;
        };
        let base = dataselect_url(payload.request.url()).to_string();
        let document = String::from_utf8_lossy(&payload.body);

        for channel in parse_channel_lines(&document) {
            if !self.seen.insert((base.clone(), channel.clone(), window)) {
                continue;
            }
            let slot = match self.backends.iter().position(|b| b.base == base) {
                Some(slot) => slot,
                None => {
                    self.backends.push(BackendChannels {
                        base: base.clone(),
                        targets: Vec::new(),
                    });
                    self.backends.len() - 1
                }
            };
            self.backends[slot].targets.push((channel, window));
        }
    }

    pub fn channel_count(&self) -> usize {
        self.backends.iter().map(|b| b.targets.len()).sum()
    }

    /// One group per backend: one request per channel per time segment
    pub fn into_requests(
        self,
        max_window: chrono::Duration,
        quality: Option<&str>,
    ) -> Vec<Vec<BackendRequest>> {
        self.backends
            .into_iter()
            .map(|backend| {
                backend
                    .targets
                    .iter()
                    .flat_map(|(channel, window)| {
                        split_window(window.start, window.end, max_window)
                            .into_iter()
                            .map(move |segment| (channel, segment))
                    })
                    .filter_map(|(channel, segment)| {
                        let mut params = vec![
                            ("network", channel.network.clone()),
                            ("station", channel.station.clone()),
                            ("location", channel.location.clone()),
                            ("channel", channel.channel.clone()),
                            ("starttime", segment.start_param()),
                            ("endtime", segment.end_param()),
                        ];
                        if let Some(quality) = quality {
                            params.push(("quality", quality.to_string()));
                        }
                        BackendRequest::new(&backend.base, params)
                            .map(|request| request.with_window(segment))
                            .map_err(|e| {
                                tracing::warn!(
                                    base = %backend.base,
                                    "Skipping dataselect leg: {}",
                                    e
                                )
                            })
                            .ok()
                    })
                    .collect()
            })
            .collect()
    }
}

/// Drain a channel-listing session into a collector without writing anything
/// to the client. Returns `None` if the session was killed.
pub async fn collect_channels(
    mut session: SessionHandle,
) -> (Option<ChannelCollector>, SessionSummary) {
    let mut collector = ChannelCollector::new();
    let mut ended = false;

    while let Some(event) = session.next_event().await {
        match event {
            SessionEvent::Header => {}
            SessionEvent::Data(payload) => collector.add(&payload),
            SessionEvent::End => {
                ended = true;
                break;
            }
        }
    }

    let summary = session.finish().await;
    tracing::debug!(
        session_id = %summary.id,
        channels = collector.channel_count(),
        "Channel expansion finished"
    );
    (ended.then_some(collector), summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const CHANNELS: &str = "#Network|Station|Location|Channel|Latitude|Longitude|Elevation|Depth|Azimuth|Dip|SensorDescription|Scale|ScaleFreq|ScaleUnits|SampleRate|StartTime|EndTime\n\
NL|HGN|02|BHZ|50.76|5.93|135.0|0.0|0.0|-90.0|STS-2|1.0|1.0|M/S|40.0|2001-01-01T00:00:00|\n\
NL|HGN||HHZ|50.76|5.93|135.0|0.0|0.0|-90.0|STS-2|1.0|1.0|M/S|100.0|2001-01-01T00:00:00|\n\
NL|HGN|02|BHZ|50.76|5.93|135.0|0.0|0.0|-90.0|STS-2|1.0|1.0|M/S|40.0|1995-01-01T00:00:00|2000-12-31T00:00:00\n\
\n";

    fn station_request(window: &str) -> BackendRequest {
        let (start, end) = window.split_once('/').unwrap();
        BackendRequest::new(
            "http://node.example.org/fdsnws/station/1/query",
            [("network", "NL"), ("level", "channel"), ("format", "text")],
        )
        .unwrap()
        .with_window(TimeWindow::parse(start, end).unwrap())
    }

    fn payload(window: &str) -> LegPayload {
        LegPayload {
            request: station_request(window),
            status: 200,
            body: Bytes::from_static(CHANNELS.as_bytes()),
        }
    }

    #[test]
    fn test_parse_channel_lines() {
        let channels = parse_channel_lines(CHANNELS);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].location, "02");
        assert_eq!(channels[1].location, "--");
        assert_eq!(channels[1].channel, "HHZ");
    }

    #[test]
    fn test_dataselect_url() {
        let station =
            Url::parse("http://node.example.org/fdsnws/station/1/query?network=NL").unwrap();
        assert_eq!(
            dataselect_url(&station).as_str(),
            "http://node.example.org/fdsnws/dataselect/1/query"
        );

        let odd = Url::parse("http://node.example.org:8080/stations?x=1").unwrap();
        assert_eq!(
            dataselect_url(&odd).as_str(),
            "http://node.example.org:8080/fdsnws/dataselect/1/query"
        );
    }

    #[test]
    fn test_collector_dedups_per_backend() {
        let mut collector = ChannelCollector::new();
        collector.add(&payload("2010-01-01/2010-01-02"));
        collector.add(&payload("2010-01-01/2010-01-02"));
        assert_eq!(collector.channel_count(), 2);

        collector.add(&payload("2011-01-01/2011-01-02"));
        assert_eq!(collector.channel_count(), 4);
    }

    #[test]
    fn test_requests_per_channel_per_segment() {
        let mut collector = ChannelCollector::new();
        collector.add(&payload("2010-01-01/2010-01-10"));

        let groups = collector.into_requests(chrono::Duration::days(7), Some("D"));
        assert_eq!(groups.len(), 1);
        let requests = &groups[0];
        assert_eq!(requests.len(), 4);

        let first = &requests[0];
        assert_eq!(first.path(), "/fdsnws/dataselect/1/query");
        assert_eq!(first.param("channel").as_deref(), Some("BHZ"));
        assert_eq!(first.param("starttime").as_deref(), Some("2010-01-01T00:00:00.000000"));
        assert_eq!(first.param("endtime").as_deref(), Some("2010-01-08T00:00:00.000000"));
        assert_eq!(first.param("quality").as_deref(), Some("D"));
        assert_eq!(requests[1].param("starttime").as_deref(), Some("2010-01-08T00:00:00.000000"));
        assert_eq!(requests[3].param("location").as_deref(), Some("--"));
    }
}

//! Route bundling
//!
//! The routing service answers with one pattern per matched stream, which can
//! run into the thousands. Backends accept comma-separated code lists, so
//! patterns that share a grouping key are merged into one leg:
//!
//! - wildcard-station patterns merge their network codes when bundling across
//!   networks is allowed (coarse detail levels only, to stay under backend
//!   payload limits)
//! - everything else merges station codes within one network, optionally
//!   split further by start year
//!
//! Merged patterns keep the location and channel of the first pattern in
//! their group.

use eidafed_common::{BundledRoute, RouteEntry, StreamPattern, WILDCARD};
use std::collections::HashMap;

/// Grouping switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleOptions {
    /// Merge wildcard-station patterns of different networks
    pub across_networks: bool,
    /// Keep patterns of one network with different start years apart
    pub split_by_year: bool,
    /// Patterns carry their own time window (POST requests); only identical
    /// windows merge and the window is kept on the output pattern
    pub keep_windows: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    AnyStation,
    Network { code: String, year: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    scope: Scope,
    window: Option<(Option<String>, Option<String>)>,
}

impl GroupKey {
    fn for_pattern(pattern: &StreamPattern, options: BundleOptions) -> Self {
        let scope = if options.across_networks && pattern.is_wildcard_station() {
            Scope::AnyStation
        } else {
            Scope::Network {
                code: pattern.network.clone(),
                year: options.split_by_year.then(|| pattern.start_year()).flatten(),
            }
        };
        let window = options
            .keep_windows
            .then(|| (pattern.start.clone(), pattern.end.clone()));
        Self { scope, window }
    }
}

/// Collapse per-stream routes into per-group patterns, one entry per backend.
///
/// With `catalog_wide` set the grouping is skipped and each backend gets a
/// single `*`/`*` pattern reusing its own first location and channel.
/// Backends without patterns are dropped.
pub fn bundle_routes(
    routes: &[RouteEntry],
    options: BundleOptions,
    catalog_wide: bool,
) -> Vec<BundledRoute> {
    routes
        .iter()
        .filter(|route| !route.params.is_empty())
        .map(|route| BundledRoute {
            url: route.url.clone(),
            patterns: if catalog_wide {
                catalog_pattern(&route.params).into_iter().collect()
            } else {
                bundle_patterns(&route.params, options)
            },
        })
        .collect()
}

fn catalog_pattern(patterns: &[StreamPattern]) -> Option<StreamPattern> {
    patterns
        .first()
        .map(|first| StreamPattern::new(WILDCARD, WILDCARD, &first.location, &first.channel))
}

fn bundle_patterns(patterns: &[StreamPattern], options: BundleOptions) -> Vec<StreamPattern> {
    let mut order: Vec<StreamPattern> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for pattern in patterns {
        let key = GroupKey::for_pattern(pattern, options);
        match index.get(&key) {
            Some(&slot) => {
                let merged = &mut order[slot];
                match key.scope {
                    Scope::AnyStation => append_code(&mut merged.network, &pattern.network),
                    Scope::Network { .. } => append_code(&mut merged.station, &pattern.station),
                }
            }
            None => {
                let mut seed = pattern.clone();
                if !options.keep_windows {
                    seed.start = None;
                    seed.end = None;
                }
                index.insert(key, order.len());
                order.push(seed);
            }
        }
    }

    order
}

/// Append codes to a comma list, skipping ones already present
fn append_code(list: &mut String, codes: &str) {
    for code in codes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !list.split(',').any(|existing| existing == code) {
            list.push(',');
            list.push_str(code);
        }
    }
}

//! Snapshot computation over persisted events.
//!
//! Everything here is a pure function of the fetched rows, the exact lifetime
//! count and a clock, so it is tested without a store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::analytics::{AnalyticsSnapshot, BrowserShare, DeviceBreakdown, PageCount, RecentVisit};
use crate::event::PageView;
use crate::visitor::{is_internal_asset, DeviceType};

const TOP_BROWSERS: usize = 5;
const TOP_PAGES: usize = 10;
const RECENT_VISITS: usize = 3;

/// Knobs of the aggregation that do not come from the rows themselves.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    pub timezone: Tz,
    pub max_hourly_visits: u64,
}

/// Counter that remembers first-sighting order so rankings are deterministic:
/// equal counts keep the order in which their keys were first seen.
#[derive(Debug, Default)]
struct Tally {
    index: HashMap<String, usize>,
    counts: Vec<(String, u64)>,
}

impl Tally {
    fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.counts.len());
                self.counts.push((key.to_string(), 1));
            }
        }
    }

    fn ranked(mut self, limit: usize) -> Vec<(String, u64)> {
        // sort_by is stable, which preserves first-sighting order on ties.
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts.truncate(limit);
        self.counts
    }
}

/// Compute a snapshot from `events`, which must be ordered newest first (the
/// order [`crate::analytics::EventStore::recent_events`] returns).
///
/// `lifetime_total` is reported as `total_page_views`; the scan itself may be
/// windowed or capped and is only used for the breakdowns.
pub fn compute_snapshot(
    events: &[PageView],
    lifetime_total: i64,
    now: DateTime<Utc>,
    options: &AggregateOptions,
) -> AnalyticsSnapshot {
    let today = now.with_timezone(&options.timezone).date_naive();
    let today_start = local_midnight_utc(options.timezone, today);
    let yesterday_start = today
        .pred_opt()
        .and_then(|d| local_midnight_utc(options.timezone, d));
    let hour_ago = now - chrono::Duration::hours(1);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut new_visitors = 0u64;
    let mut returning_visitors = 0u64;
    let mut devices = [0u64; 3];
    let mut browsers = Tally::default();
    let mut pages = Tally::default();
    let mut today_views = 0u64;
    let mut yesterday_views = 0u64;
    let mut hourly_visits = 0u64;
    let mut recent_visits = Vec::with_capacity(RECENT_VISITS);

    for event in events {
        if seen.insert(event.visitor_id.as_str()) {
            if event.is_new_visit {
                new_visitors += 1;
            } else {
                returning_visitors += 1;
            }
        }

        devices[device_slot(event.device_type)] += 1;
        browsers.add(&event.browser);
        let internal = is_internal_asset(&event.path);
        if !internal {
            pages.add(&event.path);
        }

        match (today_start, yesterday_start) {
            (Some(t), _) if event.timestamp >= t => today_views += 1,
            (Some(t), Some(y)) if event.timestamp >= y && event.timestamp < t => {
                yesterday_views += 1
            }
            _ => {}
        }

        if event.timestamp >= hour_ago {
            hourly_visits += 1;
            if !internal && recent_visits.len() < RECENT_VISITS {
                recent_visits.push(RecentVisit {
                    path: event.path.clone(),
                    device_type: event.device_type,
                    browser: event.browser.clone(),
                    country: event.country.clone(),
                    timestamp: event.timestamp,
                });
            }
        }
    }

    let scanned = events.len() as u64;
    let unique_visitors = seen.len() as u64;
    let views_per_visitor = if unique_visitors == 0 {
        0.0
    } else {
        round2(scanned as f64 / unique_visitors as f64)
    };

    let device_total: u64 = devices.iter().sum();
    let breakdown = DeviceBreakdown {
        desktop: percent(devices[0], device_total),
        mobile: percent(devices[1], device_total),
        tablet: percent(devices[2], device_total),
    };
    let top_device = top_device(&devices);

    let browser_shares: Vec<BrowserShare> = browsers
        .ranked(TOP_BROWSERS)
        .into_iter()
        .map(|(browser, count)| BrowserShare {
            browser,
            percentage: percent(count, scanned),
        })
        .collect();
    let top_browser = browser_shares.first().map(|b| b.browser.clone());

    let top_pages = pages
        .ranked(TOP_PAGES)
        .into_iter()
        .map(|(path, views)| PageCount { path, views })
        .collect();

    AnalyticsSnapshot {
        unique_visitors,
        new_visitors,
        returning_visitors,
        total_page_views: lifetime_total.max(0) as u64,
        today_page_views: today_views,
        yesterday_page_views: yesterday_views,
        views_per_visitor,
        devices: breakdown,
        top_device,
        browsers: browser_shares,
        top_browser,
        top_pages,
        recent_visits,
        hourly_visits,
        hourly_activity_percentage: percent(hourly_visits, options.max_hourly_visits).min(100),
    }
}

fn device_slot(device: DeviceType) -> usize {
    match device {
        DeviceType::Desktop => 0,
        DeviceType::Mobile => 1,
        DeviceType::Tablet => 2,
    }
}

/// Highest count wins; ties resolve in `DeviceType::ALL` order.
fn top_device(counts: &[u64; 3]) -> Option<DeviceType> {
    let mut best: Option<(DeviceType, u64)> = None;
    for device in DeviceType::ALL {
        let count = counts[device_slot(device)];
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((device, count));
        }
    }
    best.map(|(device, _)| device)
}

fn percent(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 * 100.0 / whole as f64).round() as u32
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn local_midnight_utc(tz: Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    let zoned = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(a, b) => a.min(b),
        // Midnight skipped by a DST jump; the day starts an hour later.
        LocalResult::None => tz
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()?,
    };
    Some(zoned.with_timezone(&Utc))
}

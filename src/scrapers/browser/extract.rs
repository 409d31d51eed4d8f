//! Metric extraction from rendered target pages.
//!
//! Pure functions over HTML so they can be tested without a browser.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Slot carrying weekly visitors; its presence means the sidebar rendered.
pub const VISITORS_SLOT: &str = "weekly-active-users-count";

/// Slots carrying weekly contributions, by page generation.
pub const CONTRIBUTION_SLOTS: &[&str] = &[
    "weekly-posts-count",
    "weekly-contributions-count",
    "weekly-content-count",
];

pub const SUBSCRIBERS_SLOT: &str = "subscriber-count";

/// Selector the browser waits for before reading a target page.
pub const METRICS_READY_SELECTOR: &str = "[slot=\"weekly-active-users-count\"]";

static SUBSCRIBERS_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""subscribers"\s*:\s*(\d+)"#).expect("valid regex"));

static MEMBERS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d][\d.,]*\s*[KMB]?)\s+(?:members|subscribers)\b").expect("valid regex")
});

/// Metrics read from one page. `None` means the page did not show it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMetrics {
    pub weekly_visitors: Option<i64>,
    pub weekly_contributions: Option<i64>,
    pub audience: Option<i64>,
}

impl PageMetrics {
    pub fn is_empty(&self) -> bool {
        self.weekly_visitors.is_none()
            && self.weekly_contributions.is_none()
            && self.audience.is_none()
    }
}

/// Parse display numbers like `559K`, `2.2M`, `1,234` or `3B`.
pub fn parse_metric_value(text: &str) -> Option<i64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('K') => (&cleaned[..cleaned.len() - 1], 1_000f64),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        Some('B') => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };

    let value = number.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as i64)
}

/// Read a slot's value, preferring the exact `number` attribute that
/// `faceplate-number` elements carry over the abbreviated text.
fn slot_value(document: &Html, slot: &str) -> Option<i64> {
    let selector = Selector::parse(&format!("[slot=\"{}\"]", slot)).ok()?;
    for element in document.select(&selector) {
        if let Some(exact) = element.value().attr("number").and_then(parse_metric_value) {
            return Some(exact);
        }
        let nested = Selector::parse("[number]").ok()?;
        if let Some(exact) = element
            .select(&nested)
            .filter_map(|e| e.value().attr("number"))
            .find_map(parse_metric_value)
        {
            return Some(exact);
        }
        let text: String = element.text().collect();
        if let Some(value) = parse_metric_value(&text) {
            return Some(value);
        }
    }
    None
}

/// Fallback for markup the HTML parser keeps out of the tree (templates).
fn slot_value_raw(html: &str, slot: &str) -> Option<i64> {
    let pattern = format!(r#"slot="{}"[^>]*>([^<]+)<"#, regex::escape(slot));
    let re = Regex::new(&pattern).ok()?;
    let value = re
        .captures_iter(html)
        .find_map(|c| c.get(1).and_then(|m| parse_metric_value(m.as_str())));
    value
}

fn find_slot(document: &Html, html: &str, slot: &str) -> Option<i64> {
    slot_value(document, slot).or_else(|| slot_value_raw(html, slot))
}

/// Extract weekly visitors, weekly contributions and audience from a page.
pub fn extract_metrics(html: &str) -> PageMetrics {
    let document = Html::parse_document(html);

    let weekly_visitors = find_slot(&document, html, VISITORS_SLOT);
    let weekly_contributions = CONTRIBUTION_SLOTS
        .iter()
        .find_map(|slot| find_slot(&document, html, slot));

    let audience = SUBSCRIBERS_JSON
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .or_else(|| find_slot(&document, html, SUBSCRIBERS_SLOT))
        .or_else(|| {
            MEMBERS_TEXT
                .captures(html)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_metric_value(m.as_str()))
        });

    PageMetrics {
        weekly_visitors,
        weekly_contributions,
        audience,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_value_suffixes() {
        assert_eq!(parse_metric_value("559K"), Some(559_000));
        assert_eq!(parse_metric_value("2.2M"), Some(2_200_000));
        assert_eq!(parse_metric_value("1,234"), Some(1_234));
        assert_eq!(parse_metric_value("3b"), Some(3_000_000_000));
        assert_eq!(parse_metric_value(" 8.3M "), Some(8_300_000));
        assert_eq!(parse_metric_value(""), None);
        assert_eq!(parse_metric_value("n/a"), None);
    }

    #[test]
    fn test_extract_from_slots() {
        let html = r#"
            <html><body>
              <div>
                <span slot="weekly-active-users-count">8.3M</span>
                <faceplate-number slot="weekly-contributions-count" number="125400">125K</faceplate-number>
                <span slot="subscriber-count">1.5M</span>
              </div>
            </body></html>
        "#;
        let metrics = extract_metrics(html);
        assert_eq!(metrics.weekly_visitors, Some(8_300_000));
        assert_eq!(metrics.weekly_contributions, Some(125_400));
        assert_eq!(metrics.audience, Some(1_500_000));
    }

    #[test]
    fn test_contribution_slot_fallback_order() {
        let html = r#"<div><span slot="weekly-content-count">42</span></div>"#;
        assert_eq!(extract_metrics(html).weekly_contributions, Some(42));
    }

    #[test]
    fn test_audience_from_members_text() {
        let html = "<p>Community of 12.5K members since 2019</p>";
        assert_eq!(extract_metrics(html).audience, Some(12_500));
    }

    #[test]
    fn test_absent_metrics_are_none() {
        let metrics = extract_metrics("<html><body><p>nothing here</p></body></html>");
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_raw_slot_scan_reads_template_markup() {
        let html = r#"<template><span slot="weekly-active-users-count">4.2K</span></template>"#;
        assert_eq!(slot_value_raw(html, "weekly-active-users-count"), Some(4_200));
        assert_eq!(slot_value_raw(html, "weekly-posts-count"), None);
    }
}

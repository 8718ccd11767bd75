use chrono::{DateTime, Local};

use crate::proto::{ChannelStat, StatsReply};

/// LQI value the sniffer reports when it has no sample for a channel.
const LQI_NO_SAMPLE: f32 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Error,
}

/// One rendered grid cell, derived from a single channel's stats.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub channel_label: String,
    pub loss_text: String,
    pub loss_severity: Severity,
    pub radio_loss_fragment: Option<String>,
    pub lqi_text: Option<String>,
    pub lqi_severity: Severity,
    pub time_label: String,
}

/// Derives the sorted, filtered, severity-annotated view rows from a
/// raw stats reply. Pure; recomputed wholesale for every new reply.
///
/// A channel is kept only if it carries data (`seq_cnt > 1` or
/// `zbdcc_total > 0`) and its LQI is not the no-sample sentinel.
pub fn project(reply: &StatsReply) -> Vec<DisplayRow> {
    let mut entries: Vec<(&String, &ChannelStat)> = reply
        .stats
        .iter()
        .filter(|(_, stat)| {
            (stat.seq_cnt > 1 || stat.zbdcc_total > 0) && stat.lqi != LQI_NO_SAMPLE
        })
        .collect();

    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .map(|(key, stat)| project_row(key, stat))
        .collect()
}

fn project_row(key: &str, stat: &ChannelStat) -> DisplayRow {
    let mut loss_text = String::new();
    let mut loss_severity = Severity::Normal;
    let mut radio_loss_fragment = None;

    if stat.zbdcc_total > 0 {
        let fragment = format!("A: {} / {}", stat.zbdcc_lost, stat.zbdcc_total);
        loss_text.push_str(&fragment);
        radio_loss_fragment = Some(fragment);

        if let Some(severity) = ratio_severity(stat.zbdcc_lost, stat.zbdcc_total, 0.01, 0.2) {
            loss_severity = severity;
        }
    }

    if stat.seq_cnt > 1 {
        let lost = stat.seq_lost + stat.seq_duplicates;

        if !loss_text.is_empty() {
            loss_text.push_str("   ");
        }
        loss_text.push_str(&format!("PKT: {} / {}", lost, stat.seq_cnt));

        // Runs after the radio-loss check, so a matching packet-loss
        // band overrides the radio-loss severity.
        if let Some(severity) = ratio_severity(lost, stat.seq_cnt, 0.3, 0.5) {
            loss_severity = severity;
        }
    }

    let (lqi_text, lqi_severity) = if stat.rssi != 0.0 && stat.lqi != 0.0 {
        let severity = if stat.lqi > 0.0 && stat.lqi < 20.0 {
            Severity::Warning
        } else {
            Severity::Normal
        };

        (
            Some(format!("LQI: {:.0} [{:.0} dBm]", stat.lqi, stat.rssi)),
            severity,
        )
    } else {
        (None, Severity::Normal)
    };

    DisplayRow {
        channel_label: key.to_string(),
        loss_text,
        loss_severity,
        radio_loss_fragment,
        lqi_text,
        lqi_severity,
        time_label: format_time(stat.timestamp),
    }
}

/// Severity of a lost/total ratio: `Warning` within `[warn, error)`,
/// `Error` within `[error, 1.0]`, `None` outside both bands.
fn ratio_severity(lost: i32, total: i32, warn: f32, error: f32) -> Option<Severity> {
    let ratio = lost as f32 / total as f32;

    if (error..=1.0).contains(&ratio) {
        Some(Severity::Error)
    } else if (warn..error).contains(&ratio) {
        Some(Severity::Warning)
    } else {
        None
    }
}

fn format_time(timestamp_micros: i64) -> String {
    match DateTime::from_timestamp(timestamp_micros / 1_000_000, 0) {
        Some(utc) => utc.with_timezone(&Local).format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

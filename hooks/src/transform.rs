//! Post-fetch transforms that derive view data from raw responses.

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::Context;
use payloads::NotificationId;
use payloads::responses::{Notification, Stat};
use rust_decimal::Decimal;

/// A stat with its display strings parsed into numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatView {
    pub stat: Stat,
    pub numeric_value: Decimal,
    pub change_value: Decimal,
}

impl std::ops::Deref for StatView {
    type Target = Stat;

    fn deref(&self) -> &Self::Target {
        &self.stat
    }
}

/// Parse a formatted display number such as "$45,231" or "+20.1%".
///
/// Everything except digits, `.` and `-` is discarded, then the longest
/// leading number is parsed and the rest ignored: "+20.1% vs. last month."
/// reads as 20.1 and "12-15" as 12. Fails only when no leading number
/// remains.
pub fn parse_display_number(raw: &str) -> anyhow::Result<Decimal> {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let number = leading_number(&filtered)
        .with_context(|| format!("no number in {raw:?}"))?;
    Decimal::from_str(&number)
        .with_context(|| format!("parsing {raw:?} as a number"))
}

/// The leading `-?digits(.digits)?` of `s`, normalized so that ".4" and
/// "20." come out as "0.4" and "20".
fn leading_number(s: &str) -> Option<String> {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    let (int, rest) = rest.split_at(digits_len(rest));
    let frac = match rest.strip_prefix('.') {
        Some(after) => &after[..digits_len(after)],
        None => "",
    };
    if int.is_empty() && frac.is_empty() {
        return None;
    }

    let int = if int.is_empty() { "0" } else { int };
    Some(if frac.is_empty() {
        format!("{sign}{int}")
    } else {
        format!("{sign}{int}.{frac}")
    })
}

fn digits_len(s: &str) -> usize {
    s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len())
}

pub fn enrich_stats(stats: Vec<Stat>) -> anyhow::Result<Vec<StatView>> {
    stats
        .into_iter()
        .map(|stat| {
            let numeric_value = parse_display_number(&stat.value)
                .with_context(|| format!("stat {:?} value", stat.id))?;
            let change_value = parse_display_number(&stat.change)
                .with_context(|| format!("stat {:?} change", stat.id))?;
            Ok(StatView {
                stat,
                numeric_value,
                change_value,
            })
        })
        .collect()
}

/// Unread notifications, counting the locally `marked` ones as read.
pub fn unread_count(
    notifications: &[Notification],
    marked: &HashSet<NotificationId>,
) -> usize {
    notifications
        .iter()
        .filter(|n| !n.read && !marked.contains(&n.id))
        .count()
}

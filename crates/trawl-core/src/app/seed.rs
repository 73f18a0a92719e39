//! Seeding: account URLs -> initial ACCOUNT / POST_LIST tasks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::{AccountTaskConfig, Network, PostListTaskConfig, TaskConfig};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported account url: {0}")]
    UnsupportedUrl(String),

    #[error("input has a header row but no `{0}` column")]
    MissingColumn(&'static str),

    #[error("published_after {after} is later than published_before {before}")]
    InvalidWindow {
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    },
}

/// CSV column holding account URLs.
pub const ACCOUNT_URL_COLUMN: &str = "Account Url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub network: Network,
    pub account_id: String,
}

/// Which task kinds to create per account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedKinds {
    #[default]
    All,
    Account,
    PostList,
}

impl SeedKinds {
    fn includes_account(self) -> bool {
        matches!(self, SeedKinds::All | SeedKinds::Account)
    }

    fn includes_post_list(self) -> bool {
        matches!(self, SeedKinds::All | SeedKinds::PostList)
    }
}

impl fmt::Display for SeedKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeedKinds::All => "all",
            SeedKinds::Account => "account",
            SeedKinds::PostList => "post-list",
        })
    }
}

impl FromStr for SeedKinds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SeedKinds::All),
            "account" => Ok(SeedKinds::Account),
            "post-list" => Ok(SeedKinds::PostList),
            other => Err(format!("unknown task kind selection: {other}")),
        }
    }
}

/// Post list window used when none is given: calendar year 2025, UTC.
pub fn default_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

/// Map a profile URL to its network and account id.
///
/// - instagram: `https://www.instagram.com/<handle>/`
/// - youtube:   `https://www.youtube.com/channel/<channel_id>` のみ（@handle は不可）
/// - tiktok:    `https://www.tiktok.com/@<handle>`
pub fn parse_account_url(raw: &str) -> Result<AccountRef, SeedError> {
    let url = Url::parse(raw.trim()).map_err(|source| SeedError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    let host = url.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let (network, account_id) = match (host, segments.as_slice()) {
        ("instagram.com", [.., last]) => (Network::Instagram, *last),
        ("youtube.com", ["channel", .., last]) => (Network::Youtube, *last),
        ("tiktok.com", [.., last]) => (Network::Tiktok, *last),
        _ => return Err(SeedError::UnsupportedUrl(raw.to_string())),
    };

    Ok(AccountRef {
        network,
        account_id: account_id.to_string(),
    })
}

/// Pull account URLs out of either a CSV with an `Account Url` column or a
/// plain one-URL-per-line list. Blank lines and `#` comments are skipped.
pub fn read_account_urls(input: &str) -> Result<Vec<String>, SeedError> {
    let mut lines = input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .peekable();

    let Some(&first) = lines.peek() else {
        return Ok(Vec::new());
    };
    if first.starts_with("http://") || first.starts_with("https://") {
        return Ok(lines.map(str::to_string).collect());
    }

    // header row
    let header: Vec<&str> = split_csv_line(first);
    let column = header
        .iter()
        .position(|h| *h == ACCOUNT_URL_COLUMN)
        .ok_or(SeedError::MissingColumn(ACCOUNT_URL_COLUMN))?;
    lines.next();

    Ok(lines
        .filter_map(|line| split_csv_line(line).get(column).map(|v| v.to_string()))
        .filter(|v| !v.is_empty())
        .collect())
}

// URL 列にカンマが入ることはないので quote は外すだけ
fn split_csv_line(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').trim())
        .collect()
}

/// Build the task configs for every URL, in input order.
///
/// ACCOUNT before POST_LIST for the same account, so FIFO acquisition
/// handles profile data first.
pub fn build_task_configs(
    urls: &[String],
    kinds: SeedKinds,
    published_after: DateTime<Utc>,
    published_before: DateTime<Utc>,
) -> Result<Vec<(Network, TaskConfig)>, SeedError> {
    if published_after > published_before {
        return Err(SeedError::InvalidWindow {
            after: published_after,
            before: published_before,
        });
    }

    let mut configs = Vec::new();
    for url in urls {
        let account = parse_account_url(url)?;
        if kinds.includes_account() {
            configs.push((
                account.network,
                TaskConfig::Account(AccountTaskConfig {
                    account_id: account.account_id.clone(),
                }),
            ));
        }
        if kinds.includes_post_list() {
            configs.push((
                account.network,
                TaskConfig::PostList(PostListTaskConfig {
                    account_id: account.account_id.clone(),
                    published_after,
                    published_before,
                }),
            ));
        }
    }
    Ok(configs)
}

//! TCC wire format: reply parsing and command formatting.

use std::str::FromStr;

use super::state::AxisCmdState;
use super::{TccError, TccResult};

/// A status keyword we act on.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    YourUserId(i32),
    InstrumentNum(i32),
    AxisCmdState(Vec<AxisCmdState>),
    SecOrient(String),
}

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyLine {
    pub cmd_id: u32,
    pub user_id: i32,
    /// Recognised keywords, in line order. Unknown keywords are skipped.
    pub keywords: Vec<Keyword>,
}

impl ReplyLine {
    /// Parse `<cmdID> <userID> <kw=val>[;kw=val...]`.
    ///
    /// The whole line is validated before anything is returned, so a bad
    /// value in any recognised keyword rejects the line.
    pub fn parse(line: &str) -> TccResult<Self> {
        let line = line.trim().to_lowercase();
        let mut parts = line.splitn(3, char::is_whitespace);

        let cmd_id = parse_id(parts.next(), "command id", &line)?;
        let user_id = parse_id(parts.next(), "user id", &line)?;
        let rest = parts.next().unwrap_or("").trim();

        let mut keywords = Vec::new();
        for item in split_items(rest) {
            let Some((key, value)) = item.split_once('=') else {
                continue;
            };
            // Messages may carry a code word ahead of the first keyword.
            let key = key.split_whitespace().last().unwrap_or("");
            let value = value.trim();
            let keyword = match key {
                "youruserid" => Keyword::YourUserId(parse_int(key, value)?),
                "instrumentnum" => Keyword::InstrumentNum(parse_int(key, value)?),
                "axiscmdstate" => Keyword::AxisCmdState(
                    value
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(AxisCmdState::parse)
                        .collect(),
                ),
                "secorient" => Keyword::SecOrient(value.trim_matches('"').to_string()),
                _ => continue,
            };
            keywords.push(keyword);
        }

        Ok(Self {
            cmd_id,
            user_id,
            keywords,
        })
    }
}

/// Split keywords on `;`, leaving separators inside double quotes alone.
fn split_items(rest: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                items.push(&rest[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&rest[start..]);
    items
}

fn parse_id<T: FromStr>(part: Option<&str>, what: &str, line: &str) -> TccResult<T> {
    let part = part
        .filter(|p| !p.is_empty())
        .ok_or_else(|| TccError::ProtocolParse(format!("missing {what} in {line:?}")))?;
    part.parse()
        .map_err(|_| TccError::ProtocolParse(format!("invalid {what} {part:?} in {line:?}")))
}

fn parse_int(key: &str, value: &str) -> TccResult<i32> {
    value
        .trim_matches('"')
        .parse()
        .map_err(|_| TccError::ProtocolParse(format!("invalid {key} value {value:?}")))
}

/// Status query for the given admin command id.
pub fn status_command(admin_cmd_id: u32) -> String {
    format!("{admin_cmd_id} device status")
}

/// A guide offset to apply, in arcseconds on the sky.
///
/// Absent components are sent as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffsetRequest {
    pub ra_arcsec: Option<f64>,
    pub dec_arcsec: Option<f64>,
    pub rot_arcsec: Option<f64>,
}

impl OffsetRequest {
    pub fn translation(ra_arcsec: f64, dec_arcsec: f64) -> Self {
        Self {
            ra_arcsec: Some(ra_arcsec),
            dec_arcsec: Some(dec_arcsec),
            rot_arcsec: None,
        }
    }

    pub fn with_rotation(mut self, rot_arcsec: f64) -> Self {
        self.rot_arcsec = Some(rot_arcsec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ra_arcsec.is_none() && self.dec_arcsec.is_none() && self.rot_arcsec.is_none()
    }

    /// Format as a `guideoffset` command. The TCC takes degrees.
    pub fn command(&self, admin_cmd_id: u32) -> String {
        let deg = |v: Option<f64>| v.unwrap_or(0.0) / 3600.0;
        format!(
            "{} guideoffset {:.6},{:.6},{:.6},0.0,0.0",
            admin_cmd_id,
            deg(self.ra_arcsec),
            deg(self.dec_arcsec),
            deg(self.rot_arcsec)
        )
    }
}

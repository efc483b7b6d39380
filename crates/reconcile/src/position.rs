//! Reading positions.
//!
//! Every backend has its own opaque position token. The catalog keeps one per
//! backend in a single text field, a JSON object keyed by backend tag whose
//! values carry the token and the time it was recorded:
//!
//! ```text
//! {"pb": "pbr:/word?page=3&offs=12_TIMESTAMP_1700000000", "kr": "/body/DocFragment[3]/body/p[5]/text().12_TIMESTAMP_1700000100"}
//! ```

use crate::consts::TIMESTAMP_SEPARATOR;
use crate::session::Backend;
use derive_more::{Display, Error};
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};
use std::str::FromStr;

/// A position token and when it was recorded (epoch seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub token: String,
    pub timestamp: i64,
}
impl Position {
    pub fn new(token: impl Into<String>, timestamp: i64) -> Self {
        Self { token: token.into(), timestamp }
    }
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
#[display("not a `<token>_TIMESTAMP_<epoch>` position")]
pub struct InvalidPosition;

impl FromStr for Position {
    type Err = InvalidPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, timestamp) = s.rsplit_once(TIMESTAMP_SEPARATOR).ok_or(InvalidPosition)?;
        let timestamp = timestamp.trim().parse().map_err(|_| InvalidPosition)?;
        Ok(Self { token: token.to_string(), timestamp })
    }
}
impl FmtDisplay for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{TIMESTAMP_SEPARATOR}{}", self.token, self.timestamp)
    }
}

/// A position as read from the device. The timestamp is missing when the
/// device did not record one (or it could not be read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePosition {
    pub token: String,
    pub timestamp: Option<i64>,
}

/// The catalog's position field: at most one position per backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionField {
    pb: Option<Position>,
    kr: Option<Position>,
    cr: Option<Position>,
}
impl PositionField {
    /// Parse the catalog text. Text that is not a JSON object is treated as
    /// an empty field; entries that do not parse are dropped.
    pub fn parse(text: &str) -> Self {
        let mut field = Self::default();
        if text.trim().is_empty() {
            return field;
        }
        let object = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(text) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable position field");
                return field;
            },
        };
        for (tag, value) in object {
            let Some(backend) = Backend::from_tag(&tag) else {
                continue;
            };
            match value.as_str().map(str::parse::<Position>) {
                Some(Ok(position)) => field.set(backend, Some(position)),
                _ => tracing::warn!(tag, %value, "Ignoring unreadable position"),
            }
        }
        field
    }

    pub fn get(&self, backend: Backend) -> Option<&Position> {
        self.slot(backend).as_ref()
    }

    pub fn set(&mut self, backend: Backend, position: Option<Position>) {
        *self.slot_mut(backend) = position;
    }

    pub fn is_empty(&self) -> bool {
        self.pb.is_none() && self.kr.is_none() && self.cr.is_none()
    }

    /// Catalog text for the field, keys in backend order; `None` when empty.
    pub fn render(&self) -> Option<String> {
        let entries: Vec<String> = Backend::ALL
            .into_iter()
            .filter_map(|b| {
                let position = self.get(b)?;
                Some(format!("\"{}\": {}", b.tag(), serde_json::Value::String(position.to_string())))
            })
            .collect();
        (!entries.is_empty()).then(|| format!("{{{}}}", entries.join(", ")))
    }

    fn slot(&self, backend: Backend) -> &Option<Position> {
        match backend {
            Backend::Native => &self.pb,
            Backend::KoReader => &self.kr,
            Backend::CoolReader => &self.cr,
        }
    }

    fn slot_mut(&mut self, backend: Backend) -> &mut Option<Position> {
        match backend {
            Backend::Native => &mut self.pb,
            Backend::KoReader => &mut self.kr,
            Backend::CoolReader => &mut self.cr,
        }
    }
}

/// What to do with one backend's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionAction {
    Keep,
    /// Write the catalog position to the device.
    Push(Position),
    /// Take the device position into the catalog.
    Adopt(Position),
}

/// Compare the catalog's and the device's position for one backend. The
/// newer one wins; ties and unknown device times change nothing.
pub fn decide(catalog: Option<&Position>, device: Option<&DevicePosition>) -> PositionAction {
    match (catalog, device) {
        (None, None) => PositionAction::Keep,
        (Some(catalog), None) => PositionAction::Push(catalog.clone()),
        (None, Some(device)) => PositionAction::Adopt(Position::new(&device.token, device.timestamp.unwrap_or(0))),
        (Some(catalog), Some(device)) => {
            if catalog.token == device.token {
                return PositionAction::Keep;
            }
            let Some(device_ts) = device.timestamp else {
                return PositionAction::Keep;
            };
            match device_ts.cmp(&catalog.timestamp) {
                std::cmp::Ordering::Greater => PositionAction::Adopt(Position::new(&device.token, device_ts)),
                std::cmp::Ordering::Less => PositionAction::Push(catalog.clone()),
                std::cmp::Ordering::Equal => PositionAction::Keep,
            }
        },
    }
}

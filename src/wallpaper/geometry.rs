//! Virtual desktop geometry
//!
//! Monitors live in one shared coordinate space. The virtual desktop is the
//! smallest axis-aligned rectangle that contains every monitor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("no monitors were supplied")]
    EmptyMonitorSet,

    #[error("invalid monitor descriptor '{0}': {1}")]
    InvalidDescriptor(String, String),
}

/// One physical display as reported by screen detection.
///
/// `id` is stable across re-detection and is the only thing consumers may
/// match on; position in a list carries no identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Monitor {
    pub fn new(id: impl Into<String>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            name: None,
            x,
            y,
            width,
            height,
            scale_factor: 1.0,
        }
    }

    pub fn with_scale(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Output size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        let w = (f64::from(self.width) * self.scale_factor).round();
        let h = (f64::from(self.height) * self.scale_factor).round();
        ((w as u32).max(1), (h as u32).max(1))
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}x{} at ({}, {}) @{}x",
            self.label(),
            self.width,
            self.height,
            self.x,
            self.y,
            self.scale_factor
        )
    }
}

/// Parses `id:X,Y:WxH[@scale]`, e.g. `left:-1920,0:1920x1080@2`.
impl FromStr for Monitor {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| GeometryError::InvalidDescriptor(s.to_string(), why.to_string());

        let mut parts = s.splitn(3, ':');
        let id = parts.next().filter(|p| !p.is_empty()).ok_or_else(|| invalid("missing id"))?;
        let pos = parts.next().ok_or_else(|| invalid("missing position"))?;
        let size = parts.next().ok_or_else(|| invalid("missing size"))?;

        let (x, y) = pos.split_once(',').ok_or_else(|| invalid("position must be X,Y"))?;
        let x: i32 = x.trim().parse().map_err(|_| invalid("bad X"))?;
        let y: i32 = y.trim().parse().map_err(|_| invalid("bad Y"))?;

        let (dims, scale) = match size.split_once('@') {
            Some((dims, scale)) => (dims, Some(scale)),
            None => (size, None),
        };
        let (w, h) = dims.split_once('x').ok_or_else(|| invalid("size must be WxH"))?;
        let width: u32 = w.trim().parse().map_err(|_| invalid("bad width"))?;
        let height: u32 = h.trim().parse().map_err(|_| invalid("bad height"))?;
        if width == 0 || height == 0 {
            return Err(invalid("size must be non-zero"));
        }

        let scale_factor = match scale {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| invalid("bad scale"))?,
            None => 1.0,
        };
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(invalid("scale must be positive"));
        }

        Ok(Monitor::new(id, x, y, width, height).with_scale(scale_factor))
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDesktopBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub total_width: u32,
    pub total_height: u32,
}

impl VirtualDesktopBounds {
    pub fn contains(&self, monitor: &Monitor) -> bool {
        let max_x = i64::from(self.min_x) + i64::from(self.total_width);
        let max_y = i64::from(self.min_y) + i64::from(self.total_height);
        monitor.x >= self.min_x
            && monitor.y >= self.min_y
            && monitor.right() <= max_x
            && monitor.bottom() <= max_y
    }
}

impl fmt::Display for VirtualDesktopBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.total_width, self.total_height, self.min_x, self.min_y
        )
    }
}

/// Smallest rectangle containing every monitor.
pub fn resolve_bounds(monitors: &[Monitor]) -> Result<VirtualDesktopBounds, GeometryError> {
    let first = monitors.first().ok_or(GeometryError::EmptyMonitorSet)?;

    let (mut min_x, mut min_y) = (i64::from(first.x), i64::from(first.y));
    let (mut max_x, mut max_y) = (first.right(), first.bottom());
    for m in &monitors[1..] {
        min_x = min_x.min(i64::from(m.x));
        min_y = min_y.min(i64::from(m.y));
        max_x = max_x.max(m.right());
        max_y = max_y.max(m.bottom());
    }

    Ok(VirtualDesktopBounds {
        min_x: min_x as i32,
        min_y: min_y as i32,
        total_width: (max_x - min_x) as u32,
        total_height: (max_y - min_y) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_rejected() {
        assert_eq!(resolve_bounds(&[]), Err(GeometryError::EmptyMonitorSet));
    }

    #[test]
    fn single_monitor_bounds_match_monitor() {
        let bounds = resolve_bounds(&[Monitor::new("a", 0, 0, 1920, 1080)]).unwrap();
        assert_eq!(
            bounds,
            VirtualDesktopBounds {
                min_x: 0,
                min_y: 0,
                total_width: 1920,
                total_height: 1080
            }
        );
    }

    #[test]
    fn negative_offsets_and_staggered_heights() {
        let monitors = vec![
            Monitor::new("main", 0, 0, 2560, 1440),
            Monitor::new("left", -1920, 200, 1920, 1080),
            Monitor::new("top", 320, -1200, 1920, 1200),
        ];
        let bounds = resolve_bounds(&monitors).unwrap();
        assert_eq!(bounds.min_x, -1920);
        assert_eq!(bounds.min_y, -1200);
        assert_eq!(bounds.total_width, 1920 + 2560);
        assert_eq!(bounds.total_height, 1200 + 1440);
        for m in &monitors {
            assert!(bounds.contains(m), "{m} escapes {bounds}");
        }
    }

    #[test]
    fn bounds_contain_every_monitor_for_many_layouts() {
        let layouts: Vec<Vec<Monitor>> = (0..12)
            .map(|seed: i32| {
                (0..=seed % 4)
                    .map(|i| {
                        Monitor::new(
                            format!("m{i}"),
                            (seed * 137 + i * 911) % 4000 - 2000,
                            (seed * 71 - i * 419) % 3000 - 1500,
                            800 + ((seed + i) as u32 * 53) % 3000,
                            600 + ((seed * 3 + i) as u32 * 29) % 1600,
                        )
                    })
                    .collect()
            })
            .collect();

        for monitors in layouts {
            let b = resolve_bounds(&monitors).unwrap();
            let max_x = monitors.iter().map(Monitor::right).max().unwrap();
            let max_y = monitors.iter().map(Monitor::bottom).max().unwrap();
            assert_eq!(i64::from(b.min_x) + i64::from(b.total_width), max_x);
            assert_eq!(i64::from(b.min_y) + i64::from(b.total_height), max_y);
            assert!(monitors.iter().all(|m| b.contains(m)));
        }
    }

    #[test]
    fn parses_descriptor_with_scale() {
        let m: Monitor = "left:-1920,0:1920x1080@2".parse().unwrap();
        assert_eq!(m.id, "left");
        assert_eq!((m.x, m.y, m.width, m.height), (-1920, 0, 1920, 1080));
        assert_eq!(m.scale_factor, 2.0);
        assert_eq!(m.device_size(), (3840, 2160));
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for bad in ["", "a", "a:0,0", "a:0:10x10", "a:0,0:10", "a:0,0:0x10", "a:0,0:10x10@0"] {
            assert!(bad.parse::<Monitor>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn deserializes_camel_case_screen_info() {
        let json = r#"{"id":"69733382","name":"Display 1","x":0,"y":0,
                       "width":1512,"height":982,"scaleFactor":2}"#;
        let m: Monitor = serde_json::from_str(json).unwrap();
        assert_eq!(m.label(), "Display 1");
        assert_eq!(m.device_size(), (3024, 1964));
    }
}

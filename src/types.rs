//! Core identifiers shared by every layer of the tracer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Name of a region (a world, dimension or shard) that owns cells.
pub type RegionId = String;

/// Identifies one cell: a region plus integer grid coordinates.
///
/// Displays as `"<region>:<x>:<z>"`, which is also the key format used by
/// the persisted cache snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub region: RegionId,
    pub x: i32,
    pub z: i32,
}

impl CellKey {
    pub fn new(region: impl Into<RegionId>, x: i32, z: i32) -> Self {
        Self {
            region: region.into(),
            x,
            z,
        }
    }

    /// All cells in the square of side `2 * radius + 1` centred on `self`.
    ///
    /// The square is clipped at the edges of the `i32` coordinate space.
    pub fn square_around(&self, radius: u32) -> Vec<CellKey> {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        let xs = self.x.saturating_sub(r)..=self.x.saturating_add(r);
        let zs = self.z.saturating_sub(r)..=self.z.saturating_add(r);
        let mut cells = Vec::new();
        for x in xs {
            for z in zs.clone() {
                cells.push(CellKey::new(self.region.clone(), x, z));
            }
        }
        cells
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.region, self.x, self.z)
    }
}

impl FromStr for CellKey {
    type Err = String;

    /// Parses `"<region>:<x>:<z>"`. The region itself may contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let z = parts.next().ok_or_else(|| format!("Missing z in '{}'", s))?;
        let x = parts.next().ok_or_else(|| format!("Missing x in '{}'", s))?;
        let region = parts
            .next()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| format!("Missing region in '{}'", s))?;

        let x = x
            .parse::<i32>()
            .map_err(|e| format!("Invalid x in '{}': {}", s, e))?;
        let z = z
            .parse::<i32>()
            .map_err(|e| format!("Invalid z in '{}': {}", s, e))?;

        Ok(CellKey::new(region, x, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_key_display_and_parse() {
        let key = CellKey::new("overworld", -3, 12);
        assert_eq!(key.to_string(), "overworld:-3:12");
        assert_eq!("overworld:-3:12".parse::<CellKey>().unwrap(), key);
    }

    #[test]
    fn test_cell_key_region_with_colon() {
        let key: CellKey = "mods:nether:4:5".parse().unwrap();
        assert_eq!(key.region, "mods:nether");
        assert_eq!((key.x, key.z), (4, 5));
    }

    #[test]
    fn test_cell_key_rejects_garbage() {
        assert!("overworld:1".parse::<CellKey>().is_err());
        assert!(":1:2".parse::<CellKey>().is_err());
        assert!("w:a:2".parse::<CellKey>().is_err());
    }

    #[test]
    fn test_square_around() {
        let center = CellKey::new("w", 0, 0);
        let cells = center.square_around(1);
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&CellKey::new("w", -1, 1)));
        assert_eq!(center.square_around(0), vec![center.clone()]);
    }

    #[test]
    fn test_square_around_clips_at_coordinate_limits() {
        let edge = CellKey::new("w", i32::MAX, i32::MIN);
        let cells = edge.square_around(1);
        assert_eq!(cells.len(), 4);
        assert!(cells.contains(&CellKey::new("w", i32::MAX - 1, i32::MIN + 1)));
        assert!(cells.iter().all(|c| c.x >= i32::MAX - 1 && c.z <= i32::MIN + 1));

        let corner = CellKey::new("w", i32::MIN, 0);
        assert_eq!(corner.square_around(2).len(), 3 * 5);
    }
}

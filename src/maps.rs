use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;
use crate::abstraction::{AbstractionError, AbstractionResult};

/// Walkability of a loaded or generated map, row-major, `true` = open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapData {
    pub width: usize,
    pub height: usize,
    pub walkable: Vec<bool>,
}

impl MapData {
    pub fn is_open(&self, x: usize, y: usize) -> bool {
        self.walkable[y * self.width + x]
    }

    pub fn open_count(&self) -> usize {
        self.walkable.iter().filter(|&&open| open).count()
    }
}

fn terrain(c: char) -> Option<bool> {
    match c {
        '.' | 'G' | 'S' => Some(true),
        '@' | 'O' | 'T' | 'W' => Some(false),
        _ => None,
    }
}

fn header_value(line: Option<&str>, key: &str) -> AbstractionResult<usize> {
    let line = line.ok_or_else(|| AbstractionError::MapFormat(format!("missing '{key}' line")))?;
    let mut parts = line.split_whitespace();
    if parts.next() != Some(key) {
        return Err(AbstractionError::MapFormat(format!("expected '{key}', found '{line}'")));
    }
    parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AbstractionError::MapFormat(format!("bad value in '{line}'")))
}

/// Parse a MovingAI `.map` file.
///
/// ```text
/// type octile
/// height 3
/// width 4
/// map
/// ..@.
/// .@@.
/// ....
/// ```
/// `.`, `G` and `S` are open; `@`, `O`, `T` and `W` are blocked.
pub fn parse_map(text: &str) -> AbstractionResult<MapData> {
    let mut lines = text.lines().map(str::trim_end).filter(|l| !l.is_empty());

    let kind = lines
        .next()
        .ok_or_else(|| AbstractionError::MapFormat("empty map".into()))?;
    if !kind.starts_with("type") {
        return Err(AbstractionError::MapFormat(format!("expected 'type', found '{kind}'")));
    }
    let height = header_value(lines.next(), "height")?;
    let width = header_value(lines.next(), "width")?;
    if lines.next() != Some("map") {
        return Err(AbstractionError::MapFormat("missing 'map' line".into()));
    }

    let mut walkable = Vec::with_capacity(width * height);
    for y in 0..height {
        let row = lines
            .next()
            .ok_or_else(|| AbstractionError::MapFormat(format!("map ends at row {y} of {height}")))?;
        if row.chars().count() != width {
            return Err(AbstractionError::MapFormat(format!(
                "row {y} has {} cells, expected {width}",
                row.chars().count()
            )));
        }
        for (x, c) in row.chars().enumerate() {
            let open = terrain(c)
                .ok_or_else(|| AbstractionError::MapFormat(format!("unknown terrain '{c}' at ({x}, {y})")))?;
            walkable.push(open);
        }
    }

    Ok(MapData { width, height, walkable })
}

pub fn load_map(path: &Path) -> AbstractionResult<MapData> {
    let text = std::fs::read_to_string(path)?;
    let map = parse_map(&text)?;
    info!(
        "Loaded {}x{} map from {} ({} open cells)",
        map.width,
        map.height,
        path.display(),
        map.open_count()
    );
    Ok(map)
}

/// Seeded random map: each cell is a wall with probability `density`.
pub fn random_map(width: usize, height: usize, density: f64, seed: u64) -> MapData {
    let mut rng = StdRng::seed_from_u64(seed);
    let density = density.clamp(0.0, 1.0);
    let walkable = (0..width * height).map(|_| !rng.random_bool(density)).collect();
    MapData { width, height, walkable }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_movingai_header_and_terrain() {
        let text = "type octile\nheight 2\nwidth 3\nmap\n.@T\nGSW\n";
        let map = parse_map(text).unwrap();
        assert_eq!((map.width, map.height), (3, 2));
        assert_eq!(map.walkable, vec![true, false, false, true, true, false]);
        assert!(map.is_open(1, 1));
    }

    #[test]
    fn rejects_short_rows_and_unknown_terrain() {
        let err = parse_map("type octile\nheight 1\nwidth 3\nmap\n..\n").unwrap_err();
        assert!(matches!(err, AbstractionError::MapFormat(_)));
        let err = parse_map("type octile\nheight 1\nwidth 2\nmap\n.?\n").unwrap_err();
        assert!(matches!(err, AbstractionError::MapFormat(_)));
    }

    #[test]
    fn random_map_is_seeded() {
        let a = random_map(20, 10, 0.3, 7);
        let b = random_map(20, 10, 0.3, 7);
        assert_eq!(a, b);
        assert_eq!(random_map(5, 5, 0.0, 1).open_count(), 25);
        assert_eq!(random_map(5, 5, 1.0, 1).open_count(), 0);
    }
}

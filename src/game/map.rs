//! Boundary geometry: text format parsing and static collision geometry
//!
//! The text format is one record per line. A record is either a bare `#`,
//! which closes the current ring and opens a new one, or `<x>,<y>`, which
//! appends a point to the current ring. The first ring opens implicitly.

use rapier2d::prelude::*;
use tracing::warn;

use super::error::GameError;
use super::physics::{PhysicsWorld, Point2, Vec2};

/// Reserved label of the map body
pub const MAP_LABEL: &str = "map";

/// Record that separates two rings
const RING_SEPARATOR: &str = "#";

/// Rings with an absolute area below this produce no collider
const MIN_RING_AREA: Real = 1e-6;

/// Ordered points of one closed polygon
pub type Ring = Vec<Point2>;

/// Placement of parsed geometry in the world: translate first, then scale about the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapPlacement {
    pub translate: Vec2,
    pub scale: Real,
}

impl MapPlacement {
    /// Leaves points where the text puts them
    pub fn identity() -> Self {
        Self {
            translate: Vec2::zeros(),
            scale: 1.0,
        }
    }

    pub fn apply(&self, point: &Point2) -> Point2 {
        (point + self.translate) * self.scale
    }
}

impl Default for MapPlacement {
    /// Placement of the designed playfield
    fn default() -> Self {
        Self {
            translate: vector![235.0 / 2.0, 200.0 / 2.0],
            scale: 2.0,
        }
    }
}

/// A map registered with the physics world
#[derive(Debug, Clone)]
pub struct LoadedMap {
    /// Rings as parsed, before placement
    pub geometry: Vec<Ring>,
    /// Composite static body built from the rings
    pub body: RigidBodyHandle,
}

/// Parse boundary text into rings. Any malformed record fails the whole parse.
pub fn parse(raw: &str) -> Result<Vec<Ring>, GameError> {
    let mut rings: Vec<Ring> = vec![Vec::new()];

    let records: Vec<&str> = raw.split('\n').collect();
    // A newline terminating the last record does not open an empty record
    let records = match records.split_last() {
        Some((last, rest)) if last.is_empty() && !rest.is_empty() => rest,
        _ => &records[..],
    };

    for (index, record) in records.iter().copied().enumerate() {
        let record = record.strip_suffix('\r').unwrap_or(record);

        if record == RING_SEPARATOR {
            rings.push(Vec::new());
            continue;
        }

        let point = parse_point(record).ok_or_else(|| GameError::MalformedGeometry {
            line: index + 1,
            content: record.to_string(),
        })?;

        if let Some(ring) = rings.last_mut() {
            ring.push(point);
        }
    }

    Ok(rings)
}

fn parse_point(record: &str) -> Option<Point2> {
    let mut tokens = record.split(',');
    let x = parse_coordinate(tokens.next()?)?;
    let y = parse_coordinate(tokens.next()?)?;
    if tokens.next().is_some() {
        return None;
    }
    Some(point![x, y])
}

fn parse_coordinate(token: &str) -> Option<Real> {
    token.trim().parse::<Real>().ok().filter(|v| v.is_finite())
}

/// Build the composite static body for `rings` and register it with `physics`
pub(crate) fn build_static_body(
    physics: &mut PhysicsWorld,
    rings: &[Ring],
    placement: &MapPlacement,
) -> RigidBodyHandle {
    let polygons: Vec<Ring> = rings
        .iter()
        .enumerate()
        .filter(|(index, ring)| {
            if ring.is_empty() {
                return false;
            }
            let usable = ring.len() >= 3 && ring_area(ring).abs() > MIN_RING_AREA;
            if !usable {
                warn!(ring = *index, points = ring.len(), "Skipping degenerate map ring");
            }
            usable
        })
        .map(|(_, ring)| ring.iter().map(|p| placement.apply(p)).collect())
        .collect();

    physics.insert_static_polygons(MAP_LABEL, &polygons)
}

/// Signed shoelace area
fn ring_area(ring: &[Point2]) -> Real {
    let n = ring.len();
    let twice_area: Real = (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice_area / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(rings: &[Ring]) -> String {
        rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .map(|p| format!("{},{}", p.x, p.y))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n#\n")
    }

    #[test]
    fn parses_rings_split_by_separator() {
        let rings = parse("0,0\n10,0\n10,10\n#\n-5.5,2\n3,4.25\n1,1").unwrap();

        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0], vec![point![0.0, 0.0], point![10.0, 0.0], point![10.0, 10.0]]);
        assert_eq!(rings[1][0], point![-5.5, 2.0]);
        assert_eq!(rings[1][1], point![3.0, 4.25]);
    }

    #[test]
    fn trailing_separator_leaves_an_empty_ring() {
        let rings = parse("1,2\n3,4\n5,6\n#").unwrap();
        assert_eq!(rings.len(), 2);
        assert!(rings[1].is_empty());
    }

    #[test]
    fn trailing_newline_is_not_a_record() {
        let rings = parse("1,2\n3,4\n").unwrap();
        assert_eq!(rings, vec![vec![point![1.0, 2.0], point![3.0, 4.0]]]);
    }

    #[test]
    fn reserialized_rings_parse_to_the_same_values() {
        let raw = "12.5,-3\n0.125,7\n100,200\n#\n1e2,3\n-0.75,0.5\n4,4";
        let rings = parse(raw).unwrap();
        let reparsed = parse(&serialize(&rings)).unwrap();
        assert_eq!(rings, reparsed);
    }

    #[test]
    fn malformed_records_fail_the_whole_parse() {
        for bad in ["1,", "abc,5", "1", ",2", "1,2,3", "", "nan,1", "# "] {
            let raw = format!("0,0\n{bad}\n5,5");
            match parse(&raw) {
                Err(GameError::MalformedGeometry { line, content }) => {
                    assert_eq!(line, 2);
                    assert_eq!(content, bad);
                }
                other => panic!("expected MalformedGeometry for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn placement_translates_before_scaling() {
        let placed = MapPlacement::default().apply(&point![10.0, 20.0]);
        assert_eq!(placed, point![(10.0 + 117.5) * 2.0, (20.0 + 100.0) * 2.0]);
        assert_eq!(MapPlacement::identity().apply(&point![3.0, 4.0]), point![3.0, 4.0]);
    }

    #[test]
    fn degenerate_rings_are_skipped() {
        let mut physics = PhysicsWorld::default();
        let rings = parse("0,0\n1,1\n#\n0,0\n5,5\n10,10\n#\n0,0\n40,0\n40,40\n0,40\n#").unwrap();

        let body = build_static_body(&mut physics, &rings, &MapPlacement::identity());
        physics.step();

        assert_eq!(physics.label(body), Some(MAP_LABEL));
        assert_eq!(physics.body_at_point(&point![20.0, 20.0], None), Some(body));
        assert_eq!(physics.body(body).map(|b| b.colliders().len()), Some(1));
    }
}

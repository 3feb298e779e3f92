// planar polygonization of a road network into closed blocks
//
// roads are noded first (split wherever they cross or touch), dangling roads are pruned,
// then every bounded face of the resulting planar graph is walked as one block.
// rings of a network lying inside another block without touching it become holes of that block

use std::collections::{BTreeSet, HashMap, HashSet};

use bevy::math::DVec2;
use rstar::primitives::{GeomWithData, Line};
use rstar::{AABB, RTree, RTreeObject};

use crate::config::NODE_SNAP_TOLERANCE;
use crate::systems::geometry::utils::{bridge_holes, point_in_polygon, point_to_segment_distance, polygon_area};
use crate::systems::geometry::{Polygon, intersect_segments};

use super::LineSegment;

type IndexedLine = GeomWithData<Line<[f64; 2]>, usize>;

/// Polygonizes road segments into closed block polygons.
///
/// # Returns
/// One counter-clockwise polygon per bounded face. Faces enclosing a disconnected ring of
/// roads have it cut out as a hole (see `bridge_holes`). Dangling roads and roads that never
/// close a ring produce nothing.
pub fn polygonize(roads: &[LineSegment]) -> Vec<Polygon> {
    let segments: Vec<(DVec2, DVec2)> = roads
        .iter()
        .map(|r| (r.start(), r.end()))
        .filter(|(a, b)| a.distance(*b) > NODE_SNAP_TOLERANCE)
        .collect();

    if segments.len() < 3 {
        return Vec::new();
    }

    let mut graph = PlanarGraph::default();
    for (a, b) in node_segments(&segments) {
        graph.add_edge(a, b);
    }

    graph.prune_dangles();
    graph.bounded_faces()
}

// split every segment at the points it shares with any other segment
fn node_segments(segments: &[(DVec2, DVec2)]) -> Vec<(DVec2, DVec2)> {
    let tree: RTree<IndexedLine> = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(i, (a, b))| GeomWithData::new(Line::new([a.x, a.y], [b.x, b.y]), i))
            .collect(),
    );

    let mut splits: Vec<Vec<DVec2>> = segments.iter().map(|(a, b)| vec![*a, *b]).collect();

    for (i, &(a, b)) in segments.iter().enumerate() {
        let env = GeomWithData::new(Line::new([a.x, a.y], [b.x, b.y]), i).envelope();
        let lower = env.lower();
        let upper = env.upper();
        let window = AABB::from_corners(
            [lower[0] - NODE_SNAP_TOLERANCE, lower[1] - NODE_SNAP_TOLERANCE],
            [upper[0] + NODE_SNAP_TOLERANCE, upper[1] + NODE_SNAP_TOLERANCE],
        );

        for other in tree.locate_in_envelope_intersecting(&window) {
            let j = other.data;
            if j <= i {
                continue;
            }
            let (c, d) = segments[j];

            // endpoints resting on the other segment (t-junctions, collinear overlaps)
            for p in [c, d] {
                if point_to_segment_distance(p, a, b) <= NODE_SNAP_TOLERANCE {
                    splits[i].push(p);
                }
            }
            for p in [a, b] {
                if point_to_segment_distance(p, c, d) <= NODE_SNAP_TOLERANCE {
                    splits[j].push(p);
                }
            }

            if let Some(hit) = intersect_segments(a, b, c, d) {
                let hit = snap_to_endpoint(hit, [a, b, c, d]);
                splits[i].push(hit);
                splits[j].push(hit);
            }
        }
    }

    let mut edges = Vec::new();
    for (points, &(a, _)) in splits.iter_mut().zip(segments) {
        points.sort_by(|p, q| p.distance_squared(a).total_cmp(&q.distance_squared(a)));
        points.dedup_by(|p, q| p.distance(*q) <= NODE_SNAP_TOLERANCE);

        for pair in points.windows(2) {
            edges.push((pair[0], pair[1]));
        }
    }
    edges
}

// an intersection on top of an existing endpoint becomes that endpoint exactly
fn snap_to_endpoint(hit: DVec2, endpoints: [DVec2; 4]) -> DVec2 {
    endpoints
        .into_iter()
        .find(|p| p.distance(hit) <= NODE_SNAP_TOLERANCE)
        .unwrap_or(hit)
}

#[derive(Default)]
struct PlanarGraph {
    nodes: Vec<DVec2>,
    node_lookup: HashMap<(i64, i64), usize>,
    edges: BTreeSet<(usize, usize)>, // undirected as (min, max), ordered so faces come out in a stable order
}

impl PlanarGraph {
    fn node(&mut self, p: DVec2) -> usize {
        let key = (
            (p.x / NODE_SNAP_TOLERANCE).round() as i64,
            (p.y / NODE_SNAP_TOLERANCE).round() as i64,
        );
        if let Some(&idx) = self.node_lookup.get(&key) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(p);
        self.node_lookup.insert(key, idx);
        idx
    }

    fn add_edge(&mut self, a: DVec2, b: DVec2) {
        let u = self.node(a);
        let v = self.node(b);
        if u != v {
            self.edges.insert((u.min(v), u.max(v)));
        }
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for &(u, v) in &self.edges {
            adjacency[u].push(v);
            adjacency[v].push(u);
        }
        adjacency
    }

    // repeatedly drop edges hanging off degree-1 nodes
    fn prune_dangles(&mut self) {
        let mut adjacency = self.adjacency();
        let mut stack: Vec<usize> = (0..self.nodes.len()).filter(|&n| adjacency[n].len() == 1).collect();

        while let Some(n) = stack.pop() {
            if adjacency[n].len() != 1 {
                continue;
            }
            let m = adjacency[n][0];
            adjacency[n].clear();
            adjacency[m].retain(|&k| k != n);
            self.edges.remove(&(n.min(m), n.max(m)));

            if adjacency[m].len() == 1 {
                stack.push(m);
            }
        }
    }

    // walk every half-edge keeping its face on the left
    // counter-clockwise rings are bounded faces, clockwise ones trace a component's outline
    fn bounded_faces(&self) -> Vec<Polygon> {
        // outgoing neighbours sorted counter-clockwise by angle
        let mut adjacency = self.adjacency();
        for (n, neighbours) in adjacency.iter_mut().enumerate() {
            let origin = self.nodes[n];
            neighbours.sort_by(|&a, &b| {
                let da = self.nodes[a] - origin;
                let db = self.nodes[b] - origin;
                da.y.atan2(da.x).total_cmp(&db.y.atan2(db.x))
            });
        }

        let mut visited: HashSet<(usize, usize)> = HashSet::new();
        let mut faces: Vec<Face> = Vec::new();
        let mut outlines: Vec<Face> = Vec::new();

        for &(u, v) in &self.edges {
            for start in [(u, v), (v, u)] {
                if visited.contains(&start) {
                    continue;
                }

                let mut ring_nodes = Vec::new();
                let mut half_edge = start;
                loop {
                    visited.insert(half_edge);
                    ring_nodes.push(half_edge.0);

                    let (from, to) = half_edge;
                    let around = &adjacency[to];
                    let Some(back) = around.iter().position(|&k| k == from) else {
                        break;
                    };
                    // next edge clockwise from the way back
                    let next = around[(back + around.len() - 1) % around.len()];
                    half_edge = (to, next);

                    if half_edge == start || visited.contains(&half_edge) {
                        break;
                    }
                }

                if ring_nodes.len() < 3 {
                    continue;
                }
                let face = Face::new(ring_nodes, &self.nodes);
                if face.area > 0.0 {
                    faces.push(face);
                } else if face.area < 0.0 {
                    outlines.push(face);
                }
            }
        }

        // an outline sharing no node with a face but lying inside it is a hole of the
        // smallest such face
        let mut holes: Vec<Vec<Polygon>> = vec![Vec::new(); faces.len()];
        for outline in outlines {
            let enclosing = faces
                .iter()
                .enumerate()
                .filter(|(_, face)| face.nodes.is_disjoint(&outline.nodes))
                .filter(|(_, face)| point_in_polygon(outline.ring[0], &face.ring))
                .min_by(|(_, a), (_, b)| a.area.total_cmp(&b.area))
                .map(|(idx, _)| idx);

            if let Some(idx) = enclosing {
                holes[idx].push(outline.ring);
            }
        }

        faces
            .into_iter()
            .zip(holes)
            .map(|(face, holes)| if holes.is_empty() { face.ring } else { bridge_holes(&face.ring, &holes) })
            .collect()
    }
}

struct Face {
    ring: Polygon,
    nodes: HashSet<usize>,
    area: f64,
}

impl Face {
    fn new(ring_nodes: Vec<usize>, positions: &[DVec2]) -> Self {
        let ring: Polygon = ring_nodes.iter().map(|&n| positions[n]).collect();
        let area = polygon_area(&ring);
        Self { ring, nodes: ring_nodes.into_iter().collect(), area }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::city::RoadType;

    fn road(x1: f64, y1: f64, x2: f64, y2: f64) -> LineSegment {
        LineSegment::new(x1, y1, x2, y2, RoadType::Secondary)
    }

    fn square_roads(size: f64) -> Vec<LineSegment> {
        vec![
            road(0.0, 0.0, size, 0.0),
            road(size, 0.0, size, size),
            road(size, size, 0.0, size),
            road(0.0, size, 0.0, 0.0),
        ]
    }

    #[test]
    fn closed_square_gives_one_block() {
        let blocks = polygonize(&square_roads(1.0));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 4);
        assert!((polygon_area(&blocks[0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dangling_roads_are_ignored() {
        let mut roads = square_roads(1.0);
        roads.push(road(1.0, 1.0, 2.0, 2.0));
        roads.push(road(0.5, 0.5, 0.7, 0.5)); // floating inside the block
        let blocks = polygonize(&roads);
        assert_eq!(blocks.len(), 1);
        assert!((polygon_area(&blocks[0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn open_network_has_no_blocks() {
        let roads = vec![road(0.0, 0.0, 1.0, 0.0), road(1.0, 0.0, 1.0, 1.0), road(1.0, 1.0, 0.0, 1.0)];
        assert!(polygonize(&roads).is_empty());
        assert!(polygonize(&[]).is_empty());
    }

    #[test]
    fn crossing_grid_lines_are_noded_into_cells() {
        // 3 vertical and 3 horizontal lines spanning the whole grid -> 2x2 cells
        let mut roads = Vec::new();
        for i in 0..3 {
            let f = i as f64;
            roads.push(road(f, 0.0, f, 2.0));
            roads.push(road(0.0, f, 2.0, f));
        }
        let blocks = polygonize(&roads);
        assert_eq!(blocks.len(), 4);
        for block in &blocks {
            assert_eq!(block.len(), 4);
            assert!((polygon_area(block) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn t_junction_splits_the_block() {
        let mut roads = square_roads(2.0);
        roads.push(road(1.0, 0.0, 1.0, 2.0));
        let blocks = polygonize(&roads);
        assert_eq!(blocks.len(), 2);
        let total: f64 = blocks.iter().map(|b| polygon_area(b)).sum();
        assert!((total - 4.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_roads_do_not_duplicate_blocks() {
        let mut roads = square_roads(1.0);
        roads.extend(square_roads(1.0));
        assert_eq!(polygonize(&roads).len(), 1);
    }

    #[test]
    fn ring_inside_a_block_becomes_its_hole() {
        let mut roads = square_roads(0.03);
        for road in square_roads(0.01) {
            let shift = DVec2::splat(0.01);
            roads.push(LineSegment::from_points(road.start() + shift, road.end() + shift, RoadType::Secondary));
        }

        let mut blocks = polygonize(&roads);
        assert_eq!(blocks.len(), 2);
        blocks.sort_by(|a, b| a.len().cmp(&b.len()));

        assert!((polygon_area(&blocks[0]) - 0.0001).abs() < 1e-12);
        assert!((polygon_area(&blocks[1]) - 0.0008).abs() < 1e-12);
        assert!(!point_in_polygon(DVec2::splat(0.015), &blocks[1]));
        assert!(point_in_polygon(DVec2::new(0.025, 0.015), &blocks[1]));
    }

    #[test]
    fn connected_inner_ring_is_not_cut_twice() {
        let mut roads = square_roads(3.0);
        for road in square_roads(1.0) {
            roads.push(LineSegment::from_points(road.start() + DVec2::ONE, road.end() + DVec2::ONE, RoadType::Secondary));
        }
        // a street tying the inner ring to the outer one
        roads.push(road(0.0, 1.0, 1.0, 1.0));

        let blocks = polygonize(&roads);
        assert_eq!(blocks.len(), 2);
        let total: f64 = blocks.iter().map(|b| polygon_area(b)).sum();
        assert!((total - 9.0).abs() < 1e-12);
    }
}

use crate::geom::{axis_diff, is_orthogonal, vector_angle};
use crate::params::GridGraphParams;
use crate::corners::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};
use std::f32::consts::FRAC_PI_4;

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // Colours swap across a grid edge, so the bright diagonals turn by 90°.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let edge = neighbor.position - corner.position;
    let distance = edge.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // Grid edges run at 45° to both bright diagonals.
    let edge_angle = edge.y.atan2(edge.x);
    let score_corner = (axis_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    Some(NodeNeighbor {
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor,
    })
}

/// Keep at most four candidates pointing in clearly different directions,
/// preferring the best scores.
fn select_neighbors(
    corner: &Corner,
    corners: &[Corner],
    mut candidates: Vec<NodeNeighbor>,
) -> Vec<NodeNeighbor> {
    candidates.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(a.distance.total_cmp(&b.distance))
    });

    let mut selected: Vec<NodeNeighbor> = Vec::with_capacity(4);
    for candidate in candidates {
        if selected.len() == 4 {
            break;
        }
        let dir = corners[candidate.index].position - corner.position;
        let distinct = selected.iter().all(|s| {
            let other = corners[s.index].position - corner.position;
            vector_angle(dir, other) > FRAC_PI_4
        });
        if distinct {
            selected.push(candidate);
        }
    }
    selected
}

/// Undirected 4-connected graph over corner candidates.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let results = tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1);

            let candidates = results
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params))
                .collect();
            neighbors.push(select_neighbors(corner, corners, candidates));
        }

        // Keep only edges both endpoints agree on.
        let mutual: Vec<Vec<NodeNeighbor>> = neighbors
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| neighbors[n.index].iter().any(|back| back.index == i))
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors: mutual }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);
            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    components
}

fn quarter_turn(v: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(-v.y, v.x)
}

/// Seed axes from the start node's edges: `u` points most to the right,
/// `v` is the most perpendicular edge turned to `u x v > 0`.
fn seed_axes(
    corners: &[Corner],
    graph: &GridGraph,
    start: usize,
) -> Option<(Vector2<f32>, Vector2<f32>)> {
    let origin = corners[start].position;
    let edges: Vec<Vector2<f32>> = graph.neighbors[start]
        .iter()
        .map(|n| corners[n.index].position - origin)
        .collect();

    let u = *edges.iter().max_by(|a, b| a.x.total_cmp(&b.x))?;
    let un = u.normalize();
    let best_v = edges
        .iter()
        .map(|e| (e, un.perp(&e.normalize())))
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));

    let v = match best_v {
        Some((e, cross)) if cross.abs() > 0.5 => {
            if cross > 0.0 {
                *e
            } else {
                -*e
            }
        }
        _ => quarter_turn(u),
    };
    Some((u, v))
}

/// Label a connected component with integer grid coordinates `(i, j)`.
///
/// Edges are classified against local axes carried along the BFS, so the
/// labelling survives rotation and moderate perspective. Returns `None` when
/// two corners claim the same cell or an edge contradicts an earlier label.
pub fn assign_grid_coordinates(
    corners: &[Corner],
    graph: &GridGraph,
    component: &[usize],
) -> Option<HashMap<(i32, i32), usize>> {
    let start = *component.iter().max_by(|&&a, &&b| {
        graph.neighbors[a]
            .len()
            .cmp(&graph.neighbors[b].len())
            .then(corners[a].strength.total_cmp(&corners[b].strength))
            .then(b.cmp(&a))
    })?;
    let (u0, v0) = seed_axes(corners, graph, start)?;

    let mut labels: Vec<Option<(i32, i32)>> = vec![None; corners.len()];
    let mut axes = vec![(u0, v0); corners.len()];
    let mut queue = VecDeque::new();
    labels[start] = Some((0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = labels[node]?;
        let (u, v) = axes[node];
        let det = u.x * v.y - u.y * v.x;
        if det.abs() < 1e-6 {
            return None;
        }

        for neighbor in &graph.neighbors[node] {
            let m = neighbor.index;
            let e = corners[m].position - corners[node].position;
            // e = a * u + b * v
            let a = (e.x * v.y - e.y * v.x) / det;
            let b = (u.x * e.y - u.y * e.x) / det;

            let (step, new_axes) = if a.abs() >= b.abs() {
                if (a.abs() - 1.0).abs() > 0.5 || b.abs() > 0.5 {
                    continue;
                }
                let s = a.signum() as i32;
                ((s, 0), (e * a.signum(), v))
            } else {
                if (b.abs() - 1.0).abs() > 0.5 || a.abs() > 0.5 {
                    continue;
                }
                let s = b.signum() as i32;
                ((0, s), (u, e * b.signum()))
            };

            let expected = (i + step.0, j + step.1);
            match labels[m] {
                Some(existing) if existing != expected => return None,
                Some(_) => {}
                None => {
                    labels[m] = Some(expected);
                    axes[m] = new_axes;
                    queue.push_back(m);
                }
            }
        }
    }

    let mut cells = HashMap::new();
    for &node in component {
        if let Some(cell) = labels[node] {
            if cells.insert(cell, node).is_some() {
                return None;
            }
        }
    }
    Some(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Rotation2};

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner {
            position: Point2::new(x, y),
            orientation,
            strength: 1.0,
        }
    }

    /// Ideal grid rotated by `angle` around the origin.
    fn grid(cols: usize, rows: usize, spacing: f32, angle: f32) -> Vec<Corner> {
        let rot = Rotation2::new(angle);
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let p = rot * Vector2::new(i as f32 * spacing, j as f32 * spacing);
                let base = if (i + j) % 2 == 0 { FRAC_PI_4 } else { -FRAC_PI_4 };
                let orientation = base + angle;
                corners.push(make_corner(100.0 + p.x, 100.0 + p.y, orientation));
            }
        }
        corners
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = grid(3, 3, 10.0, 0.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let idx = |i: usize, j: usize| j * 3 + i;

        let mut center: Vec<usize> = graph.neighbors[idx(1, 1)].iter().map(|n| n.index).collect();
        center.sort_unstable();
        assert_eq!(center, vec![idx(1, 0), idx(0, 1), idx(2, 1), idx(1, 2)]);
        for n in &graph.neighbors[idx(1, 1)] {
            assert!((n.distance - 10.0).abs() < 1e-4);
        }
        assert_eq!(graph.neighbors[idx(0, 0)].len(), 2);
        assert_eq!(connected_components(&graph).len(), 1);
    }

    #[test]
    fn labels_rotated_grid_consistently() {
        for angle in [0.0f32, 0.3, FRAC_PI_4, 1.2, -2.0] {
            let corners = grid(5, 4, 20.0, angle);
            let graph = GridGraph::new(&corners, &GridGraphParams::default());
            let components = connected_components(&graph);
            assert_eq!(components.len(), 1);
            let cells = assign_grid_coordinates(&corners, &graph, &components[0]).expect("labels");
            assert_eq!(cells.len(), 20);

            let span = |f: fn(&(i32, i32)) -> i32| {
                let lo = cells.keys().map(f).min().unwrap_or(0);
                let hi = cells.keys().map(f).max().unwrap_or(0);
                (hi - lo + 1) as usize
            };
            let dims = (span(|k| k.0), span(|k| k.1));
            assert!(dims == (5, 4) || dims == (4, 5), "angle {angle}: {dims:?}");
        }
    }

    #[test]
    fn same_orientation_corners_are_not_linked() {
        let corners = vec![make_corner(0.0, 0.0, FRAC_PI_4), make_corner(10.0, 0.0, FRAC_PI_4)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        assert!(graph.neighbors.iter().all(|n| n.is_empty()));
    }
}

use std::collections::{BTreeSet, VecDeque};

use crate::{var, Panorama};

/// Undirected image graph.
///
/// Two images are adjacent when a control point joins them or when they share yaw, pitch
/// and roll (images of one stack).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageGraph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl ImageGraph {
    pub fn new(pano: &Panorama) -> Self {
        let n = pano.nr_of_images();
        let mut graph = Self::with_images(n);
        for cp in pano.ctrl_points() {
            graph.add_edge(cp.image1, cp.image2);
        }
        let images = pano.images();
        for i in 0..n {
            for j in i + 1..n {
                let (a, b) = (&images[i], &images[j]);
                if a.is_linked_with::<var::Yaw>(b) && a.is_linked_with::<var::Pitch>(b) && a.is_linked_with::<var::Roll>(b)
                {
                    graph.add_edge(i, j);
                }
            }
        }
        graph
    }

    /// A graph of `n` isolated images.
    pub fn with_images(n: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
        }
    }

    /// Join `a` and `b`; self loops and out-of-range indices are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        let n = self.adjacency.len();
        if a == b || a >= n || b >= n {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn neighbours(&self, image: usize) -> &BTreeSet<usize> {
        &self.adjacency[image]
    }

    /// Breadth-first visit of the component of `start`, each image once.
    pub fn traverse_vertices(&self, start: usize, mut visit: impl FnMut(usize)) {
        if start >= self.adjacency.len() {
            return;
        }
        let mut seen = vec![false; self.adjacency.len()];
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        while let Some(v) = queue.pop_front() {
            visit(v);
            for &w in &self.adjacency[v] {
                if !seen[w] {
                    seen[w] = true;
                    queue.push_back(w);
                }
            }
        }
    }

    /// Breadth-first visit of every edge reachable from `start`, each edge once, as
    /// `(from, to)` with `from` discovered first.
    pub fn traverse_edges(&self, start: usize, mut visit: impl FnMut(usize, usize)) {
        if start >= self.adjacency.len() {
            return;
        }
        let mut seen = vec![false; self.adjacency.len()];
        let mut done: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        while let Some(v) = queue.pop_front() {
            for &w in &self.adjacency[v] {
                if done.insert((v.min(w), v.max(w))) {
                    visit(v, w);
                }
                if !seen[w] {
                    seen[w] = true;
                    queue.push_back(w);
                }
            }
        }
    }

    /// Connected components, ordered by their smallest image.
    pub fn components(&self) -> Vec<BTreeSet<usize>> {
        let mut assigned = vec![false; self.adjacency.len()];
        let mut out = Vec::new();
        for start in 0..self.adjacency.len() {
            if assigned[start] {
                continue;
            }
            let mut component = BTreeSet::new();
            self.traverse_vertices(start, |v| {
                assigned[v] = true;
                component.insert(v);
            });
            out.push(component);
        }
        out
    }

    /// True for zero or one component.
    pub fn is_connected(&self) -> bool {
        self.components().len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ControlPoint, Size2D, SrcPanoImage};

    fn pano(n: usize) -> Panorama {
        let mut pano = Panorama::new();
        for i in 0..n {
            pano.add_image(SrcPanoImage::new(format!("{i}.jpg"), Size2D::new(100, 100)));
        }
        pano
    }

    #[test]
    fn control_points_and_stacks_connect() {
        let mut pano = pano(5);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 1.0, 1.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 0, 1.0, 1.0, ControlPoint::X_Y));
        pano.link_image_variable::<var::Yaw>(2, 3);
        pano.link_image_variable::<var::Pitch>(2, 3);
        let graph = ImageGraph::new(&pano);
        assert_eq!(graph.components().len(), 4);

        pano.link_image_variable::<var::Roll>(2, 3);
        pano.add_ctrl_point(ControlPoint::new(3, 1.0, 1.0, 4, 1.0, 1.0, ControlPoint::X_Y));
        let graph = ImageGraph::new(&pano);
        assert_eq!(graph.components(), [BTreeSet::from([0, 1]), BTreeSet::from([2, 3, 4])]);
        assert!(!graph.is_connected());
        assert_eq!(graph.neighbours(0), &BTreeSet::from([1]));
    }

    #[test]
    fn traversal_visits_each_edge_once() {
        let mut graph = ImageGraph::with_images(4);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 0);
        graph.add_edge(3, 3);
        let mut edges = Vec::new();
        graph.traverse_edges(0, |a, b| edges.push((a, b)));
        assert_eq!(edges, [(0, 1), (0, 2), (1, 2)]);

        let mut order = Vec::new();
        graph.traverse_vertices(2, |v| order.push(v));
        assert_eq!(order, [2, 0, 1]);
        assert!(ImageGraph::default().is_connected());
    }
}

mod measure;

use crate::config::MAX_VERTEX_ORDER;
use crate::config::MAX_VERTICES;
use crate::config::TOLERANCE;
use crate::error::fatal_error;
use crate::error::ExitCode;
use crate::prelude::Float;
use crate::prelude::Point3d;

/// Classification of a vertex against a cutting plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    /// Strictly beyond the plane; the vertex is removed by the cut.
    Up,
    /// Strictly on the retained side.
    Down,
    /// Within tolerance of the plane; the vertex survives the cut in place.
    On,
}

/// Outcome of cutting a cell by a half-space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clip {
    /// No vertex was beyond the plane; the cell is unchanged.
    Unchanged,
    /// The cell was cut and a new face created.
    Cut,
    /// No vertex survived strictly below the plane; the cell is empty.
    Annihilated,
}

/// A convex polyhedron represented as a vertex/edge graph, built by starting
/// from a bounding box and repeatedly cutting with half-spaces.
///
/// Vertex positions are stored in the frame of the owning particle. For each
/// vertex `v`, `edges[v]` lists its neighbors in a fixed cyclic orientation
/// and `back[v][k]` gives the slot in `edges[edges[v][k]]` that points back
/// at `v`. Face loops are traversed by the rule: having arrived at vertex `j`
/// from `i` via the slot `l` that points back at `i`, depart along slot
/// `(l + 1) % order(j)`.
///
/// When neighbor tracking is enabled, `tags[v][k]` records, for the directed
/// edge `(v, k)`, the identifier of the plane that created the face this
/// directed edge belongs to. All directed edges of one face loop share a tag.
pub struct VoronoiCell {
    verts: Vec<Point3d>,
    edges: Vec<Vec<usize>>,
    back: Vec<Vec<usize>>,
    tags: Option<Vec<Vec<i64>>>,
    // per-clip scratch, indexed like verts
    dist: Vec<Float>,
    side: Vec<Side>,
}

// The vertex/edge tables of the initial box. Vertex i sits at the corner
// selected by the low three bits of i (bit 0: x, bit 1: y, bit 2: z). The
// rings encode a consistent orientation; every back table row is [2, 1, 0].
const INIT_EDGES: [[usize; 3]; 8] = [
    [1, 4, 2],
    [3, 5, 0],
    [0, 6, 3],
    [2, 7, 1],
    [6, 0, 5],
    [4, 1, 7],
    [7, 2, 4],
    [5, 3, 6],
];

// One directed edge on each face loop of the initial box, together with the
// wall identifier of that face (-1/-2: x, -3/-4: y, -5/-6: z).
const INIT_FACES: [(usize, usize, i64); 6] = [
    (0, 2, -1),
    (1, 1, -2),
    (0, 1, -3),
    (6, 1, -4),
    (0, 0, -5),
    (4, 0, -6),
];

impl VoronoiCell {
    /// Creates an empty cell. `track_neighbors` enables the per-edge tag
    /// table consumed by neighbor output.
    pub fn new(track_neighbors: bool) -> Self {
        Self {
            verts: Vec::new(),
            edges: Vec::new(),
            back: Vec::new(),
            tags: track_neighbors.then(Vec::new),
            dist: Vec::new(),
            side: Vec::new(),
        }
    }

    /// Resets the cell to the axis-aligned box `[min, max]` in the local
    /// frame of the owning particle.
    pub fn init(&mut self, min: Point3d, max: Point3d) {
        self.verts.clear();
        self.edges.clear();
        self.back.clear();
        for i in 0..8 {
            self.verts.push(Point3d::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            ));
            self.edges.push(INIT_EDGES[i].to_vec());
            self.back.push(vec![2, 1, 0]);
        }
        if self.tags.is_some() {
            if let Some(tags) = &mut self.tags {
                tags.clear();
                tags.extend((0..8).map(|_| vec![0; 3]));
            }
            let mut buf = Vec::new();
            for (v, k, id) in INIT_FACES {
                self.face_edges(v, k, &mut buf);
                let tags = self.tags.as_mut().unwrap();
                for &(fv, fk) in &buf {
                    tags[fv][fk] = id;
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    pub fn number_of_vertices(&self) -> usize {
        self.verts.len()
    }

    /// Whether the cell carries the per-edge neighbor tag table.
    pub fn tracks_neighbors(&self) -> bool {
        self.tags.is_some()
    }

    /// The squared radius of the smallest origin-centered sphere enclosing
    /// all current vertices.
    pub fn max_radius_squared(&self) -> Float {
        self.verts
            .iter()
            .map(|v| v.length_squared())
            .fold(0.0, Float::max)
    }

    /// Cuts the cell by the half-space `{x : normal . x <= offset}`, keeping
    /// the side that contains the origin. Returns `false` if the cell was
    /// annihilated by the cut.
    pub fn plane(&mut self, normal: Point3d, offset: Float, tag: i64) -> bool {
        self.clip(normal, offset, tag) != Clip::Annihilated
    }

    /// Cuts the cell by the half-space `{x : normal . x <= offset}` and
    /// reports what happened.
    pub fn clip(&mut self, normal: Point3d, offset: Float, tag: i64) -> Clip {
        if self.verts.is_empty() {
            return Clip::Annihilated;
        }
        let n = self.verts.len();
        self.dist.clear();
        self.side.clear();
        let mut ups = 0;
        let mut downs = 0;
        for v in &self.verts {
            let d = normal.dot(*v) - offset;
            self.dist.push(d);
            self.side.push(if d > TOLERANCE {
                ups += 1;
                Side::Up
            } else if d < -TOLERANCE {
                downs += 1;
                Side::Down
            } else {
                Side::On
            });
        }
        if ups == 0 {
            return Clip::Unchanged;
        }
        if downs == 0 {
            // Nothing left strictly below the plane; a cell flattened onto
            // the plane carries no volume and is dropped as well.
            self.annihilate();
            return Clip::Annihilated;
        }

        let start = self.find_crossing().unwrap_or_else(|| {
            fatal_error(
                "Inconsistent cell graph: no edge crosses the cutting plane",
                ExitCode::InternalError,
            )
        });

        // Phase 1: walk around the boundary of the region beyond the plane,
        // one cut face per step, collecting the loop of the newly exposed
        // face. Each entry is either a fresh vertex on a crossing edge or a
        // surviving on-plane vertex. Old rings are only read here.
        let mut cap: Vec<usize> = Vec::new();
        let mut cap_new: Vec<Option<(usize, usize, usize)>> = Vec::new();
        let mut cap_face_tags: Vec<i64> = Vec::new();
        let total_directed: usize = self.edges.iter().map(Vec::len).sum();
        let mut steps = 0;
        let (mut cv, mut ck) = start;
        loop {
            let up = self.edges[cv][ck];
            let entry = if self.side[cv] == Side::On {
                cap_new.push(None);
                cv
            } else {
                let da = self.dist[cv];
                let db = self.dist[up];
                let p = self.verts[cv] + (self.verts[up] - self.verts[cv]) * (da / (da - db));
                let idx = self.verts.len();
                if idx >= MAX_VERTICES {
                    fatal_error(
                        "Maximum cell vertex allocation exceeded",
                        ExitCode::MemoryError,
                    );
                }
                self.verts.push(p);
                self.dist.push(0.0);
                self.side.push(Side::Down);
                self.edges.push(Vec::new());
                self.back.push(Vec::new());
                if let Some(tags) = &mut self.tags {
                    tags.push(Vec::new());
                }
                cap_new.push(Some((cv, ck, up)));
                idx
            };
            // A face whose entry and exit cut points are the same on-plane
            // vertex loses all its edges; it contributes nothing to the new
            // face loop, so its pending entry is dropped again.
            if cap.last() == Some(&entry) {
                cap.pop();
                cap_new.pop();
                cap_face_tags.pop();
            }
            cap.push(entry);
            cap_face_tags.push(self.read_tag(cv, ck));

            // march along this face loop until the far crossing back out
            let (mut pv, mut pk) = (cv, ck);
            loop {
                let (qv, qk) = self.next_edge(pv, pk);
                pv = qv;
                pk = qk;
                steps += 1;
                if steps > 2 * total_directed {
                    fatal_error(
                        "Cell face walk failed to terminate",
                        ExitCode::InternalError,
                    );
                }
                let target = self.edges[pv][pk];
                if self.side[target] != Side::Up {
                    cv = target;
                    ck = self.back[pv][pk];
                    break;
                }
            }
            if (cv, ck) == start {
                break;
            }
        }
        if cap.len() > 1 && cap.first() == cap.last() {
            cap.pop();
            cap_new.pop();
            cap_face_tags.pop();
        }

        let m = cap.len();
        if m < 3 {
            // A sliver within tolerance of the plane; undo the scratch
            // vertices and leave the cell as it was.
            self.truncate_to(n);
            return Clip::Unchanged;
        }

        // Phase 2: wire up the fresh vertices and splice them into the rings
        // of their surviving endpoints, at the slot vacated by the removed
        // neighbor.
        for i in 0..m {
            let v = cap[i];
            let next = cap[(i + 1) % m];
            let prev = cap[(i + m - 1) % m];
            if let Some((d, dk, up)) = cap_new[i] {
                let opposite = self.read_tag(up, self.back[d][dk]);
                self.edges[v] = vec![d, next, prev];
                self.back[v] = vec![dk, 2, 1];
                if let Some(tags) = &mut self.tags {
                    tags[v] = vec![opposite, cap_face_tags[i], tag];
                }
                self.edges[d][dk] = v;
                self.back[d][dk] = 0;
            }
        }

        // Phase 3: rebuild the rings of surviving on-plane vertices. The
        // neighbors beyond the plane form one contiguous arc of the ring;
        // it is replaced by the two adjacent vertices of the new face loop,
        // skipping ones that are already ring neighbors (a cut face that
        // degenerated onto an existing edge re-tags that edge instead).
        for i in 0..m {
            if cap_new[i].is_some() {
                continue;
            }
            let o = cap[i];
            let next = cap[(i + 1) % m];
            let prev = cap[(i + m - 1) % m];
            let len = self.edges[o].len();
            let mut arc_start = None;
            for k in 0..len {
                let before = (k + len - 1) % len;
                if self.side[self.edges[o][k]] == Side::Up
                    && self.side[self.edges[o][before]] != Side::Up
                {
                    arc_start = Some(k);
                    break;
                }
            }
            let arc_start = arc_start.unwrap_or_else(|| {
                fatal_error(
                    "On-plane vertex without removed neighbors on the new face loop",
                    ExitCode::InternalError,
                )
            });
            let mut arc_len = 1;
            while self.side[self.edges[o][(arc_start + arc_len) % len]] == Side::Up {
                arc_len += 1;
            }
            let survivors = len - arc_len;
            let next_slot = (arc_start + arc_len) % len;
            let s_prev = self.edges[o][(arc_start + len - 1) % len];
            let s_next = self.edges[o][next_slot];

            let mut ring = Vec::with_capacity(survivors + 2);
            let mut ring_tags = Vec::with_capacity(survivors + 2);
            for j in 0..survivors {
                let slot = (next_slot + j) % len;
                ring.push(self.edges[o][slot]);
                ring_tags.push(self.read_tag(o, slot));
            }
            if next != s_prev {
                ring.push(next);
                ring_tags.push(cap_face_tags[i]);
            } else {
                // the cut face collapsed onto the existing edge; its far
                // directed side now belongs to the new face
                let slot = self.slot_of(o, s_prev);
                if let Some(tags) = &mut self.tags {
                    tags[s_prev][slot] = tag;
                }
            }
            if prev != s_next {
                ring.push(prev);
                ring_tags.push(tag);
            } else {
                ring_tags[0] = tag;
            }
            if ring.len() > MAX_VERTEX_ORDER {
                fatal_error(
                    "Maximum cell vertex order exceeded",
                    ExitCode::MemoryError,
                );
            }
            self.back[o] = vec![0; ring.len()];
            self.edges[o] = ring;
            if let Some(tags) = &mut self.tags {
                tags[o] = ring_tags;
            }
        }

        // Phase 4: recompute the back tables of every vertex whose ring was
        // touched, and of the ring neighbors whose slots shifted.
        let mut touched = cap.clone();
        for i in 0..m {
            touched.extend(self.edges[cap[i]].iter().copied());
        }
        touched.sort_unstable();
        touched.dedup();
        for &v in &touched {
            if self.side[v] == Side::Up {
                continue;
            }
            for k in 0..self.edges[v].len() {
                let t = self.edges[v][k];
                self.back[v][k] = self.slot_of(v, t);
            }
        }

        // Phase 5: an on-plane vertex pinched down to two edges by a doubly
        // degenerate cut is dissolved into a single edge.
        for i in 0..m {
            let o = cap[i];
            if cap_new[i].is_some() || self.edges[o].len() >= 3 {
                continue;
            }
            let a = self.edges[o][0];
            let b = self.edges[o][1];
            let pa = self.back[o][0];
            let pb = self.back[o][1];
            self.edges[a][pa] = b;
            self.back[a][pa] = pb;
            self.edges[b][pb] = a;
            self.back[b][pb] = pa;
            self.side[o] = Side::Up;
        }

        // Phase 6: drop the vertices beyond the plane, compacting the tables
        // by moving the last vertex into each hole.
        let dead: Vec<usize> = (0..n).filter(|&v| self.side[v] == Side::Up).collect();
        for &idx in dead.iter().rev() {
            let last = self.verts.len() - 1;
            if idx != last {
                for k in 0..self.edges[last].len() {
                    let t = self.edges[last][k];
                    let l = self.back[last][k];
                    self.edges[t][l] = idx;
                }
            }
            self.verts.swap_remove(idx);
            self.edges.swap_remove(idx);
            self.back.swap_remove(idx);
            self.dist.swap_remove(idx);
            self.side.swap_remove(idx);
            if let Some(tags) = &mut self.tags {
                tags.swap_remove(idx);
            }
        }
        Clip::Cut
    }

    /// Verifies the back-link consistency of the edge tables:
    /// `edges[edges[v][k]][back[v][k]] == v` for every directed edge.
    pub fn check_relations(&self) -> bool {
        (0..self.verts.len()).all(|v| {
            self.edges[v].len() >= 3
                && self.edges[v].len() == self.back[v].len()
                && (0..self.edges[v].len())
                    .all(|k| self.edges[self.edges[v][k]][self.back[v][k]] == v)
        })
    }

    fn annihilate(&mut self) {
        self.verts.clear();
        self.edges.clear();
        self.back.clear();
        if let Some(tags) = &mut self.tags {
            tags.clear();
        }
    }

    fn truncate_to(&mut self, n: usize) {
        self.verts.truncate(n);
        self.edges.truncate(n);
        self.back.truncate(n);
        self.dist.truncate(n);
        self.side.truncate(n);
        if let Some(tags) = &mut self.tags {
            tags.truncate(n);
        }
    }

    /// The next directed edge along the face loop containing `(v, k)`.
    fn next_edge(&self, v: usize, k: usize) -> (usize, usize) {
        let t = self.edges[v][k];
        let l = self.back[v][k];
        (t, (l + 1) % self.edges[t].len())
    }

    /// Collects the directed edges of the face loop starting at `(v0, k0)`.
    fn face_edges(&self, v0: usize, k0: usize, buf: &mut Vec<(usize, usize)>) {
        buf.clear();
        let (mut v, mut k) = (v0, k0);
        loop {
            buf.push((v, k));
            let (nv, nk) = self.next_edge(v, k);
            v = nv;
            k = nk;
            if (v, k) == (v0, k0) {
                break;
            }
        }
    }

    fn find_crossing(&self) -> Option<(usize, usize)> {
        (0..self.verts.len())
            .filter(|&v| self.side[v] != Side::Up)
            .find_map(|v| {
                (0..self.edges[v].len())
                    .find(|&k| self.side[self.edges[v][k]] == Side::Up)
                    .map(|k| (v, k))
            })
    }

    fn slot_of(&self, v: usize, t: usize) -> usize {
        self.edges[t]
            .iter()
            .position(|&x| x == v)
            .unwrap_or_else(|| {
                fatal_error(
                    "Inconsistent cell graph: missing reverse edge",
                    ExitCode::InternalError,
                )
            })
    }

    fn read_tag(&self, v: usize, k: usize) -> i64 {
        self.tags.as_ref().map(|t| t[v][k]).unwrap_or(0)
    }
}

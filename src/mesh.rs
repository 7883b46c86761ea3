//! Adaptive quadrilateral meshes stored as a forest of quadtrees.
//!
//! The domain is an axis-aligned rectangle split into an `nx x ny` grid of coarse cells. Each
//! coarse cell is the root of a quadtree. All cell corners live on an integer lattice with
//! `2^MAX_LEVEL` lattice units along each side of a coarse cell, which gives exact vertex
//! deduplication and exact neighbour lookup without any geometric tolerances.
use nalgebra::Point2;
use rustc_hash::FxHashMap;
use std::fmt;

pub mod refinement;

pub use refinement::RefinementSummary;

/// Maximum number of subdivisions of a coarse cell supported by the lattice.
pub const MAX_LEVEL: u8 = 20;

/// Number of faces of a quadrilateral cell.
pub const NUM_FACES: usize = 4;

/// Local vertex indices (in counter-clockwise vertex order SW, SE, NE, NW) of each face.
///
/// Faces are numbered `x-`, `x+`, `y-`, `y+`, and the two vertices of each face are ordered by
/// increasing coordinate along the face.
pub const FACE_VERTICES: [[usize; 2]; NUM_FACES] = [[0, 3], [1, 2], [0, 1], [3, 2]];

const LATTICE_CELL_SIZE: u64 = 1 << MAX_LEVEL;

/// Index of a cell in the mesh's cell arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

impl CellId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MeshError {
    InvalidDomain,
    InvalidSubdivisions { nx: usize, ny: usize },
    InvalidMaxLevel { requested: u8 },
    InactiveCell { cell: CellId },
    UnknownCell { cell: CellId },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain => write!(f, "domain must have strictly positive extent in each direction"),
            Self::InvalidSubdivisions { nx, ny } => {
                write!(f, "invalid number of coarse cells ({} x {})", nx, ny)
            }
            Self::InvalidMaxLevel { requested } => {
                write!(f, "max level {} exceeds lattice limit {}", requested, MAX_LEVEL)
            }
            Self::InactiveCell { cell } => write!(f, "cell {} is not active", cell),
            Self::UnknownCell { cell } => write!(f, "cell {} does not exist", cell),
        }
    }
}

impl std::error::Error for MeshError {}

#[derive(Debug, Clone)]
pub struct Cell {
    level: u8,
    parent: Option<CellId>,
    children: Option<[CellId; 4]>,
    /// Lattice coordinates of the SW corner.
    lattice_origin: [u64; 2],
    /// Vertex indices in counter-clockwise order SW, SE, NE, NW.
    vertices: [usize; 4],
    pub(crate) refine_flag: bool,
    pub(crate) coarsen_flag: bool,
}

impl Cell {
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    /// Children in z-order SW, SE, NW, NE.
    pub fn children(&self) -> Option<&[CellId; 4]> {
        self.children.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.children.is_none()
    }

    pub fn vertices(&self) -> &[usize; 4] {
        &self.vertices
    }

    pub fn refine_flag(&self) -> bool {
        self.refine_flag
    }

    pub fn coarsen_flag(&self) -> bool {
        self.coarsen_flag
    }

    fn lattice_size(&self) -> u64 {
        LATTICE_CELL_SIZE >> self.level
    }
}

#[derive(Debug, Clone)]
pub struct QuadTreeMesh {
    domain_min: Point2<f64>,
    domain_max: Point2<f64>,
    num_coarse: [usize; 2],
    max_level: u8,
    cells: Vec<Cell>,
    roots: Vec<CellId>,
    vertices: Vec<Point2<f64>>,
    vertex_lattice: Vec<[u64; 2]>,
    vertex_lookup: FxHashMap<[u64; 2], usize>,
    active: Vec<CellId>,
    active_index: Vec<Option<usize>>,
    generation: u64,
}

impl QuadTreeMesh {
    /// A single coarse cell covering `[lo, hi]^2`.
    pub fn hyper_cube(lo: f64, hi: f64) -> Result<Self, MeshError> {
        Self::hyper_rectangle(Point2::new(lo, lo), Point2::new(hi, hi), [1, 1])
    }

    /// An `nx x ny` grid of coarse cells covering the rectangle `[min, max]`.
    pub fn hyper_rectangle(min: Point2<f64>, max: Point2<f64>, [nx, ny]: [usize; 2]) -> Result<Self, MeshError> {
        let valid_extent = |lo: f64, hi: f64| lo.is_finite() && hi.is_finite() && hi > lo;
        if !valid_extent(min.x, max.x) || !valid_extent(min.y, max.y) {
            return Err(MeshError::InvalidDomain);
        }
        if nx == 0 || ny == 0 {
            return Err(MeshError::InvalidSubdivisions { nx, ny });
        }

        let mut mesh = Self {
            domain_min: min,
            domain_max: max,
            num_coarse: [nx, ny],
            max_level: MAX_LEVEL,
            cells: Vec::new(),
            roots: Vec::with_capacity(nx * ny),
            vertices: Vec::new(),
            vertex_lattice: Vec::new(),
            vertex_lookup: FxHashMap::default(),
            active: Vec::new(),
            active_index: Vec::new(),
            generation: 0,
        };

        for cy in 0..ny as u64 {
            for cx in 0..nx as u64 {
                let origin = [cx * LATTICE_CELL_SIZE, cy * LATTICE_CELL_SIZE];
                let id = mesh.push_cell(0, None, origin);
                mesh.roots.push(id);
            }
        }
        mesh.rebuild_active_cells();
        Ok(mesh)
    }

    /// Restricts refinement to the given level. Refinement flags on cells at this level are
    /// ignored.
    pub fn with_max_level(mut self, max_level: u8) -> Result<Self, MeshError> {
        if max_level > MAX_LEVEL {
            return Err(MeshError::InvalidMaxLevel { requested: max_level });
        }
        self.max_level = max_level;
        Ok(self)
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Incremented by every execution of refinement/coarsening.
    ///
    /// Objects derived from the mesh (DoF numberings, constraints, linear systems) record the
    /// generation they were built for and are rejected once it changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn domain(&self) -> (Point2<f64>, Point2<f64>) {
        (self.domain_min, self.domain_max)
    }

    pub fn domain_measure(&self) -> f64 {
        let extents = self.domain_max - self.domain_min;
        extents.x * extents.y
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Active cells in creation order: coarse cells in row-major order, each traversed
    /// depth-first with children in z-order.
    pub fn active_cells(&self) -> &[CellId] {
        &self.active
    }

    pub fn num_active_cells(&self) -> usize {
        self.active.len()
    }

    /// Position of the cell in [`active_cells`](Self::active_cells), if it is active.
    pub fn active_index(&self, cell: CellId) -> Option<usize> {
        self.active_index.get(cell.0).copied().flatten()
    }

    pub fn cell(&self, cell: CellId) -> &Cell {
        &self.cells[cell.0]
    }

    pub fn try_cell(&self, cell: CellId) -> Result<&Cell, MeshError> {
        self.cells.get(cell.0).ok_or(MeshError::UnknownCell { cell })
    }

    pub(crate) fn cell_mut(&mut self, cell: CellId) -> &mut Cell {
        &mut self.cells[cell.0]
    }

    pub fn cell_level(&self, cell: CellId) -> u8 {
        self.cell(cell).level
    }

    pub fn cell_vertices(&self, cell: CellId) -> &[usize; 4] {
        &self.cell(cell).vertices
    }

    /// Physical coordinates of the four corners, counter-clockwise starting at SW.
    pub fn cell_vertex_points(&self, cell: CellId) -> [Point2<f64>; 4] {
        self.cell(cell).vertices.map(|v| self.vertices[v])
    }

    /// Lower-left and upper-right corners of the cell.
    pub fn cell_bounds(&self, cell: CellId) -> (Point2<f64>, Point2<f64>) {
        let [sw, _, ne, _] = self.cell_vertex_points(cell);
        (sw, ne)
    }

    pub fn cell_measure(&self, cell: CellId) -> f64 {
        let (min, max) = self.cell_bounds(cell);
        (max.x - min.x) * (max.y - min.y)
    }

    pub fn cell_diameter(&self, cell: CellId) -> f64 {
        let (min, max) = self.cell_bounds(cell);
        (max - min).norm()
    }

    pub fn is_boundary_face(&self, cell: CellId, face: usize) -> bool {
        let c = self.cell(cell);
        let size = c.lattice_size();
        let [x0, y0] = c.lattice_origin;
        let [lx, ly] = self.lattice_extent();
        match face {
            0 => x0 == 0,
            1 => x0 + size == lx,
            2 => y0 == 0,
            3 => y0 + size == ly,
            _ => panic!("Face index {} out of bounds", face),
        }
    }

    pub fn vertex_on_boundary(&self, vertex: usize) -> bool {
        let [x, y] = self.vertex_lattice[vertex];
        let [lx, ly] = self.lattice_extent();
        x == 0 || y == 0 || x == lx || y == ly
    }

    /// The active cells sharing (part of) the given face, ordered by increasing coordinate along
    /// the face.
    ///
    /// The result is empty for boundary faces, a single cell if the neighbour is as fine or
    /// coarser, and several cells if the neighbour side is refined.
    pub fn face_neighbors(&self, cell: CellId, face: usize) -> Vec<CellId> {
        let mut neighbors = Vec::new();
        if self.is_boundary_face(cell, face) {
            return neighbors;
        }

        let c = self.cell(cell);
        let size = c.lattice_size();
        let [x0, y0] = c.lattice_origin;
        // Lattice coordinate just across the face, and the range along the face
        let (across, start, end, along_x) = match face {
            0 => (x0 - 1, y0, y0 + size, false),
            1 => (x0 + size, y0, y0 + size, false),
            2 => (y0 - 1, x0, x0 + size, true),
            3 => (y0 + size, x0, x0 + size, true),
            _ => panic!("Face index {} out of bounds", face),
        };

        let mut t = start;
        while t < end {
            let point = if along_x { [t, across] } else { [across, t] };
            let Some(neighbor) = self.locate_lattice(point) else {
                break;
            };
            let n = self.cell(neighbor);
            let n_start = if along_x { n.lattice_origin[0] } else { n.lattice_origin[1] };
            neighbors.push(neighbor);
            t = n_start + n.lattice_size();
        }
        neighbors
    }

    /// Finds the active cell containing the given physical point.
    ///
    /// Cells are treated as half-open boxes, except at the upper domain boundary, which belongs
    /// to the adjacent cells.
    pub fn locate(&self, point: &Point2<f64>) -> Option<CellId> {
        let extents = self.domain_max - self.domain_min;
        let [lx, ly] = self.lattice_extent();
        let to_lattice = |value: f64, min: f64, extent: f64, lattice_extent: u64| -> Option<u64> {
            let t = (value - min) / extent;
            if !(0.0..=1.0).contains(&t) {
                return None;
            }
            let l = (t * lattice_extent as f64).floor() as u64;
            Some(l.min(lattice_extent - 1))
        };
        let ix = to_lattice(point.x, self.domain_min.x, extents.x, lx)?;
        let iy = to_lattice(point.y, self.domain_min.y, extents.y, ly)?;
        self.locate_lattice([ix, iy])
    }

    fn lattice_extent(&self) -> [u64; 2] {
        [
            self.num_coarse[0] as u64 * LATTICE_CELL_SIZE,
            self.num_coarse[1] as u64 * LATTICE_CELL_SIZE,
        ]
    }

    fn locate_lattice(&self, [ix, iy]: [u64; 2]) -> Option<CellId> {
        let [lx, ly] = self.lattice_extent();
        if ix >= lx || iy >= ly {
            return None;
        }
        let cx = (ix / LATTICE_CELL_SIZE) as usize;
        let cy = (iy / LATTICE_CELL_SIZE) as usize;
        let mut current = self.roots[cy * self.num_coarse[0] + cx];
        while let Some(children) = self.cell(current).children {
            let c = self.cell(current);
            let half = c.lattice_size() / 2;
            let east = (ix - c.lattice_origin[0] >= half) as usize;
            let north = (iy - c.lattice_origin[1] >= half) as usize;
            current = children[east + 2 * north];
        }
        Some(current)
    }

    fn vertex_at(&mut self, lattice: [u64; 2]) -> usize {
        if let Some(&index) = self.vertex_lookup.get(&lattice) {
            return index;
        }
        let [lx, ly] = self.lattice_extent();
        let extents = self.domain_max - self.domain_min;
        let x = self.domain_min.x + extents.x * (lattice[0] as f64 / lx as f64);
        let y = self.domain_min.y + extents.y * (lattice[1] as f64 / ly as f64);
        let index = self.vertices.len();
        self.vertices.push(Point2::new(x, y));
        self.vertex_lattice.push(lattice);
        self.vertex_lookup.insert(lattice, index);
        index
    }

    fn push_cell(&mut self, level: u8, parent: Option<CellId>, origin: [u64; 2]) -> CellId {
        let size = LATTICE_CELL_SIZE >> level;
        let [x0, y0] = origin;
        let vertices = [
            self.vertex_at([x0, y0]),
            self.vertex_at([x0 + size, y0]),
            self.vertex_at([x0 + size, y0 + size]),
            self.vertex_at([x0, y0 + size]),
        ];
        let id = CellId(self.cells.len());
        self.cells.push(Cell {
            level,
            parent,
            children: None,
            lattice_origin: origin,
            vertices,
            refine_flag: false,
            coarsen_flag: false,
        });
        id
    }

    /// Splits an active cell into four children. Does not enforce balance.
    pub(crate) fn split_cell(&mut self, cell: CellId) {
        let (level, [x0, y0]) = {
            let c = self.cell(cell);
            debug_assert!(c.is_active());
            (c.level, c.lattice_origin)
        };
        let half = (LATTICE_CELL_SIZE >> level) / 2;
        let children = [[x0, y0], [x0 + half, y0], [x0, y0 + half], [x0 + half, y0 + half]]
            .map(|origin| self.push_cell(level + 1, Some(cell), origin));
        let c = self.cell_mut(cell);
        c.children = Some(children);
        c.refine_flag = false;
        c.coarsen_flag = false;
    }

    /// Turns the parent of four active children back into an active cell.
    pub(crate) fn merge_children(&mut self, parent: CellId) {
        let c = self.cell_mut(parent);
        c.children = None;
        c.refine_flag = false;
        c.coarsen_flag = false;
    }

    pub(crate) fn rebuild_active_cells(&mut self) {
        let mut active = Vec::new();
        let mut stack = Vec::new();
        for &root in &self.roots {
            stack.push(root);
            while let Some(cell) = stack.pop() {
                match &self.cells[cell.0].children {
                    Some(children) => stack.extend(children.iter().rev().copied()),
                    None => active.push(cell),
                }
            }
        }

        self.active_index.clear();
        self.active_index.resize(self.cells.len(), None);
        for (index, cell) in active.iter().enumerate() {
            self.active_index[cell.0] = Some(index);
        }
        self.active = active;
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }
}

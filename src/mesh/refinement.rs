//! Local refinement and coarsening of [`QuadTreeMesh`].
//!
//! Refinement keeps the mesh 2:1 face balanced: active cells sharing a face differ by at most one
//! level. A flagged cell whose refinement would violate this first refines its coarser face
//! neighbours, recursively.
use crate::mesh::{CellId, MeshError, QuadTreeMesh, NUM_FACES};
use log::debug;

/// What happened during one call to
/// [`execute_coarsening_and_refinement`](QuadTreeMesh::execute_coarsening_and_refinement).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RefinementSummary {
    /// Number of cells split, including cells refined to maintain balance.
    pub refined: usize,
    /// Number of sibling families merged into their parent.
    pub coarsened: usize,
    /// Number of refinement flags ignored because the cell is at the maximum level.
    pub clamped: usize,
    /// Number of families flagged for coarsening that could not be merged.
    pub coarsening_skipped: usize,
}

impl RefinementSummary {
    fn accumulate(&mut self, other: &RefinementSummary) {
        self.refined += other.refined;
        self.coarsened += other.coarsened;
        self.clamped += other.clamped;
        self.coarsening_skipped += other.coarsening_skipped;
    }
}

impl QuadTreeMesh {
    fn check_active(&self, cell: CellId) -> Result<(), MeshError> {
        if self.try_cell(cell)?.is_active() {
            Ok(())
        } else {
            Err(MeshError::InactiveCell { cell })
        }
    }

    pub fn set_refine_flag(&mut self, cell: CellId) -> Result<(), MeshError> {
        self.check_active(cell)?;
        self.cell_mut(cell).refine_flag = true;
        Ok(())
    }

    pub fn set_coarsen_flag(&mut self, cell: CellId) -> Result<(), MeshError> {
        self.check_active(cell)?;
        self.cell_mut(cell).coarsen_flag = true;
        Ok(())
    }

    pub fn clear_flags(&mut self) {
        let active = self.active_cells().to_vec();
        for cell in active {
            let c = self.cell_mut(cell);
            c.refine_flag = false;
            c.coarsen_flag = false;
        }
    }

    /// Applies all refinement and coarsening flags.
    ///
    /// Refinement is executed first. A family of four active siblings is then merged if all of
    /// them are flagged for coarsening and the merged cell keeps the mesh balanced. All flags
    /// are cleared afterwards and the mesh generation is incremented.
    pub fn execute_coarsening_and_refinement(&mut self) -> RefinementSummary {
        let mut summary = RefinementSummary::default();
        let active = self.active_cells().to_vec();

        for &cell in &active {
            let c = self.cell(cell);
            if !c.is_active() || !c.refine_flag {
                continue;
            }
            if c.level() >= self.max_level() {
                debug!(
                    "Ignoring refinement flag on cell {} at maximum level {}",
                    cell,
                    self.max_level()
                );
                self.cell_mut(cell).refine_flag = false;
                summary.clamped += 1;
            } else {
                self.refine_balanced(cell, &mut summary);
            }
        }

        let mut parents: Vec<CellId> = active
            .iter()
            .filter(|&&cell| {
                let c = self.cell(cell);
                c.is_active() && c.coarsen_flag && !c.refine_flag
            })
            .filter_map(|&cell| self.cell(cell).parent())
            .collect();
        parents.sort_unstable();
        parents.dedup();

        for parent in parents {
            if self.family_is_coarsenable(parent) {
                self.merge_children(parent);
                summary.coarsened += 1;
            } else {
                debug!("Skipping coarsening of children of cell {}", parent);
                summary.coarsening_skipped += 1;
            }
        }

        self.rebuild_active_cells();
        self.clear_flags();
        self.bump_generation();
        summary
    }

    /// Refines every active cell `times` times.
    pub fn refine_global(&mut self, times: usize) -> RefinementSummary {
        let mut summary = RefinementSummary::default();
        for _ in 0..times {
            let active = self.active_cells().to_vec();
            for cell in active {
                self.cell_mut(cell).refine_flag = true;
            }
            summary.accumulate(&self.execute_coarsening_and_refinement());
        }
        summary
    }

    fn refine_balanced(&mut self, cell: CellId, summary: &mut RefinementSummary) {
        if !self.cell(cell).is_active() {
            return;
        }
        let level = self.cell_level(cell);
        for face in 0..NUM_FACES {
            for neighbor in self.face_neighbors(cell, face) {
                if self.cell_level(neighbor) < level {
                    self.refine_balanced(neighbor, summary);
                }
            }
        }
        self.split_cell(cell);
        summary.refined += 1;
    }

    fn family_is_coarsenable(&self, parent: CellId) -> bool {
        let Some(children) = self.cell(parent).children() else {
            return false;
        };
        let all_flagged = children.iter().all(|&child| {
            let c = self.cell(child);
            c.is_active() && c.coarsen_flag && !c.refine_flag
        });
        if !all_flagged {
            return false;
        }

        // The merged cell must not end up next to cells more than one level finer
        let level = self.cell_level(parent);
        (0..NUM_FACES).all(|face| {
            self.face_neighbors(parent, face)
                .into_iter()
                .all(|neighbor| self.cell_level(neighbor) <= level + 1)
        })
    }
}

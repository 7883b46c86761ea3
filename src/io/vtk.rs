//! Export of solutions and cell data to VTK files.
use crate::dofs::DofHandler;
use crate::mesh::QuadTreeMesh;
use eyre::{eyre, WrapErr};
use nalgebra::DVector;
use std::path::{Path, PathBuf};
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType, Piece, UnstructuredGridPiece,
    Version, VertexNumbers, Vtk,
};

/// File name of the output of the given refinement cycle.
pub fn cycle_file_name(cycle: usize) -> String {
    format!("solution-{:02}.vtu", cycle)
}

/// Builds an unstructured grid of the active cells of a mesh, with one point per DoF and
/// attached point and cell data.
pub struct SolutionDataSetBuilder<'a> {
    mesh: &'a QuadTreeMesh,
    dofs: &'a DofHandler,
    point_data: Vec<(String, Vec<f64>)>,
    cell_data: Vec<(String, Vec<f64>)>,
    // Only used for exporting directly to file
    title: Option<String>,
}

impl<'a> SolutionDataSetBuilder<'a> {
    pub fn new(mesh: &'a QuadTreeMesh, dofs: &'a DofHandler) -> Self {
        Self {
            mesh,
            dofs,
            point_data: Vec::new(),
            cell_data: Vec::new(),
            title: None,
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    /// Adds a scalar field with one value per DoF.
    pub fn with_point_scalars(mut self, name: impl Into<String>, values: &DVector<f64>) -> Self {
        self.point_data
            .push((name.into(), values.as_slice().to_vec()));
        self
    }

    /// Adds a scalar field with one value per active cell.
    pub fn with_cell_scalars(mut self, name: impl Into<String>, values: &[f64]) -> Self {
        self.cell_data.push((name.into(), values.to_vec()));
        self
    }

    /// The usual output of one cycle: the solution, per-cell error norms and indicators.
    pub fn with_solution(
        self,
        solution: &DVector<f64>,
        l2_error: &[f64],
        h1_error: &[f64],
        error_estimator: &[f64],
    ) -> Self {
        self.with_point_scalars("solution", solution)
            .with_cell_scalars("L2_error", l2_error)
            .with_cell_scalars("H1_error", h1_error)
            .with_cell_scalars("error_estimator", error_estimator)
    }

    pub fn try_build(&self) -> eyre::Result<DataSet> {
        self.dofs.check_generation(self.mesh)?;
        let num_points = self.dofs.num_dofs();
        let num_cells = self.mesh.num_active_cells();
        for (name, values) in &self.point_data {
            if values.len() != num_points {
                return Err(eyre!(
                    "Point data '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    num_points
                ));
            }
        }
        for (name, values) in &self.cell_data {
            if values.len() != num_cells {
                return Err(eyre!(
                    "Cell data '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    num_cells
                ));
            }
        }

        let points: Vec<f64> = self
            .dofs
            .support_points()
            .iter()
            .flat_map(|p| [p.x, p.y, 0.0])
            .collect();

        // Vertices is laid out as follows: N, i_1, i_2, ... i_N,
        // so for quads this becomes 4 followed by the four indices making up the quad
        let mut vertices: Vec<u32> = Vec::with_capacity(5 * num_cells);
        for k in 0..num_cells {
            vertices.push(4);
            for &dof in self.dofs.cell_dofs(k) {
                vertices.push(u32::try_from(dof).wrap_err("DoF index does not fit in VTK index type")?);
            }
        }

        let scalars = |(name, values): &(String, Vec<f64>)| {
            Attribute::DataArray(DataArray {
                name: name.clone(),
                elem: ElementType::Scalars {
                    num_comp: 1,
                    lookup_table: None,
                },
                data: values.clone().into(),
            })
        };

        let piece = UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: u32::try_from(num_cells).wrap_err("Too many cells for VTK")?,
                    vertices,
                },
                types: vec![CellType::Quad; num_cells],
            },
            data: Attributes {
                point: self.point_data.iter().map(scalars).collect(),
                cell: self.cell_data.iter().map(scalars).collect(),
            },
        };

        Ok(DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        })
    }

    /// Exports the data set to a file, in legacy or XML format depending on the extension.
    ///
    /// Missing parent directories are created.
    pub fn try_export(&self, filename: impl AsRef<Path>) -> eyre::Result<()> {
        let filepath = filename.as_ref();
        if let Some(parent) = filepath.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create output directory {}", parent.display()))?;
        }
        let fallback_title = filepath
            .file_stem()
            .map(|os_str| os_str.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let dataset = self.try_build()?;
        Vtk {
            version: Version { major: 4, minor: 1 },
            // If we don't have a title then just make the filepath the title
            title: self.title.clone().unwrap_or(fallback_title),
            byte_order: ByteOrder::BigEndian,
            data: dataset,
            file_path: None,
        }
        .export(filepath)
        .wrap_err_with(|| format!("Failed to export VTK file {}", filepath.display()))?;
        Ok(())
    }

    /// Exports to `solution-{cycle}.vtu` in the given directory and returns the path.
    pub fn try_export_cycle(&self, directory: impl AsRef<Path>, cycle: usize) -> eyre::Result<PathBuf> {
        let path = directory.as_ref().join(cycle_file_name(cycle));
        self.try_export(&path)?;
        Ok(path)
    }
}
